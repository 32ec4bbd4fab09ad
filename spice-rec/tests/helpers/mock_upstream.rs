//! Local stand-ins for the upstream catalog APIs
//!
//! Each server binds 127.0.0.1:0 and runs for the rest of the test; the
//! returned base URL is handed to the client under test.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serve `router` on an ephemeral port, returning `http://127.0.0.1:<port>`
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let address = listener.local_addr().expect("mock upstream address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock upstream");
    });

    format!("http://{}", address)
}

/// `http://127.0.0.1:<port>` for a port that was just released
///
/// Connections to it are refused, unlike a fixed low port that may be served
/// or filtered on the test host.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("ephemeral port address").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Request counter shared between a mock and its test
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Query strings received by a mock, in arrival order
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<HashMap<String, String>>>>);

impl Recorded {
    fn push(&self, params: &HashMap<String, String>) {
        self.0.lock().expect("recorded lock").push(params.clone());
    }

    pub fn all(&self) -> Vec<HashMap<String, String>> {
        self.0.lock().expect("recorded lock").clone()
    }
}

// ============================================================================
// Last.fm
// ============================================================================

#[derive(Clone, Default)]
pub struct LastfmMock {
    /// `track.search` query -> (name, artist)
    pub search: HashMap<String, Vec<(String, String)>>,
    /// "artist|track" -> (name, artist, match)
    pub similar: HashMap<String, Vec<(String, String, f64)>>,
    /// Answer every call with (http status, Last.fm error code, message)
    pub error: Option<(u16, u32, String)>,
    pub hits: Hits,
    pub recorded: Recorded,
}

impl LastfmMock {
    pub fn with_search(mut self, query: &str, hits: &[(&str, &str)]) -> Self {
        self.search.insert(
            query.to_string(),
            hits.iter()
                .map(|(n, a)| (n.to_string(), a.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_similar(mut self, artist: &str, track: &str, hits: &[(&str, &str, f64)]) -> Self {
        self.similar.insert(
            format!("{}|{}", artist, track),
            hits.iter()
                .map(|(n, a, m)| (n.to_string(), a.to_string(), *m))
                .collect(),
        );
        self
    }

    pub fn failing(mut self, status: u16, code: u32, message: &str) -> Self {
        self.error = Some((status, code, message.to_string()));
        self
    }

    /// Serve under `/2.0/`, returning the full API root
    pub async fn start(self) -> String {
        let router = Router::new()
            .route("/2.0/", get(lastfm_handler))
            .with_state(self);
        format!("{}/2.0/", spawn(router).await)
    }
}

async fn lastfm_handler(
    State(mock): State<LastfmMock>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.hits.bump();
    mock.recorded.push(&params);

    if let Some((status, code, message)) = &mock.error {
        let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::OK);
        return (status, Json(json!({ "error": code, "message": message }))).into_response();
    }

    let param = |name: &str| params.get(name).cloned().unwrap_or_default();

    let body = match param("method").as_str() {
        "track.search" => {
            let tracks: Vec<Value> = mock
                .search
                .get(&param("track"))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(name, artist)| {
                    json!({
                        "name": name,
                        "artist": artist,
                        "url": format!("https://www.last.fm/music/{}/_/{}", artist, name),
                        "listeners": "1000",
                        "mbid": ""
                    })
                })
                .collect();
            json!({
                "results": {
                    "opensearch:totalResults": tracks.len().to_string(),
                    "trackmatches": { "track": tracks }
                }
            })
        }
        "track.getSimilar" => {
            let key = format!("{}|{}", param("artist"), param("track"));
            let tracks: Vec<Value> = mock
                .similar
                .get(&key)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(name, artist, score)| {
                    json!({
                        "name": name,
                        "artist": { "name": artist, "mbid": "" },
                        "url": format!("https://www.last.fm/music/{}/_/{}", artist, name),
                        "match": score,
                        "mbid": ""
                    })
                })
                .collect();
            json!({ "similartracks": { "track": tracks } })
        }
        "track.getInfo" => json!({
            "track": {
                "name": param("track"),
                "artist": { "name": param("artist") },
                "url": "https://www.last.fm/music/x/_/y",
                "duration": "238000",
                "listeners": "12345",
                "playcount": "67890",
                "album": { "title": "Pablo Honey" },
                "toptags": { "tag": [{ "name": "alternative" }, { "name": "rock" }] },
                "wiki": { "summary": "A song." }
            }
        }),
        "artist.getInfo" => json!({
            "artist": {
                "name": param("artist"),
                "url": "https://www.last.fm/music/x",
                "stats": { "listeners": "500", "playcount": "900" },
                "similar": { "artist": { "name": "Muse", "url": "https://www.last.fm/music/Muse" } },
                "tags": { "tag": { "name": "rock" } },
                "bio": { "summary": "A band." }
            }
        }),
        "artist.search" => json!({
            "results": {
                "opensearch:totalResults": "1",
                "artistmatches": { "artist": [{ "name": param("artist"), "url": "u", "listeners": "10" }] }
            }
        }),
        "artist.getTopTracks" => json!({
            "toptracks": {
                "track": [
                    { "name": "Creep", "artist": { "name": param("artist") }, "url": "u1", "playcount": "99" },
                    { "name": "Karma Police", "artist": { "name": param("artist") }, "url": "u2", "playcount": "98" }
                ]
            }
        }),
        _ => json!({ "error": 3, "message": "Invalid Method - No method with that name in this package" }),
    };

    Json(body).into_response()
}

// ============================================================================
// Deezer
// ============================================================================

#[derive(Clone)]
pub struct DeezerTrackFixture {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub artist_id: u64,
}

#[derive(Clone, Default)]
pub struct DeezerMock {
    /// Search answers every track whose title appears in `q`
    pub tracks: Vec<DeezerTrackFixture>,
    /// Artist id -> radio tracks
    pub radio: HashMap<u64, Vec<DeezerTrackFixture>>,
    /// Answer every call with (http status, body, Retry-After)
    pub error: Option<(u16, Value, Option<u64>)>,
    pub hits: Hits,
    pub recorded: Recorded,
}

pub fn deezer_track(id: u64, title: &str, artist: &str, artist_id: u64) -> DeezerTrackFixture {
    DeezerTrackFixture {
        id,
        title: title.to_string(),
        artist: artist.to_string(),
        artist_id,
    }
}

fn deezer_json(track: &DeezerTrackFixture) -> Value {
    json!({
        "id": track.id,
        "title": track.title,
        "link": format!("https://www.deezer.com/track/{}", track.id),
        "duration": 200,
        "preview": "",
        "artist": { "id": track.artist_id, "name": track.artist },
        "album": { "title": "Album" }
    })
}

impl DeezerMock {
    pub fn with_track(mut self, track: DeezerTrackFixture) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_radio(mut self, artist_id: u64, tracks: Vec<DeezerTrackFixture>) -> Self {
        self.radio.insert(artist_id, tracks);
        self
    }

    pub fn failing(mut self, status: u16, body: Value, retry_after: Option<u64>) -> Self {
        self.error = Some((status, body, retry_after));
        self
    }

    pub async fn start(self) -> String {
        let router = Router::new()
            .route("/search/track", get(deezer_search))
            .route("/artist/:id/radio", get(deezer_radio))
            .with_state(self);
        spawn(router).await
    }

    fn failure(&self) -> Option<Response> {
        let (status, body, retry_after) = self.error.clone()?;
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("retry-after", secs.to_string().parse().expect("header value"));
        }
        Some(response)
    }
}

async fn deezer_search(
    State(mock): State<DeezerMock>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.hits.bump();
    mock.recorded.push(&params);

    if let Some(response) = mock.failure() {
        return response;
    }

    let q = params.get("q").cloned().unwrap_or_default().to_lowercase();
    let data: Vec<Value> = mock
        .tracks
        .iter()
        .filter(|t| q.contains(&t.title.to_lowercase()))
        .map(deezer_json)
        .collect();

    if data.is_empty() {
        return Json(json!({
            "error": { "type": "DataException", "message": "no data", "code": 800 }
        }))
        .into_response();
    }

    Json(json!({ "data": data, "total": data.len() })).into_response()
}

async fn deezer_radio(State(mock): State<DeezerMock>, Path(id): Path<u64>) -> Response {
    mock.hits.bump();

    if let Some(response) = mock.failure() {
        return response;
    }

    let data: Vec<Value> = mock
        .radio
        .get(&id)
        .map(|tracks| tracks.iter().map(deezer_json).collect())
        .unwrap_or_default();
    Json(json!({ "data": data })).into_response()
}

// ============================================================================
// OAuth token endpoint
// ============================================================================

#[derive(Clone)]
pub struct TokenMock {
    pub delay: Duration,
    pub expires_in: u64,
    /// Non-200 status to answer with
    pub refuse_with: Option<u16>,
    pub hits: Hits,
}

impl Default for TokenMock {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            expires_in: 3600,
            refuse_with: None,
            hits: Hits::default(),
        }
    }
}

impl TokenMock {
    /// Serve under `/api/token`, returning the full token URL
    pub async fn start(self) -> String {
        let router = Router::new()
            .route("/api/token", post(token_handler))
            .with_state(self);
        format!("{}/api/token", spawn(router).await)
    }
}

/// Issues `tok-1`, `tok-2`, ... in request order
async fn token_handler(State(mock): State<TokenMock>, headers: HeaderMap) -> Response {
    let n = mock.hits.bump();
    tokio::time::sleep(mock.delay).await;

    if !headers.contains_key("authorization") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_request" })),
        )
            .into_response();
    }

    if let Some(status) = mock.refuse_with {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED);
        return (
            status,
            Json(json!({ "error": "invalid_client", "error_description": "Invalid client secret" })),
        )
            .into_response();
    }

    Json(json!({
        "access_token": format!("tok-{}", n),
        "token_type": "Bearer",
        "expires_in": mock.expires_in
    }))
    .into_response()
}

// ============================================================================
// Spotify Web API
// ============================================================================

#[derive(Clone, Default)]
pub struct SpotifyMock {
    /// Bearer tokens the API accepts; everything else gets 401
    pub accepted: Vec<String>,
    /// (id, name, artist)
    pub tracks: Vec<(String, String, String)>,
    pub hits: Hits,
    pub recorded: Recorded,
}

impl SpotifyMock {
    pub fn accepting(mut self, token: &str) -> Self {
        self.accepted.push(token.to_string());
        self
    }

    pub fn with_track(mut self, id: &str, name: &str, artist: &str) -> Self {
        self.tracks
            .push((id.to_string(), name.to_string(), artist.to_string()));
        self
    }

    pub async fn start(self) -> String {
        let router = Router::new()
            .route("/v1/search", get(spotify_search))
            .route("/v1/recommendations", get(spotify_recommendations))
            .with_state(self);
        format!("{}/v1", spawn(router).await)
    }

    fn authorize(&self, headers: &HeaderMap) -> Option<Response> {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();

        if self.accepted.iter().any(|t| t == bearer) {
            return None;
        }

        Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "status": 401, "message": "The access token expired" } })),
            )
                .into_response(),
        )
    }

    fn items(&self) -> Vec<Value> {
        self.tracks.iter().map(spotify_track_json).collect()
    }

    /// Tracks whose name appears in the search text
    fn matching(&self, query: &str) -> Vec<Value> {
        let query = query.to_lowercase();
        self.tracks
            .iter()
            .filter(|(_, name, _)| query.contains(&name.to_lowercase()))
            .map(spotify_track_json)
            .collect()
    }
}

/// Artist ids are the lowercased artist name with dashes
pub fn spotify_artist_id(artist: &str) -> String {
    artist.to_lowercase().replace(' ', "-")
}

fn spotify_track_json((id, name, artist): &(String, String, String)) -> Value {
    json!({
        "id": id,
        "name": name,
        "artists": [{ "id": spotify_artist_id(artist), "name": artist }],
        "album": { "name": "Album" },
        "external_urls": { "spotify": format!("https://open.spotify.com/track/{}", id) },
        "duration_ms": 200000,
        "popularity": 50,
        "preview_url": null
    })
}

async fn spotify_search(
    State(mock): State<SpotifyMock>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.hits.bump();
    mock.recorded.push(&params);

    if let Some(rejection) = mock.authorize(&headers) {
        return rejection;
    }
    let query = params.get("q").cloned().unwrap_or_default();
    Json(json!({ "tracks": { "items": mock.matching(&query) } })).into_response()
}

async fn spotify_recommendations(
    State(mock): State<SpotifyMock>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.hits.bump();
    mock.recorded.push(&params);

    if let Some(rejection) = mock.authorize(&headers) {
        return rejection;
    }

    // One seed object per requested id, as the real endpoint reports them
    let seeds: Vec<Value> = [("seed_tracks", "TRACK"), ("seed_artists", "ARTIST"), ("seed_genres", "GENRE")]
        .iter()
        .flat_map(|(key, kind)| {
            params
                .get(*key)
                .map(|ids| ids.split(',').map(str::to_string).collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter()
                .map(move |id| {
                    json!({
                        "id": id,
                        "type": kind,
                        "initialPoolSize": 250,
                        "afterFilteringSize": 100,
                        "afterRelinkingSize": 100
                    })
                })
        })
        .collect();

    Json(json!({ "seeds": seeds, "tracks": mock.items() })).into_response()
}
