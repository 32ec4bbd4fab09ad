//! Shared test helpers
//!
//! - `mock_upstream`: local axum servers standing in for Last.fm, Deezer,
//!   Spotify and the OAuth token endpoint
//! - `fake_catalog`: in-process `CatalogAdapter` with scripted answers

#![allow(dead_code)]

pub mod fake_catalog;
pub mod mock_upstream;
