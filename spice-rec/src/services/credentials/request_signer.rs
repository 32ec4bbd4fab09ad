//! API-key query strings with keyed request signatures
//!
//! # Signature
//!
//! 1. Add `api_key` to the parameters
//! 2. Concatenate `key` + `value` for every parameter in ascending key order,
//!    skipping the transport parameters `format` and `callback`
//! 3. Append the shared secret
//! 4. MD5 the result, lowercase hex, sent as `api_sig`

use super::CredentialError;
use md5::{Digest, Md5};
use std::collections::BTreeMap;

/// Parameters that select the response encoding and are never signed
const UNSIGNED_PARAMS: [&str; 2] = ["format", "callback"];

/// Builds authenticated query strings for signed-request catalogs
#[derive(Clone)]
pub struct SignedRequestBuilder {
    api_key: String,
    shared_secret: Option<String>,
}

impl std::fmt::Debug for SignedRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedRequestBuilder")
            .field("api_key", &"<redacted>")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SignedRequestBuilder {
    pub fn new(api_key: impl Into<String>, shared_secret: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            shared_secret,
        }
    }

    /// Serialize `params` to a URL-encoded query string
    ///
    /// The public API key is always attached. `api_sig` is added only when
    /// `require_signature` is set.
    pub fn build(
        &self,
        params: &BTreeMap<String, String>,
        require_signature: bool,
    ) -> Result<String, CredentialError> {
        if self.api_key.trim().is_empty() {
            return Err(CredentialError::Unavailable("API key not configured".to_string()));
        }

        let mut all = params.clone();
        all.insert("api_key".to_string(), self.api_key.clone());

        if require_signature {
            let signature = self.sign(&all)?;
            all.insert("api_sig".to_string(), signature);
        }

        Ok(url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(all.iter())
            .finish())
    }

    /// Signature over `params` (which must already contain `api_key`)
    pub fn sign(&self, params: &BTreeMap<String, String>) -> Result<String, CredentialError> {
        let secret = self
            .shared_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CredentialError::Unavailable("shared secret required for signed request".to_string())
            })?;

        let mut hasher = Md5::new();
        hasher.update(signature_base(params, secret).as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Pre-hash signature input
fn signature_base(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut base: String = params
        .iter()
        .filter(|(key, _)| !UNSIGNED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}{}", key, value))
        .collect();
    base.push_str(secret);
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signature_base_sorted_and_skips_format() {
        let p = params(&[
            ("track", "Yesterday"),
            ("method", "track.search"),
            ("format", "json"),
            ("api_key", "KEY"),
        ]);

        assert_eq!(
            signature_base(&p, "SECRET"),
            "api_keyKEYmethodtrack.searchtrackYesterdaySECRET"
        );
    }

    #[test]
    fn test_md5_digest_is_lowercase_hex() {
        // md5("abc") with an empty parameter map and secret "abc"
        let builder = SignedRequestBuilder::new("k", Some("abc".to_string()));
        let sig = builder.sign(&BTreeMap::new()).unwrap();
        assert_eq!(sig, "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_unsigned_build_attaches_api_key_only() {
        let builder = SignedRequestBuilder::new("KEY", None);
        let query = builder
            .build(&params(&[("method", "track.search"), ("track", "a b")]), false)
            .unwrap();

        assert_eq!(query, "api_key=KEY&method=track.search&track=a+b");
        assert!(!query.contains("api_sig"));
    }

    #[test]
    fn test_signed_build_appends_signature() {
        let builder = SignedRequestBuilder::new("KEY", Some("SECRET".to_string()));
        let p = params(&[("method", "auth.getSession")]);

        let query = builder.build(&p, true).unwrap();

        let mut with_key = p.clone();
        with_key.insert("api_key".into(), "KEY".into());
        let expected_sig = builder.sign(&with_key).unwrap();
        assert!(query.contains(&format!("api_sig={}", expected_sig)));
    }

    #[test]
    fn test_signature_changes_with_secret() {
        let p = params(&[("api_key", "KEY"), ("method", "m")]);
        let a = SignedRequestBuilder::new("KEY", Some("one".into())).sign(&p).unwrap();
        let b = SignedRequestBuilder::new("KEY", Some("two".into())).sign(&p).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_secret_is_credential_unavailable() {
        let builder = SignedRequestBuilder::new("KEY", None);
        let err = builder.build(&params(&[("method", "m")]), true).unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(_)));
    }

    #[test]
    fn test_missing_api_key_rejected_before_request() {
        let builder = SignedRequestBuilder::new("  ", Some("s".into()));
        assert!(builder.build(&BTreeMap::new(), false).is_err());
    }
}
