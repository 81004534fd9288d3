//! Per-call request options, query parameters and request identifiers.

use rand::Rng;
use rand::distr::Alphanumeric;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Per-call overrides. The default sends with the client's settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub skip_auth: bool,
    pub headers: HeaderMap,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Omit the `Authorization` header even when a token is set.
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Ignored by `get`, whose in-flight requests are shared between callers.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Query parameters kept sorted by key, so equal sets always serialize the
/// same way regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Canonical key identifying identical in-flight reads.
pub fn dedup_key(method: &Method, path: &str, params: Option<&QueryParams>) -> String {
    let params = params
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!("{}:{}:{}", method, path, params)
}

/// Generates a trace identifier of the form `req_<millis>_<9 random chars>`.
pub fn request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("req_{}_{}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_dedup_key_ignores_insertion_order() {
        let a = QueryParams::new().with("page", 1).with("category", "Electronics");
        let b = QueryParams::new().with("category", "Electronics").with("page", 1);
        assert_eq!(
            dedup_key(&Method::GET, "/products", Some(&a)),
            dedup_key(&Method::GET, "/products", Some(&b))
        );
    }

    #[test]
    fn test_dedup_key_format() {
        let params = QueryParams::new().with("q", "phone");
        assert_eq!(
            dedup_key(&Method::GET, "/search", Some(&params)),
            r#"GET:/search:{"q":"phone"}"#
        );
        assert_eq!(dedup_key(&Method::GET, "/search", None), "GET:/search:{}");
    }

    #[test]
    fn test_dedup_key_distinguishes_params() {
        let a = QueryParams::new().with("page", 1);
        let b = QueryParams::new().with("page", 2);
        assert_ne!(
            dedup_key(&Method::GET, "/products", Some(&a)),
            dedup_key(&Method::GET, "/products", Some(&b))
        );
    }

    #[test]
    fn test_query_params_from_iter() {
        let params: QueryParams = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(
            params.to_pairs(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_request_id_shape_and_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| request_id()).collect();
        assert_eq!(ids.len(), 1000);

        let id = ids.iter().next().unwrap();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn test_options_builder() {
        let token = CancellationToken::new();
        let options = RequestOptions::new()
            .timeout(Duration::from_secs(5))
            .skip_auth()
            .cancel_token(token);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert!(options.skip_auth);
        assert!(options.cancel.is_some());
    }
}
