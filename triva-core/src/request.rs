//! The request record handed to every pipeline stage.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Extensions, Headers, HttpMethod};

/// Body as interpreted from its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    /// Request target exactly as received (path plus query).
    pub url: String,
    /// Path component of `url`, still percent-encoded.
    pub path: String,
    /// Decoded query parameters; the first occurrence of a key wins.
    pub query: HashMap<String, String>,
    pub headers: Headers,
    pub remote_addr: Option<SocketAddr>,
    /// Client identifier derived by the pipeline from proxy headers or the
    /// transport address.
    pub client_ip: String,
    /// Path parameters captured by the matched route.
    pub params: HashMap<String, String>,
    pub extensions: Extensions,
    /// Identifier echoed in `X-Request-ID`.
    pub id: String,
    pub received_at: Instant,
    body: Bytes,
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = split_target(&url);
        Self {
            method,
            path,
            query,
            url,
            headers: Headers::new(),
            remote_addr: None,
            client_ip: String::new(),
            params: HashMap::new(),
            extensions: Extensions::new(),
            id: uuid::Uuid::new_v4().to_string(),
            received_at: Instant::now(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body together with its content type.
    pub fn with_json(mut self, value: &Value) -> Self {
        self.headers.insert("content-type", "application/json");
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn user_agent(&self) -> &str {
        self.headers.get("user-agent").unwrap_or("")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Raw body bytes (possibly empty).
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str, Error> {
        if self.body.is_empty() {
            return Err(Error::BadRequest("request body is empty".to_string()));
        }
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::BadRequest(format!("request body is not valid UTF-8: {}", e)))
    }

    /// Deserialize a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if self.body.is_empty() {
            return Err(Error::BadRequest("request body is empty".to_string()));
        }
        if !self.is_json() {
            return Err(Error::BadRequest(format!(
                "expected application/json body, got {}",
                self.content_type().unwrap_or("no content type")
            )));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::BadRequest(format!("invalid JSON body: {}", e)))
    }

    /// Interpret the body the way its content type suggests.
    pub fn parsed_body(&self) -> Result<ParsedBody, Error> {
        if self.body.is_empty() {
            Ok(ParsedBody::Empty)
        } else if self.is_json() {
            self.json::<Value>().map(ParsedBody::Json)
        } else {
            self.text().map(|t| ParsedBody::Text(t.to_string()))
        }
    }
}

fn split_target(url: &str) -> (String, HashMap<String, String>) {
    let without_fragment = url.split('#').next().unwrap_or("");
    let (path, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, q),
        None => (without_fragment, ""),
    };
    let path = if path.is_empty() { "/" } else { path };
    (path.to_string(), parse_query(query))
}

/// Parse `a=1&b=two+words`; repeated keys keep their first value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }
        params
            .entry(key)
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_split_path_and_query() {
        let req = Request::new(HttpMethod::GET, "/search?q=rust+lang&page=2&q=other");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("page"), Some("2"));
    }

    #[test]
    fn test_query_percent_decoding() {
        let query = parse_query("name=J%C3%BCrgen&empty=&flag");
        assert_eq!(query["name"], "Jürgen");
        assert_eq!(query["empty"], "");
        assert_eq!(query["flag"], "");
    }

    #[test]
    fn test_empty_target_is_root() {
        let req = Request::new(HttpMethod::GET, "?x=1");
        assert_eq!(req.path, "/");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        user: String,
    }

    #[test]
    fn test_json_accessor() {
        let req = Request::new(HttpMethod::POST, "/login")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(r#"{"user":"ada"}"#);
        let login: Login = req.json().unwrap();
        assert_eq!(login.user, "ada");
    }

    #[test]
    fn test_json_requires_content_type() {
        let req = Request::new(HttpMethod::POST, "/login").with_body(r#"{"user":"ada"}"#);
        let err = req.json::<Login>().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(req.text().unwrap(), r#"{"user":"ada"}"#);
    }

    #[test]
    fn test_missing_body_is_precise_error() {
        let req = Request::new(HttpMethod::POST, "/login");
        assert!(matches!(req.json::<Login>(), Err(Error::BadRequest(m)) if m.contains("empty")));
        assert_eq!(req.parsed_body().unwrap(), ParsedBody::Empty);
    }

    #[test]
    fn test_parsed_body_text() {
        let req = Request::new(HttpMethod::POST, "/note")
            .with_header("content-type", "text/plain")
            .with_body("hello");
        assert_eq!(req.parsed_body().unwrap(), ParsedBody::Text("hello".into()));
    }
}
