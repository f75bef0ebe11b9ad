//! Incoming request facet.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// An incoming HTTP request.
///
/// Immutable once built and cheap to clone: every clone shares the same
/// parsed parts. Query and cookies are parsed once, up front.
#[derive(Clone, Debug)]
pub struct Request {
    inner: Arc<Parts>,
}

#[derive(Debug)]
struct Parts {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    query: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
}

impl Request {
    /// Builds a request from already-collected `http` parts.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let query = parse_query(parts.uri.query());
        let cookies = parse_cookies(&parts.headers);
        Self {
            inner: Arc::new(Parts {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                query,
                cookies,
            }),
        }
    }

    /// Convenience over [`Request::from_parts`] for an in-memory request.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }

    pub fn method(&self) -> &Method { &self.inner.method }
    pub fn uri(&self) -> &Uri { &self.inner.uri }
    pub fn path(&self) -> &str { self.inner.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }
    pub fn body(&self) -> &Bytes { &self.inner.body }

    /// Header lookup. Returns `None` for values that are not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.inner.uri.host())
    }

    /// First value of a query-string key.
    pub fn query(&self, name: &str) -> Option<&str> {
        lookup(&self.inner.query, name)
    }

    /// Value of a cookie sent in the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.inner.cookies, name)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    match query {
        Some(q) => form_urlencoded::parse(q.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => Vec::new(),
    }
}

// `Cookie: a=1; b="two"` (RFC 6265 §4.2.1). Multiple headers are merged.
fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}
