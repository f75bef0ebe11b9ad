//! Outgoing response facet, response bodies and the [`IntoBody`] conversion.
//!
//! A [`Response`] is a shared handle. Every middleware and handler working
//! on the same request sees and mutates the same status, headers and body;
//! the server turns the final state into bytes once the chain has unwound.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde_json::Value;

use crate::error::BoxError;

// ── Body ──────────────────────────────────────────────────────────────────────

/// A response body. Its variant picks the default `content-type`.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Text(String),  // text/plain; charset=utf-8
    Json(Value),   // application/json
    Bytes(Bytes),  // application/octet-stream
}

impl Body {
    fn content_type(&self) -> &'static str {
        match self {
            Self::Text(_)  => "text/plain; charset=utf-8",
            Self::Json(_)  => "application/json",
            Self::Bytes(_) => "application/octet-stream",
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(s)  => Bytes::from(s),
            // A `Value` always serialises: its map keys are strings.
            Self::Json(v)  => Bytes::from(serde_json::to_vec(&v).unwrap_or_default()),
            Self::Bytes(b) => b,
        }
    }
}

// ── IntoBody ──────────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into a response body.
///
/// `None` means "the handler returned nothing", which leaves the response
/// untouched.
///
/// ```rust
/// use tsumiki::{Body, IntoBody};
///
/// assert_eq!(().into_body(), None);
/// assert_eq!("hi".into_body(), Some(Body::Text("hi".into())));
/// assert_eq!(serde_json::json!({"id": 1}).into_body(), Some(Body::Json(serde_json::json!({"id": 1}))));
/// ```
pub trait IntoBody {
    fn into_body(self) -> Option<Body>;
}

impl IntoBody for () {
    fn into_body(self) -> Option<Body> { None }
}

impl IntoBody for Body {
    fn into_body(self) -> Option<Body> { Some(self) }
}

impl IntoBody for String {
    fn into_body(self) -> Option<Body> { Some(Body::Text(self)) }
}

impl IntoBody for &'static str {
    fn into_body(self) -> Option<Body> { Some(Body::Text(self.to_owned())) }
}

impl IntoBody for Value {
    fn into_body(self) -> Option<Body> { Some(Body::Json(self)) }
}

impl IntoBody for Bytes {
    fn into_body(self) -> Option<Body> { Some(Body::Bytes(self)) }
}

impl IntoBody for Vec<u8> {
    fn into_body(self) -> Option<Body> { Some(Body::Bytes(Bytes::from(self))) }
}

impl<T: IntoBody> IntoBody for Option<T> {
    fn into_body(self) -> Option<Body> { self.and_then(IntoBody::into_body) }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// The response under construction for one request.
///
/// Cloning yields another handle to the same response. Nothing is locked
/// across an `.await`; every accessor takes the lock for the duration of
/// the call only.
#[derive(Clone, Debug, Default)]
pub struct Response {
    inner: Arc<Mutex<Parts>>,
}

#[derive(Debug, Default)]
struct Parts {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<Body>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn parts(&self) -> MutexGuard<'_, Parts> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The explicitly set status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.parts().status
    }

    /// The status that would be sent right now: the explicit one, else 200
    /// when a body is present, else 404.
    pub fn effective_status(&self) -> StatusCode {
        let parts = self.parts();
        effective_status(&parts)
    }

    pub fn set_status(&self, status: StatusCode) {
        self.parts().status = Some(status);
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.parts()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Sets (replaces) a header.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), BoxError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.parts().headers.insert(name, value);
        Ok(())
    }

    pub fn body(&self) -> Option<Body> {
        self.parts().body.clone()
    }

    pub fn has_body(&self) -> bool {
        self.parts().body.is_some()
    }

    /// Sets the body. A body on a response with no explicit status implies
    /// `200 OK`. Passing something that converts to `None` clears the body.
    pub fn set_body(&self, body: impl IntoBody) {
        let body = body.into_body();
        let mut parts = self.parts();
        if body.is_some() && parts.status.is_none() {
            parts.status = Some(StatusCode::OK);
        }
        parts.body = body;
    }

    // ── Helpers ──────────────────────────────────────────────────────────────
    //
    // One convention for all of them: the helper sets the status explicitly,
    // and an absent body leaves the response empty (no JSON `null`).

    /// `200 OK` with `body`.
    pub fn ok(&self, body: impl IntoBody) {
        self.replace(StatusCode::OK, body.into_body());
    }

    /// `201 Created`. With a location, the body is `{"link": location}`.
    pub fn created(&self, location: Option<&str>) {
        let body = location.map(|l| Body::Json(serde_json::json!({ "link": l })));
        self.replace(StatusCode::CREATED, body);
    }

    /// `202 Accepted`, body untouched.
    pub fn accepted(&self) {
        self.set_status(StatusCode::ACCEPTED);
    }

    /// `404 Not Found`, empty body.
    pub fn not_found(&self) {
        self.replace(StatusCode::NOT_FOUND, None);
    }

    /// `401 Unauthorized` with `body`.
    pub fn unauthorized(&self, body: impl IntoBody) {
        self.replace(StatusCode::UNAUTHORIZED, body.into_body());
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(&self, location: &str) -> Result<(), BoxError> {
        self.set_header(header::LOCATION.as_str(), location)?;
        self.replace(
            StatusCode::FOUND,
            Some(Body::Text(format!("Redirecting to {location}."))),
        );
        Ok(())
    }

    fn replace(&self, status: StatusCode, body: Option<Body>) {
        let mut parts = self.parts();
        parts.status = Some(status);
        parts.body = body;
    }

    /// Turns the final state into a wire response. HEAD responses keep
    /// their headers and drop the body.
    pub(crate) fn to_http(&self, head: bool) -> http::Response<Full<Bytes>> {
        let parts = self.parts();
        let status = effective_status(&parts);
        let mut headers = parts.headers.clone();

        let body = match (&parts.status, parts.body.clone()) {
            (_, Some(body)) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(body.content_type()),
                    );
                }
                body.into_bytes()
            }
            (None, None) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                Bytes::from_static(b"Not Found")
            }
            (Some(_), None) => Bytes::new(),
        };

        let mut res = http::Response::new(Full::new(if head { Bytes::new() } else { body }));
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        res
    }
}

fn effective_status(parts: &Parts) -> StatusCode {
    match (parts.status, &parts.body) {
        (Some(status), _) => status,
        (None, Some(_))   => StatusCode::OK,
        (None, None)      => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_response_is_not_found() {
        let res = Response::new();
        assert_eq!(res.effective_status(), StatusCode::NOT_FOUND);
        let wire = res.to_http(false);
        assert_eq!(wire.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn body_implies_ok_unless_status_was_set() {
        let res = Response::new();
        res.set_body("hello");
        assert_eq!(res.status(), Some(StatusCode::OK));

        let res = Response::new();
        res.set_status(StatusCode::ACCEPTED);
        res.set_body("queued");
        assert_eq!(res.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn clones_share_state() {
        let res = Response::new();
        let other = res.clone();
        other.set_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(res.status(), Some(StatusCode::IM_A_TEAPOT));
    }

    #[test]
    fn content_type_follows_body_unless_explicit() {
        let res = Response::new();
        res.set_body(serde_json::json!({"id": 1}));
        let wire = res.to_http(false);
        assert_eq!(wire.headers()[header::CONTENT_TYPE], "application/json");

        let res = Response::new();
        res.set_header("content-type", "text/html").unwrap();
        res.set_body("<p>hi</p>");
        let wire = res.to_http(false);
        assert_eq!(wire.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[test]
    fn created_with_location_links_it() {
        let res = Response::new();
        res.created(Some("/users/7"));
        assert_eq!(res.status(), Some(StatusCode::CREATED));
        assert_eq!(res.body(), Some(Body::Json(serde_json::json!({"link": "/users/7"}))));

        res.created(None);
        assert_eq!(res.body(), None);
    }

    #[test]
    fn redirect_sets_location() {
        let res = Response::new();
        res.redirect("/login").unwrap();
        assert_eq!(res.status(), Some(StatusCode::FOUND));
        assert_eq!(res.header("location").as_deref(), Some("/login"));
    }

    #[test]
    fn invalid_header_is_an_error() {
        let res = Response::new();
        assert!(res.set_header("bad header", "x").is_err());
        assert!(res.set_header("x-ok", "line\nbreak").is_err());
    }
}
