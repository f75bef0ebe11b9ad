//! Per-request context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::request::Request;
use crate::response::Response;

/// Everything one request carries through the middleware chain: the
/// request, the response being built, the matched path parameters and a
/// `state` bag middleware use to hand values to each other.
///
/// A fresh context is created for every request. Clones are handles to the
/// same context, so a middleware that clones it before calling
/// [`Next::run`](crate::Next::run) observes what inner middleware wrote.
#[derive(Clone, Debug)]
pub struct Context {
    request: Request,
    response: Response,
    locals: Arc<Mutex<Locals>>,
}

#[derive(Debug, Default)]
struct Locals {
    params: HashMap<String, String>,
    state: HashMap<String, Value>,
    // Verbs the matched path accepts, left by the router for the
    // allowed-methods responder when no layer took the request.
    allowed: Option<Vec<String>>,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(),
            locals: Arc::default(),
        }
    }

    fn locals(&self) -> MutexGuard<'_, Locals> {
        self.locals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn response(&self) -> &Response { &self.response }

    pub fn method(&self) -> &http::Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }

    /// A path parameter captured by the matched route.
    pub fn param(&self, name: &str) -> Option<String> {
        self.locals().params.get(name).cloned()
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.request.query(name).map(str::to_owned)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.request.cookie(name).map(str::to_owned)
    }

    pub fn state(&self, key: &str) -> Option<Value> {
        self.locals().state.get(key).cloned()
    }

    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.locals().state.insert(key.into(), value.into());
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        self.locals().params = params;
    }

    pub(crate) fn set_allowed(&self, verbs: Vec<String>) {
        self.locals().allowed = Some(verbs);
    }

    pub(crate) fn take_allowed(&self) -> Option<Vec<String>> {
        self.locals().allowed.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn context() -> Context {
        let req = http::Request::builder()
            .uri("/items?sort=asc")
            .header("cookie", "id=9")
            .body(Bytes::new())
            .unwrap();
        Context::new(Request::from_http(req))
    }

    #[test]
    fn clones_share_params_and_state() {
        let ctx = context();
        let other = ctx.clone();
        other.set_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        other.set_state("user", "alice");

        assert_eq!(ctx.param("id").as_deref(), Some("42"));
        assert_eq!(ctx.state("user"), Some(Value::from("alice")));
    }

    #[test]
    fn query_and_cookie_come_from_the_request() {
        let ctx = context();
        assert_eq!(ctx.query("sort").as_deref(), Some("asc"));
        assert_eq!(ctx.cookie("id").as_deref(), Some("9"));
        assert_eq!(ctx.param("id"), None);
    }
}
