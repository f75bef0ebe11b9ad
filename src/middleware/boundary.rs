//! The error boundary.
//!
//! Everything mounted inside the boundary may fail, either by returning an
//! `Err` or by panicking. The boundary catches both exactly once, hands the
//! error to the configured [`ErrorHandler`] and stops there: the error is
//! never propagated further out.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::BoxError;

/// Called with the error and the context of the failed request.
pub type ErrorHandler = Arc<dyn Fn(&BoxError, &Context) + Send + Sync>;

/// Answers `500 Internal Server Error` with a generic body and logs the
/// error for the operator.
pub fn default_error_handler(err: &BoxError, ctx: &Context) {
    let response = ctx.response();
    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.set_body("Internal Server Error");
    error!(
        method = %ctx.method(),
        path = %ctx.path(),
        error = %err,
        "request failed"
    );
}

/// Middleware routing every failure from inside it to an [`ErrorHandler`].
#[derive(Clone)]
pub struct ErrorBoundary {
    handler: ErrorHandler,
}

impl ErrorBoundary {
    pub fn new(handler: ErrorHandler) -> Self {
        Self { handler }
    }
}

impl Default for ErrorBoundary {
    fn default() -> Self {
        Self::new(Arc::new(default_error_handler))
    }
}

impl Middleware for ErrorBoundary {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx.clone())).catch_unwind().await;
            let err = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => err,
                Err(payload) => Box::new(Panicked::from_payload(payload)) as BoxError,
            };
            handler(&err, &ctx);
            Ok(())
        })
    }
}

/// A panic caught by the boundary, carried as an ordinary error.
#[derive(Debug)]
pub struct Panicked(String);

impl Panicked {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_owned(),
                Err(_) => "opaque panic payload".to_owned(),
            },
        };
        Self(message)
    }
}

impl fmt::Display for Panicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

impl std::error::Error for Panicked {}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::middleware::tests::context;
    use crate::middleware::{compose, from_fn};

    fn failing() -> Arc<dyn Middleware> {
        Arc::new(from_fn(|_ctx, _next| async { Err::<(), BoxError>("boom".into()) }))
    }

    #[tokio::test]
    async fn errors_become_500_with_generic_body() {
        let chain = compose([Arc::new(ErrorBoundary::default()) as Arc<dyn Middleware>, failing()]);
        let ctx = context("GET", "/");

        let result = chain.handle(ctx.clone(), Next::end()).await;

        assert!(result.is_ok());
        assert_eq!(ctx.response().status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            ctx.response().body(),
            Some(crate::Body::Text("Internal Server Error".into()))
        );
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let panicking: Arc<dyn Middleware> = Arc::new(from_fn(|_ctx, _next| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        }));
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let boundary = ErrorBoundary::new(Arc::new(move |err: &BoxError, _ctx: &Context| {
            *sink.lock().unwrap() = err.to_string();
        }));
        let chain = compose([Arc::new(boundary) as Arc<dyn Middleware>, panicking]);

        chain.handle(context("GET", "/"), Next::end()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), "handler panicked: kaboom");
    }
}
