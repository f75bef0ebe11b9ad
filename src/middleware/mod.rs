//! Middleware, continuations and composition.
//!
//! A middleware receives the request [`Context`] and a [`Next`]
//! continuation. Code before `next.run(ctx)` runs on the way in, code after
//! it on the way out, so a chain `[A, B]` around a handler runs
//!
//! ```text
//! A-enter → B-enter → handler → B-exit → A-exit
//! ```
//!
//! Not calling `next` short-circuits everything inside. Calling it twice
//! runs the rest of the chain twice.
//!
//! # How chains nest
//!
//! A [`Chain`] is itself a middleware. When the last layer of an inner chain
//! calls its `next`, control continues into the continuation the chain was
//! given, which is how a route's chain hands over to whatever the
//! application mounted after the router.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BoxError;

mod boundary;
mod logger;

pub use boundary::{ErrorBoundary, ErrorHandler, Panicked, default_error_handler};
pub use logger::Logger;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The handler capability: anything that can process a request given the
/// continuation to the rest of the chain.
///
/// Implement it on types that carry dependencies (resolved from the
/// container, for instance):
///
/// ```rust
/// use tsumiki::{BoxError, BoxFuture, Context, Middleware, Next};
///
/// struct RequireKey { key: String }
///
/// impl Middleware for RequireKey {
///     fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
///         let key = self.key.clone();
///         Box::pin(async move {
///             if ctx.request().header("x-api-key") == Some(key.as_str()) {
///                 next.run(ctx).await
///             } else {
///                 ctx.response().unauthorized("missing key");
///                 Ok(())
///             }
///         })
///     }
/// }
/// ```
///
/// Plain async closures go through [`from_fn`].
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>>;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        (**self).handle(ctx, next)
    }
}

// ── Closures ──────────────────────────────────────────────────────────────────

/// Adapts an async closure `|ctx, next| async move { … }` into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    FromFn(f)
}

/// Middleware built by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        Box::pin((self.0)(ctx, next))
    }
}

// ── Continuation ──────────────────────────────────────────────────────────────

/// The continuation handed to a middleware: the rest of the chain, followed
/// by whatever the enclosing chain continues with.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    outer: Option<Arc<Next>>,
}

impl Next {
    /// A continuation that does nothing.
    pub fn end() -> Self {
        Self { chain: Arc::from(Vec::new()), index: 0, outer: None }
    }

    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, outer: Option<Next>) -> Self {
        Self { chain, index: 0, outer: outer.map(Arc::new) }
    }

    /// Runs the rest of the chain.
    pub fn run(self, ctx: Context) -> BoxFuture<Result<(), BoxError>> {
        match self.chain.get(self.index).cloned() {
            Some(layer) => {
                let rest = Next {
                    chain: self.chain,
                    index: self.index + 1,
                    outer: self.outer,
                };
                layer.handle(ctx, rest)
            }
            None => match self.outer {
                Some(outer) => Next::clone(&outer).run(ctx),
                None => Box::pin(async { Ok(()) }),
            },
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len() - self.index.min(self.chain.len())))
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// An ordered run of middleware behaving as a single middleware.
#[derive(Clone)]
pub struct Chain {
    layers: Arc<[Arc<dyn Middleware>]>,
}

impl Chain {
    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }
}

/// Composes `layers` into one middleware, first element outermost.
pub fn compose(layers: impl IntoIterator<Item = Arc<dyn Middleware>>) -> Chain {
    Chain { layers: layers.into_iter().collect() }
}

impl Middleware for Chain {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        Next::new(Arc::clone(&self.layers), Some(next)).run(ctx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::request::Request;

    pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

    pub(crate) fn context(method: &str, uri: &str) -> Context {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        Context::new(Request::from_http(req))
    }

    pub(crate) fn recorder(journal: &Journal, name: &'static str) -> Arc<dyn Middleware> {
        let journal = Arc::clone(journal);
        Arc::new(from_fn(move |ctx, next: Next| {
            let journal = Arc::clone(&journal);
            async move {
                journal.lock().unwrap().push(format!("{name}-enter"));
                next.run(ctx).await?;
                journal.lock().unwrap().push(format!("{name}-exit"));
                Ok(())
            }
        }))
    }

    #[tokio::test]
    async fn chain_runs_in_onion_order() {
        let journal = Journal::default();
        let chain = compose([recorder(&journal, "a"), recorder(&journal, "b")]);

        chain.handle(context("GET", "/"), Next::end()).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            ["a-enter", "b-enter", "b-exit", "a-exit"]
        );
    }

    #[tokio::test]
    async fn inner_chain_continues_into_outer() {
        let journal = Journal::default();
        let inner: Arc<dyn Middleware> = Arc::new(compose([recorder(&journal, "inner")]));
        let outer = compose([inner, recorder(&journal, "after")]);

        outer.handle(context("GET", "/"), Next::end()).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            ["inner-enter", "after-enter", "after-exit", "inner-exit"]
        );
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let journal = Journal::default();
        let stop: Arc<dyn Middleware> = Arc::new(from_fn(|ctx: Context, _next| async move {
            ctx.response().set_body("stopped");
            Ok(())
        }));
        let chain = compose([stop, recorder(&journal, "never")]);

        let ctx = context("GET", "/");
        chain.handle(ctx.clone(), Next::end()).await.unwrap();

        assert!(journal.lock().unwrap().is_empty());
        assert!(ctx.response().has_body());
    }

    #[tokio::test]
    async fn next_can_run_twice() {
        let journal = Journal::default();
        let twice: Arc<dyn Middleware> = Arc::new(from_fn(|ctx: Context, next: Next| async move {
            next.clone().run(ctx.clone()).await?;
            next.run(ctx).await
        }));
        let chain = compose([twice, recorder(&journal, "x")]);

        chain.handle(context("GET", "/"), Next::end()).await.unwrap();

        assert_eq!(journal.lock().unwrap().len(), 4);
    }
}
