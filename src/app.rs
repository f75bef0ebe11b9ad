//! Application assembly.
//!
//! [`AppBuilder::build`] lays the middleware stack out in a fixed order:
//!
//! ```text
//! logger → error boundary → configure_app hook → routes → allowed methods → configure_tail_app hook
//! ```
//!
//! The logger sits outside the boundary so it reports the status the error
//! handler settled on.

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::builder::RouteBuilder;
use crate::container::Container;
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::middleware::{self, ErrorBoundary, ErrorHandler, Logger, Middleware, Next, default_error_handler};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::server::Server;

type Hook = Arc<dyn Fn(&mut Application) + Send + Sync>;

/// Fluent configuration of an [`Application`].
///
/// ```rust,no_run
/// use tsumiki::{AppBuilder, Beans, Registry};
///
/// # async fn run(registry: Registry) -> Result<(), tsumiki::Error> {
/// AppBuilder::new(registry, Beans::new())
///     .configure_router_prefix("/api")
///     .configure_app(|app| {
///         app.use_fn(|ctx, next| async move {
///             ctx.set_state("started", true);
///             next.run(ctx).await
///         });
///     })
///     .run(3000)
///     .await
/// # }
/// ```
pub struct AppBuilder<C> {
    registry: Registry,
    container: C,
    logger: Arc<dyn Middleware>,
    error_handler: ErrorHandler,
    app_hook: Option<Hook>,
    tail_hook: Option<Hook>,
    router_prefix: Option<String>,
}

impl<C: Container> AppBuilder<C> {
    pub fn new(registry: Registry, container: C) -> Self {
        Self {
            registry,
            container,
            logger: Arc::new(Logger),
            error_handler: Arc::new(default_error_handler),
            app_hook: None,
            tail_hook: None,
            router_prefix: None,
        }
    }

    /// Replaces the request logger.
    pub fn configure_logger(&mut self, logger: impl Middleware) -> &mut Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Replaces the handler the error boundary reports failures to.
    pub fn configure_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&BoxError, &Context) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Hook run after the error boundary is installed and before the
    /// routes. Middleware added here wrap every route.
    pub fn configure_app<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Application) + Send + Sync + 'static,
    {
        self.app_hook = Some(Arc::new(hook));
        self
    }

    /// Hook run last. Middleware added here only see requests the routes
    /// passed on.
    pub fn configure_tail_app<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Application) + Send + Sync + 'static,
    {
        self.tail_hook = Some(Arc::new(hook));
        self
    }

    /// Mounts every controller under `prefix`.
    pub fn configure_router_prefix(&mut self, prefix: &str) -> &mut Self {
        self.router_prefix = Some(prefix.to_owned());
        self
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    /// Assembles the application: logger, error boundary and `configure_app`
    /// hook first, then the registered controllers are bound into the
    /// container and their routes built and mounted, then the
    /// `configure_tail_app` hook runs.
    ///
    /// The `configure_app` hook runs even when a later step fails the build.
    /// Can be called again; routes are rebuilt from scratch each time.
    pub fn build(&mut self) -> Result<Application, Error> {
        let mut app = Application::new();
        app.use_arc(Arc::clone(&self.logger));
        app.use_middleware(ErrorBoundary::new(Arc::clone(&self.error_handler)));
        if let Some(hook) = &self.app_hook {
            hook(&mut app);
        }

        for controller in self.registry.list_controllers() {
            self.container
                .bind_controller(&controller.identity, controller.controller_type.clone());
        }

        let mut root = match &self.router_prefix {
            Some(prefix) => Router::with_prefix(prefix),
            None => Router::new(),
        };
        let mounted = RouteBuilder::new(&self.registry, &self.container).build(&mut root)?;
        let routes = root.compile()?;

        app.use_middleware(routes.routes());
        app.use_middleware(routes.allowed_methods());
        if let Some(hook) = &self.tail_hook {
            hook(&mut app);
        }

        info!(
            controllers = self.registry.list_controllers().len(),
            routes = mounted,
            prefix = self.router_prefix.as_deref().unwrap_or("/"),
            middleware = app.len(),
            "application built"
        );
        Ok(app)
    }

    /// Builds the application and serves it on `0.0.0.0:port` until shutdown.
    pub async fn run(&mut self, port: u16) -> Result<(), Error> {
        let app = self.build()?;
        app.listen(&format!("0.0.0.0:{port}")).await
    }
}

// ── Application ───────────────────────────────────────────────────────────────

/// An ordered middleware stack, first element outermost.
#[derive(Clone, Default)]
pub struct Application {
    stack: Vec<Arc<dyn Middleware>>,
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.use_arc(Arc::new(middleware))
    }

    pub fn use_arc(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.stack.push(middleware);
        self
    }

    /// Appends an async closure `|ctx, next| async move { … }`.
    pub fn use_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.use_middleware(middleware::from_fn(f))
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs `request` through the stack and returns the final response.
    ///
    /// Errors escaping the stack (from middleware mounted outside the
    /// error boundary) go to the default error handler.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = Context::new(request);
        let chain: Arc<[Arc<dyn Middleware>]> = Arc::from(self.stack.as_slice());
        if let Err(err) = Next::new(chain, None).run(ctx.clone()).await {
            default_error_handler(&err, &ctx);
        }
        ctx.response().clone()
    }

    /// Serves the application on `addr` (`host:port`) until shutdown.
    pub async fn listen(self, addr: &str) -> Result<(), Error> {
        Server::bind(addr)?.serve(self).await
    }
}
