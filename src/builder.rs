//! Route building: controllers, descriptors and resolved middleware in,
//! a router out.

use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::binder::bind;
use crate::container::Container;
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::middleware::{BoxFuture, Chain, Middleware, Next, compose};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::router::Router;
use crate::verb::Verb;

/// One mountable route: full chain (controller middleware, method
/// middleware, bound handler) under a verb and a controller-relative path.
#[derive(Clone)]
pub struct Route {
    pub verb: Verb,
    pub path: String,
    pub chain: Chain,
}

/// Builds routes for every controller the container yields.
pub struct RouteBuilder<'a> {
    registry: &'a Registry,
    container: &'a dyn Container,
}

impl<'a> RouteBuilder<'a> {
    pub fn new(registry: &'a Registry, container: &'a dyn Container) -> Self {
        Self { registry, container }
    }

    /// Mounts every controller's routes into `root` and returns the number
    /// of routes mounted.
    ///
    /// Fails on the first structural problem: no controllers, an instance
    /// without a descriptor, a controller without methods, an unresolvable
    /// middleware or an invalid parameter binding.
    pub fn build(&self, root: &mut Router) -> Result<usize, Error> {
        let controllers = self.container.controllers()?;
        if controllers.is_empty() {
            return Err(Error::NoControllers);
        }

        let mut resolver = Resolver::new(self.container);
        let mut mounted = 0;

        for component in controllers {
            let identity = component.type_name();
            let descriptor = self
                .registry
                .controller_descriptor(identity)
                .ok_or_else(|| Error::UnknownController { controller: identity.to_owned() })?;
            let methods = self.registry.list_methods(identity)?;

            let mut router = match descriptor.path_prefix.as_str() {
                "" | "/" => Router::new(),
                prefix => Router::with_prefix(prefix),
            };

            let controller_middleware = resolver.resolve_all(&descriptor.middleware)?;
            for method in methods {
                let method_middleware = resolver.resolve_all(&method.middleware)?;
                let handler = bind(
                    component.clone(),
                    identity,
                    method,
                    self.registry.param_binding(identity, &method.name),
                )?;

                let mut layers: Vec<Arc<dyn Middleware>> = Vec::new();
                // Mismatched custom verbs stop before any route middleware runs.
                if !method.verb.is_known() {
                    layers.push(Arc::new(VerbFilter { token: method.verb.as_str().to_owned() }));
                }
                layers.extend(controller_middleware.iter().cloned());
                layers.extend(method_middleware);
                layers.push(Arc::new(handler));

                let route = Route {
                    verb: method.verb.clone(),
                    path: method.path.clone(),
                    chain: compose(layers),
                };
                debug!(
                    controller = identity,
                    method = %method.name,
                    verb = %route.verb,
                    prefix = %descriptor.path_prefix,
                    path = %route.path,
                    layers = route.chain.len(),
                    "mounted route"
                );
                mount(&mut router, route);
                mounted += 1;
            }

            root.merge(router);
        }

        Ok(mounted)
    }
}

fn mount(router: &mut Router, route: Route) {
    if route.verb.is_known() {
        router.on(route.verb, &route.path, route.chain);
    } else {
        router.any(&route.path, route.chain);
    }
}

/// Guards an any-verb route declared with a custom verb token.
#[derive(Clone, Debug)]
struct VerbFilter {
    token: String,
}

impl Middleware for VerbFilter {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        if ctx.method().as_str() == self.token {
            return next.run(ctx);
        }
        Box::pin(async move {
            let response = ctx.response();
            if response.status().is_none() {
                response.set_status(StatusCode::METHOD_NOT_ALLOWED);
                response.set_body("Method Not Allowed");
            }
            Ok(())
        })
    }
}
