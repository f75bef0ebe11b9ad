//! # tsumiki
//!
//! Declarative controllers for async Rust services: declare controllers,
//! their routed methods and where each method argument comes from, and get
//! a composed middleware application served by hyper.
//!
//! ## The pieces
//!
//! - [`Registry`] collects controller, method and parameter-binding
//!   descriptors. It is an explicit value, not global metadata.
//! - A [`Container`] constructs controllers and resolves named middleware.
//!   [`Beans`] is the built-in one.
//! - [`AppBuilder`] resolves middleware, binds parameters, mounts routes on
//!   a radix-tree [`Router`] and lays the global stack out: logger, error
//!   boundary, your hooks, routes.
//! - Middleware get a [`Context`] and a [`Next`] continuation; code after
//!   `next.run(ctx).await` runs on the way out.
//!
//! Structural mistakes (a controller without methods, a method whose
//! arguments are not all bound, an unresolvable middleware) fail
//! [`AppBuilder::build`], never a request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsumiki::{AppBuilder, Arg, Beans, BoxError, Container, ContainerError, Injectable, Registry};
//!
//! struct Users;
//!
//! impl Injectable for Users {
//!     fn inject(_: &dyn Container) -> Result<Self, ContainerError> {
//!         Ok(Users)
//!     }
//! }
//!
//! impl Users {
//!     async fn list(self: Arc<Self>) -> Result<serde_json::Value, BoxError> {
//!         Ok(serde_json::json!([{ "id": 1 }]))
//!     }
//!
//!     async fn show(self: Arc<Self>, id: Arg) -> Result<String, BoxError> {
//!         Ok(format!("user {}", id.into_value()?.unwrap_or_default()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsumiki::Error> {
//!     let mut registry = Registry::new();
//!     let mut users = registry.controller::<Users>("/users", ["auth"]);
//!     users.get("/", "list", Users::list);
//!     users.get("/:id", "show", Users::show).path(0, "id");
//!
//!     let mut beans = Beans::new();
//!     beans.bind_middleware("auth", tsumiki::from_fn(|ctx, next| async move {
//!         next.run(ctx).await
//!     }));
//!
//!     AppBuilder::new(registry, beans).run(3000).await
//! }
//! ```

mod app;
mod binder;
mod builder;
mod container;
mod context;
mod error;
mod handler;
mod registry;
mod request;
mod resolver;
mod response;
mod router;
mod server;
mod verb;

pub mod middleware;

pub use app::{AppBuilder, Application};
pub use binder::{BoundHandler, bind};
pub use builder::{Route, RouteBuilder};
pub use container::{Beans, Component, Container, ContainerError, ControllerType, Injectable};
pub use context::Context;
pub use error::{BoxError, Error};
pub use handler::{Arg, ArgError, Method};
pub use middleware::{
    BoxFuture, Chain, ErrorBoundary, ErrorHandler, FromFn, Logger, Middleware, Next, Panicked,
    compose, default_error_handler, from_fn,
};
pub use registry::{
    Binding, ControllerDescriptor, ControllerScope, MethodDescriptor, MethodScope, NamedParam,
    ParamBindingDescriptor, Registry, Slot,
};
pub use request::Request;
pub use resolver::{MiddlewareRef, Resolver};
pub use response::{Body, IntoBody, Response};
pub use router::{AllowedMethods, Dispatch, RouteTable, Router};
pub use server::Server;
pub use verb::Verb;
