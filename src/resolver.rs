//! Middleware references and their resolution.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::container::{Component, Container};
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::middleware::{self, Middleware, Next};

/// How a controller or method names one of its middleware.
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Used as is.
    Callable(Arc<dyn Middleware>),
    /// Looked up in the container at build time. The instance must have the
    /// handler capability.
    Named(String),
    /// An instance supplied directly. Only usable if it has the handler
    /// capability.
    Object(Component),
}

impl MiddlewareRef {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::Callable(Arc::new(middleware::from_fn(f)))
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self::Named(id.into())
    }

    pub fn handler<M: Middleware>(middleware: M) -> Self {
        Self::Callable(Arc::new(middleware))
    }

    pub fn object(component: Component) -> Self {
        Self::Object(component)
    }
}

impl From<&str> for MiddlewareRef {
    fn from(id: &str) -> Self {
        Self::Named(id.to_owned())
    }
}

impl From<String> for MiddlewareRef {
    fn from(id: String) -> Self {
        Self::Named(id)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Callable(middleware)
    }
}

impl From<Component> for MiddlewareRef {
    fn from(component: Component) -> Self {
        Self::Object(component)
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callable(_)        => f.write_str("Callable(..)"),
            Self::Named(id)          => f.debug_tuple("Named").field(id).finish(),
            Self::Object(component)  => f.debug_tuple("Object").field(component).finish(),
        }
    }
}

/// Turns [`MiddlewareRef`]s into callable middleware.
///
/// Named references are resolved once per resolver and shared by every
/// route that names them.
pub struct Resolver<'c> {
    container: &'c dyn Container,
    cache: HashMap<String, Arc<dyn Middleware>>,
}

impl<'c> Resolver<'c> {
    pub fn new(container: &'c dyn Container) -> Self {
        Self { container, cache: HashMap::new() }
    }

    pub fn resolve(&mut self, reference: &MiddlewareRef) -> Result<Arc<dyn Middleware>, Error> {
        match reference {
            MiddlewareRef::Callable(middleware) => Ok(Arc::clone(middleware)),
            MiddlewareRef::Named(id) => {
                if let Some(cached) = self.cache.get(id) {
                    return Ok(Arc::clone(cached));
                }
                let component = self.container.resolve(id)?;
                let handler = component.handler().ok_or_else(|| Error::InvalidMiddlewareType {
                    id: id.clone(),
                    type_name: component.type_name().to_owned(),
                })?;
                debug!(%id, type_name = component.type_name(), "resolved middleware");
                self.cache.insert(id.clone(), Arc::clone(&handler));
                Ok(handler)
            }
            MiddlewareRef::Object(component) => {
                component.handler().ok_or_else(|| Error::UnknownMiddlewareRefType {
                    type_name: component.type_name().to_owned(),
                })
            }
        }
    }

    /// Resolves a whole list, preserving order.
    pub fn resolve_all(&mut self, references: &[MiddlewareRef]) -> Result<Vec<Arc<dyn Middleware>>, Error> {
        references.iter().map(|r| self.resolve(r)).collect()
    }
}
