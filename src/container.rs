//! The dependency container boundary.
//!
//! tsumiki needs exactly two things from a container: remember which
//! controller types exist so their instances can be enumerated later, and
//! resolve an identifier to an instance. [`Container`] is that contract.
//! Scoping (singleton, per-call) is the container's business.
//!
//! [`Beans`] is the in-process implementation used when nothing else is
//! plugged in.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::middleware::Middleware;

/// Errors raised by a [`Container`].
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("nothing bound to `{0}`")]
    NotBound(String),

    #[error("`{id}` resolves to `{found}`, not `{expected}`")]
    TypeMismatch {
        id: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("failed to construct `{type_name}`: {reason}")]
    Construction {
        type_name: &'static str,
        reason: String,
    },
}

// ── Component ─────────────────────────────────────────────────────────────────

/// A type-erased instance handed out by a container.
///
/// Besides the value itself it records its type name (used as the
/// controller identity and in error messages) and, when the value
/// implements [`Middleware`], the handler capability.
#[derive(Clone)]
pub struct Component {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    handler: Option<Arc<dyn Middleware>>,
}

impl Component {
    /// Wraps a plain value. It has no handler capability.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { value, type_name: type_name::<T>(), handler: None }
    }

    /// Wraps a middleware, keeping its handler capability.
    pub fn middleware<M: Middleware>(middleware: M) -> Self {
        let value = Arc::new(middleware);
        Self {
            value: value.clone(),
            type_name: type_name::<M>(),
            handler: Some(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The `handle` capability, if the wrapped value has one.
    pub fn handler(&self) -> Option<Arc<dyn Middleware>> {
        self.handler.clone()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("type_name", &self.type_name)
            .field("is_middleware", &self.handler.is_some())
            .finish()
    }
}

// ── Injection ─────────────────────────────────────────────────────────────────

/// Types a container can construct, pulling their dependencies from it.
///
/// ```rust
/// use std::sync::Arc;
/// use tsumiki::{Container, ContainerError, Injectable};
///
/// struct Greeter { greeting: Arc<String> }
///
/// impl Injectable for Greeter {
///     fn inject(container: &dyn Container) -> Result<Self, ContainerError> {
///         Ok(Self { greeting: container.get::<String>("greeting")? })
///     }
/// }
/// ```
pub trait Injectable: Any + Send + Sync + Sized {
    fn inject(container: &dyn Container) -> Result<Self, ContainerError>;
}

type Constructor = Arc<dyn Fn(&dyn Container) -> Result<Component, ContainerError> + Send + Sync>;

/// Handle to a controller type: its name and how to build an instance.
#[derive(Clone)]
pub struct ControllerType {
    type_name: &'static str,
    construct: Constructor,
}

impl ControllerType {
    pub fn of<C: Injectable>() -> Self {
        Self {
            type_name: type_name::<C>(),
            construct: Arc::new(
                |container: &dyn Container| -> Result<Component, ContainerError> {
                    Ok(Component::new(C::inject(container)?))
                },
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn instantiate(&self, container: &dyn Container) -> Result<Component, ContainerError> {
        (self.construct)(container)
    }
}

impl fmt::Debug for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControllerType").field(&self.type_name).finish()
    }
}

// ── Container ─────────────────────────────────────────────────────────────────

/// What the route builder needs from a dependency container.
pub trait Container: Send + Sync {
    /// Records `controller` under `identity`. Binding the same identity
    /// again replaces the previous binding.
    fn bind_controller(&mut self, identity: &str, controller: ControllerType);

    /// Instantiates every bound controller.
    fn controllers(&self) -> Result<Vec<Component>, ContainerError>;

    /// Resolves an identifier to an instance.
    fn resolve(&self, id: &str) -> Result<Component, ContainerError>;
}

impl<'a> dyn Container + 'a {
    /// Typed [`resolve`](Container::resolve).
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, ContainerError> {
        let component = self.resolve(id)?;
        component.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            id: id.to_owned(),
            expected: type_name::<T>(),
            found: component.type_name(),
        })
    }
}

// ── Beans ─────────────────────────────────────────────────────────────────────

/// In-process [`Container`]: singletons, factories and a controller list.
#[derive(Default)]
pub struct Beans {
    providers: HashMap<String, Provider>,
    controllers: Vec<(String, ControllerType)>,
}

enum Provider {
    Singleton(Component),
    Factory(Constructor),
}

impl Beans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a shared instance.
    pub fn bind_instance<T: Any + Send + Sync>(&mut self, id: impl Into<String>, value: T) -> &mut Self {
        self.bind_component(id, Component::new(value))
    }

    /// Binds a shared middleware instance, resolvable as a named middleware.
    pub fn bind_middleware<M: Middleware>(&mut self, id: impl Into<String>, middleware: M) -> &mut Self {
        self.bind_component(id, Component::middleware(middleware))
    }

    pub fn bind_component(&mut self, id: impl Into<String>, component: Component) -> &mut Self {
        self.providers.insert(id.into(), Provider::Singleton(component));
        self
    }

    /// Binds a factory run on every resolution.
    pub fn bind_factory<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&dyn Container) -> Result<Component, ContainerError> + Send + Sync + 'static,
    {
        self.providers.insert(id.into(), Provider::Factory(Arc::new(factory)));
        self
    }

    /// Binds `T` to be injected afresh on every resolution.
    pub fn bind_injectable<T: Injectable>(&mut self, id: impl Into<String>) -> &mut Self {
        self.bind_factory(id, |container| Ok(Component::new(T::inject(container)?)))
    }
}

impl Container for Beans {
    fn bind_controller(&mut self, identity: &str, controller: ControllerType) {
        match self.controllers.iter_mut().find(|(id, _)| id == identity) {
            Some(slot) => slot.1 = controller,
            None => self.controllers.push((identity.to_owned(), controller)),
        }
    }

    fn controllers(&self) -> Result<Vec<Component>, ContainerError> {
        self.controllers
            .iter()
            .map(|(_, controller)| controller.instantiate(self))
            .collect()
    }

    fn resolve(&self, id: &str) -> Result<Component, ContainerError> {
        match self.providers.get(id) {
            Some(Provider::Singleton(component)) => Ok(component.clone()),
            Some(Provider::Factory(factory)) => factory(self),
            None => Err(ContainerError::NotBound(id.to_owned())),
        }
    }
}

impl fmt::Debug for Beans {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Beans")
            .field("providers", &self.providers.len())
            .field("controllers", &self.controllers)
            .finish()
    }
}
