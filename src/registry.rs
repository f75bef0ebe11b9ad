//! Declaration-time metadata.
//!
//! The [`Registry`] collects what annotation-driven frameworks keep in
//! global reflective metadata: one [`ControllerDescriptor`] per controller
//! type, its [`MethodDescriptor`]s and, per method, a
//! [`ParamBindingDescriptor`] mapping argument positions to request facets.
//! It is an ordinary value, built up front and handed to the
//! [`AppBuilder`](crate::AppBuilder).
//!
//! ```rust
//! use std::sync::Arc;
//! use tsumiki::{Arg, BoxError, Container, ContainerError, Injectable, Registry};
//!
//! struct Users;
//!
//! impl Injectable for Users {
//!     fn inject(_: &dyn Container) -> Result<Self, ContainerError> { Ok(Users) }
//! }
//!
//! impl Users {
//!     async fn show(self: Arc<Self>, id: Arg) -> Result<String, BoxError> {
//!         Ok(id.into_value()?.unwrap_or_default())
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry
//!     .controller::<Users>("/users", ["auth"])
//!     .get("/:id", "show", Users::show)
//!     .path(0, "id");
//! ```

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::container::{ControllerType, Injectable};
use crate::error::Error;
use crate::handler::{BoxedMethod, Method, erase};
use crate::resolver::MiddlewareRef;
use crate::verb::Verb;

// ── Descriptors ───────────────────────────────────────────────────────────────

/// A controller: its path prefix, controller-level middleware and type.
#[derive(Clone, Debug)]
pub struct ControllerDescriptor {
    pub identity: String,
    pub path_prefix: String,
    pub middleware: Vec<MiddlewareRef>,
    pub controller_type: ControllerType,
}

impl ControllerDescriptor {
    pub fn new<C: Injectable>(path_prefix: impl Into<String>, middleware: Vec<MiddlewareRef>) -> Self {
        Self {
            identity: type_name::<C>().to_owned(),
            path_prefix: path_prefix.into(),
            middleware,
            controller_type: ControllerType::of::<C>(),
        }
    }
}

/// One routed method of a controller.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub path: String,
    pub verb: Verb,
    pub middleware: Vec<MiddlewareRef>,
    method: BoxedMethod,
}

impl MethodDescriptor {
    pub fn new<C, M, F>(verb: Verb, path: impl Into<String>, name: impl Into<String>, method: F) -> Self
    where
        C: Injectable,
        M: 'static,
        F: Method<C, M>,
    {
        Self {
            name: name.into(),
            path: path.into(),
            verb,
            middleware: Vec::new(),
            method: erase::<C, M, F>(method),
        }
    }

    pub fn with_middleware(mut self, middleware: impl IntoIterator<Item = impl Into<MiddlewareRef>>) -> Self {
        self.middleware.extend(middleware.into_iter().map(Into::into));
        self
    }

    /// Number of positional parameters the method declares.
    pub fn arity(&self) -> usize {
        self.method.arity()
    }

    pub(crate) fn method(&self) -> &BoxedMethod {
        &self.method
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("verb", &self.verb)
            .field("middleware", &self.middleware)
            .field("arity", &self.arity())
            .finish()
    }
}

/// A named argument: `name` is looked up in the request, `index` is the
/// position it fills.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamedParam {
    pub name: String,
    pub index: usize,
}

/// Where each argument of a method comes from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParamBindingDescriptor {
    pub context: Option<usize>,
    pub request: Option<usize>,
    pub response: Option<usize>,
    pub next: Option<usize>,
    pub params: Vec<NamedParam>,
    pub queries: Vec<NamedParam>,
    pub cookies: Vec<NamedParam>,
}

/// One binding slot, as selected by a parameter annotation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Slot {
    Context,
    Request,
    Response,
    Next,
    Path(String),
    Query(String),
    Cookie(String),
}

impl ParamBindingDescriptor {
    /// Records `slot` at `index`. Single slots are overwritten, named slots
    /// accumulate in declaration order.
    pub fn merge(&mut self, slot: Slot, index: usize) {
        match slot {
            Slot::Context     => self.context = Some(index),
            Slot::Request     => self.request = Some(index),
            Slot::Response    => self.response = Some(index),
            Slot::Next        => self.next = Some(index),
            Slot::Path(name)  => self.params.push(NamedParam { name, index }),
            Slot::Query(name) => self.queries.push(NamedParam { name, index }),
            Slot::Cookie(name) => self.cookies.push(NamedParam { name, index }),
        }
    }

    /// Every bound index, one entry per slot (duplicates included).
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        [self.context, self.request, self.response, self.next]
            .into_iter()
            .flatten()
            .chain(self.params.iter().map(|p| p.index))
            .chain(self.queries.iter().map(|p| p.index))
            .chain(self.cookies.iter().map(|p| p.index))
    }
}

/// Result of looking up a method's bindings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Binding<'a> {
    /// No parameter annotation at all: the method is called by convention.
    Unbound,
    Bound(&'a ParamBindingDescriptor),
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Store of controller, method and parameter-binding descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    controllers: Vec<ControllerDescriptor>,
    methods: HashMap<String, Vec<MethodDescriptor>>,
    bindings: HashMap<(String, String), ParamBindingDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a controller, replacing any descriptor with the same identity
    /// in place.
    pub fn register_controller(&mut self, descriptor: ControllerDescriptor) {
        match self.controllers.iter_mut().find(|c| c.identity == descriptor.identity) {
            Some(slot) => *slot = descriptor,
            None => self.controllers.push(descriptor),
        }
    }

    /// Inserts a method under `controller`, replacing one with the same name
    /// together with its parameter bindings. The controller itself need not
    /// be registered yet.
    pub fn register_method(&mut self, controller: &str, descriptor: MethodDescriptor) {
        self.bindings
            .remove(&(controller.to_owned(), descriptor.name.clone()));
        let methods = self.methods.entry(controller.to_owned()).or_default();
        match methods.iter_mut().find(|m| m.name == descriptor.name) {
            Some(slot) => *slot = descriptor,
            None => methods.push(descriptor),
        }
    }

    /// Merges one binding slot into the method's descriptor, creating it on
    /// first use.
    pub fn register_param_binding(&mut self, controller: &str, method: &str, slot: Slot, index: usize) {
        self.bindings
            .entry((controller.to_owned(), method.to_owned()))
            .or_default()
            .merge(slot, index);
    }

    pub fn list_controllers(&self) -> &[ControllerDescriptor] {
        &self.controllers
    }

    pub fn controller_descriptor(&self, identity: &str) -> Option<&ControllerDescriptor> {
        self.controllers.iter().find(|c| c.identity == identity)
    }

    /// The controller's methods. A controller without any is a programming
    /// error, reported as [`Error::NoMethodsRegistered`].
    pub fn list_methods(&self, controller: &str) -> Result<&[MethodDescriptor], Error> {
        match self.methods.get(controller) {
            Some(methods) if !methods.is_empty() => Ok(methods),
            _ => Err(Error::NoMethodsRegistered { controller: controller.to_owned() }),
        }
    }

    pub fn param_binding(&self, controller: &str, method: &str) -> Binding<'_> {
        match self.bindings.get(&(controller.to_owned(), method.to_owned())) {
            Some(descriptor) => Binding::Bound(descriptor),
            None => Binding::Unbound,
        }
    }

    // ── Declaration surface ──────────────────────────────────────────────────

    /// Declares `C` as a controller mounted under `path` with
    /// controller-level `middleware`, and returns a scope to declare its
    /// methods.
    pub fn controller<C: Injectable>(
        &mut self,
        path: &str,
        middleware: impl IntoIterator<Item = impl Into<MiddlewareRef>>,
    ) -> ControllerScope<'_, C> {
        let middleware = middleware.into_iter().map(Into::into).collect();
        self.register_controller(ControllerDescriptor::new::<C>(path, middleware));
        ControllerScope { registry: self, _controller: PhantomData }
    }
}

/// Declares methods of controller `C`.
pub struct ControllerScope<'r, C> {
    registry: &'r mut Registry,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Injectable> ControllerScope<'_, C> {
    /// Declares `method` as handling `verb` on `path`, relative to the
    /// controller prefix.
    pub fn route<M: 'static, F: Method<C, M>>(
        &mut self,
        verb: Verb,
        path: &str,
        name: &str,
        method: F,
    ) -> MethodScope<'_> {
        let identity = type_name::<C>();
        self.registry
            .register_method(identity, MethodDescriptor::new::<C, M, F>(verb, path, name, method));
        MethodScope {
            registry: &mut *self.registry,
            controller: identity,
            method: name.to_owned(),
        }
    }

    pub fn get<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Get, path, name, method)
    }

    pub fn post<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Post, path, name, method)
    }

    pub fn put<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Put, path, name, method)
    }

    pub fn patch<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Patch, path, name, method)
    }

    pub fn delete<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Delete, path, name, method)
    }

    pub fn head<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::Head, path, name, method)
    }

    pub fn all<M: 'static, F: Method<C, M>>(&mut self, path: &str, name: &str, method: F) -> MethodScope<'_> {
        self.route(Verb::All, path, name, method)
    }
}

/// Adds method-level middleware and parameter bindings to a declared method.
pub struct MethodScope<'r> {
    registry: &'r mut Registry,
    controller: &'static str,
    method: String,
}

impl MethodScope<'_> {
    /// Appends a method-level middleware.
    pub fn middleware(self, middleware: impl Into<MiddlewareRef>) -> Self {
        if let Some(descriptor) = self
            .registry
            .methods
            .get_mut(self.controller)
            .and_then(|methods| methods.iter_mut().find(|m| m.name == self.method))
        {
            descriptor.middleware.push(middleware.into());
        }
        self
    }

    pub fn bind(self, index: usize, slot: Slot) -> Self {
        self.registry
            .register_param_binding(self.controller, &self.method, slot, index);
        self
    }

    pub fn context(self, index: usize) -> Self { self.bind(index, Slot::Context) }
    pub fn request(self, index: usize) -> Self { self.bind(index, Slot::Request) }
    pub fn response(self, index: usize) -> Self { self.bind(index, Slot::Response) }
    pub fn next(self, index: usize) -> Self { self.bind(index, Slot::Next) }

    pub fn path(self, index: usize, name: &str) -> Self {
        self.bind(index, Slot::Path(name.to_owned()))
    }

    pub fn query(self, index: usize, name: &str) -> Self {
        self.bind(index, Slot::Query(name.to_owned()))
    }

    pub fn cookie(self, index: usize, name: &str) -> Self {
        self.bind(index, Slot::Cookie(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::container::{Container, ContainerError};
    use crate::error::BoxError;
    use crate::handler::Arg;

    struct Users;

    impl Injectable for Users {
        fn inject(_: &dyn Container) -> Result<Self, ContainerError> {
            Ok(Users)
        }
    }

    impl Users {
        async fn list(self: Arc<Self>) -> Result<(), BoxError> {
            Ok(())
        }

        async fn show(self: Arc<Self>, _id: Arg, _ctx: Arg) -> Result<(), BoxError> {
            Ok(())
        }
    }


    #[test]
    fn controller_identity_is_its_type_name() {
        let mut registry = Registry::new();
        registry.controller::<Users>("/users", ["auth"]).get("/", "list", Users::list);

        let descriptor = &registry.list_controllers()[0];
        assert_eq!(descriptor.identity, type_name::<Users>());
        assert_eq!(descriptor.path_prefix, "/users");
        assert_eq!(descriptor.middleware.len(), 1);
    }

    #[test]
    fn reregistering_overwrites_in_place() {
        let mut registry = Registry::new();
        registry.controller::<Users>("/a", Vec::<MiddlewareRef>::new());
        registry.controller::<Users>("/b", Vec::<MiddlewareRef>::new());

        assert_eq!(registry.list_controllers().len(), 1);
        assert_eq!(registry.controller_descriptor(type_name::<Users>()).unwrap().path_prefix, "/b");
    }

    #[test]
    fn methods_are_keyed_by_name() {
        let mut registry = Registry::new();
        let mut users = registry.controller::<Users>("/users", Vec::<MiddlewareRef>::new());
        users.get("/", "list", Users::list);
        users.post("/", "list", Users::list);

        let methods = registry.list_methods(type_name::<Users>()).unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].verb, Verb::Post);
    }

    #[test]
    fn redeclaring_a_method_drops_its_bindings() {
        let mut registry = Registry::new();
        let mut users = registry.controller::<Users>("/users", Vec::<MiddlewareRef>::new());
        users.get("/:id", "show", Users::show).path(0, "id").context(1);
        users.get("/", "show", Users::list);

        assert_eq!(registry.param_binding(type_name::<Users>(), "show"), Binding::Unbound);
        assert_eq!(registry.list_methods(type_name::<Users>()).unwrap()[0].arity(), 0);
    }

    #[test]
    fn controller_without_methods_fails() {
        let mut registry = Registry::new();
        registry.controller::<Users>("/users", Vec::<MiddlewareRef>::new());

        let err = registry.list_methods(type_name::<Users>()).unwrap_err();
        assert!(matches!(err, Error::NoMethodsRegistered { .. }));
    }

    #[test]
    fn bindings_merge_incrementally() {
        let mut registry = Registry::new();
        registry
            .controller::<Users>("/users", Vec::<MiddlewareRef>::new())
            .get("/:id", "show", Users::show)
            .path(0, "id")
            .context(1)
            .middleware("audit");

        let Binding::Bound(binding) = registry.param_binding(type_name::<Users>(), "show") else {
            panic!("expected a binding");
        };
        assert_eq!(binding.context, Some(1));
        assert_eq!(binding.params, [NamedParam { name: "id".into(), index: 0 }]);
        assert_eq!(binding.indices().collect::<Vec<_>>(), [1, 0]);

        assert_eq!(registry.param_binding(type_name::<Users>(), "list"), Binding::Unbound);
        assert_eq!(registry.list_methods(type_name::<Users>()).unwrap()[0].middleware.len(), 1);
        assert_eq!(registry.list_methods(type_name::<Users>()).unwrap()[0].arity(), 2);
    }
}
