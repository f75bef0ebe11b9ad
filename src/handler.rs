//! Controller methods, positional arguments and type erasure.
//!
//! # What counts as a controller method
//!
//! Any function taking the controller as `Arc<C>` followed by zero to eight
//! [`Arg`]s, returning a future of `Result<impl IntoBody, impl Into<BoxError>>`.
//! The usual shape is an inherent `async fn` with an `Arc<Self>` receiver:
//!
//! ```rust
//! use std::sync::Arc;
//! use tsumiki::{Arg, BoxError};
//!
//! struct Users;
//!
//! impl Users {
//!     async fn show(self: Arc<Self>, id: Arg) -> Result<String, BoxError> {
//!         Ok(format!("user {}", id.into_value()?.unwrap_or_default()))
//!     }
//! }
//! ```
//!
//! The number of `Arg` parameters is the method's declared parameter count.
//! It is part of the type, so the binder can check coverage before the
//! first request.
//!
//! # How methods are stored
//!
//! Methods of different controllers and arities live side by side in the
//! registry, so they are erased the same way the router erases handlers:
//!
//! ```text
//! Users::show                       ← fn(Arc<Users>, Arg) -> impl Future
//!        ↓ Method<Users, (Arg,)>    ← blanket impl, one per arity
//! Arc::new(FnMethod { f, … })       ← heap-allocated wrapper
//!        ↓ stored as BoxedMethod = Arc<dyn ErasedMethod>
//! method.call(&component, args)     ← downcast Arc<dyn Any> → Arc<Users>
//! ```

use std::any::{Any, type_name};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::Component;
use crate::context::Context;
use crate::error::BoxError;
use crate::middleware::{BoxFuture, Next};
use crate::request::Request;
use crate::response::{Body, IntoBody, Response};

// ── Arguments ─────────────────────────────────────────────────────────────────

/// One positional argument passed to a controller method.
#[derive(Clone, Debug)]
pub enum Arg {
    Context(Context),
    Request(Request),
    Response(Response),
    Next(Next),
    /// A path parameter, query value or cookie. `None` when the request
    /// does not carry it.
    Value(Option<String>),
}

/// An [`Arg`] of the wrong kind was unwrapped.
#[derive(Debug, thiserror::Error)]
#[error("expected a {expected} argument, got a {found} argument")]
pub struct ArgError {
    expected: &'static str,
    found: &'static str,
}

impl Arg {
    fn kind(&self) -> &'static str {
        match self {
            Self::Context(_)  => "context",
            Self::Request(_)  => "request",
            Self::Response(_) => "response",
            Self::Next(_)     => "next",
            Self::Value(_)    => "value",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ArgError {
        ArgError { expected, found: self.kind() }
    }

    pub fn into_context(self) -> Result<Context, ArgError> {
        match self {
            Self::Context(ctx) => Ok(ctx),
            other => Err(other.mismatch("context")),
        }
    }

    pub fn into_request(self) -> Result<Request, ArgError> {
        match self {
            Self::Request(req) => Ok(req),
            other => Err(other.mismatch("request")),
        }
    }

    pub fn into_response(self) -> Result<Response, ArgError> {
        match self {
            Self::Response(res) => Ok(res),
            other => Err(other.mismatch("response")),
        }
    }

    pub fn into_next(self) -> Result<Next, ArgError> {
        match self {
            Self::Next(next) => Ok(next),
            other => Err(other.mismatch("next")),
        }
    }

    pub fn into_value(self) -> Result<Option<String>, ArgError> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(other.mismatch("value")),
        }
    }
}

// ── Method trait ──────────────────────────────────────────────────────────────

/// Implemented for every valid controller method.
///
/// Never implemented by hand: the blanket impls below cover functions of
/// `Arc<C>` plus up to eight [`Arg`]s. `M` is a marker tuple telling the
/// arities apart. The trait is sealed.
pub trait Method<C, M>: private::Sealed<C, M> + Send + Sync + 'static {
    #[doc(hidden)]
    fn arity(&self) -> usize;

    #[doc(hidden)]
    fn call(&self, controller: Arc<C>, args: Vec<Arg>) -> BoxFuture<Result<Option<Body>, BoxError>>;
}

mod private {
    pub trait Sealed<C, M> {}
}

macro_rules! arg_type {
    ($_a:ident) => { Arg };
}

macro_rules! count {
    ($_a:ident) => { 1 };
}

macro_rules! impl_method {
    ($($a:ident),*) => {
        impl<C, F, Fut, R, E> private::Sealed<C, ($(arg_type!($a),)*)> for F
        where
            C: Send + Sync + 'static,
            F: Fn(Arc<C>, $(arg_type!($a)),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: IntoBody,
            E: Into<BoxError>,
        {
        }

        impl<C, F, Fut, R, E> Method<C, ($(arg_type!($a),)*)> for F
        where
            C: Send + Sync + 'static,
            F: Fn(Arc<C>, $(arg_type!($a)),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: IntoBody,
            E: Into<BoxError>,
        {
            fn arity(&self) -> usize {
                0 $(+ count!($a))*
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, controller: Arc<C>, args: Vec<Arg>) -> BoxFuture<Result<Option<Body>, BoxError>> {
                let mut args = args.into_iter();
                $(let $a = args.next().unwrap_or(Arg::Value(None));)*
                let fut = (self)(controller, $($a),*);
                Box::pin(async move { fut.await.map(IntoBody::into_body).map_err(Into::into) })
            }
        }
    };
}

impl_method!();
impl_method!(a1);
impl_method!(a1, a2);
impl_method!(a1, a2, a3);
impl_method!(a1, a2, a3, a4);
impl_method!(a1, a2, a3, a4, a5);
impl_method!(a1, a2, a3, a4, a5, a6);
impl_method!(a1, a2, a3, a4, a5, a6, a7);
impl_method!(a1, a2, a3, a4, a5, a6, a7, a8);

// ── Erasure ───────────────────────────────────────────────────────────────────

/// Object-safe view of a [`Method`] bound to no particular controller type.
pub(crate) trait ErasedMethod: Send + Sync {
    fn arity(&self) -> usize;
    fn call(&self, controller: &Component, args: Vec<Arg>) -> BoxFuture<Result<Option<Body>, BoxError>>;
}

pub(crate) type BoxedMethod = Arc<dyn ErasedMethod>;

pub(crate) fn erase<C, M, F>(method: F) -> BoxedMethod
where
    C: Any + Send + Sync,
    M: 'static,
    F: Method<C, M>,
{
    Arc::new(FnMethod { method, _marker: PhantomData::<fn() -> (C, M)> })
}

struct FnMethod<C, M, F> {
    method: F,
    _marker: PhantomData<fn() -> (C, M)>,
}

/// The component handed to a method is not the controller it was declared on.
#[derive(Debug, thiserror::Error)]
#[error("controller instance is a `{found}`, expected `{expected}`")]
struct ControllerMismatch {
    expected: &'static str,
    found: &'static str,
}

impl<C, M, F> ErasedMethod for FnMethod<C, M, F>
where
    C: Any + Send + Sync,
    M: 'static,
    F: Method<C, M>,
{
    fn arity(&self) -> usize {
        self.method.arity()
    }

    fn call(&self, controller: &Component, args: Vec<Arg>) -> BoxFuture<Result<Option<Body>, BoxError>> {
        match controller.downcast::<C>() {
            Some(instance) => self.method.call(instance, args),
            None => {
                let err = ControllerMismatch {
                    expected: type_name::<C>(),
                    found: controller.type_name(),
                };
                Box::pin(async move { Err(err.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Echo {
        async fn none(self: Arc<Self>) -> Result<(), BoxError> {
            Ok(())
        }

        async fn pair(self: Arc<Self>, a: Arg, b: Arg) -> Result<String, BoxError> {
            let a = a.into_value()?.unwrap_or_default();
            let b = b.into_value()?.unwrap_or_default();
            Ok(format!("{a}{b}"))
        }
    }

    #[test]
    fn arity_comes_from_the_signature() {
        assert_eq!(erase(Echo::none).arity(), 0);
        assert_eq!(erase(Echo::pair).arity(), 2);
    }

    #[tokio::test]
    async fn call_passes_arguments_in_order() {
        let method = erase(Echo::pair);
        let args = vec![Arg::Value(Some("a".into())), Arg::Value(Some("b".into()))];

        let body = method.call(&Component::new(Echo), args).await.unwrap();

        assert_eq!(body, Some(Body::Text("ab".into())));
    }

    #[tokio::test]
    async fn wrong_controller_is_a_request_error() {
        let method = erase(Echo::none);
        let err = method.call(&Component::new(5_u32), Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("expected"));
    }

    #[test]
    fn arg_accessors_reject_the_wrong_kind() {
        let err = Arg::Value(None).into_next().unwrap_err();
        assert_eq!(err.to_string(), "expected a next argument, got a value argument");
    }
}
