//! Error types.
//!
//! Two families, split by when they happen:
//!
//! - [`Error`] is structural. It surfaces from [`AppBuilder::build`](crate::AppBuilder::build)
//!   (or from binding the server socket) and is meant to stop startup.
//! - [`BoxError`] is what handlers and middleware return at request time.
//!   It never leaves the error boundary installed by the application.

use crate::container::ContainerError;

/// Request-time error returned by handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build-time and infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A controller has a descriptor but no annotated methods.
    #[error("no methods registered on controller `{controller}`")]
    NoMethodsRegistered { controller: String },

    /// The container yielded an instance nobody registered a descriptor for.
    #[error("no controller descriptor registered for `{controller}`")]
    UnknownController { controller: String },

    /// The container yielded no controllers at all.
    #[error("no controllers resolvable from the container")]
    NoControllers,

    /// Fewer distinct argument positions are bound than the method declares.
    #[error(
        "method `{controller}::{method}` declares {declared} parameters but only {covered} are bound"
    )]
    IncompleteParameterBinding {
        controller: String,
        method: String,
        declared: usize,
        covered: usize,
    },

    /// A binding points past the method's last parameter.
    #[error("method `{controller}::{method}` binds index {index} but declares {declared} parameters")]
    BindingIndexOutOfRange {
        controller: String,
        method: String,
        index: usize,
        declared: usize,
    },

    /// Two binding slots claim the same argument position.
    #[error("method `{controller}::{method}` binds index {index} more than once")]
    ConflictingParameterBinding {
        controller: String,
        method: String,
        index: usize,
    },

    /// A named middleware resolved to something without a `handle` capability.
    #[error("middleware `{id}` resolved to `{type_name}`, which does not implement `Middleware`")]
    InvalidMiddlewareType { id: String, type_name: String },

    /// A middleware reference that is neither callable, named, nor a handler.
    #[error("unknown middleware reference of type `{type_name}`")]
    UnknownMiddlewareRefType { type_name: String },

    #[error(transparent)]
    Container(#[from] ContainerError),

    /// The route table rejected a pattern (syntax error or conflict).
    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
