use http::StatusCode;
use thiserror::Error;

use crate::types::Ty;

/// Boxed error returned by user initializers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors in the mapped definitions, detected before serving any request
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Can't create the resource '{name}' with type {ty}: expected a record or a sequence of records")]
    InvalidShape { name: String, ty: Ty },

    #[error("Two resources have the same name '{name}': {first} and {second} in {parent}")]
    NameCollision {
        name: String,
        first: Ty,
        second: Ty,
        parent: Ty,
    },

    #[error("The resource {ty} as '{name}' has a circular dependency in {ancestor_ty} as '{ancestor}'")]
    CircularDependency {
        name: String,
        ty: Ty,
        ancestor: String,
        ancestor_ty: Ty,
    },

    #[error("Resource {owner} has an invalid initializer: it can't output {output}")]
    InvalidInitializer { owner: Ty, output: Ty },

    #[error("The initializer of {owner} must take {owner} as its first parameter")]
    MissingReceiver { owner: Ty },

    #[error("You asked for {asked} when you should use {expected}")]
    ContextMisuse { asked: Ty, expected: Ty },

    #[error("Type {0} is not allowed as a dependency")]
    InvalidDependency(Ty),

    #[error("Can't create an empty value for type {0}")]
    Unconstructible(Ty),
}

/// Errors raised while resolving the parameters of a request handler.
///
/// These reveal a gap in the mapping rather than a bad request:
/// they all map to a server fault.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Dependency {0} is not mapped")]
    Unmapped(Ty),

    #[error("No resource implements the interface {0}")]
    Unsatisfied(Ty),

    #[error("Dependency type {0} is not accepted at request time")]
    Unhandled(Ty),

    #[error("Resolved a {found} when {expected} was requested")]
    Mismatch { expected: Ty, found: Ty },

    #[error("Initializer of {owner} failed")]
    Initializer {
        owner: Ty,
        #[source]
        source: BoxError,
    },
}

impl ResolveError {
    /// Status code the transport layer should answer with
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
