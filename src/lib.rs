//! Resource trees and per-request dependency resolution for typed handlers.
//!
//! # Simple use case
//!
//! ```
//! use rescope::*;
//!
//! // Define records and declare their fields
//! #[derive(Clone, Default)]
//! struct Post {
//!     title: String,
//! }
//!
//! impl Record for Post {
//!     fn declare(schema: &mut Schema<Self>) {
//!         schema.field("Title", |post| &post.title);
//!     }
//! }
//!
//! #[derive(Clone, Default)]
//! struct Blog {
//!     posts: Vec<Post>,
//! }
//!
//! impl Record for Blog {
//!     fn declare(schema: &mut Schema<Self>) {
//!         schema.field("Posts", |blog| &blog.posts);
//!     }
//! }
//!
//! // A handler is a plain function: its parameters are resolved for each request
//! fn show(post: Ptr<Post>, id: Ptr<Id>, writer: ResponseWriter) {
//!     writer.write(format!("{} {}", id.borrow(), post.borrow().title).as_bytes());
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let blog = Blog {
//!     posts: vec![Post { title: "Hello".into() }],
//! };
//!
//! // Map the resources and the dependencies once
//! let tree = ResourceTree::build(&blog)?;
//! let posts = tree.find("posts").ok_or("no posts resource")?;
//! let handler = Handler::new::<Post, _, _>(show)?;
//! let registry = Registry::builder()
//!     .index(&tree)?
//!     .handler(&tree, posts, &handler)?
//!     .build();
//!
//! // Then serve a request
//! let writer = ResponseWriter::new();
//! let mut ids = IdMap::new();
//! ids.insert::<Post>("1");
//! let mut ctx = Context::new(&registry, Request::new(Vec::new()), &writer, ids);
//! ctx.invoke(&handler)?;
//! assert_eq!(writer.body().as_slice(), b"1 Hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Rust has no runtime reflection on struct fields: each record describes itself once in
//! ```Record::declare```, and this declaration is cached for the whole process.
//!
//! * The ```ResourceTree``` scans a root record into named resources. Each exported field
//!   holding a record, or a sequence of records, becomes a child resource. Circular types,
//!   name collisions and invalid shapes are rejected while building.
//! * The ```Registry``` collects the initial value of every resource, together with the
//!   dependencies reachable from the initializers and from the mapped handlers.
//!   It is built once and shared by all requests.
//! * A ```Context``` is created for each request. It resolves the parameters of a handler
//!   by type, constructing each missing dependency from a fresh copy of its initial value
//!   and running its initializer. Within one request, a type is constructed at most once.
//!
//! Parameters are requested by pointer (```Ptr<T>```, shared for the request), by value
//! (```T```, a copy), or by interface (```Iface<dyn Trait>```, any value declaring this trait).

mod context;
mod dependency;
mod error;
mod inject;
mod record;
mod resource;
mod shape;
mod transport;
mod types;
mod value;

pub use context::Context;
pub use dependency::{Dependency, Registry, RegistryBuilder};
pub use error::{BoxError, BuildError, ResolveError};
pub use inject::{Callable, Handler, Inject, Outputs, Param, ParamSpec};
pub use record::{Initializer, Record, Schema};
pub use resource::{Resource, ResourceId, ResourceTree};
pub use shape::{
    error_type, id_type, is_context_type, is_eligible_shape, is_exported_field,
    is_valid_dependency_type, request_type, response_type, validate_init, validate_param,
};
pub use transport::{Id, IdMap, Request, ResponseWriter};
pub use types::{elem_of, elem_of_sequence, is_sequence, main_elem_of, pointer_of, BaseType, Kind, Ty};
pub use value::{Iface, Instance, Meta, Prototype, Ptr, Reflect, Shape};

#[cfg(test)]
mod tests;
