//! Types exchanged with the transport layer.
//!
//! The transport parses the request, extracts identifiers from the path into an
//! [IdMap] and hands both to a new [Context](crate::Context) with a [ResponseWriter].

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use http::header::{HeaderName, HeaderValue};
use http::{Response, StatusCode};

use crate::types::{pointer_of, Ty};
use crate::value::Reflect;

/// The inbound request, handed to handlers as `Ptr<Request>`
pub type Request = http::Request<Vec<u8>>;

/// Sink for the outbound response.
///
/// Clones share the same response: a handler writes into the response the
/// transport will send.
#[derive(Clone)]
pub struct ResponseWriter(pub(crate) Rc<RefCell<Response<Vec<u8>>>>);

impl ResponseWriter {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Response::new(Vec::new()))))
    }

    pub fn set_status(&self, status: StatusCode) {
        *self.0.borrow_mut().status_mut() = status;
    }

    pub fn status(&self) -> StatusCode {
        self.0.borrow().status()
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.0.borrow_mut().headers_mut().insert(name, value);
    }

    /// Append to the response body
    pub fn write(&self, bytes: &[u8]) {
        self.0.borrow_mut().body_mut().extend_from_slice(bytes);
    }

    pub fn body(&self) -> Ref<'_, Vec<u8>> {
        Ref::map(self.0.borrow(), |response| response.body())
    }

    /// Take the response written so far, leaving an empty one behind
    pub fn take(&self) -> Response<Vec<u8>> {
        self.0.replace(Response::new(Vec::new()))
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseWriter").field(&self.status()).finish()
    }
}

/// Identifier of a resource extracted from the request path.
///
/// The empty identifier is handed out when the request didn't address one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse<T: FromStr>(&self) -> Result<T, T::Err> {
        self.0.parse()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifiers of a request, keyed by the type of the resource they address
#[derive(Clone, Debug, Default)]
pub struct IdMap(HashMap<Ty, Id>);

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identifier addressing the resource type `T`
    pub fn insert<T: Reflect>(&mut self, id: impl Into<Id>) -> &mut Self {
        self.insert_ty(&T::ty(), id)
    }

    pub fn insert_ty(&mut self, ty: &Ty, id: impl Into<Id>) -> &mut Self {
        self.0.insert(pointer_of(ty), id.into());
        self
    }

    /// Identifier for a requester type, by pointer or by value
    pub fn get(&self, requester: &Ty) -> Option<&Id> {
        self.0.get(&pointer_of(requester))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
