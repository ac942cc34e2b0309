//! Canonical type descriptors and the pure functions classifying them.
//!
//! A [Ty] combines a [BaseType] with pointer and sequence wrappers.
//! The unwrapping helpers are order-sensitive: [main_elem_of] strips a pointer,
//! then a sequence, then a pointer again, which is what a
//! `Ptr<Vec<Ptr<Post>>>` needs to reach `Post`.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of the innermost type of a [Ty]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Record,
    Interface,
    Primitive,
    /// Inbound transport object
    Request,
    /// Outbound transport object
    Response,
    Error,
    Id,
}

/// Identity of a concrete type, a trait object or a reserved transport type.
///
/// Two base types are equal when their [TypeId] are equal.
#[derive(Clone, Copy, Debug)]
pub struct BaseType {
    id: TypeId,
    name: &'static str,
    kind: Kind,
}

impl BaseType {
    pub fn of<T: ?Sized + 'static>(kind: Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name, module paths included
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl PartialEq for BaseType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BaseType {}

impl Hash for BaseType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_name(self.name))
    }
}

/// Canonical type: a base type under pointer and sequence wrappers
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Base(BaseType),
    Ptr(Box<Ty>),
    Seq(Box<Ty>),
}

impl Ty {
    pub fn ptr(inner: Ty) -> Self {
        Ty::Ptr(Box::new(inner))
    }

    pub fn seq(inner: Ty) -> Self {
        Ty::Seq(Box::new(inner))
    }

    /// The innermost base type
    pub fn base(&self) -> &BaseType {
        match self {
            Ty::Base(base) => base,
            Ty::Ptr(inner) | Ty::Seq(inner) => inner.base(),
        }
    }

    /// Kind of the innermost base type
    pub fn kind(&self) -> Kind {
        self.base().kind()
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    /// True for a bare (unwrapped) base type of the given kind
    pub fn is_base_of(&self, kind: Kind) -> bool {
        matches!(self, Ty::Base(base) if base.kind() == kind)
    }

    pub fn is_interface(&self) -> bool {
        self.is_base_of(Kind::Interface)
    }

    /// True for `Ptr<Id>`, the only accepted form of an identifier parameter
    pub fn is_id_ref(&self) -> bool {
        matches!(self, Ty::Ptr(inner) if inner.is_base_of(Kind::Id))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Base(base) => write!(f, "{}", base),
            Ty::Ptr(inner) => write!(f, "Ptr<{}>", inner),
            Ty::Seq(inner) => write!(f, "Vec<{}>", inner),
        }
    }
}

/// If the type is a pointer, return the type it points to
pub fn elem_of(ty: &Ty) -> Ty {
    match ty {
        Ty::Ptr(inner) => (**inner).clone(),
        _ => ty.clone(),
    }
}

/// If the type is a sequence, return the type it stores
pub fn elem_of_sequence(ty: &Ty) -> Ty {
    match ty {
        Ty::Seq(inner) => (**inner).clone(),
        _ => ty.clone(),
    }
}

/// Strip a pointer, a sequence and a pointer, in that order
pub fn main_elem_of(ty: &Ty) -> Ty {
    let ty = elem_of(ty);
    let ty = elem_of_sequence(&ty);
    elem_of(&ty)
}

/// If the type is not a pointer, return the pointer to it
pub fn pointer_of(ty: &Ty) -> Ty {
    match ty {
        Ty::Ptr(_) => ty.clone(),
        _ => Ty::ptr(ty.clone()),
    }
}

/// True for a sequence or a pointer to a sequence
pub fn is_sequence(ty: &Ty) -> bool {
    matches!(elem_of(ty), Ty::Seq(_))
}

/// Drop module paths from a type name: `alloc::vec::Vec<blog::Post>` becomes `Vec<Post>`
pub(crate) fn short_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = 0;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment);
            continue;
        }
        out.push(c);
        if !(c.is_alphanumeric() || c == '_') {
            segment = out.len();
        }
    }
    out
}
