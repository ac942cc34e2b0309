//! Type-erased values flowing through the tree, the registry and the request context.
//!
//! * A [Prototype] is an immutable template, shared by the resource tree and the registry.
//! * An [Instance] is one resolved value of a request: a fresh `Rc<RefCell<_>>`
//!   created from a prototype, or a transport object.
//! * [Ptr] and [Iface] are the typed handles handed to user functions.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::record::Initializer;
use crate::types::{main_elem_of, pointer_of, BaseType, Kind, Ty};

/// Data types which can be stored in records and scanned into resources.
///
/// Implemented for all [Record](crate::Record) types, for `Vec<T>`, for the nullable
/// pointer `Option<Box<T>>` and for primitive types.
pub trait Reflect: Clone + Send + Sync + 'static {
    /// Canonical type of the implementor
    fn ty() -> Ty;

    /// Shape of an empty value of this type
    fn blank() -> Shape;

    /// Classify this value and capture it as a template when eligible
    fn shape(&self) -> Shape;

    /// Capabilities of the record behind this type, if any
    fn meta() -> Option<Arc<dyn Meta>> {
        None
    }

    /// Copy of the value held by a resolved instance
    fn copy_from(instance: &Instance) -> Option<Self> {
        instance.downcast::<Self>().map(|ptr| ptr.get())
    }
}

/// Runtime classification of a value
pub enum Shape {
    Record(Prototype),
    /// A sequence and the template of its elements
    Sequence { value: Prototype, elem: Prototype },
    Invalid(Ty),
}

impl Shape {
    pub fn is_eligible(&self) -> bool {
        !matches!(self, Shape::Invalid(_))
    }

    pub fn ty(&self) -> Ty {
        match self {
            Shape::Record(value) | Shape::Sequence { value, .. } => value.ty().clone(),
            Shape::Invalid(ty) => ty.clone(),
        }
    }

    pub fn into_prototype(self) -> Option<Prototype> {
        match self {
            Shape::Record(value) | Shape::Sequence { value, .. } => Some(value),
            Shape::Invalid(_) => None,
        }
    }
}

/// Capabilities of a record type, shared by all its values
pub trait Meta: Send + Sync {
    /// True if the record type declared this interface
    fn implements(&self, iface: &Ty) -> bool;

    /// Convert a `Rc<RefCell<Record>>` into a boxed `Rc<RefCell<dyn Interface>>`
    fn cast(&self, value: &Rc<dyn Any>, iface: &Ty) -> Option<Box<dyn Any>>;

    fn initializer(&self) -> Option<&Initializer>;
}

/// A declared field evaluated on a template value
pub(crate) struct FieldShape {
    pub name: &'static str,
    pub tag: &'static str,
    pub anonymous: bool,
    pub shape: Shape,
}

pub(crate) trait Template: Send + Sync {
    /// Deep copy of the template into a new `Rc<RefCell<_>>`
    fn instantiate(&self) -> Rc<dyn Any>;

    fn fields(&self) -> Vec<FieldShape>;

    fn meta(&self) -> Option<Arc<dyn Meta>>;

    fn as_any(&self) -> &dyn Any;
}

/// Immutable template of a record or a sequence, always of pointer type
#[derive(Clone)]
pub struct Prototype {
    ty: Ty,
    template: Arc<dyn Template>,
}

impl Prototype {
    pub(crate) fn new(ty: Ty, template: Arc<dyn Template>) -> Self {
        Self {
            ty: pointer_of(&ty),
            template,
        }
    }

    pub(crate) fn sequence<T: Reflect>(values: Vec<T>) -> Self {
        Self::new(Vec::<T>::ty(), Arc::new(SequenceTemplate(values)))
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    /// Access the template value
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.template.as_any().downcast_ref()
    }

    pub fn implements(&self, iface: &Ty) -> bool {
        self.meta().is_some_and(|meta| meta.implements(iface))
    }

    pub(crate) fn meta(&self) -> Option<Arc<dyn Meta>> {
        self.template.meta()
    }

    pub(crate) fn fields(&self) -> Vec<FieldShape> {
        self.template.fields()
    }

    pub(crate) fn instantiate(&self) -> Instance {
        Instance::new(
            self.ty.clone(),
            self.template.instantiate(),
            self.template.meta(),
        )
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prototype({})", self.ty)
    }
}

struct SequenceTemplate<T>(Vec<T>);

impl<T: Reflect> Template for SequenceTemplate<T> {
    fn instantiate(&self) -> Rc<dyn Any> {
        Rc::new(RefCell::new(self.0.clone()))
    }

    // Sequences are mapped by their element, never by field
    fn fields(&self) -> Vec<FieldShape> {
        Vec::new()
    }

    fn meta(&self) -> Option<Arc<dyn Meta>> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }
}

/// One resolved value of a request context
#[derive(Clone)]
pub struct Instance {
    ty: Ty,
    value: Rc<dyn Any>,
    meta: Option<Arc<dyn Meta>>,
}

impl Instance {
    pub(crate) fn new(ty: Ty, value: Rc<dyn Any>, meta: Option<Arc<dyn Meta>>) -> Self {
        Self { ty, value, meta }
    }

    pub fn of<T: Reflect>(ptr: Ptr<T>) -> Self {
        Self::new(pointer_of(&T::ty()), ptr.0, T::meta())
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    /// Shared handle on the value, if it has the requested type
    pub fn downcast<T: 'static>(&self) -> Option<Ptr<T>> {
        self.value.clone().downcast::<RefCell<T>>().ok().map(Ptr)
    }

    pub(crate) fn downcast_rc<T: 'static>(&self) -> Option<Rc<RefCell<T>>> {
        self.value.clone().downcast::<RefCell<T>>().ok()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn implements(&self, iface: &Ty) -> bool {
        self.meta.as_ref().is_some_and(|meta| meta.implements(iface))
    }

    pub(crate) fn cast(&self, iface: &Ty) -> Option<Box<dyn Any>> {
        self.meta.as_ref()?.cast(&self.value, iface)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.ty)
    }
}

/// Shared handle on a value of the request context.
///
/// Every parameter of type `Ptr<T>` resolved within one request points to the same value.
pub struct Ptr<T>(pub(crate) Rc<RefCell<T>>);

impl<T> Ptr<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl<T: Clone> Ptr<T> {
    /// Copy of the current value
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ptr").field(&self.0.borrow()).finish()
    }
}

/// Shared handle on a value of the request context, seen through one of its interfaces
pub struct Iface<I: ?Sized>(pub(crate) Rc<RefCell<I>>);

impl<I: ?Sized> Iface<I> {
    pub fn borrow(&self) -> Ref<'_, I> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, I> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl<I: ?Sized> Clone for Iface<I> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn ty() -> Ty {
        Ty::seq(T::ty())
    }

    fn blank() -> Shape {
        Vec::<T>::new().shape()
    }

    fn shape(&self) -> Shape {
        let ty = Self::ty();
        if !main_elem_of(&ty).is_base_of(Kind::Record) {
            return Shape::Invalid(ty);
        }
        let elem = match self.first() {
            Some(first) => first.shape(),
            None => T::blank(),
        };
        match elem {
            Shape::Record(elem) => Shape::Sequence {
                value: Prototype::sequence(self.clone()),
                elem,
            },
            _ => Shape::Invalid(ty),
        }
    }
}

/// The nullable pointer: `None` stands for an empty value of the pointee
impl<T: Reflect> Reflect for Option<Box<T>> {
    fn ty() -> Ty {
        pointer_of(&T::ty())
    }

    fn blank() -> Shape {
        T::blank()
    }

    fn shape(&self) -> Shape {
        match self {
            Some(value) => value.shape(),
            None => T::blank(),
        }
    }

    fn meta() -> Option<Arc<dyn Meta>> {
        T::meta()
    }

    // The instance holds the pointee itself
    fn copy_from(instance: &Instance) -> Option<Self> {
        T::copy_from(instance).map(|value| Some(Box::new(value)))
    }
}

macro_rules! reflect_primitive ({ $($prim:ty)* } => {
    $(
    impl Reflect for $prim {
        fn ty() -> Ty {
            Ty::Base(BaseType::of::<$prim>(Kind::Primitive))
        }

        fn blank() -> Shape {
            Shape::Invalid(Self::ty())
        }

        fn shape(&self) -> Shape {
            Shape::Invalid(Self::ty())
        }
    }
    )*
});

reflect_primitive! { String &'static str bool char i8 i16 i32 i64 i128 isize u8 u16 u32 u64 u128 usize f32 f64 }
