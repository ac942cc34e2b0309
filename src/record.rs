//! Declared metadata of record types.
//!
//! A record describes itself once in [Record::declare]: its fields, the interfaces it
//! satisfies and its initializer. The resulting [Schema] is cached for the whole process.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::context::Context;
use crate::error::ResolveError;
use crate::inject::{Bound, Callable, Inject, Outputs, ParamSpec, Run};
use crate::types::{pointer_of, BaseType, Kind, Ty};
use crate::value::{FieldShape, Instance, Meta, Prototype, Reflect, Shape, Template};

/// A structured type which can be mapped into resources and dependencies.
///
/// ```
/// # use rescope::*;
/// #[derive(Clone, Default)]
/// struct Comment {
///     body: String,
/// }
/// impl Record for Comment {}
///
/// #[derive(Clone, Default)]
/// struct Post {
///     title: String,
///     comments: Vec<Comment>,
/// }
///
/// impl Record for Post {
///     fn declare(schema: &mut Schema<Self>) {
///         schema
///             .field("Title", |post| &post.title)
///             .field("Comments", |post| &post.comments);
///     }
/// }
/// ```
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Describe the fields, interfaces and initializer of this type
    fn declare(_schema: &mut Schema<Self>) {}
}

struct Field<T> {
    name: &'static str,
    tag: &'static str,
    anonymous: bool,
    shape: Box<dyn Fn(&T) -> Shape + Send + Sync>,
}

struct Interface {
    ty: Ty,
    cast: Box<dyn Fn(Rc<dyn Any>) -> Option<Box<dyn Any>> + Send + Sync>,
}

/// Declared structure of the record type `T`
pub struct Schema<T> {
    fields: Vec<Field<T>>,
    interfaces: Vec<Interface>,
    init: Option<Initializer>,
}

impl<T: Record> Schema<T> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            interfaces: Vec::new(),
            init: None,
        }
    }

    /// Declare a field.
    ///
    /// Only fields whose name starts with an upper-case letter are exported as resources.
    pub fn field<V: Reflect>(&mut self, name: &'static str, get: fn(&T) -> &V) -> &mut Self {
        self.push(name, "", false, get)
    }

    /// Declare a field carrying an opaque tag
    pub fn tagged<V: Reflect>(
        &mut self,
        name: &'static str,
        tag: &'static str,
        get: fn(&T) -> &V,
    ) -> &mut Self {
        self.push(name, tag, false, get)
    }

    /// Declare an embedded field: its own fields are promoted into this record
    pub fn embed<V: Reflect>(&mut self, name: &'static str, get: fn(&T) -> &V) -> &mut Self {
        self.push(name, "", true, get)
    }

    /// Declare that this record satisfies the interface `I`.
    ///
    /// The cast is usually the identity closure `|record| record`, relying on unsized coercion.
    pub fn implements<I: ?Sized + 'static>(
        &mut self,
        cast: fn(Rc<RefCell<T>>) -> Rc<RefCell<I>>,
    ) -> &mut Self {
        let cast = move |value: Rc<dyn Any>| -> Option<Box<dyn Any>> {
            let record = value.downcast::<RefCell<T>>().ok()?;
            Some(Box::new(cast(record)))
        };
        self.interfaces.push(Interface {
            ty: Ty::Base(BaseType::of::<I>(Kind::Interface)),
            cast: Box::new(cast),
        });
        self
    }

    /// Declare the initializer called when a request constructs this record.
    ///
    /// Its first parameter must be the record itself; the others are resolved like
    /// handler parameters. It may return a replacement value and/or an error.
    pub fn init<Args, Out, F>(&mut self, f: F) -> &mut Self
    where
        Args: Inject + 'static,
        Out: Outputs,
        F: Callable<Args, Out> + Send + Sync + 'static,
    {
        self.init = Some(Initializer::new::<T, Args, Out, F>(f));
        self
    }

    fn push<V: Reflect>(
        &mut self,
        name: &'static str,
        tag: &'static str,
        anonymous: bool,
        get: fn(&T) -> &V,
    ) -> &mut Self {
        self.fields.push(Field {
            name,
            tag,
            anonymous,
            shape: Box::new(move |record: &T| get(record).shape()),
        });
        self
    }
}

impl<T: Record> Meta for Schema<T> {
    fn implements(&self, iface: &Ty) -> bool {
        self.interfaces.iter().any(|i| &i.ty == iface)
    }

    fn cast(&self, value: &Rc<dyn Any>, iface: &Ty) -> Option<Box<dyn Any>> {
        let interface = self.interfaces.iter().find(|i| &i.ty == iface)?;
        (interface.cast)(value.clone())
    }

    fn initializer(&self) -> Option<&Initializer> {
        self.init.as_ref()
    }
}

/// Type-erased initializer of a record
pub struct Initializer {
    owner: Ty,
    inputs: Vec<ParamSpec>,
    outputs: Vec<Ty>,
    target: Box<dyn Run>,
}

impl Initializer {
    fn new<T, Args, Out, F>(f: F) -> Self
    where
        T: Record,
        Args: Inject + 'static,
        Out: Outputs,
        F: Callable<Args, Out> + Send + Sync + 'static,
    {
        let owner = pointer_of(&T::ty());
        Self {
            owner: owner.clone(),
            inputs: Args::specs(),
            outputs: Out::types(),
            target: Box::new(Bound::<Args, Out, F>::new(owner, f)),
        }
    }

    pub fn owner(&self) -> &Ty {
        &self.owner
    }

    pub fn inputs(&self) -> &[ParamSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Ty] {
        &self.outputs
    }

    /// Call the initializer, returning the replacement value if it produced one
    pub(crate) fn run(&self, ctx: &mut Context<'_>) -> Result<Option<Instance>, ResolveError> {
        self.target.run(ctx)
    }
}

static SCHEMAS: Lazy<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(Default::default);

/// Obtain the schema of a record type, declaring it on first use
pub(crate) fn schema_of<T: Record>() -> Arc<Schema<T>> {
    let id = TypeId::of::<T>();
    let cached = SCHEMAS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned();
    if let Some(schema) = cached.and_then(|s| s.downcast::<Schema<T>>().ok()) {
        return schema;
    }

    let mut schema = Schema::new();
    T::declare(&mut schema);
    let schema = Arc::new(schema);

    let stored = SCHEMAS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(id)
        .or_insert_with(|| {
            let erased: Arc<dyn Any + Send + Sync> = schema.clone();
            erased
        })
        .clone();
    stored.downcast::<Schema<T>>().unwrap_or(schema)
}

struct RecordTemplate<T> {
    value: T,
    schema: Arc<Schema<T>>,
}

impl<T: Record> Template for RecordTemplate<T> {
    fn instantiate(&self) -> Rc<dyn Any> {
        Rc::new(RefCell::new(self.value.clone()))
    }

    fn fields(&self) -> Vec<FieldShape> {
        self.schema
            .fields
            .iter()
            .map(|field| FieldShape {
                name: field.name,
                tag: field.tag,
                anonymous: field.anonymous,
                shape: (field.shape)(&self.value),
            })
            .collect()
    }

    fn meta(&self) -> Option<Arc<dyn Meta>> {
        let meta: Arc<dyn Meta> = self.schema.clone();
        Some(meta)
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}

impl<T: Record> Reflect for T {
    fn ty() -> Ty {
        Ty::Base(BaseType::of::<T>(Kind::Record))
    }

    fn blank() -> Shape {
        T::default().shape()
    }

    fn shape(&self) -> Shape {
        let template = RecordTemplate {
            value: self.clone(),
            schema: schema_of::<T>(),
        };
        Shape::Record(Prototype::new(T::ty(), Arc::new(template)))
    }

    fn meta() -> Option<Arc<dyn Meta>> {
        let meta: Arc<dyn Meta> = schema_of::<T>();
        Some(meta)
    }
}
