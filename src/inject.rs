use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{BoxError, BuildError, ResolveError};
use crate::record::Record;
use crate::shape::{error_type, id_type, request_type, response_type, validate_param};
use crate::transport::{Id, Request, ResponseWriter};
use crate::types::{pointer_of, BaseType, Kind, Ty};
use crate::value::{Iface, Instance, Ptr, Reflect, Shape};

/// Declared type of one parameter, with the means to build an empty value for it
#[derive(Clone, Debug)]
pub struct ParamSpec {
    ty: Ty,
    blank: fn() -> Shape,
}

impl ParamSpec {
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub(crate) fn blank(&self) -> Shape {
        (self.blank)()
    }
}

/// A type which can be requested as a parameter of a handler or an initializer.
///
/// * `Ptr<T>`: the shared value of the request
/// * `T`: a copy of the shared value
/// * `Iface<dyn Trait>`: the first value implementing the interface
/// * `Ptr<Id>`: the identifier addressed by the request
/// * `Ptr<Request>` and `ResponseWriter`: the transport objects
pub trait Param: Sized + 'static {
    /// Canonical type requested by this parameter
    fn param() -> Ty;

    /// Empty value used when the type is not part of the resource tree
    fn empty() -> Shape {
        Shape::Invalid(Self::param())
    }

    /// Convert the resolved value into the parameter
    fn extract(instance: Instance) -> Result<Self, ResolveError>;

    fn spec() -> ParamSpec {
        ParamSpec {
            ty: Self::param(),
            blank: Self::empty,
        }
    }
}

fn mismatch<P: Param>(instance: &Instance) -> ResolveError {
    ResolveError::Mismatch {
        expected: P::param(),
        found: instance.ty().clone(),
    }
}

impl<T: Reflect> Param for Ptr<T> {
    fn param() -> Ty {
        Ty::ptr(T::ty())
    }

    fn empty() -> Shape {
        T::blank()
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        instance
            .downcast::<T>()
            .ok_or_else(|| mismatch::<Self>(&instance))
    }
}

impl<T: Reflect> Param for T {
    fn param() -> Ty {
        T::ty()
    }

    fn empty() -> Shape {
        T::blank()
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        T::copy_from(&instance).ok_or_else(|| mismatch::<Self>(&instance))
    }
}

impl<I: ?Sized + 'static> Param for Iface<I> {
    fn param() -> Ty {
        Ty::Base(BaseType::of::<I>(Kind::Interface))
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        instance
            .cast(&Self::param())
            .and_then(|cast| cast.downcast::<Rc<RefCell<I>>>().ok())
            .map(|rc| Iface(*rc))
            .ok_or_else(|| mismatch::<Self>(&instance))
    }
}

impl Param for Ptr<Id> {
    fn param() -> Ty {
        Ty::ptr(id_type())
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        instance
            .downcast::<Id>()
            .ok_or_else(|| mismatch::<Self>(&instance))
    }
}

impl Param for Ptr<Request> {
    fn param() -> Ty {
        Ty::ptr(request_type())
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        instance
            .downcast::<Request>()
            .ok_or_else(|| mismatch::<Self>(&instance))
    }
}

impl Param for ResponseWriter {
    fn param() -> Ty {
        response_type()
    }

    fn extract(instance: Instance) -> Result<Self, ResolveError> {
        instance
            .downcast_rc()
            .map(ResponseWriter)
            .ok_or_else(|| mismatch::<Self>(&instance))
    }
}

// The following forms are rejected when the handler is mapped.

impl Param for Id {
    fn param() -> Ty {
        id_type()
    }

    fn extract(_instance: Instance) -> Result<Self, ResolveError> {
        Err(ResolveError::Unhandled(Self::param()))
    }
}

impl Param for Request {
    fn param() -> Ty {
        request_type()
    }

    fn extract(_instance: Instance) -> Result<Self, ResolveError> {
        Err(ResolveError::Unhandled(Self::param()))
    }
}

impl Param for Ptr<ResponseWriter> {
    fn param() -> Ty {
        Ty::ptr(response_type())
    }

    fn extract(_instance: Instance) -> Result<Self, ResolveError> {
        Err(ResolveError::Unhandled(Self::param()))
    }
}

/*
 * The following is used to inject up to 10 parameters into any function
 * inspired by https://nickbryan.co.uk/software/using-a-type-map-for-dependency-injection-in-rust/
 */

/// A Callable has a ```call``` function with a single argument and a single return type.
///
/// This trait is implemented for all functions with up to 10 arguments, using a tuple to
/// wrap them all in a single type.
pub trait Callable<Args, Ret> {
    fn call(&self, args: Args) -> Ret;
}

/// A tuple of parameters which can be resolved from a request context
pub trait Inject: Sized {
    /// Declared parameter types, in order
    fn specs() -> Vec<ParamSpec>;

    /// Resolve every parameter in declaration order.
    ///
    /// Identifiers are looked up for the `requester` type.
    fn inject(ctx: &mut Context<'_>, requester: &Ty) -> Result<Self, ResolveError>;
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    // Resolve such tuples for a list of parameter types
    #[allow(clippy::unused_unit)]
    impl<$($param: Param,)*> Inject for ($($param,)*) {
        fn specs() -> Vec<ParamSpec> {
            vec![$($param::spec(),)*]
        }

        #[inline]
        fn inject(
            _ctx: &mut Context<'_>,
            _requester: &Ty,
        ) -> Result<Self, ResolveError> {
            Ok(($(_ctx.argument::<$param>(_requester)?,)*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }

/// Return types accepted from an initializer
pub trait Outputs: Sized + 'static {
    /// Declared output types
    fn types() -> Vec<Ty>;

    /// Extract the replacement value, or the error
    fn settle(self) -> Result<Option<Instance>, BoxError>;
}

impl Outputs for () {
    fn types() -> Vec<Ty> {
        Vec::new()
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        Ok(None)
    }
}

impl<T: Record> Outputs for T {
    fn types() -> Vec<Ty> {
        vec![T::ty()]
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        Ok(Some(Instance::of(Ptr::new(self))))
    }
}

impl<T: Record> Outputs for Ptr<T> {
    fn types() -> Vec<Ty> {
        vec![Ty::ptr(T::ty())]
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        Ok(Some(Instance::of(self)))
    }
}

impl<E: std::error::Error + Send + Sync + 'static> Outputs for Result<(), E> {
    fn types() -> Vec<Ty> {
        vec![error_type()]
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        self.map(|()| None).map_err(BoxError::from)
    }
}

impl<T: Record, E: std::error::Error + Send + Sync + 'static> Outputs for Result<T, E> {
    fn types() -> Vec<Ty> {
        vec![T::ty(), error_type()]
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        self.map(|value| Some(Instance::of(Ptr::new(value))))
            .map_err(BoxError::from)
    }
}

impl<T: Record, E: std::error::Error + Send + Sync + 'static> Outputs for Result<Ptr<T>, E> {
    fn types() -> Vec<Ty> {
        vec![Ty::ptr(T::ty()), error_type()]
    }

    fn settle(self) -> Result<Option<Instance>, BoxError> {
        self.map(|value| Some(Instance::of(value)))
            .map_err(BoxError::from)
    }
}

/// A function bound to the owner type used to look up identifiers
pub(crate) struct Bound<Args, Ret, F> {
    owner: Ty,
    f: F,
    _marker: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret, F> Bound<Args, Ret, F> {
    pub(crate) fn new(owner: Ty, f: F) -> Self {
        Self {
            owner,
            f,
            _marker: PhantomData,
        }
    }
}

impl<Args: Inject, Ret, F: Callable<Args, Ret>> Bound<Args, Ret, F> {
    fn call(&self, ctx: &mut Context<'_>) -> Result<Ret, ResolveError> {
        let args = Args::inject(ctx, &self.owner)?;
        Ok(self.f.call(args))
    }
}

/// Type-erased initializer call
pub(crate) trait Run: Send + Sync {
    fn run(&self, ctx: &mut Context<'_>) -> Result<Option<Instance>, ResolveError>;
}

impl<Args, Out, F> Run for Bound<Args, Out, F>
where
    Args: Inject + 'static,
    Out: Outputs,
    F: Callable<Args, Out> + Send + Sync + 'static,
{
    fn run(&self, ctx: &mut Context<'_>) -> Result<Option<Instance>, ResolveError> {
        self.call(ctx)?
            .settle()
            .map_err(|source| ResolveError::Initializer {
                owner: self.owner.clone(),
                source,
            })
    }
}

trait Invoke<Ret>: Send + Sync {
    fn invoke(&self, ctx: &mut Context<'_>) -> Result<Ret, ResolveError>;
}

impl<Args, Ret, F> Invoke<Ret> for Bound<Args, Ret, F>
where
    Args: Inject + 'static,
    Ret: 'static,
    F: Callable<Args, Ret> + Send + Sync + 'static,
{
    fn invoke(&self, ctx: &mut Context<'_>) -> Result<Ret, ResolveError> {
        self.call(ctx)
    }
}

/// A request handler mapped on a resource.
///
/// The handler is an ordinary function; the resource type `T` owning it is used
/// to look up the identifier of the request.
pub struct Handler<Ret> {
    owner: Ty,
    inputs: Vec<ParamSpec>,
    target: Box<dyn Invoke<Ret>>,
}

impl<Ret: 'static> Handler<Ret> {
    /// Map a function owned by the resource type `T`.
    ///
    /// Fails if a parameter misuses a transport type or is not a valid dependency.
    pub fn new<T, Args, F>(f: F) -> Result<Self, BuildError>
    where
        T: Reflect,
        Args: Inject + 'static,
        F: Callable<Args, Ret> + Send + Sync + 'static,
    {
        let owner = pointer_of(&T::ty());
        let inputs = Args::specs();
        for spec in &inputs {
            validate_param(spec.ty())?;
        }
        Ok(Self {
            owner: owner.clone(),
            inputs,
            target: Box::new(Bound::<Args, Ret, F>::new(owner, f)),
        })
    }

    pub fn owner(&self) -> &Ty {
        &self.owner
    }

    pub fn inputs(&self) -> &[ParamSpec] {
        &self.inputs
    }

    pub(crate) fn call(&self, ctx: &mut Context<'_>) -> Result<Ret, ResolveError> {
        self.target.invoke(ctx)
    }
}
