use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::dependency::Registry;
use crate::error::ResolveError;
use crate::inject::{Handler, Param};
use crate::shape::{request_type, response_type};
use crate::transport::{IdMap, Request, ResponseWriter};
use crate::types::{pointer_of, Kind, Ty};
use crate::value::Instance;

/// State of a single request.
///
/// The context holds every value resolved so far: within one request, each type is
/// constructed at most once and shared by all the parameters asking for it.
/// Nothing is kept across requests.
pub struct Context<'r> {
    registry: &'r Registry,
    values: Vec<Instance>,
    ids: IdMap,
}

impl<'r> Context<'r> {
    pub fn new(registry: &'r Registry, request: Request, writer: &ResponseWriter, ids: IdMap) -> Self {
        let values = vec![
            Instance::new(Ty::ptr(request_type()), Rc::new(RefCell::new(request)), None),
            Instance::new(response_type(), writer.0.clone(), None),
        ];
        Self {
            registry,
            values,
            ids,
        }
    }

    /// Values resolved so far, in construction order
    pub fn values(&self) -> &[Instance] {
        &self.values
    }

    /// Resolve the parameters of a handler and call it
    pub fn invoke<Ret: 'static>(&mut self, handler: &Handler<Ret>) -> Result<Ret, ResolveError> {
        debug!(owner = %handler.owner(), "invoking handler");
        handler.call(self)
    }

    /// Resolve a single parameter on behalf of the `requester` type
    pub fn argument<P: Param>(&mut self, requester: &Ty) -> Result<P, ResolveError> {
        let instance = self.resolve(&P::param(), requester)?;
        P::extract(instance)
    }

    fn resolve(&mut self, ty: &Ty, requester: &Ty) -> Result<Instance, ResolveError> {
        trace!(%ty, %requester, "resolving");

        if ty.is_interface() {
            if let Some(found) = self.values.iter().find(|value| value.implements(ty)) {
                return Ok(found.clone());
            }
            return self.construct(ty);
        }

        if ty.is_id_ref() {
            let id = self.ids.get(requester).cloned().unwrap_or_default();
            return Ok(Instance::new(ty.clone(), Rc::new(RefCell::new(id)), None));
        }

        match ty {
            Ty::Base(base) if base.kind() == Kind::Record => self.find_or_construct(&pointer_of(ty)),
            Ty::Seq(_) => self.find_or_construct(&pointer_of(ty)),
            Ty::Base(base) if base.kind() == Kind::Response => self.find_or_construct(ty),
            Ty::Ptr(_) => self.find_or_construct(ty),
            _ => Err(ResolveError::Unhandled(ty.clone())),
        }
    }

    fn find_or_construct(&mut self, ty: &Ty) -> Result<Instance, ResolveError> {
        match self.values.iter().find(|value| value.ty() == ty) {
            Some(found) => Ok(found.clone()),
            None => self.construct(ty),
        }
    }

    /// Construct a dependency and its own dependencies, depth first
    fn construct(&mut self, ty: &Ty) -> Result<Instance, ResolveError> {
        let registry = self.registry;
        let dependency = registry.resolve(ty).ok_or_else(|| {
            if ty.is_interface() {
                ResolveError::Unsatisfied(ty.clone())
            } else {
                ResolveError::Unmapped(ty.clone())
            }
        })?;

        debug!(%ty, value = %dependency.value().ty(), "constructing dependency");
        let index = self.values.len();
        self.values.push(dependency.init());

        if let Some(init) = dependency.initializer() {
            if let Some(replacement) = init.run(self)? {
                debug!(owner = %init.owner(), "replacing initial value");
                self.values[index] = replacement;
            }
        }

        Ok(self.values[index].clone())
    }
}
