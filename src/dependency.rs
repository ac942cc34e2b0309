//! The registry of dependencies shared by all the requests.
//!
//! It is built once from the resource tree and the mapped handlers, then only read.
//! Lookups by a type which isn't a registered key (an interface, or the value form of
//! a pointer type) are memoized under that type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::error::BuildError;
use crate::inject::{Handler, ParamSpec};
use crate::record::Initializer;
use crate::resource::{ResourceId, ResourceTree};
use crate::shape::{is_context_type, is_valid_dependency_type, validate_init, validate_param};
use crate::types::{pointer_of, Ty};
use crate::value::{Instance, Meta, Prototype, Reflect, Shape};

/// Initial value of a dependency and its initializer
pub struct Dependency {
    value: Prototype,
    meta: Option<Arc<dyn Meta>>,
}

impl Dependency {
    fn new(value: Prototype) -> Self {
        let meta = value.meta();
        Self { value, meta }
    }

    pub fn value(&self) -> &Prototype {
        &self.value
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.meta.as_ref()?.initializer()
    }

    /// A fresh copy of the initial value
    pub fn init(&self) -> Instance {
        self.value.instantiate()
    }

    /// True if this dependency satisfies the type, by interface or by pointer/value equivalence
    pub fn is_type(&self, ty: &Ty) -> bool {
        if ty.is_interface() {
            return self.value.implements(ty);
        }
        self.value.ty() == &pointer_of(ty)
    }
}

pub struct Registry {
    entries: Vec<Dependency>,
    index: RwLock<HashMap<Ty, usize>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.entries.iter()
    }

    /// Find the dependency satisfying a type
    pub fn resolve(&self, ty: &Ty) -> Option<&Dependency> {
        let known = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ty)
            .copied();
        if let Some(idx) = known {
            return self.entries.get(idx);
        }

        let idx = self.entries.iter().position(|entry| entry.is_type(ty))?;
        debug!(%ty, found = %self.entries[idx].value.ty(), "indexing dependency");
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ty.clone(), idx);
        self.entries.get(idx)
    }
}

/// Collect the dependencies before serving requests
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Dependency>,
    index: HashMap<Ty, usize>,
}

impl RegistryBuilder {
    /// Register every resource of the tree and the dependencies of their initializers
    pub fn index(mut self, tree: &ResourceTree) -> Result<Self, BuildError> {
        for (_, resource) in tree.iter() {
            self.insert(resource.value().clone());
        }
        for (id, resource) in tree.iter() {
            if let Some(meta) = resource.value().meta() {
                if let Some(init) = meta.initializer() {
                    self.check_initializer(tree, id, init)?;
                }
            }
        }
        Ok(self)
    }

    /// Register a value which isn't part of the resource tree.
    ///
    /// The parameters of its initializer must be reachable from the other registrations.
    pub fn provide<V: Reflect>(mut self, value: V) -> Result<Self, BuildError> {
        let value = match value.shape().into_prototype() {
            Some(value) => value,
            None => {
                return Err(BuildError::InvalidShape {
                    name: V::ty().to_string(),
                    ty: V::ty(),
                })
            }
        };
        if let Some(meta) = value.meta() {
            if let Some(init) = meta.initializer() {
                let inputs: Vec<Ty> = init.inputs().iter().map(|spec| spec.ty().clone()).collect();
                validate_init(init.owner(), &inputs, init.outputs())?;
                for ty in inputs.iter().skip(1) {
                    validate_param(ty)?;
                }
            }
        }
        self.insert(value);
        Ok(self)
    }

    /// Make the parameters of a handler mapped on the node reachable
    pub fn handler<Ret: 'static>(
        mut self,
        tree: &ResourceTree,
        node: ResourceId,
        handler: &Handler<Ret>,
    ) -> Result<Self, BuildError> {
        for spec in handler.inputs() {
            self.reach(tree, node, spec)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
            index: RwLock::new(self.index),
        }
    }

    /// Add a dependency unless its type is already registered
    fn insert(&mut self, value: Prototype) -> bool {
        if self.index.contains_key(value.ty()) {
            return false;
        }
        trace!(ty = %value.ty(), "registering dependency");
        self.index.insert(value.ty().clone(), self.entries.len());
        self.entries.push(Dependency::new(value));
        true
    }

    fn covers(&self, ty: &Ty) -> bool {
        self.index.contains_key(ty) || self.entries.iter().any(|entry| entry.is_type(ty))
    }

    fn check_initializer(
        &mut self,
        tree: &ResourceTree,
        from: ResourceId,
        init: &Initializer,
    ) -> Result<(), BuildError> {
        let inputs: Vec<Ty> = init.inputs().iter().map(|spec| spec.ty().clone()).collect();
        validate_init(init.owner(), &inputs, init.outputs())?;
        for spec in init.inputs().iter().skip(1) {
            self.reach(tree, from, spec)?;
        }
        Ok(())
    }

    /// Register a value for a parameter type if none satisfies it yet
    fn reach(
        &mut self,
        tree: &ResourceTree,
        from: ResourceId,
        spec: &ParamSpec,
    ) -> Result<(), BuildError> {
        let ty = spec.ty();
        if is_context_type(ty)? {
            return Ok(());
        }
        is_valid_dependency_type(ty)?;
        if self.covers(ty) {
            return Ok(());
        }

        let value = match tree.value_of(from, ty) {
            Some(value) => value,
            None => match spec.blank() {
                Shape::Invalid(_) if ty.is_interface() => {
                    warn!(%ty, "no resource implements this interface");
                    return Ok(());
                }
                shape => shape
                    .into_prototype()
                    .ok_or_else(|| BuildError::Unconstructible(ty.clone()))?,
            },
        };

        if self.insert(value.clone()) {
            if let Some(meta) = value.meta() {
                if let Some(init) = meta.initializer() {
                    self.check_initializer(tree, from, init)?;
                }
            }
        }
        Ok(())
    }
}
