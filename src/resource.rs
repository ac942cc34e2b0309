//! The resource tree: a record analysed into a hierarchy of addressable resources.
//!
//! Nodes live in an arena and refer to each other with [ResourceId] handles.
//! Every exported field holding a record or a sequence of records becomes a child
//! resource; a sequence resource has a single element resource instead of children.

use std::fmt;

use tracing::trace;

use crate::error::BuildError;
use crate::shape::is_exported_field;
use crate::types::{is_sequence, main_elem_of, pointer_of, Ty};
use crate::value::{Prototype, Reflect, Shape};

/// Handle on a node of a [ResourceTree]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(usize);

pub struct Resource {
    name: String,
    value: Prototype,
    parent: Option<ResourceId>,
    elem: Option<ResourceId>,
    children: Vec<ResourceId>,
    extends: Vec<ResourceId>,
    anonymous: bool,
    tag: String,
    is_slice: bool,
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Initial value, of pointer type
    pub fn value(&self) -> &Prototype {
        &self.value
    }

    pub fn ty(&self) -> &Ty {
        self.value.ty()
    }

    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    /// Element resource of a sequence
    pub fn elem(&self) -> Option<ResourceId> {
        self.elem
    }

    pub fn children(&self) -> &[ResourceId] {
        &self.children
    }

    /// Embedded resources whose children were promoted into this one
    pub fn extends(&self) -> &[ResourceId] {
        &self.extends
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    fn is_type(&self, ty: &Ty) -> bool {
        if ty.is_interface() && self.value.implements(ty) {
            return true;
        }
        self.value.ty() == &pointer_of(ty)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.name, self.value.ty())
    }
}

pub struct ResourceTree {
    nodes: Vec<Resource>,
}

impl ResourceTree {
    /// Build the tree of a root record, named after its type
    pub fn build<V: Reflect>(root: &V) -> Result<Self, BuildError> {
        let name = main_elem_of(&V::ty()).base().to_string();
        Self::build_named(root, &name, "")
    }

    pub fn build_named<V: Reflect>(root: &V, name: &str, tag: &str) -> Result<Self, BuildError> {
        let mut tree = Self { nodes: Vec::new() };
        tree.scan(root.shape(), name, tag, false, None)?;
        Ok(tree)
    }

    pub fn root(&self) -> ResourceId {
        ResourceId(0)
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (ResourceId(idx), node))
    }

    /// Navigate from the root along slash-separated names.
    ///
    /// A name following a sequence resource is looked up in its element.
    pub fn find(&self, path: &str) -> Option<ResourceId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut node = self.get(current)?;
            if let Some(elem) = node.elem {
                node = self.get(elem)?;
            }
            let segment = segment.to_lowercase();
            current = node
                .children
                .iter()
                .copied()
                .find(|&child| self.node(child).name == segment)?;
        }
        Some(current)
    }

    /// Initial value satisfying a type, searched from a node up to the root
    pub fn value_of(&self, from: ResourceId, ty: &Ty) -> Option<Prototype> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.get(id)?;
            if let Some(found) = self.matching_child(node, ty) {
                return Some(found);
            }
            if let Some(elem) = node.elem.map(|elem| self.node(elem)) {
                if elem.is_type(ty) {
                    return Some(elem.value.clone());
                }
                if let Some(found) = self.matching_child(elem, ty) {
                    return Some(found);
                }
            }
            if node.parent.is_none() && node.is_type(ty) {
                return Some(node.value.clone());
            }
            current = node.parent;
        }
        None
    }

    fn matching_child(&self, node: &Resource, ty: &Ty) -> Option<Prototype> {
        node.children
            .iter()
            .map(|&child| self.node(child))
            .find(|child| child.is_type(ty))
            .map(|child| child.value.clone())
    }

    fn node(&self, id: ResourceId) -> &Resource {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.nodes[id.0]
    }

    fn scan(
        &mut self,
        shape: Shape,
        name: &str,
        tag: &str,
        anonymous: bool,
        parent: Option<ResourceId>,
    ) -> Result<ResourceId, BuildError> {
        let (value, elem) = match shape {
            Shape::Record(value) => (value, None),
            Shape::Sequence { value, elem } => (value, Some(elem)),
            Shape::Invalid(ty) => {
                return Err(BuildError::InvalidShape {
                    name: name.to_string(),
                    ty,
                })
            }
        };

        let name = name.to_lowercase();
        if let Some(ancestor) = self.ancestor_of_type(parent, value.ty()) {
            return Err(BuildError::CircularDependency {
                name,
                ty: value.ty().clone(),
                ancestor: ancestor.name.clone(),
                ancestor_ty: ancestor.value.ty().clone(),
            });
        }

        trace!(%name, ty = %value.ty(), "scanning resource");
        let id = ResourceId(self.nodes.len());
        self.nodes.push(Resource {
            name: name.clone(),
            is_slice: is_sequence(value.ty()),
            value: value.clone(),
            parent,
            elem: None,
            children: Vec::new(),
            extends: Vec::new(),
            anonymous,
            tag: tag.to_string(),
        });

        if let Some(elem) = elem {
            let elem = self.scan(Shape::Record(elem), &name, tag, anonymous, Some(id))?;
            self.node_mut(id).elem = Some(elem);
            return Ok(id);
        }

        for field in value.fields() {
            if !is_exported_field(field.name) || !field.shape.is_eligible() {
                continue;
            }
            let child = self.scan(field.shape, field.name, field.tag, field.anonymous, Some(id))?;
            self.add_child(id, child)?;
        }
        Ok(id)
    }

    /// Attach a child to the first non-anonymous ancestor
    fn add_child(&mut self, parent: ResourceId, child: ResourceId) -> Result<(), BuildError> {
        let node = self.node(parent);
        if node.anonymous {
            if let Some(grandparent) = node.parent {
                return self.add_child(grandparent, child);
            }
        }

        if self.node(child).anonymous {
            self.node_mut(parent).extends.push(child);
            return Ok(());
        }

        let name = &self.node(child).name;
        let sibling = self
            .node(parent)
            .children
            .iter()
            .map(|&sibling| self.node(sibling))
            .find(|sibling| &sibling.name == name);
        if let Some(sibling) = sibling {
            return Err(BuildError::NameCollision {
                name: name.clone(),
                first: sibling.value.ty().clone(),
                second: self.node(child).value.ty().clone(),
                parent: self.node(parent).value.ty().clone(),
            });
        }

        self.node_mut(parent).children.push(child);
        Ok(())
    }

    fn ancestor_of_type(&self, mut current: Option<ResourceId>, ty: &Ty) -> Option<&Resource> {
        while let Some(id) = current {
            let node = self.get(id)?;
            if node.value.ty() == ty {
                return Some(node);
            }
            current = node.parent;
        }
        None
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: ResourceId, depth: usize) -> fmt::Result {
        let node = self.node(id);
        writeln!(f, "{:indent$}{}", "", node, indent = depth * 2)?;
        for &child in node.elem.iter().chain(&node.children) {
            self.write_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return Ok(());
        }
        self.write_node(f, self.root(), 0)
    }
}
