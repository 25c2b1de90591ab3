//! The field tree and positional addressing of its nodes.
//!
//! Nodes never hold a pointer to their parent. A [`NodePath`] (child indexes
//! from the root) addresses every node, and `parent`/`index` are derived from
//! the path whenever they are asked for, so moving a node can never leave a
//! stale back-reference behind.

use std::fmt;

use crate::model::{ModelRef, SharedModel};
use crate::node::FieldNode;
use crate::options::SharedOptions;

/// Position of a node: the child index taken at each level from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of the `index`-th child of this node.
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    /// Path of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    /// Position among siblings, or `None` for the root.
    pub fn index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indexes: Vec<usize>) -> Self {
        Self(indexes)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

/// A field tree bound to one model and one options instance.
#[derive(Debug)]
pub struct FieldTree {
    root: FieldNode,
}

impl FieldTree {
    /// Bind `root` to the host's model and options.
    pub fn new(mut root: FieldNode, model: SharedModel, options: SharedOptions) -> Self {
        root.bind_root(model, options);
        Self { root }
    }

    pub fn root(&self) -> &FieldNode {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut FieldNode {
        &mut self.root
    }

    pub fn into_root(self) -> FieldNode {
        self.root
    }

    pub fn node(&self, path: &NodePath) -> Option<&FieldNode> {
        path.as_slice()
            .iter()
            .try_fold(&self.root, |node, &i| node.field_group.as_ref()?.get(i))
    }

    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut FieldNode> {
        path.as_slice()
            .iter()
            .try_fold(&mut self.root, |node, &i| node.field_group.as_mut()?.get_mut(i))
    }

    /// The node's parent, if the node exists and has been attached to it.
    pub fn parent(&self, path: &NodePath) -> Option<&FieldNode> {
        if !self.node(path)?.is_attached() {
            return None;
        }
        self.node(&path.parent()?)
    }

    /// The node's position among its siblings, if attached.
    pub fn index_of(&self, path: &NodePath) -> Option<usize> {
        self.node(path)?.is_attached().then(|| path.index()).flatten()
    }

    /// The model the node at `path` reads and writes.
    pub fn model_of(&self, path: &NodePath) -> Option<ModelRef> {
        self.node(path)?.model()
    }

    /// Every node path in depth-first pre-order, root first.
    pub fn paths(&self) -> Vec<NodePath> {
        let mut paths = Vec::new();
        collect_paths(&self.root, NodePath::root(), &mut paths);
        paths
    }
}

fn collect_paths(node: &FieldNode, path: NodePath, out: &mut Vec<NodePath>) {
    let children = node.children();
    out.push(path.clone());
    for (i, child) in children.iter().enumerate() {
        collect_paths(child, path.child(i), out);
    }
}
