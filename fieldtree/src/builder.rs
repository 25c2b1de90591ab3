//! Drives the normalizer over a whole tree.

use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::extension::CoreExtension;
use crate::registry::FieldRegistry;
use crate::tree::{FieldTree, NodePath};

/// Builds forms against one registry.
///
/// The builder owns the [`CoreExtension`], so ids stay unique across every
/// build it performs, including rebuilds of the same tree.
pub struct FormBuilder {
    core: CoreExtension,
}

impl FormBuilder {
    pub fn new(registry: Rc<dyn FieldRegistry>) -> Self {
        Self {
            core: CoreExtension::new(registry),
        }
    }

    pub fn core(&self) -> &CoreExtension {
        &self.core
    }

    /// Normalize every node of `tree`.
    ///
    /// The root's field transforms run first. Nodes are then populated
    /// depth-first, each parent before its children; the child count is read
    /// after the parent's initialization so array fields expanded from the
    /// model are populated too.
    pub fn build_form(&mut self, tree: &mut FieldTree) -> Result<()> {
        let root = NodePath::root();
        self.core.pre_populate(tree, &root)?;
        self.populate_subtree(tree, &root)?;
        debug!(ids = self.core.ids_issued(), "form built");
        Ok(())
    }

    fn populate_subtree(&mut self, tree: &mut FieldTree, path: &NodePath) -> Result<()> {
        self.core.on_populate(tree, path)?;
        let count = tree.node(path).map_or(0, |node| node.children().len());
        for index in 0..count {
            self.populate_subtree(tree, &path.child(index))?;
        }
        Ok(())
    }
}
