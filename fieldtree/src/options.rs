//! Tree-wide form options, shared by reference between every node.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::control::ControlHandle;
use crate::node::FieldNode;

/// Rewrites the root's field group before the tree is populated.
///
/// Receives `(field_group, model, control, options)` and returns the
/// replacement group. Returning `None` aborts population.
pub type FieldTransform =
    Rc<dyn Fn(Vec<FieldNode>, &Value, Option<&ControlHandle>, &FormOptions) -> Option<Vec<FieldNode>>>;

/// The single options instance every node of one tree points at.
pub type SharedOptions = Rc<RefCell<FormOptions>>;

/// Options supplied by the host for one form.
#[derive(Clone, Default)]
pub struct FormOptions {
    /// Free-form state the host wants visible from every field.
    pub form_state: Value,
    /// Transforms applied to the root field group, in order. When empty the
    /// registry's default transforms apply instead.
    pub field_transforms: Vec<FieldTransform>,
}

impl FormOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field transform.
    pub fn field_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<FieldNode>, &Value, Option<&ControlHandle>, &FormOptions) -> Option<Vec<FieldNode>>
            + 'static,
    {
        self.field_transforms.push(Rc::new(transform));
        self
    }

    /// Set the free-form form state.
    pub fn form_state(mut self, state: Value) -> Self {
        self.form_state = state;
        self
    }

    /// Move these options behind a shared handle.
    pub fn shared(self) -> SharedOptions {
        Rc::new(RefCell::new(self))
    }
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("form_state", &self.form_state)
            .field("field_transforms", &self.field_transforms.len())
            .finish()
    }
}
