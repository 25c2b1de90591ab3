//! Bound form controls as seen from the tree.
//!
//! The control layer belongs to the host. The tree only needs to detach the
//! control of an array element when that element's field is removed.

use std::cell::RefCell;
use std::rc::Rc;

/// A host-side control bound to an array-backed field.
pub trait FieldControl {
    /// Detach the child control at `index`.
    fn remove_at(&mut self, index: usize);
}

/// Shared handle to a host control.
pub type ControlHandle = Rc<RefCell<dyn FieldControl>>;

/// Wrap a control so it can be attached to a field node.
pub fn control_handle<C: FieldControl + 'static>(control: C) -> ControlHandle {
    Rc::new(RefCell::new(control))
}
