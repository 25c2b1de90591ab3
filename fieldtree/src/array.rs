//! Keep an array field's children in step with its model.

use crate::node::FieldNode;

/// What one synchronization pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArraySync {
    pub removed: usize,
    pub added: usize,
}

/// Reconcile `node.field_group` with the length of the node's model array.
///
/// Excess children are removed from the highest index down, detaching the
/// bound control at each index before the field goes. Missing children are
/// appended as detached copies of `field_array`, keyed by their index.
///
/// Nodes without a `field_array`, or whose model is not an array, are left
/// untouched apart from gaining an empty `field_group`.
pub fn sync_field_array(node: &mut FieldNode) -> ArraySync {
    let mut sync = ArraySync::default();
    if node.field_array.is_none() {
        return sync;
    }
    node.field_group.get_or_insert_with(Vec::new);

    let Some(target) = node.model().and_then(|model| model.array_len()) else {
        return sync;
    };

    let FieldNode {
        field_group,
        field_array,
        form_control,
        ..
    } = node;
    let (Some(children), Some(template)) = (field_group.as_mut(), field_array.as_deref()) else {
        return sync;
    };

    while children.len() > target {
        let index = children.len() - 1;
        if let Some(control) = form_control {
            control.borrow_mut().remove_at(index);
        }
        children.truncate(index);
        sync.removed += 1;
    }

    for index in children.len()..target {
        let mut child = template.instantiate();
        child.key = Some(index.to_string());
        children.push(child);
        sync.added += 1;
    }

    sync
}
