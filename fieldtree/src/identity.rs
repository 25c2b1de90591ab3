//! Field ids.
//!
//! Every attached node receives one value of a form-scoped counter. The id
//! joins the configured prefix, that value, the node's type, key and sibling
//! index with `_`, leaving a segment empty when the part is missing:
//! `formly_3_input_email_0`.

use crate::node::FieldNode;

/// Monotonically increasing, never-reused id counter for one form.
#[derive(Debug, Default)]
pub struct IdCounter {
    next: u64,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next value.
    pub fn next_slot(&mut self) -> u64 {
        let slot = self.next;
        self.next += 1;
        slot
    }

    /// Number of values handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// Build the id for `node` from its counter slot and sibling index.
pub fn field_id(prefix: &str, slot: u64, node: &FieldNode, index: Option<usize>) -> String {
    let type_ = match (&node.type_, &node.template) {
        (Some(type_), _) => type_.as_str(),
        (None, Some(_)) => "template",
        (None, None) => "",
    };
    let key = node.key.as_deref().unwrap_or("");
    let index = index.map(|i| i.to_string()).unwrap_or_default();
    format!("{prefix}_{slot}_{type_}_{key}_{index}")
}
