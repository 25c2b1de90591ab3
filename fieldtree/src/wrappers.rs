//! Wrapper composition.
//!
//! A node's final wrapper chain is assembled from five ordered sources:
//! global pre-wrappers, node-local pre-wrappers, the authored `wrappers`,
//! global post-wrappers and node-local post-wrappers. Manipulators are
//! evaluated against the node, empty results are dropped, and the first
//! occurrence of each name wins.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde_json::Value;

use crate::node::FieldNode;

/// Key under `templateOptions` holding node-local wrapper names.
pub const TEMPLATE_MANIPULATORS_KEY: &str = "templateManipulators";

/// Maps a node to the wrapper it wants, if any.
pub type WrapperManipulator = Rc<dyn Fn(&FieldNode) -> Option<String>>;

/// Ordered pre- and post-wrapper manipulators.
#[derive(Clone, Default)]
pub struct TemplateManipulators {
    pub pre_wrapper: Vec<WrapperManipulator>,
    pub post_wrapper: Vec<WrapperManipulator>,
}

impl TemplateManipulators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-wrapper manipulator.
    pub fn pre<F>(mut self, manipulator: F) -> Self
    where
        F: Fn(&FieldNode) -> Option<String> + 'static,
    {
        self.pre_wrapper.push(Rc::new(manipulator));
        self
    }

    /// Append a post-wrapper manipulator.
    pub fn post<F>(mut self, manipulator: F) -> Self
    where
        F: Fn(&FieldNode) -> Option<String> + 'static,
    {
        self.post_wrapper.push(Rc::new(manipulator));
        self
    }

    /// Append a pre-wrapper that always yields `name`.
    pub fn pre_named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.pre(move |_| Some(name.clone()))
    }

    /// Append a post-wrapper that always yields `name`.
    pub fn post_named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.post(move |_| Some(name.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.pre_wrapper.is_empty() && self.post_wrapper.is_empty()
    }
}

impl fmt::Debug for TemplateManipulators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateManipulators")
            .field("pre_wrapper", &self.pre_wrapper.len())
            .field("post_wrapper", &self.post_wrapper.len())
            .finish()
    }
}

/// Wrapper names authored as plain strings under
/// `templateOptions.templateManipulators.{preWrapper,postWrapper}`.
fn authored_manipulators(node: &FieldNode, slot: &str) -> Vec<String> {
    node.template_options
        .as_ref()
        .and_then(|options| options.get(TEMPLATE_MANIPULATORS_KEY))
        .and_then(|manipulators| manipulators.get(slot))
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn apply(manipulators: &[WrapperManipulator], node: &FieldNode) -> Vec<Option<String>> {
    manipulators.iter().map(|m| m(node)).collect()
}

/// Compute the final wrapper chain for `node`.
pub fn compose_wrappers(node: &FieldNode, global: &TemplateManipulators) -> Vec<String> {
    let local = &node.template_manipulators;

    let global_pre = apply(&global.pre_wrapper, node);
    let local_pre = authored_manipulators(node, "preWrapper")
        .into_iter()
        .map(Some)
        .chain(apply(&local.pre_wrapper, node));
    let authored = node.wrappers.iter().flatten().cloned().map(Some);
    let global_post = apply(&global.post_wrapper, node);
    let local_post = authored_manipulators(node, "postWrapper")
        .into_iter()
        .map(Some)
        .chain(apply(&local.post_wrapper, node));

    let chain: IndexSet<String> = global_pre
        .into_iter()
        .chain(local_pre)
        .chain(authored)
        .chain(global_post)
        .chain(local_post)
        .flatten()
        .filter(|name| !name.is_empty())
        .collect();

    chain.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let global = TemplateManipulators::new().pre_named("A");
        let mut node = FieldNode::new().with_wrappers(["A", "C"]);
        node.template_manipulators = TemplateManipulators::new().pre_named("B").post_named("B");

        assert_eq!(compose_wrappers(&node, &global), vec!["A", "B", "C"]);
    }

    #[test]
    fn source_order_is_fixed() {
        let global = TemplateManipulators::new()
            .pre_named("global-pre")
            .post_named("global-post");
        let mut node = FieldNode::new().with_wrappers(["authored"]);
        node.template_manipulators = TemplateManipulators::new()
            .pre_named("local-pre")
            .post_named("local-post");

        assert_eq!(
            compose_wrappers(&node, &global),
            vec!["global-pre", "local-pre", "authored", "global-post", "local-post"]
        );
    }

    #[test]
    fn manipulators_see_the_node_and_may_decline() {
        let global = TemplateManipulators::new()
            .pre(|node| node.key.as_ref().map(|_| "form-field".to_string()))
            .post(|_| Some(String::new()));

        let keyed = FieldNode::new().with_key("email");
        assert_eq!(compose_wrappers(&keyed, &global), vec!["form-field"]);

        let structural = FieldNode::new();
        assert!(compose_wrappers(&structural, &global).is_empty());
        assert!(!global.is_empty());
        assert!(structural.template_manipulators.is_empty());
    }

    #[test]
    fn authored_template_manipulators_are_read_from_template_options() {
        let node = FieldNode::new()
            .with_wrappers(["panel"])
            .with_template_options(json!({
                "templateManipulators": {
                    "preWrapper": ["label"],
                    "postWrapper": ["help", "label"]
                }
            }));

        assert_eq!(
            compose_wrappers(&node, &TemplateManipulators::new()),
            vec!["label", "panel", "help"]
        );
    }

    #[test]
    fn composing_twice_is_stable() {
        let global = TemplateManipulators::new().pre_named("A").post_named("Z");
        let mut node = FieldNode::new().with_wrappers(["M"]);
        let first = compose_wrappers(&node, &global);
        node.wrappers = Some(first.clone());
        assert_eq!(compose_wrappers(&node, &global), first);
    }
}
