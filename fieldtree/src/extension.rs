//! The tree normalizer: pre-population and per-node initialization.
//!
//! A host calls [`CoreExtension::pre_populate`] once on the root, then
//! [`CoreExtension::on_populate`] on every node top-down. Initializing a
//! node reads state its parent received during the parent's own population,
//! so a parent must always be populated before its children.

use std::rc::Rc;

use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::array::sync_field_array;
use crate::error::{FieldTreeError, Result};
use crate::identity::{field_id, IdCounter};
use crate::model::{merge_missing, ModelRef};
use crate::node::{FieldNode, ModelBinding, GROUP_TYPE, TEMPLATE_TYPE};
use crate::options::{FormOptions, SharedOptions};
use crate::registry::FieldRegistry;
use crate::tree::{FieldTree, NodePath};
use crate::wrappers::compose_wrappers;

/// What a child inherits from its parent at initialization time.
struct ParentContext {
    options: Option<SharedOptions>,
    model: Option<ModelRef>,
    index: Option<usize>,
}

/// Normalizes field nodes against a registry, owning the form's id counter.
pub struct CoreExtension {
    registry: Rc<dyn FieldRegistry>,
    ids: IdCounter,
}

impl CoreExtension {
    pub fn new(registry: Rc<dyn FieldRegistry>) -> Self {
        Self {
            registry,
            ids: IdCounter::new(),
        }
    }

    pub fn registry(&self) -> &Rc<dyn FieldRegistry> {
        &self.registry
    }

    /// Id counter values handed out so far.
    pub fn ids_issued(&self) -> u64 {
        self.ids.issued()
    }

    /// Run the field transforms over the root's field group.
    ///
    /// Does nothing for a node that is attached to a parent. Transforms come
    /// from the node's options, falling back to the registry's extras. Each
    /// transform's result replaces the field group; a transform returning
    /// `None` fails the call before any child is touched.
    pub fn pre_populate(&self, tree: &mut FieldTree, path: &NodePath) -> Result<()> {
        let node = tree
            .node_mut(path)
            .ok_or_else(|| FieldTreeError::NodeNotFound {
                path: path.to_string(),
            })?;
        if node.is_attached() {
            return Ok(());
        }

        let options = node.options().cloned();
        let mut transforms = options
            .as_ref()
            .map(|o| o.borrow().field_transforms.clone())
            .unwrap_or_default();
        if transforms.is_empty() {
            transforms = self.registry.extras().field_transforms.clone();
        }
        if transforms.is_empty() {
            return Ok(());
        }

        let model = node
            .model()
            .and_then(|m| m.get())
            .unwrap_or(Value::Null);
        let fallback = FormOptions::default();

        for (position, transform) in transforms.iter().enumerate() {
            let group = node.field_group.clone().unwrap_or_default();
            let replacement = match &options {
                Some(shared) => transform(group, &model, node.form_control.as_ref(), &shared.borrow()),
                None => transform(group, &model, node.form_control.as_ref(), &fallback),
            };
            let Some(replacement) = replacement else {
                return Err(FieldTreeError::FieldTransformReturnedNothing { position });
            };
            if node.field_group.is_some() || !replacement.is_empty() {
                node.field_group = Some(replacement);
            }
        }

        debug!(
            transforms = transforms.len(),
            fields = node.children().len(),
            "applied field transforms"
        );
        Ok(())
    }

    /// Initialize the node at `path`, then attach its children.
    ///
    /// Each child is attached in order and receives the next id counter
    /// value; its parent and index resolve through the tree from then on.
    pub fn on_populate(&mut self, tree: &mut FieldTree, path: &NodePath) -> Result<()> {
        let context = Self::parent_context(tree, path)?;
        let node = tree
            .node_mut(path)
            .ok_or_else(|| FieldTreeError::NodeNotFound {
                path: path.to_string(),
            })?;

        self.init_field_options(node, context)?;

        if let Some(children) = node.field_group.as_mut() {
            for child in children.iter_mut() {
                child.slot = Some(self.ids.next_slot());
            }
            debug!(%path, children = children.len(), "attached children");
        }
        Ok(())
    }

    fn parent_context(tree: &FieldTree, path: &NodePath) -> Result<Option<ParentContext>> {
        let node = tree.node(path).ok_or_else(|| FieldTreeError::NodeNotFound {
            path: path.to_string(),
        })?;
        if path.is_root() || !node.is_attached() {
            return Ok(None);
        }
        Ok(tree.parent(path).map(|parent| ParentContext {
            options: parent.options().cloned(),
            model: parent.model(),
            index: tree.index_of(path),
        }))
    }

    fn init_field_options(&self, node: &mut FieldNode, context: Option<ParentContext>) -> Result<()> {
        let Some(parent) = context else {
            // options and model of a root come from the host
            apply_group_fallback(node);
            return Ok(());
        };

        node.options = parent.options;
        node.binding = parent.model.map(ModelBinding::Inherited);

        let slot = node.slot.unwrap_or_default();
        let id = field_id(&self.registry.extras().id_prefix, slot, node, parent.index);
        trace!(%id, "assigned field id");
        node.id = Some(id);

        node.template_options.get_or_insert_with(Map::new);
        node.model_options.get_or_insert_with(Map::new);
        node.lifecycle.get_or_insert_with(Map::new);

        if node.type_.is_some() && node.has_key() {
            if let (Some(options), Value::Object(base)) = (
                node.template_options.as_mut(),
                json!({"label": "", "placeholder": "", "focus": false}),
            ) {
                merge_missing(options, &base);
            }
        }

        if node.template.is_some() && node.type_.as_deref() != Some(TEMPLATE_TYPE) {
            if let Some(authored) = &node.type_ {
                warn!(
                    key = ?node.key,
                    type_ = %authored,
                    "passing 'type' is not allowed when 'template' is set; using {TEMPLATE_TYPE}"
                );
            }
            node.type_ = Some(TEMPLATE_TYPE.to_string());
        }

        if node.type_.is_some() {
            self.registry.get_merged_field(node)?;
        }

        if node.has_key()
            && node.default_value.is_none()
            && (node.field_group.is_some() || node.field_array.is_some())
        {
            node.default_value = Some(if node.field_array.is_some() {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            });
        }

        if let (Some(default), Some(target)) = (&node.default_value, node.keyed_model()) {
            if target.is_unset() {
                trace!(path = ?target.path(), "seeding model with default value");
                target.assign(default.clone())?;
            }
        }

        node.wrappers = Some(compose_wrappers(node, self.registry.template_manipulators()));

        if node.field_array.is_some() {
            let sync = sync_field_array(node);
            if sync.added > 0 || sync.removed > 0 {
                debug!(
                    key = ?node.key,
                    added = sync.added,
                    removed = sync.removed,
                    "synchronized array field"
                );
            }
        }

        apply_group_fallback(node);
        Ok(())
    }
}

fn apply_group_fallback(node: &mut FieldNode) {
    if node.type_.is_none() && node.field_group.is_some() {
        node.type_ = Some(GROUP_TYPE.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shared_model;
    use crate::registry::{ConfigRegistry, Extras};
    use crate::wrappers::TemplateManipulators;
    use std::cell::RefCell;
    use tracing_test::traced_test;

    /// Registry double: no type defaults, fixed global manipulators.
    struct StaticRegistry {
        manipulators: TemplateManipulators,
        extras: Extras,
        merged: RefCell<Vec<String>>,
    }

    impl StaticRegistry {
        fn new() -> Self {
            Self {
                manipulators: TemplateManipulators::new(),
                extras: Extras::default(),
                merged: RefCell::new(Vec::new()),
            }
        }
    }

    impl FieldRegistry for StaticRegistry {
        fn get_merged_field(&self, node: &mut FieldNode) -> Result<()> {
            self.merged
                .borrow_mut()
                .push(node.type_.clone().unwrap_or_default());
            Ok(())
        }

        fn template_manipulators(&self) -> &TemplateManipulators {
            &self.manipulators
        }

        fn extras(&self) -> &Extras {
            &self.extras
        }
    }

    fn tree(root: FieldNode, model: Value) -> FieldTree {
        FieldTree::new(root, shared_model(model), FormOptions::new().shared())
    }

    fn populate_two_levels(core: &mut CoreExtension, tree: &mut FieldTree) {
        core.on_populate(tree, &NodePath::root()).unwrap();
        let count = tree.root().children().len();
        for i in 0..count {
            core.on_populate(tree, &NodePath::root().child(i)).unwrap();
        }
    }

    #[test]
    fn root_initialization_only_sets_group_type() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new().with_key("a")]),
            json!({}),
        );
        core.on_populate(&mut tree, &NodePath::root()).unwrap();

        let root = tree.root();
        assert_eq!(root.type_.as_deref(), Some(GROUP_TYPE));
        assert!(root.id.is_none());
        assert!(root.template_options.is_none());
        assert!(root.children()[0].is_attached());
        assert_eq!(core.ids_issued(), 1);
    }

    #[test]
    fn child_inherits_options_and_model() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([
                FieldNode::new().with_key("name").with_type("input"),
            ]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);

        let child = &tree.root().children()[0];
        assert!(child.shares_options_with(tree.root()));
        assert!(child.model().unwrap().path().is_empty());
        assert_eq!(child.id.as_deref(), Some("formly_0_input_name_0"));
        assert_eq!(
            child.template_options,
            json!({"label": "", "placeholder": "", "focus": false})
                .as_object()
                .cloned()
        );
        assert_eq!(child.model_options, Some(Map::new()));
        assert_eq!(child.lifecycle, Some(Map::new()));
    }

    #[test]
    fn unattached_node_is_left_alone() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new().with_key("a").with_type("input")]),
            json!({}),
        );
        core.on_populate(&mut tree, &NodePath::root().child(0)).unwrap();
        let child = &tree.root().children()[0];
        assert!(child.id.is_none());
        assert!(child.options().is_none());
    }

    #[test]
    fn authored_template_options_win_over_base() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new()
                .with_key("name")
                .with_type("input")
                .with_template_options(json!({"label": "Name", "required": true}))]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);

        let options = tree.root().children()[0].template_options.clone().unwrap();
        assert_eq!(options["label"], json!("Name"));
        assert_eq!(options["placeholder"], json!(""));
        assert_eq!(options["focus"], json!(false));
        assert_eq!(options["required"], json!(true));
    }

    #[test]
    fn keyless_nodes_get_no_base_template_options() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new().with_type("divider")]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);
        assert_eq!(tree.root().children()[0].template_options, Some(Map::new()));
    }

    #[test]
    fn empty_key_is_treated_as_no_key() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let model = shared_model(json!({"kept": 1}));
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([
                FieldNode::new().with_key("").with_type("input"),
                FieldNode::new()
                    .with_key("")
                    .with_field_group([FieldNode::new().with_key("inner")]),
                FieldNode::new().with_key("").with_default_value(json!("x")),
            ]),
            model.clone(),
            FormOptions::new().shared(),
        );
        populate_two_levels(&mut core, &mut tree);

        let children = tree.root().children();
        assert_eq!(children[0].template_options, Some(Map::new()));
        assert!(children[1].default_value.is_none());
        assert!(children[1].model().unwrap().path().is_empty());
        assert_eq!(*model.borrow(), json!({"kept": 1}));
    }

    #[test]
    fn seeding_far_past_array_end_fails_the_node() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let model = shared_model(json!({"list": []}));
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([FieldNode::new()
                .with_key("list[18446744073709551615]")
                .with_default_value(json!("x"))]),
            model.clone(),
            FormOptions::new().shared(),
        );
        core.on_populate(&mut tree, &NodePath::root()).unwrap();
        let err = core
            .on_populate(&mut tree, &NodePath::root().child(0))
            .unwrap_err();

        assert!(matches!(err, FieldTreeError::IndexOutOfRange { .. }));
        assert_eq!(*model.borrow(), json!({"list": []}));
    }

    #[test]
    #[traced_test]
    fn template_overrides_authored_type_with_warning() {
        let registry = Rc::new(StaticRegistry::new());
        let mut core = CoreExtension::new(registry.clone());
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new()
                .with_type("input")
                .with_template("<p>Hello</p>")]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);

        assert_eq!(tree.root().children()[0].type_.as_deref(), Some(TEMPLATE_TYPE));
        assert_eq!(*registry.merged.borrow(), vec![TEMPLATE_TYPE.to_string()]);
        assert!(logs_contain("passing 'type' is not allowed"));
    }

    #[test]
    #[traced_test]
    fn template_without_type_is_silent() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new().with_template("<hr>")]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);

        let child = &tree.root().children()[0];
        assert_eq!(child.type_.as_deref(), Some(TEMPLATE_TYPE));
        assert_eq!(child.id.as_deref(), Some("formly_0_template__0"));
        assert!(!logs_contain("passing 'type' is not allowed"));
    }

    #[test]
    fn keyed_group_gets_object_default_and_seeds_model() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let model = shared_model(json!({}));
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([FieldNode::new()
                .with_key("address")
                .with_field_group([FieldNode::new().with_key("city")])]),
            model.clone(),
            FormOptions::new().shared(),
        );
        populate_two_levels(&mut core, &mut tree);

        let group = &tree.root().children()[0];
        assert_eq!(group.default_value, Some(json!({})));
        assert_eq!(group.type_.as_deref(), Some(GROUP_TYPE));
        assert_eq!(*model.borrow(), json!({"address": {}}));
        assert_eq!(group.model().unwrap().path().len(), 1);
    }

    #[test]
    fn authored_default_seeds_nested_key_path() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let model = shared_model(json!({"profile": {"name": "Ada"}}));
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([
                FieldNode::new()
                    .with_key("profile.langs[0]")
                    .with_default_value(json!("rust")),
                FieldNode::new()
                    .with_key("profile.name")
                    .with_default_value(json!("nobody")),
            ]),
            model.clone(),
            FormOptions::new().shared(),
        );
        populate_two_levels(&mut core, &mut tree);

        assert_eq!(
            *model.borrow(),
            json!({"profile": {"name": "Ada", "langs": ["rust"]}})
        );
    }

    #[test]
    fn global_manipulators_reach_every_child() {
        let registry = ConfigRegistry::builder()
            .type_option(crate::registry::TypeOption::new("input"))
            .pre_wrapper(|node| node.key.as_ref().map(|_| "form-field".to_string()))
            .build();
        let mut core = CoreExtension::new(Rc::new(registry));
        let mut tree = tree(
            FieldNode::new().with_field_group([
                FieldNode::new().with_key("a").with_type("input").with_wrappers(["panel"]),
                FieldNode::new().with_template("<hr>"),
            ]),
            json!({}),
        );
        populate_two_levels(&mut core, &mut tree);

        let children = tree.root().children();
        assert_eq!(
            children[0].wrappers,
            Some(vec!["form-field".to_string(), "panel".to_string()])
        );
        assert_eq!(children[1].wrappers, Some(Vec::new()));
    }

    #[test]
    fn registry_errors_propagate() {
        let mut core = CoreExtension::new(Rc::new(ConfigRegistry::builder().build()));
        let mut tree = tree(
            FieldNode::new().with_field_group([FieldNode::new().with_key("a").with_type("nope")]),
            json!({}),
        );
        core.on_populate(&mut tree, &NodePath::root()).unwrap();
        let err = core
            .on_populate(&mut tree, &NodePath::root().child(0))
            .unwrap_err();
        assert!(matches!(err, FieldTreeError::UnknownType { .. }));
    }

    #[test]
    fn missing_node_errors() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let mut tree = tree(FieldNode::new(), json!({}));
        let err = core
            .on_populate(&mut tree, &NodePath::from(vec![3]))
            .unwrap_err();
        assert!(matches!(err, FieldTreeError::NodeNotFound { path } if path == "/3"));
    }

    #[test]
    fn transform_replaces_field_group() {
        let core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let options = FormOptions::new()
            .form_state(json!({"extra": "notes"}))
            .field_transform(|mut group, model, _, options| {
                let key = options.form_state["extra"].as_str()?.to_string();
                assert_eq!(model, &json!({"seed": 1}));
                group.push(FieldNode::new().with_key(key));
                Some(group)
            })
            .shared();
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([FieldNode::new().with_key("name")]),
            shared_model(json!({"seed": 1})),
            options,
        );
        core.pre_populate(&mut tree, &NodePath::root()).unwrap();

        let keys: Vec<_> = tree
            .root()
            .children()
            .iter()
            .map(|c| c.key.clone().unwrap())
            .collect();
        assert_eq!(keys, vec!["name", "notes"]);
    }

    #[test]
    fn registry_transforms_apply_when_options_have_none() {
        let mut registry = StaticRegistry::new();
        registry.extras.field_transforms = FormOptions::new()
            .field_transform(|_, _, _, _| Some(vec![FieldNode::new().with_key("from-registry")]))
            .field_transforms;
        let core = CoreExtension::new(Rc::new(registry));
        let mut tree = tree(FieldNode::new().with_field_group([]), json!({}));
        core.pre_populate(&mut tree, &NodePath::root()).unwrap();
        assert_eq!(
            tree.root().children()[0].key.as_deref(),
            Some("from-registry")
        );
    }

    #[test]
    fn transform_returning_none_is_fatal() {
        let core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let options = FormOptions::new()
            .field_transform(|group, _, _, _| Some(group))
            .field_transform(|_, _, _, _| None)
            .shared();
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([FieldNode::new().with_key("a")]),
            shared_model(json!({})),
            options,
        );
        let err = core.pre_populate(&mut tree, &NodePath::root()).unwrap_err();
        assert!(matches!(
            err,
            FieldTreeError::FieldTransformReturnedNothing { position: 1 }
        ));
        assert_eq!(tree.root().children().len(), 1);
    }

    #[test]
    fn pre_populate_skips_attached_nodes() {
        let mut core = CoreExtension::new(Rc::new(StaticRegistry::new()));
        let options = FormOptions::new().field_transform(|_, _, _, _| None).shared();
        let mut tree = FieldTree::new(
            FieldNode::new().with_field_group([FieldNode::new().with_field_group([])]),
            shared_model(json!({})),
            options,
        );
        core.on_populate(&mut tree, &NodePath::root()).unwrap();
        core.pre_populate(&mut tree, &NodePath::root().child(0)).unwrap();
    }
}
