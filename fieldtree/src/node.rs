//! The field node: one entry of the schema tree.
//!
//! Authored attributes (de)serialize with the camelCase names used in form
//! schemas (`fieldGroup`, `templateOptions`, `defaultValue`, ...). Computed
//! state (options binding, model binding, attachment) is skipped by serde and
//! filled in by the normalizer.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::control::ControlHandle;
use crate::model::{parse_key_path, ModelRef, PathSegment, SharedModel};
use crate::options::SharedOptions;
use crate::wrappers::TemplateManipulators;

/// Type given to structural nodes that only hold children.
pub const GROUP_TYPE: &str = "formly-group";

/// Type forced onto nodes that render raw `template` content.
pub const TEMPLATE_TYPE: &str = "formly-template";

/// Where a node's model comes from.
#[derive(Debug, Clone)]
pub(crate) enum ModelBinding {
    /// Supplied by the host for the root node.
    Root(ModelRef),
    /// The parent's model, resolved further by this node's key on access.
    Inherited(ModelRef),
}

/// A node of the field tree.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_group: Option<Vec<FieldNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_array: Option<Box<FieldNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrappers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Node-local wrapper manipulators, applied alongside the names authored
    /// under `templateOptions.templateManipulators`.
    #[serde(skip)]
    pub template_manipulators: TemplateManipulators,
    /// Host control bound to this node.
    #[serde(skip)]
    pub form_control: Option<ControlHandle>,

    #[serde(skip)]
    pub(crate) options: Option<SharedOptions>,
    #[serde(skip)]
    pub(crate) binding: Option<ModelBinding>,
    /// Id counter value handed out when a parent attached this node.
    /// `Some` means the node is attached.
    #[serde(skip)]
    pub(crate) slot: Option<u64>,
}

impl FieldNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    pub fn with_field_group(mut self, children: impl IntoIterator<Item = FieldNode>) -> Self {
        self.field_group = Some(children.into_iter().collect());
        self
    }

    pub fn with_field_array(mut self, template: FieldNode) -> Self {
        self.field_array = Some(Box::new(template));
        self
    }

    pub fn with_wrappers<S: Into<String>>(mut self, wrappers: impl IntoIterator<Item = S>) -> Self {
        self.wrappers = Some(wrappers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set `templateOptions`. Non-object values are ignored.
    pub fn with_template_options(mut self, options: Value) -> Self {
        if let Value::Object(map) = options {
            self.template_options = Some(map);
        }
        self
    }

    pub fn with_template_manipulators(mut self, manipulators: TemplateManipulators) -> Self {
        self.template_manipulators = manipulators;
        self
    }

    pub fn with_form_control(mut self, control: ControlHandle) -> Self {
        self.form_control = Some(control);
        self
    }

    /// Bind the host-supplied model and options. Used for the root node only.
    pub fn bind_root(&mut self, model: SharedModel, options: SharedOptions) {
        self.binding = Some(ModelBinding::Root(ModelRef::root(model)));
        self.options = Some(options);
    }

    /// The tree-wide options this node points at.
    pub fn options(&self) -> Option<&SharedOptions> {
        self.options.as_ref()
    }

    /// True when `self` and `other` point at the same options instance.
    pub fn shares_options_with(&self, other: &FieldNode) -> bool {
        match (&self.options, &other.options) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The model this node reads and writes.
    ///
    /// A keyed container resolves to its own value inside the parent model;
    /// every other node passes the parent model through. Resolution happens
    /// on each call, so a node that gains a `fieldGroup` later sees the
    /// narrower model from then on.
    pub fn model(&self) -> Option<ModelRef> {
        match self.binding.as_ref()? {
            ModelBinding::Root(model) => Some(model.clone()),
            ModelBinding::Inherited(parent) => match (self.key_path(), &self.field_group) {
                (Some(path), Some(_)) => Some(parent.join(&path)),
                _ => Some(parent.clone()),
            },
        }
    }

    /// The value at this node's key inside its parent's model.
    pub(crate) fn keyed_model(&self) -> Option<ModelRef> {
        let path = self.key_path()?;
        match self.binding.as_ref()? {
            ModelBinding::Inherited(parent) => Some(parent.join(&path)),
            ModelBinding::Root(_) => None,
        }
    }

    /// True when the node has a non-empty key. An empty key is no key.
    pub fn has_key(&self) -> bool {
        self.key.as_deref().is_some_and(|key| !key.is_empty())
    }

    fn key_path(&self) -> Option<Vec<PathSegment>> {
        self.key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(parse_key_path)
    }

    /// True once a populated parent has attached this node.
    pub fn is_attached(&self) -> bool {
        self.slot.is_some()
    }

    pub fn children(&self) -> &[FieldNode] {
        self.field_group.as_deref().unwrap_or_default()
    }

    /// A detached deep copy: authored data and local manipulators are kept,
    /// while ids, bindings and the bound control are dropped throughout.
    pub fn instantiate(&self) -> FieldNode {
        let mut copy = self.clone();
        copy.detach();
        copy
    }

    fn detach(&mut self) {
        self.id = None;
        self.form_control = None;
        self.options = None;
        self.binding = None;
        self.slot = None;
        if let Some(children) = self.field_group.as_mut() {
            children.iter_mut().for_each(FieldNode::detach);
        }
        if let Some(template) = self.field_array.as_mut() {
            template.detach();
        }
    }
}

impl fmt::Debug for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldNode")
            .field("key", &self.key)
            .field("type", &self.type_)
            .field("id", &self.id)
            .field("field_group", &self.field_group)
            .field("field_array", &self.field_array)
            .field("template_options", &self.template_options)
            .field("wrappers", &self.wrappers)
            .field("default_value", &self.default_value)
            .field("template", &self.template)
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}
