//! Field type registry: the configuration the normalizer consults.
//!
//! The normalizer only depends on the [`FieldRegistry`] capability. The
//! bundled [`ConfigRegistry`] keeps type and wrapper definitions in memory
//! with a name index, built through [`ConfigRegistryBuilder`] or from
//! definitions loaded by [`crate::config::DefinitionsLoader`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::control::ControlHandle;
use crate::error::{FieldTreeError, Result};
use crate::model::merge_missing;
use crate::node::{FieldNode, GROUP_TYPE, TEMPLATE_TYPE};
use crate::options::{FieldTransform, FormOptions};
use crate::wrappers::TemplateManipulators;

/// Prefix used for generated ids unless configured otherwise.
pub const DEFAULT_ID_PREFIX: &str = "formly";

fn default_id_prefix() -> String {
    DEFAULT_ID_PREFIX.to_string()
}

/// Registry-wide settings that are not tied to one type.
#[derive(Clone, Serialize, Deserialize)]
pub struct Extras {
    /// First segment of every generated field id.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Transforms applied when the root's options declare none.
    #[serde(skip)]
    pub field_transforms: Vec<FieldTransform>,
}

impl Default for Extras {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            field_transforms: Vec::new(),
        }
    }
}

impl fmt::Debug for Extras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extras")
            .field("id_prefix", &self.id_prefix)
            .field("field_transforms", &self.field_transforms.len())
            .finish()
    }
}

/// A named field type and the defaults it contributes to nodes of that type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeOption {
    pub name: String,
    /// Parent type whose defaults apply underneath this type's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Wrappers given to nodes of this type that author none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wrappers: Vec<String>,
    /// Partial field node (camelCase schema names) merged under authored values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_options: Option<Value>,
}

impl TypeOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            wrappers: Vec::new(),
            default_options: None,
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn wrapper(mut self, name: impl Into<String>) -> Self {
        self.wrappers.push(name.into());
        self
    }

    pub fn default_options(mut self, defaults: Value) -> Self {
        self.default_options = Some(defaults);
        self
    }
}

/// A named wrapper, optionally attached to every node of the listed types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrapperOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

impl WrapperOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn for_type(mut self, type_: impl Into<String>) -> Self {
        self.types.push(type_.into());
        self
    }
}

/// Type, wrapper and extras definitions as they appear in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDefinitions {
    #[serde(default)]
    pub types: Vec<TypeOption>,
    #[serde(default)]
    pub wrappers: Vec<WrapperOption>,
    #[serde(default)]
    pub extras: Extras,
}

/// What the normalizer needs from the configuration registry.
pub trait FieldRegistry {
    /// Apply the type-level defaults for `node.type_` to `node` in place.
    /// Authored values take precedence over registry defaults.
    fn get_merged_field(&self, node: &mut FieldNode) -> Result<()>;

    /// Global wrapper manipulators.
    fn template_manipulators(&self) -> &TemplateManipulators;

    fn extras(&self) -> &Extras;
}

/// Builder for [`ConfigRegistry`]. Created by [`ConfigRegistry::builder`].
///
/// The structural `formly-group` and `formly-template` types are always
/// registered.
pub struct ConfigRegistryBuilder {
    types: Vec<TypeOption>,
    wrappers: Vec<WrapperOption>,
    manipulators: TemplateManipulators,
    extras: Extras,
}

impl ConfigRegistryBuilder {
    fn new() -> Self {
        Self {
            types: vec![TypeOption::new(GROUP_TYPE), TypeOption::new(TEMPLATE_TYPE)],
            wrappers: Vec::new(),
            manipulators: TemplateManipulators::default(),
            extras: Extras::default(),
        }
    }

    /// Register a type. A later type with the same name replaces an earlier one.
    pub fn type_option(mut self, option: TypeOption) -> Self {
        self.types.retain(|existing| existing.name != option.name);
        self.types.push(option);
        self
    }

    /// Register a wrapper.
    pub fn wrapper(mut self, option: WrapperOption) -> Self {
        self.wrappers.push(option);
        self
    }

    /// Register everything from loaded definitions. Extras replace the
    /// configured extras, keeping any field transforms already added.
    pub fn definitions(mut self, definitions: RegistryDefinitions) -> Self {
        for option in definitions.types {
            self = self.type_option(option);
        }
        self.wrappers.extend(definitions.wrappers);
        let mut transforms = std::mem::take(&mut self.extras.field_transforms);
        self.extras = definitions.extras;
        transforms.append(&mut self.extras.field_transforms);
        self.extras.field_transforms = transforms;
        self
    }

    /// Add a global pre-wrapper manipulator.
    pub fn pre_wrapper<F>(mut self, manipulator: F) -> Self
    where
        F: Fn(&FieldNode) -> Option<String> + 'static,
    {
        self.manipulators = self.manipulators.pre(manipulator);
        self
    }

    /// Add a global post-wrapper manipulator.
    pub fn post_wrapper<F>(mut self, manipulator: F) -> Self
    where
        F: Fn(&FieldNode) -> Option<String> + 'static,
    {
        self.manipulators = self.manipulators.post(manipulator);
        self
    }

    /// Add a default field transform.
    pub fn field_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<FieldNode>, &Value, Option<&ControlHandle>, &FormOptions) -> Option<Vec<FieldNode>>
            + 'static,
    {
        self.extras.field_transforms.push(Rc::new(transform));
        self
    }

    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.extras.id_prefix = prefix.into();
        self
    }

    /// Build the registry and its name index.
    pub fn build(self) -> ConfigRegistry {
        let mut types = self.types;

        // Wrappers declared for types append to those types' wrapper lists,
        // creating a bare type when the name is new.
        for wrapper in &self.wrappers {
            for type_name in &wrapper.types {
                match types.iter_mut().find(|t| &t.name == type_name) {
                    Some(option) => {
                        if !option.wrappers.contains(&wrapper.name) {
                            option.wrappers.push(wrapper.name.clone());
                        }
                    }
                    None => types.push(TypeOption::new(type_name.clone()).wrapper(&wrapper.name)),
                }
            }
        }

        let type_index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        let wrapper_index = self
            .wrappers
            .iter()
            .enumerate()
            .map(|(i, w)| (w.name.clone(), i))
            .collect();

        let registry = ConfigRegistry {
            types,
            wrappers: self.wrappers,
            type_index,
            wrapper_index,
            manipulators: self.manipulators,
            extras: self.extras,
        };

        debug!(
            types = registry.types.len(),
            wrappers = registry.wrappers.len(),
            "field registry built"
        );
        registry
    }
}

/// In-memory registry of field types and wrappers.
pub struct ConfigRegistry {
    types: Vec<TypeOption>,
    wrappers: Vec<WrapperOption>,
    type_index: HashMap<String, usize>,
    wrapper_index: HashMap<String, usize>,
    manipulators: TemplateManipulators,
    extras: Extras,
}

impl ConfigRegistry {
    /// Start building a registry.
    ///
    /// ```rust,ignore
    /// let registry = ConfigRegistry::builder()
    ///     .type_option(TypeOption::new("input").wrapper("form-field"))
    ///     .pre_wrapper(|node| node.key.as_ref().map(|_| "label".to_string()))
    ///     .build();
    /// ```
    pub fn builder() -> ConfigRegistryBuilder {
        ConfigRegistryBuilder::new()
    }

    /// Get a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeOption> {
        self.type_index.get(name).map(|&i| &self.types[i])
    }

    /// Get a wrapper by name.
    pub fn get_wrapper(&self, name: &str) -> Option<&WrapperOption> {
        self.wrapper_index.get(name).map(|&i| &self.wrappers[i])
    }

    /// All types, in registration order.
    pub fn all_types(&self) -> &[TypeOption] {
        &self.types
    }

    /// All wrappers, in registration order.
    pub fn all_wrappers(&self) -> &[WrapperOption] {
        &self.wrappers
    }

    /// The type followed by its `extends` ancestors, nearest first.
    fn resolve_chain(&self, name: &str) -> Result<Vec<&TypeOption>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(name);

        while let Some(current) = next {
            if !seen.insert(current) {
                let names: Vec<&str> = chain.iter().map(|t: &&TypeOption| t.name.as_str()).collect();
                return Err(FieldTreeError::CyclicExtends {
                    name: name.to_string(),
                    chain: format!("{} -> {current}", names.join(" -> ")),
                });
            }
            let option = self
                .get_type(current)
                .ok_or_else(|| FieldTreeError::UnknownType {
                    name: current.to_string(),
                })?;
            chain.push(option);
            next = option.extends.as_deref();
        }

        Ok(chain)
    }
}

impl FieldRegistry for ConfigRegistry {
    fn get_merged_field(&self, node: &mut FieldNode) -> Result<()> {
        let Some(type_name) = node.type_.clone() else {
            return Ok(());
        };
        let chain = self.resolve_chain(&type_name)?;

        for option in &chain {
            if let Some(Value::Object(defaults)) = &option.default_options {
                apply_default_options(node, defaults);
            }
        }

        if node.wrappers.as_ref().is_none_or(Vec::is_empty) {
            if let Some(option) = chain.iter().find(|t| !t.wrappers.is_empty()) {
                node.wrappers = Some(option.wrappers.clone());
            }
        }

        trace!(type_ = %type_name, depth = chain.len(), "merged type defaults");
        Ok(())
    }

    fn template_manipulators(&self) -> &TemplateManipulators {
        &self.manipulators
    }

    fn extras(&self) -> &Extras {
        &self.extras
    }
}

/// Merge one type's `default_options` under the node's authored values.
fn apply_default_options(node: &mut FieldNode, defaults: &Map<String, Value>) {
    for (name, value) in defaults {
        match (name.as_str(), value) {
            ("templateOptions", Value::Object(map)) => {
                merge_missing(node.template_options.get_or_insert_with(Map::new), map)
            }
            ("modelOptions", Value::Object(map)) => {
                merge_missing(node.model_options.get_or_insert_with(Map::new), map)
            }
            ("lifecycle", Value::Object(map)) => {
                merge_missing(node.lifecycle.get_or_insert_with(Map::new), map)
            }
            ("defaultValue", value) => {
                node.default_value.get_or_insert_with(|| value.clone());
            }
            ("template", Value::String(template)) => {
                node.template.get_or_insert_with(|| template.clone());
            }
            ("wrappers", Value::Array(_)) if node.wrappers.is_none() => {
                node.wrappers = serde_json::from_value(value.clone()).ok();
            }
            ("fieldGroup", Value::Array(_)) if node.field_group.is_none() => {
                node.field_group = serde_json::from_value(value.clone()).ok();
            }
            ("fieldArray", Value::Object(_)) if node.field_array.is_none() => {
                node.field_array = serde_json::from_value(value.clone()).ok();
            }
            _ => trace!(option = %name, "default option not applied"),
        }
    }
}
