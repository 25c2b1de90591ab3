//! Field tree normalization
//!
//! `fieldtree` takes a declarative tree of form fields, authored by hand or
//! loaded from JSON/YAML, and fills in everything a rendering layer needs
//! before it can bind controls: ids, shared options, model defaults, expanded
//! array children and the final wrapper chain of every node.
//!
//! # Architecture
//!
//! - **Positional tree**: nodes own their children; parents and sibling
//!   indexes are derived from a [`NodePath`], never stored as back-pointers
//! - **Shared state**: one model (`Rc<RefCell<Value>>`) and one options
//!   instance per tree, reached from every node by reference
//! - **Registry seam**: type defaults, wrappers and global manipulators come
//!   from a [`FieldRegistry`]; [`ConfigRegistry`] is the in-memory one, and
//!   [`DefinitionsLoader`] fills it from files and the environment
//! - **Top-down population**: [`FormBuilder`] runs the [`CoreExtension`]
//!   over the root, then every node, parents before children

pub mod array;
pub mod builder;
pub mod config;
pub mod control;
pub mod error;
pub mod extension;
pub mod identity;
pub mod model;
pub mod node;
pub mod options;
pub mod registry;
pub mod tree;
pub mod wrappers;

pub use array::{sync_field_array, ArraySync};
pub use builder::FormBuilder;
pub use config::{DefinitionsFormat, DefinitionsLoader, ENV_PREFIX};
pub use control::{control_handle, ControlHandle, FieldControl};
pub use error::{ErrorSeverity, FieldTreeError, Result};
pub use extension::CoreExtension;
pub use identity::{field_id, IdCounter};
pub use model::{shared_model, ModelRef, PathSegment, SharedModel};
pub use node::{FieldNode, GROUP_TYPE, TEMPLATE_TYPE};
pub use options::{FieldTransform, FormOptions, SharedOptions};
pub use registry::{
    ConfigRegistry, ConfigRegistryBuilder, Extras, FieldRegistry, RegistryDefinitions,
    TypeOption, WrapperOption, DEFAULT_ID_PREFIX,
};
pub use tree::{FieldTree, NodePath};
pub use wrappers::{compose_wrappers, TemplateManipulators, WrapperManipulator};
