//! Loading registry definitions with figment.
//!
//! Sources merge in the order they are added; later sources override earlier
//! ones. Environment variables with the configured prefix come last, with
//! `__` separating nested keys (`FIELDTREE_EXTRAS__ID_PREFIX=form`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use tracing::{debug, trace};

use crate::error::{FieldTreeError, Result};
use crate::registry::RegistryDefinitions;

/// Default prefix for environment overrides.
pub const ENV_PREFIX: &str = "FIELDTREE_";

/// Definitions file format, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionsFormat {
    Toml,
    Yaml,
    Json,
}

impl DefinitionsFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn of(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| FieldTreeError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }
}

/// Collects definition sources and extracts [`RegistryDefinitions`].
#[derive(Debug, Clone)]
pub struct DefinitionsLoader {
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl DefinitionsLoader {
    /// A loader with no files that reads `FIELDTREE_` environment overrides.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }

    /// Add a definitions file. Missing files are skipped by figment.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Read environment overrides with a different prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Ignore the environment entirely.
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Merge every source and extract the definitions.
    pub fn load(&self) -> Result<RegistryDefinitions> {
        let definitions: RegistryDefinitions = self.build_figment()?.extract()?;
        debug!(
            types = definitions.types.len(),
            wrappers = definitions.wrappers.len(),
            "loaded registry definitions"
        );
        Ok(definitions)
    }

    fn build_figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(RegistryDefinitions::default()));

        for path in &self.files {
            trace!("Loading definitions file: {}", path.display());
            figment = match DefinitionsFormat::of(path)? {
                DefinitionsFormat::Toml => figment.merge(Toml::file(path)),
                DefinitionsFormat::Yaml => figment.merge(Yaml::file(path)),
                DefinitionsFormat::Json => figment.merge(Json::file(path)),
            };
        }

        if let Some(prefix) = &self.env_prefix {
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }

        Ok(figment)
    }
}

impl Default for DefinitionsLoader {
    fn default() -> Self {
        Self::new()
    }
}
