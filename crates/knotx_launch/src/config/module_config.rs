//! Per-module configuration lookup
//!
//! ```yaml
//! modules:
//!   - server=bin/server
//! config:
//!   server:
//!     required: true
//!     options:
//!       instances: 2
//!       config:
//!         port: 8092
//! ```

use super::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the module declaration array
pub const MODULES_KEY: &str = "modules";

/// Key of the per-alias module configuration object
pub const MODULE_CONFIG_KEY: &str = "config";

/// Options handed to the runtime on deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentOptions {
    /// Number of instances to start
    pub instances: usize,
    /// Runtime-specific configuration passed to every instance
    pub config: Value,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            instances: 1,
            config: Value::Object(Map::new()),
        }
    }
}

/// Resolved configuration of one module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleConfiguration {
    /// Deployment options
    pub options: DeploymentOptions,
    /// Whether a deploy failure fails the whole cycle
    pub required: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModuleConfiguration {
    options: DeploymentOptions,
    required: bool,
}

impl ModuleConfiguration {
    /// Look up `config.<alias>` in the document. A missing entry yields
    /// default options and an optional module.
    pub fn for_alias(document: &Value, alias: &str) -> Result<Self, ConfigError> {
        let Some(entry) = document
            .get(MODULE_CONFIG_KEY)
            .and_then(|config| config.get(alias))
            .filter(|entry| !entry.is_null())
        else {
            return Ok(Self::default());
        };

        let raw: RawModuleConfiguration =
            serde_json::from_value(entry.clone()).map_err(|e| ConfigError::InvalidModuleOptions {
                alias: alias.to_string(),
                reason: e.to_string(),
            })?;

        if raw.options.instances == 0 {
            return Err(ConfigError::InvalidModuleOptions {
                alias: alias.to_string(),
                reason: "'instances' must be at least 1".to_string(),
            });
        }

        Ok(Self {
            options: raw.options,
            required: raw.required,
        })
    }
}

/// Read the ordered list of module declaration strings
pub fn module_declarations(document: &Value) -> Result<Vec<String>, ConfigError> {
    let modules = document
        .get(MODULES_KEY)
        .and_then(Value::as_array)
        .ok_or(ConfigError::MissingModules)?;

    modules
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::InvalidModuleDeclaration(entry.to_string()))
        })
        .collect()
}
