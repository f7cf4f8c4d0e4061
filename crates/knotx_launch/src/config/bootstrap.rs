//! Bootstrap file: the launcher's own configuration, naming the stores the
//! application configuration is retrieved from

use super::{ConfigError, SubstitutionContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Key of the retriever options block in the bootstrap document
pub const RETRIEVER_OPTIONS_KEY: &str = "configRetrieverOptions";

fn default_scan_period() -> i64 {
    5000
}

/// Configuration retriever options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieverOptions {
    /// Change polling period in milliseconds; zero or negative disables polling
    #[serde(default = "default_scan_period")]
    pub scan_period: i64,

    /// Stores, merged in order (later stores override earlier ones)
    #[serde(default)]
    pub stores: Vec<StoreOptions>,
}

/// A single configuration store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreOptions {
    /// Document read from a file
    File {
        #[serde(default)]
        format: Option<StoreFormat>,
        /// A missing or unreadable optional store contributes an empty document
        #[serde(default)]
        optional: bool,
        config: FileStoreConfig,
    },
    /// Document given inline
    Json {
        #[serde(default)]
        config: Map<String, Value>,
    },
}

/// File store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStoreConfig {
    pub path: String,
}

/// File store document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Json,
    Yaml,
}

impl StoreFormat {
    /// Guess the format from a file extension (defaults to JSON)
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => StoreFormat::Yaml,
            _ => StoreFormat::Json,
        }
    }

    /// Parse a document in this format into a JSON object
    pub fn parse(self, content: &str, path: &str) -> Result<Value, ConfigError> {
        let document: Value = match self {
            StoreFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_string(),
                reason: e.to_string(),
            })?,
            StoreFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_string(),
                reason: e.to_string(),
            })?,
        };

        match document {
            Value::Object(_) => Ok(document),
            Value::Null => Ok(Value::Object(Map::new())),
            _ => Err(ConfigError::NotAnObject(path.to_string())),
        }
    }
}

impl RetrieverOptions {
    /// Extract retriever options from the bootstrap document and resolve
    /// placeholders in file store paths
    pub fn from_bootstrap(
        bootstrap: &Value,
        ctx: &SubstitutionContext,
    ) -> Result<Self, ConfigError> {
        let raw = bootstrap
            .get(RETRIEVER_OPTIONS_KEY)
            .filter(|v| v.is_object())
            .ok_or(ConfigError::MissingRetrieverOptions)?;

        let mut options: RetrieverOptions =
            serde_json::from_value(raw.clone()).map_err(ConfigError::InvalidRetrieverOptions)?;

        for store in &mut options.stores {
            if let StoreOptions::File { config, .. } = store {
                config.path = ctx.substitute(&config.path)?;
            }
        }

        Ok(options)
    }

    /// Polling period, if change polling is enabled
    pub fn scan_period(&self) -> Option<std::time::Duration> {
        u64::try_from(self.scan_period)
            .ok()
            .filter(|ms| *ms > 0)
            .map(std::time::Duration::from_millis)
    }
}

/// Load the bootstrap document (YAML or JSON) from a file
pub fn load_bootstrap(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: display.clone(),
        source: e,
    })?;

    // YAML is a superset of JSON, so one parser covers both
    StoreFormat::Yaml.parse(&content, &display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyChain, PropertyRegistry, SystemProperties};
    use serde_json::json;

    fn ctx_with_home(home: &str) -> SubstitutionContext {
        let props = SystemProperties::from_map([("knotx.home".to_string(), home.to_string())].into());
        SubstitutionContext::new(PropertyChain::new(PropertyRegistry::new(props)))
    }

    #[test]
    fn test_file_store_path_resolved() {
        let bootstrap = json!({
            "configRetrieverOptions": {
                "scanPeriod": 250,
                "stores": [
                    { "type": "file", "format": "yaml", "config": { "path": "${KNOTX_HOME}/conf/app.yaml" } },
                    { "type": "json", "config": { "modules": [] } }
                ]
            }
        });

        let options = RetrieverOptions::from_bootstrap(&bootstrap, &ctx_with_home("/opt/app")).unwrap();
        assert_eq!(options.scan_period(), Some(std::time::Duration::from_millis(250)));
        assert_eq!(
            options.stores[0],
            StoreOptions::File {
                format: Some(StoreFormat::Yaml),
                optional: false,
                config: FileStoreConfig {
                    path: "/opt/app/conf/app.yaml".to_string()
                },
            }
        );
        assert!(matches!(options.stores[1], StoreOptions::Json { .. }));
    }

    #[test]
    fn test_missing_retriever_options() {
        let result = RetrieverOptions::from_bootstrap(&json!({}), &ctx_with_home("/opt"));
        assert!(matches!(result, Err(ConfigError::MissingRetrieverOptions)));
    }

    #[test]
    fn test_unknown_store_type() {
        let bootstrap = json!({
            "configRetrieverOptions": { "stores": [ { "type": "consul", "config": {} } ] }
        });
        let result = RetrieverOptions::from_bootstrap(&bootstrap, &ctx_with_home("/opt"));
        assert!(matches!(result, Err(ConfigError::InvalidRetrieverOptions(_))));
    }

    #[test]
    fn test_unresolved_home_is_configuration_error() {
        let bootstrap = json!({
            "configRetrieverOptions": {
                "stores": [ { "type": "file", "config": { "path": "${KNOTX_HOME}/conf/app.conf" } } ]
            }
        });
        let ctx = SubstitutionContext::new(PropertyChain::empty());
        let result = RetrieverOptions::from_bootstrap(&bootstrap, &ctx);
        assert!(matches!(result, Err(ConfigError::Substitution(_))));
    }

    #[test]
    fn test_scan_period_disabled() {
        let bootstrap = json!({ "configRetrieverOptions": { "scanPeriod": 0 } });
        let options = RetrieverOptions::from_bootstrap(&bootstrap, &ctx_with_home("/opt")).unwrap();
        assert_eq!(options.scan_period(), None);
        assert!(options.stores.is_empty());

        let bootstrap = json!({ "configRetrieverOptions": { "scanPeriod": -1 } });
        let options = RetrieverOptions::from_bootstrap(&bootstrap, &ctx_with_home("/opt")).unwrap();
        assert_eq!(options.scan_period(), None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(StoreFormat::from_path("conf/app.yaml"), StoreFormat::Yaml);
        assert_eq!(StoreFormat::from_path("conf/app.yml"), StoreFormat::Yaml);
        assert_eq!(StoreFormat::from_path("conf/app.json"), StoreFormat::Json);
        assert_eq!(StoreFormat::from_path("conf/app"), StoreFormat::Json);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let result = StoreFormat::Json.parse("[1, 2]", "inline");
        assert!(matches!(result, Err(ConfigError::NotAnObject(_))));
    }

    #[test]
    fn test_load_bootstrap_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(
            &path,
            "configRetrieverOptions:\n  stores:\n    - type: file\n      config:\n        path: conf/app.json\n",
        )
        .unwrap();

        let bootstrap = load_bootstrap(&path).unwrap();
        let options = RetrieverOptions::from_bootstrap(&bootstrap, &ctx_with_home("/opt")).unwrap();
        assert_eq!(options.scan_period, 5000);
        assert_eq!(options.stores.len(), 1);
    }
}
