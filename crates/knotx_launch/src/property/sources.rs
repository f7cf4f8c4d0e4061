//! Concrete property sources

use super::PropertySource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default source: process-level properties, given as `-D key=value` on the
/// command line or injected directly in tests.
#[derive(Debug, Clone, Default)]
pub struct SystemProperties {
    values: HashMap<String, String>,
}

impl SystemProperties {
    /// Build from explicit key/value pairs
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Build from `(key, value)` definitions; later definitions win
    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            values: definitions.into_iter().collect(),
        }
    }
}

impl PropertySource for SystemProperties {
    fn name(&self) -> &str {
        "system"
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}

/// Static in-memory source
#[derive(Debug, Clone)]
pub struct MapPropertySource {
    name: String,
    values: HashMap<String, String>,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}

/// Properties read from a YAML file. Nested mappings are flattened into
/// dotted keys (`knotx: { home: /opt }` becomes `knotx.home`).
#[derive(Debug, Clone)]
pub struct FilePropertySource {
    name: String,
    values: HashMap<String, String>,
}

impl FilePropertySource {
    /// Read and flatten a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PropertyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PropertyError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut source = Self::from_yaml(&content).map_err(|e| match e {
            PropertyError::NotAMapping(_) => PropertyError::NotAMapping(path.to_path_buf()),
            other => other,
        })?;
        source.name = path.display().to_string();
        Ok(source)
    }

    /// Parse a YAML mapping into a flat source
    pub fn from_yaml(content: &str) -> Result<Self, PropertyError> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let mut values = HashMap::new();

        match document {
            serde_yaml::Value::Mapping(_) => flatten("", &document, &mut values),
            serde_yaml::Value::Null => {}
            _ => return Err(PropertyError::NotAMapping(PathBuf::from("<inline>"))),
        }

        Ok(Self {
            name: "<inline>".to_string(),
            values,
        })
    }
}

impl PropertySource for FilePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}

fn flatten(prefix: &str, value: &serde_yaml::Value, out: &mut HashMap<String, String>) {
    use serde_yaml::Value;

    match value {
        Value::Mapping(mapping) => {
            for (key, nested) in mapping {
                let key = match key {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                let full_key = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&full_key, nested, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        // Sequences and tagged values have no flat representation
        Value::Sequence(_) | Value::Tagged(_) => {
            log::debug!("Skipping non-scalar property '{}'", prefix);
        }
    }
}

/// Errors that can occur when loading a property source
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("Failed to read properties file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse properties: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Properties file '{}' must contain a mapping", .0.display())]
    NotAMapping(PathBuf),
}
