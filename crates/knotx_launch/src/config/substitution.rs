//! Substitution engine for `${NAME}` placeholders in configuration paths
//!
//! `${KNOTX_HOME}` looks up the `knotx.home` property in the property chain,
//! then the `KNOTX_HOME` environment value.

use crate::property::PropertyChain;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching placeholders: ${NAME}
static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").unwrap());

/// Maximum number of passes (property values may contain placeholders themselves)
const MAX_ITERATIONS: usize = 10;

/// Substitution context: property chain plus an environment snapshot
#[derive(Debug, Clone)]
pub struct SubstitutionContext {
    /// Property stores, consulted first
    pub properties: PropertyChain,
    /// Environment variables, consulted when no property matches
    pub env: HashMap<String, String>,
}

impl SubstitutionContext {
    /// Create a context with an empty environment
    pub fn new(properties: PropertyChain) -> Self {
        Self {
            properties,
            env: HashMap::new(),
        }
    }

    /// Create a context over the current process environment
    pub fn from_process(properties: PropertyChain) -> Self {
        Self::new(properties).with_envs(std::env::vars().collect())
    }

    /// Add an environment variable
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Add multiple environment variables
    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.env.extend(envs);
        self
    }

    /// Substitute all placeholders in a string
    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut result = input.to_string();
        let mut last_result = String::new();
        let mut iterations = 0;

        while result != last_result && iterations < MAX_ITERATIONS {
            last_result = result.clone();
            result = self.substitute_once(&result, input)?;
            iterations += 1;
        }

        if iterations >= MAX_ITERATIONS && PLACEHOLDER_PATTERN.is_match(&result) {
            return Err(SubstitutionError::MaxIterationsExceeded(input.to_string()));
        }

        Ok(result)
    }

    /// Perform a single pass of substitution
    fn substitute_once(&self, current: &str, original: &str) -> Result<String, SubstitutionError> {
        let mut error: Option<SubstitutionError> = None;

        let result = PLACEHOLDER_PATTERN.replace_all(current, |caps: &Captures| {
            if error.is_some() {
                return String::new();
            }

            match self.resolve(&caps[1], original) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        });

        if let Some(e) = error {
            return Err(e);
        }

        Ok(result.into_owned())
    }

    /// Resolve a placeholder: property chain first, then environment
    fn resolve(&self, name: &str, original: &str) -> Result<String, SubstitutionError> {
        let property = property_key(name);

        if let Some(value) = self.properties.get(&property) {
            return Ok(value.to_string());
        }

        match self.env.get(name) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(SubstitutionError::UnresolvedPlaceholder {
                placeholder: name.to_string(),
                property,
                input: original.to_string(),
            }),
        }
    }
}

/// Property key for a placeholder name: `KNOTX_HOME` -> `knotx.home`
pub fn property_key(name: &str) -> String {
    name.to_lowercase().replace('_', ".")
}

/// Errors that can occur during substitution
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error(
        "Unable to resolve ${{{placeholder}}} for {input}. \
         System property '{property}', or environment variable '{placeholder}' are not set"
    )]
    UnresolvedPlaceholder {
        placeholder: String,
        property: String,
        input: String,
    },

    #[error("Maximum substitution iterations exceeded for: {0}")]
    MaxIterationsExceeded(String),
}
