//! Configuration errors

use super::SubstitutionError;

/// Errors raised while loading or interpreting configuration.
///
/// Any of these aborts the affected cycle before a module is deployed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing 'configRetrieverOptions' in the main config file")]
    MissingRetrieverOptions,

    #[error("Invalid 'configRetrieverOptions': {0}")]
    InvalidRetrieverOptions(#[source] serde_json::Error),

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("Failed to read configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Configuration '{0}' must be an object")]
    NotAnObject(String),

    #[error("Missing 'modules' array in the configuration")]
    MissingModules,

    #[error("Invalid module declaration: {0}")]
    InvalidModuleDeclaration(String),

    #[error("Invalid options for module '{alias}': {reason}")]
    InvalidModuleOptions { alias: String, reason: String },
}
