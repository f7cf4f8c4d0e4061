//! Runtime errors

use super::DeploymentId;

/// A runtime rejected or failed a deploy call
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module '{name}' failed to initialize: {reason}")]
    Init { name: String, reason: String },

    #[error("Failed to spawn module '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deployment of '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },
}

/// A runtime failed to stop a deployment
#[derive(Debug, thiserror::Error)]
pub enum UndeployError {
    #[error("Unknown deployment: {0}")]
    UnknownDeployment(DeploymentId),

    #[error("Deployment {0} did not stop in time")]
    Timeout(DeploymentId),

    #[error("Failed to undeploy {id}: {reason}")]
    Failed { id: DeploymentId, reason: String },
}
