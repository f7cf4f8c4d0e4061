//! The runtime deploy capability the launcher drives

use super::{DeployError, UndeployError};
use crate::config::DeploymentOptions;
use async_trait::async_trait;
use std::fmt;

/// Opaque handle assigned by a runtime to a successful deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Mint a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeploymentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A runtime able to start and stop modules.
///
/// Both operations may suspend; the launcher issues every deploy of a cycle
/// before awaiting any of them.
#[async_trait]
pub trait ModuleRuntime: Send + Sync {
    /// Start `options.instances` instances of the module called `name`
    async fn deploy(
        &self,
        name: &str,
        options: &DeploymentOptions,
    ) -> Result<DeploymentId, DeployError>;

    /// Stop every instance started by the deployment
    async fn undeploy(&self, id: &DeploymentId) -> Result<(), UndeployError>;
}
