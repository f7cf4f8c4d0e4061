//! Module descriptors: one record per declared module per deployment cycle

use super::DeploymentId;
use crate::config::{ConfigError, ModuleConfiguration};
use std::fmt;

/// Deployment outcome of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// No deploy attempt has completed yet
    Undeployed,
    /// Deployed; the descriptor carries the deployment id
    Success,
    /// Deploy failed and the module is required
    FailedRequired,
    /// Deploy failed and the module is optional
    FailedOptional,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeploymentState::Undeployed => "UNDEPLOYED",
            DeploymentState::Success => "SUCCESS",
            DeploymentState::FailedRequired => "FAILED_REQUIRED",
            DeploymentState::FailedOptional => "FAILED_OPTIONAL",
        };
        f.write_str(label)
    }
}

/// A declared module and its deployment outcome.
///
/// Descriptors are values: every transition consumes the descriptor and
/// returns a new one. The state leaves `Undeployed` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    name: String,
    alias: String,
    required: bool,
    instances: usize,
    state: DeploymentState,
    deployment_id: Option<DeploymentId>,
}

impl ModuleDescriptor {
    /// Create an undeployed, optional, single-instance descriptor
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            required: false,
            instances: 1,
            state: DeploymentState::Undeployed,
            deployment_id: None,
        }
    }

    /// Parse a declaration line: `alias=name`, or a bare `name` that doubles
    /// as its own alias
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let line = line.trim();

        let (alias, name) = match line.split_once('=') {
            Some((alias, name)) => (alias.trim(), name.trim()),
            None => (line, line),
        };

        if alias.is_empty() || name.is_empty() {
            return Err(ConfigError::InvalidModuleDeclaration(line.to_string()));
        }

        Ok(Self::new(alias, name))
    }

    /// Apply the resolved module configuration
    pub fn with_configuration(self, config: &ModuleConfiguration) -> Self {
        Self {
            required: config.required,
            instances: config.options.instances,
            ..self
        }
    }

    /// Record a successful deployment
    pub fn deployed(self, id: DeploymentId) -> Self {
        debug_assert_eq!(self.state, DeploymentState::Undeployed);
        Self {
            state: DeploymentState::Success,
            deployment_id: Some(id),
            ..self
        }
    }

    /// Record a failed deployment, classified by the required flag
    pub fn failed(self) -> Self {
        debug_assert_eq!(self.state, DeploymentState::Undeployed);
        let state = if self.required {
            DeploymentState::FailedRequired
        } else {
            DeploymentState::FailedOptional
        };
        Self {
            state,
            deployment_id: None,
            ..self
        }
    }

    /// Runtime-loadable module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration alias
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Deployment id, present only in the `Success` state
    pub fn deployment_id(&self) -> Option<&DeploymentId> {
        self.deployment_id.as_ref()
    }

    /// `alias=name`
    pub fn descriptor_line(&self) -> String {
        format!("{}={}", self.alias, self.name)
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} instance(s) of {} [{}]",
            self.state,
            self.instances,
            self.descriptor_line(),
            self.deployment_id
                .as_ref()
                .map(DeploymentId::as_str)
                .unwrap_or("-")
        )
    }
}
