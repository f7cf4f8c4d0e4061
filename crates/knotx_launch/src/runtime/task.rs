//! In-process runtime: modules are tokio tasks sharing the launcher's runtime
//!
//! ```rust,ignore
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl Module for Heartbeat {
//!     async fn run(self: Box<Self>, mut shutdown: watch::Receiver<()>) -> Result<(), ModuleError> {
//!         loop {
//!             tokio::select! {
//!                 _ = shutdown.changed() => break,
//!                 _ = tokio::time::sleep(Duration::from_secs(1)) => log::info!("alive"),
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let runtime = TaskRuntime::new().register("heartbeat", |_ctx| Ok(Box::new(Heartbeat)));
//! ```

use super::{DeployError, DeploymentId, ModuleRuntime, UndeployError};
use crate::config::DeploymentOptions;
use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Context handed to a module factory for each instance
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Module name
    pub name: String,
    /// Zero-based instance index
    pub instance: usize,
    /// The module's `options.config`
    pub config: Value,
}

/// An in-process module instance
#[async_trait]
pub trait Module: Send + 'static {
    /// Run until `shutdown` fires
    async fn run(self: Box<Self>, shutdown: watch::Receiver<()>) -> Result<(), ModuleError>;
}

/// Errors raised by in-process modules
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Module construction failed
    #[error("Init error: {0}")]
    Init(String),

    /// Module failed while running
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Builds one module instance
pub type ModuleFactory =
    Arc<dyn Fn(ModuleContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync>;

struct Deployment {
    name: String,
    shutdown_tx: watch::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// Runtime hosting registered modules as tokio tasks
pub struct TaskRuntime {
    /// Registered factories, in registration order
    factories: IndexMap<String, ModuleFactory>,
    /// Live deployments
    deployments: Mutex<HashMap<DeploymentId, Deployment>>,
    /// How long undeploy waits for instances before aborting them
    shutdown_timeout: Duration,
}

impl Default for TaskRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRuntime {
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
            deployments: Mutex::new(HashMap::new()),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a module factory under `name`
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ModuleContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registered module names
    pub fn modules(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Number of live deployments
    pub async fn deployment_count(&self) -> usize {
        self.deployments.lock().await.len()
    }
}

#[async_trait]
impl ModuleRuntime for TaskRuntime {
    async fn deploy(
        &self,
        name: &str,
        options: &DeploymentOptions,
    ) -> Result<DeploymentId, DeployError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DeployError::UnknownModule(name.to_string()))?;

        // Build every instance before starting any
        let instances = (0..options.instances)
            .map(|instance| {
                factory(ModuleContext {
                    name: name.to_string(),
                    instance,
                    config: options.config.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DeployError::Init {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let tasks = instances
            .into_iter()
            .enumerate()
            .map(|(instance, module)| {
                let label = format!("{}#{}", name, instance);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) = module.run(shutdown).await {
                        log::error!("[{}] Module failed: {}", label, e);
                    }
                })
            })
            .collect();

        let id = DeploymentId::generate();
        self.deployments.lock().await.insert(
            id.clone(),
            Deployment {
                name: name.to_string(),
                shutdown_tx,
                tasks,
            },
        );

        Ok(id)
    }

    async fn undeploy(&self, id: &DeploymentId) -> Result<(), UndeployError> {
        let deployment = self
            .deployments
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| UndeployError::UnknownDeployment(id.clone()))?;

        log::debug!("[{}] Stopping deployment {}", deployment.name, id);
        let _ = deployment.shutdown_tx.send(());

        let aborts: Vec<_> = deployment
            .tasks
            .iter()
            .map(JoinHandle::abort_handle)
            .collect();

        // One deadline for all instances
        if tokio::time::timeout(self.shutdown_timeout, join_all(deployment.tasks))
            .await
            .is_err()
        {
            for handle in aborts {
                handle.abort();
            }
            log::warn!("[{}] Instances did not stop in time, aborted", deployment.name);
            return Err(UndeployError::Timeout(id.clone()));
        }

        Ok(())
    }
}
