//! Test helpers for launcher integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use knotx_launch::{
    ConfigError, ConfigSource, DeployError, DeploymentCycle, DeploymentId, DeploymentOptions,
    Module, ModuleError, ModuleRuntime, UndeployError,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A runtime call, in the order the runtime saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deploy(String),
    Undeploy(String),
}

/// Recording runtime with configurable failures
#[derive(Default)]
pub struct MockRuntime {
    reject: Mutex<HashSet<String>>,
    fail_undeploy: AtomicBool,
    deploy_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Call>>,
    live: Mutex<HashMap<DeploymentId, String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every deploy of `name`
    pub fn reject(&self, name: &str) {
        self.reject.lock().unwrap().insert(name.to_string());
    }

    pub fn accept(&self, name: &str) {
        self.reject.lock().unwrap().remove(name);
    }

    /// Make every undeploy fail (the deployment stays live)
    pub fn fail_undeploys(&self, fail: bool) {
        self.fail_undeploy.store(fail, Ordering::SeqCst);
    }

    /// Delay every deploy by `delay`
    pub fn set_deploy_delay(&self, delay: Duration) {
        *self.deploy_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Names of the live deployments, sorted
    pub fn live(&self) -> Vec<String> {
        let mut names: Vec<_> = self.live.lock().unwrap().values().cloned().collect();
        names.sort();
        names
    }

    /// Highest number of deploy calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleRuntime for MockRuntime {
    async fn deploy(
        &self,
        name: &str,
        _options: &DeploymentOptions,
    ) -> Result<DeploymentId, DeployError> {
        self.calls.lock().unwrap().push(Call::Deploy(name.to_string()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.deploy_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.reject.lock().unwrap().contains(name) {
            return Err(DeployError::Rejected {
                name: name.to_string(),
                reason: "rejected by mock".to_string(),
            });
        }

        let id = DeploymentId::generate();
        self.live
            .lock()
            .unwrap()
            .insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn undeploy(&self, id: &DeploymentId) -> Result<(), UndeployError> {
        let name = self
            .live
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| UndeployError::UnknownDeployment(id.clone()))?;
        self.calls.lock().unwrap().push(Call::Undeploy(name));

        if self.fail_undeploy.load(Ordering::SeqCst) {
            return Err(UndeployError::Failed {
                id: id.clone(),
                reason: "undeploy failed in mock".to_string(),
            });
        }

        self.live.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Config source serving a fixed document; changes are pushed by the test
pub struct StaticConfigSource {
    document: Mutex<Option<Value>>,
    changes: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl StaticConfigSource {
    /// Source and the sender used to push change notifications
    pub fn new(document: Value) -> (Self, mpsc::UnboundedSender<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            document: Mutex::new(Some(document)),
            changes: Mutex::new(Some(rx)),
        };
        (source, tx)
    }

    /// Source whose fetch always fails
    pub fn failing() -> Self {
        Self {
            document: Mutex::new(None),
            changes: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch_current(&self) -> Result<Value, ConfigError> {
        self.document
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConfigError::Io {
                path: "static".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no document"),
            })
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Value> {
        self.changes.lock().unwrap().take().unwrap_or_else(|| {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        })
    }
}

/// In-process module that idles until shutdown
pub struct IdleModule;

#[async_trait]
impl Module for IdleModule {
    async fn run(self: Box<Self>, mut shutdown: watch::Receiver<()>) -> Result<(), ModuleError> {
        let _ = shutdown.changed().await;
        Ok(())
    }
}

/// Wait until the published cycle satisfies `predicate`
pub async fn wait_for_cycle<F>(
    modules: &mut watch::Receiver<Arc<DeploymentCycle>>,
    predicate: F,
) -> Arc<DeploymentCycle>
where
    F: Fn(&DeploymentCycle) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = modules.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            if modules.changed().await.is_err() {
                panic!("launcher dropped");
            }
        }
    })
    .await;

    match result {
        Ok(cycle) => cycle,
        Err(_) => panic!("timed out waiting for cycle"),
    }
}

/// Aliases and states of a cycle, in declaration order
pub fn outcome(cycle: &DeploymentCycle) -> Vec<(String, String)> {
    cycle
        .modules()
        .iter()
        .map(|m| (m.alias().to_string(), m.state().to_string()))
        .collect()
}
