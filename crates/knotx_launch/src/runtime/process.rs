//! Child-process runtime: every module instance is a managed process

use super::{DeployError, DeploymentId, ModuleRuntime, UndeployError};
use crate::config::DeploymentOptions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Environment variable carrying the module's `options.config` as JSON
pub const MODULE_CONFIG_ENV: &str = "KNOTX_MODULE_CONFIG";

/// Environment variable carrying the zero-based instance index
pub const MODULE_INSTANCE_ENV: &str = "KNOTX_MODULE_INSTANCE";

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is pending start
    Pending,
    /// Process is running
    Running,
    /// Process has stopped with exit code
    Stopped(Option<i32>),
    /// Process failed to start
    Failed,
}

impl ProcessStatus {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Process name (for logging)
    pub name: String,
    /// Executable path
    pub executable: String,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
}

/// A managed child process
pub struct ManagedProcess {
    /// Process configuration
    pub config: ProcessConfig,
    /// Current status
    pub status: ProcessStatus,
    /// Process ID (if running)
    pub pid: Option<u32>,
    /// Child process handle
    child: Option<Child>,
}

impl ManagedProcess {
    /// Create a new managed process
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessStatus::Pending,
            pid: None,
            child: None,
        }
    }

    /// Start the process; its output is forwarded to the log
    pub fn start(&mut self) -> Result<(), std::io::Error> {
        log::info!("[{}] Starting: {}", self.config.name, self.config.executable);

        let mut cmd = Command::new(&self.config.executable);
        cmd.envs(&self.config.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            self.status = ProcessStatus::Failed;
            log::error!("[{}] Failed to spawn process: {}", self.config.name, e);
            e
        })?;

        self.pid = child.id();
        self.status = ProcessStatus::Running;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(self.config.name.clone(), stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(self.config.name.clone(), stderr, true);
        }

        self.child = Some(child);
        Ok(())
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout).
    /// Returns false if the process had to be killed.
    pub async fn stop(&mut self, timeout: Duration) -> bool {
        let Some(mut child) = self.child.take() else {
            return true;
        };

        log::info!("[{}] Stopping process...", self.config.name);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        let graceful = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                self.status = ProcessStatus::Stopped(status.code());
                log::info!(
                    "[{}] Process exited with code: {:?}",
                    self.config.name,
                    status.code()
                );
                true
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.config.name, e);
                self.status = ProcessStatus::Stopped(None);
                true
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.config.name
                );
                let _ = child.kill().await;
                self.status = ProcessStatus::Stopped(None);
                false
            }
        };

        self.pid = None;
        graceful
    }

    /// Refresh and return the status
    pub fn check_status(&mut self) -> ProcessStatus {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.status = ProcessStatus::Stopped(status.code());
                    self.pid = None;
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "[{}] Error checking process status: {}",
                        self.config.name,
                        e
                    );
                }
            }
        }

        self.status
    }
}

fn forward_lines<T>(name: String, stream: T, is_stderr: bool)
where
    T: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                log::warn!("[{}] {}", name, line);
            } else {
                log::info!("[{}] {}", name, line);
            }
        }
    });
}

/// Runtime that deploys modules as child processes. The module name is the
/// executable; each instance gets its configuration through the environment.
pub struct ProcessRuntime {
    /// Working directory for spawned processes
    working_dir: Option<PathBuf>,
    /// Grace period before a stopping process is killed
    shutdown_timeout: Duration,
    /// Live deployments
    deployments: Mutex<HashMap<DeploymentId, Vec<ManagedProcess>>>,
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new(None, Duration::from_secs(5))
    }
}

impl ProcessRuntime {
    pub fn new(working_dir: Option<PathBuf>, shutdown_timeout: Duration) -> Self {
        Self {
            working_dir,
            shutdown_timeout,
            deployments: Mutex::new(HashMap::new()),
        }
    }

    /// Status of every process of a deployment
    pub async fn status(&self, id: &DeploymentId) -> Option<Vec<ProcessStatus>> {
        let mut deployments = self.deployments.lock().await;
        deployments
            .get_mut(id)
            .map(|processes| processes.iter_mut().map(|p| p.check_status()).collect())
    }

    fn process_config(
        &self,
        name: &str,
        instance: usize,
        options: &DeploymentOptions,
    ) -> ProcessConfig {
        let env = HashMap::from([
            (MODULE_CONFIG_ENV.to_string(), options.config.to_string()),
            (MODULE_INSTANCE_ENV.to_string(), instance.to_string()),
        ]);

        ProcessConfig {
            name: format!("{}#{}", name, instance),
            executable: name.to_string(),
            env,
            working_dir: self.working_dir.clone(),
        }
    }
}

#[async_trait]
impl ModuleRuntime for ProcessRuntime {
    async fn deploy(
        &self,
        name: &str,
        options: &DeploymentOptions,
    ) -> Result<DeploymentId, DeployError> {
        let mut processes: Vec<ManagedProcess> = Vec::with_capacity(options.instances);

        for instance in 0..options.instances {
            let mut process = ManagedProcess::new(self.process_config(name, instance, options));

            if let Err(e) = process.start() {
                // All instances or none
                for started in &mut processes {
                    started.stop(self.shutdown_timeout).await;
                }
                return Err(DeployError::Spawn {
                    name: name.to_string(),
                    source: e,
                });
            }

            processes.push(process);
        }

        let id = DeploymentId::generate();
        self.deployments.lock().await.insert(id.clone(), processes);
        Ok(id)
    }

    async fn undeploy(&self, id: &DeploymentId) -> Result<(), UndeployError> {
        let processes = self
            .deployments
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| UndeployError::UnknownDeployment(id.clone()))?;

        let stops = processes.into_iter().map(|mut process| async move {
            process.stop(self.shutdown_timeout).await
        });
        let graceful = futures::future::join_all(stops).await;

        if graceful.iter().all(|ok| *ok) {
            Ok(())
        } else {
            Err(UndeployError::Timeout(id.clone()))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_deploy_missing_executable() {
        let runtime = ProcessRuntime::default();
        let result = runtime
            .deploy("/nonexistent/knotx-module", &DeploymentOptions::default())
            .await;

        assert!(matches!(result, Err(DeployError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_deploy_and_undeploy_instances() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("module.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let runtime = ProcessRuntime::new(None, Duration::from_secs(2));
        let options = DeploymentOptions {
            instances: 2,
            config: json!({ "port": 8092 }),
        };

        let id = runtime
            .deploy(&script.display().to_string(), &options)
            .await
            .unwrap();
        let status = runtime.status(&id).await.unwrap();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(ProcessStatus::is_running));

        runtime.undeploy(&id).await.unwrap();
        assert!(runtime.status(&id).await.is_none());
        assert!(matches!(
            runtime.undeploy(&id).await,
            Err(UndeployError::UnknownDeployment(_))
        ));
    }

    #[test]
    fn test_process_config_env() {
        let runtime = ProcessRuntime::default();
        let options = DeploymentOptions {
            instances: 1,
            config: json!({ "port": 8092 }),
        };

        let config = runtime.process_config("bin/server", 3, &options);
        assert_eq!(config.name, "bin/server#3");
        assert_eq!(config.env[MODULE_INSTANCE_ENV], "3");
        assert_eq!(config.env[MODULE_CONFIG_ENV], r#"{"port":8092}"#);
    }
}
