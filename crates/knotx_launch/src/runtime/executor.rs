//! Launcher - deploys the configured modules and redeploys them on change

use crate::config::{
    module_declarations, ConfigError, ConfigRetriever, ConfigSource, DeploymentOptions,
    ModuleConfiguration, RetrieverOptions, SubstitutionContext,
};
use crate::runtime::descriptor::{DeploymentState, ModuleDescriptor};
use crate::runtime::error::UndeployError;
use crate::runtime::traits::{DeploymentId, ModuleRuntime};
use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Launcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    /// Not started
    Idle,
    /// Resolving retriever options and fetching configuration
    ConfigLoading,
    /// Deploy calls in flight
    Deploying,
    /// Last cycle completed without required failures
    Running,
    /// Tearing down the live cycle
    Undeploying,
    /// Configuration, fetch or required-module failure
    Failed,
}

/// Descriptors produced by one pass of "parse modules, deploy all, aggregate"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentCycle {
    modules: Vec<ModuleDescriptor>,
}

impl DeploymentCycle {
    pub fn new(modules: Vec<ModuleDescriptor>) -> Self {
        Self { modules }
    }

    /// Descriptors in declaration order
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Look up a descriptor by alias
    pub fn get(&self, alias: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.alias() == alias)
    }

    /// Required modules whose deploy failed
    pub fn failed_required(&self) -> Vec<&ModuleDescriptor> {
        self.modules
            .iter()
            .filter(|m| m.state() == DeploymentState::FailedRequired)
            .collect()
    }

    /// A cycle succeeds unless a required module failed
    pub fn is_success(&self) -> bool {
        self.modules
            .iter()
            .all(|m| m.state() != DeploymentState::FailedRequired)
    }

    /// Successfully deployed modules with their deployment ids
    pub fn deployed(&self) -> impl Iterator<Item = (&ModuleDescriptor, &DeploymentId)> {
        self.modules
            .iter()
            .filter(|m| m.state() == DeploymentState::Success)
            .filter_map(|m| m.deployment_id().map(|id| (m, id)))
    }
}

/// The "Instance modules" report
impl fmt::Display for DeploymentCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for module in &self.modules {
            writeln!(f, "\t\t{}", module)?;
        }
        Ok(())
    }
}

/// A module that could not be undeployed
#[derive(Debug)]
pub struct UndeployFailure {
    pub alias: String,
    pub error: UndeployError,
}

impl fmt::Display for UndeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.alias, self.error)
    }
}

/// Deploys module cycles against a [`ModuleRuntime`].
///
/// The launcher is the single writer of the live cycle; readers get it
/// through [`Launcher::watch_modules`].
pub struct Launcher<R: ModuleRuntime + ?Sized> {
    /// Runtime modules are deployed into
    runtime: Arc<R>,
    /// Lifecycle state
    state: watch::Sender<LauncherState>,
    /// Live cycle
    cycle: watch::Sender<Arc<DeploymentCycle>>,
    /// Configuration change notifications, taken by `run`
    changes: Option<mpsc::UnboundedReceiver<Value>>,
    /// Descriptor count of the last completed deploy cycle
    last_cycle_len: Option<usize>,
    /// Number of teardowns performed by redeploys; the first one tears down
    /// the cycle deployed by `start`
    teardowns: usize,
}

impl<R: ModuleRuntime + ?Sized> Launcher<R> {
    /// Create an idle launcher
    pub fn new(runtime: Arc<R>) -> Self {
        let (state, _) = watch::channel(LauncherState::Idle);
        let (cycle, _) = watch::channel(Arc::new(DeploymentCycle::default()));

        Self {
            runtime,
            state,
            cycle,
            changes: None,
            last_cycle_len: None,
            teardowns: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LauncherState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<LauncherState> {
        self.state.subscribe()
    }

    /// The live cycle
    pub fn modules(&self) -> Arc<DeploymentCycle> {
        self.cycle.borrow().clone()
    }

    /// Subscribe to live cycle changes
    pub fn watch_modules(&self) -> watch::Receiver<Arc<DeploymentCycle>> {
        self.cycle.subscribe()
    }

    fn set_state(&self, state: LauncherState) {
        log::debug!("Launcher state: {:?}", state);
        self.state.send_replace(state);
    }

    fn fail(&self, error: LaunchError) -> LaunchError {
        self.set_state(LauncherState::Failed);
        error
    }

    /// Resolve retriever options from the bootstrap document, then start
    /// from the resulting store-backed retriever
    pub async fn start_from_bootstrap(
        &mut self,
        bootstrap: &Value,
        ctx: &SubstitutionContext,
    ) -> Result<ConfigRetriever, LaunchError> {
        self.set_state(LauncherState::ConfigLoading);

        let options = RetrieverOptions::from_bootstrap(bootstrap, ctx)
            .map_err(|e| self.fail(LaunchError::Config(e)))?;
        let retriever = ConfigRetriever::new(options);

        self.start(&retriever).await?;
        Ok(retriever)
    }

    /// Subscribe to configuration changes, fetch the current document and
    /// deploy the first cycle.
    ///
    /// Fails if the fetch fails, the document is malformed, or any required
    /// module failed to deploy. Modules that did deploy stay running.
    pub async fn start<S: ConfigSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(), LaunchError> {
        self.set_state(LauncherState::ConfigLoading);
        self.changes = Some(source.subscribe());

        let document = match source.fetch_current().await {
            Ok(document) => document,
            Err(e) => {
                log::error!("Unable to start Knot.x: {}", e);
                return Err(self.fail(LaunchError::Fetch(e)));
            }
        };

        let cycle = self.deploy_cycle(&document).await?;

        if cycle.is_success() {
            log::info!("Knot.x STARTED successfully");
            Ok(())
        } else {
            log::error!("Knot.x start FAILED: some mandatory modules deployment failed");
            Err(LaunchError::RequiredModulesFailed(
                cycle.failed_required().into_iter().cloned().collect(),
            ))
        }
    }

    /// Deploy every module declared in `document` and publish the resulting
    /// cycle. Per-module failures are contained in the descriptors.
    pub async fn deploy_cycle(
        &mut self,
        document: &Value,
    ) -> Result<Arc<DeploymentCycle>, LaunchError> {
        log::info!("STARTING Knot.x {}", env!("CARGO_PKG_VERSION"));
        self.set_state(LauncherState::Deploying);

        let planned = plan_cycle(document).map_err(|e| self.fail(LaunchError::Config(e)))?;

        let attempts = planned
            .into_iter()
            .map(|(descriptor, options)| self.deploy_module(descriptor, options));
        let cycle = Arc::new(DeploymentCycle::new(join_all(attempts).await));

        log::info!("Instance modules: {}", cycle);

        self.last_cycle_len = Some(cycle.len());
        self.cycle.send_replace(cycle.clone());
        self.set_state(if cycle.is_success() {
            LauncherState::Running
        } else {
            LauncherState::Failed
        });

        Ok(cycle)
    }

    /// Single deploy attempt
    async fn deploy_module(
        &self,
        descriptor: ModuleDescriptor,
        options: DeploymentOptions,
    ) -> ModuleDescriptor {
        log::debug!(
            "[{}] Deploying {} instance(s) of {}",
            descriptor.alias(),
            options.instances,
            descriptor.name()
        );

        match self.runtime.deploy(descriptor.name(), &options).await {
            Ok(id) => descriptor.deployed(id),
            Err(e) => {
                log::error!(
                    "[{}] Can't deploy {}: {}",
                    descriptor.alias(),
                    descriptor.descriptor_line(),
                    e
                );
                descriptor.failed()
            }
        }
    }

    /// Undeploy every deployed module of the live cycle, concurrently.
    /// Returns the modules that failed to stop.
    async fn undeploy_live(&self) -> Vec<UndeployFailure> {
        self.set_state(LauncherState::Undeploying);
        let live = self.modules();

        let attempts = live.deployed().map(|(module, id)| async move {
            log::debug!("[{}] Undeploying {}", module.alias(), id);
            self.runtime
                .undeploy(id)
                .await
                .map_err(|error| UndeployFailure {
                    alias: module.alias().to_string(),
                    error,
                })
        });

        let failures: Vec<UndeployFailure> = join_all(attempts)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        for failure in &failures {
            log::error!("[{}] Unable to undeploy: {}", failure.alias, failure.error);
        }

        self.cycle.send_replace(Arc::new(DeploymentCycle::default()));
        failures
    }

    /// Tear down the live cycle and deploy a new one from `document`.
    ///
    /// Ignored until a deploy cycle has produced descriptors. Undeploy
    /// failures are fatal only while tearing down the cycle deployed by
    /// [`Launcher::start`], however late the first change arrives; the new
    /// cycle is then skipped and the launcher is `Failed`. Failures in any
    /// later teardown are logged and the new cycle is deployed anyway.
    pub async fn redeploy(
        &mut self,
        document: Value,
    ) -> Result<Arc<DeploymentCycle>, LaunchError> {
        if self.last_cycle_len.unwrap_or(0) == 0 {
            log::debug!("Configuration changed but no modules were deployed yet, ignoring");
            return Ok(self.modules());
        }

        log::warn!("Configuration changed - Re-deploying Knot.x");
        let failures = self.undeploy_live().await;
        self.teardowns += 1;

        if !failures.is_empty() && self.teardowns == 1 {
            log::error!("Unable to undeploy modules");
            return Err(self.fail(LaunchError::Teardown(failures)));
        }

        log::warn!("Knot.x STOPPED.");
        self.deploy_cycle(&document).await
    }

    /// React to configuration changes until `shutdown` fires.
    ///
    /// Redeploys run one at a time; notifications that arrive during a
    /// redeploy are coalesced to the latest document.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<()>) -> Result<(), LaunchError> {
        let mut changes = self.changes.take().ok_or(LaunchError::NotStarted)?;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("Shutdown signal received");
                    break;
                }

                document = changes.recv() => {
                    let Some(mut document) = document else {
                        log::debug!("Configuration change stream closed");
                        let _ = shutdown.changed().await;
                        break;
                    };

                    while let Ok(newer) = changes.try_recv() {
                        document = newer;
                    }

                    match self.redeploy(document).await {
                        Ok(cycle) if !cycle.is_success() => {
                            log::error!(
                                "Re-deploy FAILED: some mandatory modules deployment failed"
                            );
                        }
                        Ok(_) => {}
                        Err(e @ LaunchError::Teardown(_)) => return Err(e),
                        Err(e) => log::error!("Re-deploy failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }

    /// Undeploy the live cycle (best effort) and return to idle
    pub async fn shutdown(&mut self) {
        log::info!("Shutting down all modules...");

        let failures = self.undeploy_live().await;
        if !failures.is_empty() {
            log::warn!("{} module(s) could not be undeployed", failures.len());
        }

        self.changes = None;
        self.set_state(LauncherState::Idle);
        log::info!("Knot.x STOPPED.");
    }
}

/// Parse the module list and resolve each module's configuration. Any
/// error here aborts the cycle before a single deploy is issued.
fn plan_cycle(
    document: &Value,
) -> Result<Vec<(ModuleDescriptor, DeploymentOptions)>, ConfigError> {
    module_declarations(document)?
        .iter()
        .map(|line| {
            let descriptor = ModuleDescriptor::parse(line)?;
            let config = ModuleConfiguration::for_alias(document, descriptor.alias())?;
            Ok((descriptor.with_configuration(&config), config.options))
        })
        .collect()
}

fn aliases(modules: &[ModuleDescriptor]) -> String {
    modules
        .iter()
        .map(ModuleDescriptor::alias)
        .collect::<Vec<_>>()
        .join(", ")
}

fn failure_list(failures: &[UndeployFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in the launcher
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to fetch configuration: {0}")]
    Fetch(#[source] ConfigError),

    #[error("Knot.x start FAILED: mandatory modules failed to deploy: {}", aliases(.0))]
    RequiredModulesFailed(Vec<ModuleDescriptor>),

    #[error("Unable to undeploy modules: {}", failure_list(.0))]
    Teardown(Vec<UndeployFailure>),

    #[error("Launcher has not been started")]
    NotStarted,
}
