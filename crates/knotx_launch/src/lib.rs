//! Knot.x Launcher
//!
//! Deploys a declared list of modules into a shared runtime, tracks the
//! outcome of every deployment and redeploys the whole set whenever the
//! configuration changes.
//!
//! # Overview
//!
//! - A [`PropertyChain`] resolves environment-dependent values such as
//!   `knotx.home` from ordered property sources, first match wins
//! - The bootstrap file names the configuration stores; `${NAME}`
//!   placeholders in store paths resolve through the property chain
//! - The [`Launcher`] deploys every declared module concurrently, marks each
//!   outcome as success, optional failure or required failure, and fails the
//!   start only when a required module failed
//! - Configuration changes tear the running modules down and deploy the new
//!   set
//!
//! # Example Bootstrap File
//!
//! ```yaml
//! configRetrieverOptions:
//!   scanPeriod: 5000
//!   stores:
//!     - type: file
//!       format: yaml
//!       config:
//!         path: ${KNOTX_HOME}/conf/application.yaml
//! ```
//!
//! # Example Application File
//!
//! ```yaml
//! modules:
//!   - server=bin/server
//!   - cache=bin/cache
//!
//! config:
//!   server:
//!     required: true
//!     options:
//!       instances: 2
//!       config:
//!         port: 8092
//! ```

pub mod cli;
pub mod config;
pub mod property;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{
    load_bootstrap, ConfigError, ConfigRetriever, ConfigSource, DeploymentOptions,
    ModuleConfiguration, RetrieverOptions, SubstitutionContext, SubstitutionError,
};
pub use property::{
    FilePropertySource, MapPropertySource, PropertyChain, PropertyError, PropertyRegistry,
    PropertySource, SystemProperties,
};
pub use runtime::{
    DeployError, DeploymentCycle, DeploymentId, DeploymentState, LaunchError, Launcher,
    LauncherState, Module, ModuleContext, ModuleDescriptor, ModuleError, ModuleRuntime,
    ProcessRuntime, ProcessStatus, TaskRuntime, UndeployError,
};
