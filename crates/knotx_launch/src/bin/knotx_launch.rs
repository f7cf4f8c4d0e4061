//! Knot.x Launch CLI
//!
//! Usage:
//!   knotx_launch conf/bootstrap.yaml
//!   knotx_launch conf/bootstrap.yaml -D knotx.home=/opt/knotx
//!   knotx_launch conf/bootstrap.yaml --validate

use knotx_launch::config::module_declarations;
use knotx_launch::{
    load_bootstrap, ConfigError, ConfigRetriever, ConfigSource, FilePropertySource, LaunchArgs,
    Launcher, ModuleConfiguration, ModuleDescriptor, ProcessRuntime, PropertyChain,
    PropertyRegistry, RetrieverOptions, SubstitutionContext, SystemProperties,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    // Build the property chain: -D definitions first, then property files
    let mut registry = PropertyRegistry::new(SystemProperties::from_definitions(
        args.define.iter().cloned(),
    ));
    for path in &args.properties {
        match FilePropertySource::load(path) {
            Ok(source) => registry = registry.register(source),
            Err(e) => {
                log::error!("Failed to load property file: {}", e);
                std::process::exit(1);
            }
        }
    }
    let ctx = SubstitutionContext::from_process(PropertyChain::new(registry));
    log::debug!(
        "Property lookup order: {}",
        ctx.properties.store_names().join(", ")
    );

    // Load bootstrap file
    log::info!("Loading bootstrap file: {}", args.bootstrap);
    let bootstrap = match load_bootstrap(&args.bootstrap) {
        Ok(document) => document,
        Err(e) => {
            log::error!("Failed to load bootstrap file: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        match validate(&bootstrap, &ctx).await {
            Ok(modules) => {
                println!("Bootstrap file '{}' is valid", args.bootstrap);
                println!("  Modules: {}", modules.len());
                for module in modules {
                    println!(
                        "    {} ({}, {} instance(s))",
                        module.descriptor_line(),
                        if module.is_required() { "required" } else { "optional" },
                        module.instances()
                    );
                }
            }
            Err(e) => {
                log::error!("Invalid configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let runtime = Arc::new(ProcessRuntime::new(
        std::env::current_dir().ok(),
        args.shutdown_timeout(),
    ));
    let mut launcher = Launcher::new(runtime);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    })
    .expect("Error setting Ctrl+C handler");

    // Deploy the first cycle
    if let Err(e) = launcher.start_from_bootstrap(&bootstrap, &ctx).await {
        log::error!("Launch failed: {}", e);
        launcher.shutdown().await;
        std::process::exit(1);
    }

    // Redeploy on configuration change until shutdown
    let result = launcher.run(shutdown_rx).await;
    launcher.shutdown().await;

    if let Err(e) = result {
        log::error!("Launcher stopped: {}", e);
        std::process::exit(1);
    }

    log::info!("Knot.x launcher exiting");
}

/// Resolve the stores, fetch the document and plan every declared module
async fn validate(
    bootstrap: &Value,
    ctx: &SubstitutionContext,
) -> Result<Vec<ModuleDescriptor>, ConfigError> {
    let retriever = ConfigRetriever::new(RetrieverOptions::from_bootstrap(bootstrap, ctx)?);
    let document = retriever.fetch_current().await?;

    module_declarations(&document)?
        .iter()
        .map(|line| {
            let descriptor = ModuleDescriptor::parse(line)?;
            let config = ModuleConfiguration::for_alias(&document, descriptor.alias())?;
            Ok(descriptor.with_configuration(&config))
        })
        .collect()
}
