//! Property chain: ordered key/value stores resolving environment-dependent values
//!
//! Sources are registered explicitly in a [`PropertyRegistry`]. The default
//! (system) source is always consulted first, the others in registration order.

mod sources;

pub use sources::*;

use std::collections::HashMap;

/// A provider of a flat key/value snapshot.
pub trait PropertySource: Send + Sync {
    /// Source name (for logging)
    fn name(&self) -> &str;

    /// Full key/value snapshot. Called once, when the chain is built.
    fn snapshot(&self) -> HashMap<String, String>;
}

/// Registered property sources, with the default provider held apart.
pub struct PropertyRegistry {
    default: Box<dyn PropertySource>,
    sources: Vec<Box<dyn PropertySource>>,
}

impl PropertyRegistry {
    /// Create a registry around the default (system-backed) provider
    pub fn new(default: impl PropertySource + 'static) -> Self {
        Self {
            default: Box::new(default),
            sources: Vec::new(),
        }
    }

    /// Append a source in discovery order
    pub fn register(mut self, source: impl PropertySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

/// A single snapshotted store in the chain
#[derive(Debug, Clone)]
struct PropertyStore {
    name: String,
    values: HashMap<String, String>,
}

/// Ordered property stores, default store first.
#[derive(Debug, Clone)]
pub struct PropertyChain {
    stores: Vec<PropertyStore>,
}

impl PropertyChain {
    /// Snapshot every registered source. The default source lands first
    /// regardless of registration order.
    pub fn new(registry: PropertyRegistry) -> Self {
        let PropertyRegistry { default, sources } = registry;

        let stores: Vec<PropertyStore> = std::iter::once(default)
            .chain(sources)
            .map(|source| {
                let values = source.snapshot();
                log::debug!(
                    "Property source '{}' loaded with {} entries",
                    source.name(),
                    values.len()
                );
                PropertyStore {
                    name: source.name().to_string(),
                    values,
                }
            })
            .collect();

        Self { stores }
    }

    /// Chain with no stores; every lookup misses
    pub fn empty() -> Self {
        Self { stores: Vec::new() }
    }

    /// First non-empty value for `key`, scanning front to back
    pub fn get(&self, key: &str) -> Option<&str> {
        self.stores
            .iter()
            .filter_map(|store| store.values.get(key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }

    /// Store names in lookup order
    pub fn store_names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.name.as_str()).collect()
    }
}
