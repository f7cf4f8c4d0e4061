//! Configuration retriever: fetches the application document from the
//! configured stores and polls them for changes

use super::{ConfigError, RetrieverOptions, StoreFormat, StoreOptions};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Source of the application configuration document
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the current document
    async fn fetch_current(&self) -> Result<Value, ConfigError>;

    /// Subscribe to configuration changes. Every detected change is sent as
    /// the full new document.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Value>;
}

/// Store-backed configuration retriever. Clones share the last document
/// fetched; the poller reports changes relative to it.
#[derive(Debug, Clone)]
pub struct ConfigRetriever {
    options: RetrieverOptions,
    current: Arc<Mutex<Option<Value>>>,
}

impl ConfigRetriever {
    pub fn new(options: RetrieverOptions) -> Self {
        Self {
            options,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Merge every store, in order
    async fn read_all(&self) -> Result<Value, ConfigError> {
        let mut document = Value::Object(Map::new());
        for store in &self.options.stores {
            let next = Self::read_store(store).await?;
            merge(&mut document, next);
        }
        Ok(document)
    }

    /// Record `document` as current. Returns true if it differs from the
    /// previous current document; the first document only sets the baseline.
    fn replace_current(&self, document: &Value) -> bool {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let changed = current.as_ref().is_some_and(|last| last != document);
        *current = Some(document.clone());
        changed
    }

    /// Read a single store
    async fn read_store(store: &StoreOptions) -> Result<Value, ConfigError> {
        match store {
            StoreOptions::File {
                format,
                optional,
                config,
            } => {
                let path = config.path.as_str();
                let format = format.unwrap_or_else(|| StoreFormat::from_path(path));

                let result = match tokio::fs::read_to_string(path).await {
                    Ok(content) => format.parse(&content, path),
                    Err(e) => Err(ConfigError::Io {
                        path: path.to_string(),
                        source: e,
                    }),
                };

                match result {
                    Err(e) if *optional => {
                        log::debug!("Skipping optional store '{}': {}", path, e);
                        Ok(Value::Object(Map::new()))
                    }
                    other => other,
                }
            }
            StoreOptions::Json { config } => Ok(Value::Object(config.clone())),
        }
    }
}

#[async_trait]
impl ConfigSource for ConfigRetriever {
    async fn fetch_current(&self) -> Result<Value, ConfigError> {
        let document = self.read_all().await?;
        self.replace_current(&document);
        Ok(document)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();

        let Some(period) = self.options.scan_period() else {
            log::debug!("Configuration polling disabled");
            return rx;
        };

        let retriever = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                match retriever.read_all().await {
                    Ok(document) => {
                        if !retriever.replace_current(&document) {
                            continue;
                        }
                        log::debug!("Configuration change detected");
                        if tx.send(document).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Unable to scan configuration: {}", e);
                    }
                }
            }

            log::debug!("Configuration polling stopped");
        });

        rx
    }
}

/// Deep-merge `other` into `target`. Objects merge key by key; any other
/// value replaces what was there.
pub fn merge(target: &mut Value, other: Value) {
    match (target, other) {
        (Value::Object(target), Value::Object(other)) => {
            for (key, value) in other {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, other) => *target = other,
    }
}
