//! Active provider registry.
//!
//! Holds the single active [`ProviderConfig`] together with the adapter built
//! from it. Updates replace both atomically and bump a version counter; a job
//! captures a [`ProviderSnapshot`] when it starts and keeps using it even if
//! the configuration changes mid-run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use distill_core::{ConnectionTest, Error, Result, SummaryProvider, ValidationResult};

use crate::adapter::ProviderAdapter;
use crate::config::{ProviderConfig, ProviderKind, ProviderMode};

/// An immutable view of the active configuration.
#[derive(Clone)]
pub struct ProviderSnapshot {
    /// Increases by one on every successful update.
    pub version: u64,
    pub config: ProviderConfig,
    pub adapter: Arc<dyn SummaryProvider>,
}

impl std::fmt::Debug for ProviderSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSnapshot")
            .field("version", &self.version)
            .field("config", &self.config)
            .field("adapter", &self.adapter.provider_id())
            .finish()
    }
}

/// Serializable description of the active configuration. Never carries the
/// credential itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescription {
    pub version: u64,
    pub mode: ProviderMode,
    pub provider: ProviderKind,
    pub display_name: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub has_api_key: bool,
    pub max_input_length: usize,
    pub available_models: Vec<String>,
}

/// Registry of the active provider configuration.
pub struct ProviderRegistry {
    current: RwLock<Arc<ProviderSnapshot>>,
    versions: AtomicU64,
}

impl ProviderRegistry {
    /// Build a registry from `config`.
    ///
    /// Only static validation runs here; call [`apply`](Self::apply) to
    /// validate against the backend.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let adapter = ProviderAdapter::from_config(&config)?;
        Ok(Self::with_adapter(config, Arc::new(adapter)))
    }

    /// Build a registry around an existing adapter.
    pub fn with_adapter(config: ProviderConfig, adapter: Arc<dyn SummaryProvider>) -> Self {
        Self {
            current: RwLock::new(Arc::new(ProviderSnapshot {
                version: 1,
                config,
                adapter,
            })),
            versions: AtomicU64::new(1),
        }
    }

    /// The active configuration and adapter.
    pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Version of the active configuration.
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Validate `config` statically and remotely, then make it active.
    ///
    /// On failure the previous configuration stays active.
    pub async fn apply(&self, config: ProviderConfig) -> Result<Arc<ProviderSnapshot>> {
        let adapter = ProviderAdapter::from_config(&config)?;
        let result = adapter.validate_configuration().await;
        if !result.valid {
            let reason = result.error.unwrap_or_else(|| "validation failed".to_string());
            warn!(
                provider = config.provider.as_str(),
                model = %config.model,
                error = %reason,
                "Rejected provider configuration"
            );
            return Err(Error::Config(reason));
        }
        Ok(self.install(config, Arc::new(adapter)))
    }

    /// Make `config` active with `adapter` without any validation.
    pub fn install(
        &self,
        config: ProviderConfig,
        adapter: Arc<dyn SummaryProvider>,
    ) -> Arc<ProviderSnapshot> {
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(ProviderSnapshot {
            version,
            config,
            adapter,
        });

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&snapshot);
        drop(guard);

        info!(
            version,
            provider = snapshot.config.provider.as_str(),
            model = %snapshot.config.model,
            "Provider configuration updated"
        );
        snapshot
    }

    /// Round trip a trivial prompt through the active provider.
    pub async fn test_connection(&self) -> ConnectionTest {
        let snapshot = self.snapshot();
        snapshot.adapter.test_connection().await
    }

    /// Validate a candidate configuration without activating it.
    pub async fn test_configuration(&self, config: &ProviderConfig) -> ValidationResult {
        match ProviderAdapter::from_config(config) {
            Ok(adapter) => adapter.validate_configuration().await,
            Err(e) => ValidationResult::invalid(e.to_string()),
        }
    }

    /// Describe the active configuration.
    pub fn describe(&self) -> ProviderDescription {
        let snapshot = self.snapshot();
        let config = &snapshot.config;
        ProviderDescription {
            version: snapshot.version,
            mode: config.mode,
            provider: config.provider,
            display_name: config.provider.display_name().to_string(),
            model: config.model.clone(),
            endpoint: config.base_url().ok(),
            has_api_key: config.api_key.is_some(),
            max_input_length: snapshot.adapter.max_input_length(),
            available_models: config
                .provider
                .known_models()
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}
