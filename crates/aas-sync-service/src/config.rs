//! Synchronization settings
//!
//! Settings are layered: built-in defaults, then an optional configuration
//! file, then `AAS_SYNC__*` environment variables
//! (e.g. `AAS_SYNC__SYNC_PERIOD_SECS=120`).

use aas_sync_core::AccessUrl;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::adapters::SecretStore;
use crate::auth::{AuthConfig, AuthenticationMethod};
use crate::error::{SyncError, SyncResult};

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "AAS_SYNC";

/// A service or registry entry in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: AccessUrl,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl EndpointConfig {
    pub fn authentication(
        &self,
        secrets: Option<Arc<dyn SecretStore>>,
    ) -> SyncResult<AuthenticationMethod> {
        self.auth.clone().into_method(secrets)
    }
}

/// Settings for the synchronizer and scheduler
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between two synchronization rounds
    pub sync_period_secs: u64,
    /// Seconds after which a single tick is abandoned
    pub tick_timeout_secs: u64,
    /// Drop shells and concept descriptions, mirror submodels only
    pub only_submodels: bool,
    /// Upper bound on ticks running at the same time
    pub max_concurrent_ticks: usize,
    /// Services registered at startup
    pub services: Vec<EndpointConfig>,
    /// Registries whose advertised services are discovered each round
    pub registries: Vec<EndpointConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_period_secs: 50,
            tick_timeout_secs: 30,
            only_submodels: false,
            max_concurrent_ticks: 16,
            services: Vec::new(),
            registries: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load settings from an optional file plus environment overrides
    pub fn load(path: Option<&str>) -> SyncResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let config: SyncConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(
            sync_period_secs = config.sync_period_secs,
            tick_timeout_secs = config.tick_timeout_secs,
            services = config.services.len(),
            registries = config.registries.len(),
            "Loaded synchronization config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.sync_period_secs == 0 {
            return Err(SyncError::Configuration(
                "sync_period_secs must be greater than zero".to_string(),
            ));
        }
        if self.tick_timeout_secs == 0 {
            return Err(SyncError::Configuration(
                "tick_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_ticks == 0 {
            return Err(SyncError::Configuration(
                "max_concurrent_ticks must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }

    pub fn with_only_submodels(mut self, only_submodels: bool) -> Self {
        self.only_submodels = only_submodels;
        self
    }
}
