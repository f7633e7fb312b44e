//! Secret Store Adapter
//!
//! Resolves vault aliases to secret values for the vault authentication
//! method. Lookups happen on every outbound call; nothing is cached here.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Source of secret values keyed by alias
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Current value for `alias`, or `None` if the alias is unknown
    async fn resolve_secret(&self, alias: &str) -> Option<String>;
}

/// Process-local secret store
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, SecretString>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the secret for an alias
    pub async fn insert(&self, alias: impl Into<String>, value: impl Into<String>) {
        let alias = alias.into();
        debug!(alias = %alias, "Storing secret");
        self.secrets
            .write()
            .await
            .insert(alias, SecretString::new(value.into()));
    }

    pub async fn remove(&self, alias: &str) -> bool {
        self.secrets.write().await.remove(alias).is_some()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    #[instrument(skip(self))]
    async fn resolve_secret(&self, alias: &str) -> Option<String> {
        let secrets = self.secrets.read().await;
        secrets.get(alias).map(|s| s.expose_secret().clone())
    }
}
