//! Outbound request authentication
//!
//! Every service (and every discovery registry) carries one
//! [`AuthenticationMethod`]. The synchronizer only asks it for headers and
//! never inspects the credential scheme.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::adapters::{Headers, SecretStore};
use crate::error::{SyncError, SyncResult};

/// Header carrying vault-resolved secrets
pub const VAULT_HEADER: &str = "x-api-key";

const AUTHORIZATION: &str = "Authorization";

/// Credential scheme for outbound calls
///
/// Immutable once constructed; share it behind an `Arc` across ticks.
#[derive(Clone, Default)]
pub enum AuthenticationMethod {
    /// No credentials are sent
    #[default]
    None,
    /// HTTP basic authentication
    Basic {
        username: String,
        password: SecretString,
    },
    /// Static key sent under a caller-chosen header name
    ApiKey { header: String, value: SecretString },
    /// Key resolved from a secret store on every call
    Vault {
        alias: String,
        store: Arc<dyn SecretStore>,
    },
}

impl AuthenticationMethod {
    pub fn none() -> Self {
        AuthenticationMethod::None
    }

    /// Basic authentication.
    ///
    /// Empty values are sent as given; missing credentials are rejected when
    /// reading [`AuthConfig`].
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthenticationMethod::Basic {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// API key sent as `header: value`
    pub fn api_key(header: impl Into<String>, value: impl Into<String>) -> SyncResult<Self> {
        let header = header.into();
        if header.trim().is_empty() {
            return Err(SyncError::Configuration(
                "api-key authentication requires a header name".to_string(),
            ));
        }
        Ok(AuthenticationMethod::ApiKey {
            header,
            value: SecretString::new(value.into()),
        })
    }

    /// Key looked up under `alias` in `store` at call time
    pub fn vault(alias: impl Into<String>, store: Arc<dyn SecretStore>) -> Self {
        AuthenticationMethod::Vault {
            alias: alias.into(),
            store,
        }
    }

    /// Short scheme name, safe to log
    pub fn scheme(&self) -> &'static str {
        match self {
            AuthenticationMethod::None => "none",
            AuthenticationMethod::Basic { .. } => "basic",
            AuthenticationMethod::ApiKey { .. } => "api-key",
            AuthenticationMethod::Vault { .. } => "vault",
        }
    }

    /// The header to attach to one outbound call, if any.
    ///
    /// Only the vault variant can fail, when its alias does not resolve.
    #[instrument(skip(self), fields(scheme = self.scheme()))]
    pub async fn header_for(&self) -> SyncResult<Option<(String, String)>> {
        match self {
            AuthenticationMethod::None => Ok(None),
            AuthenticationMethod::Basic { username, password } => {
                let token = STANDARD.encode(format!("{}:{}", username, password.expose_secret()));
                Ok(Some((AUTHORIZATION.to_string(), format!("Basic {}", token))))
            }
            AuthenticationMethod::ApiKey { header, value } => {
                Ok(Some((header.clone(), value.expose_secret().clone())))
            }
            AuthenticationMethod::Vault { alias, store } => match store.resolve_secret(alias).await {
                Some(secret) => Ok(Some((VAULT_HEADER.to_string(), secret))),
                None => {
                    debug!(alias = %alias, "Vault alias did not resolve");
                    Err(SyncError::SecretNotFound {
                        alias: alias.clone(),
                    })
                }
            },
        }
    }

    /// Headers for one outbound call
    pub async fn headers(&self) -> SyncResult<Headers> {
        Ok(self.header_for().await?.into_iter().collect())
    }
}

impl fmt::Debug for AuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationMethod::None => write!(f, "None"),
            AuthenticationMethod::Basic { username, password } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", password)
                .finish(),
            AuthenticationMethod::ApiKey { header, value } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("value", value)
                .finish(),
            AuthenticationMethod::Vault { alias, .. } => f
                .debug_struct("Vault")
                .field("alias", alias)
                .finish_non_exhaustive(),
        }
    }
}

/// Authentication as written in configuration files
///
/// ```toml
/// [services.auth]
/// type = "basic"
/// username = "sync"
/// password = "changeme"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthConfig {
    #[default]
    None,
    Basic {
        username: Option<String>,
        password: Option<SecretString>,
    },
    ApiKey {
        header: String,
        value: SecretString,
    },
    Vault {
        alias: String,
    },
}

impl AuthConfig {
    /// Build the authentication method; vault entries need a secret store
    pub fn into_method(self, secrets: Option<Arc<dyn SecretStore>>) -> SyncResult<AuthenticationMethod> {
        match self {
            AuthConfig::None => Ok(AuthenticationMethod::None),
            AuthConfig::Basic { username, password } => {
                let username = username.ok_or_else(|| {
                    SyncError::Configuration("basic authentication requires a username".to_string())
                })?;
                let password = password.ok_or_else(|| {
                    SyncError::Configuration("basic authentication requires a password".to_string())
                })?;
                Ok(AuthenticationMethod::basic(username, password.expose_secret().clone()))
            }
            AuthConfig::ApiKey { header, value } => {
                AuthenticationMethod::api_key(header, value.expose_secret().clone())
            }
            AuthConfig::Vault { alias } => {
                let store = secrets.ok_or_else(|| {
                    SyncError::Configuration(format!(
                        "vault authentication for alias '{}' needs a secret store",
                        alias
                    ))
                })?;
                Ok(AuthenticationMethod::vault(alias, store))
            }
        }
    }
}
