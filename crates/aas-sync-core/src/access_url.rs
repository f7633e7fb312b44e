//! Canonical service access URLs
//!
//! Services are identified by the URL they are reached at. Two URLs that only
//! differ in query string, fragment, default port, host case or a trailing
//! slash identify the same service.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{CoreError, CoreResult};

/// Canonicalized access URL of a remote service (scheme + host + port + path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessUrl(Url);

impl AccessUrl {
    /// Parse and canonicalize an access URL.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let url = Url::parse(input.trim()).map_err(|e| CoreError::InvalidAccessUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    /// Canonicalize an already parsed URL.
    pub fn from_url(mut url: Url) -> CoreResult<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::InvalidAccessUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(CoreError::InvalidAccessUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        url.set_query(None);
        url.set_fragment(None);

        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/').to_string();
            url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
        }

        Ok(Self(url))
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The underlying parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for AccessUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessUrl {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AccessUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AccessUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
