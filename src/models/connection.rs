use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, CacheConfig};

/// Fields that must never take part in a cache key or a logged artifact.
pub const SECRET_FIELDS: &[&str] = &["password"];

/// Where and as whom to connect for a single tool call.
///
/// The password is skipped on serialization and redacted in `Debug`, so the
/// target can be fed to cache-key derivation and logs directly.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTarget {
    pub host: String,
    /// Backend default port when absent
    pub port: Option<u16>,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub db_name: Option<String>,
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Per-call connection overrides. Absent fields fall back to the backend's
/// environment defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub db_name: Option<String>,
}

impl ConnectionParams {
    pub fn resolve(&self, defaults: &BackendConfig) -> ConnectionTarget {
        let db_name = self
            .db_name
            .clone()
            .or_else(|| defaults.db_name.clone())
            .filter(|name| !name.is_empty());

        ConnectionTarget {
            host: self.host.clone().unwrap_or_else(|| defaults.host.clone()),
            port: self.port.or(defaults.port),
            user: self.user.clone().unwrap_or_else(|| defaults.user.clone()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| defaults.password.clone()),
            db_name,
        }
    }
}

/// Per-call cache overrides.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CacheParams {
    pub use_cache: Option<bool>,
    pub ttl: Option<u64>,
}

/// Resolved cache behaviour for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheOptions {
    pub use_cache: bool,
    pub ttl: u64,
}

impl CacheParams {
    pub fn resolve(&self, defaults: &CacheConfig) -> CacheOptions {
        CacheOptions {
            use_cache: self.use_cache.unwrap_or(defaults.enabled),
            ttl: self.ttl.unwrap_or(defaults.ttl_secs),
        }
    }
}
