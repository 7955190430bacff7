use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub mysql: BackendConfig,
    pub postgres: BackendConfig,
    pub cache: CacheConfig,
    pub pool: PoolSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Default connection target of one backend; every field is overridable per call.
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub db_name: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("db_name", &self.db_name)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

/// Bounded pool shape: `size` base connections plus up to `max_overflow`
/// extra, each recycled after `recycle_secs`. At most `max_pools` distinct
/// targets keep a pool per backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    pub size: usize,
    pub max_overflow: usize,
    pub recycle_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_pools: usize,
}

impl PoolSettings {
    pub fn max_size(&self) -> usize {
        self.size + self.max_overflow
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 10,
            max_overflow: 20,
            recycle_secs: 1800,
            connect_timeout_secs: 10,
            max_pools: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Environment variable -> config key overrides, applied verbatim
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("MYSQL_HOST", "mysql.host"),
    ("MYSQL_USER", "mysql.user"),
    ("MYSQL_PASSWORD", "mysql.password"),
    ("MYSQL_DB", "mysql.db_name"),
    ("PG_HOST", "postgres.host"),
    ("PG_USER", "postgres.user"),
    ("PG_PASSWORD", "postgres.password"),
    ("PG_DB", "postgres.db_name"),
    ("RUST_LOG", "logging.level"),
];

/// Environment variable -> config key overrides that must parse as integers
const NUMERIC_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("MYSQL_PORT", "mysql.port"),
    ("PG_PORT", "postgres.port"),
    ("DBMCP_CACHE_TTL", "cache.ttl_secs"),
    ("DBMCP_CACHE_MAX_ENTRIES", "cache.max_entries"),
    ("DBMCP_POOL_SIZE", "pool.size"),
    ("DBMCP_POOL_MAX_OVERFLOW", "pool.max_overflow"),
    ("DBMCP_POOL_RECYCLE", "pool.recycle_secs"),
    ("DBMCP_CONNECT_TIMEOUT", "pool.connect_timeout_secs"),
    ("DBMCP_POOL_MAX_TARGETS", "pool.max_pools"),
];

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env first so its values are visible below
        let _ = dotenv::dotenv();

        let pool = PoolSettings::default();
        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("mysql.host", "localhost")?
            .set_default("mysql.user", "")?
            .set_default("mysql.password", "")?
            .set_default("postgres.host", "localhost")?
            .set_default("postgres.user", "")?
            .set_default("postgres.password", "")?
            .set_default("cache.enabled", false)?
            .set_default("cache.ttl_secs", 60)?
            .set_default("cache.max_entries", 512)?
            .set_default("pool.size", pool.size as u64)?
            .set_default("pool.max_overflow", pool.max_overflow as u64)?
            .set_default("pool.recycle_secs", pool.recycle_secs)?
            .set_default("pool.connect_timeout_secs", pool.connect_timeout_secs)?
            .set_default("pool.max_pools", pool.max_pools as u64)?
            .set_default("logging.level", "info")?;

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        for (var, key) in NUMERIC_ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                let parsed = value.trim().parse::<u64>().map_err(|e| {
                    config::ConfigError::Message(format!("{} must be a non-negative integer: {}", var, e))
                })?;
                builder = builder.set_override(*key, parsed)?;
            }
        }

        if let Ok(enabled) = env::var("DBMCP_CACHE_ENABLED") {
            builder = builder.set_override("cache.enabled", enabled.trim().eq_ignore_ascii_case("true"))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
