// Database abstraction layer: one contract, two backends
pub mod adapter;
pub mod mysql;
pub mod postgresql;

pub use adapter::DatabaseAdapter;
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;

use url::Url;

use crate::api::middleware::AppError;
use crate::models::ConnectionTarget;

/// Database type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
}

impl DatabaseType {
    /// Short name used as path prefix and cache-key namespace
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "pgsql",
            DatabaseType::MySQL => "mysql",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "PostgreSQL",
            DatabaseType::MySQL => "MySQL",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::PostgreSQL => 5432,
            DatabaseType::MySQL => 3306,
        }
    }

    fn url_scheme(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
        }
    }

    /// Catalog schemas hidden from every listing
    pub fn system_schemas(&self) -> &'static [&'static str] {
        match self {
            DatabaseType::PostgreSQL => &["pg_catalog", "information_schema"],
            DatabaseType::MySQL => &["information_schema", "performance_schema", "mysql", "sys"],
        }
    }

    pub fn is_system_schema(&self, name: &str) -> bool {
        self.system_schemas().contains(&name)
    }

    /// PostgreSQL has no usable implicit scope; MySQL falls back to the
    /// connection's current database.
    pub fn requires_scope(&self) -> bool {
        matches!(self, DatabaseType::PostgreSQL)
    }

    /// What a scope is called on this backend
    pub fn scope_label(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "schema",
            DatabaseType::MySQL => "database",
        }
    }

    /// Fail with a validation error when a mandatory scope is missing
    pub fn require_scope<'a>(&self, scope: Option<&'a str>) -> Result<Option<&'a str>, AppError> {
        let scope = scope.filter(|s| !s.is_empty());
        if scope.is_none() && self.requires_scope() {
            return Err(AppError::Validation(format!("{} is required", self.scope_label())));
        }
        Ok(scope)
    }

    /// Build the connection URL for `target`, filling in the default port.
    /// Credentials are percent-encoded by the URL setters.
    pub fn connection_url(&self, target: &ConnectionTarget) -> Result<String, AppError> {
        let port = target.port.unwrap_or_else(|| self.default_port());
        let mut url = Url::parse(&format!("{}://{}:{}", self.url_scheme(), target.host, port))
            .map_err(|e| AppError::Validation(format!("Invalid {} host '{}': {}", self.display_name(), target.host, e)))?;

        if !target.user.is_empty() || !target.password.is_empty() {
            url.set_username(&target.user)
                .map_err(|_| AppError::Validation("Invalid user name".to_string()))?;
            url.set_password(Some(&target.password))
                .map_err(|_| AppError::Validation("Invalid password".to_string()))?;
        }

        if let Some(db_name) = target.db_name.as_deref() {
            url.set_path(&format!("/{}", db_name));
        }

        Ok(url.to_string())
    }
}
