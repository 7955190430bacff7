// Database adapter trait: connection provider, schema inspector and
// read-only query executor behind one contract
use crate::api::middleware::AppError;
use crate::models::{ConnectionTarget, QueryResult, SchemaEntry, SchemaMap, TableSchema};
use crate::services::database::DatabaseType;
use crate::validation::SqlValidator;

/// Capabilities every backend implements.
///
/// A connection obtained from [`acquire`](DatabaseAdapter::acquire) is owned by
/// exactly one call and must be handed back through
/// [`release`](DatabaseAdapter::release) exactly once, on success and on error.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync + 'static {
    type Connection: Send;

    /// Get database type
    fn database_type(&self) -> DatabaseType;

    /// Open a pooled connection for `target` and verify it with a trivial
    /// round trip. Nothing is handed out if the probe fails.
    async fn acquire(&self, target: &ConnectionTarget) -> Result<Self::Connection, AppError>;

    /// Return the connection to its pool
    async fn release(&self, conn: Self::Connection);

    /// Non-system schemas/databases, sorted
    async fn list_schemas(&self, conn: &mut Self::Connection) -> Result<Vec<String>, AppError>;

    /// Base tables (not views) in `scope`, sorted
    async fn list_tables(
        &self,
        conn: &mut Self::Connection,
        scope: Option<&str>,
    ) -> Result<Vec<String>, AppError>;

    /// Column names of one table in ordinal order
    async fn table_columns(
        &self,
        conn: &mut Self::Connection,
        scope: &str,
        table: &str,
    ) -> Result<Vec<String>, AppError>;

    /// Full column metadata of one table in ordinal order
    async fn describe_table(
        &self,
        conn: &mut Self::Connection,
        scope: Option<&str>,
        table: &str,
    ) -> Result<TableSchema, AppError>;

    /// Run an already-vetted statement and materialize every row
    async fn execute_query(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
    ) -> Result<QueryResult, AppError>;

    /// Compact schema -> table -> columns listing of everything visible.
    /// Sub-queries run sequentially on the one connection.
    async fn get_all_schemas(&self, conn: &mut Self::Connection) -> Result<SchemaMap, AppError> {
        let db_type = self.database_type();
        let mut out = SchemaMap::new();

        for schema in self.list_schemas(conn).await? {
            if db_type.is_system_schema(&schema) {
                continue;
            }

            let mut entry = SchemaEntry::default();
            for table in self.list_tables(conn, Some(&schema)).await? {
                let columns = self.table_columns(conn, &schema, &table).await?;
                entry.tables.insert(table, columns);
            }
            out.insert(schema, entry);
        }

        Ok(out)
    }

    /// Vet `sql` as read-only, cap it at `max_rows` unless it already carries
    /// a limit, then execute it. Refused statements never reach the backend.
    async fn run_select(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
        max_rows: u64,
    ) -> Result<QueryResult, AppError> {
        let (prepared_sql, limit_applied) = SqlValidator::validate_and_prepare(sql, max_rows)?;

        tracing::debug!(
            "Executing {} statement (limit applied: {}): {}",
            self.database_type().display_name(),
            limit_applied,
            prepared_sql
        );

        self.execute_query(conn, &prepared_sql).await
    }
}
