// MySQL adapter using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::config::PoolSettings;
use crate::models::{ColumnDescriptor, ConnectionTarget, QueryResult, TableSchema};
use crate::services::connection_pool::{mask_credentials, ConnectionPoolManager};
use crate::services::database::adapter::DatabaseAdapter;
use crate::services::database::DatabaseType;
use mysql_async::{
    prelude::*, Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value as MySqlValue,
};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct MySQLAdapter {
    pools: ConnectionPoolManager<Pool>,
}

impl MySQLAdapter {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: ConnectionPoolManager::with_settings(settings),
        }
    }

    fn create_pool(connection_url: &str, settings: &PoolSettings) -> Result<Pool, AppError> {
        let opts = Opts::from_url(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        let constraints = PoolConstraints::new(settings.size, settings.max_size())
            .ok_or_else(|| AppError::Connection("MySQL pool rejected the configured pool size".to_string()))?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_abs_conn_ttl(Some(Duration::from_secs(settings.recycle_secs)));

        Ok(Pool::new(OptsBuilder::from_opts(opts).pool_opts(pool_opts)))
    }

    /// Resolve a missing scope to the connection's current database
    async fn resolve_database(conn: &mut Conn, scope: Option<&str>) -> Result<String, AppError> {
        if let Some(db) = scope.filter(|s| !s.is_empty()) {
            return Ok(db.to_string());
        }

        let current: Option<Option<String>> = conn
            .query_first("SELECT DATABASE()")
            .await
            .map_err(|e| AppError::Query(format!("Failed to get current database: {}", e)))?;

        current.flatten().ok_or_else(|| {
            AppError::Validation("database is required when the connection has no default database".to_string())
        })
    }

    /// Helper function to convert MySQL Value to JSON Value
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => json!("<binary>"),
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, micros) => {
                if micros > 0 {
                    json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}", y, m, d, h, min, s, micros))
                } else {
                    json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
                }
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn row_to_json(row: &Row, columns: &[String]) -> Map<String, Value> {
        let mut row_obj = Map::new();
        for (idx, column_name) in columns.iter().enumerate() {
            let value = match row.get_opt::<MySqlValue, usize>(idx) {
                Some(Ok(mysql_val)) => Self::mysql_value_to_json(mysql_val),
                _ => Value::Null,
            };
            row_obj.insert(column_name.clone(), value);
        }
        row_obj
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    type Connection = Conn;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn acquire(&self, target: &ConnectionTarget) -> Result<Conn, AppError> {
        let connection_url = DatabaseType::MySQL.connection_url(target)?;
        let pool = self
            .pools
            .get_or_create_pool(&connection_url, Self::create_pool)
            .await?;

        let timeout = Duration::from_secs(self.pools.settings().connect_timeout_secs);
        let result = tokio::time::timeout(timeout, pool.get_conn()).await;

        let mut conn = match result {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.pools.remove_pool(&connection_url).await;
                return Err(AppError::Connection(format!(
                    "Failed to get MySQL connection for {}: {}",
                    mask_credentials(&connection_url),
                    e
                )));
            }
            Err(_) => {
                self.pools.remove_pool(&connection_url).await;
                return Err(AppError::Connection(format!(
                    "Timed out after {}s connecting to {}",
                    timeout.as_secs(),
                    mask_credentials(&connection_url)
                )));
            }
        };

        // Liveness probe
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| AppError::Connection(format!("MySQL liveness probe failed: {}", e)))?;

        Ok(conn)
    }

    async fn release(&self, conn: Conn) {
        // Dropping a pooled Conn hands it back to its pool
        drop(conn);
        tracing::debug!("Released MySQL connection");
    }

    async fn list_schemas(&self, conn: &mut Conn) -> Result<Vec<String>, AppError> {
        let rows: Vec<String> = conn
            .query(
                "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA
                 WHERE SCHEMA_NAME NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
                 ORDER BY SCHEMA_NAME",
            )
            .await
            .map_err(|e| AppError::Query(format!("Failed to get databases: {}", e)))?;

        Ok(rows)
    }

    async fn list_tables(
        &self,
        conn: &mut Conn,
        scope: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let db = Self::resolve_database(conn, scope).await?;

        conn.exec(
            r#"
            SELECT TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
            (db,),
        )
        .await
        .map_err(|e| AppError::Query(format!("Failed to get tables: {}", e)))
    }

    async fn table_columns(
        &self,
        conn: &mut Conn,
        scope: &str,
        table: &str,
    ) -> Result<Vec<String>, AppError> {
        conn.exec(
            r#"
            SELECT COLUMN_NAME
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
            (scope, table),
        )
        .await
        .map_err(|e| AppError::Query(format!("Failed to get columns: {}", e)))
    }

    async fn describe_table(
        &self,
        conn: &mut Conn,
        scope: Option<&str>,
        table: &str,
    ) -> Result<TableSchema, AppError> {
        let db = Self::resolve_database(conn, scope).await?;

        let query = r#"
            SELECT
                c.COLUMN_NAME,
                c.COLUMN_TYPE,
                c.IS_NULLABLE,
                c.COLUMN_DEFAULT,
                c.COLUMN_COMMENT
            FROM information_schema.COLUMNS c
            WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String, Option<String>, Option<String>)> = conn
            .exec(query, (db.as_str(), table))
            .await
            .map_err(|e| AppError::Query(format!("Failed to describe table: {}", e)))?;

        let columns = rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default, comment)| {
                ColumnDescriptor::from_catalog(name, data_type, &is_nullable, default, comment)
            })
            .collect();

        Ok(TableSchema {
            database: Some(db),
            schema: None,
            table: table.to_string(),
            columns,
        })
    }

    async fn execute_query(&self, conn: &mut Conn, sql: &str) -> Result<QueryResult, AppError> {
        // Binary protocol: cells arrive typed, and multi-statement text is refused
        let mut result = conn
            .exec_iter(sql, ())
            .await
            .map_err(|e| AppError::Query(format!("Query execution failed: {}", e)))?;

        let columns: Vec<String> = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();

        let rows: Vec<Row> = result
            .collect()
            .await
            .map_err(|e| AppError::Query(format!("Failed to read query results: {}", e)))?;

        let json_rows = rows.iter().map(|row| Self::row_to_json(row, &columns)).collect();

        Ok(QueryResult::new(columns, json_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_value_to_json() {
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::NULL), Value::Null);
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::Int(-3)), json!(-3));
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::UInt(7)), json!(7));
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Bytes(b"paid".to_vec())),
            json!("paid")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Date(2025, 1, 2, 3, 4, 5, 0)),
            json!("2025-01-02 03:04:05")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            json!("-26:03:04")
        );
    }

    #[test]
    fn test_binary_protocol_cells() {
        // DECIMAL arrives as text in the binary protocol; keep its scale
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Bytes(b"1.50".to_vec())),
            json!("1.50")
        );
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::Double(2.5)), json!(2.5));
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Date(2025, 1, 2, 3, 4, 5, 120)),
            json!("2025-01-02 03:04:05.000120")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Bytes(vec![0xff, 0xfe])),
            json!("<binary>")
        );
    }

    #[test]
    fn test_create_pool_rejects_bad_url() {
        let result = MySQLAdapter::create_pool("postgresql://localhost:5432", &PoolSettings::default());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let adapter = MySQLAdapter::new(PoolSettings {
            connect_timeout_secs: 2,
            ..PoolSettings::default()
        });
        let target = ConnectionTarget {
            host: "127.0.0.1".to_string(),
            port: Some(1),
            user: "nobody".to_string(),
            password: "secret".to_string(),
            db_name: None,
        };

        match adapter.acquire(&target).await {
            Err(AppError::Connection(msg)) => assert!(!msg.contains("secret")),
            Err(other) => panic!("expected connection error, got {:?}", other),
            Ok(_) => panic!("expected connection error"),
        }
    }
}
