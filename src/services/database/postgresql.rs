// PostgreSQL adapter using connection pooling for optimal resource management
use crate::api::middleware::AppError;
use crate::config::PoolSettings;
use crate::models::{ColumnDescriptor, ConnectionTarget, QueryResult, TableSchema};
use crate::services::connection_pool::{mask_credentials, ConnectionPoolManager};
use crate::services::database::adapter::DatabaseAdapter;
use crate::services::database::DatabaseType;
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use serde_json::{json, Map, Value};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_postgres::types::{FromSql, Type};
use uuid::Uuid;
use tokio_postgres::{NoTls, Row};

/// Undecoded bytes of a non-NULL cell; accepts every column type
struct RawCell<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn decode<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> Option<T> {
    if T::accepts(ty) {
        T::from_sql(ty, raw).ok()
    } else {
        None
    }
}

/// Binary cell to JSON. Numbers and booleans stay native, NUMERIC keeps its
/// scale as text, and types with no text form are shown as `<typename>`.
fn cell_to_json(ty: &Type, raw: &[u8]) -> Value {
    let value = match *ty {
        Type::BOOL => decode::<bool>(ty, raw).map(Value::from),
        Type::INT2 => decode::<i16>(ty, raw).map(Value::from),
        Type::INT4 => decode::<i32>(ty, raw).map(Value::from),
        Type::INT8 => decode::<i64>(ty, raw).map(Value::from),
        Type::OID => decode::<u32>(ty, raw).map(Value::from),
        Type::FLOAT4 => decode::<f32>(ty, raw).map(Value::from),
        Type::FLOAT8 => decode::<f64>(ty, raw).map(Value::from),
        Type::NUMERIC => decode::<Decimal>(ty, raw).map(|v| json!(v.to_string())),
        Type::UUID => decode::<Uuid>(ty, raw).map(|v| json!(v.to_string())),
        Type::JSON | Type::JSONB => decode::<Value>(ty, raw),
        Type::TIMESTAMP => decode::<chrono::NaiveDateTime>(ty, raw).map(|v| json!(v.to_string())),
        Type::TIMESTAMPTZ => {
            decode::<chrono::DateTime<chrono::Utc>>(ty, raw).map(|v| json!(v.to_rfc3339()))
        }
        Type::DATE => decode::<chrono::NaiveDate>(ty, raw).map(|v| json!(v.to_string())),
        Type::TIME => decode::<chrono::NaiveTime>(ty, raw).map(|v| json!(v.to_string())),
        // TEXT, VARCHAR, NAME, BPCHAR and friends
        _ => decode::<String>(ty, raw).map(Value::from),
    };

    value.unwrap_or_else(|| json!(format!("<{}>", ty.name())))
}

pub struct PostgreSQLAdapter {
    pools: ConnectionPoolManager<Pool>,
}

impl PostgreSQLAdapter {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: ConnectionPoolManager::with_settings(settings),
        }
    }

    fn create_pool(connection_url: &str, settings: &PoolSettings) -> Result<Pool, AppError> {
        let timeout = Duration::from_secs(settings.connect_timeout_secs);

        let mut pool_cfg = PoolConfig::new(settings.max_size());
        pool_cfg.timeouts.wait = Some(timeout);
        pool_cfg.timeouts.create = Some(timeout);
        pool_cfg.timeouts.recycle = Some(timeout);

        let mut cfg = PgConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Connection(format!("Failed to create connection pool: {}", e)))
    }

    fn db_error_details(e: &tokio_postgres::Error) -> String {
        if let Some(db_error) = e.as_db_error() {
            format!("Code: {}, Message: {}", db_error.code().code(), db_error.message())
        } else {
            format!("{}", e)
        }
    }

    fn query_error(context: &'static str) -> impl Fn(tokio_postgres::Error) -> AppError {
        move |e| AppError::Query(format!("{}: {}", context, Self::db_error_details(&e)))
    }

    /// Convert one cell to JSON by its PostgreSQL type
    fn pg_value_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
        match row.try_get::<_, Option<RawCell>>(idx) {
            Ok(Some(RawCell(raw))) => cell_to_json(ty, raw),
            _ => Value::Null,
        }
    }

    fn row_to_json(row: &Row, columns: &[(String, Type)]) -> Map<String, Value> {
        let mut row_obj = Map::new();
        for (idx, (name, ty)) in columns.iter().enumerate() {
            row_obj.insert(name.clone(), Self::pg_value_to_json(row, idx, ty));
        }
        row_obj
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    type Connection = Object;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn acquire(&self, target: &ConnectionTarget) -> Result<Object, AppError> {
        let connection_url = DatabaseType::PostgreSQL.connection_url(target)?;
        let pool = self
            .pools
            .get_or_create_pool(&connection_url, Self::create_pool)
            .await?;

        // Recycle connections past their maximum age before handing one out
        let max_age = Duration::from_secs(self.pools.settings().recycle_secs);
        let _ = pool.retain(|_, metrics| metrics.age() < max_age);

        let client = match pool.get().await {
            Ok(client) => client,
            Err(e) => {
                self.pools.remove_pool(&connection_url).await;
                return Err(AppError::Connection(format!(
                    "Failed to get PostgreSQL connection for {}: {}",
                    mask_credentials(&connection_url),
                    e
                )));
            }
        };

        // Liveness probe
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| {
                AppError::Connection(format!(
                    "PostgreSQL liveness probe failed: {}",
                    Self::db_error_details(&e)
                ))
            })?;

        Ok(client)
    }

    async fn release(&self, conn: Object) {
        // Dropping the pool object hands the client back to its pool
        drop(conn);
        tracing::debug!("Released PostgreSQL connection");
    }

    async fn list_schemas(&self, conn: &mut Object) -> Result<Vec<String>, AppError> {
        let rows = conn
            .query(
                "SELECT schema_name::text FROM information_schema.schemata
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
                 ORDER BY schema_name",
                &[],
            )
            .await
            .map_err(Self::query_error("Failed to get schemas"))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn list_tables(
        &self,
        conn: &mut Object,
        scope: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let schema = DatabaseType::PostgreSQL
            .require_scope(scope)?
            .unwrap_or_default();

        let rows = conn
            .query(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[&schema],
            )
            .await
            .map_err(Self::query_error("Failed to get tables"))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn table_columns(
        &self,
        conn: &mut Object,
        scope: &str,
        table: &str,
    ) -> Result<Vec<String>, AppError> {
        let rows = conn
            .query(
                r#"
                SELECT column_name::text
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
                &[&scope, &table],
            )
            .await
            .map_err(Self::query_error("Failed to get columns"))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn describe_table(
        &self,
        conn: &mut Object,
        scope: Option<&str>,
        table: &str,
    ) -> Result<TableSchema, AppError> {
        let schema = DatabaseType::PostgreSQL
            .require_scope(scope)?
            .unwrap_or_default();

        let rows = conn
            .query(
                r#"
                SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    pgd.description
                FROM information_schema.columns c
                LEFT JOIN pg_catalog.pg_statio_all_tables st
                    ON st.schemaname = c.table_schema
                    AND st.relname = c.table_name
                LEFT JOIN pg_catalog.pg_description pgd
                    ON pgd.objoid = st.relid
                    AND pgd.objsubid = c.ordinal_position
                WHERE c.table_schema = $1 AND c.table_name = $2
                ORDER BY c.ordinal_position
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(Self::query_error("Failed to describe table"))?;

        let columns = rows
            .iter()
            .map(|row| {
                ColumnDescriptor::from_catalog(
                    row.get(0),
                    row.get(1),
                    &row.get::<_, String>(2),
                    row.get::<_, Option<String>>(3),
                    row.get::<_, Option<String>>(4),
                )
            })
            .collect();

        Ok(TableSchema {
            database: None,
            schema: Some(schema.to_string()),
            table: table.to_string(),
            columns,
        })
    }

    async fn execute_query(&self, conn: &mut Object, sql: &str) -> Result<QueryResult, AppError> {
        let statement = conn
            .prepare(sql)
            .await
            .map_err(Self::query_error("Query execution failed"))?;

        let columns: Vec<(String, Type)> = statement
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_().clone()))
            .collect();

        let rows = conn
            .query(&statement, &[])
            .await
            .map_err(Self::query_error("Query execution failed"))?;

        let json_rows = rows.iter().map(|row| Self::row_to_json(row, &columns)).collect();
        let names = columns.into_iter().map(|(name, _)| name).collect();

        Ok(QueryResult::new(names, json_rows))
    }
}
