use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::api::middleware::AppError;
use crate::config::{BackendConfig, CacheConfig};
use crate::models::{
    CacheOptions, CacheParams, ConnectionParams, ConnectionRequest, ConnectionTarget,
    ExecuteSqlRequest, GetTableSchemaRequest, GetTablesRequest, QueryResult, SchemaMap,
    TableSchema, ToolOutput,
};
use crate::services::database::{DatabaseAdapter, DatabaseType};
use crate::services::prompts::BuiltinPrompt;
use crate::services::query_cache::{cache_key, TtlCache};
use crate::validation::SqlValidator;

/// One tool-level operation and its arguments
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Operation<'a> {
    AllSchemas {},
    Tables {
        scope: Option<&'a str>,
    },
    TableSchema {
        scope: Option<&'a str>,
        table: &'a str,
    },
    ExecuteSql {
        sql: &'a str,
        max_rows: u64,
    },
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::AllSchemas {} => "get_all_schemas",
            Operation::Tables { .. } => "get_tables",
            Operation::TableSchema { .. } => "get_table_schema",
            Operation::ExecuteSql { .. } => "execute_sql",
        }
    }
}

/// Everything that identifies a call for caching purposes. The password is
/// absent from `ConnectionTarget`'s serialized form and is stripped again by
/// `cache_key`.
#[derive(Serialize)]
struct CallPayload<'a> {
    #[serde(flatten)]
    target: &'a ConnectionTarget,
    #[serde(flatten)]
    cache: CacheOptions,
    #[serde(flatten)]
    operation: &'a Operation<'a>,
}

/// Composition layer for one backend: cache lookup, connection lifecycle and
/// delegation to the adapter.
///
/// Concurrent misses on the same key each reach the database; there is no
/// de-duplication of in-flight calls.
pub struct QueryGateway<A: DatabaseAdapter> {
    adapter: A,
    cache: Arc<TtlCache<ToolOutput>>,
    defaults: BackendConfig,
    cache_defaults: CacheConfig,
}

impl<A: DatabaseAdapter> QueryGateway<A> {
    pub fn new(
        adapter: A,
        cache: Arc<TtlCache<ToolOutput>>,
        defaults: BackendConfig,
        cache_defaults: CacheConfig,
    ) -> Self {
        Self {
            adapter,
            cache,
            defaults,
            cache_defaults,
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.adapter.database_type()
    }

    pub fn cache(&self) -> &Arc<TtlCache<ToolOutput>> {
        &self.cache
    }

    fn resolve(
        &self,
        connection: &ConnectionParams,
        cache: &CacheParams,
    ) -> (ConnectionTarget, CacheOptions) {
        (connection.resolve(&self.defaults), cache.resolve(&self.cache_defaults))
    }

    pub async fn get_all_schemas(&self, request: ConnectionRequest) -> Result<SchemaMap, AppError> {
        let (target, cache) = self.resolve(&request.connection, &request.cache);
        match self.call(Operation::AllSchemas {}, &target, cache).await? {
            ToolOutput::Schemas(schemas) => Ok(schemas),
            other => Err(unexpected_output("get_all_schemas", &other)),
        }
    }

    pub async fn get_tables(&self, request: GetTablesRequest) -> Result<Vec<String>, AppError> {
        let (target, cache) = self.resolve(&request.connection, &request.cache);
        let operation = Operation::Tables {
            scope: request.scope.as_deref(),
        };
        match self.call(operation, &target, cache).await? {
            ToolOutput::Tables(tables) => Ok(tables),
            other => Err(unexpected_output("get_tables", &other)),
        }
    }

    pub async fn get_table_schema(
        &self,
        request: GetTableSchemaRequest,
    ) -> Result<TableSchema, AppError> {
        let (target, cache) = self.resolve(&request.connection, &request.cache);
        let operation = Operation::TableSchema {
            scope: request.scope.as_deref(),
            table: &request.table,
        };
        match self.call(operation, &target, cache).await? {
            ToolOutput::TableSchema(schema) => Ok(schema),
            other => Err(unexpected_output("get_table_schema", &other)),
        }
    }

    pub async fn execute_sql(&self, request: ExecuteSqlRequest) -> Result<QueryResult, AppError> {
        let (target, cache) = self.resolve(&request.connection, &request.cache);
        let operation = Operation::ExecuteSql {
            sql: &request.sql,
            max_rows: request.max_rows,
        };
        match self.call(operation, &target, cache).await? {
            ToolOutput::Rows(result) => Ok(result),
            other => Err(unexpected_output("execute_sql", &other)),
        }
    }

    pub fn get_builtin_prompt(&self, name: &str) -> Result<&'static str, AppError> {
        let prompt: BuiltinPrompt = name.parse()?;
        Ok(prompt.text(self.database_type()))
    }

    /// Reject calls that are doomed before any connection is opened
    fn precheck(&self, operation: &Operation<'_>) -> Result<(), AppError> {
        match operation {
            Operation::Tables { scope } | Operation::TableSchema { scope, .. } => {
                self.database_type().require_scope(*scope)?;
            }
            Operation::ExecuteSql { sql, .. } => {
                SqlValidator::validate_select_only(sql)?;
            }
            Operation::AllSchemas {} => {}
        }
        Ok(())
    }

    async fn call(
        &self,
        operation: Operation<'_>,
        target: &ConnectionTarget,
        cache: CacheOptions,
    ) -> Result<ToolOutput, AppError> {
        let db_type = self.database_type();
        self.precheck(&operation)?;

        let operation_name = format!("{}.{}", db_type.as_str(), operation.name());
        let key = cache_key(
            &operation_name,
            &CallPayload {
                target,
                cache,
                operation: &operation,
            },
        )?;

        if cache.use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                tracing::debug!("{} served from cache", operation_name);
                return Ok(hit);
            }
        }

        tracing::info!(
            "{} on {}:{}",
            operation_name,
            target.host,
            target.port.unwrap_or_else(|| db_type.default_port())
        );
        let start_time = Instant::now();

        let mut conn = self.adapter.acquire(target).await?;
        let result = self.dispatch(&mut conn, &operation).await;
        self.adapter.release(conn).await;

        let output = result.map_err(|e| {
            tracing::warn!("{} failed: {}", operation_name, e);
            e
        })?;

        tracing::debug!(
            "{} completed in {}ms",
            operation_name,
            start_time.elapsed().as_millis()
        );

        if cache.use_cache {
            self.cache.set(key, output.clone(), cache.ttl).await;
        }

        Ok(output)
    }

    async fn dispatch(
        &self,
        conn: &mut A::Connection,
        operation: &Operation<'_>,
    ) -> Result<ToolOutput, AppError> {
        match operation {
            Operation::AllSchemas {} => self
                .adapter
                .get_all_schemas(conn)
                .await
                .map(ToolOutput::Schemas),
            Operation::Tables { scope } => self
                .adapter
                .list_tables(conn, *scope)
                .await
                .map(ToolOutput::Tables),
            Operation::TableSchema { scope, table } => self
                .adapter
                .describe_table(conn, *scope, table)
                .await
                .map(ToolOutput::TableSchema),
            Operation::ExecuteSql { sql, max_rows } => self
                .adapter
                .run_select(conn, sql, *max_rows)
                .await
                .map(ToolOutput::Rows),
        }
    }
}

fn unexpected_output(operation: &str, output: &ToolOutput) -> AppError {
    AppError::Internal(format!("{} produced an unexpected result: {:?}", operation, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, SchemaEntry};
    use serde_json::{json, Map};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory adapter: one `shop` database (or schema) with an `orders`
    /// table of ten rows, plus the backend's system schemas.
    struct FakeAdapter {
        db_type: DatabaseType,
        acquired: AtomicUsize,
        released: AtomicUsize,
        executed: Mutex<Vec<String>>,
        refuse_connections: bool,
    }

    struct FakeConn;

    impl FakeAdapter {
        fn new(db_type: DatabaseType) -> Self {
            Self {
                db_type,
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
                refuse_connections: false,
            }
        }

        fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        fn scope_or_current<'a>(&self, scope: Option<&'a str>) -> Result<&'a str, AppError> {
            Ok(self.db_type.require_scope(scope)?.unwrap_or("shop"))
        }
    }

    #[async_trait::async_trait]
    impl DatabaseAdapter for FakeAdapter {
        type Connection = FakeConn;

        fn database_type(&self) -> DatabaseType {
            self.db_type
        }

        async fn acquire(&self, _target: &ConnectionTarget) -> Result<FakeConn, AppError> {
            if self.refuse_connections {
                return Err(AppError::Connection("connection refused".to_string()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConn)
        }

        async fn release(&self, _conn: FakeConn) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        async fn list_schemas(&self, _conn: &mut FakeConn) -> Result<Vec<String>, AppError> {
            let mut schemas: Vec<String> = self.db_type.system_schemas().iter().map(|s| s.to_string()).collect();
            schemas.push("shop".to_string());
            schemas.sort();
            Ok(schemas)
        }

        async fn list_tables(&self, _conn: &mut FakeConn, scope: Option<&str>) -> Result<Vec<String>, AppError> {
            match self.scope_or_current(scope)? {
                "shop" => Ok(vec!["orders".to_string()]),
                _ => Ok(vec!["internal_table".to_string()]),
            }
        }

        async fn table_columns(&self, _conn: &mut FakeConn, _scope: &str, table: &str) -> Result<Vec<String>, AppError> {
            match table {
                "orders" => Ok(vec!["id".to_string(), "status".to_string(), "created_at".to_string()]),
                _ => Ok(vec!["x".to_string()]),
            }
        }

        async fn describe_table(
            &self,
            _conn: &mut FakeConn,
            scope: Option<&str>,
            table: &str,
        ) -> Result<TableSchema, AppError> {
            let scope = self.scope_or_current(scope)?.to_string();
            if table != "orders" {
                return Err(AppError::Query(format!("Table '{}.{}' doesn't exist", scope, table)));
            }
            let column = |name: &str, ty: &str| ColumnDescriptor {
                name: name.to_string(),
                data_type: ty.to_string(),
                nullable: name != "id",
                default: None,
                comment: None,
            };
            Ok(TableSchema {
                database: Some(scope),
                schema: None,
                table: table.to_string(),
                columns: vec![column("id", "int"), column("status", "varchar(16)"), column("created_at", "datetime")],
            })
        }

        async fn execute_query(&self, _conn: &mut FakeConn, sql: &str) -> Result<QueryResult, AppError> {
            self.executed.lock().unwrap().push(sql.to_string());
            if !sql.contains("orders") {
                return Err(AppError::Query("Unknown table".to_string()));
            }
            let limit = sql
                .rsplit_once(" LIMIT ")
                .and_then(|(_, n)| n.trim().parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            let rows = (1..=10)
                .take(limit)
                .map(|id| {
                    let mut row = Map::new();
                    row.insert("id".to_string(), json!(id));
                    row
                })
                .collect();
            Ok(QueryResult::new(vec!["id".to_string()], rows))
        }
    }

    fn gateway(adapter: FakeAdapter) -> QueryGateway<FakeAdapter> {
        gateway_with_cache(adapter, Arc::new(TtlCache::new(16)))
    }

    fn gateway_with_cache(adapter: FakeAdapter, cache: Arc<TtlCache<ToolOutput>>) -> QueryGateway<FakeAdapter> {
        QueryGateway::new(
            adapter,
            cache,
            BackendConfig {
                host: "localhost".to_string(),
                port: None,
                user: "reader".to_string(),
                password: "env-secret".to_string(),
                db_name: Some("shop".to_string()),
            },
            CacheConfig {
                enabled: false,
                ttl_secs: 60,
                max_entries: 16,
            },
        )
    }

    fn cached(ttl: u64) -> CacheParams {
        CacheParams {
            use_cache: Some(true),
            ttl: Some(ttl),
        }
    }

    fn tables_request(scope: Option<&str>, cache: CacheParams) -> GetTablesRequest {
        GetTablesRequest {
            connection: ConnectionParams::default(),
            cache,
            scope: scope.map(str::to_string),
        }
    }

    fn sql_request(sql: &str, max_rows: u64) -> ExecuteSqlRequest {
        ExecuteSqlRequest {
            connection: ConnectionParams::default(),
            cache: CacheParams::default(),
            sql: sql.to_string(),
            max_rows,
        }
    }

    #[tokio::test]
    async fn test_get_all_schemas_excludes_system_schemas() {
        for db_type in [DatabaseType::MySQL, DatabaseType::PostgreSQL] {
            let gw = gateway(FakeAdapter::new(db_type));
            let schemas = gw.get_all_schemas(ConnectionRequest::default()).await.unwrap();

            for system in db_type.system_schemas() {
                assert!(!schemas.contains_key(*system), "{} leaked for {:?}", system, db_type);
            }

            let mut tables = BTreeMap::new();
            tables.insert(
                "orders".to_string(),
                vec!["id".to_string(), "status".to_string(), "created_at".to_string()],
            );
            let mut expected = SchemaMap::new();
            expected.insert("shop".to_string(), SchemaEntry { tables });
            assert_eq!(schemas, expected);
            assert_eq!(gw.adapter.acquired(), 1);
            assert_eq!(gw.adapter.released(), 1);
        }
    }

    #[tokio::test]
    async fn test_cache_hit_opens_no_connection() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let first = gw.get_tables(tables_request(Some("shop"), cached(60))).await.unwrap();
        let second = gw.get_tables(tables_request(Some("shop"), cached(60))).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gw.adapter.acquired(), 1);
        assert_eq!(gw.cache().stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_connects() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        gw.get_tables(tables_request(Some("shop"), CacheParams::default())).await.unwrap();
        gw.get_tables(tables_request(Some("shop"), CacheParams::default())).await.unwrap();

        assert_eq!(gw.adapter.acquired(), 2);
        assert_eq!(gw.cache().size().await, 0);
    }

    #[tokio::test]
    async fn test_calls_differing_only_in_password_share_a_cache_entry() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let mut request = tables_request(Some("shop"), cached(60));
        request.connection.password = Some("first".to_string());
        gw.get_tables(request).await.unwrap();

        let mut request = tables_request(Some("shop"), cached(60));
        request.connection.password = Some("second".to_string());
        gw.get_tables(request).await.unwrap();

        assert_eq!(gw.adapter.acquired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reconnects() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        gw.get_tables(tables_request(Some("shop"), cached(30))).await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        gw.get_tables(tables_request(Some("shop"), cached(30))).await.unwrap();

        assert_eq!(gw.adapter.acquired(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_caller_ttl_is_cached_without_expiry() {
        let gw = gateway(FakeAdapter::new(DatabaseType::PostgreSQL));
        let mut request = sql_request("SELECT id FROM orders", 5);
        request.cache = cached(u64::MAX);

        let first = gw.execute_sql(request.clone()).await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(86_400)).await;
        let second = gw.execute_sql(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gw.adapter.acquired(), 1);
    }

    #[tokio::test]
    async fn test_postgres_missing_scope_fails_before_connecting() {
        let gw = gateway(FakeAdapter::new(DatabaseType::PostgreSQL));

        let err = gw.get_tables(tables_request(None, CacheParams::default())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg == "schema is required"));

        let err = gw
            .get_table_schema(GetTableSchemaRequest {
                connection: ConnectionParams::default(),
                cache: CacheParams::default(),
                scope: None,
                table: "orders".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(gw.adapter.acquired(), 0);
    }

    #[tokio::test]
    async fn test_mysql_missing_scope_uses_current_database() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let tables = gw.get_tables(tables_request(None, CacheParams::default())).await.unwrap();
        assert_eq!(tables, vec!["orders".to_string()]);

        let schema = gw
            .get_table_schema(GetTableSchemaRequest {
                connection: ConnectionParams::default(),
                cache: CacheParams::default(),
                scope: None,
                table: "orders".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(schema.database.as_deref(), Some("shop"));
        assert_eq!(schema.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_sql_caps_rows() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let result = gw.execute_sql(sql_request("SELECT id FROM orders", 5)).await.unwrap();

        assert_eq!(result.row_count, 5);
        assert_eq!(result.rows.len(), 5);
        assert_eq!(
            gw.adapter.executed.lock().unwrap().as_slice(),
            ["SELECT id FROM orders LIMIT 5".to_string()]
        );
    }

    #[tokio::test]
    async fn test_execute_sql_keeps_callers_limit() {
        let gw = gateway(FakeAdapter::new(DatabaseType::PostgreSQL));

        let result = gw.execute_sql(sql_request("SELECT id FROM orders LIMIT 8;", 5)).await.unwrap();

        assert_eq!(result.row_count, 8);
        assert_eq!(
            gw.adapter.executed.lock().unwrap().as_slice(),
            ["SELECT id FROM orders LIMIT 8".to_string()]
        );
    }

    #[tokio::test]
    async fn test_write_statement_is_refused_without_execution() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let err = gw.execute_sql(sql_request("DELETE FROM orders", 5)).await.unwrap_err();

        assert!(matches!(err, AppError::Policy(_)));
        assert_eq!(gw.adapter.acquired(), 0);
        assert!(gw.adapter.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_select_refuses_on_its_own() {
        let adapter = FakeAdapter::new(DatabaseType::PostgreSQL);
        let mut conn = FakeConn;

        let err = adapter.run_select(&mut conn, "UPDATE orders SET status = 'x'", 5).await.unwrap_err();

        assert!(matches!(err, AppError::Policy(_)));
        assert!(adapter.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_releases_connection_and_caches_nothing() {
        let gw = gateway(FakeAdapter::new(DatabaseType::MySQL));

        let err = gw
            .get_table_schema(GetTableSchemaRequest {
                connection: ConnectionParams::default(),
                cache: cached(60),
                scope: Some("shop".to_string()),
                table: "missing".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Query(_)));
        assert_eq!(gw.adapter.acquired(), 1);
        assert_eq!(gw.adapter.released(), 1);
        assert_eq!(gw.cache().size().await, 0);
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let mut adapter = FakeAdapter::new(DatabaseType::MySQL);
        adapter.refuse_connections = true;
        let gw = gateway(adapter);

        let err = gw.get_all_schemas(ConnectionRequest::default()).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(gw.adapter.released(), 0);
        assert_eq!(gw.cache().size().await, 0);
    }

    #[tokio::test]
    async fn test_backends_do_not_share_cache_entries() {
        let cache = Arc::new(TtlCache::new(16));
        let mysql = gateway_with_cache(FakeAdapter::new(DatabaseType::MySQL), cache.clone());
        let pgsql = gateway_with_cache(FakeAdapter::new(DatabaseType::PostgreSQL), cache.clone());

        mysql.get_tables(tables_request(Some("shop"), cached(60))).await.unwrap();
        pgsql.get_tables(tables_request(Some("shop"), cached(60))).await.unwrap();

        assert_eq!(pgsql.adapter.acquired(), 1);
        assert_eq!(cache.size().await, 2);
    }

    #[test]
    fn test_builtin_prompt_lookup() {
        let gw = gateway(FakeAdapter::new(DatabaseType::PostgreSQL));
        assert!(gw.get_builtin_prompt("sql_rules").unwrap().contains("PostgreSQL"));
        assert!(matches!(gw.get_builtin_prompt("nope"), Err(AppError::Validation(_))));
    }
}
