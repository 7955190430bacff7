use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::connection::{CacheParams, ConnectionParams};
use crate::models::metadata::{SchemaMap, TableSchema};

pub const DEFAULT_MAX_ROWS: u64 = 2000;

/// Materialized result set of a read-only statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result-set order
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }
}

/// Any value a tool can return; this is what the response cache stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Schemas(SchemaMap),
    Tables(Vec<String>),
    TableSchema(TableSchema),
    Rows(QueryResult),
}

/// Payload of `get_all_schemas`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub cache: CacheParams,
}

/// Payload of `get_tables`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetTablesRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub cache: CacheParams,
    #[serde(default, alias = "schema", alias = "database")]
    pub scope: Option<String>,
}

/// Payload of `get_table_schema`
#[derive(Debug, Clone, Deserialize)]
pub struct GetTableSchemaRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub cache: CacheParams,
    #[serde(default, alias = "schema", alias = "database")]
    pub scope: Option<String>,
    pub table: String,
}

/// Payload of `execute_sql`
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteSqlRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub cache: CacheParams,
    pub sql: String,
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
}

fn default_max_rows() -> u64 {
    DEFAULT_MAX_ROWS
}

/// Payload of `get_builtin_prompt`
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRequest {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_count_matches_rows() {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        let result = QueryResult::new(vec!["id".to_string()], vec![row.clone(), row]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.row_count, result.rows.len());
    }

    #[test]
    fn test_execute_sql_request_defaults() {
        let req: ExecuteSqlRequest =
            serde_json::from_value(json!({"sql": "SELECT 1", "host": "h"})).unwrap();
        assert_eq!(req.max_rows, DEFAULT_MAX_ROWS);
        assert_eq!(req.connection.host.as_deref(), Some("h"));
        assert!(req.cache.use_cache.is_none());
    }

    #[test]
    fn test_scope_aliases() {
        let req: GetTablesRequest = serde_json::from_value(json!({"schema": "public"})).unwrap();
        assert_eq!(req.scope.as_deref(), Some("public"));

        let req: GetTablesRequest = serde_json::from_value(json!({"database": "shop"})).unwrap();
        assert_eq!(req.scope.as_deref(), Some("shop"));

        let req: GetTableSchemaRequest =
            serde_json::from_value(json!({"scope": "s", "table": "t", "use_cache": true, "ttl": 5}))
                .unwrap();
        assert_eq!(req.scope.as_deref(), Some("s"));
        assert_eq!(req.cache.ttl, Some(5));
    }
}
