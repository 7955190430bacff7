use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{
    ConnectionRequest, ExecuteSqlRequest, GetTableSchemaRequest, GetTablesRequest, PromptRequest,
};
use crate::services::{DatabaseAdapter, DatabaseType, QueryGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GetAllSchemas,
    GetTables,
    GetTableSchema,
    ExecuteSql,
    GetBuiltinPrompt,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::GetAllSchemas,
        Tool::GetTables,
        Tool::GetTableSchema,
        Tool::ExecuteSql,
        Tool::GetBuiltinPrompt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::GetAllSchemas => "get_all_schemas",
            Tool::GetTables => "get_tables",
            Tool::GetTableSchema => "get_table_schema",
            Tool::ExecuteSql => "execute_sql",
            Tool::GetBuiltinPrompt => "get_builtin_prompt",
        }
    }

    fn description(&self, db_type: DatabaseType) -> String {
        let backend = db_type.display_name();
        let scope = db_type.scope_label();
        match self {
            Tool::GetAllSchemas => format!("Every non-system {} with its tables and their columns ({})", scope, backend),
            Tool::GetTables => {
                if db_type.requires_scope() {
                    format!("Base tables of one {} (required) ({})", scope, backend)
                } else {
                    format!("Base tables of one {}, the current one when omitted ({})", scope, backend)
                }
            }
            Tool::GetTableSchema => format!("Column types, nullability, defaults and comments of one table ({})", backend),
            Tool::ExecuteSql => format!(
                "Run a read-only SELECT/WITH statement; a LIMIT of max_rows is appended when missing ({})",
                backend
            ),
            Tool::GetBuiltinPrompt => format!("Built-in prompt text: analysis, sql_rules or react ({})", backend),
        }
    }

    /// Resolve a tool name, accepting the backend-prefixed prompt alias
    pub fn lookup(name: &str, db_type: DatabaseType) -> Option<Tool> {
        let prefixed_prompt = format!("{}_get_builtin_prompt", db_type.as_str());
        if name == prefixed_prompt {
            return Some(Tool::GetBuiltinPrompt);
        }
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ToolList {
    pub backend: &'static str,
    pub tools: Vec<ToolInfo>,
}

/// List the tools a backend exposes
pub async fn list_tools<A: DatabaseAdapter>(
    State(gateway): State<Arc<QueryGateway<A>>>,
) -> Json<ToolList> {
    let db_type = gateway.database_type();
    let tools = Tool::ALL
        .into_iter()
        .map(|tool| ToolInfo {
            name: tool.name(),
            description: tool.description(db_type),
        })
        .collect();

    Json(ToolList {
        backend: db_type.as_str(),
        tools,
    })
}

/// Invoke one tool with a JSON payload. An empty body is an empty payload.
pub async fn call_tool<A: DatabaseAdapter>(
    State(gateway): State<Arc<QueryGateway<A>>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let db_type = gateway.database_type();
    let tool = Tool::lookup(&name, db_type)
        .ok_or_else(|| AppError::NotFound(format!("Unknown tool: {}", name)))?;

    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)?
    };

    tracing::info!("Tool call {}.{}", db_type.as_str(), tool.name());

    let response = match tool {
        Tool::GetAllSchemas => {
            let request: ConnectionRequest = serde_json::from_value(payload)?;
            Json(gateway.get_all_schemas(request).await?).into_response()
        }
        Tool::GetTables => {
            let request: GetTablesRequest = serde_json::from_value(payload)?;
            Json(gateway.get_tables(request).await?).into_response()
        }
        Tool::GetTableSchema => {
            let request: GetTableSchemaRequest = serde_json::from_value(payload)?;
            Json(gateway.get_table_schema(request).await?).into_response()
        }
        Tool::ExecuteSql => {
            let request: ExecuteSqlRequest = serde_json::from_value(payload)?;
            Json(gateway.execute_sql(request).await?).into_response()
        }
        Tool::GetBuiltinPrompt => {
            let request: PromptRequest = serde_json::from_value(payload)?;
            Json(gateway.get_builtin_prompt(&request.name)?).into_response()
        }
    };

    Ok(response)
}
