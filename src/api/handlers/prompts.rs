use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::services::{BuiltinPrompt, DatabaseAdapter, QueryGateway};

#[derive(Debug, Serialize)]
pub struct PromptList {
    pub prompts: Vec<&'static str>,
}

pub async fn list_prompts() -> Json<PromptList> {
    Json(PromptList {
        prompts: BuiltinPrompt::ALL.iter().map(BuiltinPrompt::name).collect(),
    })
}

/// Prompt text as markdown
pub async fn get_prompt<A: DatabaseAdapter>(
    State(gateway): State<Arc<QueryGateway<A>>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let text = gateway.get_builtin_prompt(&name)?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], text))
}
