use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::{prompts, tools};
use crate::config::Config;
use crate::models::ToolOutput;
use crate::services::{CacheStats, DatabaseAdapter, MySQLAdapter, PostgreSQLAdapter, QueryGateway, TtlCache};

/// Both backends plus the cache they share
#[derive(Clone)]
pub struct AppState {
    pub mysql: Arc<QueryGateway<MySQLAdapter>>,
    pub pgsql: Arc<QueryGateway<PostgreSQLAdapter>>,
    pub cache: Arc<TtlCache<ToolOutput>>,
}

impl AppState {
    /// Wire both backends to one shared cache. No connection is opened here.
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache.max_entries));

        let mysql = QueryGateway::new(
            MySQLAdapter::new(config.pool.clone()),
            cache.clone(),
            config.mysql.clone(),
            config.cache.clone(),
        );
        let pgsql = QueryGateway::new(
            PostgreSQLAdapter::new(config.pool.clone()),
            cache.clone(),
            config.postgres.clone(),
            config.cache.clone(),
        );

        Self {
            mysql: Arc::new(mysql),
            pgsql: Arc::new(pgsql),
            cache,
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let mysql_prefix = format!("/{}", state.mysql.database_type().as_str());
    let pgsql_prefix = format!("/{}", state.pgsql.database_type().as_str());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/cache/stats", get(cache_stats))
        .with_state(state.cache.clone())
        .nest(&mysql_prefix, backend_router(state.mysql))
        .nest(&pgsql_prefix, backend_router(state.pgsql))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Tool and prompt routes for one backend
pub fn backend_router<A: DatabaseAdapter>(gateway: Arc<QueryGateway<A>>) -> Router {
    Router::new()
        .route("/tools", get(tools::list_tools::<A>))
        .route("/tools/{name}", post(tools::call_tool::<A>))
        .route("/prompts", get(prompts::list_prompts))
        .route("/prompts/{name}", get(prompts::get_prompt::<A>))
        .with_state(gateway)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Database tool gateway: MySQL tools under /mysql, PostgreSQL tools under /pgsql"
    }))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct CacheStatsResponse {
    #[serde(flatten)]
    stats: CacheStats,
    hit_ratio: f64,
    size: usize,
    max_entries: usize,
}

async fn cache_stats(State(cache): State<Arc<TtlCache<ToolOutput>>>) -> Json<CacheStatsResponse> {
    let stats = cache.stats().await;
    Json(CacheStatsResponse {
        hit_ratio: stats.hit_ratio(),
        stats,
        size: cache.size().await,
        max_entries: cache.max_entries(),
    })
}
