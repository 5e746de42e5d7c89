use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::AppState;
use crate::storage::Report;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: String,
}

pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "backend is active" }))
}

/// 存活检查，数据库不可用时返回 503
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(Duration::from_secs(5), state.db.ping()).await {
        Ok(Ok(())) => "ok".to_string(),
        Ok(Err(e)) => format!("error: {}", e),
        Err(_) => "error: timeout".to_string(),
    };

    let healthy = database == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "unhealthy" }.to_string(),
            database,
        }),
    )
}

pub async fn search_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Json<Report>> {
    let Query(params) = params?;
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(AppError::Validation("缺少 query 参数".to_string()));
    }

    let report = state.pipeline.run_search(&query).await?;
    Ok(Json(report))
}

pub async fn history_handler(State(state): State<AppState>) -> AppResult<Json<Vec<Report>>> {
    Ok(Json(state.db.list_all().await?))
}

pub async fn report_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Report>> {
    let Path(id) = id?;
    Ok(Json(state.db.get(id).await?))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Value>> {
    let Path(id) = id?;
    state.db.delete(id).await?;
    Ok(Json(json!({ "message": format!("报告 {} 已删除", id) })))
}
