//! Liveness and tool availability.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

/// Availability of one external tool.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
}

/// Health response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub running_renders: usize,
    pub tools: Vec<ToolStatus>,
}

/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let tools = ctx
        .tools
        .check_all()
        .into_iter()
        .map(|info| ToolStatus {
            name: info.name,
            available: info.available,
        })
        .collect();

    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        running_renders: ctx.scheduler.running(),
        tools,
    })
}
