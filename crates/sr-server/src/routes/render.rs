//! Render admission.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sr_core::{RenderRequest, StoryId};

use super::parse_path_id;
use crate::context::AppContext;
use crate::error::AppError;

/// Response for an admitted render.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RenderAccepted {
    pub job_id: String,
    pub status: String,
}

/// POST /api/stories/{id}/render
#[utoipa::path(
    post,
    path = "/api/stories/{id}/render",
    params(("id" = String, Path, description = "Story id")),
    request_body = RenderRequest,
    responses(
        (status = 202, description = "Render admitted", body = RenderAccepted),
        (status = 400, description = "Invalid settings or story"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Story not found"),
        (status = 409, description = "A render for this story is in flight"),
        (status = 429, description = "Render capacity exhausted")
    )
)]
pub async fn submit_render(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let story_id: StoryId = parse_path_id("story", &id)?;
    let job_id = ctx.scheduler.admit(story_id, &request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RenderAccepted {
            job_id: job_id.to_string(),
            status: "processing".into(),
        }),
    ))
}
