//! The story's current published video.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use sr_core::StoryId;

use super::parse_path_id;
use crate::context::AppContext;
use crate::error::AppError;

/// The story's current video.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub story_id: String,
    pub job_id: String,
    pub url: String,
    pub duration: f64,
    pub is_valid: bool,
    pub created_at: String,
}

/// GET /api/stories/{id}/video
#[utoipa::path(
    get,
    path = "/api/stories/{id}/video",
    params(("id" = String, Path, description = "Story id")),
    responses(
        (status = 200, description = "Current video", body = VideoResponse),
        (status = 404, description = "No video yet")
    )
)]
pub async fn get_video(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<VideoResponse>, AppError> {
    let story_id: StoryId = parse_path_id("story", &id)?;
    let conn = sr_db::pool::get_conn(&ctx.db)?;
    let video = sr_db::queries::final_videos::current_for_story(&conn, story_id)?
        .ok_or_else(|| sr_core::Error::not_found("video for story", story_id))?;
    Ok(Json(VideoResponse {
        id: video.id.to_string(),
        story_id: video.story_id.to_string(),
        job_id: video.job_id.to_string(),
        url: video.url,
        duration: video.duration,
        is_valid: video.is_valid,
        created_at: video.created_at,
    }))
}
