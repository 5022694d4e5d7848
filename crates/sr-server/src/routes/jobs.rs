//! Render job status.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sr_core::{JobId, StoryId};

use super::parse_path_id;
use crate::context::AppContext;
use crate::error::AppError;

/// Query parameters for listing a story's jobs.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Job response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub story_id: String,
    pub status: String,
    pub progress: f64,
    pub stage: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub credits_charged: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl JobResponse {
    fn from_model(job: &sr_db::models::RenderJob) -> Self {
        Self {
            id: job.id.to_string(),
            story_id: job.story_id.to_string(),
            status: job.status.as_str().to_string(),
            progress: job.progress,
            stage: job.stage.clone(),
            video_url: job.result_video_url.clone(),
            duration: job.result_duration,
            error: job.error.clone(),
            credits_charged: job.credits_charged,
            started_at: job.started_at.clone(),
            completed_at: job.completed_at.clone(),
        }
    }
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status", body = JobResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id: JobId = parse_path_id("job", &id)?;
    let conn = sr_db::pool::get_conn(&ctx.db)?;
    let job = sr_db::queries::render_jobs::get_job(&conn, job_id)?
        .ok_or_else(|| sr_core::Error::not_found("job", job_id))?;
    Ok(Json(JobResponse::from_model(&job)))
}

/// GET /api/stories/{id}/jobs
#[utoipa::path(
    get,
    path = "/api/stories/{id}/jobs",
    params(("id" = String, Path, description = "Story id"), ListJobsParams),
    responses(
        (status = 200, description = "Recent jobs, newest first", body = Vec<JobResponse>)
    )
)]
pub async fn list_story_jobs(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<JobResponse>>, AppError> {
    let story_id: StoryId = parse_path_id("story", &id)?;
    let conn = sr_db::pool::get_conn(&ctx.db)?;
    let jobs =
        sr_db::queries::render_jobs::list_for_story(&conn, story_id, params.limit.clamp(1, 100))?;
    Ok(Json(jobs.iter().map(JobResponse::from_model).collect()))
}
