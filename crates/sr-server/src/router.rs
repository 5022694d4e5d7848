//! Axum router construction.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::render::submit_render,
        routes::jobs::get_job,
        routes::jobs::list_story_jobs,
        routes::videos::get_video,
        routes::credits::get_credits,
        routes::health::health_check,
    ),
    components(schemas(
        routes::render::RenderAccepted,
        routes::jobs::JobResponse,
        routes::videos::VideoResponse,
        routes::credits::CreditsResponse,
        routes::credits::CreditEntry,
        routes::health::HealthResponse,
        routes::health::ToolStatus,
        sr_core::RenderRequest,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{o}'");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.server.cors_origins);
    let media_dir = ctx.config.storage.output_dir.clone();

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/stories/{id}/render", post(routes::render::submit_render))
        .route("/stories/{id}/jobs", get(routes::jobs::list_story_jobs))
        .route("/stories/{id}/video", get(routes::videos::get_video))
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/users/{id}/credits", get(routes::credits::get_credits))
        .route("/events", get(routes::events::events_handler));

    Router::new()
        .nest("/api", api)
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
