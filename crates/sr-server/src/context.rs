//! Application context shared by route handlers.

use std::sync::Arc;

use sr_av::{EncodeSettings, ToolRegistry};
use sr_core::config::Config;
use sr_core::events::EventBus;
use sr_db::pool::DbPool;
use sr_render::{FfmpegEngine, HttpFetcher, RenderPipeline, Scheduler};

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Broadcast event bus for SSE.
    pub event_bus: Arc<EventBus>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Render admission and execution.
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    /// Wire the production stack: ffmpeg engine, HTTP fetcher, database
    /// scene store and ledger, local artifact store.
    pub fn build(db: DbPool, config: Config, tools: Arc<ToolRegistry>) -> sr_core::Result<Self> {
        let encode = EncodeSettings {
            preset: config.render.video_preset.clone(),
            crf: config.render.video_crf,
            audio_bitrate: config.render.audio_bitrate.clone(),
        };
        let engine = Arc::new(FfmpegEngine::new(tools.clone(), encode));
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let pipeline = RenderPipeline::new(engine, fetcher, &config);

        let event_bus = Arc::new(EventBus::default());
        let scheduler = Scheduler::new(db.clone(), pipeline, event_bus.clone(), &config);

        Ok(Self {
            db,
            config: Arc::new(config),
            event_bus,
            tools,
            scheduler: Arc::new(scheduler),
        })
    }
}
