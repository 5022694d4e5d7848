//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a scratch
//! directory, EventBus, and a full [`AppContext`] whose render pipeline runs
//! against in-process media doubles. The [`with_server`] constructor starts
//! Axum on a random port for HTTP-level testing.
//!
//! The in-memory pool holds a single connection: never keep one from
//! [`TestHarness::conn`] alive across a request.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use sr_av::ToolRegistry;
use sr_core::config::Config;
use sr_core::events::EventBus;
use sr_core::{Scene, Story};
use sr_db::pool::{init_memory_pool, DbPool};
use sr_render::testing::{MemoryArtifactStore, MockEngine, MockFetcher};
use sr_render::{RenderPipeline, Scheduler};
use sr_server::context::AppContext;
use sr_server::router::build_router;

pub use sr_render::testing::{scene, story};

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub engine: Arc<MockEngine>,
    pub artifacts: Arc<MemoryArtifactStore>,
    _scratch: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a new harness, adjusting the default configuration first.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let scratch = tempfile::tempdir().expect("failed to create scratch dir");
        let mut config = Config::default();
        config.render.scratch_dir = scratch.path().join("scratch");
        config.storage.output_dir = scratch.path().join("media");
        adjust(&mut config);

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let engine = Arc::new(MockEngine::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let event_bus = Arc::new(EventBus::default());

        let pipeline = RenderPipeline::new(engine.clone(), Arc::new(MockFetcher::new()), &config);
        let scheduler = Scheduler::new(db.clone(), pipeline, event_bus.clone(), &config)
            .with_artifact_store(artifacts.clone());

        let ctx = AppContext {
            db: db.clone(),
            config: Arc::new(config),
            event_bus,
            tools: Arc::new(ToolRegistry::default()),
            scheduler: Arc::new(scheduler),
        };

        Self {
            ctx,
            db,
            engine,
            artifacts,
            _scratch: scratch,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    pub fn router(&self) -> Router {
        build_router(self.ctx.clone())
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> sr_db::pool::PooledConnection {
        sr_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Store `scenes` as a new story and give its owner `credits`.
    pub fn seed_story(&self, scenes: Vec<Scene>, credits: i64) -> Story {
        let story = story(scenes);
        let conn = self.conn();
        sr_db::queries::stories::insert_story(&conn, &story).expect("insert story");
        if credits > 0 {
            sr_db::queries::credits::grant(&conn, story.user_id, credits, "test grant")
                .expect("grant credits");
        }
        story
    }

    /// A three-scene narrated story: 4s, 6s, and 5s of narration.
    pub fn seed_narrated_story(&self, credits: i64) -> Story {
        let scenes = [(0, 4), (1, 6), (2, 5)]
            .into_iter()
            .map(|(order, secs)| {
                let mut s = scene(order, "the quick brown fox");
                s.audio_url = Some(format!("https://cdn.test/voice-{order}.mp3#d={secs}"));
                s
            })
            .collect();
        self.seed_story(scenes, credits)
    }

    pub fn balance(&self, story: &Story) -> i64 {
        let conn = self.conn();
        sr_db::queries::credits::balance(&conn, story.user_id).expect("balance")
    }

    /// Wait for every render in flight to settle.
    pub async fn drain(&self) {
        self.ctx.scheduler.drain().await;
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::get(uri).body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router().oneshot(request).await.expect("router error");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}
