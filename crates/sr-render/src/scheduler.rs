//! Job admission and background render execution.
//!
//! [`Scheduler::admit`] decides synchronously whether a render may start and
//! returns its id; the render itself runs on a tracked background task.
//! Admission is serialized twice: by an in-process async mutex, and by the
//! `BEGIN IMMEDIATE` transaction in [`render_jobs::admit_job`] for writers in
//! other processes sharing the database.
//!
//! Credits are only taken after a render has produced a non-empty video,
//! and every path that fails a charged job goes through the single-shot
//! refund claim.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use sr_av::{FrameSpec, Workspace};
use sr_core::config::{Config, CreditsConfig, RenderConfig};
use sr_core::events::{EventBus, EventPayload};
use sr_core::{Error, JobId, RenderRequest, RenderSettings, Result, Scene, StoryId, UserId};
use sr_db::models::RenderJob;
use sr_db::pool::{get_conn, DbPool};
use sr_db::queries::{final_videos, render_jobs};
use sr_db::queries::render_jobs::{AdmissionLimits, Verdict};
use tokio_util::task::TaskTracker;

use crate::ledger::{CreditLedger, DbLedger};
use crate::pipeline::RenderPipeline;
use crate::progress::ProgressSender;
use crate::stages::{AssembledVideo, StageContext};
use crate::store::{video_key, ArtifactStore, DbSceneStore, LocalArtifactStore, SceneStore};

const CHARGE_REASON: &str = "story video render";

/// Owns admission state and the background render tasks.
pub struct Scheduler {
    db: DbPool,
    store: Arc<dyn SceneStore>,
    ledger: Arc<dyn CreditLedger>,
    artifacts: Arc<dyn ArtifactStore>,
    pipeline: Arc<RenderPipeline>,
    events: Arc<EventBus>,
    render: RenderConfig,
    credits: CreditsConfig,
    gate: tokio::sync::Mutex<()>,
    tracker: TaskTracker,
}

impl Scheduler {
    /// A scheduler reading stories and credits from `db` and storing
    /// videos under `config.storage`.
    pub fn new(db: DbPool, pipeline: RenderPipeline, events: Arc<EventBus>, config: &Config) -> Self {
        Self {
            store: Arc::new(DbSceneStore::new(db.clone())),
            ledger: Arc::new(DbLedger::new(db.clone())),
            artifacts: Arc::new(LocalArtifactStore::new(&config.storage)),
            db,
            pipeline: Arc::new(pipeline),
            events,
            render: config.render.clone(),
            credits: config.credits.clone(),
            gate: tokio::sync::Mutex::new(()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_scene_store(mut self, store: Arc<dyn SceneStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Renders running in this process.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    fn limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            max_active: self.render.max_concurrent_jobs,
            stale_after: Duration::from_secs(self.render.stale_after_secs),
        }
    }

    /// Admit a render of `story_id` and start it in the background.
    pub async fn admit(self: &Arc<Self>, story_id: StoryId, request: &RenderRequest) -> Result<JobId> {
        let settings = request.validate()?;
        let story = self
            .store
            .load_story(story_id)
            .await?
            .ok_or_else(|| Error::not_found("story", story_id))?;
        let scenes = story.ordered_scenes()?;

        if self.credits.enabled {
            let available = self.ledger.check_balance(story.user_id).await?;
            if available < self.credits.cost_per_render {
                return Err(Error::InsufficientCredits {
                    required: self.credits.cost_per_render,
                    available,
                });
            }
        }

        let settings_json = serde_json::to_string(&settings)
            .map_err(|e| Error::Internal(format!("serialize render settings: {e}")))?;

        let admission = {
            let _gate = self.gate.lock().await;
            let conn = get_conn(&self.db)?;
            render_jobs::admit_job(
                &conn,
                story_id,
                story.user_id,
                &settings_json,
                self.limits(),
                Utc::now(),
            )?
        };

        for job in admission.reclaimed {
            self.on_reclaimed(&job).await;
        }

        match admission.verdict {
            Verdict::InFlight { job_id, age_secs } => {
                tracing::info!(story_id = %story_id, job_id = %job_id, age_secs, "render refused: story already rendering");
                Err(Error::RenderInFlight { job_id, age_secs })
            }
            Verdict::Busy { active, limit } => {
                tracing::warn!(story_id = %story_id, active, limit, "render refused: at capacity");
                Err(Error::Busy { active, limit })
            }
            Verdict::Admitted(job) => {
                let job_id = job.id;
                tracing::info!(job_id = %job_id, story_id = %story_id, scenes = scenes.len(), "render admitted");
                self.events.broadcast(EventPayload::JobAdmitted { job_id, story_id });

                let this = Arc::clone(self);
                self.tracker.spawn(async move {
                    this.run_job(job, scenes, settings).await;
                });
                Ok(job_id)
            }
        }
    }

    /// Fail jobs left processing by a previous process and refund them.
    ///
    /// Call once at startup, before admitting anything.
    pub async fn recover_orphans(&self) -> Result<usize> {
        let orphans = {
            let conn = get_conn(&self.db)?;
            render_jobs::fail_orphaned(&conn, Utc::now())?
        };

        for job in &orphans {
            tracing::warn!(job_id = %job.id, story_id = %job.story_id, "failed render orphaned by restart");
            self.events.broadcast(EventPayload::JobFailed {
                job_id: job.id,
                story_id: job.story_id,
                error: job.error.clone().unwrap_or_default(),
            });
            self.refund(job.id, job.user_id, job.story_id, "render interrupted").await;
        }
        Ok(orphans.len())
    }

    /// Wait for every running render to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn on_reclaimed(&self, job: &RenderJob) {
        let age_secs = job.age_secs(Utc::now());
        tracing::warn!(job_id = %job.id, story_id = %job.story_id, age_secs, "reclaimed stale render");
        self.events.broadcast(EventPayload::JobReclaimed {
            job_id: job.id,
            story_id: job.story_id,
            age_secs,
        });
        self.refund(job.id, job.user_id, job.story_id, "render timed out").await;
    }

    async fn run_job(self: Arc<Self>, job: RenderJob, scenes: Vec<Scene>, settings: RenderSettings) {
        let outcome = AssertUnwindSafe(self.execute(&job, &scenes, settings))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Internal("render task panicked".into())));

        if let Err(e) = outcome {
            tracing::error!(job_id = %job.id, story_id = %job.story_id, error = %e, "render failed");
            self.fail(&job, &e.to_string()).await;
        }
    }

    async fn execute(&self, job: &RenderJob, scenes: &[Scene], settings: RenderSettings) -> Result<()> {
        let workspace = Workspace::for_job(&self.render.scratch_dir, job.id)?;
        let ctx = StageContext {
            job_id: job.id,
            story_id: job.story_id,
            workspace: Arc::new(workspace),
            frame: FrameSpec::new(settings.width, settings.height, self.render.fps),
            settings,
        };

        let progress = self.progress_sender(job.id, job.story_id);
        let video = self.pipeline.run(&ctx, scenes, &progress).await?;
        self.settle(job, &video).await
    }

    /// Persist stage progress and broadcast the updates that moved the bar.
    fn progress_sender(&self, job_id: JobId, story_id: StoryId) -> ProgressSender {
        let db = self.db.clone();
        let events = self.events.clone();
        ProgressSender::new(move |pct, stage| {
            let changed = get_conn(&db)
                .and_then(|conn| render_jobs::update_progress(&conn, job_id, pct, Some(stage)));
            match changed {
                Ok(true) => events.broadcast(EventPayload::JobProgress {
                    job_id,
                    story_id,
                    progress: pct,
                    stage: stage.to_string(),
                }),
                Ok(false) => {}
                Err(e) => tracing::warn!(job_id = %job_id, "progress update failed: {e}"),
            }
        })
    }

    /// Upload, charge, and publish a finished render.
    async fn settle(&self, job: &RenderJob, video: &AssembledVideo) -> Result<()> {
        let size = tokio::fs::metadata(&video.path).await?.len();
        if size == 0 {
            return Err(Error::pipeline("assemble", "final video is empty"));
        }

        let key = video_key(job.story_id, job.id);
        let url = self.artifacts.put(&key, &video.path).await?;

        self.charge(job).await;

        let published = get_conn(&self.db).and_then(|conn| {
            final_videos::publish(&conn, job.id, job.story_id, &key, &url, video.duration)
        });

        match published {
            Ok(Some(published)) => {
                tracing::info!(
                    job_id = %job.id,
                    story_id = %job.story_id,
                    duration = video.duration,
                    bytes = size,
                    url = %url,
                    "render completed"
                );
                self.events.broadcast(EventPayload::JobCompleted {
                    job_id: job.id,
                    story_id: job.story_id,
                    video_url: url,
                    duration: video.duration,
                });
                for old in published.superseded.iter().filter(|v| v.storage_key != key) {
                    if let Err(e) = self.artifacts.delete(&old.storage_key).await {
                        tracing::warn!(key = %old.storage_key, "failed to delete superseded video: {e}");
                    }
                }
                Ok(())
            }
            Ok(None) => {
                tracing::warn!(job_id = %job.id, "render finished after losing its slot; discarding output");
                self.discard(&key).await;
                self.refund(job.id, job.user_id, job.story_id, "render timed out").await;
                Ok(())
            }
            Err(e) => {
                self.discard(&key).await;
                Err(e)
            }
        }
    }

    /// Deduct the render cost. A declined or failed deduction is logged and
    /// the render still completes, uncharged.
    async fn charge(&self, job: &RenderJob) {
        if !self.credits.enabled {
            return;
        }
        let amount = self.credits.cost_per_render;

        match self
            .ledger
            .deduct(job.user_id, amount, CHARGE_REASON, job.story_id)
            .await
        {
            Ok(receipt) if receipt.success => {
                let recorded = get_conn(&self.db)
                    .and_then(|conn| render_jobs::record_charge(&conn, job.id, amount));
                match recorded {
                    Ok(()) => tracing::info!(job_id = %job.id, amount, balance = receipt.new_balance, "credits deducted"),
                    Err(e) => tracing::error!(job_id = %job.id, amount, "deducted but failed to record charge: {e}"),
                }
            }
            Ok(receipt) => {
                tracing::warn!(job_id = %job.id, balance = receipt.new_balance, "deduction declined; completing uncharged");
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, "deduction failed; completing uncharged: {e}");
            }
        }
    }

    async fn fail(&self, job: &RenderJob, message: &str) {
        match get_conn(&self.db).and_then(|conn| render_jobs::fail_job(&conn, job.id, message)) {
            Ok(true) => self.events.broadcast(EventPayload::JobFailed {
                job_id: job.id,
                story_id: job.story_id,
                error: message.to_string(),
            }),
            Ok(false) => tracing::debug!(job_id = %job.id, "job already terminal"),
            Err(e) => tracing::error!(job_id = %job.id, "failed to mark job failed: {e}"),
        }
        self.refund(job.id, job.user_id, job.story_id, "render failed").await;
    }

    /// Refund a job's charge, at most once. Failures are logged, not retried.
    async fn refund(&self, job_id: JobId, user_id: UserId, story_id: StoryId, reason: &str) {
        let claimed = match get_conn(&self.db).and_then(|conn| render_jobs::claim_refund(&conn, job_id)) {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(job_id = %job_id, "refund claim failed: {e}");
                return;
            }
        };
        let Some(amount) = claimed else {
            return;
        };

        match self.ledger.refund(user_id, amount, reason, story_id).await {
            Ok(receipt) => {
                tracing::info!(job_id = %job_id, amount, balance = receipt.new_balance, "credits refunded")
            }
            Err(e) => tracing::error!(job_id = %job_id, amount, "refund failed: {e}"),
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.artifacts.delete(key).await {
            tracing::warn!(key, "failed to delete discarded upload: {e}");
        }
    }
}
