//! Render job records and the admission transaction.
//!
//! Every write that changes a job's status is conditional on
//! `status = 'processing'`, so a job transitions to a terminal state at most
//! once no matter how many writers race for it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use sr_core::{Error, JobId, Result, StoryId, UserId};

use crate::models::{timestamp, JobStatus, RenderJob};

const COLS: &str = "id, story_id, user_id, status, progress, stage, settings, error,
    result_video_url, result_duration, credits_charged, credits_refunded,
    started_at, completed_at";

/// Limits applied by [`admit_job`].
#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    /// Maximum jobs processing at once across all stories.
    pub max_active: usize,
    /// Age past which a processing job is presumed dead.
    pub stale_after: Duration,
}

/// Decision reached by [`admit_job`].
#[derive(Debug, Clone)]
pub enum Verdict {
    Admitted(RenderJob),
    /// A fresh job already holds the story.
    InFlight { job_id: JobId, age_secs: u64 },
    /// The global limit is still reached after reclamation.
    Busy { active: usize, limit: usize },
}

/// Result of an admission attempt.
///
/// Stale jobs are reclaimed even when the new job is then refused, so
/// `reclaimed` is meaningful for every verdict.
#[derive(Debug, Clone)]
pub struct Admission {
    pub reclaimed: Vec<RenderJob>,
    pub verdict: Verdict,
}

/// Reclaim stale jobs, check both limits, and insert a new job, all under
/// one `BEGIN IMMEDIATE` transaction so concurrent admissions serialize on
/// the database write lock.
pub fn admit_job(
    conn: &Connection,
    story_id: StoryId,
    user_id: UserId,
    settings: &str,
    limits: AdmissionLimits,
    now: DateTime<Utc>,
) -> Result<Admission> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))?;

    let reclaimed = reclaim_stale_in(&tx, limits.stale_after, now)?;

    let verdict = if let Some(holder) = find_processing_for_story(&tx, story_id)? {
        Verdict::InFlight {
            job_id: holder.id,
            age_secs: holder.age_secs(now),
        }
    } else {
        let active = count_processing(&tx)?;
        if active >= limits.max_active {
            Verdict::Busy {
                active,
                limit: limits.max_active,
            }
        } else {
            Verdict::Admitted(insert_job(&tx, story_id, user_id, settings, now)?)
        }
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Admission { reclaimed, verdict })
}

/// Fail every processing job that started before `now - stale_after`.
///
/// Returns the reclaimed jobs in their post-update state.
pub fn reclaim_stale(
    conn: &Connection,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<RenderJob>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let jobs = reclaim_stale_in(&tx, stale_after, now)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(jobs)
}

fn reclaim_stale_in(
    conn: &Connection,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<RenderJob>> {
    let window = chrono::Duration::from_std(stale_after)
        .map_err(|e| Error::Internal(format!("invalid staleness window: {e}")))?;
    let cutoff = timestamp(now - window);
    let message = format!(
        "Render timed out: no completion within {}s",
        stale_after.as_secs()
    );

    let q = format!(
        "UPDATE render_jobs SET status='failed', error=?1, completed_at=?2
         WHERE status='processing' AND started_at < ?3
         RETURNING {COLS}"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let jobs = stmt
        .query_map(
            rusqlite::params![message, timestamp(now), cutoff],
            RenderJob::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(jobs)
}

/// Fail every processing job regardless of age.
///
/// Used at startup: a job still marked processing belonged to a previous
/// process and can never finish.
pub fn fail_orphaned(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<RenderJob>> {
    let q = format!(
        "UPDATE render_jobs SET status='failed', error=?1, completed_at=?2
         WHERE status='processing'
         RETURNING {COLS}"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let jobs = stmt
        .query_map(
            rusqlite::params!["Render interrupted by server restart", timestamp(now)],
            RenderJob::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(jobs)
}

/// The processing job for a story, if any.
pub fn find_processing_for_story(conn: &Connection, story_id: StoryId) -> Result<Option<RenderJob>> {
    let q = format!(
        "SELECT {COLS} FROM render_jobs WHERE story_id = ?1 AND status = 'processing'
         ORDER BY started_at DESC LIMIT 1"
    );
    match conn.query_row(&q, [story_id.to_string()], RenderJob::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Number of jobs currently processing.
pub fn count_processing(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM render_jobs WHERE status = 'processing'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n as usize)
}

fn insert_job(
    conn: &Connection,
    story_id: StoryId,
    user_id: UserId,
    settings: &str,
    now: DateTime<Utc>,
) -> Result<RenderJob> {
    let id = JobId::new();
    let started_at = timestamp(now);

    conn.execute(
        "INSERT INTO render_jobs (id, story_id, user_id, status, progress, settings, started_at)
         VALUES (?1, ?2, ?3, 'processing', 0, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            story_id.to_string(),
            user_id.to_string(),
            settings,
            &started_at
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(RenderJob {
        id,
        story_id,
        user_id,
        status: JobStatus::Processing,
        progress: 0.0,
        stage: None,
        settings: settings.to_string(),
        error: None,
        result_video_url: None,
        result_duration: None,
        credits_charged: 0,
        credits_refunded: false,
        started_at,
        completed_at: None,
    })
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<RenderJob>> {
    let q = format!("SELECT {COLS} FROM render_jobs WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], RenderJob::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Most recent jobs for a story, newest first.
pub fn list_for_story(conn: &Connection, story_id: StoryId, limit: i64) -> Result<Vec<RenderJob>> {
    let q = format!(
        "SELECT {COLS} FROM render_jobs WHERE story_id = ?1
         ORDER BY started_at DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![story_id.to_string(), limit], RenderJob::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Raise a job's progress. Never lowers it and ignores terminal jobs.
///
/// Returns `true` when the stored value changed.
pub fn update_progress(
    conn: &Connection,
    id: JobId,
    progress: f64,
    stage: Option<&str>,
) -> Result<bool> {
    let progress = progress.clamp(0.0, 100.0);
    let n = conn
        .execute(
            "UPDATE render_jobs SET progress = MAX(progress, ?1), stage = COALESCE(?2, stage)
             WHERE id = ?3 AND status = 'processing' AND progress < ?1",
            rusqlite::params![progress, stage, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a processing job as failed. Returns `false` if it was no longer processing.
pub fn fail_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    let now = timestamp(Utc::now());
    let n = conn
        .execute(
            "UPDATE render_jobs SET status='failed', error=?1, completed_at=?2
             WHERE id=?3 AND status='processing'",
            rusqlite::params![error, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a processing job as completed with its result.
/// Returns `false` if it was no longer processing.
pub fn complete_job(conn: &Connection, id: JobId, video_url: &str, duration: f64) -> Result<bool> {
    let now = timestamp(Utc::now());
    let n = conn
        .execute(
            "UPDATE render_jobs SET status='completed', progress=100, stage=NULL,
                 result_video_url=?1, result_duration=?2, completed_at=?3
             WHERE id=?4 AND status='processing'",
            rusqlite::params![video_url, duration, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record that `amount` credits were deducted for this job.
pub fn record_charge(conn: &Connection, id: JobId, amount: i64) -> Result<()> {
    conn.execute(
        "UPDATE render_jobs SET credits_charged = ?1 WHERE id = ?2",
        rusqlite::params![amount, id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Claim the right to refund a job's charge.
///
/// Returns the amount to refund exactly once per job; later calls (and
/// calls for uncharged jobs) return `None`.
pub fn claim_refund(conn: &Connection, id: JobId) -> Result<Option<i64>> {
    let result = conn.query_row(
        "UPDATE render_jobs SET credits_refunded = 1
         WHERE id = ?1 AND credits_charged > 0 AND credits_refunded = 0
         RETURNING credits_charged",
        [id.to_string()],
        |row| row.get(0),
    );
    match result {
        Ok(amount) => Ok(Some(amount)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
