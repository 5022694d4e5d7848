//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Timestamps are stored as fixed-width RFC 3339 UTC
//! strings (see [`timestamp`]) so they order lexically.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sr_core::{JobId, StoryId, TransactionId, UserId, VideoId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
pub(crate) fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

/// Format a timestamp the way every table stores it.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// RenderJob
// ---------------------------------------------------------------------------

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: JobId,
    pub story_id: StoryId,
    pub user_id: UserId,
    pub status: JobStatus,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    pub stage: Option<String>,
    /// Validated render settings as JSON.
    pub settings: String,
    pub error: Option<String>,
    pub result_video_url: Option<String>,
    pub result_duration: Option<f64>,
    pub credits_charged: i64,
    pub credits_refunded: bool,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl RenderJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let status: String = row.get(3)?;
        let status = JobStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown job status '{status}'").into(),
            )
        })?;
        Ok(Self {
            id: parse_id(row, 0)?,
            story_id: parse_id(row, 1)?,
            user_id: parse_id(row, 2)?,
            status,
            progress: row.get(4)?,
            stage: row.get(5)?,
            settings: row.get(6)?,
            error: row.get(7)?,
            result_video_url: row.get(8)?,
            result_duration: row.get(9)?,
            credits_charged: row.get(10)?,
            credits_refunded: row.get(11)?,
            started_at: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }

    /// Whole seconds since the job started, as seen at `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        parse_timestamp(&self.started_at)
            .map(|started| (now - started).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// FinalVideo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FinalVideo {
    pub id: VideoId,
    pub story_id: StoryId,
    pub job_id: JobId,
    /// Key in the artifact store.
    pub storage_key: String,
    pub url: String,
    pub is_valid: bool,
    pub duration: f64,
    pub created_at: String,
}

impl FinalVideo {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            story_id: parse_id(row, 1)?,
            job_id: parse_id(row, 2)?,
            storage_key: row.get(3)?,
            url: row.get(4)?,
            is_valid: row.get(5)?,
            duration: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Credits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Signed change to the balance.
    pub amount: i64,
    /// `grant`, `deduct`, or `refund`.
    pub kind: String,
    pub reason: String,
    pub story_id: Option<String>,
    pub balance_after: i64,
    pub created_at: String,
}

impl CreditTransaction {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            amount: row.get(2)?,
            kind: row.get(3)?,
            reason: row.get(4)?,
            story_id: row.get(5)?,
            balance_after: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
