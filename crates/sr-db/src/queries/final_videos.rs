//! Final video records: one current valid video per story.

use chrono::Utc;
use rusqlite::Connection;
use sr_core::{Error, JobId, Result, StoryId, VideoId};

use crate::models::{timestamp, FinalVideo};
use crate::queries::render_jobs;

const COLS: &str = "id, story_id, job_id, storage_key, url, is_valid, duration, created_at";

/// Outcome of [`publish`].
#[derive(Debug, Clone)]
pub struct Published {
    pub video: FinalVideo,
    /// Rows removed in the same transaction; their storage objects are now
    /// unreferenced.
    pub superseded: Vec<FinalVideo>,
}

/// Complete `job_id`, record its video as the story's current one, and drop
/// the story's previous video rows, atomically.
///
/// Returns `None` without writing anything when the job is no longer
/// processing (it was reclaimed while rendering).
pub fn publish(
    conn: &Connection,
    job_id: JobId,
    story_id: StoryId,
    storage_key: &str,
    url: &str,
    duration: f64,
) -> Result<Option<Published>> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    if !render_jobs::complete_job(&tx, job_id, url, duration)? {
        // Dropping the transaction rolls back.
        return Ok(None);
    }

    let video = FinalVideo {
        id: VideoId::new(),
        story_id,
        job_id,
        storage_key: storage_key.to_string(),
        url: url.to_string(),
        is_valid: true,
        duration,
        created_at: timestamp(Utc::now()),
    };
    tx.execute(
        "INSERT INTO final_videos (id, story_id, job_id, storage_key, url, is_valid, duration, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
        rusqlite::params![
            video.id.to_string(),
            story_id.to_string(),
            job_id.to_string(),
            storage_key,
            url,
            duration,
            &video.created_at
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let superseded = {
        let q = format!(
            "DELETE FROM final_videos WHERE story_id = ?1 AND id != ?2 RETURNING {COLS}"
        );
        let mut stmt = tx.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map(
                rusqlite::params![story_id.to_string(), video.id.to_string()],
                FinalVideo::from_row,
            )
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(e.to_string()))?;
        rows
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Some(Published { video, superseded }))
}

/// The story's current valid video.
pub fn current_for_story(conn: &Connection, story_id: StoryId) -> Result<Option<FinalVideo>> {
    let q = format!(
        "SELECT {COLS} FROM final_videos WHERE story_id = ?1 AND is_valid = 1
         ORDER BY created_at DESC LIMIT 1"
    );
    match conn.query_row(&q, [story_id.to_string()], FinalVideo::from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
