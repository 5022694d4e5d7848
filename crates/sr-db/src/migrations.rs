//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use sr_core::{Error, Result};

/// V1: stories, scenes, render jobs, and final videos.
const V1_INITIAL: &str = r#"
-- Content store
CREATE TABLE stories (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    title      TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE scenes (
    id               TEXT PRIMARY KEY,
    story_id         TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    scene_order      INTEGER NOT NULL,
    text             TEXT NOT NULL DEFAULT '',
    image_url        TEXT,
    video_url        TEXT,
    audio_url        TEXT,
    word_timestamps  TEXT NOT NULL DEFAULT '[]',
    effect           TEXT NOT NULL DEFAULT 'none',
    overlay_id       TEXT,
    overlay_category TEXT,
    duration         REAL NOT NULL DEFAULT 0,
    UNIQUE (story_id, scene_order)
);

-- Render jobs
CREATE TABLE render_jobs (
    id               TEXT PRIMARY KEY,
    story_id         TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    user_id          TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'processing',
    progress         REAL NOT NULL DEFAULT 0,
    stage            TEXT,
    settings         TEXT NOT NULL DEFAULT '{}',
    error            TEXT,
    result_video_url TEXT,
    result_duration  REAL,
    credits_charged  INTEGER NOT NULL DEFAULT 0,
    credits_refunded INTEGER NOT NULL DEFAULT 0,
    started_at       TEXT NOT NULL,
    completed_at     TEXT
);

CREATE INDEX idx_render_jobs_status ON render_jobs(status, started_at);
CREATE INDEX idx_render_jobs_story ON render_jobs(story_id, started_at);

-- Published artifacts
CREATE TABLE final_videos (
    id          TEXT PRIMARY KEY,
    story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    job_id      TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    url         TEXT NOT NULL,
    is_valid    INTEGER NOT NULL DEFAULT 1,
    duration    REAL NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_final_videos_story ON final_videos(story_id);
"#;

/// V2: credit ledger.
const V2_CREDITS: &str = r#"
CREATE TABLE credit_accounts (
    user_id    TEXT PRIMARY KEY,
    balance    INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    updated_at TEXT NOT NULL
);

CREATE TABLE credit_transactions (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    amount        INTEGER NOT NULL,
    kind          TEXT NOT NULL,
    reason        TEXT NOT NULL,
    story_id      TEXT,
    balance_after INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX idx_credit_transactions_user ON credit_transactions(user_id, created_at);
"#;

/// All migrations in order.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_CREDITS)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        tracing::debug!(version, "applied migration");
    }

    Ok(())
}
