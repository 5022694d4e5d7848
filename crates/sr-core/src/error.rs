//! Unified error type for storyreel.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`]
//! and a stable machine-readable code via [`Error::code`].

use std::fmt;

use crate::ids::JobId;

/// Unified error type covering all failure modes in storyreel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "story", "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A fresh render job is already processing for the same story.
    #[error("A render is already in progress for this story (job {job_id}, {age_secs}s old)")]
    RenderInFlight {
        /// The job that still holds the story.
        job_id: JobId,
        /// Seconds since that job started.
        age_secs: u64,
    },

    /// The global render limit is reached.
    #[error("Render capacity exhausted ({active}/{limit} jobs processing); retry shortly")]
    Busy {
        /// Jobs currently processing.
        active: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// The story owner cannot afford the render.
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits {
        /// Credits a render costs.
        required: i64,
        /// Credits on the account.
        available: i64,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A remote asset could not be fetched.
    #[error("Fetch error [{url}]: {message}")]
    Fetch {
        /// The asset location.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// A render pipeline stage failed.
    #[error("Pipeline error [{step}]: {message}")]
    Pipeline {
        /// The pipeline stage that failed.
        step: String,
        /// Human-readable error description.
        message: String,
    },

    /// The credit ledger rejected or failed an operation.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::RenderInFlight { .. } => 409,
            Error::Busy { .. } => 429,
            Error::InsufficientCredits { .. } => 402,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Fetch { .. } => 502,
            Error::Pipeline { .. } => 500,
            Error::Ledger(_) => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Stable snake_case code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::RenderInFlight { .. } => "render_in_flight",
            Error::Busy { .. } => "busy",
            Error::InsufficientCredits { .. } => "insufficient_credits",
            Error::Database { .. } => "database",
            Error::Io { .. } => "io",
            Error::Tool { .. } => "tool",
            Error::Fetch { .. } => "fetch",
            Error::Pipeline { .. } => "pipeline",
            Error::Ledger(_) => "ledger",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the caller may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy { .. } | Error::RenderInFlight { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Fetch`].
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Pipeline`].
    pub fn pipeline(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Pipeline {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("story", "abc-123");
        assert_eq!(err.to_string(), "story not found: abc-123");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("music volume must be 0-100".into());
        assert_eq!(err.to_string(), "Validation error: music volume must be 0-100");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn render_in_flight_is_conflict() {
        let job_id = JobId::new();
        let err = Error::RenderInFlight {
            job_id,
            age_secs: 42,
        };
        assert_eq!(err.http_status(), 409);
        assert_eq!(err.code(), "render_in_flight");
        assert!(err.to_string().contains(&job_id.to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn busy_is_retryable() {
        let err = Error::Busy {
            active: 10,
            limit: 10,
        };
        assert_eq!(err.http_status(), 429);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("10/10"));
    }

    #[test]
    fn insufficient_credits_is_payment_required() {
        let err = Error::InsufficientCredits {
            required: 10,
            available: 3,
        };
        assert_eq!(err.http_status(), 402);
        assert!(!err.is_retryable());
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn fetch_display() {
        let err = Error::fetch("https://cdn.example/a.png", "HTTP 404");
        assert_eq!(
            err.to_string(),
            "Fetch error [https://cdn.example/a.png]: HTTP 404"
        );
        assert_eq!(err.code(), "fetch");
    }

    #[test]
    fn pipeline_display() {
        let err = Error::pipeline("assemble", "no clips");
        assert_eq!(err.to_string(), "Pipeline error [assemble]: no clips");
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_retryable());
    }

    #[test]
    fn ledger_display() {
        let err = Error::Ledger("account locked".into());
        assert_eq!(err.to_string(), "Ledger error: account locked");
        assert_eq!(err.http_status(), 502);
    }
}
