//! Route handlers for the HTTP API.

use std::str::FromStr;

use crate::error::AppError;

pub mod credits;
pub mod events;
pub mod health;
pub mod jobs;
pub mod render;
pub mod videos;

/// Parse a path identifier, reporting a malformed one as a 400.
pub(crate) fn parse_path_id<T: FromStr>(entity: &str, raw: &str) -> Result<T, AppError> {
    raw.parse::<T>()
        .map_err(|_| sr_core::Error::Validation(format!("invalid {entity} id '{raw}'")).into())
}
