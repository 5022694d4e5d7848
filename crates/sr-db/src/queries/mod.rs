//! Database query modules.

pub mod credits;
pub mod final_videos;
pub mod render_jobs;
pub mod stories;
