//! Caption timeline compilation and ASS subtitle rendering.

pub mod ass;
pub mod timeline;

pub use ass::render_ass;
pub use timeline::{compile, CaptionEvent, CaptionScene, CaptionTimeline};
