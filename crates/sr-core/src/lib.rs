//! sr-core: shared types, IDs, errors, configuration, and job events.
//!
//! Every other sr-* crate depends on this one for type-safe identifiers,
//! the unified error type, the story/scene domain model, application
//! configuration, and the broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod story;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use story::*;
