//! sr-render: the story render pipeline and job scheduler.
//!
//! A render resolves each scene's assets, plans the timeline, renders one
//! clip per slot, compiles word-level captions, mixes narration with
//! optional music, and assembles the final video. Every stage is a trait
//! over a [`MediaEngine`] and an [`AssetFetcher`] so tests can run the full
//! pipeline without ffmpeg or the network.
//!
//! The [`Scheduler`] admits jobs under a concurrency gate, runs them in the
//! background, and settles credits with the [`CreditLedger`].

pub mod captions;
pub mod engine;
pub mod fetch;
pub mod ledger;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod stages;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{FfmpegEngine, MediaEngine};
pub use fetch::{AssetFetcher, HttpFetcher};
pub use ledger::{CreditLedger, DbLedger, LedgerReceipt};
pub use pipeline::RenderPipeline;
pub use progress::{ProgressSender, ProgressSpan};
pub use scheduler::Scheduler;
pub use store::{ArtifactStore, DbSceneStore, LocalArtifactStore, SceneStore};
