//! Bazaar Runtime: runs the catalog and review streams end to end.
//!
//! One run: discovery, then both streams concurrently, each going
//! crawl → snapshot → chunk → transform (CPU pool) → load (blocking pool).
//! A skip-crawl run replays the latest snapshots instead of crawling.

pub mod context;
pub mod etl;
pub mod orchestrator;
pub mod snapshot;
pub mod types;

pub use context::RunContext;
pub use orchestrator::Orchestrator;
pub use snapshot::{SnapshotKind, SnapshotStore};
pub use types::*;
