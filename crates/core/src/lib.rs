//! OrcaSync core library.
//!
//! Keeps slicer profile directories consistent across machines through a
//! Git repository: layered configuration resolution, platform path
//! discovery, file-tree mirroring, and the Git-backed sync engine.

pub mod commit_format;
pub mod config;
pub mod errors;
pub mod git;
pub mod mirror;
pub mod models;
pub mod platform;
pub mod sync_engine;
pub mod worker;

// Re-exports for convenience.
pub use config::{EffectiveConfig, RawConfig};
pub use errors::{CoreError, SyncError};
pub use platform::PlatformKind;
pub use sync_engine::SyncEngine;
pub use worker::{SyncWorker, WorkerEvent};
