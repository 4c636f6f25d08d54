//! Git operations for OrcaSync.

pub mod client;
pub mod credentials;

pub use client::{BranchOrigin, GitClient, PullState, REMOTE_NAME};
pub use credentials::{CredentialPolicy, RemoteAuth};
