//! Background execution of engine operations.
//!
//! The engine is blocking. [`SyncWorker`] moves it onto tokio's blocking
//! pool and streams progress and the final result back over a channel, so
//! an interactive front end stays responsive. Only one operation runs at a
//! time per worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::models::{SyncOperation, SyncResult, SyncStage};
use crate::sync_engine::SyncEngine;

/// Message sent from a running operation.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress(SyncStage),
    Finished(SyncResult),
}

/// Runs one engine operation at a time off the caller's thread.
#[derive(Debug, Clone, Default)]
pub struct SyncWorker {
    busy: Arc<AtomicBool>,
}

impl SyncWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start `operation` on the blocking pool.
    ///
    /// The receiver yields zero or more `Progress` events followed by one
    /// `Finished`. Fails with [`SyncError::AlreadyRunning`] while another
    /// operation is in flight. Must be called within a tokio runtime.
    pub fn spawn(
        &self,
        mut engine: SyncEngine,
        operation: SyncOperation,
        message: Option<String>,
    ) -> Result<mpsc::UnboundedReceiver<WorkerEvent>, SyncError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let progress_tx = tx.clone();
            let mut progress = move |stage: SyncStage| {
                debug!(%stage, "progress");
                // The receiver may have been dropped; the operation still
                // runs to completion.
                let _ = progress_tx.send(WorkerEvent::Progress(stage));
            };
            let result = engine.run(operation, message.as_deref(), &mut progress);
            if tx.send(WorkerEvent::Finished(result)).is_err() {
                warn!(%operation, "result dropped, receiver closed");
            }
        });
        Ok(rx)
    }
}

/// Drop guard that resets the `busy` flag to `false`.
///
/// The flag is released even if the operation panics.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BranchSource, EffectiveConfig};
    use crate::models::SyncOutcome;
    use crate::platform::PlatformKind;

    fn engine(root: &std::path::Path) -> SyncEngine {
        std::fs::create_dir_all(root.join("user")).unwrap();
        std::fs::write(root.join("user/a.json"), "{}").unwrap();
        SyncEngine::new(EffectiveConfig {
            profile: None,
            platform: PlatformKind::Linux,
            hostname: "worker".into(),
            repository_url: String::new(),
            repository_name: "orca-profiles".into(),
            repository_path: root.join("repo"),
            branch_name: "worker".into(),
            branch_source: BranchSource::Hostname,
            auto_commit: true,
            commit_message_template: "Sync from {hostname}".into(),
            token_env: None,
            user_paths: vec![root.join("user")],
            system_paths: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_worker_streams_progress_then_result() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SyncWorker::new();
        let mut rx = worker
            .spawn(engine(dir.path()), SyncOperation::Push, None)
            .unwrap();

        let mut stages = Vec::new();
        let mut finished = None;
        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Progress(stage) => stages.push(stage),
                WorkerEvent::Finished(result) => finished = Some(result),
            }
        }

        let result = finished.expect("no result");
        assert_eq!(result.outcome, SyncOutcome::Success);
        assert_eq!(stages.first(), Some(&SyncStage::PreparingRepository));
        assert!(stages.contains(&SyncStage::Committing));
        assert!(!worker.is_busy());
    }

    #[tokio::test]
    async fn test_worker_rejects_concurrent_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SyncWorker::new();
        worker.busy.store(true, Ordering::SeqCst);

        let result = worker.spawn(engine(dir.path()), SyncOperation::Sync, None);
        assert!(matches!(result, Err(SyncError::AlreadyRunning)));

        worker.busy.store(false, Ordering::SeqCst);
        assert!(worker.spawn(engine(dir.path()), SyncOperation::Sync, None).is_ok());
    }
}
