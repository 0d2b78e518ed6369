use crate::services::reclaim::{ReclaimOutcome, SafeDeletePolicy};
use crate::services::storage::StorageService;
use crate::services::upload_store::UploadStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Files found in the upload directory
    pub scanned: usize,
    /// Files backed by an attached record
    pub kept: usize,
    /// Stray files handed to the delete policy
    pub reclaimed: usize,
    /// Unattached records removed from the store
    pub purged: usize,
    /// Reclamations that failed and will be retried next cycle
    pub failed: usize,
}

/// Periodic reconciliation between the upload directory and the record store.
///
/// Every cycle reclaims each file without an attached record and drops every
/// unattached record, so no orphan outlives one interval.
pub struct StrayReconciliationSweep {
    store: UploadStore,
    storage: Arc<dyn StorageService>,
    policy: SafeDeletePolicy,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StrayReconciliationSweep {
    pub fn new(
        store: UploadStore,
        storage: Arc<dyn StorageService>,
        policy: SafeDeletePolicy,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            storage,
            policy,
            interval,
            shutdown,
        }
    }

    /// Spawns the sweep loop; it runs until the shutdown channel fires.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!("🧹 Stray upload sweep started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Stray upload sweep shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!("Sweep cycle abandoned, retrying next interval: {:#}", e);
                    }
                }
            }
        }
    }

    /// One reconciliation pass.
    pub async fn run_cycle(&self) -> Result<SweepReport> {
        tracing::info!("🧹 Reconciling upload directory...");
        let mut report = SweepReport::default();

        let files = self.storage.list_files().await?;
        report.scanned = files.len();

        // Purge first: a record dropped here can no longer be attached while we
        // work through the files.
        match self.store.purge_unattached().await {
            Ok(purged) => report.purged = purged as usize,
            Err(e) => tracing::warn!("Purge of unattached records failed: {}", e),
        }

        let attached = self.store.list_attached_file_names().await?;

        for file in files {
            if attached.contains(&file) {
                report.kept += 1;
                continue;
            }

            // Attached after the snapshot above
            match self.store.is_file_attached(&file).await {
                Ok(true) => {
                    report.kept += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Could not re-check {}, leaving it for next cycle: {}", file, e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.policy.reclaim(&file).await {
                ReclaimOutcome::Failed(_) => report.failed += 1,
                ReclaimOutcome::AlreadyGone => {}
                ReclaimOutcome::Removed | ReclaimOutcome::Quarantined => report.reclaimed += 1,
            }
        }

        tracing::info!(
            "✅ Sweep finished: scanned={}, kept={}, reclaimed={}, purged={}, failed={}",
            report.scanned,
            report.kept,
            report.reclaimed,
            report.purged,
            report.failed
        );

        Ok(report)
    }
}
