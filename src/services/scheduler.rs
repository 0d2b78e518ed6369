use crate::services::reclaim::{ReclaimOutcome, SafeDeletePolicy};
use crate::services::upload_store::UploadStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Record already gone, usually reclaimed by the sweep
    Missing,
    /// Record was claimed by a listing and stays
    Attached,
    /// Record deleted and its file reclaimed
    Reclaimed(ReclaimOutcome),
    /// Store unreachable; the sweep will pick the record up later
    Failed(String),
}

/// Arms one timer per new upload and reclaims the upload if nobody attached it
/// before the timer fired.
///
/// Timers live in memory only. A restart loses them, which is fine because the
/// reconciliation sweep reclaims whatever they would have.
#[derive(Clone)]
pub struct DeferredDeletionScheduler {
    store: UploadStore,
    policy: SafeDeletePolicy,
    delay: Duration,
    timers: Arc<DashMap<String, AbortHandle>>,
}

impl DeferredDeletionScheduler {
    pub fn new(store: UploadStore, policy: SafeDeletePolicy, delay: Duration) -> Self {
        Self {
            store,
            policy,
            delay,
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Arms the timer for `upload_id`, replacing any timer already armed for it.
    pub fn schedule(&self, upload_id: &str) {
        let this = self.clone();
        let id = upload_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.timers.remove(&id);
            this.fire(&id).await;
        });

        if let Some(previous) = self
            .timers
            .insert(upload_id.to_string(), handle.abort_handle())
        {
            previous.abort();
        }

        tracing::debug!(
            "⏲️  Scheduled deletion check for upload {} in {:?}",
            upload_id,
            self.delay
        );
    }

    /// Disarms the timer for `upload_id`. Returns `false` if none was armed.
    pub fn cancel(&self, upload_id: &str) -> bool {
        match self.timers.remove(upload_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Aborts every armed timer
    pub fn shutdown(&self) {
        let count = self.timers.len();
        self.timers.retain(|_, handle| {
            handle.abort();
            false
        });
        if count > 0 {
            tracing::info!("🛑 Dropped {} pending deletion timers", count);
        }
    }

    /// Runs the deletion check for one upload right now.
    pub async fn fire(&self, upload_id: &str) -> FireOutcome {
        let record = match self.store.find_by_id(upload_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("Upload {} already gone, nothing to do", upload_id);
                return FireOutcome::Missing;
            }
            Err(e) => {
                tracing::error!("Deletion check for upload {} failed: {}", upload_id, e);
                return FireOutcome::Failed(e.to_string());
            }
        };

        if record.attached {
            tracing::debug!("Upload {} is attached, keeping it", upload_id);
            return FireOutcome::Attached;
        }

        // The delete only succeeds while the record is still unattached, so an
        // attach that lands first keeps the file.
        match self.store.delete_if_unattached(upload_id).await {
            Ok(true) => {}
            Ok(false) => {
                return match self.store.find_by_id(upload_id).await {
                    Ok(Some(_)) => FireOutcome::Attached,
                    Ok(None) => FireOutcome::Missing,
                    Err(e) => FireOutcome::Failed(e.to_string()),
                };
            }
            Err(e) => {
                tracing::error!("Failed to delete upload record {}: {}", upload_id, e);
                return FireOutcome::Failed(e.to_string());
            }
        }

        tracing::info!(
            "⌛ Upload {} ({}) was never attached, reclaiming",
            upload_id,
            record.file_name
        );
        FireOutcome::Reclaimed(self.policy.reclaim(&record.file_name).await)
    }
}
