use crate::config::SafetyMode;
use crate::services::storage::StorageService;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Unlinked permanently
    Removed,
    /// Moved into the holding area
    Quarantined,
    /// Nothing to do, the file was already gone
    AlreadyGone,
    /// The storage operation failed; logged and swallowed
    Failed(String),
}

/// Decides between unlinking and moving a reclaimed file aside.
///
/// Reclamation is best effort: it never returns an error, so both deletion
/// paths can call it on the same file without coordinating.
#[derive(Clone)]
pub struct SafeDeletePolicy {
    storage: Arc<dyn StorageService>,
    mode: SafetyMode,
}

impl SafeDeletePolicy {
    pub fn new(storage: Arc<dyn StorageService>, mode: SafetyMode) -> Self {
        Self { storage, mode }
    }

    pub async fn reclaim(&self, file_name: &str) -> ReclaimOutcome {
        let result = match self.mode {
            SafetyMode::On => self
                .storage
                .move_to_holding(file_name)
                .await
                .map(|moved| match moved {
                    Some(dest) => {
                        tracing::info!("📦 Reclaimed {} into {}", file_name, dest.display());
                        ReclaimOutcome::Quarantined
                    }
                    None => ReclaimOutcome::AlreadyGone,
                }),
            SafetyMode::Off => self
                .storage
                .delete_file(file_name)
                .await
                .map(|removed| {
                    if removed {
                        tracing::info!("🗑️  Deleted {}", file_name);
                        ReclaimOutcome::Removed
                    } else {
                        ReclaimOutcome::AlreadyGone
                    }
                }),
        };

        match result {
            Ok(ReclaimOutcome::AlreadyGone) => {
                tracing::debug!("{} already gone, nothing to reclaim", file_name);
                ReclaimOutcome::AlreadyGone
            }
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to reclaim {}: {:#}", file_name, e);
                ReclaimOutcome::Failed(e.to_string())
            }
        }
    }
}
