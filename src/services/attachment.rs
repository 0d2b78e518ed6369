use crate::entities::uploads;
use crate::services::scheduler::DeferredDeletionScheduler;
use crate::services::upload_store::{UploadError, UploadStore};
use sea_orm::TransactionTrait;
use std::collections::HashSet;

/// Claims uploaded files for a listing.
#[derive(Clone)]
pub struct AttachmentTracker {
    store: UploadStore,
    scheduler: Option<DeferredDeletionScheduler>,
}

impl AttachmentTracker {
    pub fn new(store: UploadStore) -> Self {
        Self {
            store,
            scheduler: None,
        }
    }

    /// Disarm per-upload timers once their uploads are claimed
    pub fn with_scheduler(mut self, scheduler: DeferredDeletionScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Marks every upload in `paths` as attached, or none of them.
    ///
    /// Fails with `NotFound` if a path has no record and with `AlreadyAttached`
    /// if one was already claimed, including by a concurrent call.
    pub async fn attach(&self, paths: &[String]) -> Result<Vec<uploads::Model>, UploadError> {
        let mut seen = HashSet::new();
        let paths: Vec<&String> = paths.iter().filter(|p| seen.insert(p.as_str())).collect();

        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.store.connection().begin().await?;

        let mut records = Vec::with_capacity(paths.len());
        for path in &paths {
            let record = UploadStore::find_by_path_on(&txn, path)
                .await?
                .ok_or_else(|| UploadError::NotFound(path.to_string()))?;

            if record.attached {
                return Err(UploadError::AlreadyAttached(path.to_string()));
            }
            records.push(record);
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let flipped = UploadStore::mark_attached_many(&txn, &ids).await?;

        if flipped != ids.len() as u64 {
            // Lost a race against another attach or a deletion; dropping the
            // transaction rolls back the rows we did flip.
            tracing::warn!(
                "Attach claimed {} of {} uploads, rolling back",
                flipped,
                ids.len()
            );
            return Err(UploadError::AlreadyAttached(
                paths
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }

        txn.commit().await?;

        if let Some(scheduler) = &self.scheduler {
            for id in &ids {
                scheduler.cancel(id);
            }
        }

        tracing::info!("📎 Attached {} uploads", records.len());

        Ok(records
            .into_iter()
            .map(|mut r| {
                r.attached = true;
                r
            })
            .collect())
    }
}
