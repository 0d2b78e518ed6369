use crate::config::UploadConfig;
use crate::services::storage::LocalStorageService;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &UploadConfig) -> anyhow::Result<Arc<LocalStorageService>> {
    let storage = LocalStorageService::new(&config.upload_dir, &config.reclaimed_dir);
    storage.init().await?;

    info!(
        "💾 Upload storage: {} (reclaimed: {})",
        storage.upload_dir().display(),
        storage.holding_dir().display()
    );

    Ok(Arc::new(storage))
}
