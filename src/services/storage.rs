use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn save_file(&self, file_name: &str, data: &[u8]) -> Result<()>;
    /// Names of the regular files currently in the upload directory
    async fn list_files(&self) -> Result<Vec<String>>;
    /// Unlinks the file. Returns `false` when it was already gone.
    async fn delete_file(&self, file_name: &str) -> Result<bool>;
    /// Moves the file into the holding area. Returns `None` when it was already gone.
    async fn move_to_holding(&self, file_name: &str) -> Result<Option<PathBuf>>;
    async fn health_check(&self) -> Result<()>;
}

/// Rejects names that could resolve outside the upload directory
pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains('\0')
    {
        return Err(anyhow!("Invalid storage file name: {:?}", file_name));
    }
    Ok(())
}

pub struct LocalStorageService {
    upload_dir: PathBuf,
    holding_dir: PathBuf,
}

impl LocalStorageService {
    pub fn new(upload_dir: impl Into<PathBuf>, holding_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            holding_dir: holding_dir.into(),
        }
    }

    /// Creates the upload and holding directories if missing
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.holding_dir).await?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn holding_dir(&self) -> &Path {
        &self.holding_dir
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.upload_dir.join(file_name))
    }

    async fn holding_destination(&self, file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.holding_dir).await?;

        let dest = self.holding_dir.join(file_name);
        if !tokio::fs::try_exists(&dest).await? {
            return Ok(dest);
        }

        // Never overwrite an earlier reclaimed copy; the uuid keeps two
        // reclaims within the same millisecond apart
        let stamped = format!(
            "{}.{}-{}",
            file_name,
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f"),
            Uuid::new_v4().simple()
        );
        Ok(self.holding_dir.join(stamped))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn save_file(&self, file_name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(file_name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.upload_dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push(name),
                Err(name) => {
                    tracing::warn!("Skipping non UTF-8 file name in upload dir: {:?}", name)
                }
            }
        }

        Ok(files)
    }

    async fn delete_file(&self, file_name: &str) -> Result<bool> {
        let path = self.resolve(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_to_holding(&self, file_name: &str) -> Result<Option<PathBuf>> {
        let source = self.resolve(file_name)?;
        if !tokio::fs::try_exists(&source).await? {
            return Ok(None);
        }

        let dest = self.holding_destination(file_name).await?;
        match tokio::fs::rename(&source, &dest).await {
            Ok(()) => Ok(Some(dest)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                // Holding area may live on another filesystem
                tracing::debug!(
                    "rename {} -> {} failed ({}), falling back to copy",
                    source.display(),
                    dest.display(),
                    e
                );
                match tokio::fs::copy(&source, &dest).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                match tokio::fs::remove_file(&source).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(Some(dest))
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.upload_dir).await?;
        if !meta.is_dir() {
            return Err(anyhow!(
                "Upload path {} is not a directory",
                self.upload_dir.display()
            ));
        }
        Ok(())
    }
}
