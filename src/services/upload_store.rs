use crate::entities::uploads::{self, UploadKind};
use crate::entities::prelude::*;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload not found: {0}")]
    NotFound(String),

    #[error("Upload already attached: {0}")]
    AlreadyAttached(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// On-disk name for a stored path: everything after the last `/`
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Data access for upload records
#[derive(Clone)]
pub struct UploadStore {
    db: DatabaseConnection,
}

impl UploadStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create(
        &self,
        path: &str,
        upload_kind: UploadKind,
        uploaded_by: &str,
    ) -> Result<uploads::Model, UploadError> {
        let record = uploads::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            path: Set(path.to_string()),
            file_name: Set(file_name_of(path).to_string()),
            upload_kind: Set(upload_kind),
            attached: Set(false),
            uploaded_by: Set(uploaded_by.to_string()),
            created_at: Set(Utc::now()),
        };

        Ok(record.insert(&self.db).await?)
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<uploads::Model>, UploadError> {
        Self::find_by_path_on(&self.db, path).await
    }

    pub(crate) async fn find_by_path_on(
        db: &impl ConnectionTrait,
        path: &str,
    ) -> Result<Option<uploads::Model>, UploadError> {
        Ok(Uploads::find()
            .filter(uploads::Column::Path.eq(path))
            .one(db)
            .await?)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<uploads::Model>, UploadError> {
        Ok(Uploads::find_by_id(id).one(&self.db).await?)
    }

    /// Flips `attached` on a single record. Attaching twice is a conflict.
    pub async fn mark_attached(&self, id: &str) -> Result<uploads::Model, UploadError> {
        let flipped = Self::mark_attached_many(&self.db, &[id.to_string()]).await?;
        if flipped == 1 {
            return self
                .find_by_id(id)
                .await?
                .ok_or_else(|| UploadError::NotFound(id.to_string()));
        }

        match self.find_by_id(id).await? {
            Some(_) => Err(UploadError::AlreadyAttached(id.to_string())),
            None => Err(UploadError::NotFound(id.to_string())),
        }
    }

    /// Sets `attached` on every listed record that is still unattached,
    /// returning how many rows changed.
    pub(crate) async fn mark_attached_many(
        db: &impl ConnectionTrait,
        ids: &[String],
    ) -> Result<u64, UploadError> {
        let res = Uploads::update_many()
            .col_expr(uploads::Column::Attached, Expr::value(true))
            .filter(uploads::Column::Id.is_in(ids.iter().cloned()))
            .filter(uploads::Column::Attached.eq(false))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Deleting a missing record is a no-op.
    pub async fn delete(&self, id: &str) -> Result<(), UploadError> {
        Uploads::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    /// Deletes the record only while it is still unattached. Returns `true`
    /// when this call removed it.
    pub async fn delete_if_unattached(&self, id: &str) -> Result<bool, UploadError> {
        let res = Uploads::delete_many()
            .filter(uploads::Column::Id.eq(id))
            .filter(uploads::Column::Attached.eq(false))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    pub async fn list_attached_paths(&self) -> Result<Vec<String>, UploadError> {
        Ok(Uploads::find()
            .select_only()
            .column(uploads::Column::Path)
            .filter(uploads::Column::Attached.eq(true))
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }

    pub async fn list_attached_file_names(&self) -> Result<HashSet<String>, UploadError> {
        let names = Uploads::find()
            .select_only()
            .column(uploads::Column::FileName)
            .filter(uploads::Column::Attached.eq(true))
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(names.into_iter().collect())
    }

    pub async fn is_file_attached(&self, file_name: &str) -> Result<bool, UploadError> {
        let found = Uploads::find()
            .filter(uploads::Column::FileName.eq(file_name))
            .filter(uploads::Column::Attached.eq(true))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Removes every unattached record, returning how many went.
    pub async fn purge_unattached(&self) -> Result<u64, UploadError> {
        let res = Uploads::delete_many()
            .filter(uploads::Column::Attached.eq(false))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}
