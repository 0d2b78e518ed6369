use crate::entities::uploads::{self, UploadKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub id: String,
    pub path: String,
    pub upload_kind: UploadKind,
    pub attached: bool,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<uploads::Model> for UploadResponse {
    fn from(model: uploads::Model) -> Self {
        Self {
            id: model.id,
            path: model.path,
            upload_kind: model.upload_kind,
            attached: model.attached,
            uploaded_by: model.uploaded_by,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachRequest {
    /// Paths returned by the upload endpoint that the listing keeps
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachResponse {
    pub attached: Vec<UploadResponse>,
}
