use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadResponse;
use crate::utils::auth::Claims;
use crate::utils::validation::{validate_file_size, validate_mime_type, verify_magic_bytes};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/upload/{kind}",
    params(
        ("kind" = String, Path, description = "Upload kind, e.g. `picture`")
    ),
    request_body(content = Object, description = "File in the kind's form field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored, pending attachment", body = UploadResponse),
        (status = 400, description = "Unknown kind or missing file"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "uploads"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let policy = state
        .policies
        .resolve(&kind)
        .ok_or_else(|| AppError::BadRequest("Not a valid upload type".to_string()))?;

    let mut payload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::BadRequest(e.body_text())
        }
    })? {
        if field.name() != Some(policy.form_field_name) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        validate_mime_type(&content_type, policy)
            .map_err(|e| AppError::UnsupportedMediaType(e.to_string()))?;

        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge(e.body_text())
            } else {
                AppError::BadRequest(e.body_text())
            }
        })?;
        payload = Some(data);
        break;
    }

    let data = payload.ok_or_else(|| {
        AppError::BadRequest(format!(
            "Please upload a file in the '{}' field.",
            policy.form_field_name
        ))
    })?;

    validate_file_size(data.len(), policy.max_file_size)
        .map_err(|e| AppError::PayloadTooLarge(e.to_string()))?;
    let extension = verify_magic_bytes(&data, policy)
        .map_err(|e| AppError::UnsupportedMediaType(e.to_string()))?;

    let file_name = format!("{}.{}", Uuid::new_v4(), extension);
    state
        .storage
        .save_file(&file_name, &data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    let path = state.config.public_path(&file_name);
    let record = match state.store.create(&path, policy.kind, &claims.sub).await {
        Ok(record) => record,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_file(&file_name).await {
                tracing::warn!("Could not remove unrecorded upload {}: {}", file_name, cleanup);
            }
            return Err(e.into());
        }
    };

    state.scheduler.schedule(&record.id);

    tracing::info!(
        "📤 Stored {} upload {} for {}",
        policy.kind.as_str(),
        record.path,
        claims.sub
    );

    Ok(Json(record.into()))
}
