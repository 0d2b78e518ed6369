use crate::AppState;
use crate::api::error::AppError;
use crate::models::{AttachRequest, AttachResponse};
use axum::{Json, extract::State};

#[utoipa::path(
    post,
    path = "/uploads/attach",
    request_body = AttachRequest,
    responses(
        (status = 200, description = "All uploads claimed", body = AttachResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "A path does not match any pending upload"),
        (status = 409, description = "A path was already claimed")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "uploads"
)]
pub async fn attach_uploads(
    State(state): State<AppState>,
    Json(req): Json<AttachRequest>,
) -> Result<Json<AttachResponse>, AppError> {
    let records = state.tracker.attach(&req.paths).await?;

    Ok(Json(AttachResponse {
        attached: records.into_iter().map(Into::into).collect(),
    }))
}
