use axum::{
    extract::{multipart::MultipartError, Json, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::AuthUser,
    entities::file_upload,
    errors::ServiceError,
    handlers::AppState,
    services::uploads::UploadOutcome,
    ApiResponse, ApiResult,
};

const FILE_FIELD: &str = "file";
const DEFAULT_LIST_LIMIT: u64 = 50;

/// Multipart body accepted by the upload endpoint
#[derive(ToSchema)]
pub struct UploadForm {
    /// A `.csv` or `.xlsx` sheet
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadListParams {
    /// Defaults to 50, at most 500
    pub limit: Option<u64>,
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge("Uploaded file is too large".to_string())
    } else {
        ServiceError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored and imported", body = UploadOutcome),
        (status = 400, description = "Wrong file type or unreadable sheet", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 413, description = "File exceeds the upload limit", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "uploads"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let uploads = &state.services.uploads;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::BadRequest("The file field needs a file name".to_string()))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        if bytes.len() > uploads.max_upload_bytes() {
            return Err(ServiceError::PayloadTooLarge(format!(
                "File exceeds the {} byte upload limit",
                uploads.max_upload_bytes()
            )));
        }

        info!(user_id = auth.user_id, file = %file_name, size = bytes.len(), "Received upload");
        let outcome = uploads
            .store_and_import(&file_name, content_type, &bytes, Some(auth.user_id))
            .await?;
        return Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))));
    }

    Err(ServiceError::BadRequest(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

#[utoipa::path(
    get,
    path = "/api/upload",
    params(UploadListParams),
    responses(
        (status = 200, description = "Recent uploads, newest first", body = [file_upload::Model]),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "uploads"
)]
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(params): Query<UploadListParams>,
) -> ApiResult<Vec<file_upload::Model>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    let uploads = state.services.uploads.list(limit).await?;
    Ok(Json(ApiResponse::success(uploads)))
}
