use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::common::created;
use crate::{
    entities::branch,
    errors::ServiceError,
    handlers::AppState,
    services::branches::{BranchDetail, BranchQuery, CreateBranchRequest, UpdateBranchRequest},
    ApiResponse, ApiResult,
};

#[utoipa::path(
    get,
    path = "/api/branches",
    params(BranchQuery),
    responses(
        (status = 200, description = "Branches ordered by name", body = [branch::Model]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "branches"
)]
pub async fn list_branches(
    State(state): State<AppState>,
    Query(query): Query<BranchQuery>,
) -> ApiResult<Vec<branch::Model>> {
    let branches = state.services.branches.list(&query).await?;
    Ok(Json(ApiResponse::success(branches)))
}

#[utoipa::path(
    get,
    path = "/api/branches/{id}",
    params(("id" = i32, Path, description = "Branch id")),
    responses(
        (status = 200, description = "Branch with inventory totals", body = BranchDetail),
        (status = 404, description = "Branch not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "branches"
)]
pub async fn get_branch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<BranchDetail> {
    let detail = state.services.branches.get_with_summary(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/branches",
    request_body = CreateBranchRequest,
    responses(
        (status = 201, description = "Branch created", body = branch::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Branch name already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "branches"
)]
pub async fn create_branch(
    State(state): State<AppState>,
    Json(payload): Json<CreateBranchRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let branch = state.services.branches.create(payload).await?;
    Ok(created(branch))
}

#[utoipa::path(
    put,
    path = "/api/branches/{id}",
    params(("id" = i32, Path, description = "Branch id")),
    request_body = UpdateBranchRequest,
    responses(
        (status = 200, description = "Branch updated", body = branch::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Branch not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Branch name already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "branches"
)]
pub async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateBranchRequest>,
) -> ApiResult<branch::Model> {
    let branch = state.services.branches.update(id, payload).await?;
    Ok(Json(ApiResponse::success(branch)))
}

#[utoipa::path(
    delete,
    path = "/api/branches/{id}",
    params(("id" = i32, Path, description = "Branch id")),
    responses(
        (status = 204, description = "Branch and its inventory rows deleted"),
        (status = 404, description = "Branch not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "branches"
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.branches.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
