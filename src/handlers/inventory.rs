use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::common::{PaginatedResponse, PaginationParams};
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::inventory::{
        InventoryQuery, InventoryView, UpdateInventoryRequest, UpsertInventoryRequest,
    },
    ApiResponse, ApiResult,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockParams {
    /// Defaults to the configured low-stock threshold
    pub threshold: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/api/inventory",
    params(InventoryQuery, PaginationParams),
    responses(
        (status = 200, description = "Paginated inventory rows", body = PaginatedResponse<InventoryView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<InventoryView>> {
    let (page, per_page) = pagination.resolve(&state.config);
    let (items, total) = state.services.inventory.list(&query, page, per_page).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, page, per_page, total,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/inventory/low-stock",
    params(LowStockParams),
    responses(
        (status = 200, description = "Rows below the threshold, lowest first", body = [InventoryView]),
        (status = 400, description = "Negative threshold", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    Query(params): Query<LowStockParams>,
) -> ApiResult<Vec<InventoryView>> {
    if matches!(params.threshold, Some(t) if t < 0) {
        return Err(ServiceError::BadRequest(
            "threshold cannot be negative".to_string(),
        ));
    }
    let rows = state.services.inventory.low_stock(params.threshold).await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/inventory/{id}",
    params(("id" = i32, Path, description = "Inventory row id")),
    responses(
        (status = 200, description = "Inventory row", body = InventoryView),
        (status = 404, description = "Row not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<InventoryView> {
    let row = state.services.inventory.get(id).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    put,
    path = "/api/inventory/{id}",
    params(("id" = i32, Path, description = "Inventory row id")),
    request_body = UpdateInventoryRequest,
    responses(
        (status = 200, description = "Row updated", body = InventoryView),
        (status = 400, description = "Negative quantity", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Row not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn update_inventory(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateInventoryRequest>,
) -> ApiResult<InventoryView> {
    let row = state.services.inventory.update(id, payload).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    post,
    path = "/api/inventory",
    request_body = UpsertInventoryRequest,
    responses(
        (status = 201, description = "Row created", body = InventoryView),
        (status = 200, description = "Existing row updated", body = InventoryView),
        (status = 400, description = "Negative quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product or branch", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn upsert_inventory(
    State(state): State<AppState>,
    Json(payload): Json<UpsertInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (row, created) = state.services.inventory.upsert(payload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(row))))
}
