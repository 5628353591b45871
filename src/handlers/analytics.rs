use axum::extract::{Json, Query, State};
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::{
    handlers::AppState,
    services::analytics::{
        BranchPerformance, DashboardSummary, ProductSales, SegmentBreakdown, StatePerformance,
    },
    ApiResponse, ApiResult,
};

const DEFAULT_TOP_PRODUCTS: u32 = 10;

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopProductsParams {
    /// 1 to 100, default 10
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/analytics/summary",
    responses(
        (status = 200, description = "Dashboard totals", body = DashboardSummary),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn summary(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let summary = state.services.analytics.summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/analytics/branches",
    responses(
        (status = 200, description = "Per-branch performance, highest billing first", body = [BranchPerformance])
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn branch_performance(State(state): State<AppState>) -> ApiResult<Vec<BranchPerformance>> {
    let rows = state.services.analytics.branch_performance().await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/analytics/technology",
    responses(
        (status = 200, description = "Billing by technology", body = [SegmentBreakdown])
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn technology_breakdown(State(state): State<AppState>) -> ApiResult<Vec<SegmentBreakdown>> {
    let rows = state.services.analytics.technology_breakdown().await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/analytics/star-rating",
    responses(
        (status = 200, description = "Billing by star rating", body = [SegmentBreakdown])
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn star_rating_breakdown(State(state): State<AppState>) -> ApiResult<Vec<SegmentBreakdown>> {
    let rows = state.services.analytics.star_rating_breakdown().await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/analytics/states",
    responses(
        (status = 200, description = "Per-state performance", body = [StatePerformance])
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn state_breakdown(State(state): State<AppState>) -> ApiResult<Vec<StatePerformance>> {
    let rows = state.services.analytics.state_breakdown().await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/analytics/top-products",
    params(TopProductsParams),
    responses(
        (status = 200, description = "Materials by billing, highest first", body = [ProductSales]),
        (status = 400, description = "limit outside 1..=100", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn top_products(
    State(state): State<AppState>,
    Query(params): Query<TopProductsParams>,
) -> ApiResult<Vec<ProductSales>> {
    params.validate()?;
    let limit = params.limit.unwrap_or(DEFAULT_TOP_PRODUCTS) as usize;
    let rows = state.services.analytics.top_products(limit).await?;
    Ok(Json(ApiResponse::success(rows)))
}
