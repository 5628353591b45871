use axum::{
    extract::{Json, State},
    Extension,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::AppState,
    services::users::{ChangePasswordRequest, UpdateProfileRequest, UserProfile},
    ApiResponse, ApiResult,
};

/// Login request payload
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserProfile,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = LoginResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ServiceError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let user = state
        .services
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let issued = state.auth.issue_token(&user)?;
    info!(user_id = user.id, "User logged in");

    Ok(Json(ApiResponse::success(LoginResponse {
        token: issued.token,
        token_type: issued.token_type,
        expires_in: issued.expires_in,
        user: user.into(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, invalid or expired token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<VerifyResponse> {
    let user = state
        .services
        .users
        .get_user(auth.user_id)
        .await
        .map_err(|err| match err {
            ServiceError::NotFound(_) => {
                ServiceError::Unauthorized("Account no longer exists".to_string())
            }
            other => other,
        })?;

    Ok(Json(ApiResponse::success(VerifyResponse {
        valid: true,
        user: user.into(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "New password rejected", body = crate::errors::ErrorResponse),
        (status = 401, description = "Current password is wrong", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    state
        .services
        .users
        .change_password(auth.user_id, payload)
        .await?;

    Ok(Json(ApiResponse::success(()).with_message("Password changed")))
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current user's profile", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<UserProfile> {
    let user = state.services.users.get_user(auth.user_id).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<UserProfile> {
    let profile = state
        .services
        .users
        .update_profile(auth.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}
