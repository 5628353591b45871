use axum::extract::{Json, State};

use crate::{
    handlers::AppState,
    services::chatbot::{ChatRequest, ChatResponse},
    ApiResponse, ApiResult,
};

#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Canned answer for the recognised intent", body = ChatResponse),
        (status = 400, description = "Empty or overlong message", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let response = state.services.chatbot.respond(payload).await?;
    Ok(Json(ApiResponse::success(response)))
}
