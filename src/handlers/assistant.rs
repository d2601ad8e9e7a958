use axum::{extract::State, Json};

use crate::{
    assistant::{ChatReply, ChatRequest},
    auth::AuthUser,
    ApiResponse, ApiResult, AppState,
};

/// Ask the assistant a question about service-order turnaround
#[utoipa::path(
    post,
    path = "/api/ai/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = crate::ApiResponse<ChatReply>),
        (status = 400, description = "Empty message", body = crate::errors::ErrorResponse),
        (status = 500, description = "Assistant misconfigured or upstream failure", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "assistant"
)]
pub async fn chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatReply> {
    let reply = state
        .services
        .assistant
        .chat(user.user_id, &request.message)
        .await?;
    Ok(Json(ApiResponse::success(reply)))
}
