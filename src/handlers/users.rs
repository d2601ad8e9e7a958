use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{AuthError, AuthUser, LoginCredentials, RefreshTokenRequest, TokenPair},
    entities::permission,
    errors::ServiceError,
    services::users::{
        CreateUserRequest, FullAccessResponse, UpdateUserRequest, UserDetail, UserResponse,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Case-insensitive match on username or email
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionsResponse {
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GroupsResponse {
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllPermissionsResponse {
    pub all_permissions: Vec<permission::Model>,
}

/// Exchange username and password for an access/refresh token pair
#[utoipa::path(
    post,
    path = "/api/token",
    request_body = LoginCredentials,
    responses(
        (status = 200, description = "Token pair issued", body = crate::ApiResponse<TokenPair>),
        (status = 401, description = "Invalid credentials or inactive account")
    ),
    tag = "auth"
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<Json<ApiResponse<TokenPair>>, AuthError> {
    let auth = &state.services.auth;
    let account = auth
        .authenticate(&credentials.username, &credentials.password)
        .await?;
    let tokens = auth.generate_token(&account).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

/// Trade a refresh token for a fresh token pair
#[utoipa::path(
    post,
    path = "/api/token/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token pair issued", body = crate::ApiResponse<TokenPair>),
        (status = 401, description = "Invalid or expired refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AuthError> {
    let tokens = state.services.auth.refresh_token(&request.refresh).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = crate::ApiResponse<UserResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserResponse> {
    let account = state.services.users.get_account(user.user_id).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// Effective permission codenames of the current user
#[utoipa::path(
    get,
    path = "/api/users/me/permissions",
    responses(
        (status = 200, description = "Permissions listed", body = crate::ApiResponse<PermissionsResponse>)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<PermissionsResponse> {
    let permissions = state.services.users.permissions_of(user.user_id).await?;
    Ok(Json(ApiResponse::success(PermissionsResponse { permissions })))
}

#[utoipa::path(
    get,
    path = "/api/users/me/groups",
    responses(
        (status = 200, description = "Groups listed", body = crate::ApiResponse<GroupsResponse>)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn my_groups(State(state): State<AppState>, user: AuthUser) -> ApiResult<GroupsResponse> {
    let groups = state.services.users.groups_of(user.user_id).await?;
    Ok(Json(ApiResponse::success(GroupsResponse { groups })))
}

#[utoipa::path(
    get,
    path = "/api/users/me/full-access",
    responses(
        (status = 200, description = "User, groups and effective permissions", body = crate::ApiResponse<FullAccessResponse>)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn my_full_access(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<FullAccessResponse> {
    let access = state.services.users.full_access(user.user_id).await?;
    Ok(Json(ApiResponse::success(access)))
}

/// Every grantable permission
#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "Permissions listed", body = crate::ApiResponse<AllPermissionsResponse>),
        (status = 403, description = "Forbidden")
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn list_permissions(State(state): State<AppState>) -> ApiResult<AllPermissionsResponse> {
    let all_permissions = state.services.users.list_permissions().await?;
    Ok(Json(ApiResponse::success(AllPermissionsResponse { all_permissions })))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Users listed", body = crate::ApiResponse<PaginatedResponse<UserResponse>>),
        (status = 403, description = "Forbidden")
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<PaginatedResponse<UserResponse>> {
    let max = u64::from(state.config.api_max_page_size).max(1);
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(u64::from(state.config.api_default_page_size))
        .clamp(1, max);

    let result = state
        .services
        .users
        .list_users(page, limit, query.search)
        .await?;
    let total_pages = (result.total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.users,
        total: result.total,
        page,
        limit,
        total_pages,
    })))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = crate::ApiResponse<UserDetail>),
        (status = 400, description = "Invalid request or duplicate username", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserDetail>>), ServiceError> {
    let created = state.services.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User fetched", body = crate::ApiResponse<UserDetail>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<UserDetail> {
    let detail = state.services.users.get_user(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = crate::ApiResponse<UserDetail>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<UserDetail> {
    let detail = state.services.users.update_user(id, payload).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Delete a user; their requested orders go with them
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    if id == user.user_id {
        return Err(ServiceError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    state.services.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
