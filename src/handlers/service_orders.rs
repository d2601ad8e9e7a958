use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    auth::AuthUser,
    entities::service_order,
    errors::ServiceError,
    services::{
        service_orders::{
            BulkCloseRequest, BulkCloseResult, CreateServiceOrderRequest, ServiceOrderListQuery,
            ServiceOrderSummary, UpdateServiceOrderRequest,
        },
        statistics::StatisticsSnapshot,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

/// List service orders with filters, search, sorting and pagination
#[utoipa::path(
    get,
    path = "/api/v1/service-orders",
    params(ServiceOrderListQuery),
    responses(
        (status = 200, description = "Service orders listed", body = crate::ApiResponse<PaginatedResponse<service_order::Model>>),
        (status = 400, description = "Invalid filter or sort", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn list_service_orders(
    State(state): State<AppState>,
    Query(query): Query<ServiceOrderListQuery>,
) -> ApiResult<PaginatedResponse<service_order::Model>> {
    let result = state.services.service_orders.list_orders(query).await?;
    let total_pages = (result.total + result.per_page - 1) / result.per_page;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: result.orders,
        total: result.total,
        page: result.page,
        limit: result.per_page,
        total_pages,
    })))
}

/// Open a new service order
#[utoipa::path(
    post,
    path = "/api/v1/service-orders",
    request_body = CreateServiceOrderRequest,
    responses(
        (status = 201, description = "Service order created", body = crate::ApiResponse<service_order::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn create_service_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateServiceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<service_order::Model>>), ServiceError> {
    let order = state
        .services
        .service_orders
        .create_order(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(
    get,
    path = "/api/v1/service-orders/{id}",
    params(("id" = i32, Path, description = "Service order ID")),
    responses(
        (status = 200, description = "Service order fetched", body = crate::ApiResponse<service_order::Model>),
        (status = 404, description = "Service order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn get_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<service_order::Model> {
    let order = state.services.service_orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Partially update a service order; `days_delay` is always recomputed
#[utoipa::path(
    patch,
    path = "/api/v1/service-orders/{id}",
    params(("id" = i32, Path, description = "Service order ID")),
    request_body = UpdateServiceOrderRequest,
    responses(
        (status = 200, description = "Service order updated", body = crate::ApiResponse<service_order::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn update_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateServiceOrderRequest>,
) -> ApiResult<service_order::Model> {
    let order = state
        .services
        .service_orders
        .update_order(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/service-orders/{id}",
    params(("id" = i32, Path, description = "Service order ID")),
    responses(
        (status = 204, description = "Service order deleted"),
        (status = 404, description = "Service order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn delete_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.service_orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Close a service order with today's completion date
#[utoipa::path(
    post,
    path = "/api/v1/service-orders/{id}/close",
    params(("id" = i32, Path, description = "Service order ID")),
    responses(
        (status = 200, description = "Service order closed", body = crate::ApiResponse<service_order::Model>),
        (status = 400, description = "Service order is already closed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn close_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<service_order::Model> {
    let order = state.services.service_orders.close_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Rate a service order from 1 to 5
#[utoipa::path(
    post,
    path = "/api/v1/service-orders/{id}/rate",
    params(("id" = i32, Path, description = "Service order ID")),
    request_body(content = serde_json::Value, description = "`{\"rate\": 1..5}`"),
    responses(
        (status = 200, description = "Service order rated", body = crate::ApiResponse<service_order::Model>),
        (status = 400, description = "Rate missing, not an integer or out of range", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn rate_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<Value>,
) -> ApiResult<service_order::Model> {
    let order = state
        .services
        .service_orders
        .rate_order(id, payload.get("rate"))
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Assign a responsible user
#[utoipa::path(
    post,
    path = "/api/v1/service-orders/{id}/assign",
    params(("id" = i32, Path, description = "Service order ID")),
    request_body(content = serde_json::Value, description = "`{\"responsible_id\": <user id>}`"),
    responses(
        (status = 200, description = "Service order assigned", body = crate::ApiResponse<service_order::Model>),
        (status = 400, description = "responsible_id missing", body = crate::errors::ErrorResponse),
        (status = 404, description = "Service order or user not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn assign_service_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<Value>,
) -> ApiResult<service_order::Model> {
    let order = state
        .services
        .service_orders
        .assign_order(id, payload.get("responsible_id"))
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Close several orders at once; already closed orders are skipped
#[utoipa::path(
    post,
    path = "/api/v1/service-orders/bulk-close",
    request_body = BulkCloseRequest,
    responses(
        (status = 200, description = "Bulk close result", body = crate::ApiResponse<BulkCloseResult>),
        (status = 400, description = "No ids given", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn bulk_close_service_orders(
    State(state): State<AppState>,
    Json(payload): Json<BulkCloseRequest>,
) -> ApiResult<BulkCloseResult> {
    let result = state.services.service_orders.bulk_close(payload.ids).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/api/v1/service-orders/summary",
    responses(
        (status = 200, description = "Summary computed", body = crate::ApiResponse<ServiceOrderSummary>)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn service_order_summary(
    State(state): State<AppState>,
) -> ApiResult<ServiceOrderSummary> {
    let summary = state.services.service_orders.summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Completion-time statistics for the caller
#[utoipa::path(
    get,
    path = "/api/v1/service-orders/statistics",
    responses(
        (status = 200, description = "Statistics computed", body = crate::ApiResponse<StatisticsSnapshot>)
    ),
    security(("Bearer" = [])),
    tag = "service-orders"
)]
pub async fn service_order_statistics(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<StatisticsSnapshot> {
    let snapshot = state.services.statistics.snapshot(user.user_id).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}
