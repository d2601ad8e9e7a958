//! Service Desk API Library
//!
//! Service-order ticketing backend: orders with derived delays, completion
//! statistics and an AI assistant that answers questions about them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod assistant;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        generator: Arc<dyn assistant::TextGenerator>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, generator);
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Service-order routes, nested under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::service_orders as orders;

    let orders_read = Router::new()
        .route("/service-orders", get(orders::list_service_orders))
        .route("/service-orders/summary", get(orders::service_order_summary))
        .route(
            "/service-orders/statistics",
            get(orders::service_order_statistics),
        )
        .route("/service-orders/:id", get(orders::get_service_order))
        .with_permission(perm::SERVICE_ORDERS_READ);

    let orders_create = Router::new()
        .route("/service-orders", post(orders::create_service_order))
        .with_permission(perm::SERVICE_ORDERS_CREATE);

    let orders_update = Router::new()
        .route(
            "/service-orders/:id",
            put(orders::update_service_order).patch(orders::update_service_order),
        )
        .route("/service-orders/:id/close", post(orders::close_service_order))
        .route("/service-orders/:id/rate", post(orders::rate_service_order))
        .route(
            "/service-orders/:id/assign",
            post(orders::assign_service_order),
        )
        .with_permission(perm::SERVICE_ORDERS_UPDATE);

    let orders_delete = Router::new()
        .route("/service-orders/:id", delete(orders::delete_service_order))
        .with_permission(perm::SERVICE_ORDERS_DELETE);

    let orders_manage = Router::new()
        .route(
            "/service-orders/bulk-close",
            post(orders::bulk_close_service_orders),
        )
        .with_permission(perm::SERVICE_ORDERS_MANAGE);

    Router::new()
        .route("/status", get(api_status))
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_update)
        .merge(orders_delete)
        .merge(orders_manage)
}

/// Token, account and assistant routes under `/api`
pub fn api_routes() -> Router<AppState> {
    use handlers::{assistant, users};

    let tokens = Router::new()
        .route("/api/token", post(users::obtain_token))
        .route("/api/token/refresh", post(users::refresh_token));

    let me = Router::new()
        .route("/api/users/me", get(users::me))
        .route("/api/users/me/permissions", get(users::my_permissions))
        .route("/api/users/me/groups", get(users::my_groups))
        .route("/api/users/me/full-access", get(users::my_full_access))
        .with_auth();

    let permissions = Router::new()
        .route("/api/permissions", get(users::list_permissions))
        .with_permission(perm::PERMISSIONS_READ);

    let users_read = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", get(users::get_user))
        .with_permission(perm::USERS_READ);

    let users_manage = Router::new()
        .route("/api/users", post(users::create_user))
        .route(
            "/api/users/:id",
            axum::routing::patch(users::update_user).delete(users::delete_user),
        )
        .with_permission(perm::USERS_MANAGE);

    let chat = Router::new()
        .route("/api/ai/chat", post(assistant::chat))
        .with_permission(perm::ASSISTANT_CHAT);

    Router::new()
        .merge(tokens)
        .merge(me)
        .merge(permissions)
        .merge(users_read)
        .merge(users_manage)
        .merge(chat)
}

/// Full application router with state, health, docs and request-scoped layers.
///
/// Transport concerns (CORS, compression) are left to the binary.
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.services.auth.clone();
    let health = health::health_routes(state.db.clone());

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(api_routes())
        .with_state(state)
        .nest("/health", health)
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "service-desk-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

pub mod prelude {
    pub use crate::assistant::{AssistantService, TextGenerator};
    pub use crate::db::*;
    pub use crate::entities::service_order::{Priority, Status};
    pub use crate::errors::*;
    pub use crate::services::service_orders::ServiceOrderService;
    pub use crate::services::statistics::{StatisticsService, StatisticsSnapshot};
    pub use crate::tracing::*;
}
