use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `Bearer` JWT scheme referenced by secured paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Service Desk API",
        version = "1.0.0",
        description = r#"
# Service Desk API

Ticketing backend for service orders with an AI assistant for turnaround questions.

## Authentication

Obtain a token pair from `POST /api/token` and send the access token on every call:

```
Authorization: Bearer <access-token>
```

## Delays

`days_delay` is derived on every save: whole days from `predicted_date` to the
completion date (or today, while the order is unfinished), never negative.
Clients cannot set it.

## Errors

Failures share one body:

```json
{
  "error": "Bad Request",
  "message": "Conflict: Service order is already closed",
  "request_id": "9f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints take `page` (default 1) and `limit` (default 20, max 100).
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "service-orders", description = "Service order management"),
        (name = "assistant", description = "AI assistant"),
        (name = "auth", description = "Token issuance"),
        (name = "users", description = "Users and permissions")
    ),
    paths(
        // Service orders
        crate::handlers::service_orders::list_service_orders,
        crate::handlers::service_orders::create_service_order,
        crate::handlers::service_orders::get_service_order,
        crate::handlers::service_orders::update_service_order,
        crate::handlers::service_orders::delete_service_order,
        crate::handlers::service_orders::close_service_order,
        crate::handlers::service_orders::rate_service_order,
        crate::handlers::service_orders::assign_service_order,
        crate::handlers::service_orders::bulk_close_service_orders,
        crate::handlers::service_orders::service_order_summary,
        crate::handlers::service_orders::service_order_statistics,

        // Assistant
        crate::handlers::assistant::chat,

        // Auth and users
        crate::handlers::users::obtain_token,
        crate::handlers::users::refresh_token,
        crate::handlers::users::me,
        crate::handlers::users::my_permissions,
        crate::handlers::users::my_groups,
        crate::handlers::users::my_full_access,
        crate::handlers::users::list_permissions,
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
    ),
    components(
        schemas(
            crate::entities::service_order::Model,
            crate::entities::service_order::Priority,
            crate::entities::service_order::Status,
            crate::entities::permission::Model,
            crate::services::service_orders::CreateServiceOrderRequest,
            crate::services::service_orders::UpdateServiceOrderRequest,
            crate::services::service_orders::BulkCloseRequest,
            crate::services::service_orders::BulkCloseResult,
            crate::services::service_orders::ServiceOrderSummary,
            crate::services::statistics::StatisticsSnapshot,
            crate::services::users::CreateUserRequest,
            crate::services::users::UpdateUserRequest,
            crate::services::users::UserResponse,
            crate::services::users::UserDetail,
            crate::services::users::FullAccessResponse,
            crate::assistant::ChatRequest,
            crate::assistant::ChatReply,
            crate::auth::LoginCredentials,
            crate::auth::RefreshTokenRequest,
            crate::auth::TokenPair,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_service_order_and_chat_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Service Desk API"));
        assert!(json.contains("/api/v1/service-orders/{id}/close"));
        assert!(json.contains("/api/ai/chat"));
        assert!(json.contains("\"Bearer\""));
    }
}
