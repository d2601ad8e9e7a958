mod common;

use axum::http::{Method, StatusCode};
use common::{expect_data, json_body, TestApp, TEST_PASSWORD};
use serde_json::{json, Value};

#[tokio::test]
async fn login_then_refresh_issues_working_tokens() {
    let app = TestApp::new().await;

    let tokens = expect_data(
        app.request(
            Method::POST,
            "/api/token",
            Some(json!({ "username": "agent", "password": TEST_PASSWORD })),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(tokens["token_type"], "Bearer");
    let refresh = tokens["refresh"].as_str().unwrap().to_string();

    let renewed = expect_data(
        app.request(
            Method::POST,
            "/api/token/refresh",
            Some(json!({ "refresh": refresh })),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let access = renewed["access"].as_str().unwrap();

    let me = expect_data(
        app.request(Method::GET, "/api/users/me", None, Some(access)).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(me["username"], "agent");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn wrong_password_and_misused_tokens_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/token",
            Some(json!({ "username": "agent", "password": "nope-nope-nope" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID_CREDENTIALS");

    // An access token is not a refresh token
    let response = app
        .request(
            Method::POST,
            "/api/token/refresh",
            Some(json!({ "refresh": app.agent.token })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_sees_group_permissions() {
    let app = TestApp::new().await;

    let groups = expect_data(
        app.as_agent(Method::GET, "/api/users/me/groups", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(groups["groups"], json!(["agents"]));

    let permissions = expect_data(
        app.as_agent(Method::GET, "/api/users/me/permissions", None)
            .await,
        StatusCode::OK,
    )
    .await;
    let codenames: Vec<&str> = permissions["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(codenames.contains(&"service_orders:read"));
    assert!(codenames.contains(&"assistant:chat"));
    assert!(!codenames.contains(&"service_orders:delete"));

    let access = expect_data(
        app.as_agent(Method::GET, "/api/users/me/full-access", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(access["user"]["username"], "agent");
    assert_eq!(access["permissions"].as_array().unwrap().len(), codenames.len());
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let app = TestApp::new().await;

    let response = app.as_agent(Method::GET, "/api/users", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let page = expect_data(
        app.as_admin(Method::GET, "/api/users?search=AGE", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["username"], "agent");

    let created = expect_data(
        app.as_admin(
            Method::POST,
            "/api/users",
            Some(json!({
                "username": "carol",
                "password": "another-pass-9",
                "email": "carol@example.com",
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let carol_id = created["id"].as_i64().unwrap();
    assert!(created["groups"].as_array().unwrap().is_empty());

    let duplicate = app
        .as_admin(
            Method::POST,
            "/api/users",
            Some(json!({ "username": "carol", "password": "another-pass-9" })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let updated = expect_data(
        app.as_admin(
            Method::PATCH,
            &format!("/api/users/{}", carol_id),
            Some(json!({ "first_name": "Carol" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["first_name"], "Carol");

    let response = app
        .as_admin(Method::DELETE, &format!("/api/users/{}", app.admin.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_admin(Method::DELETE, &format!("/api/users/{}", carol_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .as_admin(Method::GET, &format!("/api/users/{}", carol_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn permission_catalogue_needs_its_own_grant() {
    let app = TestApp::new().await;

    let response = app.as_agent(Method::GET, "/api/permissions", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let catalogue = expect_data(
        app.as_admin(Method::GET, "/api/permissions", None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(catalogue["all_permissions"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"].get("/api/ai/chat").is_some());
}
