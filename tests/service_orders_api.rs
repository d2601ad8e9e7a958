mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Local, NaiveDate};
use common::{expect_data, json_body, TestApp};
use serde_json::{json, Value};

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn order_payload(title: &str, start: NaiveDate, predicted: NaiveDate) -> Value {
    json!({
        "title": title,
        "description": format!("{} description", title),
        "start_date": start,
        "predicted_date": predicted,
    })
}

async fn create_order(app: &TestApp, payload: Value) -> Value {
    let response = app
        .as_agent(Method::POST, "/api/v1/service-orders", Some(payload))
        .await;
    expect_data(response, StatusCode::CREATED).await
}

#[tokio::test]
async fn create_defaults_to_open_medium_and_caller_as_requester() {
    let app = TestApp::new().await;
    let start = today() - Duration::days(3);

    let order = create_order(&app, order_payload("Printer jam", start, today() + Duration::days(2))).await;

    assert_eq!(order["status"], "open");
    assert_eq!(order["priority"], "medium");
    assert_eq!(order["from_user"], app.agent.id);
    assert_eq!(order["days_delay"], 0);
    assert!(order["responsible"].is_null());
}

#[tokio::test]
async fn overdue_open_order_counts_days_since_prediction() {
    let app = TestApp::new().await;
    let predicted = today() - Duration::days(4);

    let order = create_order(
        &app,
        order_payload("VPN down", predicted - Duration::days(2), predicted),
    )
    .await;

    assert_eq!(order["days_delay"], 4);
}

#[tokio::test]
async fn create_rejects_inverted_dates_and_bad_rate() {
    let app = TestApp::new().await;

    let inverted = order_payload("Bad dates", today(), today() - Duration::days(1));
    let response = app
        .as_agent(Method::POST, "/api/v1/service-orders", Some(inverted))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_rate = order_payload("Bad rate", today(), today());
    bad_rate["rate"] = json!(6);
    let response = app
        .as_agent(Method::POST, "/api/v1/service-orders", Some(bad_rate))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut unknown_user = order_payload("Ghost", today(), today());
    unknown_user["responsible"] = json!(9_999);
    let response = app
        .as_agent(Method::POST, "/api/v1/service-orders", Some(unknown_user))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_update_and_delete_round_trip() {
    let app = TestApp::new().await;
    let order = create_order(&app, order_payload("Mouse", today(), today() + Duration::days(1))).await;
    let id = order["id"].as_i64().unwrap();
    let uri = format!("/api/v1/service-orders/{}", id);

    let fetched = expect_data(app.as_agent(Method::GET, &uri, None).await, StatusCode::OK).await;
    assert_eq!(fetched["title"], "Mouse");

    let patched = expect_data(
        app.as_agent(
            Method::PATCH,
            &uri,
            Some(json!({ "priority": "high", "responsible": app.admin.id })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(patched["priority"], "high");
    assert_eq!(patched["responsible"], app.admin.id);

    let cleared = expect_data(
        app.as_agent(Method::PUT, &uri, Some(json!({ "responsible": null })))
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(cleared["responsible"].is_null());
    assert_eq!(cleared["priority"], "high");

    // Agents cannot delete
    let response = app.as_agent(Method::DELETE, &uri, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.as_admin(Method::DELETE, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.as_agent(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn days_delay_follows_every_save_and_ignores_client_value() {
    let app = TestApp::new().await;
    let mut payload = order_payload("Monitor flicker", today() - Duration::days(10), today() + Duration::days(1));
    payload["days_delay"] = json!(99);
    let order = create_order(&app, payload).await;
    assert_eq!(order["days_delay"], 0);
    let uri = format!("/api/v1/service-orders/{}", order["id"]);

    let moved = expect_data(
        app.as_agent(
            Method::PATCH,
            &uri,
            Some(json!({ "predicted_date": today() - Duration::days(3), "days_delay": 0 })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(moved["days_delay"], 3);

    let completed = expect_data(
        app.as_agent(
            Method::PATCH,
            &uri,
            Some(json!({ "completion_date": today() - Duration::days(1), "days_delay": 42 })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(completed["days_delay"], 2);

    let reopened = expect_data(
        app.as_agent(Method::PATCH, &uri, Some(json!({ "completion_date": null })))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(reopened["days_delay"], 3);
}

#[tokio::test]
async fn closing_before_start_date_is_a_conflict() {
    let app = TestApp::new().await;
    let order = create_order(
        &app,
        order_payload("Office move", today() + Duration::days(3), today() + Duration::days(5)),
    )
    .await;
    let uri = format!("/api/v1/service-orders/{}/close", order["id"]);

    let response = app.as_agent(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(
        body["message"],
        "Conflict: Service order cannot be closed before its start date"
    );

    let uri = format!("/api/v1/service-orders/{}", order["id"]);
    let fetched = expect_data(app.as_agent(Method::GET, &uri, None).await, StatusCode::OK).await;
    assert_eq!(fetched["status"], "open");
    assert!(fetched["completion_date"].is_null());
}

#[tokio::test]
async fn closing_sets_completion_today_and_refuses_twice() {
    let app = TestApp::new().await;
    let predicted = today() - Duration::days(2);
    let order = create_order(
        &app,
        order_payload("Laptop", predicted - Duration::days(5), predicted),
    )
    .await;
    let uri = format!("/api/v1/service-orders/{}/close", order["id"]);

    let closed = expect_data(app.as_agent(Method::POST, &uri, None).await, StatusCode::OK).await;
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["completion_date"], json!(today()));
    assert_eq!(closed["days_delay"], 2);

    let response = app.as_agent(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Conflict: Service order is already closed");
}

#[tokio::test]
async fn rate_accepts_numeric_strings_and_rejects_the_rest() {
    let app = TestApp::new().await;
    let order = create_order(&app, order_payload("Keyboard", today(), today())).await;
    let uri = format!("/api/v1/service-orders/{}/rate", order["id"]);

    let rated = expect_data(
        app.as_agent(Method::POST, &uri, Some(json!({ "rate": "4" }))).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(rated["rate"], 4);

    for bad in [json!({}), json!({ "rate": 0 }), json!({ "rate": 6 }), json!({ "rate": "five" })] {
        let response = app.as_agent(Method::POST, &uri, Some(bad)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .as_agent(
            Method::POST,
            "/api/v1/service-orders/9999/rate",
            Some(json!({ "rate": 3 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn assign_requires_an_existing_user() {
    let app = TestApp::new().await;
    let order = create_order(&app, order_payload("Monitor", today(), today())).await;
    let uri = format!("/api/v1/service-orders/{}/assign", order["id"]);

    let assigned = expect_data(
        app.as_agent(
            Method::POST,
            &uri,
            Some(json!({ "responsible_id": app.agent.id })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(assigned["responsible"], app.agent.id);

    let response = app.as_agent(Method::POST, &uri, Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_agent(Method::POST, &uri, Some(json!({ "responsible_id": 9_999 })))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_close_reports_each_id() {
    let app = TestApp::new().await;
    let first = create_order(&app, order_payload("One", today(), today())).await;
    let second = create_order(&app, order_payload("Two", today(), today())).await;
    let first_id = first["id"].as_i64().unwrap();
    let second_id = second["id"].as_i64().unwrap();

    let close_uri = format!("/api/v1/service-orders/{}/close", second_id);
    assert_eq!(
        app.as_agent(Method::POST, &close_uri, None).await.status(),
        StatusCode::OK
    );

    let future = create_order(
        &app,
        order_payload("Three", today() + Duration::days(3), today() + Duration::days(5)),
    )
    .await;
    let future_id = future["id"].as_i64().unwrap();

    let body = json!({ "ids": [first_id, second_id, future_id, 9_999] });

    // Bulk operations need the manage grant that agents lack
    let response = app
        .as_agent(Method::POST, "/api/v1/service-orders/bulk-close", Some(body.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let result = expect_data(
        app.as_admin(Method::POST, "/api/v1/service-orders/bulk-close", Some(body))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(result["closed"], json!([first_id]));
    assert_eq!(result["skipped"], json!([second_id]));
    assert_eq!(result["rejected"], json!([future_id]));
    assert_eq!(result["not_found"], json!([9_999]));

    let uri = format!("/api/v1/service-orders/{}", future_id);
    let untouched = expect_data(app.as_admin(Method::GET, &uri, None).await, StatusCode::OK).await;
    assert_eq!(untouched["status"], "open");
}

#[tokio::test]
async fn list_filters_searches_and_sorts() {
    let app = TestApp::new().await;
    let mut urgent = order_payload("Server room flooding", today() - Duration::days(1), today());
    urgent["priority"] = json!("high");
    create_order(&app, urgent).await;
    let mut routine = order_payload("Replace toner", today() - Duration::days(5), today() - Duration::days(3));
    routine["priority"] = json!("low");
    create_order(&app, routine).await;

    let page = expect_data(
        app.as_agent(Method::GET, "/api/v1/service-orders?priority=HIGH", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["title"], "Server room flooding");

    let page = expect_data(
        app.as_agent(Method::GET, "/api/v1/service-orders?search=TONER", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["total"], 1);

    let page = expect_data(
        app.as_agent(
            Method::GET,
            "/api/v1/service-orders?sort_by=-days_delay&limit=1",
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["title"], "Replace toner");
    assert_eq!(page["total_pages"], 2);

    let response = app
        .as_agent(Method::GET, "/api/v1/service-orders?sort_by=password", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_agent(Method::GET, "/api/v1/service-orders?status=pending", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_and_statistics_reflect_orders() {
    let app = TestApp::new().await;
    let start = today() - Duration::days(6);
    let done = create_order(&app, order_payload("Done", start, today() - Duration::days(1))).await;
    create_order(&app, order_payload("Late", start, today() - Duration::days(2))).await;

    let close_uri = format!("/api/v1/service-orders/{}/close", done["id"]);
    assert_eq!(
        app.as_agent(Method::POST, &close_uri, None).await.status(),
        StatusCode::OK
    );

    let summary = expect_data(
        app.as_agent(Method::GET, "/api/v1/service-orders/summary", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["closed"], 1);
    assert_eq!(summary["overdue"], 1);

    let stats = expect_data(
        app.as_agent(Method::GET, "/api/v1/service-orders/statistics", None)
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(stats["total_orders"], 2);
    assert_eq!(stats["user_orders_count"], 2);
    assert_eq!(stats["completed_orders"], 1);
    assert_eq!(stats["delayed_count"], 1);
    assert_eq!(stats["avg_completion_days"], 6.0);
    assert_eq!(stats["priority_stats"]["Média"], 6.0);
}

#[tokio::test]
async fn permissions_gate_every_route() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/service-orders", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/service-orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .as_visitor(Method::GET, "/api/v1/service-orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_visitor(
            Method::POST,
            "/api/v1/service-orders",
            Some(order_payload("Nope", today(), today())),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_endpoint_is_public() {
    let app = TestApp::new().await;
    let data = expect_data(
        app.request(Method::GET, "/api/v1/status", None, None).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(data["status"], "ok");
    assert_eq!(data["service"], "service-desk-api");
}
