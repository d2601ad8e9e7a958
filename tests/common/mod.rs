#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use service_desk_api::{
    assistant::TextGenerator,
    auth::permissions::AGENTS_GROUP,
    build_router,
    config::AppConfig,
    db,
    errors::ServiceError,
    services::users::CreateUserRequest,
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str =
    "k3Jq9vTzW1xYpB7nR2mC8dF4gH6jL0sA5uE_Q-iO+ZwXyVtNbMlKjHgFdSaPoIuY";
pub const TEST_PASSWORD: &str = "correct-horse-42";

/// Canned text generator that records every prompt it receives.
pub struct StubGenerator {
    reply: String,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Seeded account with a live access token.
pub struct TestAccount {
    pub id: i32,
    pub username: String,
    pub token: String,
}

/// Helper harness for spinning up the full router over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub generator: Arc<StubGenerator>,
    pub admin: TestAccount,
    pub agent: TestAccount,
    /// Authenticated but with no groups or grants
    pub visitor: TestAccount,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("service_desk_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "test-gemini-key".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let generator = Arc::new(StubGenerator::new("Há 2 ordens atrasadas."));
        let state = AppState::new(Arc::new(pool), cfg, generator.clone());

        let admin = seed_account(&state, "admin", true, None).await;
        let agent = seed_account(&state, "agent", false, Some(AGENTS_GROUP)).await;
        let visitor = seed_account(&state, "visitor", false, None).await;

        let router = build_router(state.clone());

        Self {
            router,
            state,
            generator,
            admin,
            agent,
            visitor,
            _db_dir: db_dir,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request as the superuser.
    pub async fn as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(&self.admin.token)).await
    }

    /// Request as a member of the agents group.
    pub async fn as_agent(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(&self.agent.token)).await
    }

    /// Request as an account with no permissions.
    pub async fn as_visitor(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(&self.visitor.token)).await
    }
}

async fn seed_account(
    state: &AppState,
    username: &str,
    superuser: bool,
    group: Option<&str>,
) -> TestAccount {
    let users = &state.services.users;
    let detail = users
        .create_user(CreateUserRequest {
            username: username.to_string(),
            password: TEST_PASSWORD.to_string(),
            email: Some(format!("{}@example.com", username)),
            first_name: None,
            last_name: None,
            is_staff: superuser,
            is_superuser: superuser,
            groups: Vec::new(),
            user_permissions: Vec::new(),
        })
        .await
        .expect("seed account");

    if let Some(group) = group {
        users
            .add_to_group(detail.user.id, group)
            .await
            .expect("add seeded account to group");
    }

    let auth = &state.services.auth;
    let account = auth
        .authenticate(username, TEST_PASSWORD)
        .await
        .expect("seeded account can log in");
    let tokens = auth
        .generate_token(&account)
        .await
        .expect("issue token for seeded account");

    TestAccount {
        id: account.id,
        username: username.to_string(),
        token: tokens.access,
    }
}

/// Reads the full body as JSON.
pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Asserts the status and returns the `data` member of the envelope.
pub async fn expect_data(response: axum::response::Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    assert_eq!(body["success"], Value::Bool(true), "unexpected envelope: {}", body);
    body["data"].clone()
}
