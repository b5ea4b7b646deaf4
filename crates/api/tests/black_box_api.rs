use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use habbot_api::app::{self, services::AppServices};
use habbot_api::config::AppConfig;
use habbot_auth::User;
use habbot_infra::{InMemoryEmployeeStore, InMemoryUserStore, UserStore};
use habbot_observability::{LogType, LoggerFactory, MemorySink};

const SECRET: &str = "black-box-secret";
const PASSWORD: &str = "Str0ng!Pass";

struct TestServer {
    base_url: String,
    users: Arc<InMemoryUserStore>,
    logs: Arc<LoggerFactory>,
    mem: MemorySink,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "SECRET_KEY" => Some(SECRET.to_string()),
            "APP_ENVIRONMENT" => Some("test".to_string()),
            _ => None,
        })
        .expect("test config");

        let mem = MemorySink::new();
        let logs = Arc::new(LoggerFactory::builder().sink(mem.clone()).build().expect("logger factory"));
        let users = Arc::new(InMemoryUserStore::new());
        let services = AppServices::new(
            &config,
            users.clone(),
            Arc::new(InMemoryEmployeeStore::new()),
            logs.clone(),
        );
        let app = app::router(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, users, logs, mem, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A verified account inserted directly, plus an access token for it.
    async fn verified_user(&self, email: &str) -> (User, String) {
        let mut user = User::register("Ada", email, PASSWORD).unwrap();
        user.mark_email_verified();
        let user = self.users.insert(user).await.unwrap();
        let token = mint_jwt(&user, "access", ChronoDuration::minutes(10));
        (user, token)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user: &User, purpose: &str, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = json!({
        "user_id": user.id.to_string(),
        "email": user.email.as_str(),
        "role": user.role,
        "is_email_verified": user.is_email_verified,
        "purpose": purpose,
        "iat": now.timestamp(),
        "exp": (now + ttl).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn employee_body(email: &str) -> Value {
    json!({
        "name": "Grace Hopper",
        "email": email,
        "department": "ENGINEERING",
        "role": "DEVELOPER",
    })
}

#[tokio::test]
async fn health_reports_environment_and_uptime() {
    let server = TestServer::spawn().await;

    let res = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["environment"], "test");
    assert!(body["uptime"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn root_and_unknown_paths_redirect_to_health() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    for path in ["/", "/no/such/route"] {
        let res = client.get(server.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT, "path {path}");
        assert_eq!(res.headers()["location"], "/api/health");
    }
}

#[tokio::test]
async fn signup_rejects_duplicates_and_weak_passwords() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({ "name": "Ada", "email": "ada@example.com", "password": PASSWORD });

    let res = client.post(server.url("/api/auth/signup")).json(&body).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["success"], true);
    assert_eq!(created["message"], "Successfully registered");
    assert_eq!(created["data"]["email"], "ada@example.com");
    assert!(created["data"].get("hashed_password").is_none());

    let res = client.post(server.url("/api/auth/signup")).json(&body).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let dup: Value = res.json().await.unwrap();
    assert_eq!(dup["success"], false);
    assert_eq!(dup["message"], "Email already exists");

    let weak = json!({ "name": "Bob", "email": "bob@example.com", "password": "short" });
    let res = client.post(server.url("/api/auth/signup")).json(&weak).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(server.url("/api/auth/signup"))
        .json(&json!({ "email": "no-name@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn login_issues_tokens_and_rejects_bad_credentials() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (user, _) = server.verified_user("ada@example.com").await;

    let res = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Successfully logged in");
    assert_eq!(body["data"]["id"], user.id.to_string());
    assert_eq!(body["data"]["token_type"], "Bearer");
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    let res = client
        .get(server.url("/api/employees"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for password in ["Wr0ng!Pass", PASSWORD] {
        let email = if password == PASSWORD { "nobody@example.com" } else { "ada@example.com" };
        let res = client
            .post(server.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "Incorrect email or password");
    }
}

#[tokio::test]
async fn employees_require_a_bearer_token() {
    let server = TestServer::spawn().await;

    let res = reqwest::get(server.url("/api/employees")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Not authenticated");
}

#[tokio::test]
async fn unverified_user_is_admitted_after_verifying_email() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = server
        .users
        .insert(User::register("Ada", "ada@example.com", PASSWORD).unwrap())
        .await
        .unwrap();
    let access = mint_jwt(&user, "access", ChronoDuration::minutes(10));

    let res = client
        .get(server.url("/api/employees"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Email not verified");

    // An access token is not a verification token.
    let res = client
        .post(server.url("/api/auth/verify-email"))
        .json(&json!({ "token": access }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let verification = mint_jwt(&user, "email_verification", ChronoDuration::hours(1));
    let res = client
        .post(server.url("/api/auth/verify-email"))
        .json(&json!({ "token": verification }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["is_email_verified"], true);

    let res = client
        .get(server.url("/api/employees"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let server = TestServer::spawn().await;
    let (user, _) = server.verified_user("ada@example.com").await;
    let expired = mint_jwt(&user, "access", ChronoDuration::minutes(-5));

    let res = reqwest::Client::new()
        .get(server.url("/api/employees"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Token expired");
}

#[tokio::test]
async fn employee_lifecycle() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = server.verified_user("ada@example.com").await;

    let res = client
        .post(server.url("/api/employees"))
        .bearer_auth(&token)
        .json(&employee_body("grace@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["message"], "Employee created successfully");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(server.url("/api/employees"))
        .bearer_auth(&token)
        .json(&employee_body("GRACE@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let dup: Value = res.json().await.unwrap();
    assert_eq!(dup["message"], "Employee with email already exists");

    let mut other = employee_body("linus@example.com");
    other["department"] = json!("SALES");
    other["role"] = json!("ANALYST");
    let res = client
        .post(server.url("/api/employees"))
        .bearer_auth(&token)
        .json(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(server.url("/api/employees?department=ENGINEERING&page=1&page_size=10"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list: Value = res.json().await.unwrap();
    assert_eq!(list["data"]["total"], 1);
    assert_eq!(list["data"]["items"][0]["id"], id.as_str());

    let res = client
        .put(server.url(&format!("/api/employees/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "role": "MANAGER" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["data"]["role"], "MANAGER");
    assert_eq!(updated["data"]["email"], "grace@example.com");

    let res = client
        .put(server.url(&format!("/api/employees/{id}")))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(server.url(&format!("/api/employees/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    for path in [format!("/api/employees/{id}"), "/api/employees/not-an-id".to_string()] {
        let res = client.get(server.url(&path)).bearer_auth(&token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "path {path}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "Employee not found");
    }

    let res = client
        .delete(server.url(&format!("/api/employees/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let server = TestServer::spawn().await;
    let (_, token) = server.verified_user("ada@example.com").await;

    let res = reqwest::Client::new()
        .get(server.url("/api/employees?page_size=0"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_id_is_echoed_and_passwords_never_reach_the_logs() {
    let server = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .post(server.url("/api/auth/signup"))
        .header("x-request-id", "bb-42")
        .json(&json!({ "name": "Ada", "email": "ada@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-request-id"], "bb-42");

    server.logs.flush();
    let init = server.mem.of_type(LogType::RequestInit);
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].context.request_id.as_deref(), Some("bb-42"));
    assert_eq!(init[0].payload["request"]["body"]["password"], "***redacted***");

    let end = server.mem.of_type(LogType::RequestEnd);
    assert_eq!(end.len(), 1);
    assert_eq!(end[0].payload["response"]["statusCode"], 201);

    for record in server.mem.records() {
        let text = serde_json::to_string(&record.payload).unwrap();
        assert!(!text.contains(PASSWORD), "password leaked in {}", record.message);
        assert!(!record.message.contains(PASSWORD));
    }
}
