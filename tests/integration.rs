//! Integration tests that run the API in-process
//!
//! These tests exercise the full router (resource routes, auth middleware,
//! login subtree and service endpoints) using axum-test.

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use snippets_api::{
    SnippetStore, UserStore,
    api::routes::{AppState, create_router},
    auth::{self, Authenticator, PasswordService},
    config::{SnippetDefaults, UserSeed},
    metrics,
};
use std::sync::{Arc, OnceLock};

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

fn seed(username: &str, password: &str) -> UserSeed {
    UserSeed {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// Helper to create a test server with `alice` and `bob` registered
async fn create_test_server(page_size: usize) -> TestServer {
    let users = Arc::new(UserStore::new("user"));
    let snippets = Arc::new(SnippetStore::new("snippet"));

    // Cheap argon2 parameters keep the suite fast
    let passwords = PasswordService::new(64, 1).expect("Failed to build password service");
    auth::seed_users(
        &users,
        &passwords,
        &[seed("alice", "wonderland"), seed("bob", "builder")],
    )
    .await
    .expect("Failed to seed users");

    let state = AppState {
        snippets,
        users: users.clone(),
        authenticator: Arc::new(Authenticator::new(users, passwords, "sessionid")),
        prometheus_handle: get_metrics_handle(),
        page_size,
        snippet_defaults: SnippetDefaults::default(),
    };

    let app = create_router(state).expect("Failed to build router");
    TestServer::try_new(app).expect("Failed to create test server")
}

fn basic(username: &str, password: &str) -> (HeaderName, HeaderValue) {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
    )
}

async fn create_snippet(server: &TestServer, username: &str, body: Value) -> TestResponse {
    let password = if username == "alice" {
        "wonderland"
    } else {
        "builder"
    };
    let (name, value) = basic(username, password);
    server
        .post("/snippets/")
        .add_header(name, value)
        .json(&body)
        .await
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server(10).await;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = create_test_server(10).await;
    server.get("/snippets/").await;

    let response = server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("snippets_api_requests_total"));
}

#[tokio::test]
async fn test_root_lists_registered_prefixes() {
    let server = create_test_server(10).await;

    let response = server.get("/").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({"snippets": "/snippets/", "users": "/users/"})
    );
}

#[tokio::test]
async fn test_list_empty() {
    let server = create_test_server(10).await;

    let response = server.get("/snippets/").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({"count": 0, "next": null, "previous": null, "results": []})
    );
}

#[tokio::test]
async fn test_create_requires_authentication() {
    let server = create_test_server(10).await;

    let response = server
        .post("/snippets/")
        .json(&json!({"code": "print(1)"}))
        .await;

    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(
        body["detail"],
        "Authentication credentials were not provided."
    );
}

#[tokio::test]
async fn test_wrong_basic_credentials_rejected() {
    let server = create_test_server(10).await;
    let (name, value) = basic("alice", "not-her-password");

    let response = server.get("/snippets/").add_header(name, value).await;

    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Invalid username/password.");
}

#[tokio::test]
async fn test_create_and_retrieve_snippet() {
    let server = create_test_server(10).await;

    let response = create_snippet(
        &server,
        "alice",
        json!({"title": "hello", "code": "print(\"hello\")\n"}),
    )
    .await;

    assert_eq!(response.status_code(), 201);
    let created: Value = response.json();
    assert_eq!(
        created,
        json!({
            "url": "/snippets/1/",
            "id": 1,
            "highlight": "/snippets/1/highlight/",
            "owner": "alice",
            "title": "hello",
            "code": "print(\"hello\")\n",
            "linenos": false,
            "language": "python",
            "style": "InspiredGitHub",
        })
    );

    let response = server.get("/snippets/1/").await;
    assert_eq!(response.status_code(), 200);
    let fetched: Value = response.json();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_create_validation_errors() {
    let server = create_test_server(10).await;

    let response = create_snippet(
        &server,
        "alice",
        json!({"title": "x".repeat(101), "language": "klingon"}),
    )
    .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], json!(["This field is required."]));
    assert_eq!(body["language"], json!(["\"klingon\" is not a valid choice."]));
    assert!(body["title"].is_array());

    // Nothing was stored
    let body: Value = server.get("/snippets/").await.json();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let server = create_test_server(10).await;
    let (name, value) = basic("alice", "wonderland");

    let response = server
        .post("/snippets/")
        .add_header(name, value)
        .text("{not json")
        .content_type("application/json")
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_retrieve_missing_and_non_numeric() {
    let server = create_test_server(10).await;

    for path in ["/snippets/99/", "/snippets/abc/", "/users/abc/"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), 404, "{path}");
        let body: Value = response.json();
        assert_eq!(body["detail"], "Not found.");
    }
}

#[tokio::test]
async fn test_pagination_links() {
    let server = create_test_server(2).await;
    for i in 0..5 {
        let response =
            create_snippet(&server, "alice", json!({"code": format!("x = {i}")})).await;
        assert_eq!(response.status_code(), 201);
    }

    let first: Value = server.get("/snippets/").await.json();
    assert_eq!(first["count"], 5);
    assert_eq!(first["next"], "/snippets/?page=2");
    assert_eq!(first["previous"], Value::Null);
    assert_eq!(first["results"].as_array().unwrap().len(), 2);

    let second: Value = server.get("/snippets/").add_query_param("page", 2).await.json();
    assert_eq!(second["next"], "/snippets/?page=3");
    assert_eq!(second["previous"], "/snippets/");
    assert_eq!(second["results"][0]["id"], 3);

    let last: Value = server.get("/snippets/").add_query_param("page", 3).await.json();
    assert_eq!(last["next"], Value::Null);
    assert_eq!(last["previous"], "/snippets/?page=2");
    assert_eq!(last["results"].as_array().unwrap().len(), 1);

    for page in ["4", "0", "last"] {
        let response = server.get("/snippets/").add_query_param("page", page).await;
        assert_eq!(response.status_code(), 404);
        let body: Value = response.json();
        assert_eq!(body["detail"], "Invalid page.");
    }
}

#[tokio::test]
async fn test_only_owner_can_modify() {
    let server = create_test_server(10).await;
    create_snippet(&server, "alice", json!({"code": "a = 1"})).await;

    // Anonymous writes are rejected before the lookup
    let response = server.delete("/snippets/1/").await;
    assert_eq!(response.status_code(), 403);
    let response = server.delete("/snippets/42/").await;
    assert_eq!(response.status_code(), 403);

    // Authenticated non-owners see the lookup first, then the ownership check
    let (name, value) = basic("bob", "builder");
    let response = server
        .delete("/snippets/42/")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), 404);

    let response = server
        .patch("/snippets/1/")
        .add_header(name.clone(), value.clone())
        .json(&json!({"title": "mine now"}))
        .await;
    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(
        body["detail"],
        "You do not have permission to perform this action."
    );

    let response = server
        .delete("/snippets/1/")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 403);

    let body: Value = server.get("/snippets/1/").await.json();
    assert_eq!(body["code"], "a = 1");
}

#[tokio::test]
async fn test_owner_update_patch_and_delete() {
    let server = create_test_server(10).await;
    create_snippet(
        &server,
        "alice",
        json!({"title": "first", "code": "a = 1"}),
    )
    .await;
    let (name, value) = basic("alice", "wonderland");

    // Full update requires code
    let response = server
        .put("/snippets/1/")
        .add_header(name.clone(), value.clone())
        .json(&json!({"title": "second"}))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .put("/snippets/1/")
        .add_header(name.clone(), value.clone())
        .json(&json!({"title": "second", "code": "b = 2", "language": "rust"}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["title"], "second");
    assert_eq!(body["language"], "rust");

    // Partial update keeps the other fields
    let response = server
        .patch("/snippets/1/")
        .add_header(name.clone(), value.clone())
        .json(&json!({"linenos": true}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["linenos"], true);
    assert_eq!(body["code"], "b = 2");
    assert_eq!(body["owner"], "alice");

    let response = server
        .delete("/snippets/1/")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 204);

    let response = server.get("/snippets/1/").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_highlight_renders_html() {
    let server = create_test_server(10).await;
    create_snippet(
        &server,
        "alice",
        json!({"title": "<b>demo</b>", "code": "def f():\n    return 1\n", "linenos": true}),
    )
    .await;

    let response = server.get("/snippets/1/highlight/").await;

    assert_eq!(response.status_code(), 200);
    let content_type = response.header(header::CONTENT_TYPE);
    assert!(content_type.to_str().unwrap().starts_with("text/html"));
    let html = response.text();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("&lt;b&gt;demo&lt;/b&gt;"));
    assert!(html.contains("<pre"));
    assert!(html.contains("class=\"lineno\""));

    let response = server.get("/snippets/2/highlight/").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_highlight_follows_updates() {
    let server = create_test_server(10).await;
    create_snippet(&server, "alice", json!({"code": "old_name = 1"})).await;
    let (name, value) = basic("alice", "wonderland");

    server
        .patch("/snippets/1/")
        .add_header(name, value)
        .json(&json!({"code": "new_name = 2"}))
        .await;

    let html = server.get("/snippets/1/highlight/").await.text();
    assert!(html.contains("new_name"));
    assert!(!html.contains("old_name"));
}

#[tokio::test]
async fn test_users_list_links_snippets() {
    let server = create_test_server(10).await;
    create_snippet(&server, "alice", json!({"code": "a = 1"})).await;
    create_snippet(&server, "bob", json!({"code": "b = 2"})).await;
    create_snippet(&server, "alice", json!({"code": "c = 3"})).await;

    let response = server.get("/users/").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["results"][0],
        json!({
            "url": "/users/1/",
            "id": 1,
            "username": "alice",
            "snippets": ["/snippets/1/", "/snippets/3/"],
        })
    );

    let bob: Value = server.get("/users/2/").await.json();
    assert_eq!(bob["snippets"], json!(["/snippets/2/"]));
    assert!(bob.get("password_hash").is_none());
}

#[tokio::test]
async fn test_users_are_read_only() {
    let server = create_test_server(10).await;
    let (name, value) = basic("alice", "wonderland");

    let response = server
        .post("/users/")
        .add_header(name.clone(), value.clone())
        .json(&json!({"username": "mallory"}))
        .await;
    assert_eq!(response.status_code(), 405);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Method \"POST\" not allowed.");

    let response = server
        .delete("/users/1/")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 405);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Method \"DELETE\" not allowed.");

    let response = server.put("/users/").json(&json!({})).await;
    assert_eq!(response.status_code(), 405);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Method \"PUT\" not allowed.");
}

#[tokio::test]
async fn test_missing_trailing_slash_redirects() {
    let server = create_test_server(10).await;

    let response = server.get("/snippets").add_query_param("page", 2).await;
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header(header::LOCATION), "/snippets/?page=2");

    let response = server.get("/users/1").await;
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header(header::LOCATION), "/users/1/");

    let response = server.get("/api-auth/login").await;
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header(header::LOCATION), "/api-auth/login/");

    let response = server.get("/nowhere").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Not found.");
}

#[tokio::test]
async fn test_login_form() {
    let server = create_test_server(10).await;

    let response = server
        .get("/api-auth/login/")
        .add_query_param("next", "/snippets/")
        .await;

    assert_eq!(response.status_code(), 200);
    let html = response.text();
    assert!(html.contains("name=\"username\""));
    assert!(html.contains("value=\"/snippets/\""));
}

#[tokio::test]
async fn test_login_session_and_logout() {
    let server = create_test_server(10).await;

    let response = server
        .post("/api-auth/login/")
        .form(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("next", "/snippets/"),
        ])
        .await;
    assert_eq!(response.status_code(), 303);
    assert_eq!(response.header(header::LOCATION), "/snippets/");

    let set_cookie = response.header(header::SET_COOKIE);
    let cookie = set_cookie
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("sessionid="));
    let cookie = HeaderValue::from_str(&cookie).unwrap();

    // The session authenticates writes
    let response = server
        .post("/snippets/")
        .add_header(header::COOKIE, cookie.clone())
        .json(&json!({"code": "via_session = True"}))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["owner"], "alice");

    let response = server
        .post("/api-auth/logout/")
        .add_header(header::COOKIE, cookie.clone())
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(
        response
            .header(header::SET_COOKIE)
            .to_str()
            .unwrap()
            .contains("Max-Age=0")
    );

    // The old key is gone
    let response = server
        .post("/snippets/")
        .add_header(header::COOKIE, cookie)
        .json(&json!({"code": "stale = True"}))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_login_failure_and_unsafe_next() {
    let server = create_test_server(10).await;

    let response = server
        .post("/api-auth/login/")
        .form(&[("username", "alice"), ("password", "nope")])
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(
        response
            .text()
            .contains("Please enter a correct username and password.")
    );

    let response = server
        .post("/api-auth/login/")
        .form(&[
            ("username", "bob"),
            ("password", "builder"),
            ("next", "//evil.example.com/"),
        ])
        .await;
    assert_eq!(response.status_code(), 303);
    assert_eq!(response.header(header::LOCATION), "/");
}

#[tokio::test]
async fn test_logout_requires_post() {
    let server = create_test_server(10).await;

    let response = server.get("/api-auth/logout/").await;

    assert_eq!(response.status_code(), 405);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Method \"GET\" not allowed.");
}
