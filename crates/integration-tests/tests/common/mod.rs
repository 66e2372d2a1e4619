//! Shared helpers for the router-level tests.
#![allow(dead_code)]

use std::sync::Arc;

use api_adapters::http::{router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use storage_adapters::MemoryStore;
use tower::ServiceExt;

/// A fresh application over an empty in-memory store.
pub fn test_app() -> Router {
    router(AppState::from_store(Arc::new(MemoryStore::new())))
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(payload) => {
            builder = builder.header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).expect("request build should succeed"))
        .await
        .expect("app should handle request");

    let status = response.status();
    let bytes = to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("response body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body must be json")
    };
    (status, value)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn create_user(app: &Router, nickname: &str) {
    let (status, _) = post(
        app,
        &format!("/api/user/{nickname}/create"),
        json!({
            "fullname": format!("{nickname} Tester"),
            "about": "integration test user",
            "email": format!("{nickname}@example.org"),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "creating user {nickname}");
}

pub async fn create_forum(app: &Router, slug: &str, owner: &str) {
    let (status, _) = post(
        app,
        "/api/forum/create",
        json!({ "title": format!("Forum {slug}"), "user": owner, "slug": slug }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "creating forum {slug}");
}

/// Creates a thread and returns its id.
pub async fn create_thread(app: &Router, forum: &str, author: &str, slug: Option<&str>) -> i64 {
    let mut body = json!({
        "title": "A thread",
        "author": author,
        "message": "opening message",
    });
    if let Some(slug) = slug {
        body["slug"] = json!(slug);
    }
    let (status, thread) = post(app, &format!("/api/forum/{forum}/create"), body).await;
    assert_eq!(status, StatusCode::CREATED, "creating thread in {forum}");
    thread["id"].as_i64().expect("thread id")
}

/// Posts a batch to a thread and returns the created post ids.
pub async fn create_posts(app: &Router, thread: &str, batch: Value) -> Vec<i64> {
    let (status, posts) = post(app, &format!("/api/thread/{thread}/create"), batch).await;
    assert_eq!(status, StatusCode::CREATED, "posting to {thread}: {posts}");
    ids(&posts)
}

pub fn ids(posts: &Value) -> Vec<i64> {
    posts
        .as_array()
        .expect("an array of posts")
        .iter()
        .map(|p| p["id"].as_i64().expect("post id"))
        .collect()
}

/// User `ann`, forum `rust` and one thread with slug `lifetimes`.
pub async fn seeded_app() -> (Router, i64) {
    let app = test_app();
    create_user(&app, "ann").await;
    create_user(&app, "bob").await;
    create_forum(&app, "rust", "ann").await;
    let thread = create_thread(&app, "rust", "ann", Some("lifetimes")).await;
    (app, thread)
}
