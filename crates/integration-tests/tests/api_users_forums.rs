mod common;

use axum::http::StatusCode;
use common::{create_forum, create_posts, create_thread, create_user, get, post, test_app};
use serde_json::json;

#[tokio::test]
async fn user_registration_and_conflicts() {
    let app = test_app();
    let (status, user) = post(
        &app,
        "/api/user/Ann/create",
        json!({"fullname": "Ann Lee", "about": "rustacean", "email": "ann@example.org"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["nickname"], "Ann");

    create_user(&app, "bob").await;

    // nickname of one user, email of the other
    let (status, conflicts) = post(
        &app,
        "/api/user/ann/create",
        json!({"fullname": "x", "about": "", "email": "bob@example.org"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflicts.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn profile_lookup_is_case_insensitive() {
    let app = test_app();
    create_user(&app, "Ann").await;
    let (status, user) = get(&app, "/api/user/ANN/profile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["nickname"], "Ann");

    let (status, _) = get(&app, "/api/user/nobody/profile").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_update_keeps_empty_fields_and_guards_email() {
    let app = test_app();
    create_user(&app, "ann").await;
    create_user(&app, "bob").await;

    let (status, user) = post(&app, "/api/user/ann/profile", json!({"about": "new bio"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["about"], "new bio");
    assert_eq!(user["email"], "ann@example.org");

    let (status, _) = post(&app, "/api/user/ann/profile", json!({"email": "bob@example.org"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(&app, "/api/user/ghost/profile", json!({"about": "?"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forum_creation_rules() {
    let app = test_app();
    create_user(&app, "Ann").await;

    let (status, _) = post(
        &app,
        "/api/forum/create",
        json!({"title": "Rust", "user": "ghost", "slug": "rust"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, forum) = post(
        &app,
        "/api/forum/create",
        json!({"title": "Rust", "user": "ann", "slug": "rust"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(forum["user"], "Ann");
    assert_eq!(forum["threads"], 0);

    let (status, existing) = post(
        &app,
        "/api/forum/create",
        json!({"title": "Other", "user": "ann", "slug": "RUST"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(existing["title"], "Rust");
}

#[tokio::test]
async fn forum_threads_listing_uses_inclusive_since() {
    let app = test_app();
    create_user(&app, "ann").await;
    create_forum(&app, "rust", "ann").await;
    for (slug, created) in [
        ("a", "2024-01-01T00:00:00Z"),
        ("b", "2024-01-02T00:00:00Z"),
        ("c", "2024-01-03T00:00:00Z"),
    ] {
        let (status, _) = post(
            &app,
            "/api/forum/rust/create",
            json!({"title": slug, "author": "ann", "message": "m", "slug": slug, "created": created}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let slugs = |threads: serde_json::Value| -> Vec<String> {
        threads
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["slug"].as_str().unwrap().to_string())
            .collect()
    };

    let (_, asc) = get(&app, "/api/forum/rust/threads?since=2024-01-02T00:00:00Z").await;
    assert_eq!(slugs(asc), vec!["b", "c"]);
    let (_, desc) = get(&app, "/api/forum/rust/threads?since=2024-01-02T00:00:00Z&desc=true&limit=5").await;
    assert_eq!(slugs(desc), vec!["b", "a"]);
    let (_, limited) = get(&app, "/api/forum/rust/threads?limit=1").await;
    assert_eq!(slugs(limited), vec!["a"]);

    let (status, _) = get(&app, "/api/forum/python/threads").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, forum) = get(&app, "/api/forum/rust/details").await;
    assert_eq!(forum["threads"], 3);
}

#[tokio::test]
async fn forum_users_are_thread_and_post_authors() {
    let app = test_app();
    for nick in ["ann", "Bob", "carl", "dora"] {
        create_user(&app, nick).await;
    }
    create_forum(&app, "rust", "dora").await;
    create_thread(&app, "rust", "carl", Some("t")).await;
    create_posts(
        &app,
        "t",
        json!([{"author": "ann", "message": "x"}, {"author": "Bob", "message": "y"}]),
    )
    .await;

    let nicknames = |users: serde_json::Value| -> Vec<String> {
        users
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["nickname"].as_str().unwrap().to_string())
            .collect()
    };

    // the forum owner never posted
    let (_, all) = get(&app, "/api/forum/rust/users").await;
    assert_eq!(nicknames(all), vec!["ann", "Bob", "carl"]);
    let (_, after) = get(&app, "/api/forum/rust/users?since=ann&limit=1").await;
    assert_eq!(nicknames(after), vec!["Bob"]);
    let (_, desc) = get(&app, "/api/forum/rust/users?desc=true&since=carl").await;
    assert_eq!(nicknames(desc), vec!["Bob", "ann"]);
}

#[tokio::test]
async fn status_counts_and_clear() {
    let app = test_app();
    create_user(&app, "ann").await;
    create_forum(&app, "rust", "ann").await;
    create_thread(&app, "rust", "ann", None).await;
    let thread_id = 1;
    create_posts(&app, &thread_id.to_string(), json!([{"author": "ann", "message": "x"}])).await;

    let (_, status) = get(&app, "/api/service/status").await;
    assert_eq!(status, json!({"user": 1, "forum": 1, "thread": 1, "post": 1}));

    let (code, _) = common::send(&app, axum::http::Method::POST, "/api/service/clear", None).await;
    assert_eq!(code, StatusCode::OK);
    let (_, status) = get(&app, "/api/service/status").await;
    assert_eq!(status, json!({"user": 0, "forum": 0, "thread": 0, "post": 0}));
}
