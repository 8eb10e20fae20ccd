use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use yatube::{
    api::create_router,
    app_state::AppState,
    config::Config,
    infrastructure::{attachments::FsAttachmentStore, sqlite_database::SqliteDatabase},
    models::{EntityType, NewPost, NewUser},
};

const ADMIN: &str = "System test-admin";

async fn setup() -> (Router, AppState, tempfile::TempDir) {
    let media = tempfile::tempdir().unwrap();
    let config = Config::in_memory(&media.path().to_string_lossy());
    let store = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
    let attachments = Arc::new(FsAttachmentStore::new(media.path()));
    let state = AppState::with_parts(store, attachments, config);
    (create_router(state.clone()), state, media)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _, _media) = setup().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_admin_routes_require_system_token() {
    let (app, state, _media) = setup().await;

    let payload = json!({"username": "auth"});
    let (status, _) = send(&app, Method::POST, "/admin/users", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        Method::POST,
        "/admin/users",
        Some("System wrong"),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::POST, "/admin/users", Some(ADMIN), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "auth");

    let (status, _) = send(
        &app,
        Method::POST,
        "/admin/groups",
        Some("Bearer auth"),
        Some(json!({"title": "Test group", "slug": "test-slug"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(state.store.count(EntityType::Group).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_bearer_rejected() {
    let (app, _, _media) = setup().await;
    let (status, body) = send(&app, Method::GET, "/", Some("Bearer ghost"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn test_index_is_cached_until_cleared() {
    let (app, state, _media) = setup().await;
    let author = state.store.create_user(NewUser::new("auth")).await.unwrap();
    let post = state
        .store
        .create_post(NewPost::new(author.id, "cached"))
        .await
        .unwrap();

    let (status, body) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/admin/posts/{}", post.id),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // stale until the cache is cleared
    let (_, body) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["text"], "cached");

    let (status, body) = send(&app, Method::POST, "/admin/cache/clear", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = send(&app, Method::GET, "/", None, None).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["page"]["number"], 1);
}

#[tokio::test]
async fn test_create_post_with_base64_image() {
    let (app, state, media) = setup().await;
    state.store.create_user(NewUser::new("auth")).await.unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/create",
        Some("Bearer auth"),
        Some(json!({
            "text": "Post with image",
            "image": {"filename": "small.gif", "data": "R0lGODlhAQABAAAAACw="}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["author_username"], "auth");
    let reference = body["image"].as_str().unwrap();
    assert!(media.path().join(reference).exists());

    let (status, _) = send(
        &app,
        Method::POST,
        "/create",
        Some("Bearer auth"),
        Some(json!({"text": "bad", "image": {"filename": "x.gif", "data": "***"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/create",
        Some("Bearer auth"),
        Some(json!({"text": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty text");

    let (status, _) = send(&app, Method::POST, "/create", None, Some(json!({"text": "anon"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(state.store.count(EntityType::Post).await.unwrap(), 1);
}

#[tokio::test]
async fn test_edit_and_comment_permissions() {
    let (app, state, _media) = setup().await;
    let author = state.store.create_user(NewUser::new("auth")).await.unwrap();
    state.store.create_user(NewUser::new("other")).await.unwrap();
    let post = state
        .store
        .create_post(NewPost::new(author.id, "original"))
        .await
        .unwrap();

    let edit_uri = format!("/posts/{}/edit", post.id);
    let (status, _) = send(
        &app,
        Method::POST,
        &edit_uri,
        Some("Bearer other"),
        Some(json!({"text": "hijacked"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::POST,
        &edit_uri,
        Some("Bearer auth"),
        Some(json!({"text": "edited"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "edited");

    let comment_uri = format!("/posts/{}/comment", post.id);
    let (status, _) = send(&app, Method::POST, &comment_uri, None, Some(json!({"text": "hi"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        Method::POST,
        &comment_uri,
        Some("Bearer other"),
        Some(json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::GET, &format!("/posts/{}", post.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comments"][0]["text"], "hi");
    assert_eq!(body["author_post_count"], 1);

    let (status, _) = send(&app, Method::GET, "/posts/999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follow_routes() {
    let (app, state, _media) = setup().await;
    let author = state.store.create_user(NewUser::new("auth")).await.unwrap();
    state.store.create_user(NewUser::new("reader")).await.unwrap();
    state
        .store
        .create_post(NewPost::new(author.id, "followed text"))
        .await
        .unwrap();

    for _ in 0..2 {
        let (status, body) = send(
            &app,
            Method::POST,
            "/profile/auth/follow",
            Some("Bearer reader"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["following"], true);
    }
    assert_eq!(state.store.count(EntityType::Follow).await.unwrap(), 1);

    let (status, body) = send(&app, Method::GET, "/follow", Some("Bearer reader"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["text"], "followed text");

    let (_, body) = send(&app, Method::GET, "/profile/auth", Some("Bearer reader"), None).await;
    assert_eq!(body["following"], true);
    assert_eq!(body["post_count"], 1);

    let (status, _) = send(&app, Method::POST, "/profile/auth/follow", Some("Bearer auth"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            Method::POST,
            "/profile/auth/unfollow",
            Some("Bearer reader"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(state.store.count(EntityType::Follow).await.unwrap(), 0);

    let (status, _) = send(&app, Method::GET, "/follow", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_group_page_and_admin_deletes() {
    let (app, state, _media) = setup().await;
    let author = state.store.create_user(NewUser::new("auth")).await.unwrap();
    let (status, group) = send(
        &app,
        Method::POST,
        "/admin/groups",
        Some(ADMIN),
        Some(json!({"title": "Test group", "slug": "test-slug", "description": "Test description"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();
    state
        .store
        .create_post(NewPost::new(author.id, "grouped").group(group_id))
        .await
        .unwrap();

    let (status, body) = send(&app, Method::GET, "/group/test-slug?page=abc", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"]["title"], "Test group");
    assert_eq!(body["items"][0]["text"], "grouped");
    assert_eq!(body["page"]["number"], 1);

    let (status, _) = send(&app, Method::GET, "/group/nonexistent", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/admin/groups",
        Some(ADMIN),
        Some(json!({"title": "Dup", "slug": "test-slug"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::DELETE, "/admin/groups/test-slug", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.store.count(EntityType::Post).await.unwrap(), 1);

    let (status, _) = send(&app, Method::DELETE, "/admin/users/auth", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.store.count(EntityType::Post).await.unwrap(), 0);
}
