// HTTP surface - JSON handlers over the feed composer and post service

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path as AxumPath, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    infrastructure::middleware::{viewer_context_middleware, Vc},
    models::{EntityRef, NewGroup, NewUser},
    pagination::parse_page_number,
    services::PostDraft,
};

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
}

impl PageParams {
    fn number(&self) -> i64 {
        parse_page_number(self.page.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub filename: String,
    /// Standard base64.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub text: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub image: Option<ImagePayload>,
}

impl PostRequest {
    fn into_draft(self) -> AppResult<PostDraft> {
        let mut draft = PostDraft::new(&self.text);
        if let Some(slug) = self.group.as_deref().filter(|slug| !slug.is_empty()) {
            draft = draft.group(slug);
        }
        if let Some(image) = self.image {
            let content = base64::engine::general_purpose::STANDARD
                .decode(image.data.as_bytes())
                .map_err(|e| AppError::BadRequest(format!("invalid image encoding: {}", e)))?;
            draft = draft.image(&image.filename, content);
        }
        Ok(draft)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

// Feeds

/// The index is served from the page cache while the entry is fresh.
pub async fn index_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    let key = uri.to_string();
    if let Some(body) = state.page_cache.get(&key).await {
        return Ok(json_bytes(body));
    }

    let page = state.feeds.global_feed(params.number()).await?;
    let body = serde_json::to_vec(&page)
        .map_err(|e| AppError::Internal(format!("serialising index page: {}", e)))?;
    state.page_cache.insert(&key, body.clone()).await;
    Ok(json_bytes(body))
}

pub async fn group_handler(
    State(state): State<AppState>,
    AxumPath(slug): AxumPath<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Value>> {
    let (group, page) = state.feeds.group_feed(&slug, params.number()).await?;
    Ok(Json(json!({
        "group": group,
        "items": page.items,
        "page": page.page,
    })))
}

pub async fn profile_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(username): AxumPath<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Value>> {
    let profile = state.posts.profile(&vc, &username, params.number()).await?;
    Ok(Json(json!({
        "author": profile.author,
        "post_count": profile.post_count,
        "following": profile.following,
        "items": profile.posts.items,
        "page": profile.posts.page,
    })))
}

pub async fn follow_index_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Value>> {
    let page = state.feeds.subscription_feed(&vc, params.number()).await?;
    Ok(Json(json!(page)))
}

// Posts

pub async fn post_detail_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> AppResult<Json<Value>> {
    let detail = state.posts.post_detail(id).await?;
    Ok(Json(json!(detail)))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(req): Json<PostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let post = state.posts.create_post(&vc, req.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(json!(post))))
}

pub async fn edit_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<PostRequest>,
) -> AppResult<Json<Value>> {
    let post = state.posts.edit_post(&vc, id, req.into_draft()?).await?;
    Ok(Json(json!(post)))
}

pub async fn add_comment_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let comment = state.posts.add_comment(&vc, id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(json!(comment))))
}

// Follows

pub async fn follow_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(username): AxumPath<String>,
) -> AppResult<Json<Value>> {
    let created = state.posts.follow(&vc, &username).await?;
    Ok(Json(json!({"author": username, "following": true, "created": created})))
}

pub async fn unfollow_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(username): AxumPath<String>,
) -> AppResult<Json<Value>> {
    let removed = state.posts.unfollow(&vc, &username).await?;
    Ok(Json(json!({"author": username, "following": false, "removed": removed})))
}

// Administration

pub async fn create_user_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(req): Json<NewUser>,
) -> AppResult<(StatusCode, Json<Value>)> {
    vc.require_system()?;
    let user = state.store.create_user(req).await?;
    info!(user = %user, "Created user");
    Ok((StatusCode::CREATED, Json(json!(user))))
}

pub async fn delete_user_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(username): AxumPath<String>,
) -> AppResult<Json<Value>> {
    vc.require_system()?;
    let user = state
        .store
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", username)))?;
    let deleted = state.posts.delete_entity(&vc, EntityRef::user(user.id)).await?;
    Ok(Json(json!({"username": username, "deleted": deleted})))
}

pub async fn create_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(req): Json<NewGroup>,
) -> AppResult<(StatusCode, Json<Value>)> {
    vc.require_system()?;
    let group = state.store.create_group(req).await?;
    info!(slug = %group.slug, "Created group");
    Ok((StatusCode::CREATED, Json(json!(group))))
}

pub async fn delete_group_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(slug): AxumPath<String>,
) -> AppResult<Json<Value>> {
    vc.require_system()?;
    let group = state
        .store
        .get_group_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("group {}", slug)))?;
    let deleted = state.posts.delete_entity(&vc, EntityRef::group(group.id)).await?;
    Ok(Json(json!({"slug": slug, "deleted": deleted})))
}

pub async fn delete_post_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<i64>,
) -> AppResult<Json<Value>> {
    if !state.posts.delete_entity(&vc, EntityRef::post(id)).await? {
        return Err(AppError::NotFound(format!("post {}", id)));
    }
    Ok(Json(json!({"id": id, "deleted": true})))
}

pub async fn clear_cache_handler(State(state): State<AppState>, vc: Vc) -> AppResult<Json<Value>> {
    vc.require_system()?;
    let cleared = state.page_cache.len().await;
    state.page_cache.clear().await;
    info!(cleared, "Cleared page cache");
    Ok(Json(json!({"cleared": cleared})))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn json_bytes(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], Bytes::from(body)).into_response()
}

pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.config.media.root);

    Router::new()
        .route("/", get(index_handler))
        .route("/group/{slug}", get(group_handler))
        .route("/profile/{username}", get(profile_handler))
        .route("/profile/{username}/follow", post(follow_handler))
        .route("/profile/{username}/unfollow", post(unfollow_handler))
        .route("/follow", get(follow_index_handler))
        .route("/create", post(create_post_handler))
        .route("/posts/{id}", get(post_detail_handler))
        .route("/posts/{id}/edit", post(edit_post_handler))
        .route("/posts/{id}/comment", post(add_comment_handler))
        .route("/admin/users", post(create_user_handler))
        .route("/admin/users/{username}", delete(delete_user_handler))
        .route("/admin/groups", post(create_group_handler))
        .route("/admin/groups/{slug}", delete(delete_group_handler))
        .route("/admin/posts/{id}", delete(delete_post_handler))
        .route("/admin/cache/clear", post(clear_cache_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware::<AppState>,
        ))
        .route("/health", get(health_handler))
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
