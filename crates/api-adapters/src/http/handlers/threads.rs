use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{Post, PostInput, SlugOrId, Thread, ThreadPatch};

use crate::http::params::{PostListParams, VoteBody};
use crate::http::{ApiError, AppState};

/// Adds a batch of posts; the whole batch is rejected on the first error.
pub async fn create_posts(
    State(state): State<AppState>,
    Path(slug_or_id): Path<String>,
    body: Result<Json<Vec<PostInput>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Post>>), ApiError> {
    let Json(batch) = body?;
    let posts = state.posts.create_many(&SlugOrId::parse(&slug_or_id), batch).await?;
    Ok((StatusCode::CREATED, Json(posts)))
}

pub async fn details(
    State(state): State<AppState>,
    Path(slug_or_id): Path<String>,
) -> Result<Json<Thread>, ApiError> {
    Ok(Json(state.threads.details(&SlugOrId::parse(&slug_or_id)).await?))
}

pub async fn change(
    State(state): State<AppState>,
    Path(slug_or_id): Path<String>,
    body: Result<Json<ThreadPatch>, JsonRejection>,
) -> Result<Json<Thread>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.threads.change(&SlugOrId::parse(&slug_or_id), patch).await?))
}

pub async fn vote(
    State(state): State<AppState>,
    Path(slug_or_id): Path<String>,
    body: Result<Json<VoteBody>, JsonRejection>,
) -> Result<Json<Thread>, ApiError> {
    let Json(vote) = body?;
    let thread = state
        .threads
        .vote(&SlugOrId::parse(&slug_or_id), &vote.nickname, vote.voice)
        .await?;
    Ok(Json(thread))
}

/// Lists a thread's posts in `flat`, `tree` or `parent_tree` order.
pub async fn posts(
    State(state): State<AppState>,
    Path(slug_or_id): Path<String>,
    params: Result<Query<PostListParams>, QueryRejection>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let Query(params) = params?;
    let posts = state
        .posts
        .list(&SlugOrId::parse(&slug_or_id), params.sort(), params.since, params.page())
        .await?;
    Ok(Json(posts))
}
