use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use domains::{Forum, NewForum, NewThread, Thread, User};

use super::creation_response;
use crate::http::params::{ThreadListParams, UserListParams};
use crate::http::{ApiError, AppState};

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewForum>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(forum) = body?;
    Ok(creation_response(state.forums.create(forum).await?))
}

pub async fn details(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Forum>, ApiError> {
    Ok(Json(state.forums.details(&slug).await?))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<NewThread>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(thread) = body?;
    Ok(creation_response(state.threads.create(&slug, thread).await?))
}

pub async fn threads(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    params: Result<Query<ThreadListParams>, QueryRejection>,
) -> Result<Json<Vec<Thread>>, ApiError> {
    let Query(params) = params?;
    Ok(Json(state.forums.threads(&slug, params.into()).await?))
}

pub async fn users(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    params: Result<Query<UserListParams>, QueryRejection>,
) -> Result<Json<Vec<User>>, ApiError> {
    let Query(params) = params?;
    Ok(Json(state.forums.users(&slug, params.into()).await?))
}
