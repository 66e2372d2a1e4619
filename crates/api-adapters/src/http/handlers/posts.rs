use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use domains::{Post, PostDetails};

use crate::http::params::{PostUpdateBody, RelatedParams};
use crate::http::{ApiError, AppState};

pub async fn details(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<RelatedParams>, QueryRejection>,
) -> Result<Json<PostDetails>, ApiError> {
    let Path(id) = id?;
    let Query(params) = params?;
    Ok(Json(state.posts.details(id, params.related()).await?))
}

pub async fn change(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<PostUpdateBody>, JsonRejection>,
) -> Result<Json<Post>, ApiError> {
    let Path(id) = id?;
    let Json(update) = body?;
    Ok(Json(state.posts.change_by_id(id, update.message).await?))
}
