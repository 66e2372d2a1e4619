use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use domains::{User, UserProfile};

use super::creation_response;
use crate::http::{ApiError, AppState};

pub async fn create(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
    body: Result<Json<UserProfile>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(profile) = body?;
    let outcome = state.users.create(&nickname, profile).await?;
    Ok(creation_response(outcome))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.profile(&nickname).await?))
}

pub async fn change(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
    body: Result<Json<UserProfile>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(patch) = body?;
    Ok(Json(state.users.change(&nickname, patch).await?))
}
