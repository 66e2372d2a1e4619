use axum::extract::State;
use axum::Json;
use domains::ServiceStatus;

use crate::http::{ApiError, AppState};

pub async fn clear(State(state): State<AppState>) -> Result<(), ApiError> {
    state.status.clear().await?;
    Ok(())
}

pub async fn status(State(state): State<AppState>) -> Result<Json<ServiceStatus>, ApiError> {
    Ok(Json(state.status.status().await?))
}
