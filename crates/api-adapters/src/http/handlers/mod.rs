pub mod forums;
pub mod posts;
pub mod service;
pub mod threads;
pub mod users;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::Creation;
use serde::Serialize;

/// 201 with the new entity, or 409 with whatever blocked its creation.
fn creation_response<T: Serialize, C: Serialize>(outcome: Creation<T, C>) -> Response {
    match outcome {
        Creation::Created(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Creation::Conflict(existing) => (StatusCode::CONFLICT, Json(existing)).into_response(),
    }
}
