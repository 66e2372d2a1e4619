//! # api-adapters
//!
//! Transport layer of the forum. With the `web-axum` feature the [`http`]
//! module exposes the JSON API under `/api` plus a Prometheus `/metrics`
//! endpoint.

#[cfg(feature = "web-axum")]
pub mod http;
