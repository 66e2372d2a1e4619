//! # HTTP API
//!
//! Routing and orchestration between HTTP requests and the services.

mod error;
mod handlers;
pub mod metrics;
mod params;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware, Router};
use domains::{
    ForumRepository, PostRepository, StatusRepository, ThreadRepository, UserRepository,
    VoteRepository,
};
use services::{ForumService, PostService, StatusService, ThreadService, UserService};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use metrics::HttpMetrics;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub forums: Arc<ForumService>,
    pub threads: Arc<ThreadService>,
    pub posts: Arc<PostService>,
    pub status: Arc<StatusService>,
    pub metrics: Arc<HttpMetrics>,
}

impl AppState {
    /// Wires every service to one store implementing all repository ports.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + ForumRepository
            + ThreadRepository
            + VoteRepository
            + PostRepository
            + StatusRepository
            + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let forums: Arc<dyn ForumRepository> = store.clone();
        let threads: Arc<dyn ThreadRepository> = store.clone();
        let votes: Arc<dyn VoteRepository> = store.clone();
        let posts: Arc<dyn PostRepository> = store.clone();
        let status: Arc<dyn StatusRepository> = store;

        Self {
            users: Arc::new(UserService::new(users.clone())),
            forums: Arc::new(ForumService::new(forums.clone(), users.clone())),
            threads: Arc::new(ThreadService::new(
                threads.clone(),
                forums.clone(),
                users.clone(),
                votes,
            )),
            posts: Arc::new(PostService::new(posts, threads, forums, users)),
            status: Arc::new(StatusService::new(status)),
            metrics: Arc::new(HttpMetrics::new()),
        }
    }
}

fn api_routes() -> Router<AppState> {
    use handlers::{forums, posts, service, threads, users};

    Router::new()
        .route("/user/{nickname}/create", post(users::create))
        .route("/user/{nickname}/profile", get(users::profile).post(users::change))
        .route("/forum/create", post(forums::create))
        .route("/forum/{slug}/details", get(forums::details))
        .route("/forum/{slug}/create", post(forums::create_thread))
        .route("/forum/{slug}/threads", get(forums::threads))
        .route("/forum/{slug}/users", get(forums::users))
        .route("/thread/{slug_or_id}/create", post(threads::create_posts))
        .route("/thread/{slug_or_id}/details", get(threads::details).post(threads::change))
        .route("/thread/{slug_or_id}/vote", post(threads::vote))
        .route("/thread/{slug_or_id}/posts", get(threads::posts))
        .route("/post/{id}/details", get(posts::details).post(posts::change))
        .route("/service/clear", post(service::clear))
        .route("/service/status", get(service::status))
}

/// Builds the application router with the standard middleware stack.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .nest("/api", api_routes())
        .route("/metrics", get(metrics::export))
        .route_layer(middleware::from_fn_with_state(state.clone(), metrics::track))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
