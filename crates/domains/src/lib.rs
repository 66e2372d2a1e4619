//! # domains
//!
//! Entities, error taxonomy and repository ports of the forum backend,
//! plus the post query planner that decides how a thread's posts are
//! ordered and paginated.

pub mod errors;
pub mod models;
pub mod ports;
pub mod post_query;

pub use errors::*;
pub use models::*;
pub use ports::*;
pub use post_query::*;
