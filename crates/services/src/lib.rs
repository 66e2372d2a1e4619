//! # services
//!
//! Application layer of the forum. Each service owns the repositories it
//! needs, enforces the business rules and translates storage outcomes into
//! [`domains::DomainError`]s.

mod forum;
mod post;
mod status;
mod thread;
mod user;

pub use forum::ForumService;
pub use post::PostService;
pub use status::StatusService;
pub use thread::ThreadService;
pub use user::UserService;

/// Default page size of forum thread listings when the client sends none.
pub const DEFAULT_THREAD_LIMIT: u32 = 100;
