//! # Repository Ports
//!
//! Storage contracts the services depend on. Every backend (in-memory,
//! PostgreSQL) implements these traits and is injected as `Arc<dyn ...>`.
//!
//! Lookups return `Ok(None)` for a missing row; only backend failures and the
//! typed integrity violations of [`StoreError`] travel as errors.

use async_trait::async_trait;

use crate::errors::StoreResult;
use crate::models::{
    Forum, NewForum, NewPost, Post, ServiceStatus, Thread, ThreadDraft, ThreadListQuery, User,
    UserListQuery, Vote,
};
use crate::post_query::PostQueryPlan;

/// Persistence of user profiles. Nicknames and emails are unique and
/// compared case-insensitively.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> StoreResult<()>;
    async fn find_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Every user whose nickname or email matches either argument.
    async fn find_conflicts(&self, nickname: &str, email: &str) -> StoreResult<Vec<User>>;
    /// Users among `nicknames` that exist. Order is unspecified.
    async fn find_many(&self, nicknames: &[String]) -> StoreResult<Vec<User>>;
    async fn update(&self, user: &User) -> StoreResult<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ForumRepository: Send + Sync {
    /// Stores the forum with zero counters and returns it.
    async fn insert(&self, forum: &NewForum) -> StoreResult<Forum>;
    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>>;
    async fn list_threads(&self, slug: &str, query: &ThreadListQuery) -> StoreResult<Vec<Thread>>;
    /// Users who created a thread or a post in the forum.
    async fn list_users(&self, slug: &str, query: &UserListQuery) -> StoreResult<Vec<User>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// Assigns an id, bumps the forum's thread counter and registers the
    /// author as a forum participant.
    async fn insert(&self, draft: &ThreadDraft) -> StoreResult<Thread>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Thread>>;
    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Thread>>;
    /// Writes title and message of `thread`.
    async fn update(&self, thread: &Thread) -> StoreResult<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Inserts or replaces the user's vote and recomputes the thread total.
    async fn upsert(&self, vote: &Vote) -> StoreResult<()>;
}

/// Persistence of posts and their materialized paths.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Inserts the whole batch atomically, in order. Ids are assigned in
    /// batch order, so a later post may reply to an earlier one.
    ///
    /// Fails with [`crate::StoreError::ParentNotInThread`] when a non-zero
    /// parent is not a post of the same thread; nothing is stored then.
    async fn insert_many(&self, posts: &[NewPost]) -> StoreResult<Vec<Post>>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    /// Replaces the message and marks the post edited.
    async fn update_message(&self, id: i64, message: &str) -> StoreResult<Option<Post>>;
    async fn select_page(&self, plan: &PostQueryPlan) -> StoreResult<Vec<Post>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn status(&self) -> StoreResult<ServiceStatus>;
    /// Removes every row of every table.
    async fn clear(&self) -> StoreResult<()>;
}
