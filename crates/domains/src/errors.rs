//! # DomainError
//!
//! Centralized error handling for the forum backend.
//! Storage failures arrive as [`StoreError`] and are translated into the
//! domain taxonomy at the service boundary.

use std::fmt;

use thiserror::Error;

/// Entities that can be looked up and found missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Forum,
    Thread,
    Post,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::User => "user",
            Entity::Forum => "forum",
            Entity::Thread => "thread",
            Entity::Post => "post",
        })
    }
}

/// The primary error type for all service operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Resource not found (user by nickname, forum by slug, thread, post)
    #[error("{entity} not found: {key}")]
    NotFound { entity: Entity, key: String },

    /// A post in a batch names a parent that does not live in the target thread
    #[error("parent post {parent} does not exist in thread {thread}")]
    ParentNotInThread { parent: i64, thread: i64 },

    /// Profile update would steal another user's email
    #[error("email {0} is already used by another user")]
    EmailTaken(String),

    /// Infrastructure failure (e.g. DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        DomainError::NotFound { entity, key: key.to_string() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::NotFound { entity: Entity::User, .. } => ErrorCode::UserDoesNotExist,
            DomainError::NotFound { entity: Entity::Forum, .. } => ErrorCode::ForumDoesNotExist,
            DomainError::NotFound { entity: Entity::Thread, .. } => ErrorCode::ThreadDoesNotExist,
            DomainError::NotFound { entity: Entity::Post, .. } => ErrorCode::PostDoesNotExist,
            DomainError::ParentNotInThread { .. } => ErrorCode::ParentPostDoesNotExistInThread,
            DomainError::EmailTaken(_) => ErrorCode::UserEmailConflicts,
            DomainError::Internal(_) => ErrorCode::InternalServerError,
        }
    }
}

/// A specialized Result type for service logic.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Stable numeric error codes shared with API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    BadRequest = 101,
    InternalServerError = 102,
    UserDoesNotExist = 103,
    UserEmailConflicts = 105,
    ForumDoesNotExist = 107,
    ThreadDoesNotExist = 109,
    PostDoesNotExist = 110,
    ParentPostDoesNotExistInThread = 113,
}

/// Coarse classification used to pick a transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn class(self) -> ErrorClass {
        use ErrorCode::*;
        match self {
            BadRequest => ErrorClass::BadRequest,
            UserDoesNotExist | ForumDoesNotExist | ThreadDoesNotExist | PostDoesNotExist => {
                ErrorClass::NotFound
            }
            UserEmailConflicts | ParentPostDoesNotExistInThread => ErrorClass::Conflict,
            InternalServerError => ErrorClass::Internal,
        }
    }

    /// Message safe to show to API clients.
    pub fn user_message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            BadRequest => "Incorrect format of request",
            InternalServerError => "Error on server",
            UserDoesNotExist => "Can't find user with this nickname",
            UserEmailConflicts => "Input email already exists",
            ForumDoesNotExist => "Can't find forum with this slug",
            ThreadDoesNotExist => "Can't find thread with this slug/id",
            PostDoesNotExist => "Can't find post with this id",
            ParentPostDoesNotExistInThread => "Parent post doesn't exist in thread",
        }
    }
}

/// Failures reported by repository implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Insert-many met a parent id that is not a post of the batch's thread.
    /// Nothing from the batch was persisted.
    #[error("parent post {parent} is not in thread {thread}")]
    ParentNotInThread { parent: i64, thread: i64 },

    /// A unique constraint rejected the write
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Anything else the backend reported
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ParentNotInThread { parent, thread } => {
                DomainError::ParentNotInThread { parent, thread }
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}
