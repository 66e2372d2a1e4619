use std::sync::Arc;

use domains::{
    Creation, DomainError, Entity, Forum, ForumRepository, NewForum, Result, StoreError, Thread,
    ThreadListQuery, User, UserListQuery, UserRepository,
};
use tracing::{info, instrument};

use crate::DEFAULT_THREAD_LIMIT;

/// Forum creation and the forum-scoped listings.
pub struct ForumService {
    forums: Arc<dyn ForumRepository>,
    users: Arc<dyn UserRepository>,
}

impl ForumService {
    pub fn new(forums: Arc<dyn ForumRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { forums, users }
    }

    /// Creates a forum owned by an existing user. A taken slug yields the
    /// forum that already holds it.
    #[instrument(skip(self, forum), fields(slug = %forum.slug))]
    pub async fn create(&self, forum: NewForum) -> Result<Creation<Forum>> {
        let owner = self
            .users
            .find_by_nickname(&forum.user)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::User, &forum.user))?;

        if let Some(existing) = self.forums.find_by_slug(&forum.slug).await? {
            return Ok(Creation::Conflict(existing));
        }

        let forum = NewForum { user: owner.nickname, ..forum };
        match self.forums.insert(&forum).await {
            Ok(created) => {
                info!(owner = %created.user, "forum created");
                Ok(Creation::Created(created))
            }
            Err(StoreError::UniqueViolation(_)) => {
                let existing = self.details(&forum.slug).await?;
                Ok(Creation::Conflict(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn details(&self, slug: &str) -> Result<Forum> {
        self.forums
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Forum, slug))
    }

    /// Threads of the forum ordered by creation time. A zero limit falls back
    /// to [`DEFAULT_THREAD_LIMIT`].
    #[instrument(skip(self))]
    pub async fn threads(&self, slug: &str, mut query: ThreadListQuery) -> Result<Vec<Thread>> {
        let forum = self.details(slug).await?;
        if query.limit == 0 {
            query.limit = DEFAULT_THREAD_LIMIT;
        }
        Ok(self.forums.list_threads(&forum.slug, &query).await?)
    }

    /// Users who started a thread or wrote a post in the forum.
    #[instrument(skip(self))]
    pub async fn users(&self, slug: &str, query: UserListQuery) -> Result<Vec<User>> {
        let forum = self.details(slug).await?;
        Ok(self.forums.list_users(&forum.slug, &query).await?)
    }
}
