use std::sync::Arc;

use chrono::Utc;
use domains::{
    Creation, DomainError, Entity, ForumRepository, NewThread, Result, SlugOrId, StoreError,
    Thread, ThreadDraft, ThreadPatch, ThreadRepository, UserRepository, Vote, VoteRepository,
};
use tracing::{info, instrument};

/// Looks a thread up by id or slug, failing with a thread not-found error.
pub(crate) async fn resolve_thread(threads: &dyn ThreadRepository, key: &SlugOrId) -> Result<Thread> {
    let found = match key {
        SlugOrId::Id(id) => threads.find_by_id(*id).await?,
        SlugOrId::Slug(slug) => threads.find_by_slug(slug).await?,
    };
    found.ok_or_else(|| DomainError::not_found(Entity::Thread, key))
}

/// Thread lifecycle and voting.
pub struct ThreadService {
    threads: Arc<dyn ThreadRepository>,
    forums: Arc<dyn ForumRepository>,
    users: Arc<dyn UserRepository>,
    votes: Arc<dyn VoteRepository>,
}

impl ThreadService {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        forums: Arc<dyn ForumRepository>,
        users: Arc<dyn UserRepository>,
        votes: Arc<dyn VoteRepository>,
    ) -> Self {
        Self { threads, forums, users, votes }
    }

    /// Opens a thread in `forum_slug`. A taken thread slug yields the thread
    /// that already holds it.
    #[instrument(skip(self, thread), fields(author = %thread.author))]
    pub async fn create(&self, forum_slug: &str, thread: NewThread) -> Result<Creation<Thread>> {
        let forum = self
            .forums
            .find_by_slug(forum_slug)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Forum, forum_slug))?;
        let author = self
            .users
            .find_by_nickname(&thread.author)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::User, &thread.author))?;

        let slug = thread.slug.filter(|s| !s.is_empty());
        if let Some(slug) = &slug {
            if let Some(existing) = self.threads.find_by_slug(slug).await? {
                return Ok(Creation::Conflict(existing));
            }
        }

        let draft = ThreadDraft {
            title: thread.title,
            author: author.nickname,
            forum: forum.slug,
            message: thread.message,
            slug,
            created: thread.created.unwrap_or_else(Utc::now),
        };
        match self.threads.insert(&draft).await {
            Ok(created) => {
                info!(thread = created.id, forum = %created.forum, "thread created");
                Ok(Creation::Created(created))
            }
            Err(StoreError::UniqueViolation(_)) => match &draft.slug {
                Some(slug) => {
                    let existing = resolve_thread(&*self.threads, &SlugOrId::Slug(slug.clone())).await?;
                    Ok(Creation::Conflict(existing))
                }
                None => Err(DomainError::Internal("thread insert violated a constraint".into())),
            },
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn details(&self, key: &SlugOrId) -> Result<Thread> {
        resolve_thread(&*self.threads, key).await
    }

    /// Replaces title and message; empty fields keep the stored values.
    #[instrument(skip(self, patch))]
    pub async fn change(&self, key: &SlugOrId, patch: ThreadPatch) -> Result<Thread> {
        let mut thread = resolve_thread(&*self.threads, key).await?;
        if patch.title.is_empty() && patch.message.is_empty() {
            return Ok(thread);
        }
        if !patch.title.is_empty() {
            thread.title = patch.title;
        }
        if !patch.message.is_empty() {
            thread.message = patch.message;
        }
        self.threads.update(&thread).await?;
        Ok(thread)
    }

    /// Records `nickname`'s vote, replacing any earlier one, and returns the
    /// thread with its recomputed total.
    #[instrument(skip(self))]
    pub async fn vote(&self, key: &SlugOrId, nickname: &str, raw_voice: i32) -> Result<Thread> {
        let thread = resolve_thread(&*self.threads, key).await?;
        let user = self
            .users
            .find_by_nickname(nickname)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::User, nickname))?;

        let vote = Vote {
            thread: thread.id,
            nickname: user.nickname,
            voice: Vote::voice_from_raw(raw_voice),
        };
        self.votes.upsert(&vote).await?;

        self.threads
            .find_by_id(thread.id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Thread, thread.id))
    }
}
