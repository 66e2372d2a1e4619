use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use domains::{
    DomainError, Entity, ForumRepository, NewPost, PageRequest, Post, PostDetails, PostInput,
    PostQuery, PostRepository, Related, Result, SlugOrId, SortMode, StoreError,
    ThreadRepository, UserRepository,
};
use tracing::{debug, info, instrument};

use crate::thread::resolve_thread;

/// Posting, editing and reading the posts of a thread.
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    threads: Arc<dyn ThreadRepository>,
    forums: Arc<dyn ForumRepository>,
    users: Arc<dyn UserRepository>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        threads: Arc<dyn ThreadRepository>,
        forums: Arc<dyn ForumRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self { posts, threads, forums, users }
    }

    /// Adds a batch of replies to a thread.
    ///
    /// Every author must exist. A non-zero parent must be a post of the same
    /// thread, either stored before or earlier in this batch; the store
    /// enforces that and rejects the whole batch otherwise. The batch shares
    /// one creation timestamp and is stored all-or-nothing, in request order.
    #[instrument(skip(self, batch), fields(batch = batch.len()))]
    pub async fn create_many(&self, key: &SlugOrId, batch: Vec<PostInput>) -> Result<Vec<Post>> {
        let thread = resolve_thread(&*self.threads, key).await?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let authors = self.canonical_authors(&batch).await?;

        let created = Utc::now();
        let rows: Vec<NewPost> = batch
            .into_iter()
            .map(|input| NewPost {
                parent: input.parent,
                author: authors
                    .get(&input.author.to_lowercase())
                    .cloned()
                    .unwrap_or(input.author),
                message: input.message,
                forum: thread.forum.clone(),
                thread: thread.id,
                created,
            })
            .collect();

        let posts = self.posts.insert_many(&rows).await.map_err(|err| {
            if let StoreError::ParentNotInThread { parent, .. } = &err {
                debug!(parent, thread = thread.id, "parent outside thread");
            }
            DomainError::from(err)
        })?;
        info!(thread = thread.id, count = posts.len(), "posts created");
        Ok(posts)
    }

    /// Maps the lowercased nickname of every author in the batch to its stored
    /// spelling, failing on the first unknown one.
    async fn canonical_authors(&self, batch: &[PostInput]) -> Result<HashMap<String, String>> {
        let wanted: BTreeSet<String> = batch.iter().map(|p| p.author.to_lowercase()).collect();
        let nicknames: Vec<String> = wanted.iter().cloned().collect();
        let found: HashMap<String, String> = self
            .users
            .find_many(&nicknames)
            .await?
            .into_iter()
            .map(|u| (u.nickname.to_lowercase(), u.nickname))
            .collect();

        if let Some(missing) = batch.iter().find(|p| !found.contains_key(&p.author.to_lowercase())) {
            return Err(DomainError::not_found(Entity::User, &missing.author));
        }
        Ok(found)
    }

    /// Edits a post's message. An empty or unchanged message leaves the post
    /// (and its edited flag) as it is.
    #[instrument(skip(self, message))]
    pub async fn change_by_id(&self, id: i64, message: String) -> Result<Post> {
        let post = self.find(id).await?;
        if message.is_empty() || message == post.message {
            return Ok(post);
        }
        self.posts
            .update_message(id, &message)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Post, id))
    }

    /// A post together with the related entities asked for.
    #[instrument(skip(self))]
    pub async fn details(&self, id: i64, related: Related) -> Result<PostDetails> {
        let post = self.find(id).await?;

        let author = if related.user {
            self.users.find_by_nickname(&post.author).await?
        } else {
            None
        };
        let forum = if related.forum {
            self.forums.find_by_slug(&post.forum).await?
        } else {
            None
        };
        let thread = if related.thread {
            self.threads.find_by_id(post.thread).await?
        } else {
            None
        };

        Ok(PostDetails { post, author, forum, thread })
    }

    /// One page of a thread's posts in the requested order.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        key: &SlugOrId,
        sort: SortMode,
        since: Option<i64>,
        page: PageRequest,
    ) -> Result<Vec<Post>> {
        let thread = resolve_thread(&*self.threads, key).await?;
        let query = PostQuery::new(thread.id, sort, since, page);

        let cursor = match query.cursor_post_id() {
            Some(id) => self.posts.find_by_id(id).await?.filter(|p| p.thread == thread.id),
            None => None,
        };
        let plan = query.plan(cursor.as_ref());
        debug!(?plan, "post page planned");

        Ok(self.posts.select_page(&plan).await?)
    }

    async fn find(&self, id: i64) -> Result<Post> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::Post, id))
    }
}
