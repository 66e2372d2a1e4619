use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use domains::{
    Forum, ForumRepository, NewForum, NewPost, Post, PostPath, PostQueryPlan, PostRepository,
    ServiceStatus, StatusRepository, StoreError, StoreResult, Thread, ThreadDraft,
    ThreadListQuery, ThreadRepository, User, UserListQuery, UserRepository, Vote, VoteRepository,
};
use tokio::sync::RwLock;

fn key(raw: &str) -> String {
    raw.to_lowercase()
}

#[derive(Default)]
struct MemoryState {
    /// lowercased nickname -> user
    users: BTreeMap<String, User>,
    /// lowercased slug -> forum
    forums: HashMap<String, Forum>,
    threads: BTreeMap<i64, Thread>,
    posts: BTreeMap<i64, Post>,
    /// (thread, lowercased nickname) -> voice
    votes: HashMap<(i64, String), i32>,
    /// lowercased forum slug -> lowercased nicknames of its participants
    forum_users: HashMap<String, BTreeSet<String>>,
    last_thread_id: i64,
    last_post_id: i64,
}

impl MemoryState {
    fn email_owner(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn add_participant(&mut self, forum: &str, nickname: &str) {
        self.forum_users.entry(key(forum)).or_default().insert(key(nickname));
    }
}

/// In-memory storage for testing and local development.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let nickname = key(&user.nickname);
        if state.users.contains_key(&nickname) || state.email_owner(&user.email).is_some() {
            return Err(StoreError::UniqueViolation(format!("user {}", user.nickname)));
        }
        state.users.insert(nickname, user.clone());
        Ok(())
    }

    async fn find_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&key(nickname)).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.email_owner(email).cloned())
    }

    async fn find_conflicts(&self, nickname: &str, email: &str) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| {
                u.nickname.eq_ignore_ascii_case(nickname) || u.email.eq_ignore_ascii_case(email)
            })
            .cloned()
            .collect())
    }

    async fn find_many(&self, nicknames: &[String]) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(nicknames
            .iter()
            .map(|n| key(n))
            .collect::<BTreeSet<_>>()
            .iter()
            .filter_map(|n| state.users.get(n).cloned())
            .collect())
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let nickname = key(&user.nickname);
        if let Some(owner) = state.email_owner(&user.email) {
            if key(&owner.nickname) != nickname {
                return Err(StoreError::UniqueViolation(format!("email {}", user.email)));
            }
        }
        match state.users.get_mut(&nickname) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("no user {}", user.nickname))),
        }
    }
}

#[async_trait]
impl ForumRepository for MemoryStore {
    async fn insert(&self, forum: &NewForum) -> StoreResult<Forum> {
        let mut state = self.state.write().await;
        let slug = key(&forum.slug);
        if state.forums.contains_key(&slug) {
            return Err(StoreError::UniqueViolation(format!("forum {}", forum.slug)));
        }
        let created = Forum {
            title: forum.title.clone(),
            user: forum.user.clone(),
            slug: forum.slug.clone(),
            posts: 0,
            threads: 0,
        };
        state.forums.insert(slug, created.clone());
        Ok(created)
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>> {
        Ok(self.state.read().await.forums.get(&key(slug)).cloned())
    }

    async fn list_threads(&self, slug: &str, query: &ThreadListQuery) -> StoreResult<Vec<Thread>> {
        let state = self.state.read().await;
        let mut threads: Vec<Thread> = state
            .threads
            .values()
            .filter(|t| t.forum.eq_ignore_ascii_case(slug))
            .filter(|t| match query.since {
                Some(since) if query.desc => t.created <= since,
                Some(since) => t.created >= since,
                None => true,
            })
            .cloned()
            .collect();
        threads.sort_by(|a, b| {
            let ord = a.created.cmp(&b.created).then(a.id.cmp(&b.id));
            if query.desc { ord.reverse() } else { ord }
        });
        if query.limit > 0 {
            threads.truncate(query.limit as usize);
        }
        Ok(threads)
    }

    async fn list_users(&self, slug: &str, query: &UserListQuery) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        let Some(participants) = state.forum_users.get(&key(slug)) else {
            return Ok(Vec::new());
        };
        let since = query.since.as_deref().map(key);
        let mut nicknames: Vec<&String> = participants
            .iter()
            .filter(|n| match &since {
                Some(since) if query.desc => n.as_str() < since.as_str(),
                Some(since) => n.as_str() > since.as_str(),
                None => true,
            })
            .collect();
        if query.desc {
            nicknames.reverse();
        }
        if query.limit > 0 {
            nicknames.truncate(query.limit as usize);
        }
        Ok(nicknames.into_iter().filter_map(|n| state.users.get(n).cloned()).collect())
    }
}

#[async_trait]
impl ThreadRepository for MemoryStore {
    async fn insert(&self, draft: &ThreadDraft) -> StoreResult<Thread> {
        let mut state = self.state.write().await;
        if let Some(slug) = &draft.slug {
            let taken = state
                .threads
                .values()
                .any(|t| t.slug.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(slug)));
            if taken {
                return Err(StoreError::UniqueViolation(format!("thread {slug}")));
            }
        }
        let forum = state
            .forums
            .get_mut(&key(&draft.forum))
            .ok_or_else(|| StoreError::Backend(format!("no forum {}", draft.forum)))?;
        forum.threads += 1;

        state.last_thread_id += 1;
        let thread = Thread {
            id: state.last_thread_id,
            title: draft.title.clone(),
            author: draft.author.clone(),
            forum: draft.forum.clone(),
            message: draft.message.clone(),
            votes: 0,
            slug: draft.slug.clone(),
            created: draft.created,
        };
        state.threads.insert(thread.id, thread.clone());
        state.add_participant(&draft.forum, &draft.author);
        Ok(thread)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Thread>> {
        Ok(self.state.read().await.threads.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Thread>> {
        let state = self.state.read().await;
        Ok(state
            .threads
            .values()
            .find(|t| t.slug.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(slug)))
            .cloned())
    }

    async fn update(&self, thread: &Thread) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .threads
            .get_mut(&thread.id)
            .ok_or_else(|| StoreError::Backend(format!("no thread {}", thread.id)))?;
        stored.title = thread.title.clone();
        stored.message = thread.message.clone();
        Ok(())
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn upsert(&self, vote: &Vote) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.threads.contains_key(&vote.thread) {
            return Err(StoreError::Backend(format!("no thread {}", vote.thread)));
        }
        state.votes.insert((vote.thread, key(&vote.nickname)), vote.voice);
        let total: i64 = state
            .votes
            .iter()
            .filter(|((thread, _), _)| *thread == vote.thread)
            .map(|(_, voice)| i64::from(*voice))
            .sum();
        if let Some(thread) = state.threads.get_mut(&vote.thread) {
            thread.votes = total;
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn insert_many(&self, posts: &[NewPost]) -> StoreResult<Vec<Post>> {
        let mut state = self.state.write().await;

        // Build the whole batch before touching the state so a bad parent
        // leaves nothing behind.
        let mut next_id = state.last_post_id;
        let mut staged: Vec<Post> = Vec::with_capacity(posts.len());
        for new in posts {
            next_id += 1;
            let path = if new.parent == 0 {
                PostPath::root(next_id)
            } else {
                let parent = state
                    .posts
                    .get(&new.parent)
                    .or_else(|| staged.iter().find(|p| p.id == new.parent))
                    .filter(|p| p.thread == new.thread)
                    .ok_or(StoreError::ParentNotInThread { parent: new.parent, thread: new.thread })?;
                parent.path.child(next_id)
            };
            staged.push(Post {
                id: next_id,
                parent: new.parent,
                author: new.author.clone(),
                message: new.message.clone(),
                is_edited: false,
                forum: new.forum.clone(),
                thread: new.thread,
                created: new.created,
                path,
            });
        }

        state.last_post_id = next_id;
        for post in &staged {
            if let Some(forum) = state.forums.get_mut(&key(&post.forum)) {
                forum.posts += 1;
            }
            state.add_participant(&post.forum, &post.author);
            state.posts.insert(post.id, post.clone());
        }
        Ok(staged)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.state.read().await.posts.get(&id).cloned())
    }

    async fn update_message(&self, id: i64, message: &str) -> StoreResult<Option<Post>> {
        let mut state = self.state.write().await;
        Ok(state.posts.get_mut(&id).map(|post| {
            post.message = message.to_string();
            post.is_edited = true;
            post.clone()
        }))
    }

    async fn select_page(&self, plan: &PostQueryPlan) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        Ok(plan.evaluate(state.posts.values()))
    }
}

#[async_trait]
impl StatusRepository for MemoryStore {
    async fn status(&self) -> StoreResult<ServiceStatus> {
        let state = self.state.read().await;
        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(ServiceStatus {
            user: count(state.users.len()),
            forum: count(state.forums.len()),
            thread: count(state.threads.len()),
            post: count(state.posts.len()),
        })
    }

    async fn clear(&self) -> StoreResult<()> {
        *self.state.write().await = MemoryState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use domains::{PageRequest, PostQuery, SortMode};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn user(nickname: &str) -> User {
        User {
            nickname: nickname.into(),
            fullname: format!("{nickname} full"),
            about: String::new(),
            email: format!("{nickname}@example.org"),
        }
    }

    async fn seeded() -> (MemoryStore, Thread) {
        let store = MemoryStore::new();
        for nick in ["ann", "Bob", "carl"] {
            UserRepository::insert(&store, &user(nick)).await.unwrap();
        }
        ForumRepository::insert(
            &store,
            &NewForum { title: "Rust".into(), user: "ann".into(), slug: "rust".into() },
        )
        .await
        .unwrap();
        let thread = ThreadRepository::insert(
            &store,
            &ThreadDraft {
                title: "Lifetimes".into(),
                author: "ann".into(),
                forum: "rust".into(),
                message: "why".into(),
                slug: Some("lifetimes".into()),
                created: at(0),
            },
        )
        .await
        .unwrap();
        (store, thread)
    }

    fn reply(thread: &Thread, parent: i64, author: &str) -> NewPost {
        NewPost {
            parent,
            author: author.into(),
            message: format!("reply to {parent}"),
            forum: thread.forum.clone(),
            thread: thread.id,
            created: at(10),
        }
    }

    #[tokio::test]
    async fn batch_assigns_paths_and_bumps_counters() {
        let (store, thread) = seeded().await;
        let posts = store
            .insert_many(&[reply(&thread, 0, "ann"), reply(&thread, 1, "Bob")])
            .await
            .unwrap();
        assert_eq!(posts[0].path.as_slice(), &[1]);
        // a later post may answer an earlier one of the same batch
        assert_eq!(posts[1].path.as_slice(), &[1, 2]);

        let forum = ForumRepository::find_by_slug(&store, "RUST").await.unwrap().unwrap();
        assert_eq!((forum.threads, forum.posts), (1, 2));
    }

    #[tokio::test]
    async fn bad_parent_persists_nothing() {
        let (store, thread) = seeded().await;
        let err = store
            .insert_many(&[reply(&thread, 0, "ann"), reply(&thread, 99, "ann")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ParentNotInThread { parent: 99, .. }));

        let status = store.status().await.unwrap();
        assert_eq!(status.post, 0);
        let forum = ForumRepository::find_by_slug(&store, "rust").await.unwrap().unwrap();
        assert_eq!(forum.posts, 0);
        // ids are not consumed by the failed batch
        let posts = store.insert_many(&[reply(&thread, 0, "ann")]).await.unwrap();
        assert_eq!(posts[0].id, 1);
    }

    #[tokio::test]
    async fn parent_from_another_thread_is_rejected() {
        let (store, thread) = seeded().await;
        let other = ThreadRepository::insert(
            &store,
            &ThreadDraft {
                title: "Traits".into(),
                author: "Bob".into(),
                forum: "rust".into(),
                message: "dyn".into(),
                slug: None,
                created: at(1),
            },
        )
        .await
        .unwrap();
        store.insert_many(&[reply(&thread, 0, "ann")]).await.unwrap();
        let err = store.insert_many(&[reply(&other, 1, "ann")]).await.unwrap_err();
        assert!(matches!(err, StoreError::ParentNotInThread { parent: 1, .. }));
    }

    #[tokio::test]
    async fn select_page_runs_the_plan() {
        let (store, thread) = seeded().await;
        store
            .insert_many(&[
                reply(&thread, 0, "ann"),
                reply(&thread, 1, "ann"),
                reply(&thread, 0, "Bob"),
            ])
            .await
            .unwrap();
        let plan = PostQuery::new(thread.id, SortMode::Tree, None, PageRequest::new(0, true))
            .plan(None);
        let ids: Vec<i64> = store.select_page(&plan).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn votes_replace_earlier_voice() {
        let (store, thread) = seeded().await;
        let vote = |nickname: &str, voice| Vote { thread: thread.id, nickname: nickname.into(), voice };
        store.upsert(&vote("ann", 1)).await.unwrap();
        store.upsert(&vote("Bob", 1)).await.unwrap();
        store.upsert(&vote("ANN", -1)).await.unwrap();
        let refreshed = ThreadRepository::find_by_id(&store, thread.id).await.unwrap().unwrap();
        assert_eq!(refreshed.votes, 0);
    }

    #[tokio::test]
    async fn forum_users_are_ordered_case_insensitively() {
        let (store, thread) = seeded().await;
        store
            .insert_many(&[reply(&thread, 0, "carl"), reply(&thread, 0, "Bob")])
            .await
            .unwrap();
        let all = store.list_users("rust", &UserListQuery::default()).await.unwrap();
        let nicks: Vec<&str> = all.iter().map(|u| u.nickname.as_str()).collect();
        assert_eq!(nicks, vec!["ann", "Bob", "carl"]);

        let query = UserListQuery { limit: 1, since: Some("bob".into()), desc: true };
        let page = store.list_users("rust", &query).await.unwrap();
        assert_eq!(page[0].nickname, "ann");
    }

    #[tokio::test]
    async fn thread_listing_since_is_inclusive() {
        let (store, _) = seeded().await;
        let query = ThreadListQuery { limit: 10, since: Some(at(0)), desc: false };
        assert_eq!(store.list_threads("rust", &query).await.unwrap().len(), 1);
        let query = ThreadListQuery { limit: 10, since: Some(at(1)), desc: false };
        assert!(store.list_threads("rust", &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn email_collision_on_update_is_a_unique_violation() {
        let (store, _) = seeded().await;
        let stolen = User { email: "BOB@example.org".into(), ..user("ann") };
        let err = UserRepository::update(&store, &stolen).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn clear_empties_every_table() {
        let (store, thread) = seeded().await;
        store.insert_many(&[reply(&thread, 0, "ann")]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.status().await.unwrap(), ServiceStatus::default());
    }
}
