//! PostgreSQL implementation of every repository port.
//!
//! Posts keep their materialized path in a `BIGINT[]` column; array ordering
//! in PostgreSQL is element-wise with the shorter prefix first, which is the
//! same order as [`domains::compare_paths`].

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    CursorBound, Forum, ForumRepository, NewForum, NewPost, Post, PostPath, PostQueryPlan,
    PostRepository, ServiceStatus, SortMode, StatusRepository, StoreError, StoreResult, Thread,
    ThreadDraft, ThreadListQuery, ThreadRepository, User, UserListQuery, UserRepository, Vote,
    VoteRepository,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const POST_COLUMNS: &str = "id, parent, author, message, is_edited, forum, thread, created, path";
const THREAD_COLUMNS: &str = "id, title, author, forum, message, votes, slug, created";
const FORUM_COLUMNS: &str = "slug, title, owner, posts, threads";
const USER_COLUMNS: &str = "nickname, fullname, about, email";

fn db_err(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::UniqueViolation(db.message().to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

#[derive(FromRow)]
struct UserRow {
    nickname: String,
    fullname: String,
    about: String,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User { nickname: row.nickname, fullname: row.fullname, about: row.about, email: row.email }
    }
}

#[derive(FromRow)]
struct ForumRow {
    slug: String,
    title: String,
    owner: String,
    posts: i64,
    threads: i64,
}

impl From<ForumRow> for Forum {
    fn from(row: ForumRow) -> Self {
        Forum {
            title: row.title,
            user: row.owner,
            slug: row.slug,
            posts: row.posts,
            threads: row.threads,
        }
    }
}

#[derive(FromRow)]
struct ThreadRow {
    id: i64,
    title: String,
    author: String,
    forum: String,
    message: String,
    votes: i64,
    slug: Option<String>,
    created: DateTime<Utc>,
}

impl From<ThreadRow> for Thread {
    fn from(row: ThreadRow) -> Self {
        Thread {
            id: row.id,
            title: row.title,
            author: row.author,
            forum: row.forum,
            message: row.message,
            votes: row.votes,
            slug: row.slug,
            created: row.created,
        }
    }
}

#[derive(FromRow)]
struct PostRow {
    id: i64,
    parent: i64,
    author: String,
    message: String,
    is_edited: bool,
    forum: String,
    thread: i64,
    created: DateTime<Utc>,
    path: Vec<i64>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            parent: row.parent,
            author: row.author,
            message: row.message,
            is_edited: row.is_edited,
            forum: row.forum,
            thread: row.thread,
            created: row.created,
            path: PostPath::new(row.path),
        }
    }
}

/// Repository backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        info!(max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (nickname, fullname, about, email) VALUES ($1, $2, $3, $4)")
            .bind(&user.nickname)
            .bind(&user.fullname)
            .bind(&user.about)
            .bind(&user.email)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_nickname(&self, nickname: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(nickname) = lower($1)");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn find_conflicts(&self, nickname: &str, email: &str) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE lower(nickname) = lower($1) OR lower(email) = lower($2) \
             ORDER BY lower(nickname)"
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(nickname)
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_many(&self, nicknames: &[String]) -> StoreResult<Vec<User>> {
        let lowered: Vec<String> = nicknames.iter().map(|n| n.to_lowercase()).collect();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(nickname) = ANY($1)");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(&lowered)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET fullname = $2, about = $3, email = $4 WHERE lower(nickname) = lower($1)",
        )
        .bind(&user.nickname)
        .bind(&user.fullname)
        .bind(&user.about)
        .bind(&user.email)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl ForumRepository for PgStore {
    async fn insert(&self, forum: &NewForum) -> StoreResult<Forum> {
        let sql = format!(
            "INSERT INTO forums (slug, title, owner) VALUES ($1, $2, $3) RETURNING {FORUM_COLUMNS}"
        );
        let row: ForumRow = sqlx::query_as(&sql)
            .bind(&forum.slug)
            .bind(&forum.title)
            .bind(&forum.user)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Forum>> {
        let sql = format!("SELECT {FORUM_COLUMNS} FROM forums WHERE lower(slug) = lower($1)");
        let row: Option<ForumRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Forum::from))
    }

    async fn list_threads(&self, slug: &str, query: &ThreadListQuery) -> StoreResult<Vec<Thread>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {THREAD_COLUMNS} FROM threads WHERE lower(forum) = lower("
        ));
        qb.push_bind(slug).push(")");
        if let Some(since) = query.since {
            qb.push(if query.desc { " AND created <= " } else { " AND created >= " });
            qb.push_bind(since);
        }
        qb.push(if query.desc { " ORDER BY created DESC, id DESC" } else { " ORDER BY created, id" });
        if query.limit > 0 {
            qb.push(" LIMIT ").push_bind(i64::from(query.limit));
        }

        let rows: Vec<ThreadRow> =
            qb.build_query_as().fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.into_iter().map(Thread::from).collect())
    }

    async fn list_users(&self, slug: &str, query: &UserListQuery) -> StoreResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT u.nickname, u.fullname, u.about, u.email \
             FROM forum_users fu JOIN users u ON u.nickname = fu.nickname \
             WHERE lower(fu.forum) = lower(",
        );
        qb.push_bind(slug).push(")");
        if let Some(since) = &query.since {
            qb.push(if query.desc {
                " AND lower(u.nickname) COLLATE \"C\" < lower("
            } else {
                " AND lower(u.nickname) COLLATE \"C\" > lower("
            });
            qb.push_bind(since).push(")");
        }
        qb.push(" ORDER BY lower(u.nickname) COLLATE \"C\"");
        if query.desc {
            qb.push(" DESC");
        }
        if query.limit > 0 {
            qb.push(" LIMIT ").push_bind(i64::from(query.limit));
        }

        let rows: Vec<UserRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl ThreadRepository for PgStore {
    async fn insert(&self, draft: &ThreadDraft) -> StoreResult<Thread> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            "INSERT INTO threads (title, author, forum, message, slug, created) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {THREAD_COLUMNS}"
        );
        let row: ThreadRow = sqlx::query_as(&sql)
            .bind(&draft.title)
            .bind(&draft.author)
            .bind(&draft.forum)
            .bind(&draft.message)
            .bind(&draft.slug)
            .bind(draft.created)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("UPDATE forums SET threads = threads + 1 WHERE slug = $1")
            .bind(&draft.forum)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("INSERT INTO forum_users (forum, nickname) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(&draft.forum)
            .bind(&draft.author)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Thread>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1");
        let row: Option<ThreadRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Thread::from))
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Thread>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE lower(slug) = lower($1)");
        let row: Option<ThreadRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Thread::from))
    }

    async fn update(&self, thread: &Thread) -> StoreResult<()> {
        sqlx::query("UPDATE threads SET title = $2, message = $3 WHERE id = $1")
            .bind(thread.id)
            .bind(&thread.title)
            .bind(&thread.message)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn upsert(&self, vote: &Vote) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO votes (thread, nickname, voice) VALUES ($1, $2, $3) \
             ON CONFLICT (thread, nickname) DO UPDATE SET voice = EXCLUDED.voice",
        )
        .bind(vote.thread)
        .bind(&vote.nickname)
        .bind(vote.voice)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "UPDATE threads SET votes = \
             (SELECT COALESCE(SUM(voice), 0) FROM votes WHERE thread = $1) WHERE id = $1",
        )
        .bind(vote.thread)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }
}

/// Appends the cursor predicate and ordering of a flat or tree plan.
fn push_post_order(qb: &mut QueryBuilder<'_, Postgres>, plan: &PostQueryPlan) {
    let cmp = if plan.desc { " < " } else { " > " };
    match &plan.bound {
        Some(CursorBound::Id(id)) => {
            qb.push(" AND id").push(cmp).push_bind(*id);
        }
        Some(CursorBound::Path(path)) => {
            qb.push(" AND path").push(cmp).push_bind(path.as_slice().to_vec());
        }
        Some(CursorBound::Root(_)) | None => {}
    }
    let order = match (plan.sort, plan.desc) {
        (SortMode::Tree, false) => " ORDER BY path, id",
        (SortMode::Tree, true) => " ORDER BY path DESC, id DESC",
        (_, false) => " ORDER BY created, id",
        (_, true) => " ORDER BY created DESC, id DESC",
    };
    qb.push(order);
    if let Some(limit) = plan.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }
}

/// Appends the two-phase parent_tree selection: a page of root ids first,
/// then every post under those roots.
fn push_parent_tree(qb: &mut QueryBuilder<'_, Postgres>, plan: &PostQueryPlan) {
    qb.push(" AND path[1] IN (SELECT id FROM posts WHERE parent = 0 AND thread = ");
    qb.push_bind(plan.thread_id);
    if let Some(CursorBound::Root(root)) = &plan.bound {
        qb.push(if plan.desc { " AND id < " } else { " AND id > " }).push_bind(*root);
    }
    qb.push(if plan.desc { " ORDER BY id DESC" } else { " ORDER BY id" });
    if let Some(limit) = plan.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }
    qb.push(")");
    qb.push(if plan.desc { " ORDER BY path[1] DESC, path, id" } else { " ORDER BY path, id" });
}

#[async_trait]
impl PostRepository for PgStore {
    async fn insert_many(&self, posts: &[NewPost]) -> StoreResult<Vec<Post>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let insert = format!(
            "INSERT INTO posts (id, parent, author, message, forum, thread, created, path) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {POST_COLUMNS}"
        );

        let mut created: Vec<Post> = Vec::with_capacity(posts.len());
        let mut per_forum: HashMap<&str, i64> = HashMap::new();
        let mut participants: BTreeSet<(&str, &str)> = BTreeSet::new();
        for new in posts {
            let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('posts', 'id'))")
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;

            let path = if new.parent == 0 {
                PostPath::root(id)
            } else if let Some(parent) =
                created.iter().find(|p| p.id == new.parent && p.thread == new.thread)
            {
                parent.path.child(id)
            } else {
                let parent: Option<Vec<i64>> =
                    sqlx::query_scalar("SELECT path FROM posts WHERE id = $1 AND thread = $2")
                        .bind(new.parent)
                        .bind(new.thread)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_err)?;
                match parent {
                    Some(path) => PostPath::new(path).child(id),
                    // dropping `tx` rolls the batch back
                    None => {
                        return Err(StoreError::ParentNotInThread {
                            parent: new.parent,
                            thread: new.thread,
                        })
                    }
                }
            };

            let row: PostRow = sqlx::query_as(&insert)
                .bind(id)
                .bind(new.parent)
                .bind(&new.author)
                .bind(&new.message)
                .bind(&new.forum)
                .bind(new.thread)
                .bind(new.created)
                .bind(path.into_inner())
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            created.push(Post::from(row));

            *per_forum.entry(new.forum.as_str()).or_default() += 1;
            participants.insert((new.forum.as_str(), new.author.as_str()));
        }

        for (forum, count) in per_forum {
            sqlx::query("UPDATE forums SET posts = posts + $1 WHERE slug = $2")
                .bind(count)
                .bind(forum)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for (forum, nickname) in participants {
            sqlx::query(
                "INSERT INTO forum_users (forum, nickname) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(forum)
            .bind(nickname)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!(count = created.len(), "post batch committed");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Post::from))
    }

    async fn update_message(&self, id: i64, message: &str) -> StoreResult<Option<Post>> {
        let sql = format!(
            "UPDATE posts SET message = $2, is_edited = TRUE WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(message)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Post::from))
    }

    async fn select_page(&self, plan: &PostQueryPlan) -> StoreResult<Vec<Post>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE thread = "));
        qb.push_bind(plan.thread_id);
        match plan.sort {
            SortMode::ParentTree => push_parent_tree(&mut qb, plan),
            SortMode::Flat | SortMode::Tree => push_post_order(&mut qb, plan),
        }

        let rows: Vec<PostRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[async_trait]
impl StatusRepository for PgStore {
    async fn status(&self) -> StoreResult<ServiceStatus> {
        let (user, forum, thread, post): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM users), (SELECT count(*) FROM forums), \
                    (SELECT count(*) FROM threads), (SELECT count(*) FROM posts)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ServiceStatus { user, forum, thread, post })
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("TRUNCATE votes, forum_users, posts, threads, forums, users RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domains::{PageRequest, PostQuery};

    fn user(nickname: &str) -> User {
        User {
            nickname: nickname.into(),
            fullname: String::new(),
            about: String::new(),
            email: format!("{nickname}@example.org"),
        }
    }

    async fn seed(store: &PgStore) -> Thread {
        UserRepository::insert(store, &user("ann")).await.unwrap();
        ForumRepository::insert(
            store,
            &NewForum { title: "Rust".into(), user: "ann".into(), slug: "rust".into() },
        )
        .await
        .unwrap();
        ThreadRepository::insert(
            store,
            &ThreadDraft {
                title: "Lifetimes".into(),
                author: "ann".into(),
                forum: "rust".into(),
                message: "why".into(),
                slug: Some("lifetimes".into()),
                created: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            },
        )
        .await
        .unwrap()
    }

    fn reply(thread: &Thread, parent: i64) -> NewPost {
        NewPost {
            parent,
            author: "ann".into(),
            message: "hi".into(),
            forum: thread.forum.clone(),
            thread: thread.id,
            created: thread.created,
        }
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "needs DATABASE_URL pointing at a PostgreSQL server"]
    async fn batch_with_foreign_parent_is_rolled_back(pool: PgPool) {
        let store = PgStore::new(pool);
        let thread = seed(&store).await;

        let err = store
            .insert_many(&[reply(&thread, 0), reply(&thread, 4242)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ParentNotInThread { parent: 4242, .. }));
        assert_eq!(store.status().await.unwrap().post, 0);
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "needs DATABASE_URL pointing at a PostgreSQL server"]
    async fn reply_to_an_earlier_post_of_the_same_batch(pool: PgPool) {
        let store = PgStore::new(pool);
        let thread = seed(&store).await;

        let first = store.insert_many(&[reply(&thread, 0)]).await.unwrap();
        let root = first[0].id;
        let batch = store
            .insert_many(&[reply(&thread, root), reply(&thread, root + 1)])
            .await
            .unwrap();
        assert_eq!(batch[0].path.as_slice(), &[root, root + 1]);
        assert_eq!(batch[1].path.as_slice(), &[root, root + 1, root + 2]);
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "needs DATABASE_URL pointing at a PostgreSQL server"]
    async fn parent_tree_page_matches_reference_evaluation(pool: PgPool) {
        let store = PgStore::new(pool);
        let thread = seed(&store).await;
        let first = store.insert_many(&[reply(&thread, 0), reply(&thread, 0)]).await.unwrap();
        store
            .insert_many(&[reply(&thread, first[0].id), reply(&thread, first[1].id)])
            .await
            .unwrap();

        let all = store
            .select_page(&PostQuery::new(thread.id, SortMode::Flat, None, PageRequest::default()).plan(None))
            .await
            .unwrap();
        for desc in [false, true] {
            let plan = PostQuery::new(thread.id, SortMode::ParentTree, None, PageRequest::new(1, desc))
                .plan(None);
            let from_db: Vec<i64> = store.select_page(&plan).await.unwrap().iter().map(|p| p.id).collect();
            let expected: Vec<i64> = plan.evaluate(&all).iter().map(|p| p.id).collect();
            assert_eq!(from_db, expected);
        }
    }

    #[sqlx::test(migrator = "crate::postgres::MIGRATOR")]
    #[ignore = "needs DATABASE_URL pointing at a PostgreSQL server"]
    async fn taken_nickname_is_a_unique_violation(pool: PgPool) {
        let store = PgStore::new(pool);
        UserRepository::insert(&store, &user("ann")).await.unwrap();
        let err = UserRepository::insert(&store, &user("ANN")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }
}
