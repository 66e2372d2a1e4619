//! # Domain Models
//!
//! These structs represent the core entities of the forum. Field names follow
//! the public JSON contract, so most of them serialize as-is.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered participant. The nickname is the public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    pub fullname: String,
    pub about: String,
    pub email: String,
}

/// Profile fields accepted when creating or updating a user.
///
/// On update an empty or missing field keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub email: String,
}

impl UserProfile {
    /// Overlays the non-empty fields of `self` on top of `current`.
    pub fn merge_into(self, current: &User) -> User {
        fn pick(new: String, old: &str) -> String {
            if new.is_empty() { old.to_string() } else { new }
        }
        User {
            nickname: current.nickname.clone(),
            fullname: pick(self.fullname, &current.fullname),
            about: pick(self.about, &current.about),
            email: pick(self.email, &current.email),
        }
    }
}

/// A forum groups threads under a unique slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub title: String,
    /// Nickname of the owner
    pub user: String,
    pub slug: String,
    #[serde(default)]
    pub posts: i64,
    #[serde(default)]
    pub threads: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewForum {
    pub title: String,
    pub user: String,
    pub slug: String,
}

/// A discussion inside a forum. Addressable by numeric id or by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub forum: String,
    pub message: String,
    #[serde(default)]
    pub votes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub created: DateTime<Utc>,
}

/// Thread creation payload. The forum comes from the request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    pub title: String,
    pub author: String,
    pub message: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// Fully resolved thread row handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadDraft {
    pub title: String,
    pub author: String,
    pub forum: String,
    pub message: String,
    pub slug: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPatch {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

/// Either the numeric id or the slug of a thread, as it appears in a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugOrId {
    Id(i64),
    Slug(String),
}

impl SlugOrId {
    /// Anything that parses as an integer is an id; everything else is a slug.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => SlugOrId::Id(id),
            Err(_) => SlugOrId::Slug(raw.to_string()),
        }
    }
}

impl fmt::Display for SlugOrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlugOrId::Id(id) => write!(f, "{id}"),
            SlugOrId::Slug(slug) => f.write_str(slug),
        }
    }
}

/// One user's opinion of a thread. `voice` is always +1 or -1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub thread: i64,
    pub nickname: String,
    pub voice: i32,
}

impl Vote {
    /// A raw vote of exactly 1 is a like; any other value counts as a dislike.
    pub fn voice_from_raw(raw: i32) -> i32 {
        if raw == 1 { 1 } else { -1 }
    }
}

/// Materialized path of a post: the ids of its ancestors from the thread
/// root down to the post itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostPath(Vec<i64>);

impl PostPath {
    pub fn new(ids: Vec<i64>) -> Self {
        Self(ids)
    }

    /// Path of a reply to the thread itself.
    pub fn root(id: i64) -> Self {
        Self(vec![id])
    }

    /// Path of a new post `id` placed under the post owning `self`.
    pub fn child(&self, id: i64) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        Self(ids)
    }

    /// Id of the root post of the subtree, `None` only for an unassigned path.
    pub fn root_id(&self) -> Option<i64> {
        self.0.first().copied()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<i64> {
        self.0
    }
}

/// Lexicographic comparison of two materialized paths.
///
/// Elements are compared pairwise; when one path is a proper prefix of the
/// other, the shorter one (the ancestor) sorts first. Sorting by this order
/// yields a pre-order traversal of the post forest.
pub fn compare_paths(a: &[i64], b: &[i64]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl Ord for PostPath {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_paths(&self.0, &other.0)
    }
}

impl PartialOrd for PostPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The fundamental unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// 0 for a direct reply to the thread
    #[serde(default)]
    pub parent: i64,
    pub author: String,
    pub message: String,
    #[serde(rename = "isEdited", default)]
    pub is_edited: bool,
    pub forum: String,
    pub thread: i64,
    pub created: DateTime<Utc>,
    #[serde(skip)]
    pub path: PostPath,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.parent == 0
    }
}

/// One element of a create-posts request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInput {
    #[serde(default)]
    pub parent: i64,
    pub author: String,
    pub message: String,
}

/// A post stamped with its thread, forum and batch timestamp, ready for
/// insertion. Id and path are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub parent: i64,
    pub author: String,
    pub message: String,
    pub forum: String,
    pub thread: i64,
    pub created: DateTime<Utc>,
}

/// Which related entities to embed in a post details response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Related {
    pub user: bool,
    pub forum: bool,
    pub thread: bool,
}

impl Related {
    /// Parses a comma separated list such as `user,thread`. Unknown names are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut related = Related::default();
        for part in raw.split(',').map(str::trim) {
            match part {
                "user" => related.user = true,
                "forum" => related.forum = true,
                "thread" => related.thread = true,
                _ => {}
            }
        }
        related
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetails {
    pub post: Post,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forum: Option<Forum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
}

/// Listing of a forum's threads, ordered by creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadListQuery {
    pub limit: u32,
    /// Inclusive lower (or upper, when descending) bound on `created`
    pub since: Option<DateTime<Utc>>,
    pub desc: bool,
}

/// Listing of a forum's participants, ordered by nickname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListQuery {
    /// 0 means unbounded
    pub limit: u32,
    /// Exclusive bound on the nickname
    pub since: Option<String>,
    pub desc: bool,
}

/// Row counts reported by the service status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub user: i64,
    pub forum: i64,
    pub thread: i64,
    pub post: i64,
}

/// Outcome of a create operation whose uniqueness conflict is answered with
/// the already existing data instead of a plain error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation<T, C = T> {
    Created(T),
    Conflict(C),
}
