//! Query strings and small request bodies.

use chrono::{DateTime, Utc};
use domains::{PageRequest, Related, SortMode, ThreadListQuery, UserListQuery};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ThreadListParams {
    pub limit: Option<u32>,
    pub since: Option<DateTime<Utc>>,
    pub desc: Option<bool>,
}

impl From<ThreadListParams> for ThreadListQuery {
    fn from(p: ThreadListParams) -> Self {
        ThreadListQuery { limit: p.limit.unwrap_or(0), since: p.since, desc: p.desc.unwrap_or(false) }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub limit: Option<u32>,
    pub since: Option<String>,
    pub desc: Option<bool>,
}

impl From<UserListParams> for UserListQuery {
    fn from(p: UserListParams) -> Self {
        UserListQuery {
            limit: p.limit.unwrap_or(0),
            since: p.since.filter(|s| !s.is_empty()),
            desc: p.desc.unwrap_or(false),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PostListParams {
    pub sort: Option<String>,
    pub since: Option<i64>,
    pub limit: Option<u32>,
    pub desc: Option<bool>,
}

impl PostListParams {
    pub fn sort(&self) -> SortMode {
        SortMode::parse(self.sort.as_deref())
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.limit.unwrap_or(0), self.desc.unwrap_or(false))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RelatedParams {
    pub related: Option<String>,
}

impl RelatedParams {
    pub fn related(&self) -> Related {
        self.related.as_deref().map(Related::parse).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub nickname: String,
    pub voice: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostUpdateBody {
    #[serde(default)]
    pub message: String,
}
