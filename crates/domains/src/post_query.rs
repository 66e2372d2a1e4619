//! # Post Query Planner
//!
//! Turns a (thread, sort mode, cursor, direction) request into a
//! [`PostQueryPlan`]: the cursor bound, the ordering and the scope of the
//! limit. Stores execute the plan; [`PostQueryPlan::evaluate`] is the
//! reference execution over an in-memory set of posts.
//!
//! Three addressing modes exist:
//!
//! * `flat`: chronological, `(created, id)` order, cursor on the post id.
//! * `tree`: materialized path order (pre-order traversal), cursor on the
//!   cursor post's path.
//! * `parent_tree`: the limit pages through root posts; each page carries the
//!   complete subtree of every selected root.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{compare_paths, Post, PostPath};

/// Ordering strategy for a thread's posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    #[default]
    Flat,
    Tree,
    ParentTree,
}

impl SortMode {
    /// Unknown or missing names fall back to [`SortMode::Flat`].
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("tree") => SortMode::Tree,
            Some("parent_tree") => SortMode::ParentTree,
            _ => SortMode::Flat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Flat => "flat",
            SortMode::Tree => "tree",
            SortMode::ParentTree => "parent_tree",
        }
    }
}

/// Limit and direction of one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// 0 means unbounded
    pub limit: u32,
    pub desc: bool,
}

impl PageRequest {
    pub fn new(limit: u32, desc: bool) -> Self {
        Self { limit, desc }
    }

    fn bounded_limit(self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit as usize)
    }
}

/// A request for one page of a thread's posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub thread_id: i64,
    pub sort: SortMode,
    /// Cursor post id; `None` (or 0 on the wire) starts from the beginning
    pub since: Option<i64>,
    pub page: PageRequest,
}

impl PostQuery {
    pub fn new(thread_id: i64, sort: SortMode, since: Option<i64>, page: PageRequest) -> Self {
        Self { thread_id, sort, since: since.filter(|id| *id != 0), page }
    }

    /// Id of the post whose path must be loaded before planning, if any.
    ///
    /// Flat mode compares ids directly and never needs the cursor post.
    pub fn cursor_post_id(&self) -> Option<i64> {
        match self.sort {
            SortMode::Flat => None,
            SortMode::Tree | SortMode::ParentTree => self.since,
        }
    }

    /// Builds the plan. `cursor` is the post named by [`Self::cursor_post_id`],
    /// or `None` when it does not exist, in which case the page starts from
    /// the beginning (or the end, when descending).
    pub fn plan(&self, cursor: Option<&Post>) -> PostQueryPlan {
        let bound = match self.sort {
            SortMode::Flat => self.since.map(CursorBound::Id),
            SortMode::Tree => self
                .since
                .and(cursor)
                .map(|post| CursorBound::Path(post.path.clone())),
            SortMode::ParentTree => self
                .since
                .and(cursor)
                .and_then(|post| post.path.root_id())
                .map(CursorBound::Root),
        };
        PostQueryPlan {
            thread_id: self.thread_id,
            sort: self.sort,
            desc: self.page.desc,
            limit: self.page.bounded_limit(),
            bound,
        }
    }
}

/// Exclusive pagination boundary, already resolved from the cursor post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorBound {
    /// flat: post ids strictly after/before this id
    Id(i64),
    /// tree: paths strictly after/before this path
    Path(PostPath),
    /// parent_tree: root ids strictly after/before this root
    Root(i64),
}

/// What the limit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Posts,
    Roots,
}

/// A fully resolved post listing, ready to be executed by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQueryPlan {
    pub thread_id: i64,
    pub sort: SortMode,
    pub desc: bool,
    pub limit: Option<usize>,
    pub bound: Option<CursorBound>,
}

impl PostQueryPlan {
    pub fn limit_scope(&self) -> LimitScope {
        match self.sort {
            SortMode::ParentTree => LimitScope::Roots,
            SortMode::Flat | SortMode::Tree => LimitScope::Posts,
        }
    }

    /// `true` when `ord` (the candidate compared to the boundary) lies on the
    /// side of the boundary the page walks towards.
    fn past_bound(&self, ord: Ordering) -> bool {
        if self.desc { ord == Ordering::Less } else { ord == Ordering::Greater }
    }

    /// Cursor predicate for flat and tree modes.
    pub fn admits(&self, post: &Post) -> bool {
        match &self.bound {
            None => true,
            Some(CursorBound::Id(id)) => self.past_bound(post.id.cmp(id)),
            Some(CursorBound::Path(path)) => {
                self.past_bound(compare_paths(post.path.as_slice(), path.as_slice()))
            }
            // parent_tree filters roots, see `admits_root`
            Some(CursorBound::Root(_)) => true,
        }
    }

    /// Cursor predicate for the root selection of parent_tree mode.
    pub fn admits_root(&self, root_id: i64) -> bool {
        match &self.bound {
            Some(CursorBound::Root(root)) => self.past_bound(root_id.cmp(root)),
            _ => true,
        }
    }

    fn directed(&self, ord: Ordering) -> Ordering {
        if self.desc { ord.reverse() } else { ord }
    }

    /// Final ordering of the returned posts.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        match self.sort {
            SortMode::Flat => self.directed(a.created.cmp(&b.created).then(a.id.cmp(&b.id))),
            SortMode::Tree => self.directed(
                compare_paths(a.path.as_slice(), b.path.as_slice()).then(a.id.cmp(&b.id)),
            ),
            // roots follow the direction, each subtree stays in pre-order
            SortMode::ParentTree => {
                let roots = self.directed(a.path.root_id().cmp(&b.path.root_id()));
                roots
                    .then_with(|| compare_paths(a.path.as_slice(), b.path.as_slice()))
                    .then(a.id.cmp(&b.id))
            }
        }
    }

    /// Phase 1 of parent_tree: ids of the roots on this page, in page order.
    pub fn select_roots<'a, I>(&self, posts: I) -> Vec<i64>
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let mut roots: Vec<i64> = posts
            .into_iter()
            .filter(|post| post.thread == self.thread_id && post.is_root())
            .map(|post| post.id)
            .filter(|id| self.admits_root(*id))
            .collect();
        roots.sort_by(|a, b| self.directed(a.cmp(b)));
        if let Some(limit) = self.limit {
            roots.truncate(limit);
        }
        roots
    }

    /// Reference execution of the plan over every post the store holds.
    pub fn evaluate<'a, I>(&self, posts: I) -> Vec<Post>
    where
        I: IntoIterator<Item = &'a Post>,
        I::IntoIter: Clone,
    {
        let posts = posts.into_iter();
        match self.limit_scope() {
            LimitScope::Posts => {
                let mut page: Vec<Post> = posts
                    .filter(|post| post.thread == self.thread_id && self.admits(post))
                    .cloned()
                    .collect();
                page.sort_by(|a, b| self.compare(a, b));
                if let Some(limit) = self.limit {
                    page.truncate(limit);
                }
                page
            }
            LimitScope::Roots => {
                let roots: HashMap<i64, usize> = self
                    .select_roots(posts.clone())
                    .into_iter()
                    .enumerate()
                    .map(|(position, id)| (id, position))
                    .collect();
                let mut page: Vec<Post> = posts
                    .filter(|post| post.thread == self.thread_id)
                    .filter(|post| {
                        post.path.root_id().is_some_and(|root| roots.contains_key(&root))
                    })
                    .cloned()
                    .collect();
                page.sort_by(|a, b| self.compare(a, b));
                page
            }
        }
    }
}
