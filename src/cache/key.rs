//! Cache namespaces and structured cache keys.
//!
//! Keys are derived deterministically from request parameters: two requests
//! with the same owner, offset, page size and sort spec map to the same
//! [`CacheKey`]. Each key also reports which entity ids it references, which
//! the registry uses to invalidate exactly the entries touching a mutated
//! record or owner.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logically separate cache inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Listing pages.
    Pages,
    /// Record previews.
    Previews,
    /// Ranked search results.
    Search,
    /// Caller-defined computed values.
    Aggregates,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Pages,
        Namespace::Previews,
        Namespace::Search,
        Namespace::Aggregates,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Pages => "pages",
            Namespace::Previews => "previews",
            Namespace::Search => "search",
            Namespace::Aggregates => "aggregates",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Page {
        owner_id: String,
        offset: usize,
        limit: usize,
        sort_field: String,
        descending: bool,
    },
    Preview {
        owner_id: String,
        record_id: String,
    },
    Search {
        owner_id: String,
        term: String,
        limit: usize,
    },
    Aggregate {
        owner_id: String,
        name: String,
    },
}

impl CacheKey {
    pub fn page(
        owner_id: impl Into<String>,
        offset: usize,
        limit: usize,
        sort_field: impl Into<String>,
        descending: bool,
    ) -> Self {
        CacheKey::Page {
            owner_id: owner_id.into(),
            offset,
            limit,
            sort_field: sort_field.into(),
            descending,
        }
    }

    pub fn preview(owner_id: impl Into<String>, record_id: impl Into<String>) -> Self {
        CacheKey::Preview {
            owner_id: owner_id.into(),
            record_id: record_id.into(),
        }
    }

    /// Search keys normalise the term so "John " and "john" share an entry.
    pub fn search(owner_id: impl Into<String>, term: &str, limit: usize) -> Self {
        CacheKey::Search {
            owner_id: owner_id.into(),
            term: term.trim().to_lowercase(),
            limit,
        }
    }

    pub fn aggregate(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        CacheKey::Aggregate {
            owner_id: owner_id.into(),
            name: name.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            CacheKey::Page { owner_id, .. }
            | CacheKey::Preview { owner_id, .. }
            | CacheKey::Search { owner_id, .. }
            | CacheKey::Aggregate { owner_id, .. } => owner_id,
        }
    }

    /// Entity ids whose mutation must invalidate this key.
    pub fn entity_ids(&self) -> Vec<&str> {
        match self {
            CacheKey::Preview {
                owner_id,
                record_id,
            } => vec![owner_id.as_str(), record_id.as_str()],
            _ => vec![self.owner_id()],
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Page {
                owner_id,
                offset,
                limit,
                sort_field,
                descending,
            } => {
                let dir = if *descending { "desc" } else { "asc" };
                write!(f, "{owner_id}_{offset}_{limit}_{sort_field}_{dir}")
            }
            CacheKey::Preview {
                owner_id,
                record_id,
            } => write!(f, "{owner_id}_{record_id}"),
            CacheKey::Search {
                owner_id,
                term,
                limit,
            } => write!(f, "{owner_id}_{term}_{limit}"),
            CacheKey::Aggregate { owner_id, name } => write!(f, "{owner_id}_{name}"),
        }
    }
}
