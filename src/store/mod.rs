//! Remote document store interface.
//!
//! - [`query`]: QueryDescriptor, sort/range/cursor primitives
//! - [`record`]: Record and RecordPreview
//! - [`memory`]: In-memory store with call counting and fault injection
//!
//! The store only offers primitive operations (filter, order, limit, resume
//! after a cursor). Higher-level composition such as offset paging, search
//! merging and ranking happens in the access layer.

pub mod memory;
pub mod query;
pub mod record;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use query::{Cursor, QueryDescriptor, RangeFilter, SortDirection, SortSpec};
pub use record::{Record, RecordPreview};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote store rejected request: {0}")]
    Rejected(String),
}

/// The remote document store collaborator.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Identifier of this store instance.
    fn store_id(&self) -> &str;

    /// Run a filtered, ordered, limited query for one owner's records.
    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StoreError>;

    /// Fetch one record; `Ok(None)` when it does not exist.
    async fn get(
        &self,
        collection: &str,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<Record>, StoreError>;

    /// Insert a new record. Fails with `Rejected` if the id is taken.
    async fn insert(&self, collection: &str, record: Record) -> Result<(), StoreError>;

    /// Delete a record, returning whether it existed.
    async fn delete(&self, collection: &str, owner_id: &str, id: &str) -> Result<bool, StoreError>;
}
