use crate::analytics::models::{ClickBucket, ClickSample};
use crate::models::Link;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Create a new link with a caller-provided short code
    async fn create_with_code(&self, short_code: &str, original_url: &str)
        -> StorageResult<Link>;

    /// Get a link by short code
    async fn find_by_code(&self, short_code: &str) -> Result<Option<Link>>;

    /// Get a link by id
    async fn find_by_id(&self, id: i64) -> Result<Option<Link>>;

    /// List links, newest first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Link>>;

    /// Delete a link and purge every click bucket referencing it
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Count one click against the (link, day) bucket.
    ///
    /// Find-or-create plus increment of the counter and the three dimension
    /// frequencies must be a single atomic operation; concurrent calls for
    /// the same key may never lose an increment.
    async fn record_click(&self, link_id: i64, day: &str, sample: &ClickSample) -> Result<()>;

    /// All buckets for a link, ascending by day
    async fn click_buckets(&self, link_id: i64) -> Result<Vec<ClickBucket>>;

    /// Sum of clicks over every bucket of every link
    async fn total_clicks(&self) -> Result<i64>;
}
