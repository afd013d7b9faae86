use crate::analytics::models::{ClickBucket, ClickSample};
use crate::models::Link;
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache for short-code lookups on the redirect hot path.
///
/// Negative lookups are cached too, so repeated requests for a dead code
/// don't hammer the store. Click recording and aggregation pass straight
/// through: the bucket upsert must stay a single store-side operation.
pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    read_cache: Cache<String, Option<Link>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    async fn invalidate(&self, short_code: &str) {
        self.read_cache.invalidate(short_code).await;
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_with_code(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        let link = self.inner.create_with_code(short_code, original_url).await?;
        // A cached negative lookup for this code is now stale
        self.invalidate(short_code).await;
        Ok(link)
    }

    async fn find_by_code(&self, short_code: &str) -> Result<Option<Link>> {
        if let Some(cached) = self.read_cache.get(short_code).await {
            return Ok(cached);
        }

        let found = self.inner.find_by_code(short_code).await?;
        self.read_cache
            .insert(short_code.to_string(), found.clone())
            .await;
        Ok(found)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Link>> {
        self.inner.find_by_id(id).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        self.inner.list(limit, offset).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let code = self.inner.find_by_id(id).await?.map(|link| link.short_code);
        let deleted = self.inner.delete(id).await?;
        if let Some(code) = code {
            self.invalidate(&code).await;
        }
        Ok(deleted)
    }

    async fn record_click(&self, link_id: i64, day: &str, sample: &ClickSample) -> Result<()> {
        self.inner.record_click(link_id, day, sample).await
    }

    async fn click_buckets(&self, link_id: i64) -> Result<Vec<ClickBucket>> {
        self.inner.click_buckets(link_id).await
    }

    async fn total_clicks(&self) -> Result<i64> {
        self.inner.total_clicks().await
    }
}
