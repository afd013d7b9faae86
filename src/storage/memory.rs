use crate::analytics::models::{ClickBucket, ClickSample};
use crate::models::Link;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// In-memory storage backend.
///
/// Useful for tests and zero-config runs; nothing survives a restart. The
/// bucket update relies on DashMap's per-entry locking, so the find-or-create
/// plus increment is atomic exactly like the SQL upsert.
pub struct MemoryStorage {
    next_id: AtomicI64,
    links: DashMap<i64, Link>,
    codes: DashMap<String, i64>,
    buckets: DashMap<(i64, String), ClickBucket>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            links: DashMap::new(),
            codes: DashMap::new(),
            buckets: DashMap::new(),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn create_with_code(
        &self,
        short_code: &str,
        original_url: &str,
    ) -> StorageResult<Link> {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| StorageError::Other(e.into()))?
            .as_secs() as i64;

        // The code index entry doubles as the uniqueness lock
        match self.codes.entry(short_code.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict),
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let link = Link {
                    id,
                    short_code: short_code.to_string(),
                    original_url: original_url.to_string(),
                    created_at,
                };
                self.links.insert(id, link.clone());
                vacant.insert(id);
                Ok(link)
            }
        }
    }

    async fn find_by_code(&self, short_code: &str) -> Result<Option<Link>> {
        let Some(id) = self.codes.get(short_code).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.links.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Link>> {
        Ok(self.links.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        let mut links: Vec<Link> = self
            .links
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        links.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        Ok(links.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let Some((_, link)) = self.links.remove(&id) else {
            return Ok(false);
        };
        self.codes.remove(&link.short_code);
        self.buckets.retain(|(link_id, _), _| *link_id != id);
        Ok(true)
    }

    async fn record_click(&self, link_id: i64, day: &str, sample: &ClickSample) -> Result<()> {
        self.buckets
            .entry((link_id, day.to_string()))
            .and_modify(|bucket| {
                bucket.clicks += 1;
                *bucket.city_counts.entry(sample.city.clone()).or_insert(0) += 1;
                *bucket
                    .country_counts
                    .entry(sample.country.clone())
                    .or_insert(0) += 1;
                *bucket
                    .device_counts
                    .entry(sample.device.clone())
                    .or_insert(0) += 1;
            })
            .or_insert_with(|| ClickBucket {
                link_id,
                date: day.to_string(),
                clicks: 1,
                city_counts: BTreeMap::from([(sample.city.clone(), 1)]),
                country_counts: BTreeMap::from([(sample.country.clone(), 1)]),
                device_counts: BTreeMap::from([(sample.device.clone(), 1)]),
            });
        Ok(())
    }

    async fn click_buckets(&self, link_id: i64) -> Result<Vec<ClickBucket>> {
        let mut buckets: Vec<ClickBucket> = self
            .buckets
            .iter()
            .filter(|entry| entry.key().0 == link_id)
            .map(|entry| entry.value().clone())
            .collect();
        buckets.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(buckets)
    }

    async fn total_clicks(&self) -> Result<i64> {
        Ok(self.buckets.iter().map(|entry| entry.value().clicks).sum())
    }
}
