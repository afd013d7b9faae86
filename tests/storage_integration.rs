//! Integration tests for the storage backends
//!
//! Covers link CRUD, the atomic bucket upsert, cascade deletion and the
//! no-lost-updates property under concurrent clicks.
//!
//! Tests can be filtered by backend using the DATABASE_BACKEND environment
//! variable (`sqlite`, `memory`); by default both in-process backends run.
//! PostgreSQL coverage piggybacks on DATABASE_URL when one is provided.

use std::sync::Arc;

use tally::analytics::models::ClickSample;
use tally::storage::{MemoryStorage, PostgresStorage, SqliteStorage, Storage, StorageError};

fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

/// A single connection keeps every query on one shared in-memory database
async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_memory_storage() -> Arc<dyn Storage> {
    let storage = MemoryStorage::new();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_postgres_storage() -> Option<Arc<dyn Storage>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

fn sample(city: &str, country: &str, device: &str) -> ClickSample {
    ClickSample {
        city: city.to_string(),
        country: country.to_string(),
        device: device.to_string(),
    }
}

async fn check_link_crud(storage: Arc<dyn Storage>) {
    let link = storage
        .create_with_code("abc123", "https://example.com")
        .await
        .unwrap();
    assert_eq!(link.short_code, "abc123");
    assert_eq!(link.original_url, "https://example.com");

    // Same code again conflicts
    let err = storage
        .create_with_code("abc123", "https://other.example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let by_code = storage.find_by_code("abc123").await.unwrap().unwrap();
    assert_eq!(by_code.id, link.id);

    let by_id = storage.find_by_id(link.id).await.unwrap().unwrap();
    assert_eq!(by_id.short_code, "abc123");

    assert!(storage.find_by_code("missing").await.unwrap().is_none());
    assert!(storage.find_by_id(link.id + 999).await.unwrap().is_none());

    let listed = storage.list(10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(storage.delete(link.id).await.unwrap());
    assert!(!storage.delete(link.id).await.unwrap());
    assert!(storage.find_by_code("abc123").await.unwrap().is_none());
}

#[tokio::test]
async fn test_link_crud_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_link_crud(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_link_crud_memory() {
    if !should_test_backend("memory") {
        return;
    }
    check_link_crud(create_memory_storage().await).await;
}

#[tokio::test]
async fn test_link_crud_postgres() {
    let Some(storage) = create_postgres_storage().await else {
        return;
    };
    check_link_crud(storage).await;
}

async fn check_bucket_upsert(storage: Arc<dyn Storage>) {
    let link = storage
        .create_with_code("bucket", "https://example.com")
        .await
        .unwrap();

    storage
        .record_click(link.id, "2025-03-01", &sample("Jakarta", "Indonesia", "Windows 10"))
        .await
        .unwrap();
    storage
        .record_click(link.id, "2025-03-01", &sample("Jakarta", "Indonesia", "Mac OSX"))
        .await
        .unwrap();
    storage
        .record_click(link.id, "2025-03-02", &sample("Bandung", "Indonesia", "Windows 10"))
        .await
        .unwrap();

    let buckets = storage.click_buckets(link.id).await.unwrap();
    assert_eq!(buckets.len(), 2, "one bucket per day");
    assert_eq!(buckets[0].date, "2025-03-01");
    assert_eq!(buckets[0].clicks, 2);
    assert_eq!(buckets[0].city_counts["Jakarta"], 2);
    assert_eq!(buckets[0].country_counts["Indonesia"], 2);
    assert_eq!(buckets[0].device_counts["Windows 10"], 1);
    assert_eq!(buckets[0].device_counts["Mac OSX"], 1);

    assert_eq!(buckets[1].date, "2025-03-02");
    assert_eq!(buckets[1].clicks, 1);
    assert_eq!(buckets[1].city_counts["Bandung"], 1);

    assert_eq!(storage.total_clicks().await.unwrap(), 3);
}

#[tokio::test]
async fn test_bucket_upsert_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_bucket_upsert(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_bucket_upsert_memory() {
    if !should_test_backend("memory") {
        return;
    }
    check_bucket_upsert(create_memory_storage().await).await;
}

async fn check_cascade_delete(storage: Arc<dyn Storage>) {
    let keep = storage
        .create_with_code("keep", "https://example.com/keep")
        .await
        .unwrap();
    let purge = storage
        .create_with_code("purge", "https://example.com/purge")
        .await
        .unwrap();

    for _ in 0..3 {
        storage
            .record_click(purge.id, "2025-03-01", &sample("Jakarta", "Indonesia", "iOS"))
            .await
            .unwrap();
    }
    storage
        .record_click(keep.id, "2025-03-01", &sample("Oslo", "Norway", "Linux"))
        .await
        .unwrap();

    assert!(storage.delete(purge.id).await.unwrap());

    assert!(storage.click_buckets(purge.id).await.unwrap().is_empty());

    // The surviving link's history is untouched
    let kept = storage.click_buckets(keep.id).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].clicks, 1);
    assert_eq!(storage.total_clicks().await.unwrap(), 1);
}

#[tokio::test]
async fn test_cascade_delete_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_cascade_delete(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_cascade_delete_memory() {
    if !should_test_backend("memory") {
        return;
    }
    check_cascade_delete(create_memory_storage().await).await;
}

/// The central correctness requirement: N concurrent clicks on one
/// (link, day) bucket count exactly N.
async fn check_concurrent_increments(storage: Arc<dyn Storage>) {
    const TASKS: usize = 8;
    const CLICKS_PER_TASK: usize = 25;

    let link = storage
        .create_with_code("race", "https://example.com")
        .await
        .unwrap();

    let mut handles = vec![];
    for task_id in 0..TASKS {
        let storage = Arc::clone(&storage);
        let link_id = link.id;
        handles.push(tokio::spawn(async move {
            for _ in 0..CLICKS_PER_TASK {
                storage
                    .record_click(
                        link_id,
                        "2025-03-01",
                        &sample("Jakarta", "Indonesia", &format!("OS {}", task_id % 2)),
                    )
                    .await
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let expected = (TASKS * CLICKS_PER_TASK) as i64;
    let buckets = storage.click_buckets(link.id).await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].clicks, expected, "no increment may be lost");
    assert_eq!(
        buckets[0].device_counts.values().sum::<i64>(),
        expected,
        "dimension counts stay conservative under races"
    );
    assert_eq!(buckets[0].city_counts["Jakarta"], expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_memory() {
    if !should_test_backend("memory") {
        return;
    }
    check_concurrent_increments(create_memory_storage().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_concurrent_increments(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_total_clicks_spans_links() {
    if !should_test_backend("memory") {
        return;
    }
    let storage = create_memory_storage().await;

    let first = storage
        .create_with_code("first", "https://example.com/1")
        .await
        .unwrap();
    let second = storage
        .create_with_code("second", "https://example.com/2")
        .await
        .unwrap();

    for _ in 0..4 {
        storage
            .record_click(first.id, "2025-03-01", &sample("Jakarta", "Indonesia", "iOS"))
            .await
            .unwrap();
    }
    storage
        .record_click(second.id, "2025-04-01", &sample("Oslo", "Norway", "Linux"))
        .await
        .unwrap();

    assert_eq!(storage.total_clicks().await.unwrap(), 5);
}
