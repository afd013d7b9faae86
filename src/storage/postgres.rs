use crate::analytics::models::{ClickBucket, ClickSample};
use crate::models::Link;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id BIGSERIAL PRIMARY KEY,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_short_code ON links(short_code)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_buckets (
                link_id BIGINT NOT NULL,
                date TEXT NOT NULL,
                clicks BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (link_id, date)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_dimensions (
                link_id BIGINT NOT NULL,
                date TEXT NOT NULL,
                dimension TEXT NOT NULL,
                value TEXT NOT NULL,
                count BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (link_id, date, dimension, value)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

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

        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, original_url, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (short_code) DO NOTHING
            "#,
        )
        .bind(short_code)
        .bind(original_url)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let link = sqlx::query_as::<_, Link>(
            "SELECT id, short_code, original_url, created_at FROM links WHERE short_code = $1",
        )
        .bind(short_code)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(link)
    }

    async fn find_by_code(&self, short_code: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            "SELECT id, short_code, original_url, created_at FROM links WHERE short_code = $1",
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            "SELECT id, short_code, original_url, created_at FROM links WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, short_code, original_url, created_at
            FROM links
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM click_dimensions WHERE link_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM click_buckets WHERE link_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_click(&self, link_id: i64, day: &str, sample: &ClickSample) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO click_buckets (link_id, date, clicks)
            VALUES ($1, $2, 1)
            ON CONFLICT (link_id, date) DO UPDATE SET clicks = click_buckets.clicks + 1
            "#,
        )
        .bind(link_id)
        .bind(day)
        .execute(&mut *tx)
        .await?;

        for (dimension, value) in [
            ("city", sample.city.as_str()),
            ("country", sample.country.as_str()),
            ("device", sample.device.as_str()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO click_dimensions (link_id, date, dimension, value, count)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (link_id, date, dimension, value)
                DO UPDATE SET count = click_dimensions.count + 1
                "#,
            )
            .bind(link_id)
            .bind(day)
            .bind(dimension)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn click_buckets(&self, link_id: i64) -> Result<Vec<ClickBucket>> {
        let counter_rows = sqlx::query(
            "SELECT date, clicks FROM click_buckets WHERE link_id = $1 ORDER BY date ASC",
        )
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut buckets: Vec<ClickBucket> = Vec::with_capacity(counter_rows.len());
        for row in counter_rows {
            buckets.push(ClickBucket {
                link_id,
                date: row.try_get("date")?,
                clicks: row.try_get("clicks")?,
                city_counts: BTreeMap::new(),
                country_counts: BTreeMap::new(),
                device_counts: BTreeMap::new(),
            });
        }

        let dimension_rows = sqlx::query(
            "SELECT date, dimension, value, count FROM click_dimensions WHERE link_id = $1",
        )
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut by_date: BTreeMap<String, usize> = BTreeMap::new();
        for (index, bucket) in buckets.iter().enumerate() {
            by_date.insert(bucket.date.clone(), index);
        }

        for row in dimension_rows {
            let date: String = row.try_get("date")?;
            let dimension: String = row.try_get("dimension")?;
            let value: String = row.try_get("value")?;
            let count: i64 = row.try_get("count")?;

            let Some(&index) = by_date.get(&date) else {
                continue;
            };
            let bucket = &mut buckets[index];
            let counts = match dimension.as_str() {
                "city" => &mut bucket.city_counts,
                "country" => &mut bucket.country_counts,
                "device" => &mut bucket.device_counts,
                _ => continue,
            };
            counts.insert(value, count);
        }

        Ok(buckets)
    }

    async fn total_clicks(&self) -> Result<i64> {
        // SUM over BIGINT is NUMERIC in Postgres; cast back for the i64 decode
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(clicks), 0)::BIGINT FROM click_buckets",
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(total)
    }
}
