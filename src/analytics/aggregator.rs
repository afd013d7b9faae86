//! Stats aggregation
//!
//! Rollups are recomputed from the raw daily buckets on every query. That
//! keeps reads trivially consistent with the write path at O(buckets) per
//! call, and buckets grow by at most one per link per day.

use crate::analytics::models::{BucketStats, ClickBucket, StatsReport};
use crate::storage::Storage;
use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("link not found")]
    NotFound,
    #[error("invalid link id")]
    InvalidId,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Parse a raw path value into a link id
    pub fn parse_link_id(raw: &str) -> Result<i64, StatsError> {
        raw.parse::<i64>().map_err(|_| StatsError::InvalidId)
    }

    /// Compute the full report for one link.
    ///
    /// A link with no buckets yet is a valid zero report, distinct from an
    /// unknown link which is `NotFound`.
    pub async fn aggregate(&self, link_id: i64) -> Result<StatsReport, StatsError> {
        if self.storage.find_by_id(link_id).await?.is_none() {
            return Err(StatsError::NotFound);
        }

        let buckets = self.storage.click_buckets(link_id).await?;
        Ok(rollup(&buckets)?)
    }

    /// Clicks summed over every bucket of every link
    pub async fn total_across_links(&self) -> Result<i64, StatsError> {
        Ok(self.storage.total_clicks().await?)
    }
}

/// Roll raw daily buckets up into daily, ISO-weekly and monthly views.
///
/// Weekly keys use ISO-8601 week numbering (`iso_week`), so days around a
/// year boundary land in the week's year, not the calendar date's year.
/// Buckets never mutate here; this is a pure fold.
pub fn rollup(buckets: &[ClickBucket]) -> anyhow::Result<StatsReport> {
    let mut total_clicks = 0i64;
    let mut daily: BTreeMap<String, BucketStats> = BTreeMap::new();
    let mut weekly: BTreeMap<(i32, u32), BucketStats> = BTreeMap::new();
    let mut monthly: BTreeMap<(i32, u32), BucketStats> = BTreeMap::new();

    for bucket in buckets {
        let date = NaiveDate::parse_from_str(&bucket.date, "%Y-%m-%d")
            .with_context(|| format!("malformed bucket day key '{}'", bucket.date))?;

        total_clicks += bucket.clicks;
        daily.entry(bucket.date.clone()).or_default().absorb(bucket);

        let week = date.iso_week();
        weekly
            .entry((week.year(), week.week()))
            .or_default()
            .absorb(bucket);

        monthly
            .entry((date.year(), date.month()))
            .or_default()
            .absorb(bucket);
    }

    Ok(StatsReport {
        total_clicks,
        daily_clicks: daily,
        weekly_clicks: weekly
            .into_iter()
            .map(|((year, week), stats)| (format!("{year}-W{week}"), stats))
            .collect(),
        monthly_clicks: monthly
            .into_iter()
            .map(|((year, month), stats)| (format!("{year}-{month:02}"), stats))
            .collect(),
    })
}
