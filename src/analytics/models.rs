//! Data models for click analytics

use serde::Serialize;
use std::collections::BTreeMap;

/// Per-link, per-day aggregate record.
///
/// At most one bucket exists per (link_id, date); it is created by the first
/// click of the day and only ever mutated in place after that. The dimension
/// maps each satisfy `sum(values) == clicks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickBucket {
    pub link_id: i64,
    /// Calendar day key, `YYYY-MM-DD` in the deployment's fixed offset
    pub date: String,
    pub clicks: i64,
    pub city_counts: BTreeMap<String, i64>,
    pub country_counts: BTreeMap<String, i64>,
    pub device_counts: BTreeMap<String, i64>,
}

/// Enrichment attached to a single click before it is folded into a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickSample {
    pub city: String,
    pub country: String,
    pub device: String,
}

/// One rollup entry: a day, ISO week, or month worth of clicks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketStats {
    pub clicks: i64,
    pub city_counts: BTreeMap<String, i64>,
    pub country_counts: BTreeMap<String, i64>,
    pub device_counts: BTreeMap<String, i64>,
}

impl BucketStats {
    /// Fold a raw bucket into this entry, summing frequencies per key
    pub fn absorb(&mut self, bucket: &ClickBucket) {
        self.clicks += bucket.clicks;
        merge_counts(&mut self.city_counts, &bucket.city_counts);
        merge_counts(&mut self.country_counts, &bucket.country_counts);
        merge_counts(&mut self.device_counts, &bucket.device_counts);
    }
}

fn merge_counts(into: &mut BTreeMap<String, i64>, from: &BTreeMap<String, i64>) {
    for (key, count) in from {
        *into.entry(key.clone()).or_insert(0) += count;
    }
}

/// Full aggregation result for one link
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub total_clicks: i64,
    /// `YYYY-MM-DD` -> stats, ascending by day
    pub daily_clicks: BTreeMap<String, BucketStats>,
    /// `{iso_year}-W{iso_week}` -> stats, ISO-8601 week numbering
    pub weekly_clicks: BTreeMap<String, BucketStats>,
    /// `{year}-{month:02}` -> stats
    pub monthly_clicks: BTreeMap<String, BucketStats>,
}
