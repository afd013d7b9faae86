//! Click recording
//!
//! One recording enriches a click (geo + device) and folds it into the
//! (link, day) bucket with a single atomic store upsert. Recording runs on
//! a task spawned after the redirect response is built: the redirect never
//! waits on enrichment or the store, and a failed recording is logged and
//! dropped rather than retried or surfaced.

use crate::analytics::device::DeviceParser;
use crate::analytics::geo::GeoResolver;
use crate::analytics::models::ClickSample;
use crate::storage::Storage;
use anyhow::Result;
use chrono::{FixedOffset, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

pub struct ClickRecorder {
    storage: Arc<dyn Storage>,
    geo: GeoResolver,
    devices: DeviceParser,
    /// Fixed offset every bucket day key is computed in
    offset: FixedOffset,
}

impl ClickRecorder {
    pub fn new(storage: Arc<dyn Storage>, geo: GeoResolver, offset: FixedOffset) -> Self {
        Self {
            storage,
            geo,
            devices: DeviceParser::new(),
            offset,
        }
    }

    /// Fire-and-forget entry point for the redirect path.
    ///
    /// Failures stay on the spawned task; the caller has usually already
    /// answered the client by the time anything here runs.
    pub fn spawn_record(self: &Arc<Self>, link_id: i64, client_ip: IpAddr, user_agent: Option<String>) {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = recorder
                .record(link_id, client_ip, user_agent.as_deref())
                .await
            {
                warn!(link_id, error = %err, "failed to record click");
            }
        });
    }

    /// Record one click against today's bucket for the link.
    ///
    /// Enrichment cannot fail (both lookups degrade to "Unknown"); only the
    /// store upsert can, and that error is the caller's to log.
    pub async fn record(
        &self,
        link_id: i64,
        client_ip: IpAddr,
        user_agent: Option<&str>,
    ) -> Result<()> {
        let day = self.bucket_day();
        let location = self.geo.resolve(client_ip).await;
        let device = self.devices.parse(user_agent);

        let sample = ClickSample {
            city: location.city,
            country: location.country,
            // The device dimension counts operating systems
            device: device.os,
        };

        self.storage.record_click(link_id, &day, &sample).await
    }

    /// Today's bucket key in the configured fixed offset
    pub fn bucket_day(&self) -> String {
        Utc::now()
            .with_timezone(&self.offset)
            .format("%Y-%m-%d")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::geo::UNKNOWN;
    use crate::config::{AnalyticsConfig, TrustedProxyMode};
    use crate::storage::MemoryStorage;
    use chrono::Offset;

    fn test_recorder(storage: Arc<dyn Storage>) -> Arc<ClickRecorder> {
        let config = AnalyticsConfig {
            geo_api_url: "http://ip-api.invalid/json".to_string(),
            geo_timeout_ms: 50,
            geo_enabled: false,
            utc_offset_hours: 0,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        };
        let geo = GeoResolver::new(&config).unwrap();
        Arc::new(ClickRecorder::new(storage, geo, Utc.fix()))
    }

    #[tokio::test]
    async fn records_into_todays_bucket_with_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        let recorder = test_recorder(Arc::clone(&storage) as Arc<dyn Storage>);

        recorder
            .record(7, "192.168.1.5".parse().unwrap(), None)
            .await
            .unwrap();

        let buckets = storage.click_buckets(7).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].date, recorder.bucket_day());
        assert_eq!(buckets[0].clicks, 1);
        assert_eq!(buckets[0].city_counts.get(UNKNOWN), Some(&1));
        assert_eq!(buckets[0].country_counts.get(UNKNOWN), Some(&1));
        assert_eq!(buckets[0].device_counts.get(UNKNOWN), Some(&1));
    }

    #[tokio::test]
    async fn device_dimension_tracks_parsed_os() {
        let storage = Arc::new(MemoryStorage::new());
        let recorder = test_recorder(Arc::clone(&storage) as Arc<dyn Storage>);

        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        recorder
            .record(7, "192.168.1.5".parse().unwrap(), Some(ua))
            .await
            .unwrap();

        let buckets = storage.click_buckets(7).await.unwrap();
        assert_eq!(buckets[0].device_counts.get("Windows 10"), Some(&1));
    }

    #[tokio::test]
    async fn spawned_recording_lands_without_blocking_caller() {
        let storage = Arc::new(MemoryStorage::new());
        let recorder = test_recorder(Arc::clone(&storage) as Arc<dyn Storage>);

        recorder.spawn_record(3, "10.0.0.1".parse().unwrap(), None);

        // The spawn returns immediately; poll for the write to land
        for _ in 0..50 {
            if storage.total_clicks().await.unwrap() == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("spawned recording never reached the store");
    }

    #[test]
    fn bucket_day_respects_offset() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let config = AnalyticsConfig {
            geo_api_url: "http://ip-api.invalid/json".to_string(),
            geo_timeout_ms: 50,
            geo_enabled: false,
            utc_offset_hours: 0,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        };
        let geo = GeoResolver::new(&config).unwrap();

        let east = FixedOffset::east_opt(14 * 3600).unwrap();
        let west = FixedOffset::west_opt(12 * 3600).unwrap();
        let ahead = ClickRecorder::new(Arc::clone(&storage), geo, east).bucket_day();
        let geo = GeoResolver::new(&config).unwrap();
        let behind = ClickRecorder::new(storage, geo, west).bucket_day();

        // 26 hours apart, the two keys can never be the same calendar day
        assert_ne!(ahead, behind);
    }
}
