//! Click analytics: enrichment, recording, and rollups.
//!
//! Every redirect feeds one click into a per-link, per-day bucket together
//! with coarse geolocation and device frequencies. Aggregation reads those
//! buckets back and rolls them up to daily, ISO-weekly and monthly views.
//! Enrichment is strictly best-effort; a failed lookup degrades to
//! "Unknown" and never reaches the redirect path.

pub mod aggregator;
pub mod device;
pub mod geo;
pub mod ip_extractor;
pub mod models;
pub mod recorder;

pub use aggregator::{StatsAggregator, StatsError};
pub use device::{DeviceInfo, DeviceParser};
pub use geo::{GeoLocation, GeoResolver};
pub use ip_extractor::extract_client_ip;
pub use models::{BucketStats, ClickBucket, ClickSample, StatsReport};
pub use recorder::ClickRecorder;
