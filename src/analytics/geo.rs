//! Coarse geolocation via an external HTTP lookup service
//!
//! Resolution is best-effort by contract: any transport failure, timeout,
//! non-success payload or missing field degrades to "Unknown". The resolver
//! never returns an error to its caller, so a geo outage can only ever cost
//! label quality, not clicks.

use crate::config::AnalyticsConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

pub const UNKNOWN: &str = "Unknown";

/// Coarse location for a client address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
        }
    }
}

/// Response shape of the ip-api.com style endpoint
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl GeoApiResponse {
    fn into_location(self) -> GeoLocation {
        GeoLocation {
            country: self.country.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string()),
            region: self
                .region_name
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            city: self.city.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

pub struct GeoResolver {
    client: Option<reqwest::Client>,
    endpoint: String,
}

impl GeoResolver {
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        let client = if config.geo_enabled {
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(config.geo_timeout_ms))
                    .build()
                    .context("failed to build geolocation HTTP client")?,
            )
        } else {
            None
        };

        Ok(Self {
            client,
            endpoint: config.geo_api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a client address to a coarse location. Infallible.
    pub async fn resolve(&self, ip: IpAddr) -> GeoLocation {
        let Some(client) = &self.client else {
            return GeoLocation::unknown();
        };

        // The lookup service has no answer for addresses that never route
        // publicly, so skip the round trip
        if !is_public(ip) {
            return GeoLocation::unknown();
        }

        match self.fetch(client, ip).await {
            Ok(location) => location,
            Err(err) => {
                debug!(%ip, error = %err, "geolocation lookup failed");
                GeoLocation::unknown()
            }
        }
    }

    async fn fetch(&self, client: &reqwest::Client, ip: IpAddr) -> Result<GeoLocation> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = client.get(&url).send().await?.error_for_status()?;
        let payload: GeoApiResponse = response.json().await?;

        if payload.status.as_deref() == Some("fail") {
            return Ok(GeoLocation::unknown());
        }

        Ok(payload.into_location())
    }
}

/// Whether the address can meaningfully be geolocated
fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}
