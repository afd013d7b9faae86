use anyhow::{ensure, Context};
use chrono::{FixedOffset, Offset, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How much to trust proxy-supplied client address headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Always use the socket peer address.
    None,
    /// Honor `Forwarded` / `X-Forwarded-For` under the configured trust chain.
    Standard,
    /// Honor `CF-Connecting-IP`.
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Geolocation endpoint, queried as `{geo_api_url}/{ip}`.
    pub geo_api_url: String,
    /// Hard timeout for a single geolocation lookup.
    pub geo_timeout_ms: u64,
    /// Set to false to skip geolocation entirely (clicks record as Unknown).
    pub geo_enabled: bool,
    /// Fixed UTC offset used for every bucket day key. All buckets in one
    /// deployment share this offset; changing it mid-flight splits days.
    pub utc_offset_hours: i8,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges of proxies whose forwarding headers are trusted
    /// (standard mode only).
    pub trusted_proxies: Vec<IpNet>,
    /// Alternative to `trusted_proxies`: trust exactly this many hops from
    /// the right of the X-Forwarded-For chain.
    pub num_trusted_proxies: Option<usize>,
}

impl AnalyticsConfig {
    pub fn bucket_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(i32::from(self.utc_offset_hours) * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./tally.db".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_parse("API_PORT", 8080u16)?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = env_parse("REDIRECT_PORT", 3000u16)?;

        let geo_api_url =
            std::env::var("GEO_API_URL").unwrap_or_else(|_| "http://ip-api.com/json".to_string());
        let geo_timeout_ms = env_parse("GEO_TIMEOUT_MS", 1500u64)?;
        let geo_enabled = std::env::var("GEO_ENABLED")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        let utc_offset_hours = env_parse("STATS_UTC_OFFSET_HOURS", 0i8)?;
        ensure!(
            (-12..=14).contains(&utc_offset_hours),
            "STATS_UTC_OFFSET_HOURS must be between -12 and 14, got {utc_offset_hours}"
        );

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "none" => TrustedProxyMode::None,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. \
                     Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpNet>()
                        .with_context(|| format!("invalid CIDR '{s}' in TRUSTED_PROXIES"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        let num_trusted_proxies = match std::env::var("NUM_TRUSTED_PROXIES") {
            Ok(raw) => Some(
                raw.parse::<usize>()
                    .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?,
            ),
            Err(_) => None,
        };

        let cache_enabled = std::env::var("CACHE_ENABLED")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);
        let cache_max_entries = env_parse("CACHE_MAX_ENTRIES", 10_000u64)?;
        let cache_ttl_secs = env_parse("CACHE_TTL_SECS", 300u64)?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            analytics: AnalyticsConfig {
                geo_api_url,
                geo_timeout_ms,
                geo_enabled,
                utc_offset_hours,
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            cache: CacheConfig {
                enabled: cache_enabled,
                max_entries: cache_max_entries,
                ttl_secs: cache_ttl_secs,
            },
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
