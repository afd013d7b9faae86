//! Client IP extraction from HTTP headers with trust validation
//!
//! Forwarding headers are attacker-controlled unless a trusted proxy set
//! them, so extraction is driven by the configured trust policy:
//! - `cloudflare`: take `CF-Connecting-IP`, fall back to the socket peer
//! - `standard`: walk `Forwarded` / `X-Forwarded-For` right to left past
//!   trusted hops (CIDR list or fixed hop count)
//! - `none`: always the socket peer address

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address for enrichment
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            extract_standard_ip(headers, socket_addr, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<IpAddr>().ok())
}

fn extract_standard_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded over the legacy header
    if let Some(ip) = extract_from_forwarded(headers) {
        return Some(ip);
    }

    extract_from_x_forwarded_for(headers, socket_addr, config)
}

/// Parse the `for=` parameter out of an RFC 7239 Forwarded header
fn extract_from_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    // Forwarded: for=192.0.2.60;proto=http;by=203.0.113.43
    for element in forwarded.split(',') {
        for param in element.split(';') {
            let param = param.trim();
            if let Some(value) = param.strip_prefix("for=") {
                if let Some(ip) = parse_forwarded_node(value) {
                    return Some(ip);
                }
            }
        }
    }

    None
}

/// A Forwarded node may be quoted, bracketed (IPv6) and carry a port
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse::<IpAddr>().ok();
    }

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }

    // IPv4 with port
    value.split(':').next()?.parse::<IpAddr>().ok()
}

/// Walk X-Forwarded-For right to left, skipping hops we trust; the first
/// untrusted address is the client.
fn extract_from_x_forwarded_for(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        // The socket peer is the last trusted hop and is not in the header,
        // so skip num_trusted - 1 entries from the right
        let skip = num_trusted.saturating_sub(1);
        if ips.len() > skip {
            return Some(ips[ips.len() - skip - 1]);
        }
        return ips.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        if !is_trusted(socket_addr, config) {
            // The direct peer itself isn't a trusted proxy; its header
            // can't be believed at all
            return None;
        }
        for ip in ips.iter().rev() {
            if !is_trusted(*ip, config) {
                return Some(*ip);
            }
        }
        // Every hop in the chain is a trusted proxy; take the leftmost
        return ips.first().copied();
    }

    // No trust configuration, take the rightmost entry
    ips.last().copied()
}

fn is_trusted(ip: IpAddr, config: &AnalyticsConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}
