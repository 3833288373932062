//! URL safety gate (SSRF protection).
//!
//! Two layers:
//! - [`validate_media_url`] is a static check on the URL text and any
//!   literal IP host. It runs before any network call.
//! - [`ensure_public_host`] resolves the host and applies the same IP test
//!   to every resolved address. It runs inside the reachability check.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::warn;
use url::{Host, Url};

use crate::error::{MediaError, MediaResult};

/// Maximum URL length to prevent DoS attacks.
pub const MAX_URL_LENGTH: usize = 2048;

/// Hostnames that are never fetched regardless of what they resolve to.
const BLOCKED_HOSTS: &[&str] = &["localhost", "metadata.google.internal", "metadata"];

/// Validate a media URL taken from a source descriptor.
pub fn validate_media_url(raw: &str) -> MediaResult<Url> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(MediaError::InvalidUrl("URL cannot be empty".to_string()));
    }

    if raw.len() > MAX_URL_LENGTH {
        return Err(MediaError::InvalidUrl(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }

    let parsed =
        Url::parse(raw).map_err(|e| MediaError::InvalidUrl(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(MediaError::InvalidUrl(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            )))
        }
    }

    let blocked = match parsed.host() {
        None => {
            return Err(MediaError::InvalidUrl(
                "URL must have a valid host".to_string(),
            ))
        }
        Some(Host::Domain(domain)) => is_blocked_hostname(domain),
        Some(Host::Ipv4(ip)) => is_forbidden_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_forbidden_ip(IpAddr::V6(ip)),
    };

    if blocked {
        warn!(url = %raw, "Blocked URL targeting an internal endpoint");
        return Err(MediaError::SecurityViolation(
            "URL targets a loopback, private or link-local address".to_string(),
        ));
    }

    Ok(parsed)
}

/// Resolve the URL's host and reject it if any address is not public.
pub async fn ensure_public_host(url: &Url) -> MediaResult<()> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => return check_ip(url, IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => return check_ip(url, IpAddr::V6(ip)),
        None => return Err(MediaError::InvalidUrl("URL must have a valid host".to_string())),
    };

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| MediaError::unreachable(url.as_str(), format!("DNS lookup failed: {}", e)))?;

    let mut resolved = false;
    for addr in addrs {
        resolved = true;
        check_ip(url, addr.ip())?;
    }

    if !resolved {
        return Err(MediaError::unreachable(url.as_str(), "host resolved to no addresses"));
    }

    Ok(())
}

fn check_ip(url: &Url, ip: IpAddr) -> MediaResult<()> {
    if is_forbidden_ip(ip) {
        warn!(url = %url, ip = %ip, "Host resolves to a non-public address");
        return Err(MediaError::SecurityViolation(format!(
            "host resolves to non-public address {}",
            ip
        )));
    }
    Ok(())
}

fn is_blocked_hostname(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_HOSTS.contains(&domain.as_str()) || domain.ends_with(".localhost")
}

/// Whether an address is loopback, private, link-local or otherwise not a
/// public unicast destination.
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0                                    // "this" network
        || a == 10                            // private
        || (a == 100 && (64..=127).contains(&b)) // carrier-grade NAT
        || a == 127                           // loopback
        || (a == 169 && b == 254)             // link-local, cloud metadata
        || (a == 172 && (16..=31).contains(&b)) // private
        || (a == 192 && b == 168)             // private
        || ip.is_multicast()
        || ip.is_broadcast()
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(mapped);
    }

    let first = ip.segments()[0];

    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link-local
}
