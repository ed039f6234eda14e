use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;

/// Maximum number of hops honored in an X-Forwarded-For chain.
const MAX_FORWARDED_IPS: usize = 10;

/// Converts IPv4-mapped IPv6 addresses to their IPv4 form so trust-list
/// matching is consistent across representations of the same address.
fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        IpAddr::V4(_) => ip,
    }
}

/// Returns true for publicly addressable IPs. Loopback, link-local,
/// multicast and unspecified addresses never legitimately appear as a
/// forwarded client and are treated as spoof-shaped.
fn is_routable(ip: IpAddr) -> bool {
    if ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}

fn is_trusted(ip: IpAddr, trusted_proxies: &[IpAddr]) -> bool {
    trusted_proxies.iter().any(|proxy| normalize_ip(*proxy) == ip)
}

/// Derives the trust-adjusted client address used as the rate-limit key.
///
/// The forwarding header is honored only when the connecting peer is itself
/// a trusted proxy; otherwise it is ignored entirely, which prevents
/// rate-limit bypass by spoofing the header from an untrusted caller. When
/// honored, the chain is scanned right to left for the first valid, routable
/// address that is not itself a trusted proxy. Ambiguous or adversarial
/// input always falls back to the raw peer address.
pub fn resolve_client_ip(
    peer: SocketAddr,
    headers: &HeaderMap,
    trusted_proxies: &[IpAddr],
) -> String {
    let peer_ip = normalize_ip(peer.ip());

    let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) else {
        return peer_ip.to_string();
    };

    if trusted_proxies.is_empty() || !is_trusted(peer_ip, trusted_proxies) {
        if !forwarded.is_empty() {
            tracing::warn!(
                reason = "xff_from_untrusted_source",
                peer = %peer_ip,
                xff = forwarded,
                "ignoring forwarding header"
            );
        }
        return peer_ip.to_string();
    }

    let hops: Vec<&str> = forwarded.split(',').map(str::trim).collect();
    if hops.len() > MAX_FORWARDED_IPS {
        tracing::warn!(
            reason = "too_many_ips_in_xff",
            peer = %peer_ip,
            count = hops.len(),
            "ignoring forwarding header"
        );
        return peer_ip.to_string();
    }

    // Rightmost entry was appended by the nearest proxy; walk left skipping
    // trusted hops until the first address the client could not have forged.
    for hop in hops.iter().rev() {
        let Ok(ip) = hop.parse::<IpAddr>() else {
            tracing::warn!(
                reason = "malformed_xff_entry",
                peer = %peer_ip,
                entry = hop,
                "ignoring forwarding header"
            );
            return peer_ip.to_string();
        };

        let ip = normalize_ip(ip);
        if !is_routable(ip) {
            tracing::warn!(
                reason = "non_routable_xff_entry",
                peer = %peer_ip,
                entry = hop,
                "ignoring forwarding header"
            );
            return peer_ip.to_string();
        }

        if !is_trusted(ip, trusted_proxies) {
            return ip.to_string();
        }
    }

    tracing::warn!(
        reason = "all_xff_entries_trusted",
        peer = %peer_ip,
        "ignoring forwarding header"
    );
    peer_ip.to_string()
}
