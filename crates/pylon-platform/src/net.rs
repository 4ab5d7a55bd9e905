//! Local network interface discovery.
//!
//! Used to build connect strings that point remote clients at this
//! machine. Loopback, link-local, and unspecified addresses are
//! excluded, then the remaining candidates are ranked so that common
//! consumer LAN prefixes win over everything else.

use std::net::IpAddr;

use tracing::debug;

/// Fallback returned when no usable interface address exists.
const UNSPECIFIED: &str = "0.0.0.0";

/// Best local address to advertise to remote clients.
///
/// Enumerates all interface addresses, filters out ones a remote peer
/// could never reach, and picks the highest-priority candidate.
/// Returns `"0.0.0.0"` when nothing usable is found.
pub fn local_address() -> String {
    let candidates: Vec<IpAddr> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces.into_iter().map(|i| i.ip()).collect(),
        Err(err) => {
            debug!(error = %err, "failed to enumerate network interfaces");
            Vec::new()
        }
    };
    preferred_address(&candidates)
}

/// Pick the best address from a candidate list.
///
/// Filtering and ranking are separated from enumeration so the policy
/// is testable without real interfaces.
pub fn preferred_address(candidates: &[IpAddr]) -> String {
    candidates
        .iter()
        .filter(|addr| is_advertisable(addr))
        .map(|addr| addr.to_string())
        .min_by_key(|addr| subnet_priority(addr))
        .unwrap_or_else(|| UNSPECIFIED.to_string())
}

/// Whether a remote peer could plausibly reach this address.
fn is_advertisable(addr: &IpAddr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return false;
    }
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local(),
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}

/// Rank an address by subnet prefix, lower is better.
///
/// Common consumer router subnets are preferred so the connect string
/// points at the LAN address a nearby client would actually dial.
fn subnet_priority(addr: &str) -> u8 {
    if addr.starts_with("192.168.1") || addr.starts_with("192.168.0") {
        0
    } else if addr.starts_with("172.16") {
        1
    } else if addr.starts_with("10.") {
        2
    } else {
        255
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
