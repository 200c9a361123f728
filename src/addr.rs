//! Canonical socket-address construction.
//!
//! The session registry compares addresses byte-wise, so every producer of
//! an address (static entries, SendTargets results, iSNS portals) funnels
//! through `to_socket_addr` before the address enters the registry.

use crate::error::DiscoveryError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Convert a raw `(bytes, port)` pair into a canonical socket address.
///
/// A 4-byte buffer yields an IPv4 address, a 16-byte buffer an IPv6 one;
/// any other length is refused.
pub fn to_socket_addr(ip: &[u8], port: u16) -> Result<SocketAddr, DiscoveryError> {
    let ip = match ip.len() {
        4 => IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
        16 => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(ip);
            IpAddr::V6(Ipv6Addr::from(bytes))
        }
        n => return Err(DiscoveryError::BadAddress(n)),
    };
    Ok(SocketAddr::new(ip, port))
}
