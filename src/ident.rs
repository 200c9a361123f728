//! Initiator identity bootstrap.
//!
//! On first boot there is no persisted initiator name. The default is
//! built from the first NIC's MAC address and the current wall time so it
//! stays unique even if the NIC moves between hosts; the alias defaults to
//! the hostname, and a CHAP record is seeded with the initiator name as
//! user and an empty secret.

use crate::error::DiscoveryError;
use crate::persistent::{ChapRecord, PersistentStore};
use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// 6-byte initiator session identifier.
///
/// Type field 01b ("random") in the top bits, qualifier in the last two
/// bytes, middle bytes zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Isid([u8; 6]);

impl Isid {
    pub fn new(qualifier: u16) -> Self {
        let mut bytes = [0u8; 6];
        bytes[0] = 0x40;
        BigEndian::write_u16(&mut bytes[4..6], qualifier);
        Isid(bytes)
    }

    pub fn bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Default for Isid {
    fn default() -> Self {
        Isid::new(0)
    }
}

impl fmt::Display for Isid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Install default initiator-node settings into the store and return the
/// generated name.
pub fn set_default_node_settings(
    store: &dyn PersistentStore,
) -> Result<String, DiscoveryError> {
    let mac = first_mac().unwrap_or([0u8; 6]);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut name = String::from("iqn.1986-03.com.sun:01:");
    for b in mac {
        let _ = write!(name, "{:02x}", b);
    }
    let _ = write!(name, ".{:x}", now);

    log::info!("no persisted initiator name, defaulting to {}", name);
    store.set_initiator_name(&name)?;

    if store.alias().map_or(true, |a| a.is_empty()) {
        store.set_alias(&hostname())?;
    }

    if store.chap(&name).is_none() {
        store.set_chap(
            &name,
            ChapRecord {
                user: name.clone(),
                secret: String::new(),
            },
        )?;
    }

    Ok(name)
}

/// MAC of the first non-loopback interface, if any.
fn first_mac() -> Option<[u8; 6]> {
    pnet::datalink::interfaces()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| iface.mac)
        .map(|mac| mac.octets())
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
