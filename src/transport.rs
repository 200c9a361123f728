//! Transport-engine interface consumed by the discovery core.
//!
//! The engine performs the actual login PDU exchange and session I/O; the
//! core only asks it to create, online, and destroy sessions and
//! connections, apply parameter settings, and run SendTargets probes.

use crate::error::DiscoveryError;
use crate::params::ParamSetRequest;
use crate::persistent::DiscoveryEntry;
use crate::session::Session;
use std::net::SocketAddr;

/// Entries preallocated for a SendTargets probe before the grow-and-retry
/// path kicks in.
pub const SENDTGTS_DEFAULT_NUM_TARGETS: usize = 10;

/// One target returned by a SendTargets probe. The address is raw so the
/// caller funnels it through the normalizer like every other producer.
#[derive(Debug, Clone)]
pub struct SendTargetsEntry {
    pub name: String,
    pub ip: Vec<u8>,
    pub port: u16,
    pub tpgt: u16,
}

/// In/out header for a SendTargets probe.
///
/// The caller sets `capacity` to the number of entries it can accept; the
/// engine reports the portal's total in `found` and fills `entries` with at
/// most `capacity` of them. `found > capacity` signals overflow.
#[derive(Debug, Clone)]
pub struct SendTargetsRequest {
    pub addr: DiscoveryEntry,
    pub capacity: usize,
    pub found: usize,
    pub entries: Vec<SendTargetsEntry>,
}

impl SendTargetsRequest {
    pub fn new(addr: DiscoveryEntry, capacity: usize) -> Self {
        Self {
            addr,
            capacity,
            found: 0,
            entries: Vec::with_capacity(capacity),
        }
    }
}

/// Operations the core requests from the transport engine.
pub trait Transport: Send + Sync {
    /// Apply one login-parameter setting for a node.
    fn set_params(&self, req: &ParamSetRequest) -> Result<(), DiscoveryError>;

    /// Create the engine-side state for a session the registry is about to
    /// insert.
    fn sess_create(&self, session: &Session) -> Result<(), DiscoveryError>;

    /// Create a connection on `session` to the given target address.
    fn conn_create(&self, session: &Session, addr: SocketAddr) -> Result<(), DiscoveryError>;

    /// Log out and tear down a session. `SessionBusy` means the engine
    /// refused (resource in use); the registry keeps the session.
    fn sess_destroy(&self, session: &Session) -> Result<(), DiscoveryError>;

    /// Request that the session be brought online (logged in).
    fn sess_online(&self, session: &Session);

    /// Run a SendTargets probe against `req.addr`.
    fn sendtgts_get(&self, req: &mut SendTargetsRequest) -> Result<(), DiscoveryError>;

    /// Drop the engine's target-parameter record for `name`; called when a
    /// destroyed target has no persisted overrides left.
    fn targetparam_remove(&self, name: &str);
}
