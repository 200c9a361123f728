//! Shared initiator context.
//!
//! The discovery paths all operate on one initiator-level container: the
//! session registry, the event barrier, the identity used for iSNS, and
//! the serialization primitives. A handle to it is passed explicitly into
//! every core entry point.

use crate::events::{EventBarrier, EventSink};
use crate::ident::Isid;
use crate::isns::{IsnsClient, NodeIdentity};
use crate::persistent::PersistentStore;
use crate::session::SessionRegistry;
use crate::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Initiator-level container shared by the discovery paths.
pub struct Initiator {
    isid: Isid,
    store: Arc<dyn PersistentStore>,
    transport: Arc<dyn Transport>,
    isns: Arc<dyn IsnsClient>,
    sessions: SessionRegistry,
    events: EventBarrier,
    /// Serializes SendTargets probes across the process.
    sendtgts_lock: Mutex<()>,
    /// When the last discovery update ran, for config-storm protection.
    config_stamp: Mutex<Option<Instant>>,
    config_storm_delay: Duration,
}

impl Initiator {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn Transport>,
        isns: Arc<dyn IsnsClient>,
        sink: Arc<dyn EventSink>,
        config_storm_delay: Duration,
    ) -> Self {
        Self {
            isid: Isid::default(),
            sessions: SessionRegistry::new(store.clone(), transport.clone()),
            events: EventBarrier::new(sink),
            store,
            transport,
            isns,
            sendtgts_lock: Mutex::new(()),
            config_stamp: Mutex::new(None),
            config_storm_delay,
        }
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn isns(&self) -> &Arc<dyn IsnsClient> {
        &self.isns
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn events(&self) -> &EventBarrier {
        &self.events
    }

    pub fn isid(&self) -> Isid {
        self.isid
    }

    /// Identity block supplied with every iSNS operation.
    pub fn node_identity(&self) -> NodeIdentity {
        NodeIdentity {
            name: self.store.initiator_name().unwrap_or_default(),
            alias: self.store.alias().unwrap_or_default(),
            isid: self.isid,
        }
    }

    pub(crate) fn sendtgts_guard(&self) -> MutexGuard<'_, ()> {
        self.sendtgts_lock.lock().unwrap()
    }

    /// Whether the config-storm window has expired (or never started).
    pub(crate) fn config_window_expired(&self) -> bool {
        self.config_stamp
            .lock()
            .unwrap()
            .map_or(true, |stamp| stamp.elapsed() > self.config_storm_delay)
    }

    pub(crate) fn touch_config_window(&self) {
        *self.config_stamp.lock().unwrap() = Some(Instant::now());
    }
}
