//! Shared test doubles: a recording transport, a scripted iSNS client,
//! and a collecting event sink, plus a harness that wires them to a
//! tempdir-backed store.

#![allow(dead_code)]

use iscsi_initiator::error::DiscoveryError;
use iscsi_initiator::events::{DiscoveryEvent, EventPhase, EventSink};
use iscsi_initiator::isns::{
    IsnsClient, IsnsQuery, IsnsStatus, NodeIdentity, PortalGroup, ScnCallback,
};
use iscsi_initiator::params::ParamSetRequest;
use iscsi_initiator::persistent::FileStore;
use iscsi_initiator::session::{Session, SessionKey};
use iscsi_initiator::transport::{SendTargetsEntry, SendTargetsRequest, Transport};
use iscsi_initiator::{DiscoveryManager, DiscoveryMethod, Initiator};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// How a stubbed SendTargets portal answers probes.
#[derive(Debug, Clone, Copy)]
pub enum SendTgtsFixture {
    /// The portal has `total` targets and fills up to the offered
    /// capacity.
    Fixed(usize),
    /// The portal always reports twice the offered capacity, so the
    /// grow-once retry never catches up.
    DoubleCapacity,
}

#[derive(Default)]
pub struct StubTransport {
    pub created: Mutex<Vec<SessionKey>>,
    pub destroyed: Mutex<Vec<SessionKey>>,
    pub onlined: Mutex<Vec<SessionKey>>,
    pub param_sets: Mutex<Vec<ParamSetRequest>>,
    pub removed_params: Mutex<Vec<String>>,
    pub busy_names: Mutex<HashSet<String>>,
    pub sendtgts_fixture: Mutex<Option<SendTgtsFixture>>,
    pub sendtgts_calls: Mutex<Vec<usize>>,
}

impl StubTransport {
    pub fn set_sendtgts_fixture(&self, fixture: SendTgtsFixture) {
        *self.sendtgts_fixture.lock().unwrap() = Some(fixture);
    }

    pub fn mark_busy(&self, name: &str) {
        self.busy_names.lock().unwrap().insert(name.to_string());
    }

    pub fn sendtgts_calls(&self) -> Vec<usize> {
        self.sendtgts_calls.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<SessionKey> {
        self.destroyed.lock().unwrap().clone()
    }

    pub fn onlined(&self) -> Vec<SessionKey> {
        self.onlined.lock().unwrap().clone()
    }

    pub fn removed_params(&self) -> Vec<String> {
        self.removed_params.lock().unwrap().clone()
    }

    fn entry(i: usize) -> SendTargetsEntry {
        SendTargetsEntry {
            name: format!("iqn.1992-01.com.example:disk{}", i),
            ip: vec![192, 0, 2, 100 + i as u8],
            port: 3260,
            tpgt: i as u16,
        }
    }
}

impl Transport for StubTransport {
    fn set_params(&self, req: &ParamSetRequest) -> Result<(), DiscoveryError> {
        self.param_sets.lock().unwrap().push(req.clone());
        Ok(())
    }

    fn sess_create(&self, session: &Session) -> Result<(), DiscoveryError> {
        self.created.lock().unwrap().push(session.key.clone());
        Ok(())
    }

    fn conn_create(&self, _session: &Session, _addr: SocketAddr) -> Result<(), DiscoveryError> {
        Ok(())
    }

    fn sess_destroy(&self, session: &Session) -> Result<(), DiscoveryError> {
        if self
            .busy_names
            .lock()
            .unwrap()
            .contains(session.target_name())
        {
            return Err(DiscoveryError::SessionBusy(
                session.target_name().to_string(),
            ));
        }
        self.destroyed.lock().unwrap().push(session.key.clone());
        Ok(())
    }

    fn sess_online(&self, session: &Session) {
        self.onlined.lock().unwrap().push(session.key.clone());
    }

    fn sendtgts_get(&self, req: &mut SendTargetsRequest) -> Result<(), DiscoveryError> {
        self.sendtgts_calls.lock().unwrap().push(req.capacity);

        let fixture = *self.sendtgts_fixture.lock().unwrap();
        let total = match fixture {
            Some(SendTgtsFixture::Fixed(total)) => total,
            Some(SendTgtsFixture::DoubleCapacity) => req.capacity * 2,
            None => return Err(DiscoveryError::Rpc("no portal scripted".to_string())),
        };
        req.found = total;
        req.entries = (0..total.min(req.capacity)).map(Self::entry).collect();
        Ok(())
    }

    fn targetparam_remove(&self, name: &str) {
        self.removed_params.lock().unwrap().push(name.to_string());
    }
}

#[derive(Default)]
pub struct StubIsns {
    pub callback: Mutex<Option<ScnCallback>>,
    pub query_response: Mutex<Option<Vec<PortalGroup>>>,
    pub node_response: Mutex<Option<Vec<PortalGroup>>>,
    pub registrations: Mutex<usize>,
    pub deregistrations: Mutex<usize>,
}

impl StubIsns {
    pub fn set_query_response(&self, portals: Vec<PortalGroup>) {
        *self.query_response.lock().unwrap() = Some(portals);
    }

    pub fn set_node_response(&self, portals: Vec<PortalGroup>) {
        *self.node_response.lock().unwrap() = Some(portals);
    }

    pub fn callback(&self) -> Option<ScnCallback> {
        self.callback.lock().unwrap().clone()
    }

    fn respond(scripted: &Mutex<Option<Vec<PortalGroup>>>) -> IsnsQuery {
        match scripted.lock().unwrap().clone() {
            Some(portals) => IsnsQuery {
                status: IsnsStatus::Ok,
                portals,
            },
            None => IsnsQuery {
                status: IsnsStatus::Failed,
                portals: Vec::new(),
            },
        }
    }
}

impl IsnsClient for StubIsns {
    fn query(&self, _node: &NodeIdentity) -> IsnsQuery {
        Self::respond(&self.query_response)
    }

    fn query_server(&self, _server: SocketAddr, _node: &NodeIdentity) -> IsnsQuery {
        Self::respond(&self.query_response)
    }

    fn query_node(&self, _node: &NodeIdentity, _target_name: &str) -> IsnsQuery {
        Self::respond(&self.node_response)
    }

    fn register(&self, _node: &NodeIdentity, callback: ScnCallback) -> IsnsStatus {
        *self.registrations.lock().unwrap() += 1;
        *self.callback.lock().unwrap() = Some(callback);
        IsnsStatus::Ok
    }

    fn deregister(&self, _node: &NodeIdentity) -> IsnsStatus {
        *self.deregistrations.lock().unwrap() += 1;
        IsnsStatus::Ok
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<DiscoveryEvent>>,
}

impl CollectingSink {
    pub fn drain(&self) -> Vec<DiscoveryEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<DiscoveryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Assert the collected events contain exactly one start and one end
    /// for `method`, in that order.
    pub fn assert_bracketed(&self, method: DiscoveryMethod) {
        let events = self.snapshot();
        let starts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.method == method && e.phase == EventPhase::Start)
            .map(|(i, _)| i)
            .collect();
        let ends: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.method == method && e.phase == EventPhase::End)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(starts.len(), 1, "{} start events for {}", starts.len(), method);
        assert_eq!(ends.len(), 1, "{} end events for {}", ends.len(), method);
        assert!(starts[0] < ends[0], "end before start for {}", method);
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: DiscoveryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store_path: PathBuf,
    pub store: Arc<FileStore>,
    pub transport: Arc<StubTransport>,
    pub isns: Arc<StubIsns>,
    pub sink: Arc<CollectingSink>,
    pub manager: DiscoveryManager,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("initiator.json");
    let store = Arc::new(FileStore::load_or_create(&store_path).unwrap());
    let transport = Arc::new(StubTransport::default());
    let isns = Arc::new(StubIsns::default());
    let sink = Arc::new(CollectingSink::default());

    let initiator = Arc::new(Initiator::new(
        store.clone(),
        transport.clone(),
        isns.clone(),
        sink.clone(),
        Duration::from_secs(60),
    ));
    let manager = DiscoveryManager::new(initiator);

    Harness {
        dir,
        store_path,
        store,
        transport,
        isns,
        sink,
        manager,
    }
}

pub fn sockaddr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}
