//! Discovery worker threads and the per-method probe bodies.
//!
//! One long-lived thread exists per discovery method. Each runs a
//! wake-driven loop: blocked until woken, one probe cycle per wakeup,
//! bracketed by the method's start and end events on every exit path.

use crate::addr;
use crate::events::EventPhase;
use crate::initiator::Initiator;
use crate::isns::IsnsStatus;
use crate::method::DiscoveryMethod;
use crate::persistent::DiscoveryEntry;
use crate::transport::{SendTargetsRequest, SENDTGTS_DEFAULT_NUM_TARGETS};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::scn;

/// Body run by a worker thread. The body owns its wait loop so it can run
/// teardown (e.g. iSNS deregistration) after the loop ends.
pub(crate) type WorkerBody = fn(&WorkerThread, &Arc<Initiator>);

struct WorkerState {
    started: bool,
    wake: bool,
    kill: bool,
}

/// Wake/stop primitive shared between a worker thread and its owner.
pub struct WorkerThread {
    state: Mutex<WorkerState>,
    cv: Condvar,
}

impl WorkerThread {
    fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState {
                started: false,
                wake: false,
                kill: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Block until woken or killed. Consumes one wakeup and returns true;
    /// returns false once the worker is being torn down.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.kill {
                return false;
            }
            if state.started && state.wake {
                state.wake = false;
                return true;
            }
            state = self.cv.wait(state).unwrap();
        }
    }

    fn start(&self) {
        self.state.lock().unwrap().started = true;
    }

    /// Stop processing wakeups. A pending wakeup is dropped so a cycle
    /// cannot start after the stop.
    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.started = false;
        state.wake = false;
    }

    fn wakeup(&self) {
        let mut state = self.state.lock().unwrap();
        state.wake = true;
        drop(state);
        self.cv.notify_all();
    }

    fn kill(&self) {
        let mut state = self.state.lock().unwrap();
        state.kill = true;
        drop(state);
        self.cv.notify_all();
    }

    fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }
}

/// Owning handle for one method's worker thread.
pub struct Worker {
    method: DiscoveryMethod,
    thread: Arc<WorkerThread>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(method: DiscoveryMethod, body: WorkerBody, ctx: Arc<Initiator>) -> Self {
        let thread = Arc::new(WorkerThread::new());
        let thread2 = Arc::clone(&thread);
        let join = std::thread::spawn(move || body(&thread2, &ctx));
        log::debug!("spawned {} discovery worker", method);
        Self {
            method,
            thread,
            join: Some(join),
        }
    }

    pub fn method(&self) -> DiscoveryMethod {
        self.method
    }

    pub fn start(&self) {
        self.thread.start();
    }

    pub fn stop(&self) {
        self.thread.stop();
    }

    pub fn wakeup(&self) {
        self.thread.wakeup();
    }

    pub fn is_started(&self) -> bool {
        self.thread.is_started()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.thread.kill();
            if join.join().is_err() {
                log::error!("{} discovery worker panicked", self.method);
            }
        }
    }
}

/// Static discovery: walk the statically configured targets from the
/// persistent store and create their sessions. The discovery address and
/// the target address coincide.
pub(crate) fn run_static(thread: &WorkerThread, ctx: &Arc<Initiator>) {
    while thread.wait() {
        ctx.events().publish(DiscoveryMethod::Static, EventPhase::Start);

        let dm = ctx.store().disc_methods();
        if !dm.contains(DiscoveryMethod::Static) {
            log::info!("iscsi discovery failure - StaticTargets method is not enabled");
            ctx.events().publish(DiscoveryMethod::Static, EventPhase::End);
            continue;
        }

        for (name, entry) in ctx.store().static_targets() {
            let target_addr = match entry.to_socket_addr() {
                Ok(a) => a,
                Err(err) => {
                    log::warn!("bad static address for {}: {}", name, err);
                    continue;
                }
            };
            if let Err(err) = ctx.sessions().add(
                DiscoveryMethod::Static,
                target_addr,
                &name,
                entry.tpgt,
                target_addr,
            ) {
                log::warn!("static discovery failed for {}: {}", name, err);
            }
        }

        ctx.events().publish(DiscoveryMethod::Static, EventPhase::End);
    }
}

/// SendTargets discovery: probe every persisted discovery address.
pub(crate) fn run_sendtgts(thread: &WorkerThread, ctx: &Arc<Initiator>) {
    while thread.wait() {
        ctx.events().publish(DiscoveryMethod::SendTargets, EventPhase::Start);

        let dm = ctx.store().disc_methods();
        if !dm.contains(DiscoveryMethod::SendTargets) {
            log::info!("iscsi discovery failure - SendTargets method is not enabled");
            ctx.events().publish(DiscoveryMethod::SendTargets, EventPhase::End);
            continue;
        }

        for entry in ctx.store().discovery_addrs() {
            do_sendtgts(ctx, &entry);
        }

        ctx.events().publish(DiscoveryMethod::SendTargets, EventPhase::End);
    }
}

/// iSNS discovery: (re-)register with the directory, then pull the full
/// target list. Registration is idempotent by protocol; deregistration
/// happens once the worker is torn down.
pub(crate) fn run_isns(thread: &WorkerThread, ctx: &Arc<Initiator>) {
    while thread.wait() {
        ctx.events().publish(DiscoveryMethod::Isns, EventPhase::Start);

        let dm = ctx.store().disc_methods();
        if !dm.contains(DiscoveryMethod::Isns) {
            log::info!("iscsi discovery failure - iSNS method is not enabled");
            ctx.events().publish(DiscoveryMethod::Isns, EventPhase::End);
            continue;
        }

        let node = ctx.node_identity();
        let scn_ctx = Arc::clone(ctx);
        let status = ctx.isns().register(
            &node,
            Arc::new(move |event| scn::handle_scn(&scn_ctx, event)),
        );
        if status == IsnsStatus::Failed {
            log::warn!("iscsi discovery failure - iSNS registration failed");
        }

        do_isns_query(ctx);

        ctx.events().publish(DiscoveryMethod::Isns, EventPhase::End);
    }

    // Worker stopped for good; deregister from the iSNS server(s).
    let _ = ctx.isns().deregister(&ctx.node_identity());
}

/// SLP discovery is not supported. The pair of events is still published
/// whenever the worker is woken; a daemon waiting for discovery to
/// complete would otherwise pause forever.
pub(crate) fn run_slp(thread: &WorkerThread, ctx: &Arc<Initiator>) {
    while thread.wait() {
        ctx.events().publish(DiscoveryMethod::Slp, EventPhase::Start);
        ctx.events().publish(DiscoveryMethod::Slp, EventPhase::End);
    }
}

/// Issue a SendTargets probe to one discovery address and add the
/// discovered targets.
///
/// The probe buffer holds `SENDTGTS_DEFAULT_NUM_TARGETS` entries; when the
/// portal reports more, the buffer is grown to the reported count and the
/// probe retried once. A second overflow skips this address.
pub(crate) fn do_sendtgts(ctx: &Arc<Initiator>, disc_addr: &DiscoveryEntry) {
    let addr_dsc = match disc_addr.to_socket_addr() {
        Ok(a) => a,
        Err(err) => {
            log::warn!("iscsi discovery failure - SendTargets: {}", err);
            return;
        }
    };

    let mut req = SendTargetsRequest::new(disc_addr.clone(), SENDTGTS_DEFAULT_NUM_TARGETS);
    let mut retry = true;
    loop {
        let result = {
            // one SendTargets operation at a time
            let _guard = ctx.sendtgts_guard();
            ctx.transport().sendtgts_get(&mut req)
        };
        if let Err(err) = result {
            log::warn!("iscsi discovery failure - SendTargets ({}): {}", addr_dsc, err);
            return;
        }

        if req.found > req.capacity {
            if retry {
                let grown = req.found;
                req = SendTargetsRequest::new(disc_addr.clone(), grown);
                retry = false;
                continue;
            }
            log::warn!("iscsi discovery failure - SendTargets overflow ({})", addr_dsc);
            return;
        }
        break;
    }

    for ste in &req.entries {
        let addr_tgt = match addr::to_socket_addr(&ste.ip, ste.port) {
            Ok(a) => a,
            Err(err) => {
                log::warn!("bad SendTargets address for {}: {}", ste.name, err);
                continue;
            }
        };
        if let Err(err) = ctx.sessions().add(
            DiscoveryMethod::SendTargets,
            addr_dsc,
            &ste.name,
            ste.tpgt,
            addr_tgt,
        ) {
            log::warn!("SendTargets discovery failed for {}: {}", ste.name, err);
        }
    }
}

/// Query all configured iSNS servers and ingest the portal groups. A
/// partially failed query still yields whatever was collected.
pub(crate) fn do_isns_query(ctx: &Arc<Initiator>) {
    let query = ctx.isns().query(&ctx.node_identity());
    match query.status {
        IsnsStatus::Ok | IsnsStatus::PartialSuccess => {}
        IsnsStatus::Failed => {
            log::debug!("iSNS query failed");
            return;
        }
    }
    if query.portals.is_empty() {
        return;
    }
    ingest_portal_list(ctx, &query.portals);
}

/// Query a single iSNS server and ingest the portal groups.
pub(crate) fn do_isns_query_server(ctx: &Arc<Initiator>, server: &DiscoveryEntry) {
    let server_addr = match server.to_socket_addr() {
        Ok(a) => a,
        Err(err) => {
            log::warn!("bad iSNS server address: {}", err);
            return;
        }
    };

    let query = ctx.isns().query_server(server_addr, &ctx.node_identity());
    if query.status != IsnsStatus::Ok || query.portals.is_empty() {
        log::debug!("iSNS server query yielded nothing ({})", server_addr);
        return;
    }
    ingest_portal_list(ctx, &query.portals);
}

/// Add every portal group in the list to the session registry. Shared by
/// the all-servers and single-server query paths.
pub(crate) fn ingest_portal_list(ctx: &Arc<Initiator>, portals: &[crate::isns::PortalGroup]) {
    for pg in portals {
        let addr_dsc = addr::to_socket_addr(&pg.server_ip, pg.server_port);
        let addr_tgt = addr::to_socket_addr(&pg.ip, pg.port);
        let (addr_dsc, addr_tgt) = match (addr_dsc, addr_tgt) {
            (Ok(d), Ok(t)) => (d, t),
            _ => {
                log::warn!("bad iSNS portal address for {}", pg.node_name);
                continue;
            }
        };
        if let Err(err) = ctx.sessions().add(
            DiscoveryMethod::Isns,
            addr_dsc,
            &pg.node_name,
            pg.tpgt,
            addr_tgt,
        ) {
            log::warn!("iSNS discovery failed for {}: {}", pg.node_name, err);
        }
    }
}
