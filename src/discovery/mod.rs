//! Discovery dispatch: worker lifecycle and the administrative control
//! surface.
//!
//! The manager owns the four method workers and drives them in response to
//! init/fini, enable/disable, poke, and the config operations invoked from
//! the CLI/ioctl path.

mod scn;
mod worker;

pub use worker::Worker;

use crate::error::DiscoveryError;
use crate::events::EventPhase;
use crate::initiator::Initiator;
use crate::method::{DiscoveryMethod, MethodSet};
use crate::params::{LoginParamId, ParamSetRequest, ParamValue};
use crate::persistent::{DiscoveryEntry, ParamRecord};
use std::sync::{Arc, Mutex};

/// Discovery thread information, used by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryProperties {
    pub enabled: MethodSet,
    pub settable: MethodSet,
}

struct WorkerDesc {
    method: DiscoveryMethod,
    body: worker::WorkerBody,
}

/// One row per discovery method, in event order.
const WORKER_TABLE: [WorkerDesc; 4] = [
    WorkerDesc {
        method: DiscoveryMethod::Static,
        body: worker::run_static,
    },
    WorkerDesc {
        method: DiscoveryMethod::SendTargets,
        body: worker::run_sendtgts,
    },
    WorkerDesc {
        method: DiscoveryMethod::Slp,
        body: worker::run_slp,
    },
    WorkerDesc {
        method: DiscoveryMethod::Isns,
        body: worker::run_isns,
    },
];

/// Owns the worker set and serializes configuration operations.
pub struct DiscoveryManager {
    initiator: Arc<Initiator>,
    workers: Mutex<Vec<Worker>>,
    /// Process-wide serialization of config_one/config_all.
    config_sem: Mutex<()>,
}

impl DiscoveryManager {
    pub fn new(initiator: Arc<Initiator>) -> Self {
        Self {
            initiator,
            workers: Mutex::new(Vec::new()),
            config_sem: Mutex::new(()),
        }
    }

    pub fn initiator(&self) -> &Arc<Initiator> {
        &self.initiator
    }

    /// Load persistent data and start discovery.
    ///
    /// `restart` means a reload was requested: the store is re-read and
    /// the already-running workers are kept. On failure the start/end
    /// event pair is still published for every method, because the door
    /// daemon pauses until all of them have occurred.
    pub fn init(&self, restart: bool) -> Result<(), DiscoveryError> {
        let result = self.init_inner(restart);

        if result.is_err() {
            for method in DiscoveryMethod::ALL {
                self.initiator.events().publish(method, EventPhase::Start);
                self.initiator.events().publish(method, EventPhase::End);
            }
        }
        result
    }

    fn init_inner(&self, restart: bool) -> Result<(), DiscoveryError> {
        self.initiator.store().init(restart)?;
        self.init_config()?;
        self.init_targets()?;

        if !restart {
            self.spawn_workers();
        }

        let dm = self.initiator.store().disc_methods();
        self.enable(dm, false)?;
        self.disable(dm.complement())
    }

    /// Tear discovery down: kill and join every worker.
    pub fn fini(&self) {
        self.workers.lock().unwrap().clear();
    }

    pub fn props(&self) -> DiscoveryProperties {
        DiscoveryProperties {
            enabled: self.initiator.store().disc_methods(),
            // change once the SLP/iSNS setting paths are implemented
            settable: [DiscoveryMethod::Static, DiscoveryMethod::SendTargets]
                .into_iter()
                .collect(),
        }
    }

    /// Start the given discovery methods; wake them too when `poke` is
    /// set. Workers are created at init, never here.
    pub fn enable(&self, methods: MethodSet, poke: bool) -> Result<(), DiscoveryError> {
        let workers = self.workers.lock().unwrap();
        for method in methods.iter() {
            let Some(w) = workers.iter().find(|w| w.method() == method) else {
                // the workers for each discovery method start at
                // initialization
                debug_assert!(false, "no worker for {}", method);
                return Err(DiscoveryError::WorkerMissing(method));
            };
            w.start();
            if poke {
                w.wakeup();
            }
        }
        Ok(())
    }

    /// Stop the given discovery methods, logging out of their sessions
    /// first. Each method publishes exactly one start/end pair; a logout
    /// failure aborts the remaining methods.
    pub fn disable(&self, methods: MethodSet) -> Result<(), DiscoveryError> {
        let workers = self.workers.lock().unwrap();
        for method in methods.iter() {
            self.initiator.events().publish(method, EventPhase::Start);

            match self.initiator.sessions().del(None, method, None) {
                Ok(()) => {
                    let Some(w) = workers.iter().find(|w| w.method() == method) else {
                        self.initiator.events().publish(method, EventPhase::End);
                        debug_assert!(false, "no worker for {}", method);
                        return Err(DiscoveryError::WorkerMissing(method));
                    };
                    w.stop();
                    self.initiator.events().publish(method, EventPhase::End);
                }
                Err(err) => {
                    self.initiator.events().publish(method, EventPhase::End);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Wake discovery to find any new targets and wait for every method to
    /// complete its cycle.
    ///
    /// Methods that are untargeted, disabled, or stopped publish their
    /// event pair directly so the barrier still fills.
    pub fn poke(&self, method: Option<DiscoveryMethod>) {
        let events = self.initiator.events();
        events.begin_cycle();

        let dm = self.initiator.store().disc_methods();
        {
            let workers = self.workers.lock().unwrap();
            for m in DiscoveryMethod::ALL {
                let targeted = method.map_or(true, |wanted| wanted == m);
                let w = workers.iter().find(|w| w.method() == m);
                let runnable = dm.contains(m) && w.map_or(false, |w| w.is_started());

                if targeted && runnable {
                    w.unwrap().wakeup();
                } else {
                    events.publish(m, EventPhase::Start);
                    events.publish(m, EventPhase::End);
                }
            }
        }

        events.wait_complete();
    }

    /// Attempt to login to all sessions for `name`, refreshing discovery
    /// first if nothing matched. Returns whether a login was requested.
    ///
    /// Stale /dev links can flood us with config requests; with `protect`
    /// set, repeated requests inside the storm window skip the discovery
    /// refresh.
    pub fn config_one(&self, name: &str, protect: bool) -> bool {
        let _sem = self.config_sem.lock().unwrap();
        let ctx = &self.initiator;

        let mut logged_in = ctx.sessions().login_targets(Some(name), None, None);
        if !logged_in && (!protect || ctx.config_window_expired()) {
            ctx.touch_config_window();
            self.poke(None);
            logged_in = ctx.sessions().login_targets(Some(name), None, None);
        }
        logged_in
    }

    /// Refresh discovery (subject to the same storm protection) and login
    /// to every known session.
    pub fn config_all(&self, protect: bool) -> bool {
        let _sem = self.config_sem.lock().unwrap();
        let ctx = &self.initiator;

        if !protect || ctx.config_window_expired() {
            ctx.touch_config_window();
            self.poke(None);
        }
        ctx.sessions().login_targets(None, None, None)
    }

    /// Probe one SendTargets discovery address.
    pub fn do_sendtgts(&self, disc_addr: &DiscoveryEntry) {
        worker::do_sendtgts(&self.initiator, disc_addr);
    }

    /// Query all configured iSNS servers.
    pub fn do_isns_query(&self) {
        worker::do_isns_query(&self.initiator);
    }

    /// Query one iSNS server.
    pub fn do_isns_query_server(&self, server: &DiscoveryEntry) {
        worker::do_isns_query_server(&self.initiator, server);
    }

    fn spawn_workers(&self) {
        let mut workers = self.workers.lock().unwrap();
        if !workers.is_empty() {
            return;
        }
        for desc in &WORKER_TABLE {
            workers.push(Worker::spawn(
                desc.method,
                desc.body,
                Arc::clone(&self.initiator),
            ));
        }
    }

    /// Install the initiator identity and its overridden parameters into
    /// the transport engine.
    fn init_config(&self) -> Result<(), DiscoveryError> {
        let ctx = &self.initiator;
        let store = ctx.store();

        let initiator_name = match store.initiator_name() {
            Some(name) => name,
            // Fresh install (or the persistent store could not be read
            // properly): default the node settings so the initiator can be
            // brought up.
            None => crate::ident::set_default_node_settings(store.as_ref())?,
        };

        let req = ParamSetRequest::new(
            &initiator_name,
            LoginParamId::InitiatorName,
            ParamValue::Text(initiator_name.clone()),
        );
        if let Err(err) = ctx.transport().set_params(&req) {
            log::warn!("failed to set initiator name: {}", err);
        }

        if let Some(alias) = store.alias() {
            let req = ParamSetRequest::new(
                &initiator_name,
                LoginParamId::InitiatorAlias,
                ParamValue::Text(alias),
            );
            if let Err(err) = ctx.transport().set_params(&req) {
                log::warn!("failed to set initiator alias: {}", err);
            }
        }

        // load up the overridden initiator parameters
        for (name, record) in store.params() {
            if name == initiator_name {
                self.apply_param_record(&name, &record);
                break;
            }
        }

        Ok(())
    }

    /// Install overridden per-target parameters so the CLI can list the
    /// targets the driver knows about. No logins happen here; those are
    /// driven by the enabled discovery methods.
    fn init_targets(&self) -> Result<(), DiscoveryError> {
        let store = self.initiator.store();
        let initiator_name = store.initiator_name().unwrap_or_default();

        for (name, record) in store.params() {
            if name == initiator_name {
                // initiator parameters were already set by init_config
                continue;
            }
            self.apply_param_record(&name, &record);
        }
        Ok(())
    }

    /// Project every overridden parameter in `record` and hand it to the
    /// transport engine, noting errors but continuing.
    fn apply_param_record(&self, name: &str, record: &ParamRecord) {
        for id in LoginParamId::ALL {
            if record.bitmap & id.bit() == 0 {
                continue;
            }
            match ParamSetRequest::project(name, id, &record.params) {
                Ok(req) => {
                    if let Err(err) = self.initiator.transport().set_params(&req) {
                        log::warn!("failed to set param {:?} for {}: {}", id, name, err);
                    }
                }
                Err(err) => {
                    log::warn!("failed to set param {:?} for {}: {}", id, name, err);
                }
            }
        }
    }
}
