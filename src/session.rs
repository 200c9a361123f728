//! Session registry: the canonical table of discovered sessions.
//!
//! Every discovery path funnels through `add`; logout and login requests
//! walk the same table with a method-sensitive matching algebra. The table
//! is single-writer/many-readers; a reader may observe a concurrent add but
//! never a half-linked session.

use crate::error::DiscoveryError;
use crate::method::DiscoveryMethod;
use crate::persistent::{ConfiguredSessions, PersistentStore};
use crate::transport::Transport;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// iSCSI name length bound, in bytes.
pub const MAX_NAME_LEN: usize = 223;

/// Composite identity of a session in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub target_name: String,
    pub method: DiscoveryMethod,
    pub discovered_addr: SocketAddr,
    /// Session index within the configured-sessions count for the target.
    pub isid: u16,
}

/// One discovered session.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub tpgt: u16,
    /// Target addresses with an engine-side connection.
    pub conns: Vec<SocketAddr>,
    /// Base address of the active connection.
    pub conn_act: Option<SocketAddr>,
}

impl Session {
    fn new(key: SessionKey, tpgt: u16) -> Self {
        Self {
            key,
            tpgt,
            conns: Vec::new(),
            conn_act: None,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.key.target_name
    }

    pub fn discovered_by(&self) -> DiscoveryMethod {
        self.key.method
    }
}

/// Canonical table of sessions.
pub struct SessionRegistry {
    sessions: RwLock<Vec<Session>>,
    store: Arc<dyn PersistentStore>,
    transport: Arc<dyn Transport>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn PersistentStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            store,
            transport,
        }
    }

    /// Resolve the configured-sessions count for `target_name`: the
    /// per-target record, else the per-initiator record, else one bound
    /// session.
    fn configured_sessions(&self, target_name: &str) -> ConfiguredSessions {
        if let Some(ics) = self.store.config_session(target_name) {
            return ics;
        }
        if let Some(initiator) = self.store.initiator_name() {
            if let Some(ics) = self.store.config_session(&initiator) {
                return ics;
            }
        }
        ConfiguredSessions::default()
    }

    /// Create (or find) the discovered sessions and connections for one
    /// `(target, discovery-addr, target-addr, tpgt)` tuple.
    ///
    /// One session is created per configured-sessions slot. A failure mid
    /// batch aborts the remaining slots; sessions created for smaller
    /// indices stay in the registry and the error is reported upward.
    pub fn add(
        &self,
        method: DiscoveryMethod,
        discovered_addr: SocketAddr,
        target_name: &str,
        tpgt: u16,
        target_addr: SocketAddr,
    ) -> Result<(), DiscoveryError> {
        if target_name.is_empty() || target_name.len() > MAX_NAME_LEN {
            return Err(DiscoveryError::InvalidName(target_name.to_string()));
        }

        let mut sessions = self.sessions.write().unwrap();
        // the count in force when the write lock was taken governs this
        // add; concurrent edits apply to the next one
        let ics = self.configured_sessions(target_name);
        for isid in 0..ics.count {
            let key = SessionKey {
                target_name: target_name.to_string(),
                method,
                discovered_addr,
                isid,
            };

            let pos = match sessions.iter().position(|s| s.key == key) {
                Some(pos) => pos,
                None => {
                    let session = Session::new(key, tpgt);
                    self.transport.sess_create(&session)?;
                    sessions.push(session);
                    sessions.len() - 1
                }
            };

            if !sessions[pos].conns.contains(&target_addr) {
                self.transport.conn_create(&sessions[pos], target_addr)?;
                let session = &mut sessions[pos];
                session.conns.push(target_addr);
                if session.conn_act.is_none() {
                    session.conn_act = Some(target_addr);
                }
            }
        }
        Ok(())
    }

    /// Attempt to destroy all sessions matching the given name, method, and
    /// discovery address.
    ///
    /// A session is a candidate when the name matches (or none was given)
    /// and it was discovered by `method`. Among candidates the address
    /// match is method-sensitive: iSNS and SendTargets compare the
    /// discovery address, Static compares the active connection's base
    /// address, anything else always matches. A refused destroy keeps the
    /// session, fails the aggregate result, and the walk continues.
    pub fn del(
        &self,
        target_name: Option<&str>,
        method: DiscoveryMethod,
        discovered_addr: Option<SocketAddr>,
    ) -> Result<(), DiscoveryError> {
        let mut all_destroyed = true;
        let mut sessions = self.sessions.write().unwrap();

        let mut i = 0;
        while i < sessions.len() {
            let session = &sessions[i];

            let candidate = target_name.map_or(true, |n| session.key.target_name == n)
                && session.key.method == method;
            if !candidate {
                i += 1;
                continue;
            }

            let try_destroy = match method {
                DiscoveryMethod::Isns | DiscoveryMethod::SendTargets => {
                    discovered_addr.map_or(true, |a| a == session.key.discovered_addr)
                }
                DiscoveryMethod::Static => {
                    discovered_addr.map_or(true, |a| session.conn_act == Some(a))
                }
                _ => true,
            };
            if !try_destroy {
                i += 1;
                continue;
            }

            let name = session.key.target_name.clone();
            match self.transport.sess_destroy(session) {
                Ok(()) => {
                    sessions.remove(i);
                    self.remove_target_param(&name);
                    // the walk mutated the list; restart from the head
                    i = 0;
                }
                Err(err) => {
                    // most likely the resource is in use
                    log::warn!("session logout failed for {}: {}", name, err);
                    all_destroyed = false;
                    i += 1;
                }
            }
        }
        drop(sessions);

        if all_destroyed {
            Ok(())
        } else {
            Err(DiscoveryError::SessionBusy(
                "one or more sessions refused logout".to_string(),
            ))
        }
    }

    /// Request login for all sessions matching the given name, method, and
    /// discovery address. `method = None` matches every session. Returns
    /// whether any login was requested.
    pub fn login_targets(
        &self,
        target_name: Option<&str>,
        method: Option<DiscoveryMethod>,
        discovered_addr: Option<SocketAddr>,
    ) -> bool {
        let mut requested = false;
        let sessions = self.sessions.write().unwrap();

        for session in sessions.iter() {
            let try_online = match target_name {
                None => match method {
                    None => true,
                    Some(m) if session.key.method == m => match m {
                        DiscoveryMethod::Isns | DiscoveryMethod::SendTargets => {
                            discovered_addr.map_or(true, |a| a == session.key.discovered_addr)
                        }
                        _ => true,
                    },
                    Some(_) => false,
                },
                Some(name) => session.key.target_name == name,
            };

            if try_online {
                self.transport.sess_online(session);
                requested = true;
            }
        }
        requested
    }

    /// Drop the engine's target-parameter record for a destroyed target,
    /// unless the persistent store still carries overrides for it.
    fn remove_target_param(&self, name: &str) {
        if self.store.param(name).is_none() && self.store.config_session(name).is_none() {
            self.transport.targetparam_remove(name);
        }
    }

    /// Clone of the current table.
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}
