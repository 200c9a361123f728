//! Discovery daemon binary
//!
//! Runs the discovery core against the persistent store with placeholder
//! transport/iSNS/event-bus backends, so discovery cycles, the session
//! table, and the event bracketing can be exercised and inspected without
//! a kernel transport engine attached.

use clap::Parser;
use env_logger::Env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use iscsi_initiator::error::DiscoveryError;
use iscsi_initiator::isns::{IsnsClient, IsnsQuery, IsnsStatus, NodeIdentity, ScnCallback};
use iscsi_initiator::params::ParamSetRequest;
use iscsi_initiator::persistent::{FileStore, PersistentStore, DEFAULT_STORE_PATH};
use iscsi_initiator::session::Session;
use iscsi_initiator::transport::{SendTargetsRequest, Transport};
use iscsi_initiator::{DaemonConfig, DiscoveryManager, Initiator, LogEventSink, MethodSet};

#[derive(Parser, Debug)]
#[command(name = "iscsid")]
#[command(about = "iSCSI initiator discovery daemon", long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path of the persistent store document
    #[arg(short, long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Config-storm protection window in seconds
    #[arg(long, default_value = "60")]
    storm_delay: u64,

    /// Run one discovery cycle after startup
    #[arg(short, long)]
    poke: bool,
}

/// Transport placeholder: accepts sessions and connections, refuses
/// SendTargets probes (there is no engine to run them).
struct NullTransport;

impl Transport for NullTransport {
    fn set_params(&self, req: &ParamSetRequest) -> Result<(), DiscoveryError> {
        log::debug!("set_params {:?} for {}", req.param, req.name);
        Ok(())
    }

    fn sess_create(&self, session: &Session) -> Result<(), DiscoveryError> {
        log::debug!("sess_create {:?}", session.key);
        Ok(())
    }

    fn conn_create(&self, session: &Session, addr: SocketAddr) -> Result<(), DiscoveryError> {
        log::debug!("conn_create {} for {}", addr, session.target_name());
        Ok(())
    }

    fn sess_destroy(&self, session: &Session) -> Result<(), DiscoveryError> {
        log::debug!("sess_destroy {:?}", session.key);
        Ok(())
    }

    fn sess_online(&self, session: &Session) {
        log::info!("login requested for {}", session.target_name());
    }

    fn sendtgts_get(&self, _req: &mut SendTargetsRequest) -> Result<(), DiscoveryError> {
        Err(DiscoveryError::Rpc("no transport engine attached".to_string()))
    }

    fn targetparam_remove(&self, name: &str) {
        log::debug!("targetparam_remove {}", name);
    }
}

/// iSNS placeholder: every operation reports failure.
struct NullIsns;

impl IsnsClient for NullIsns {
    fn query(&self, _node: &NodeIdentity) -> IsnsQuery {
        IsnsQuery {
            status: IsnsStatus::Failed,
            portals: Vec::new(),
        }
    }

    fn query_server(&self, _server: SocketAddr, _node: &NodeIdentity) -> IsnsQuery {
        IsnsQuery {
            status: IsnsStatus::Failed,
            portals: Vec::new(),
        }
    }

    fn query_node(&self, _node: &NodeIdentity, _target_name: &str) -> IsnsQuery {
        IsnsQuery {
            status: IsnsStatus::Failed,
            portals: Vec::new(),
        }
    }

    fn register(&self, _node: &NodeIdentity, _callback: ScnCallback) -> IsnsStatus {
        IsnsStatus::Failed
    }

    fn deregister(&self, _node: &NodeIdentity) -> IsnsStatus {
        IsnsStatus::Ok
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let (store_path, storm_delay, methods) = match args.config {
        Some(config_path) => {
            let config = match DaemonConfig::load(&config_path) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Failed to load config file: {}", e);
                    process::exit(1);
                }
            };
            let methods = config
                .discovery
                .methods
                .map(|m| m.into_iter().collect::<MethodSet>());
            (
                config.store.path,
                config.discovery.storm_delay_secs,
                methods,
            )
        }
        None => (args.store, args.storm_delay, None),
    };

    log::info!("Starting iSCSI discovery daemon");
    log::info!("  Store: {:?}", store_path);
    log::info!("  Storm delay: {}s", storm_delay);

    let store = match FileStore::load_or_create(&store_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log::error!("Failed to open persistent store: {}", e);
            process::exit(1);
        }
    };

    if let Some(methods) = methods {
        log::info!("  Enabled methods: {}", methods);
        if let Err(e) = store.set_disc_methods(methods) {
            log::error!("Failed to store enabled methods: {}", e);
            process::exit(1);
        }
    }

    let initiator = Arc::new(Initiator::new(
        store.clone(),
        Arc::new(NullTransport),
        Arc::new(NullIsns),
        Arc::new(LogEventSink),
        Duration::from_secs(storm_delay),
    ));
    let manager = DiscoveryManager::new(initiator);

    if let Err(e) = manager.init(false) {
        log::error!("Discovery init failed: {}", e);
        process::exit(1);
    }

    log::info!(
        "Discovery running as {}",
        store.initiator_name().unwrap_or_default()
    );

    if args.poke {
        log::info!("Running one discovery cycle...");
        manager.poke(None);

        let sessions = manager.initiator().sessions().snapshot();
        log::info!("{} session(s) discovered", sessions.len());
        for session in sessions {
            log::info!(
                "  {} via {} at {}",
                session.target_name(),
                session.discovered_by(),
                session.key.discovered_addr
            );
        }
    }

    let props = manager.props();
    log::info!(
        "Discovery methods: enabled={} settable={}",
        props.enabled,
        props.settable
    );

    manager.fini();
}
