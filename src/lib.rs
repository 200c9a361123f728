//! iSCSI initiator discovery core.
//!
//! This crate drives target discovery across four independently scheduled
//! methods (Static, SendTargets, iSNS, SLP), maintains the authoritative
//! session registry, and coordinates login/logout in response to discovery
//! results, administrative commands, and iSNS state-change notifications.
//! The persistent store, transport engine, iSNS codec, and event bus are
//! external collaborators behind traits.

pub mod addr;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod ident;
pub mod initiator;
pub mod isns;
pub mod method;
pub mod params;
pub mod persistent;
pub mod session;
pub mod transport;

pub use config::DaemonConfig;
pub use discovery::{DiscoveryManager, DiscoveryProperties};
pub use error::DiscoveryError;
pub use events::{DiscoveryEvent, EventPhase, EventSink, LogEventSink};
pub use initiator::Initiator;
pub use method::{DiscoveryMethod, MethodSet};
pub use session::{Session, SessionKey, SessionRegistry};

/// Version of this library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
