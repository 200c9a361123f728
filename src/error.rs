//! Error types for the discovery core.

use crate::method::DiscoveryMethod;
use crate::params::LoginParamId;
use thiserror::Error;

/// Discovery core errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("bad address length: {0} bytes")]
    BadAddress(usize),

    #[error("persistent store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("discovery RPC failed: {0}")]
    Rpc(String),

    #[error("SendTargets overflow: portal reported {found} targets for capacity {capacity}")]
    Overflow { capacity: usize, found: usize },

    #[error("session busy: {0}")]
    SessionBusy(String),

    #[error("unsupported login parameter {0:?}")]
    Unsupported(LoginParamId),

    #[error("no worker for discovery method {0}")]
    WorkerMissing(DiscoveryMethod),

    #[error("invalid target name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
