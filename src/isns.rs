//! iSNS codec interface and state-change-notification types.

use crate::ident::Isid;
use std::net::SocketAddr;
use std::sync::Arc;

/// Status alphabet of the iSNS codec. Anything the codec reports beyond
/// these two success shapes is treated uniformly as failure by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsnsStatus {
    Ok,
    /// Some servers answered, some did not.
    PartialSuccess,
    Failed,
}

/// Initiator identity supplied with every iSNS operation.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub name: String,
    pub alias: String,
    pub isid: Isid,
}

/// One portal group entry returned by an iSNS query: the target node, its
/// portal, and the server that reported it. Addresses are raw bytes so the
/// caller funnels them through the normalizer.
#[derive(Debug, Clone)]
pub struct PortalGroup {
    pub node_name: String,
    pub ip: Vec<u8>,
    pub port: u16,
    pub tpgt: u16,
    pub server_ip: Vec<u8>,
    pub server_port: u16,
}

/// Query outcome: status plus whatever portal groups were collected.
#[derive(Debug, Clone)]
pub struct IsnsQuery {
    pub status: IsnsStatus,
    pub portals: Vec<PortalGroup>,
}

/// State-change notification types pushed by an iSNS server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScnType {
    ObjAdded,
    ObjRemoved,
    ObjUpdated,
    Other(u32),
}

/// An SCN delivered by the codec's callback dispatch.
#[derive(Debug, Clone)]
pub struct ScnEvent {
    pub scn_type: ScnType,
    /// Source-key attribute: the iSCSI name of the node the notification
    /// refers to.
    pub source: String,
}

/// Callback the core registers for SCN delivery. Runs on whatever thread
/// the codec selects.
pub type ScnCallback = Arc<dyn Fn(ScnEvent) + Send + Sync>;

/// Operations the core requests from the iSNS codec.
pub trait IsnsClient: Send + Sync {
    /// Query all configured iSNS servers for targets visible to this node.
    fn query(&self, node: &NodeIdentity) -> IsnsQuery;

    /// Query a single iSNS server.
    fn query_server(&self, server: SocketAddr, node: &NodeIdentity) -> IsnsQuery;

    /// Query for one target node's portal list.
    fn query_node(&self, node: &NodeIdentity, target_name: &str) -> IsnsQuery;

    /// Register this node with the iSNS servers, supplying the SCN
    /// callback. Registration is idempotent by protocol.
    fn register(&self, node: &NodeIdentity, callback: ScnCallback) -> IsnsStatus;

    /// Deregister this node.
    fn deregister(&self, node: &NodeIdentity) -> IsnsStatus;
}
