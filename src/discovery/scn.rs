//! iSNS state-change-notification reactions.
//!
//! The codec dispatches SCNs on a thread of its choosing; the reaction
//! path takes the same session-registry lock as the worker paths, so the
//! push and pull ingest flows serialize naturally.

use crate::initiator::Initiator;
use crate::isns::{IsnsStatus, ScnEvent, ScnType};
use crate::method::DiscoveryMethod;
use crate::addr;
use std::sync::Arc;

/// React to one state-change notification.
pub(crate) fn handle_scn(ctx: &Arc<Initiator>, event: ScnEvent) {
    match event.scn_type {
        // A logical unit has appeared: fetch its portals, add them, and
        // force a login.
        ScnType::ObjAdded => {
            let query = ctx.isns().query_node(&ctx.node_identity(), &event.source);
            match query.status {
                IsnsStatus::Ok | IsnsStatus::PartialSuccess => {}
                IsnsStatus::Failed => return,
            }
            if query.portals.is_empty() {
                return;
            }

            for pg in &query.portals {
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
                    log::warn!("iSNS add scn failed for {}: {}", pg.node_name, err);
                }

                ctx.sessions().login_targets(
                    Some(&pg.node_name),
                    Some(DiscoveryMethod::Isns),
                    None,
                );
            }
        }

        // A logical unit went away: log out of its sessions.
        ScnType::ObjRemoved => {
            if ctx
                .sessions()
                .del(Some(&event.source), DiscoveryMethod::Isns, None)
                .is_err()
            {
                log::warn!("isns remove scn failed for target {}", event.source);
            }
        }

        ScnType::ObjUpdated => {
            log::info!("received iSNS update SCN for {}", event.source);
        }

        ScnType::Other(scn_type) => {
            log::warn!("received unknown iSNS SCN type {:#x}", scn_type);
        }
    }
}
