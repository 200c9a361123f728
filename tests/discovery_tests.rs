//! End-to-end scenarios for the discovery core: event bracketing,
//! SendTargets overflow handling, config-storm protection, SCN reactions,
//! and the logout matching algebra.

mod common;

use common::{harness, sockaddr, SendTgtsFixture};
use iscsi_initiator::isns::{PortalGroup, ScnEvent, ScnType};
use iscsi_initiator::persistent::{ConfiguredSessions, DiscoveryEntry, PersistentStore};
use iscsi_initiator::{DiscoveryMethod, MethodSet};
use std::fs;

#[test]
fn init_with_empty_store_brackets_every_method() {
    let h = harness();

    h.manager.init(false).unwrap();

    let events = h.sink.snapshot();
    assert_eq!(events.len(), 8, "unexpected events: {:?}", events);
    for method in DiscoveryMethod::ALL {
        h.sink.assert_bracketed(method);
    }

    h.manager.fini();
}

#[test]
fn init_failure_still_brackets_every_method() {
    let h = harness();
    h.manager.init(false).unwrap();
    h.sink.drain();

    // a reload against a corrupted document fails, but the readiness
    // daemon still needs the full event set
    fs::write(&h.store_path, "not json").unwrap();
    assert!(h.manager.init(true).is_err());

    assert_eq!(h.sink.len(), 8);
    for method in DiscoveryMethod::ALL {
        h.sink.assert_bracketed(method);
    }

    h.manager.fini();
}

#[test]
fn sendtargets_overflow_grows_once_and_retries() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::SendTargets))
        .unwrap();
    h.store
        .add_discovery_addr(DiscoveryEntry::new("192.0.2.5".parse().unwrap(), 3260))
        .unwrap();
    h.transport.set_sendtgts_fixture(SendTgtsFixture::Fixed(15));

    h.manager.init(false).unwrap();
    h.sink.drain();
    h.manager.poke(None);

    // first probe offered 10 slots, the retry offered the reported 15
    assert_eq!(h.transport.sendtgts_calls(), vec![10, 15]);

    let sessions = h.manager.initiator().sessions().snapshot();
    assert_eq!(sessions.len(), 15);
    let disc = sockaddr("192.0.2.5:3260");
    for session in &sessions {
        assert_eq!(session.discovered_by(), DiscoveryMethod::SendTargets);
        assert_eq!(session.key.discovered_addr, disc);
    }

    h.manager.fini();
}

#[test]
fn sendtargets_overflow_after_retry_skips_address() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::SendTargets))
        .unwrap();
    h.store
        .add_discovery_addr(DiscoveryEntry::new("192.0.2.5".parse().unwrap(), 3260))
        .unwrap();
    h.transport
        .set_sendtgts_fixture(SendTgtsFixture::DoubleCapacity);

    h.manager.init(false).unwrap();
    h.sink.drain();
    h.manager.poke(None);

    // exactly one retry, then the address is given up on
    assert_eq!(h.transport.sendtgts_calls(), vec![10, 20]);
    assert!(h.manager.initiator().sessions().is_empty());

    // the cycle is still bracketed for every method
    assert_eq!(h.sink.len(), 8);
    for method in DiscoveryMethod::ALL {
        h.sink.assert_bracketed(method);
    }

    h.manager.fini();
}

#[test]
fn repeated_config_one_is_storm_protected() {
    let h = harness();
    h.manager.init(false).unwrap();
    h.sink.drain();

    // no session matches, so the first call runs a discovery cycle
    assert!(!h.manager.config_one("iqn.x", true));
    assert_eq!(h.sink.len(), 8, "expected exactly one poke cycle");

    // inside the storm window the second call must not poke again
    assert!(!h.manager.config_one("iqn.x", true));
    assert_eq!(h.sink.len(), 8, "storm protection did not hold");

    h.manager.fini();
}

#[test]
fn config_one_without_protection_always_pokes() {
    let h = harness();
    h.manager.init(false).unwrap();
    h.sink.drain();

    assert!(!h.manager.config_one("iqn.x", false));
    assert!(!h.manager.config_one("iqn.x", false));
    assert_eq!(h.sink.len(), 16, "expected two poke cycles");

    h.manager.fini();
}

#[test]
fn scn_removal_destroys_sessions_and_orphan_params() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::Isns))
        .unwrap();
    h.manager.init(false).unwrap();

    // two sessions per target, configured at the initiator level
    let initiator_name = h.store.initiator_name().unwrap();
    h.store
        .set_config_session(
            &initiator_name,
            ConfiguredSessions {
                count: 2,
                bound: true,
            },
        )
        .unwrap();

    let registry = h.manager.initiator().sessions();
    registry
        .add(
            DiscoveryMethod::Isns,
            sockaddr("198.51.100.10:3205"),
            "iqn.a",
            1,
            sockaddr("198.51.100.20:3260"),
        )
        .unwrap();
    assert_eq!(registry.len(), 2);

    // run one iSNS cycle so the worker registers the SCN callback
    h.manager.poke(Some(DiscoveryMethod::Isns));
    let callback = h.isns.callback().expect("iSNS worker registered the callback");

    (*callback)(ScnEvent {
        scn_type: ScnType::ObjRemoved,
        source: "iqn.a".to_string(),
    });

    assert!(registry.is_empty());
    assert_eq!(h.transport.destroyed().len(), 2);
    assert!(h
        .transport
        .removed_params()
        .contains(&"iqn.a".to_string()));

    h.manager.fini();
}

#[test]
fn scn_addition_ingests_portals_and_forces_login() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::Isns))
        .unwrap();
    h.manager.init(false).unwrap();

    h.manager.poke(Some(DiscoveryMethod::Isns));
    let callback = h.isns.callback().expect("iSNS worker registered the callback");

    h.isns.set_node_response(vec![PortalGroup {
        node_name: "iqn.b".to_string(),
        ip: vec![198, 51, 100, 21],
        port: 3260,
        tpgt: 4,
        server_ip: vec![198, 51, 100, 10],
        server_port: 3205,
    }]);

    (*callback)(ScnEvent {
        scn_type: ScnType::ObjAdded,
        source: "iqn.b".to_string(),
    });

    let registry = h.manager.initiator().sessions();
    let sessions = registry.snapshot();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].target_name(), "iqn.b");
    assert_eq!(sessions[0].discovered_by(), DiscoveryMethod::Isns);
    assert_eq!(sessions[0].key.discovered_addr, sockaddr("198.51.100.10:3205"));
    assert_eq!(sessions[0].conn_act, Some(sockaddr("198.51.100.21:3260")));
    assert_eq!(h.transport.onlined().len(), 1);

    h.manager.fini();
}

#[test]
fn static_logout_matches_on_active_connection_address() {
    let h = harness();
    let registry = h.manager.initiator().sessions();
    let addr = sockaddr("10.0.0.1:3260");

    registry
        .add(DiscoveryMethod::Static, addr, "iqn.s", 0, addr)
        .unwrap();

    // a non-matching connection address leaves the session alone
    registry
        .del(None, DiscoveryMethod::Static, Some(sockaddr("10.0.0.2:3260")))
        .unwrap();
    assert_eq!(registry.len(), 1);

    // the matching one removes it
    registry.del(None, DiscoveryMethod::Static, Some(addr)).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn del_by_method_clears_only_that_method() {
    let h = harness();
    let registry = h.manager.initiator().sessions();
    let disc = sockaddr("192.0.2.5:3260");
    let tgt = sockaddr("192.0.2.6:3260");

    registry
        .add(DiscoveryMethod::SendTargets, disc, "iqn.st", 0, tgt)
        .unwrap();
    registry
        .add(DiscoveryMethod::Isns, disc, "iqn.isns", 0, tgt)
        .unwrap();

    registry.del(None, DiscoveryMethod::SendTargets, None).unwrap();

    let remaining = registry.snapshot();
    assert!(remaining
        .iter()
        .all(|s| s.discovered_by() != DiscoveryMethod::SendTargets));
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].target_name(), "iqn.isns");
}

#[test]
fn sendtargets_logout_matches_on_discovery_address() {
    let h = harness();
    let registry = h.manager.initiator().sessions();
    let disc = sockaddr("192.0.2.5:3260");
    let tgt = sockaddr("192.0.2.6:3260");

    registry
        .add(DiscoveryMethod::SendTargets, disc, "iqn.st", 0, tgt)
        .unwrap();

    registry
        .del(
            None,
            DiscoveryMethod::SendTargets,
            Some(sockaddr("192.0.2.99:3260")),
        )
        .unwrap();
    assert_eq!(registry.len(), 1);

    registry
        .del(None, DiscoveryMethod::SendTargets, Some(disc))
        .unwrap();
    assert!(registry.is_empty());
}

#[test]
fn disable_then_enable_is_idempotent() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::Static))
        .unwrap();
    h.manager.init(false).unwrap();

    let mask = MethodSet::single(DiscoveryMethod::Static);
    h.manager.disable(mask).unwrap();
    h.manager.enable(mask, false).unwrap();
    h.manager.enable(mask, false).unwrap();

    // the worker still runs exactly one bracketed cycle per poke
    h.sink.drain();
    h.manager.poke(Some(DiscoveryMethod::Static));
    assert_eq!(h.sink.len(), 8);
    for method in DiscoveryMethod::ALL {
        h.sink.assert_bracketed(method);
    }

    h.manager.fini();
}

#[test]
fn isns_worker_ingests_query_results() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::Isns))
        .unwrap();
    h.isns.set_query_response(vec![
        PortalGroup {
            node_name: "iqn.q1".to_string(),
            ip: vec![203, 0, 113, 1],
            port: 3260,
            tpgt: 1,
            server_ip: vec![203, 0, 113, 100],
            server_port: 3205,
        },
        PortalGroup {
            node_name: "iqn.q2".to_string(),
            ip: vec![203, 0, 113, 2],
            port: 3260,
            tpgt: 1,
            server_ip: vec![203, 0, 113, 100],
            server_port: 3205,
        },
    ]);

    h.manager.init(false).unwrap();
    h.manager.poke(Some(DiscoveryMethod::Isns));

    let sessions = h.manager.initiator().sessions().snapshot();
    assert_eq!(sessions.len(), 2);
    assert!(sessions
        .iter()
        .all(|s| s.discovered_by() == DiscoveryMethod::Isns));
    assert!(*h.isns.registrations.lock().unwrap() >= 1);

    h.manager.fini();

    // teardown deregisters from the directory
    assert!(*h.isns.deregistrations.lock().unwrap() >= 1);
}

#[test]
fn static_worker_discovers_persisted_targets() {
    let h = harness();
    h.store
        .set_disc_methods(MethodSet::single(DiscoveryMethod::Static))
        .unwrap();
    h.store
        .add_static_target(
            "iqn.static-a",
            DiscoveryEntry::new("10.1.0.1".parse().unwrap(), 3260).with_tpgt(7),
        )
        .unwrap();
    h.store
        .add_static_target(
            "iqn.static-b",
            DiscoveryEntry::new("10.1.0.2".parse().unwrap(), 3260),
        )
        .unwrap();

    h.manager.init(false).unwrap();
    h.manager.poke(None);

    let sessions = h.manager.initiator().sessions().snapshot();
    assert_eq!(sessions.len(), 2);
    for session in &sessions {
        assert_eq!(session.discovered_by(), DiscoveryMethod::Static);
        // discovery and target addresses coincide for static entries
        assert_eq!(Some(session.key.discovered_addr), session.conn_act);
    }

    h.manager.fini();
}
