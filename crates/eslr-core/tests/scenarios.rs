//! End-to-end scenarios driven through [`Router::on_receive`] and
//! [`Router::advance`] with hand-built wire packets, exercising the
//! full decode -> engine -> table pipeline rather than any one table
//! in isolation (compare the narrower per-table tests in
//! `src/route/admission.rs` and `src/route/invalidate.rs`).

mod common;

use common::{Link, TestHost};
use eslr_core::config::RouterConfig;
use eslr_core::types::{InterfaceIndex, Ipv4Prefix, Metric, NeighborId, SequenceNumber};
use eslr_core::wire::{
    AdvertisementFlags, AuthType, Command, Header, KamAuth, KamKind, KamRecord, Packet, RequestType,
    RuSubCommand, RumRecord, ServerRecord,
};
use eslr_core::Router;
use std::net::Ipv4Addr;
use std::time::Duration;

fn deterministic_config() -> RouterConfig {
    let mut cfg = RouterConfig::default();
    // No randomness, and nothing fires on its own during the handful
    // of seconds these tests advance through.
    cfg.startup_delay = Duration::ZERO;
    cfg.periodic_update_delay = Duration::from_secs(1000);
    cfg.route_jitter = Duration::ZERO;
    cfg.gc_jitter = Duration::ZERO;
    cfg.min_triggered_cooldown = Duration::from_secs(2);
    cfg.max_triggered_cooldown = Duration::from_secs(2);
    cfg.garbage_collection_delay = Duration::from_secs(10);
    cfg
}

fn hello_packet(neighbor_id: u16, gateway: Ipv4Addr, gateway_mask: Ipv4Addr) -> Vec<u8> {
    let header = Header {
        command: Command::KeepAlive,
        ru_subcommand: RuSubCommand::None,
        request_type: RequestType::None,
        count: 1,
        flags: AdvertisementFlags::empty(),
        auth_type: AuthType::Plaintext,
        auth_data: 0,
    };
    let kam = KamRecord {
        kind: KamKind::Hello,
        auth: KamAuth {
            auth_type: 0,
            auth_data: 0,
            identifier: 0,
        },
        neighbor_id: NeighborId(neighbor_id),
        gateway,
        gateway_mask,
    };
    eslr_core::wire::encode(&Packet::KeepAlive {
        header,
        records: vec![kam],
    })
}

fn response_packet(records: Vec<RumRecord>, flags: AdvertisementFlags) -> Vec<u8> {
    let header = Header {
        command: Command::RouteUpdate,
        ru_subcommand: RuSubCommand::Response,
        request_type: RequestType::None,
        count: records.len() as u8,
        flags,
        auth_type: AuthType::Plaintext,
        auth_data: 0,
    };
    eslr_core::wire::encode(&Packet::RouteUpdate { header, records })
}

fn server_packet(record: ServerRecord) -> Vec<u8> {
    let header = Header {
        command: Command::ServerRouterCom,
        ru_subcommand: RuSubCommand::None,
        request_type: RequestType::None,
        count: 1,
        flags: AdvertisementFlags::empty(),
        auth_type: AuthType::Plaintext,
        auth_data: 0,
    };
    eslr_core::wire::encode(&Packet::ServerRouterCom {
        header,
        records: vec![record],
    })
}

/// Brings up a neighbor on `interface` by feeding it a Hello, then a
/// Response advertising one prefix, returning the two call results so
/// tests can inspect whatever came back.
fn handshake_and_advertise(
    router: &mut Router<TestHost>,
    interface: InterfaceIndex,
    neighbor_id: u16,
    neighbor_addr: Ipv4Addr,
    neighbor_mask: Ipv4Addr,
    prefix: Ipv4Prefix,
    metric: Metric,
    seq: u16,
) -> (Vec<eslr_core::engine::OutboundPacket>, Vec<eslr_core::engine::OutboundPacket>) {
    let hello_reply = router
        .on_receive(
            Duration::ZERO,
            interface,
            neighbor_addr,
            &hello_packet(neighbor_id, neighbor_addr, neighbor_mask),
        )
        .unwrap();
    let rum = vec![RumRecord {
        seq: SequenceNumber(seq),
        metric,
        tag: 0,
        prefix,
    }];
    let response_reply = router
        .on_receive(
            Duration::ZERO,
            interface,
            neighbor_addr,
            &response_packet(rum, AdvertisementFlags::empty()),
        )
        .unwrap();
    (hello_reply, response_reply)
}

/// S1: a Hello followed by that neighbor's Response promotes it out of
/// Void and admits the advertised route with the local per-hop cost
/// folded in; a later triggered update carries that route back out on
/// every other active interface.
#[test]
fn neighbor_handshake_admits_route_and_later_advertises_it() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO); // drain the immediate startup-jitter periodic tick

    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 1, 0, 0), Ipv4Addr::new(255, 255, 255, 0));
    let (hello_reply, response_reply) = handshake_and_advertise(
        &mut router,
        InterfaceIndex(0),
        7,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(500),
        4,
    );

    // Hello -> Hello reply + NeighborDiscovery request, both out iface 0.
    assert_eq!(hello_reply.len(), 2);
    assert!(hello_reply.iter().all(|p| p.interface == InterfaceIndex(0)));

    // The Response both promotes (entire-table reply, empty here since
    // the table was empty at that instant) and admits the route; no
    // packet is owed immediately, only the cooldown timer gets armed.
    assert!(response_reply.is_empty());

    let entry = router.route_output(Ipv4Addr::new(10, 1, 0, 5)).unwrap();
    assert_eq!(entry.gateway, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(entry.interface, Some(InterfaceIndex(0)));

    // Admission also pushed the route into the host FIB.
    assert!(router
        .host()
        .installed
        .iter()
        .any(|(e, p)| *p == prefix && e.gateway == Ipv4Addr::new(10, 0, 0, 2)));

    // Per-hop cost for the default test link: 12us transmission + 50us
    // propagation = 62us, added to the advertised 500us metric.
    let out = router.advance(Duration::from_secs(2));
    let triggered: Vec<_> = out
        .iter()
        .filter(|p| p.interface == InterfaceIndex(1))
        .collect();
    assert_eq!(triggered.len(), 1);
    match &triggered[0].packet {
        Packet::RouteUpdate { header, records } => {
            assert!(header.flags.contains(AdvertisementFlags::TRIGGERED));
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].metric, Metric(562));
            assert_eq!(records[0].prefix, prefix);
        }
        other => panic!("expected a RouteUpdate, got {other:?}"),
    }
    // Split horizon suppresses the same route back out the interface
    // it was learned on.
    assert!(out.iter().all(|p| p.interface != InterfaceIndex(0)));
}

/// S3/S4: an interface with no backup going down poisons the affected
/// prefix with a single fast-triggered packet per remaining interface,
/// bypassing the cooldown, plus a route-pull request for the orphaned
/// prefix; the route itself stops being resolvable.
#[test]
fn interface_down_without_backup_poisons_and_pulls_on_remaining_interfaces() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO);

    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 2, 0, 0), Ipv4Addr::new(255, 255, 255, 0));
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(0),
        9,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(100),
        2,
    );
    assert!(router.route_output(Ipv4Addr::new(10, 2, 0, 9)).is_some());

    router.host_mut().set_up(0, false);
    let out = router.notify_interface_down(Duration::from_secs(1), InterfaceIndex(0));

    assert!(router.route_output(Ipv4Addr::new(10, 2, 0, 9)).is_none());
    // Disconnected with no backup withdraws the FIB entry immediately,
    // not only once garbage collection later deletes the table entry.
    assert!(!router.host().installed.iter().any(|(_, p)| *p == prefix));

    let poisons: Vec<_> = out
        .iter()
        .filter(|p| {
            matches!(&p.packet, Packet::RouteUpdate { header, .. }
                if header.flags.contains(AdvertisementFlags::DISCONNECTED))
        })
        .collect();
    assert_eq!(poisons.len(), 1);
    assert_eq!(poisons[0].interface, InterfaceIndex(1));
    match &poisons[0].packet {
        Packet::RouteUpdate { header, records } => {
            assert!(header.flags.contains(AdvertisementFlags::FAST_TRIGGERED));
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].metric, Metric::ZERO);
            assert_eq!(records[0].prefix, prefix);
        }
        _ => unreachable!(),
    }

    let pulls: Vec<_> = out
        .iter()
        .filter(|p| {
            matches!(&p.packet, Packet::RouteUpdate { header, .. }
                if header.ru_subcommand == RuSubCommand::Request)
        })
        .collect();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].interface, InterfaceIndex(1));
}

/// S4: once garbage-collected, a poisoned prefix stays gone — it is
/// neither resolvable nor re-advertised by a later periodic/triggered
/// sweep.
#[test]
fn garbage_collected_prefix_is_never_re_advertised() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO);

    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 3, 0, 0), Ipv4Addr::new(255, 255, 255, 0));
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(0),
        11,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(100),
        2,
    );

    router.host_mut().set_up(0, false);
    router.notify_interface_down(Duration::from_secs(1), InterfaceIndex(0));

    let out = router.advance(Duration::from_secs(1) + Duration::from_secs(10));
    assert!(router.route_output(Ipv4Addr::new(10, 3, 0, 9)).is_none());
    assert!(out.iter().all(|p| !matches!(
        &p.packet,
        Packet::RouteUpdate { records, .. } if records.iter().any(|r| r.prefix == prefix)
    )));
}

/// S5: a later candidate on an established secondary slot whose
/// sequence number rolls backward is rejected outright; the table (and
/// forwarding) stays exactly as it was.
#[test]
fn stale_sequence_candidate_is_rejected_and_does_not_disturb_forwarding() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO);

    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 4, 0, 0), Ipv4Addr::new(255, 255, 255, 0));

    // Primary, via the first neighbor on iface 0.
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(0),
        21,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(100),
        4,
    );
    // Settling secondary, via a second neighbor on iface 1.
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(1),
        22,
        Ipv4Addr::new(10, 0, 1, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(50),
        4,
    );

    // A third candidate with a lower metric but a rolled-back sequence
    // must not displace the settling secondary.
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(1),
        23,
        Ipv4Addr::new(10, 0, 1, 3),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(10),
        1,
    );

    assert_eq!(router.drop_counters().stale_sequence, 1);
    let entry = router.route_output(Ipv4Addr::new(10, 4, 0, 9)).unwrap();
    assert_eq!(entry.gateway, Ipv4Addr::new(10, 0, 0, 2));
}

/// S6: a server's own reported load updates the metric of this
/// router's local route for the server's prefix, and that new cost is
/// what downstream advertisements carry.
#[test]
fn server_load_update_changes_the_advertised_cost() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO);

    let server = Ipv4Addr::new(10, 0, 2, 9);
    let record = ServerRecord {
        seq: SequenceNumber(0),
        flags: 0,
        service_rate: 500,
        arrival_rate: 0,
        server_address: server,
        mask: Ipv4Addr::new(255, 255, 255, 255),
    };
    let out = router
        .on_receive(Duration::ZERO, InterfaceIndex(0), server, &server_packet(record))
        .unwrap();
    assert!(out.is_empty());

    let entry = router.route_output(server).unwrap();
    assert_eq!(entry.gateway, server);
    assert_eq!(entry.interface, Some(InterfaceIndex(0)));

    // K1 * (1 / (mu - lambda)) * 1e6 = 1 * (1/500) * 1e6 = 2000us.
    let out = router.advance(Duration::from_secs(2));
    let advertised: Vec<_> = out
        .iter()
        .filter(|p| p.interface == InterfaceIndex(1))
        .collect();
    assert_eq!(advertised.len(), 1);
    match &advertised[0].packet {
        Packet::RouteUpdate { records, .. } => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].metric, Metric(2000));
        }
        other => panic!("expected a RouteUpdate, got {other:?}"),
    }
}

/// `routeInput` delivers locally to one of this router's own addresses,
/// forwards via the main table for a learned prefix, and declines
/// multicast outright rather than handing back a zero-gateway entry.
#[test]
fn route_input_distinguishes_delivery_forwarding_and_multicast() {
    let mut host = TestHost::new();
    host.add_interface(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());
    host.add_interface(1, Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0), Link::default());

    let mut router = Router::new(deterministic_config(), host).unwrap();
    router.advance(Duration::ZERO);

    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 5, 0, 0), Ipv4Addr::new(255, 255, 255, 0));
    handshake_and_advertise(
        &mut router,
        InterfaceIndex(0),
        31,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        prefix,
        Metric(100),
        2,
    );

    assert_eq!(
        router.route_input(Ipv4Addr::new(10, 0, 1, 2), Ipv4Addr::new(10, 0, 0, 1), InterfaceIndex(1)),
        eslr_core::route::RouteInputOutcome::Deliver
    );
    match router.route_input(Ipv4Addr::new(10, 0, 1, 2), Ipv4Addr::new(10, 5, 0, 9), InterfaceIndex(1)) {
        eslr_core::route::RouteInputOutcome::Forward(entry) => {
            assert_eq!(entry.gateway, Ipv4Addr::new(10, 0, 0, 2));
        }
        other => panic!("expected Forward, got {other:?}"),
    }
    assert_eq!(
        router.route_input(Ipv4Addr::new(10, 0, 1, 2), Ipv4Addr::new(224, 0, 0, 5), InterfaceIndex(1)),
        eslr_core::route::RouteInputOutcome::NoRoute
    );
}
