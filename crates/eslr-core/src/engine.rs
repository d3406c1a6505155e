//! The protocol engine (spec §4.5): update scheduling, split horizon,
//! route pulls, and packet dispatch. Free functions operating on
//! borrowed tables, in the same spirit as the teacher's orchagent
//! helpers — the engine itself holds no state beyond what
//! [`crate::Router`] owns.

use crate::config::{RouterConfig, SplitHorizon};
use crate::host::HostStack;
use crate::metrics::DropCounters;
use crate::neighbor::{NeighborKey, NeighborOutcome, NeighborTable};
use crate::route::{RouteOutcome, RouteTable, RouteTiming, Validity};
use crate::scheduler::Timestamp;
use crate::types::{InterfaceIndex, InvalidateReason, Ipv4Prefix, Metric, NeighborId};
use crate::wire::{
    AdvertisementFlags, AuthType, Command, Header, KamAuth, KamKind, KamRecord, Packet,
    RequestType, RuSubCommand, RumRecord,
};
use std::net::Ipv4Addr;
use tracing::{instrument, warn};

/// A packet the engine wants sent, and the interface to send it on.
/// Actually handing it to a socket is the host embedding's job (spec
/// §5's sync-core/async-host split, documented in DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub interface: InterfaceIndex,
    pub packet: Packet,
}

pub fn timing(cfg: &RouterConfig) -> RouteTiming {
    RouteTiming {
        settling_time: cfg.settling_time,
        timeout_delay: cfg.route_timeout_delay,
        garbage_collection_delay: cfg.garbage_collection_delay,
        route_jitter_max: cfg.route_jitter,
        gc_jitter_max: cfg.gc_jitter,
    }
}

fn base_header(command: Command, ru_subcommand: RuSubCommand, request_type: RequestType) -> Header {
    Header {
        command,
        ru_subcommand,
        request_type,
        count: 0,
        flags: AdvertisementFlags::empty(),
        auth_type: AuthType::Plaintext,
        auth_data: 0,
    }
}

/// Builds the RUM list for an update going out `outgoing_if`, applying
/// split horizon and excluding local-host records (spec §4.5, §4.3.4).
fn advertisable_records(
    route_table: &RouteTable,
    outgoing_if: InterfaceIndex,
    split_horizon: SplitHorizon,
    only_changed: bool,
) -> Vec<RumRecord> {
    route_table
        .main_records()
        .filter(|(_, r)| r.validity != Validity::LocalHost)
        .filter(|(_, r)| !only_changed || r.changed)
        .filter(|(_, r)| {
            !(split_horizon == SplitHorizon::On && r.interface == outgoing_if)
        })
        .map(|(prefix, r)| RumRecord {
            seq: r.seq,
            metric: r.metric,
            tag: 0,
            prefix: *prefix,
        })
        .collect()
}

fn pack_for_interfaces(
    header_flags: AdvertisementFlags,
    records: Vec<RumRecord>,
    outgoing_if: InterfaceIndex,
    mtu: u16,
) -> Vec<OutboundPacket> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut header = base_header(Command::RouteUpdate, RuSubCommand::Response, RequestType::None);
    header.flags = header_flags;
    crate::wire::pack_rum_packets(header, &records, mtu)
        .into_iter()
        .map(|packet| OutboundPacket {
            interface: outgoing_if,
            packet,
        })
        .collect()
}

/// Emits the full main table (minus split horizon / local-host) on
/// every `(interface, mtu)` pair, then bumps local-origin sequence
/// numbers and clears every `changed` flag (spec §4.5).
pub fn periodic_update(
    route_table: &mut RouteTable,
    interfaces: &[(InterfaceIndex, u16)],
    cfg: &RouterConfig,
) -> Vec<OutboundPacket> {
    route_table.bump_local_sequences();
    let mut out = Vec::new();
    for &(iface, mtu) in interfaces {
        let records = advertisable_records(route_table, iface, cfg.split_horizon, false);
        out.extend(pack_for_interfaces(
            AdvertisementFlags::empty().with(AdvertisementFlags::PERIODIC),
            records,
            iface,
            mtu,
        ));
    }
    route_table.clear_changed_flags();
    out
}

/// Emits only the routes marked `changed` on every interface (spec
/// §4.5 Triggered).
pub fn triggered_update(
    route_table: &mut RouteTable,
    interfaces: &[(InterfaceIndex, u16)],
    cfg: &RouterConfig,
) -> Vec<OutboundPacket> {
    let mut out = Vec::new();
    for &(iface, mtu) in interfaces {
        let records = advertisable_records(route_table, iface, cfg.split_horizon, true);
        out.extend(pack_for_interfaces(
            AdvertisementFlags::empty().with(AdvertisementFlags::TRIGGERED),
            records,
            iface,
            mtu,
        ));
    }
    route_table.clear_changed_flags();
    out
}

/// Bypasses cooldown entirely: one packet per remaining interface
/// poisoning `prefixes` with metric 0 and the Disconnected bit set
/// (spec §4.5 Fast-triggered).
pub fn fast_triggered_update(
    prefixes: &[Ipv4Prefix],
    remaining_interfaces: &[InterfaceIndex],
) -> Vec<OutboundPacket> {
    if prefixes.is_empty() {
        return Vec::new();
    }
    let records: Vec<RumRecord> = prefixes
        .iter()
        .map(|p| RumRecord {
            seq: crate::types::SequenceNumber::ZERO,
            metric: Metric::ZERO,
            tag: 0,
            prefix: *p,
        })
        .collect();
    let flags = AdvertisementFlags::empty()
        .with(AdvertisementFlags::FAST_TRIGGERED)
        .with(AdvertisementFlags::DISCONNECTED);
    let mut header = base_header(Command::RouteUpdate, RuSubCommand::Response, RequestType::None);
    header.flags = flags;
    header.count = records.len() as u8;
    remaining_interfaces
        .iter()
        .map(|&iface| OutboundPacket {
            interface: iface,
            packet: Packet::RouteUpdate {
                header,
                records: records.clone(),
            },
        })
        .collect()
}

/// A pull request for orphaned prefixes after an interface goes down
/// (spec §4.3.4/§4.5 Route pull).
pub fn route_pull_request(
    orphaned: &[Ipv4Prefix],
    remaining_interfaces: &[InterfaceIndex],
) -> Vec<OutboundPacket> {
    if orphaned.is_empty() {
        return Vec::new();
    }
    let records: Vec<RumRecord> = orphaned
        .iter()
        .map(|p| RumRecord {
            seq: crate::types::SequenceNumber::ZERO,
            metric: Metric::ZERO,
            tag: 0,
            prefix: *p,
        })
        .collect();
    let mut header = base_header(Command::RouteUpdate, RuSubCommand::Request, RequestType::NEntries);
    header.count = records.len() as u8;
    remaining_interfaces
        .iter()
        .map(|&iface| OutboundPacket {
            interface: iface,
            packet: Packet::RouteUpdate {
                header: header.clone(),
                records: records.clone(),
            },
        })
        .collect()
}

/// Reply to a neighbor-discovery or entire-table request (spec §4.2,
/// §4.3.4): the whole main table, split horizon always applied.
pub fn entire_table_reply(
    route_table: &RouteTable,
    outgoing_if: InterfaceIndex,
    mtu: u16,
) -> Vec<OutboundPacket> {
    let records = advertisable_records(route_table, outgoing_if, SplitHorizon::On, false);
    pack_for_interfaces(
        AdvertisementFlags::empty(),
        records,
        outgoing_if,
        mtu,
    )
}

fn hello_reply(neighbor_id: crate::types::NeighborId, gateway: Ipv4Addr, gateway_mask: Ipv4Addr) -> Packet {
    let mut header = base_header(Command::KeepAlive, RuSubCommand::None, RequestType::None);
    header.count = 1;
    Packet::KeepAlive {
        header,
        records: vec![KamRecord {
            kind: KamKind::Hello,
            auth: KamAuth {
                auth_type: 0,
                auth_data: 0,
                identifier: 0,
            },
            neighbor_id,
            gateway,
            gateway_mask,
        }],
    }
}

/// Unsolicited Hello broadcast on one interface, announcing this
/// router's own identity and address — spec §4.6 `interfaceUp(i)`:
/// "add local-host route, schedule a hello on that interface, trigger
/// an update". Grounded on the teacher's
/// `SendHelloMessageForInterface`, which is structurally this same
/// packet, just sent unprompted rather than in reply to a peer's Hello.
pub fn hello_broadcast(router_id: NeighborId, local_address: Ipv4Addr, local_mask: Ipv4Addr) -> Packet {
    hello_reply(router_id, local_address, local_mask)
}

/// One Hi keep-alive per already-established neighbor (spec §4.2's
/// sender side of `onHi`; spec §6 `kamInterval`). Grounded on the
/// teacher's `sendKams`, which iterates the neighbor table rather than
/// interfaces — a Hi is addressed to a neighbor, not broadcast blind.
pub fn keep_alive_update(
    neighbor_table: &NeighborTable,
    router_id: NeighborId,
    host: &impl HostStack,
) -> Vec<OutboundPacket> {
    neighbor_table
        .iter_valid()
        .filter_map(|neighbor| {
            let local = host.addresses(neighbor.interface).into_iter().next()?;
            let mut header = base_header(Command::KeepAlive, RuSubCommand::None, RequestType::None);
            header.count = 1;
            Some(OutboundPacket {
                interface: neighbor.interface,
                packet: Packet::KeepAlive {
                    header,
                    records: vec![KamRecord {
                        kind: KamKind::Hi,
                        auth: KamAuth {
                            auth_type: 0,
                            auth_data: 0,
                            identifier: 0,
                        },
                        neighbor_id: router_id,
                        gateway: local.address,
                        gateway_mask: local.mask,
                    }],
                },
            })
        })
        .collect()
}

fn discovery_request(outgoing_if: InterfaceIndex) -> OutboundPacket {
    let mut header = base_header(Command::RouteUpdate, RuSubCommand::Request, RequestType::NeighborDiscovery);
    header.count = 0;
    OutboundPacket {
        interface: outgoing_if,
        packet: Packet::RouteUpdate {
            header,
            records: vec![],
        },
    }
}

/// Handles one incoming Hello/Hi KAM record (spec §4.2), returning
/// whatever reply packets the outcome calls for.
#[instrument(skip(neighbor_table, kam, cfg))]
pub fn handle_kam(
    neighbor_table: &mut NeighborTable,
    interface: InterfaceIndex,
    kam: &KamRecord,
    now: Timestamp,
    cfg: &RouterConfig,
) -> Vec<OutboundPacket> {
    match kam.kind {
        KamKind::Hello => {
            let outcome = neighbor_table.on_hello(
                interface,
                kam,
                now,
                cfg.neighbor_timeout_delay,
                cfg.route_jitter,
            );
            match outcome {
                NeighborOutcome::SendHelloReplyAndDiscover { key, interface } => vec![
                    OutboundPacket {
                        interface,
                        packet: hello_reply(key.id, kam.gateway, kam.gateway_mask),
                    },
                    discovery_request(interface),
                ],
                _ => vec![],
            }
        }
        KamKind::Hi => {
            neighbor_table.on_hi(kam, now, cfg.neighbor_timeout_delay, cfg.route_jitter);
            vec![]
        }
    }
}

/// Admits one Response RUM, given the already-computed per-hop cost for
/// the ingress interface (spec §4.3.1, §4.4).
pub fn admit_rum(
    route_table: &mut RouteTable,
    prefix: Ipv4Prefix,
    sender: Ipv4Addr,
    interface: InterfaceIndex,
    per_hop_cost: Metric,
    rum: &RumRecord,
    now: Timestamp,
    cfg: &RouterConfig,
) -> RouteOutcome {
    let metric = rum.metric.saturating_add(per_hop_cost);
    route_table.admit(
        prefix,
        sender,
        interface,
        metric,
        rum.seq.next_received(),
        now,
        &timing(cfg),
    )
}

/// Applies an interface-down event against every route routed through
/// that interface (spec §4.3.3 reason = Broken, §4.6).
pub fn invalidate_interface(
    route_table: &mut RouteTable,
    interface: InterfaceIndex,
    now: Timestamp,
    cfg: &RouterConfig,
) -> Vec<(Ipv4Prefix, RouteOutcome)> {
    let prefixes: Vec<Ipv4Prefix> = route_table
        .main_records()
        .filter(|(_, r)| r.interface == interface && r.validity == Validity::Valid)
        .map(|(p, _)| *p)
        .collect();
    let timing = timing(cfg);
    prefixes
        .into_iter()
        .map(|p| {
            let outcome = route_table.invalidate(p, InvalidateReason::Broken, now, &timing);
            (p, outcome)
        })
        .collect()
}

/// Invalidates every route whose next-hop is `neighbor_address` (spec
/// §4.2 `expire`, §4.3.3 reason = Broken).
pub fn invalidate_neighbor_routes(
    route_table: &mut RouteTable,
    neighbor_key: NeighborKey,
    now: Timestamp,
    cfg: &RouterConfig,
) -> Vec<(Ipv4Prefix, RouteOutcome)> {
    let prefixes: Vec<Ipv4Prefix> = route_table
        .main_records()
        .filter(|(_, r)| r.next_hop == neighbor_key.address && r.validity == Validity::Valid)
        .map(|(p, _)| *p)
        .collect();
    if prefixes.is_empty() {
        warn!(neighbor = ?neighbor_key.id, "neighbor expired with no dependent routes");
    }
    let timing = timing(cfg);
    prefixes
        .into_iter()
        .map(|p| {
            let outcome = route_table.invalidate(p, InvalidateReason::Broken, now, &timing);
            (p, outcome)
        })
        .collect()
}

/// Drop reasons checked before any table mutation (spec §7 policy
/// rejections). Loop suppression and excluded-interface checks live
/// here since they need no table state.
pub fn should_accept(
    source: Ipv4Addr,
    interface: InterfaceIndex,
    local_addresses: &[Ipv4Addr],
    cfg: &RouterConfig,
    drops: &DropCounters,
) -> bool {
    if local_addresses.contains(&source) {
        drops.record_loopback_source();
        return false;
    }
    if cfg.is_excluded(interface) {
        drops.record_excluded_interface();
        return false;
    }
    true
}
