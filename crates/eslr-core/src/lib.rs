//! Core distance-vector routing engine for ESLR (Enhanced Stability &
//! Load-balancing Routing).
//!
//! This crate is the protocol core only: wire codec, neighbor table,
//! dual routing table, metric evaluator, and the engine that ties them
//! together behind a [`host::HostStack`] seam. It does not own a
//! socket, a kernel FIB, or an executor — see DESIGN.md for why that
//! embedding layer is deliberately left to the host.

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod metric;
pub mod metrics;
pub mod neighbor;
pub mod route;
pub mod scheduler;
pub mod types;
pub mod wire;

use config::RouterConfig;
use engine::OutboundPacket;
use error::Result;
use host::HostStack;
use metrics::DropCounters;
use neighbor::{NeighborOutcome, NeighborRecord, NeighborState, NeighborTable};
use route::{ForwardingEntry, RouteInputOutcome, RouteOutcome, RouteRecord, RouteTable};
use scheduler::{jittered, EventId, Scheduler, Timestamp};
use types::{InterfaceIndex, Ipv4Prefix};

use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// The engine's own timers, distinct from the per-record timers owned
/// by the neighbor and route tables (spec §5: each owning its own
/// scheduler instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineAction {
    Periodic,
    TriggeredCooldown,
    /// Send a Hi to every established neighbor (spec §6 `kamInterval`).
    KeepAlive,
}

/// What [`Router::dump`] hands back, shaped by `config.printing_method`
/// (spec §6). Formatting and printing it is the host's business.
#[derive(Debug, Clone)]
pub enum Dump {
    Off,
    Main(Vec<(Ipv4Prefix, RouteRecord)>),
    Backup(Vec<(Ipv4Prefix, Option<RouteRecord>, Option<RouteRecord>)>),
    Neighbor(Vec<NeighborRecord>),
}

/// A whole ESLR router instance: its tables, its own update-scheduling
/// timers, and the host adapter it was built with.
pub struct Router<H: HostStack> {
    config: RouterConfig,
    neighbors: NeighborTable,
    routes: RouteTable,
    drops: DropCounters,
    host: H,
    timers: Scheduler<EngineAction>,
    periodic_timer: EventId,
    cooldown_timer: Option<EventId>,
    keep_alive_timer: EventId,
}

impl<H: HostStack> Router<H> {
    /// Builds a router and arms its first periodic update at
    /// `startupDelay` jitter (spec §6 `startupDelay`).
    pub fn new(config: RouterConfig, host: H) -> Result<Self> {
        config.validate()?;
        let mut timers = Scheduler::new();
        let first = jittered(Duration::ZERO, config.startup_delay);
        let periodic_timer = timers.schedule(first, EngineAction::Periodic);
        // First Hi rides the same startup jitter as the first periodic
        // update; every fire after that floors at `kam_interval` (see
        // the `EngineAction::KeepAlive` arm in `advance`).
        let first_keep_alive = jittered(Duration::ZERO, config.startup_delay);
        let keep_alive_timer = timers.schedule(first_keep_alive, EngineAction::KeepAlive);

        Ok(Router {
            config,
            neighbors: NeighborTable::new(),
            routes: RouteTable::new(),
            drops: DropCounters::default(),
            host,
            timers,
            periodic_timer,
            cooldown_timer: None,
            keep_alive_timer,
        })
    }

    pub fn drop_counters(&self) -> metrics::DropCountersSnapshot {
        self.drops.snapshot()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn active_interfaces(&self) -> Vec<(InterfaceIndex, u16)> {
        host::active_interfaces(&self.host, |i| self.config.is_excluded(i))
    }

    /// Schedules (or refreshes) the triggered-update cooldown, unless
    /// one is already pending (spec §4.5: "A second request within the
    /// cooldown is silently suppressed").
    fn arm_triggered_cooldown(&mut self, now: Timestamp) {
        if self.cooldown_timer.is_some() {
            return;
        }
        let deadline = jittered(
            now + self.config.min_triggered_cooldown,
            self.config.max_triggered_cooldown - self.config.min_triggered_cooldown,
        );
        self.cooldown_timer = Some(self.timers.schedule(deadline, EngineAction::TriggeredCooldown));
    }

    fn apply_route_outcomes(&mut self, now: Timestamp, outcomes: &[RouteOutcome]) -> Vec<OutboundPacket> {
        let mut pulls = Vec::new();
        let owes_update = outcomes.iter().any(|o| {
            matches!(
                o,
                RouteOutcome::Installed { .. }
                    | RouteOutcome::Repaired { .. }
                    | RouteOutcome::Disconnected { .. }
                    | RouteOutcome::Invalidated { .. }
            )
        });
        if owes_update {
            self.arm_triggered_cooldown(now);
        }
        let disconnected: Vec<Ipv4Prefix> = outcomes
            .iter()
            .filter_map(|o| match o {
                RouteOutcome::Disconnected { prefix } => Some(*prefix),
                _ => None,
            })
            .collect();
        if !disconnected.is_empty() {
            let remaining: Vec<InterfaceIndex> =
                self.active_interfaces().into_iter().map(|(i, _)| i).collect();
            pulls.extend(engine::fast_triggered_update(&disconnected, &remaining));
        }
        self.sync_host_fib(outcomes);
        pulls
    }

    /// Keeps the host FIB in step with the main table (spec §4.6: the
    /// host adapter's one write callback). A route becomes forwardable
    /// the moment it is installed or repaired, and stops being
    /// forwardable the moment it is marked Disconnected/Invalid — not
    /// only once garbage collection finally deletes the entry, since
    /// [`RouteTable::lookup`] already excludes both validities.
    fn sync_host_fib(&mut self, outcomes: &[RouteOutcome]) {
        for outcome in outcomes {
            match outcome {
                RouteOutcome::Installed { prefix } | RouteOutcome::Repaired { prefix, .. } => {
                    if let Some(main) = self.routes.get(prefix).and_then(|e| e.main.as_ref()) {
                        let entry = ForwardingEntry {
                            destination: prefix.network(),
                            gateway: main.next_hop,
                            interface: Some(main.interface),
                        };
                        self.host.install_route(entry, *prefix);
                    }
                }
                RouteOutcome::Disconnected { prefix }
                | RouteOutcome::Invalidated { prefix }
                | RouteOutcome::GarbageCollected { prefix } => {
                    self.host.remove_route(*prefix);
                }
                _ => {}
            }
        }
    }

    /// Dispatches one received ESLR packet (spec §4, §7). Decode
    /// failures, authentication failures, and policy rejections are
    /// dropped and counted; only an unbound-interface condition is
    /// surfaced as an error (spec §7).
    #[instrument(skip(self, bytes))]
    pub fn on_receive(
        &mut self,
        now: Timestamp,
        interface: InterfaceIndex,
        source: Ipv4Addr,
        bytes: &[u8],
    ) -> Result<Vec<OutboundPacket>> {
        if !self.host.is_up(interface) {
            return Err(error::EslrError::UnboundInterface(interface));
        }

        let local_addresses: Vec<Ipv4Addr> = self
            .host
            .addresses(interface)
            .into_iter()
            .map(|a| a.address)
            .collect();
        if !engine::should_accept(source, interface, &local_addresses, &self.config, &self.drops) {
            return Ok(vec![]);
        }

        let packet = match wire::decode(bytes) {
            Ok(p) => p,
            Err(_) => {
                self.drops.record_decode_error();
                return Ok(vec![]);
            }
        };

        match packet {
            wire::Packet::KeepAlive { records, .. } => {
                let mut out = Vec::new();
                for kam in &records {
                    out.extend(engine::handle_kam(
                        &mut self.neighbors,
                        interface,
                        kam,
                        now,
                        &self.config,
                    ));
                }
                Ok(out)
            }
            wire::Packet::RouteUpdate { header, records } => {
                self.handle_route_update(now, interface, source, header, records)
            }
            wire::Packet::ServerRouterCom { records, .. } => {
                for src in &records {
                    let prefix = Ipv4Prefix::new(src.server_address, src.mask);
                    let cost = metric::server_cost(
                        &metric::QueueStats {
                            service_rate: src.service_rate as f64,
                            arrival_rate: src.arrival_rate as f64,
                        },
                        &self.config.weights,
                    );
                    self.routes
                        .update_server_metric(prefix, src.server_address, interface, cost);
                    self.arm_triggered_cooldown(now);
                }
                Ok(vec![])
            }
        }
    }

    fn handle_route_update(
        &mut self,
        now: Timestamp,
        interface: InterfaceIndex,
        source: Ipv4Addr,
        header: wire::Header,
        records: Vec<wire::RumRecord>,
    ) -> Result<Vec<OutboundPacket>> {
        match header.ru_subcommand {
            wire::RuSubCommand::Request => {
                if header.request_type.wants_entire_table() {
                    Ok(engine::entire_table_reply(
                        &self.routes,
                        interface,
                        self.host.mtu(interface),
                    ))
                } else {
                    Ok(vec![])
                }
            }
            wire::RuSubCommand::Response => {
                if !self.neighbors.authenticate_by_address(source, header.auth_type, header.auth_data) {
                    self.drops.record_authentication_failure();
                    return Ok(vec![]);
                }
                let Some(neighbor) = self.neighbors.find_by_address(source) else {
                    self.drops.record_unknown_neighbor();
                    return Ok(vec![]);
                };
                let key = neighbor.key;
                let mut out = Vec::new();
                // A Response from a still-Void neighbor is this node's
                // first reply to its own discovery request: promote it
                // and reply with the whole main table (spec §4.2
                // `onNeighborDiscoveryReply`).
                if neighbor.state == NeighborState::Void {
                    let outcome = self.neighbors.on_neighbor_discovery_reply(
                        key,
                        now,
                        self.config.neighbor_timeout_delay,
                        self.config.route_jitter,
                    );
                    if let NeighborOutcome::PromotedRequestEntireTable { interface: out_if, .. } = outcome {
                        out.extend(engine::entire_table_reply(&self.routes, out_if, self.host.mtu(out_if)));
                    }
                }

                let net_device = self.host.net_device(interface);
                let link = metric::LinkStats {
                    propagation_delay: net_device.propagation_delay,
                    average_packet_bits: net_device.average_packet_bits,
                    channel_datarate: net_device.datarate,
                    channel_load: net_device.peer_channel_load,
                };
                let cost = metric::per_hop_cost(&link, None, &self.config.weights);

                let mut outcomes = Vec::new();
                for rum in &records {
                    if header.flags.contains(wire::AdvertisementFlags::DISCONNECTED) {
                        let outcome = self.routes.invalidate(
                            rum.prefix,
                            types::InvalidateReason::Broken,
                            now,
                            &engine::timing(&self.config),
                        );
                        outcomes.push(outcome);
                        continue;
                    }
                    let outcome = engine::admit_rum(
                        &mut self.routes,
                        rum.prefix,
                        source,
                        interface,
                        cost,
                        rum,
                        now,
                        &self.config,
                    );
                    if matches!(outcome, RouteOutcome::Rejected { .. }) {
                        self.drops.record_stale_sequence();
                    }
                    outcomes.push(outcome);
                }
                out.extend(self.apply_route_outcomes(now, &outcomes));
                Ok(out)
            }
            wire::RuSubCommand::None => Ok(vec![]),
        }
    }

    /// spec §4.6 `interfaceUp(i)`.
    #[instrument(skip(self))]
    pub fn notify_interface_up(&mut self, now: Timestamp, interface: InterfaceIndex) -> Vec<OutboundPacket> {
        let addresses = self.host.addresses(interface);
        for addr in &addresses {
            let prefix = Ipv4Prefix::new(addr.address, addr.mask);
            self.routes.install_local_host(prefix, interface);
        }
        info!(interface = %interface, "interface up");
        self.arm_triggered_cooldown(now);

        // spec §4.6: "schedule a hello on that interface" — announce
        // this router unprompted rather than waiting for a peer's own
        // Hello to prompt a reply.
        addresses
            .into_iter()
            .next()
            .map(|addr| OutboundPacket {
                interface,
                packet: engine::hello_broadcast(self.config.router_id, addr.address, addr.mask),
            })
            .into_iter()
            .collect()
    }

    /// spec §4.6 `interfaceDown(i)`.
    #[instrument(skip(self))]
    pub fn notify_interface_down(&mut self, now: Timestamp, interface: InterfaceIndex) -> Vec<OutboundPacket> {
        let orphaned_without_backup: Vec<Ipv4Prefix> = self
            .routes
            .main_records()
            .filter(|(_, r)| r.interface == interface)
            .filter(|(p, _)| self.routes.get(p).is_some_and(|e| e.secondary.is_none()))
            .map(|(p, _)| *p)
            .collect();

        let results = engine::invalidate_interface(&mut self.routes, interface, now, &self.config);
        let outcomes: Vec<RouteOutcome> = results.into_iter().map(|(_, o)| o).collect();
        warn!(interface = %interface, routes_affected = outcomes.len(), "interface down");

        let mut out = self.apply_route_outcomes(now, &outcomes);
        let remaining: Vec<InterfaceIndex> = self
            .active_interfaces()
            .into_iter()
            .map(|(i, _)| i)
            .filter(|&i| i != interface)
            .collect();
        out.extend(engine::route_pull_request(&orphaned_without_backup, &remaining));
        out
    }

    /// spec §4.6 `addressAdded(i, a)` / `addressRemoved(i, a)`.
    #[instrument(skip(self))]
    pub fn notify_address_added(&mut self, now: Timestamp, interface: InterfaceIndex, address: Ipv4Addr, mask: Ipv4Addr) -> Vec<OutboundPacket> {
        let prefix = Ipv4Prefix::new(address, mask);
        self.routes.install_local_host(prefix, interface);
        self.arm_triggered_cooldown(now);
        vec![]
    }

    pub fn notify_address_removed(&mut self, now: Timestamp, address: Ipv4Addr, mask: Ipv4Addr) -> Vec<OutboundPacket> {
        let prefix = Ipv4Prefix::new(address, mask);
        self.routes.remove_local_host(&prefix);
        self.arm_triggered_cooldown(now);
        vec![]
    }

    /// Resolves a forwarding entry for `destination` (spec §6
    /// `routeOutput`).
    pub fn route_output(&self, destination: Ipv4Addr) -> Option<ForwardingEntry> {
        self.routes.lookup(destination)
    }

    /// spec §6 `routeInput(src, dst, ingressIf)`: the asymmetric
    /// counterpart of `routeOutput` used on the forwarding path. Unlike
    /// `routeOutput`, a destination matching one of this router's own
    /// addresses is delivered locally rather than looked up in the main
    /// table, and multicast is declined outright rather than handed a
    /// zero-gateway entry (ESLR does not install multicast routes,
    /// spec §1 Non-goals).
    pub fn route_input(
        &self,
        _source: Ipv4Addr,
        destination: Ipv4Addr,
        ingress_if: InterfaceIndex,
    ) -> RouteInputOutcome {
        if destination.is_multicast() {
            return RouteInputOutcome::NoRoute;
        }
        if !self.host.is_up(ingress_if) {
            return RouteInputOutcome::NoRoute;
        }

        let is_local = (0..self.host.interfaces_count())
            .map(InterfaceIndex)
            .any(|i| self.host.addresses(i).iter().any(|a| a.address == destination));
        if is_local {
            return RouteInputOutcome::Deliver;
        }

        match self.routes.lookup(destination) {
            Some(entry) => RouteInputOutcome::Forward(entry),
            None => RouteInputOutcome::NoRoute,
        }
    }

    /// A debug snapshot of whichever table `config.printing_method`
    /// selects (spec §6). The periodic debug printer itself is a host
    /// concern (spec §1); this only hands back the data to print.
    pub fn dump(&self) -> Dump {
        match self.config.printing_method {
            config::PrintingMethod::Off => Dump::Off,
            config::PrintingMethod::Main => Dump::Main(
                self.routes
                    .main_records()
                    .map(|(p, r)| (*p, r.clone()))
                    .collect(),
            ),
            config::PrintingMethod::Backup => Dump::Backup(
                self.routes
                    .entries()
                    .map(|(p, e)| (*p, e.primary.clone(), e.secondary.clone()))
                    .collect(),
            ),
            config::PrintingMethod::Neighbor => {
                Dump::Neighbor(self.neighbors.iter().cloned().collect())
            }
        }
    }

    /// Drains every due timer (neighbor, route, and engine-level) at
    /// `now`, returning whatever packets the resulting outcomes call
    /// for. A host calls this whenever [`scheduler::Scheduler::next_deadline`]-
    /// style bookkeeping says something is due, or simply on its own
    /// tick.
    #[instrument(skip(self))]
    pub fn advance(&mut self, now: Timestamp) -> Vec<OutboundPacket> {
        let mut out = Vec::new();

        let neighbor_outcomes = self.neighbors.advance(
            now,
            self.config.garbage_collection_delay,
            self.config.gc_jitter,
        );
        for outcome in &neighbor_outcomes {
            if let NeighborOutcome::Expired { key } = outcome {
                let results = engine::invalidate_neighbor_routes(&mut self.routes, *key, now, &self.config);
                let outcomes: Vec<RouteOutcome> = results.into_iter().map(|(_, o)| o).collect();
                out.extend(self.apply_route_outcomes(now, &outcomes));
            }
        }

        let route_outcomes = self.routes.advance(now, &engine::timing(&self.config));
        out.extend(self.apply_route_outcomes(now, &route_outcomes));

        while let Some((id, action)) = self.timers.pop_due(now) {
            match action {
                EngineAction::Periodic => {
                    let interfaces = self.active_interfaces();
                    out.extend(engine::periodic_update(&mut self.routes, &interfaces, &self.config));
                    // A periodic update cancels any pending triggered
                    // cooldown (spec §4.5).
                    if let Some(cooldown) = self.cooldown_timer.take() {
                        self.timers.cancel(cooldown);
                    }
                    let deadline = jittered(now + self.config.periodic_update_delay, self.config.periodic_update_delay);
                    self.periodic_timer = self.timers.schedule(deadline, EngineAction::Periodic);
                }
                EngineAction::TriggeredCooldown => {
                    if self.cooldown_timer == Some(id) {
                        self.cooldown_timer = None;
                    }
                    let interfaces = self.active_interfaces();
                    out.extend(engine::triggered_update(&mut self.routes, &interfaces, &self.config));
                }
                EngineAction::KeepAlive => {
                    out.extend(engine::keep_alive_update(&self.neighbors, self.config.router_id, &self.host));
                    let deadline = jittered(now + self.config.kam_interval, self.config.kam_interval);
                    self.keep_alive_timer = self.timers.schedule(deadline, EngineAction::KeepAlive);
                }
            }
        }

        out
    }
}
