//! Storage for the dual routing table (spec §3, §4.3).
//!
//! Main and backup are modeled as one `RouteEntry` per destination
//! prefix rather than two separate maps, because every operation in
//! §4.3 touches both sides of a destination together; keeping them in
//! one entry makes the "main and its Primary backup always agree on
//! next-hop/interface/seq" invariant a property of the data layout
//! instead of something call sites have to maintain by hand.

use crate::scheduler::{EventId, Scheduler, Timestamp};
use crate::types::{InterfaceIndex, Ipv4Prefix, Metric, SequenceNumber};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which dual-table slot a record occupies (spec §3 table invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Main,
    Primary,
    Secondary,
}

/// Validity state of a route record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    Disconnected,
    LocalHost,
    Void,
}

/// What a route timer fires into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Ordinary route expiry (spec §4.3.3, reason = Expire). A Secondary
    /// carries this same purpose (spec §4.3.1 case 2) rather than a
    /// settling timer of its own — it only reaches Main via the
    /// metric-compared adoption in [`super::invalidate`]'s Expire branch.
    Expire,
    /// Garbage-collection delay elapsed after invalidation.
    GarbageCollect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteAction {
    pub prefix: Ipv4Prefix,
    pub slot: Slot,
    pub purpose: Purpose,
}

/// Durations the dual table needs for its own timers (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct RouteTiming {
    pub settling_time: Duration,
    pub timeout_delay: Duration,
    pub garbage_collection_delay: Duration,
    pub route_jitter_max: Duration,
    pub gc_jitter_max: Duration,
}

/// One route record, whether it lives in the main slot or a backup
/// slot (spec §3, Route record).
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub next_hop: Ipv4Addr,
    pub interface: InterfaceIndex,
    pub metric: Metric,
    pub seq: SequenceNumber,
    pub validity: Validity,
    pub changed: bool,
    /// True for routes this router itself originates (local-host
    /// interfaces and server-attached prefixes, spec §4.5 "local origin
    /// routes"): these bump their sequence number on periodic transmit
    /// instead of carrying a propagated one.
    pub locally_originated: bool,
    pub(super) timer: Option<EventId>,
    /// Deadline of `timer`, kept alongside the handle so invalidation can
    /// tell whether a sibling record (e.g. the Primary backup when the
    /// main record expires) is itself stale without a scheduler lookup
    /// (spec §4.3.3: "if that replacement itself is stale").
    pub(super) deadline: Option<Timestamp>,
}

impl RouteRecord {
    pub(super) fn new(
        next_hop: Ipv4Addr,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        validity: Validity,
    ) -> Self {
        RouteRecord {
            next_hop,
            interface,
            metric,
            seq,
            validity,
            changed: true,
            locally_originated: false,
            timer: None,
            deadline: None,
        }
    }

    pub(super) fn is_stale(&self, now: Timestamp) -> bool {
        match self.deadline {
            Some(d) => d <= now,
            None => true,
        }
    }
}

/// The three slots a destination prefix may occupy (spec §3 table
/// invariants: one main, one Primary backup, zero-or-one Secondary).
#[derive(Debug, Default, Clone)]
pub struct RouteEntry {
    pub main: Option<RouteRecord>,
    pub primary: Option<RouteRecord>,
    pub secondary: Option<RouteRecord>,
}

impl RouteEntry {
    fn is_empty(&self) -> bool {
        self.main.is_none() && self.primary.is_none() && self.secondary.is_none()
    }
}

/// The dual routing table (spec §4.3).
#[derive(Debug, Default)]
pub struct RouteTable {
    pub(super) entries: HashMap<Ipv4Prefix, RouteEntry>,
    /// Main-table insertion/update order, most-recently-admitted first
    /// (spec §4.3.4: forwarding ties are broken this way).
    pub(super) order: Vec<Ipv4Prefix>,
    pub(super) timers: Scheduler<RouteAction>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prefix: &Ipv4Prefix) -> Option<&RouteEntry> {
        self.entries.get(prefix)
    }

    /// Every destination's full `{main, primary, secondary}` entry, in
    /// no particular order — for debug dumps (spec §6 `printingMethod`),
    /// not the forwarding path (use [`RouteTable::main_records`] or
    /// [`RouteTable::lookup`] for that).
    pub fn entries(&self) -> impl Iterator<Item = (&Ipv4Prefix, &RouteEntry)> {
        self.entries.iter()
    }

    /// All main-table records, in forwarding scan order (most recently
    /// admitted first).
    pub fn main_records(&self) -> impl Iterator<Item = (&Ipv4Prefix, &RouteRecord)> {
        self.order.iter().filter_map(move |p| {
            self.entries
                .get(p)
                .and_then(|e| e.main.as_ref())
                .map(|r| (p, r))
        })
    }

    pub(super) fn touch_order(&mut self, prefix: Ipv4Prefix) {
        self.order.retain(|p| p != &prefix);
        self.order.insert(0, prefix);
    }

    pub(super) fn entry_mut(&mut self, prefix: Ipv4Prefix) -> &mut RouteEntry {
        self.entries.entry(prefix).or_default()
    }

    pub(super) fn schedule(
        &mut self,
        old: Option<EventId>,
        deadline: Timestamp,
        action: RouteAction,
    ) -> EventId {
        self.timers.reschedule(old, deadline, action)
    }

    pub(super) fn cancel(&mut self, id: Option<EventId>) {
        if let Some(id) = id {
            self.timers.cancel(id);
        }
    }

    /// Installs a non-expiring local-host route (spec §3): "never
    /// advertised... never demoted", so it carries no timer and no
    /// backup mirror.
    pub fn install_local_host(&mut self, prefix: Ipv4Prefix, interface: InterfaceIndex) {
        let mut record = RouteRecord::new(
            Ipv4Addr::UNSPECIFIED,
            interface,
            Metric::ZERO,
            SequenceNumber::ZERO,
            Validity::LocalHost,
        );
        record.locally_originated = true;
        self.entry_mut(prefix).main = Some(record);
        self.touch_order(prefix);
    }

    /// Installs or refreshes the route representing a server's own
    /// prefix, whose metric comes from the server's SRC-reported load
    /// rather than a peer's RUM (spec §4.4, §4.6, S6). Unlike
    /// local-host routes, server routes are ordinary, advertised
    /// `Valid` routes; this router is simply their origin.
    pub fn update_server_metric(
        &mut self,
        prefix: Ipv4Prefix,
        server_address: Ipv4Addr,
        interface: InterfaceIndex,
        metric: Metric,
    ) {
        let entry = self.entry_mut(prefix);
        match entry.main.as_mut() {
            Some(main) if main.locally_originated => {
                main.metric = metric;
                main.changed = true;
            }
            _ => {
                let mut record = RouteRecord::new(
                    server_address,
                    interface,
                    metric,
                    SequenceNumber::ZERO,
                    Validity::Valid,
                );
                record.locally_originated = true;
                entry.main = Some(record);
            }
        }
        self.touch_order(prefix);
    }

    /// Bumps the sequence number of every locally-originated, advertised
    /// main route (spec §4.5: "local origin routes increment their
    /// sequence by 2" on periodic transmit).
    pub fn bump_local_sequences(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(main) = entry.main.as_mut() {
                if main.locally_originated && main.validity != Validity::LocalHost {
                    main.seq = main.seq.next_local();
                }
            }
        }
    }

    /// Clears the `changed` flag on every main record (spec §4.5:
    /// "changed flags are cleared after transmit").
    pub fn clear_changed_flags(&mut self) {
        for entry in self.entries.values_mut() {
            if let Some(main) = entry.main.as_mut() {
                main.changed = false;
            }
        }
    }

    pub fn remove_local_host(&mut self, prefix: &Ipv4Prefix) {
        if let Some(entry) = self.entries.get_mut(prefix) {
            if matches!(entry.main.as_ref().map(|r| r.validity), Some(Validity::LocalHost)) {
                entry.main = None;
                if entry.is_empty() {
                    self.entries.remove(prefix);
                }
                self.order.retain(|p| p != prefix);
            }
        }
    }

    pub(super) fn prune_if_empty(&mut self, prefix: &Ipv4Prefix) {
        if self.entries.get(prefix).is_some_and(RouteEntry::is_empty) {
            self.entries.remove(prefix);
            self.order.retain(|p| p != prefix);
        }
    }

    /// Drains every route timer due at or before `now`, applying
    /// admission-independent effects (settling, expiry, GC). Returns one
    /// [`crate::route::RouteOutcome`] per action handled, for the
    /// engine to react to (triggering poison advertisements, etc.).
    pub fn advance(&mut self, now: Timestamp, timing: &RouteTiming) -> Vec<super::RouteOutcome> {
        let mut outcomes = Vec::new();
        while let Some((_, action)) = self.timers.pop_due(now) {
            outcomes.push(self.dispatch_timer(action, now, timing));
        }
        outcomes
    }
}
