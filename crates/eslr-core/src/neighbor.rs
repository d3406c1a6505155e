//! The neighbor table (spec §4.2): tracks peers through
//! `{Void, Valid, Invalid}`, owns hello-discovery and keep-alive timers.

use crate::scheduler::{jittered, EventId, Scheduler, Timestamp};
use crate::types::{InterfaceIndex, NeighborId};
use crate::wire::{AuthType, KamRecord};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a neighbor record (spec §4.2 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Seen once (a Hello), not yet confirmed by a discovery handshake.
    /// Invariant (b): may not be used as a next-hop or split-horizon
    /// source.
    Void,
    /// Confirmed. Invariant (c): only a Valid neighbor's route
    /// responses are accepted.
    Valid,
    /// Timed out; awaiting garbage collection.
    Invalid,
}

/// Key identifying a neighbor record (spec §3 invariant (a): "at most
/// one record per (neighborId, address)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeighborKey {
    pub id: NeighborId,
    pub address: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthCredential {
    pub auth_type: AuthType,
    pub auth_data: u16,
}

/// A peer router, as tracked by the neighbor table (spec §3, Neighbor
/// record).
#[derive(Debug, Clone)]
pub struct NeighborRecord {
    pub key: NeighborKey,
    pub mask: Ipv4Addr,
    pub interface: InterfaceIndex,
    pub auth: AuthCredential,
    pub state: NeighborState,
    timer: Option<EventId>,
}

impl NeighborRecord {
    pub fn id(&self) -> NeighborId {
        self.key.id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.key.address
    }
}

/// Action a neighbor timer fires into (paired 1:1 with an `EventId`,
/// spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeighborAction {
    /// A Void record's discovery window expired without promotion.
    VoidTimeout(NeighborKey),
    /// A Valid record's keep-alive window expired.
    ValidTimeout(NeighborKey),
    /// An Invalid record's garbage-collection delay elapsed.
    GarbageCollect(NeighborKey),
}

/// What the engine should do in response to a neighbor-table event.
/// The neighbor table never sends packets itself (spec §9: tables are
/// owned collections, not actors with side channels); it reports intent
/// and the engine carries it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborOutcome {
    /// Nothing changed (duplicate Hello, unmatched Hi, etc.).
    Ignored,
    /// A new Void record was created; the engine must send a Hello
    /// reply and a `NeighborDiscovery` pull request.
    SendHelloReplyAndDiscover { key: NeighborKey, interface: InterfaceIndex },
    /// A Void record was promoted to Valid; the engine must reply with
    /// the entire main table (split horizon still applies, spec §4.2).
    PromotedRequestEntireTable { key: NeighborKey, interface: InterfaceIndex },
    /// A Valid record's keep-alive was rearmed.
    KeepAliveRearmed { key: NeighborKey },
    /// A neighbor just transitioned Valid -> Invalid; the engine must
    /// invalidate routes whose next-hop is this neighbor's address
    /// (spec §4.3.3, reason = Broken).
    Expired { key: NeighborKey },
    /// A neighbor record was deleted after garbage collection.
    Deleted { key: NeighborKey },
}

/// The neighbor table (spec §4.2).
#[derive(Debug, Default)]
pub struct NeighborTable {
    records: HashMap<NeighborKey, NeighborRecord>,
    timers: Scheduler<NeighborAction>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: NeighborKey) -> Option<&NeighborRecord> {
        self.records.get(&key)
    }

    pub fn iter_valid(&self) -> impl Iterator<Item = &NeighborRecord> {
        self.records.values().filter(|n| n.state == NeighborState::Valid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborRecord> {
        self.records.values()
    }

    fn find_live(&self, id: NeighborId) -> Option<&NeighborRecord> {
        self.records
            .values()
            .find(|n| n.id() == id && n.state != NeighborState::Invalid)
    }

    /// Looks up a neighbor by its source address, for authenticating
    /// and admitting a Response RUM (spec §4.3.1, §7 "unknown
    /// neighbor" policy rejection).
    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<&NeighborRecord> {
        self.records.values().find(|n| n.address() == address)
    }

    /// Authentication keyed by source address rather than
    /// `(id, address)`, for packets (like Response RUMs) that do not
    /// carry a neighbor id of their own.
    pub fn authenticate_by_address(&self, address: Ipv4Addr, auth_type: AuthType, auth_data: u16) -> bool {
        match self.find_by_address(address) {
            Some(record) if record.state == NeighborState::Void => true,
            Some(record) if record.state == NeighborState::Valid => {
                record.auth.auth_type == auth_type && record.auth.auth_data == auth_data
            }
            _ => false,
        }
    }

    /// spec §4.2 `onHello`.
    #[instrument(skip(self, kam, timeout, jitter_max))]
    pub fn on_hello(
        &mut self,
        interface: InterfaceIndex,
        kam: &KamRecord,
        now: Timestamp,
        timeout: Duration,
        jitter_max: Duration,
    ) -> NeighborOutcome {
        if self.find_live(kam.neighbor_id).is_some() {
            debug!(neighbor = ?kam.neighbor_id, "duplicate Hello, ignoring");
            return NeighborOutcome::Ignored;
        }

        let key = NeighborKey {
            id: kam.neighbor_id,
            address: kam.gateway,
        };
        let deadline = jittered(now + timeout, jitter_max);
        let timer = self
            .timers
            .schedule(deadline, NeighborAction::VoidTimeout(key));

        self.records.insert(
            key,
            NeighborRecord {
                key,
                mask: kam.gateway_mask,
                interface,
                auth: AuthCredential {
                    auth_type: AuthType::Plaintext,
                    auth_data: kam.auth.auth_data,
                },
                state: NeighborState::Void,
                timer: Some(timer),
            },
        );
        info!(neighbor = ?key.id, address = %key.address, "neighbor entered Void state");

        NeighborOutcome::SendHelloReplyAndDiscover { key, interface }
    }

    /// spec §4.2 `onNeighborDiscoveryReply`.
    #[instrument(skip(self, timeout, jitter_max))]
    pub fn on_neighbor_discovery_reply(
        &mut self,
        key: NeighborKey,
        now: Timestamp,
        timeout: Duration,
        jitter_max: Duration,
    ) -> NeighborOutcome {
        let Some(record) = self.records.get_mut(&key) else {
            warn!(neighbor = ?key.id, "discovery reply from unknown neighbor");
            return NeighborOutcome::Ignored;
        };
        if record.state != NeighborState::Void {
            return NeighborOutcome::Ignored;
        }

        record.state = NeighborState::Valid;
        let deadline = jittered(now + timeout, jitter_max);
        record.timer = Some(self.timers.reschedule(
            record.timer,
            deadline,
            NeighborAction::ValidTimeout(key),
        ));
        info!(neighbor = ?key.id, address = %key.address, "neighbor promoted to Valid");

        NeighborOutcome::PromotedRequestEntireTable {
            key,
            interface: record.interface,
        }
    }

    /// spec §4.2 `onHi`.
    #[instrument(skip(self, kam, timeout, jitter_max))]
    pub fn on_hi(
        &mut self,
        kam: &KamRecord,
        now: Timestamp,
        timeout: Duration,
        jitter_max: Duration,
    ) -> NeighborOutcome {
        let key = NeighborKey {
            id: kam.neighbor_id,
            address: kam.gateway,
        };
        let Some(record) = self.records.get_mut(&key) else {
            return NeighborOutcome::Ignored;
        };
        if record.state != NeighborState::Valid {
            return NeighborOutcome::Ignored;
        }

        let deadline = jittered(now + timeout, jitter_max);
        record.timer = Some(self.timers.reschedule(
            record.timer,
            deadline,
            NeighborAction::ValidTimeout(key),
        ));
        NeighborOutcome::KeepAliveRearmed { key }
    }

    /// Authentication policy (spec §4.2): Void-state messages ignore
    /// auth; Valid-state responses require a match.
    pub fn authenticate(&self, key: NeighborKey, auth_type: AuthType, auth_data: u16) -> bool {
        match self.records.get(&key) {
            Some(record) if record.state == NeighborState::Void => true,
            Some(record) if record.state == NeighborState::Valid => {
                record.auth.auth_type == auth_type && record.auth.auth_data == auth_data
            }
            _ => false,
        }
    }

    /// Feeds a due timer action into the table. Returns the outcome the
    /// engine must act on (route invalidation on expiry, nothing on
    /// final deletion beyond bookkeeping).
    #[instrument(skip(self, gc_delay, gc_jitter_max))]
    fn handle_timer(
        &mut self,
        action: NeighborAction,
        now: Timestamp,
        gc_delay: Duration,
        gc_jitter_max: Duration,
    ) -> NeighborOutcome {
        match action {
            NeighborAction::VoidTimeout(key) => {
                self.records.remove(&key);
                debug!(neighbor = ?key.id, "Void neighbor timed out, deleted");
                NeighborOutcome::Deleted { key }
            }
            NeighborAction::ValidTimeout(key) => {
                let Some(record) = self.records.get_mut(&key) else {
                    return NeighborOutcome::Ignored;
                };
                record.state = NeighborState::Invalid;
                let deadline = jittered(now + gc_delay, gc_jitter_max);
                record.timer = Some(self.timers.reschedule(
                    record.timer,
                    deadline,
                    NeighborAction::GarbageCollect(key),
                ));
                warn!(neighbor = ?key.id, address = %key.address, "neighbor expired -> Invalid");
                NeighborOutcome::Expired { key }
            }
            NeighborAction::GarbageCollect(key) => {
                self.records.remove(&key);
                debug!(neighbor = ?key.id, "Invalid neighbor garbage collected");
                NeighborOutcome::Deleted { key }
            }
        }
    }

    /// Drains and applies every neighbor timer due at or before `now`.
    pub fn advance(
        &mut self,
        now: Timestamp,
        gc_delay: Duration,
        gc_jitter_max: Duration,
    ) -> Vec<NeighborOutcome> {
        let mut outcomes = Vec::new();
        while let Some((_, action)) = self.timers.pop_due(now) {
            outcomes.push(self.handle_timer(action, now, gc_delay, gc_jitter_max));
        }
        outcomes
    }
}
