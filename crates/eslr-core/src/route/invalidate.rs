//! Invalidation and repair (spec §4.3.3) — the asymmetric handling of
//! expiration ("soft failure": prefer the existing primary, upgrade
//! only on evidence of a better alternate) versus brokenness ("hard
//! failure": take any alternate).

use super::table::{Purpose, RouteAction, RouteRecord, RouteTable, RouteTiming, Slot, Validity};
use super::RouteOutcome;
use crate::scheduler::{jittered, Timestamp};
use crate::types::{InvalidateReason, Ipv4Prefix};

impl RouteTable {
    pub(super) fn dispatch_timer(
        &mut self,
        action: RouteAction,
        now: Timestamp,
        timing: &RouteTiming,
    ) -> RouteOutcome {
        match action.purpose {
            Purpose::Expire => match action.slot {
                Slot::Main => self.invalidate(action.prefix, InvalidateReason::Expire, now, timing),
                Slot::Secondary => self.secondary_natural_expiry(action.prefix),
                Slot::Primary => RouteOutcome::Rejected {
                    prefix: action.prefix,
                },
            },
            Purpose::GarbageCollect => self.garbage_collect(action.prefix),
        }
    }

    /// Invokes §4.3.3 repair for `prefix`. `reason` is `Expire` when this
    /// is called from the main record's own timer firing, and `Broken`
    /// when called directly by the engine on an interface-down or
    /// disconnected-prefix event.
    pub fn invalidate(
        &mut self,
        prefix: Ipv4Prefix,
        reason: InvalidateReason,
        now: Timestamp,
        timing: &RouteTiming,
    ) -> RouteOutcome {
        let Some(entry) = self.entries.get(&prefix) else {
            return RouteOutcome::Rejected { prefix };
        };
        if entry.main.is_none() {
            return RouteOutcome::Rejected { prefix };
        }
        let primary = entry.primary.clone();
        let secondary = entry.secondary.clone();

        match reason {
            InvalidateReason::Broken => {
                if secondary.is_some() {
                    self.adopt_secondary(prefix, now, timing);
                    RouteOutcome::Repaired { prefix, reason }
                } else {
                    self.mark_invalid(prefix, Validity::Disconnected, now, timing);
                    RouteOutcome::Disconnected { prefix }
                }
            }
            InvalidateReason::Expire => match (primary, secondary) {
                (Some(p), None) => {
                    if p.is_stale(now) {
                        self.mark_invalid(prefix, Validity::Invalid, now, timing);
                        RouteOutcome::Invalidated { prefix }
                    } else {
                        self.resync_main_from_primary(prefix, now, timing);
                        RouteOutcome::Resynced { prefix }
                    }
                }
                (Some(p), Some(s)) if p.metric <= s.metric => {
                    // S is left for its own expiry: its timer is untouched.
                    if p.is_stale(now) {
                        self.mark_invalid(prefix, Validity::Invalid, now, timing);
                        RouteOutcome::Invalidated { prefix }
                    } else {
                        self.resync_main_from_primary(prefix, now, timing);
                        RouteOutcome::Resynced { prefix }
                    }
                }
                (Some(_), Some(_)) => {
                    // Secondary is strictly better: adopt it.
                    self.adopt_secondary(prefix, now, timing);
                    RouteOutcome::Repaired { prefix, reason }
                }
                (None, _) => {
                    // Invariant violation recovery: no primary to fall
                    // back on, so invalidate outright.
                    self.mark_invalid(prefix, Validity::Invalid, now, timing);
                    RouteOutcome::Invalidated { prefix }
                }
            },
        }
    }

    fn resync_main_from_primary(&mut self, prefix: Ipv4Prefix, now: Timestamp, timing: &RouteTiming) {
        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);
        let entry = self.entries.get(&prefix).expect("checked by caller");
        let primary = entry.primary.as_ref().expect("checked by caller").clone();
        let old_main_timer = entry.main.as_ref().and_then(|m| m.timer);

        let mut new_main = RouteRecord::new(
            primary.next_hop,
            primary.interface,
            primary.metric,
            primary.seq,
            Validity::Valid,
        );
        new_main.timer = Some(self.schedule(
            old_main_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Main,
                purpose: Purpose::Expire,
            },
        ));
        new_main.deadline = Some(deadline);
        self.entries.get_mut(&prefix).expect("checked by caller").main = Some(new_main);
        self.touch_order(prefix);
    }

    fn adopt_secondary(&mut self, prefix: Ipv4Prefix, now: Timestamp, timing: &RouteTiming) {
        let entry = self.entries.get(&prefix).expect("checked by caller");
        let secondary = entry.secondary.as_ref().expect("checked by caller").clone();
        let old_main_timer = entry.main.as_ref().and_then(|m| m.timer);
        let old_primary_timer = entry.primary.as_ref().and_then(|p| p.timer);

        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);

        let mut new_main = RouteRecord::new(
            secondary.next_hop,
            secondary.interface,
            secondary.metric,
            secondary.seq,
            Validity::Valid,
        );
        new_main.timer = Some(self.schedule(
            old_main_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Main,
                purpose: Purpose::Expire,
            },
        ));
        new_main.deadline = Some(deadline);

        let mut new_primary = RouteRecord::new(
            secondary.next_hop,
            secondary.interface,
            secondary.metric,
            secondary.seq,
            Validity::Valid,
        );
        new_primary.timer = Some(self.schedule(
            old_primary_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Primary,
                purpose: Purpose::Expire,
            },
        ));
        new_primary.deadline = Some(deadline);

        let entry = self.entries.get_mut(&prefix).expect("checked by caller");
        entry.main = Some(new_main);
        entry.primary = Some(new_primary);
        entry.secondary = None;
        self.touch_order(prefix);
    }

    fn mark_invalid(
        &mut self,
        prefix: Ipv4Prefix,
        validity: Validity,
        now: Timestamp,
        timing: &RouteTiming,
    ) {
        let deadline = jittered(now + timing.garbage_collection_delay, timing.gc_jitter_max);
        let entry = self.entries.get_mut(&prefix).expect("checked by caller");

        let old_primary_timer = entry.primary.as_ref().and_then(|p| p.timer);
        self.cancel(old_primary_timer);
        let old_main_timer = entry
            .main
            .as_ref()
            .and_then(|m| m.timer);

        let entry = self.entries.get_mut(&prefix).expect("checked by caller");
        if let Some(main) = entry.main.as_mut() {
            main.validity = validity;
            main.changed = true;
        }
        if let Some(primary) = entry.primary.as_mut() {
            primary.validity = validity;
            primary.changed = true;
            primary.timer = None;
            primary.deadline = None;
        }

        let gc_timer = self.schedule(
            old_main_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Main,
                purpose: Purpose::GarbageCollect,
            },
        );
        let entry = self.entries.get_mut(&prefix).expect("checked by caller");
        if let Some(main) = entry.main.as_mut() {
            main.timer = Some(gc_timer);
            main.deadline = Some(deadline);
        }
    }

    fn secondary_natural_expiry(&mut self, prefix: Ipv4Prefix) -> RouteOutcome {
        if let Some(entry) = self.entries.get_mut(&prefix) {
            entry.secondary = None;
        }
        self.prune_if_empty(&prefix);
        RouteOutcome::SecondaryExpired { prefix }
    }

    fn garbage_collect(&mut self, prefix: Ipv4Prefix) -> RouteOutcome {
        self.entries.remove(&prefix);
        self.order.retain(|p| p != &prefix);
        RouteOutcome::GarbageCollected { prefix }
    }
}
