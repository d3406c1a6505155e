//! Route admission on a Response RUM (spec §4.3.1).

use super::table::{Purpose, RouteAction, RouteRecord, RouteTable, RouteTiming, Slot, Validity};
use super::RouteOutcome;
use crate::scheduler::{jittered, Timestamp};
use crate::types::{InterfaceIndex, Ipv4Prefix, Metric, SequenceNumber};
use std::net::Ipv4Addr;

impl RouteTable {
    /// Admits a candidate route advertised by `sender` with effective
    /// metric `m = m_peer + c` (the caller has already added the local
    /// per-hop cost, spec §4.4).
    #[allow(clippy::too_many_arguments)]
    pub fn admit(
        &mut self,
        prefix: Ipv4Prefix,
        sender: Ipv4Addr,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        now: Timestamp,
        timing: &RouteTiming,
    ) -> RouteOutcome {
        let has_primary = self
            .entries
            .get(&prefix)
            .is_some_and(|e| e.primary.is_some());
        let has_secondary = self
            .entries
            .get(&prefix)
            .is_some_and(|e| e.secondary.is_some());

        match (has_primary, has_secondary) {
            (false, false) => {
                self.install_fresh(prefix, sender, interface, metric, seq, now, timing)
            }
            (true, false) => {
                let primary_next_hop = self.entries[&prefix].primary.as_ref().unwrap().next_hop;
                if sender == primary_next_hop {
                    self.refresh_primary(prefix, interface, metric, seq, now, timing);
                    RouteOutcome::PrimaryRefreshed { prefix }
                } else {
                    self.insert_secondary(prefix, sender, interface, metric, seq, now, timing);
                    RouteOutcome::SecondaryInserted { prefix }
                }
            }
            (true, true) => {
                let entry = &self.entries[&prefix];
                let primary_next_hop = entry.primary.as_ref().unwrap().next_hop;
                let secondary = entry.secondary.as_ref().unwrap();
                let secondary_next_hop = secondary.next_hop;
                let secondary_metric = secondary.metric;
                let secondary_seq = secondary.seq;

                if sender == primary_next_hop {
                    self.refresh_primary(prefix, interface, metric, seq, now, timing);
                    RouteOutcome::PrimaryRefreshed { prefix }
                } else if sender == secondary_next_hop {
                    if seq >= secondary_seq {
                        self.refresh_secondary(prefix, interface, metric, seq, now, timing);
                        RouteOutcome::SecondaryUpdated { prefix }
                    } else {
                        RouteOutcome::Rejected { prefix }
                    }
                } else if metric < secondary_metric && seq >= secondary_seq {
                    self.insert_secondary(prefix, sender, interface, metric, seq, now, timing);
                    RouteOutcome::SecondaryReplaced { prefix }
                } else {
                    RouteOutcome::Rejected { prefix }
                }
            }
        }
    }

    fn install_fresh(
        &mut self,
        prefix: Ipv4Prefix,
        sender: Ipv4Addr,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        now: Timestamp,
        timing: &RouteTiming,
    ) -> RouteOutcome {
        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);
        let mut main = RouteRecord::new(sender, interface, metric, seq, Validity::Valid);
        let mut primary = RouteRecord::new(sender, interface, metric, seq, Validity::Valid);
        main.timer = Some(self.schedule(
            None,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Main,
                purpose: Purpose::Expire,
            },
        ));
        main.deadline = Some(deadline);
        primary.timer = Some(self.schedule(
            None,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Primary,
                purpose: Purpose::Expire,
            },
        ));
        primary.deadline = Some(deadline);

        let entry = self.entry_mut(prefix);
        entry.main = Some(main);
        entry.primary = Some(primary);
        self.touch_order(prefix);
        RouteOutcome::Installed { prefix }
    }

    fn refresh_primary(
        &mut self,
        prefix: Ipv4Prefix,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        now: Timestamp,
        timing: &RouteTiming,
    ) {
        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);
        let entry = self.entries.get_mut(&prefix).expect("primary just checked");
        let primary = entry.primary.as_mut().expect("primary branch");
        let old_timer = primary.timer;
        primary.interface = interface;
        primary.metric = metric;
        primary.seq = seq;
        primary.changed = true;
        let new_timer = self.timers.reschedule(
            old_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Primary,
                purpose: Purpose::Expire,
            },
        );
        let entry = self.entries.get_mut(&prefix).expect("primary just checked");
        let primary = entry.primary.as_mut().expect("primary branch");
        primary.timer = Some(new_timer);
        primary.deadline = Some(deadline);
    }

    /// A Secondary never gets a settling timer of its own — spec §4.3.1
    /// case 2 arms it to invalidate at `timeoutDelay`, same as any other
    /// backup record; it only ever becomes Primary/Main through the
    /// metric-compared adoption in [`super::invalidate`]'s Expire branch.
    fn insert_secondary(
        &mut self,
        prefix: Ipv4Prefix,
        sender: Ipv4Addr,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        now: Timestamp,
        timing: &RouteTiming,
    ) {
        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);
        let old_timer = self
            .entries
            .get(&prefix)
            .and_then(|e| e.secondary.as_ref())
            .and_then(|r| r.timer);
        self.cancel(old_timer);
        let timer = self.timers.schedule(
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Secondary,
                purpose: Purpose::Expire,
            },
        );
        let mut record = RouteRecord::new(sender, interface, metric, seq, Validity::Valid);
        record.timer = Some(timer);
        record.deadline = Some(deadline);
        self.entry_mut(prefix).secondary = Some(record);
    }

    fn refresh_secondary(
        &mut self,
        prefix: Ipv4Prefix,
        interface: InterfaceIndex,
        metric: Metric,
        seq: SequenceNumber,
        now: Timestamp,
        timing: &RouteTiming,
    ) {
        let deadline = jittered(now + timing.timeout_delay, timing.route_jitter_max);
        let entry = self.entries.get_mut(&prefix).expect("secondary just checked");
        let secondary = entry.secondary.as_mut().expect("secondary branch");
        let old_timer = secondary.timer;
        secondary.interface = interface;
        secondary.metric = metric;
        secondary.seq = seq;
        secondary.changed = true;
        let new_timer = self.timers.reschedule(
            old_timer,
            deadline,
            RouteAction {
                prefix,
                slot: Slot::Secondary,
                purpose: Purpose::Expire,
            },
        );
        let entry = self.entries.get_mut(&prefix).expect("secondary just checked");
        let secondary = entry.secondary.as_mut().expect("secondary branch");
        secondary.timer = Some(new_timer);
        secondary.deadline = Some(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::super::RouteOutcome;
    use super::*;
    use std::time::Duration;

    fn timing() -> RouteTiming {
        RouteTiming {
            settling_time: Duration::from_secs(150),
            timeout_delay: Duration::from_secs(180),
            garbage_collection_delay: Duration::from_secs(10),
            route_jitter_max: Duration::ZERO,
            gc_jitter_max: Duration::ZERO,
        }
    }

    fn prefix() -> Ipv4Prefix {
        Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 0))
    }

    #[test]
    fn first_advertisement_installs_immediately_without_settling() {
        let mut table = RouteTable::new();
        let outcome = table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 1, 1),
            InterfaceIndex(1),
            Metric(100),
            SequenceNumber(4),
            Duration::ZERO,
            &timing(),
        );
        assert!(matches!(outcome, RouteOutcome::Installed { .. }));
        let entry = table.get(&prefix()).unwrap();
        assert!(entry.main.is_some());
        assert!(entry.primary.is_some());
        assert!(entry.secondary.is_none());
    }

    #[test]
    fn second_path_becomes_a_secondary_without_displacing_main() {
        let mut table = RouteTable::new();
        table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 1, 1),
            InterfaceIndex(1),
            Metric(100),
            SequenceNumber(4),
            Duration::ZERO,
            &timing(),
        );
        let outcome = table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 2, 1),
            InterfaceIndex(2),
            Metric(50),
            SequenceNumber(4),
            Duration::ZERO,
            &timing(),
        );
        assert!(matches!(outcome, RouteOutcome::SecondaryInserted { .. }));
        // Main must not change (spec §4.3.1 / §8 S2): a Secondary only
        // ever reaches Main via the metric-compared adoption path.
        assert_eq!(
            table.get(&prefix()).unwrap().main.as_ref().unwrap().metric,
            Metric(100)
        );
    }

    #[test]
    fn stale_secondary_candidate_is_rejected() {
        let mut table = RouteTable::new();
        table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 1, 1),
            InterfaceIndex(1),
            Metric(100),
            SequenceNumber(4),
            Duration::ZERO,
            &timing(),
        );
        table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 2, 1),
            InterfaceIndex(2),
            Metric(50),
            SequenceNumber(4),
            Duration::ZERO,
            &timing(),
        );
        let outcome = table.admit(
            prefix(),
            Ipv4Addr::new(192, 168, 3, 1),
            InterfaceIndex(3),
            Metric(10),
            SequenceNumber(1),
            Duration::ZERO,
            &timing(),
        );
        assert!(matches!(outcome, RouteOutcome::Rejected { .. }));
    }
}
