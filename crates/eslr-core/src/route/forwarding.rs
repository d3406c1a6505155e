//! Forwarding lookup (spec §4.3.4): "linearly scans the main table and
//! returns the first Valid record whose mask matches the destination;
//! ties are broken by insertion order (most recently admitted first)."

use super::table::{RouteTable, Validity};
use crate::types::InterfaceIndex;
use std::net::Ipv4Addr;

/// The result handed back to a caller asking "how do I reach this
/// destination". `gateway` is zero for directly-connected (LocalHost)
/// destinations and for multicast, matching spec §4.3.4's "gateway =
/// zero" language for both cases; the source address itself is chosen
/// by the host adapter from the interface's global-scope addresses and
/// is not part of this lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingEntry {
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// `None` only for multicast, where the caller already knows which
    /// outgoing interface it is sending on (spec §4.3.4: "link-scoped
    /// source selection").
    pub interface: Option<InterfaceIndex>,
}

/// What to do with a packet arriving on an interface (spec §6
/// `routeInput`), as distinct from `routeOutput`'s plain lookup: a
/// destination matching one of the router's own addresses is delivered
/// locally rather than forwarded, and multicast is declined outright
/// rather than special-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteInputOutcome {
    /// `destination` is one of this router's own addresses.
    Deliver,
    Forward(ForwardingEntry),
    NoRoute,
}

impl RouteTable {
    /// Resolves a forwarding entry for `destination` (spec §4.3.4).
    pub fn lookup(&self, destination: Ipv4Addr) -> Option<ForwardingEntry> {
        if destination.is_multicast() {
            return Some(ForwardingEntry {
                destination,
                gateway: Ipv4Addr::UNSPECIFIED,
                interface: None,
            });
        }

        self.main_records()
            .find(|(prefix, record)| {
                matches!(record.validity, Validity::Valid | Validity::LocalHost)
                    && prefix.contains(destination)
            })
            .map(|(_, record)| ForwardingEntry {
                destination,
                gateway: record.next_hop,
                interface: Some(record.interface),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::table::RouteTiming;
    use crate::types::{Ipv4Prefix, Metric, SequenceNumber};
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

    #[test]
    fn most_recently_admitted_overlapping_prefix_wins_ties() {
        let mut table = RouteTable::new();
        let wide = Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 0, 0));
        let narrow = Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 0));

        table.admit(
            wide,
            Ipv4Addr::new(192, 168, 1, 1),
            InterfaceIndex(1),
            Metric(100),
            SequenceNumber(2),
            Duration::ZERO,
            &timing(),
        );
        table.admit(
            narrow,
            Ipv4Addr::new(192, 168, 2, 1),
            InterfaceIndex(2),
            Metric(100),
            SequenceNumber(2),
            Duration::ZERO,
            &timing(),
        );

        let entry = table.lookup(Ipv4Addr::new(10, 0, 0, 5)).unwrap();
        // narrow was admitted after wide, so it is scanned first.
        assert_eq!(entry.gateway, Ipv4Addr::new(192, 168, 2, 1));
    }

    #[test]
    fn multicast_bypasses_the_table() {
        let table = RouteTable::new();
        let entry = table.lookup(Ipv4Addr::new(224, 0, 0, 5)).unwrap();
        assert_eq!(entry.gateway, Ipv4Addr::UNSPECIFIED);
        assert!(entry.interface.is_none());
    }

    #[test]
    fn unreachable_destination_returns_none() {
        let table = RouteTable::new();
        assert!(table.lookup(Ipv4Addr::new(8, 8, 8, 8)).is_none());
    }
}
