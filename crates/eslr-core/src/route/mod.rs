//! The dual routing table (spec §3, §4.3): a main table used for
//! forwarding and a backup table that incubates alternate paths before
//! they are trusted.

mod admission;
mod forwarding;
mod invalidate;
mod table;

pub use forwarding::{ForwardingEntry, RouteInputOutcome};
pub use table::{Purpose, RouteEntry, RouteRecord, RouteTable, RouteTiming, Slot, Validity};

use crate::types::Ipv4Prefix;

/// What changed as a result of an admission call or a fired route
/// timer. The engine (spec §4.5) inspects this to decide whether a
/// triggered or fast-triggered update is owed to neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Brand-new destination, installed immediately (spec §4.3.1 case 1).
    Installed { prefix: Ipv4Prefix },
    /// The Primary backup record was refreshed; the main table did not
    /// change visibly.
    PrimaryRefreshed { prefix: Ipv4Prefix },
    SecondaryInserted { prefix: Ipv4Prefix },
    SecondaryUpdated { prefix: Ipv4Prefix },
    SecondaryReplaced { prefix: Ipv4Prefix },
    Rejected { prefix: Ipv4Prefix },
    /// The main record was resynced from a still-fresh Primary; no
    /// outward-visible route change (spec §4.3.3, Expire, not stale).
    Resynced { prefix: Ipv4Prefix },
    /// Repair adopted the secondary path after the primary failed
    /// (spec §4.3.3, Expire-with-better-secondary or any Broken case
    /// where a secondary exists).
    Repaired {
        prefix: Ipv4Prefix,
        reason: crate::types::InvalidateReason,
    },
    /// No alternate existed; marked Invalid and armed for GC.
    Invalidated { prefix: Ipv4Prefix },
    /// No alternate existed on a hard failure; marked Disconnected and
    /// due a single poisoned advertisement (spec §4.3.3, §3).
    Disconnected { prefix: Ipv4Prefix },
    /// A demoted or never-promoted secondary aged out on its own.
    SecondaryExpired { prefix: Ipv4Prefix },
    /// Final deletion after the garbage-collection delay.
    GarbageCollected { prefix: Ipv4Prefix },
}
