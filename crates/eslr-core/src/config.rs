//! Engine-level configuration (spec §6).
//!
//! This is deliberately not a CLI surface (spec §1 scopes CLI flags out
//! of the core); it is a plain serializable struct a host loads however
//! it likes and hands to [`crate::Router::new`].

use crate::error::ConfigError;
use crate::types::{InterfaceIndex, NeighborId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Whether split horizon is applied to outbound updates (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitHorizon {
    Off,
    On,
}

/// Debug-surface selector (spec §6). The engine only carries the
/// operator's choice; formatting and printing are a host concern
/// (spec §1: "the periodic debug printer" is out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintingMethod {
    Off,
    Main,
    Backup,
    Neighbor,
}

/// Per-hop cost weights (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostWeights {
    /// Weight applied to a server's reported `1/(μ-λ)` term.
    pub k1: u8,
    /// Weight applied to link cost (propagation + transmission delay).
    pub k2: u8,
    /// Weight applied to the local router's own queueing cost.
    pub k3: u8,
}

impl Default for CostWeights {
    fn default() -> Self {
        CostWeights { k1: 1, k2: 1, k3: 1 }
    }
}

/// The full option table of spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// This router's own neighbor id, embedded in every outbound
    /// Hello/Hi it originates (spec §3 "16-bit neighbor id (unique per
    /// router)"). The host is responsible for assigning a value unique
    /// among the routers it talks to; the `Default` of `0` only works
    /// when a host runs a single instance or assigns its own id before
    /// bringing any interface up.
    pub router_id: NeighborId,
    /// Period between Hi keep-alives.
    pub kam_interval: Duration,
    /// Neighbor expiry delay.
    pub neighbor_timeout_delay: Duration,
    /// Delete-after-invalid delay for neighbors and routes.
    pub garbage_collection_delay: Duration,
    /// Max jitter before the initial discovery request on startup.
    pub startup_delay: Duration,
    /// Whether routes are suppressed back toward their own interface.
    pub split_horizon: SplitHorizon,
    /// Route expiry delay.
    pub route_timeout_delay: Duration,
    /// Backup-to-main promotion delay.
    pub settling_time: Duration,
    /// Lower bound of the triggered-update cooldown jitter.
    pub min_triggered_cooldown: Duration,
    /// Upper bound of the triggered-update cooldown jitter.
    pub max_triggered_cooldown: Duration,
    /// Base period of periodic updates (jitter is added on top, §4.5).
    pub periodic_update_delay: Duration,
    /// Cost weights.
    pub weights: CostWeights,
    /// Debug surface selector.
    pub printing_method: PrintingMethod,
    /// Interfaces on which the protocol is disabled.
    pub excluded_interfaces: HashSet<InterfaceIndex>,
    /// Upper bound of route/GC timer jitter (spec §5: 0..2s for routes,
    /// 0..5s for garbage collection — this is the route bound).
    pub route_jitter: Duration,
    /// Upper bound of garbage-collection timer jitter.
    pub gc_jitter: Duration,
}

impl RouterConfig {
    /// Validates cross-field invariants not expressible in the type
    /// system alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_triggered_cooldown > self.max_triggered_cooldown {
            return Err(ConfigError::CooldownOrder {
                min: self.min_triggered_cooldown,
                max: self.max_triggered_cooldown,
            });
        }
        let w = &self.weights;
        if w.k1 == 0 || w.k2 == 0 || w.k3 == 0 {
            return Err(ConfigError::ZeroWeight);
        }
        Ok(())
    }

    pub fn exclude_interface(&mut self, iface: InterfaceIndex) {
        self.excluded_interfaces.insert(iface);
    }

    pub fn is_excluded(&self, iface: InterfaceIndex) -> bool {
        self.excluded_interfaces.contains(&iface)
    }
}

impl Default for RouterConfig {
    /// Defaults drawn from spec §5's documented typical values.
    fn default() -> Self {
        RouterConfig {
            router_id: NeighborId(0),
            kam_interval: Duration::from_secs(30),
            neighbor_timeout_delay: Duration::from_secs(180),
            garbage_collection_delay: Duration::from_secs(10),
            startup_delay: Duration::from_secs(5),
            split_horizon: SplitHorizon::On,
            route_timeout_delay: Duration::from_secs(150),
            settling_time: Duration::from_secs(100),
            min_triggered_cooldown: Duration::from_secs(1),
            max_triggered_cooldown: Duration::from_secs(5),
            periodic_update_delay: Duration::from_secs(30),
            weights: CostWeights::default(),
            printing_method: PrintingMethod::Off,
            excluded_interfaces: HashSet::new(),
            route_jitter: Duration::from_secs(2),
            gc_jitter: Duration::from_secs(5),
        }
    }
}
