//! Per-hop cost evaluation (spec §4.4).
//!
//! Spec §9 flags that the original link-occupancy term is a windowed
//! average over recent samples; this reduces that to its non-windowed
//! form (the caller supplies the current instantaneous rates), since
//! the windowing itself is a host-stack sampling policy, not a routing
//! decision.

use crate::config::CostWeights;
use crate::types::Metric;
use std::time::Duration;

/// Per-link characteristics needed to compute `linkCost` (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct LinkStats {
    pub propagation_delay: Duration,
    pub average_packet_bits: u64,
    /// The link's configured channel data rate, in bits/second.
    pub channel_datarate: u64,
    /// Sum of channel-load (bits/second) already committed by other
    /// devices sharing this channel.
    pub channel_load: u64,
}

impl LinkStats {
    /// `transmissionDelay + propagationDelay`, with `availableBandwidth
    /// = channelDatarate − Σ devices channel-load` (spec §4.4).
    pub fn link_cost(&self) -> Duration {
        let available = self.channel_datarate.saturating_sub(self.channel_load).max(1);
        let transmission_us = self.average_packet_bits.saturating_mul(1_000_000) / available;
        Duration::from_micros(transmission_us) + self.propagation_delay
    }
}

/// A router's own processing load, modeled as an M/M/1 queue (spec
/// §4.4): `routerCost = 1 / (μ − λ)`.
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    /// Service rate μ, in requests/second.
    pub service_rate: f64,
    /// Arrival rate λ, in requests/second.
    pub arrival_rate: f64,
}

impl QueueStats {
    /// Returns `None` when the queue is saturated or unstable
    /// (μ ≤ λ), in which case the caller should treat the router as
    /// effectively at maximum cost rather than propagate an infinite
    /// or negative value.
    pub fn router_cost(&self) -> Option<Duration> {
        let headroom = self.service_rate - self.arrival_rate;
        if headroom <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(1.0 / headroom))
    }
}

/// Computes the per-hop cost `c = K2·linkCost + K3·routerCost` (spec
/// §4.4), in the same microsecond unit used by [`Metric`].
pub fn per_hop_cost(link: &LinkStats, router: Option<&QueueStats>, weights: &CostWeights) -> Metric {
    let link_us = link.link_cost().as_micros() as u64;
    let router_us = router
        .and_then(QueueStats::router_cost)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    let weighted = (weights.k2 as u64)
        .saturating_mul(link_us)
        .saturating_add((weights.k3 as u64).saturating_mul(router_us));
    Metric(weighted.min(u64::from(u32::MAX)) as u32)
}

/// Scales a server-advertised cost (from an SRC record's μ, λ) by K1,
/// the weight a router applies to a server's own reported load (spec
/// §4.4, §4.6, §GLOSSARY "SRC").
pub fn server_cost(queue: &QueueStats, weights: &CostWeights) -> Metric {
    let base_us = queue
        .router_cost()
        .map(|d| d.as_micros() as u64)
        .unwrap_or(u64::from(u32::MAX));
    let scaled = (weights.k1 as u64).saturating_mul(base_us);
    Metric(scaled.min(u64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> CostWeights {
        CostWeights { k1: 1, k2: 1, k3: 1 }
    }

    #[test]
    fn link_cost_adds_transmission_and_propagation() {
        let link = LinkStats {
            propagation_delay: Duration::from_micros(10),
            average_packet_bits: 1_000_000,
            channel_datarate: 1_000_000,
            channel_load: 0,
        };
        // 1_000_000 bits / 1_000_000 bps = 1s transmission + 10us prop.
        assert_eq!(link.link_cost(), Duration::from_secs(1) + Duration::from_micros(10));
    }

    #[test]
    fn saturated_queue_has_no_finite_router_cost() {
        let q = QueueStats {
            service_rate: 100.0,
            arrival_rate: 100.0,
        };
        assert!(q.router_cost().is_none());
    }

    #[test]
    fn per_hop_cost_combines_weighted_terms() {
        let link = LinkStats {
            propagation_delay: Duration::ZERO,
            average_packet_bits: 8,
            channel_datarate: 8_000_000,
            channel_load: 0,
        };
        let router = QueueStats {
            service_rate: 1000.0,
            arrival_rate: 0.0,
        };
        let c = per_hop_cost(&link, Some(&router), &weights());
        assert!(c.0 > 0);
    }
}
