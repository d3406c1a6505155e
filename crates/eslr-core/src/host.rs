//! Host-stack adapter contract (spec §4.6, §6).
//!
//! The engine never touches a socket or the kernel FIB directly; it
//! asks a `HostStack` implementation for interface facts and hands it
//! forwarding entries to install. This is the same seam the teacher
//! draws between orchestration logic and `sonic-sai`'s hardware calls —
//! here the "hardware" is whatever IPv4 stack embeds this crate.

use crate::route::ForwardingEntry;
use crate::types::{InterfaceIndex, Ipv4Prefix};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Scope of a local address, used to pick a source address for
/// unicast vs. the link-scoped address used for multicast (spec
/// §4.3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressScope {
    Global,
    LinkLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub scope: AddressScope,
}

/// Link characteristics the metric evaluator needs (spec §4.4, §6
/// `netDevice(i) -> {delay, datarate, peers}`).
#[derive(Debug, Clone, Copy)]
pub struct NetDevice {
    pub propagation_delay: Duration,
    pub datarate: u64,
    /// Sum of channel-load already committed by other devices sharing
    /// this link.
    pub peer_channel_load: u64,
    pub average_packet_bits: u64,
}

/// The five read callbacks plus the one write callback spec §6 asks of
/// a host IPv4 stack.
pub trait HostStack {
    fn interfaces_count(&self) -> u32;
    fn is_up(&self, interface: InterfaceIndex) -> bool;
    fn addresses(&self, interface: InterfaceIndex) -> Vec<InterfaceAddress>;
    fn mtu(&self, interface: InterfaceIndex) -> u16;
    fn net_device(&self, interface: InterfaceIndex) -> NetDevice;

    fn install_route(&mut self, entry: ForwardingEntry, prefix: Ipv4Prefix);
    fn remove_route(&mut self, prefix: Ipv4Prefix);
}

/// Every interface's current `(index, mtu)`, for building periodic or
/// triggered updates (spec §4.5 "on every non-excluded interface").
pub fn active_interfaces(host: &impl HostStack, excluded: impl Fn(InterfaceIndex) -> bool) -> Vec<(InterfaceIndex, u16)> {
    (0..host.interfaces_count())
        .map(InterfaceIndex)
        .filter(|&i| host.is_up(i) && !excluded(i))
        .map(|i| (i, host.mtu(i)))
        .collect()
}
