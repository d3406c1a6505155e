//! A minimal in-memory harness for driving one or more [`Router`]s
//! against a shared logical clock, without any real socket or kernel
//! FIB. Scenario tests build their topology with [`TestHost`] and step
//! time forward with [`advance_all`].

use eslr_core::engine::OutboundPacket;
use eslr_core::host::{AddressScope, HostStack, InterfaceAddress, NetDevice};
use eslr_core::route::ForwardingEntry;
use eslr_core::types::{InterfaceIndex, Ipv4Prefix};
use eslr_core::Router;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub propagation_delay: Duration,
    pub datarate: u64,
}

impl Default for Link {
    fn default() -> Self {
        Link {
            propagation_delay: Duration::from_micros(50),
            datarate: 1_000_000_000,
        }
    }
}

/// A fake host stack: a fixed set of interfaces, each with one address
/// and a link profile, plus a recording of installed forwarding state.
pub struct TestHost {
    interfaces: HashMap<u32, (InterfaceAddress, u16, Link, bool)>,
    pub installed: Vec<(ForwardingEntry, Ipv4Prefix)>,
}

impl TestHost {
    pub fn new() -> Self {
        TestHost {
            interfaces: HashMap::new(),
            installed: Vec::new(),
        }
    }

    pub fn add_interface(&mut self, index: u32, address: Ipv4Addr, mask: Ipv4Addr, link: Link) {
        self.interfaces.insert(
            index,
            (
                InterfaceAddress {
                    address,
                    mask,
                    scope: AddressScope::Global,
                },
                1500,
                link,
                true,
            ),
        );
    }

    pub fn set_up(&mut self, index: u32, up: bool) {
        if let Some(entry) = self.interfaces.get_mut(&index) {
            entry.3 = up;
        }
    }
}

impl HostStack for TestHost {
    fn interfaces_count(&self) -> u32 {
        self.interfaces.keys().copied().max().map(|m| m + 1).unwrap_or(0)
    }

    fn is_up(&self, interface: InterfaceIndex) -> bool {
        self.interfaces.get(&interface.0).is_some_and(|e| e.3)
    }

    fn addresses(&self, interface: InterfaceIndex) -> Vec<InterfaceAddress> {
        self.interfaces.get(&interface.0).map(|e| vec![e.0]).unwrap_or_default()
    }

    fn mtu(&self, interface: InterfaceIndex) -> u16 {
        self.interfaces.get(&interface.0).map(|e| e.1).unwrap_or(1500)
    }

    fn net_device(&self, interface: InterfaceIndex) -> NetDevice {
        let link = self.interfaces.get(&interface.0).map(|e| e.2).unwrap_or_default();
        NetDevice {
            propagation_delay: link.propagation_delay,
            datarate: link.datarate,
            peer_channel_load: 0,
            average_packet_bits: 1500 * 8,
        }
    }

    fn install_route(&mut self, entry: ForwardingEntry, prefix: Ipv4Prefix) {
        self.installed.push((entry, prefix));
    }

    fn remove_route(&mut self, prefix: Ipv4Prefix) {
        self.installed.retain(|(_, p)| p != &prefix);
    }
}

/// Steps every router's clock to `now`, collecting whatever each one
/// emits, in the order given.
pub fn advance_all<H: HostStack>(routers: &mut [&mut Router<H>], now: Duration) -> Vec<OutboundPacket> {
    routers.iter_mut().flat_map(|r| r.advance(now)).collect()
}
