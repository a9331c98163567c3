//! Local network interface enumeration.
//!
//! Discovery needs to know every IPv4 interface on the host, its computed
//! broadcast address, and a rough idea of how likely the interface is to
//! reach real hardware. Classification is a name-pattern heuristic and is
//! only ever used to order candidates, never to exclude them.

use std::net::{IpAddr, Ipv4Addr};

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use serde::Serialize;

// =============================================================================
// Interface classification
// =============================================================================

/// Kind of interface, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Ethernet,
    Wifi,
    Virtual,
    Loopback,
    Unknown,
}

impl InterfaceKind {
    /// Base ranking: wired beats wireless beats unclassified beats
    /// virtual beats loopback.
    fn base_priority(&self) -> i32 {
        match self {
            InterfaceKind::Ethernet => 100,
            InterfaceKind::Wifi => 80,
            InterfaceKind::Unknown => 40,
            InterfaceKind::Virtual => 20,
            InterfaceKind::Loopback => 0,
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceKind::Ethernet => write!(f, "ethernet"),
            InterfaceKind::Wifi => write!(f, "wifi"),
            InterfaceKind::Virtual => write!(f, "virtual"),
            InterfaceKind::Loopback => write!(f, "loopback"),
            InterfaceKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify an interface by name substring heuristics.
pub fn classify(name: &str) -> InterfaceKind {
    let name = name.to_lowercase();

    // Wireless before ethernet: "wlan" contains "lan"
    if ["wifi", "wlan", "wireless"].iter().any(|p| name.contains(p)) {
        return InterfaceKind::Wifi;
    }
    if ["vbox", "vmware", "vmnet", "docker", "bridge", "br-", "virbr", "veth", "tap", "tun"]
        .iter()
        .any(|p| name.contains(p))
    {
        return InterfaceKind::Virtual;
    }
    if name == "lo" || name.starts_with("lo0") {
        return InterfaceKind::Loopback;
    }
    if name.contains("eth") || name.starts_with("en") || name.contains("lan") {
        return InterfaceKind::Ethernet;
    }
    InterfaceKind::Unknown
}

fn priority_of(name: &str, kind: InterfaceKind) -> i32 {
    let name = name.to_lowercase();
    let mut priority = kind.base_priority();
    // Names that are almost always the primary wired NIC
    if ["eth0", "en0", "eno1", "enp", "ens"].iter().any(|p| name.starts_with(p)) {
        priority += 10;
    }
    priority
}

// =============================================================================
// Address math
// =============================================================================

/// Per-octet `ip OR !mask`.
pub fn broadcast_of(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = mask.octets();
    Ipv4Addr::new(
        ip[0] | !mask[0],
        ip[1] | !mask[1],
        ip[2] | !mask[2],
        ip[3] | !mask[3],
    )
}

/// Per-octet `ip AND mask`.
pub fn network_of(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = mask.octets();
    Ipv4Addr::new(ip[0] & mask[0], ip[1] & mask[1], ip[2] & mask[2], ip[3] & mask[3])
}

// =============================================================================
// Inventory
// =============================================================================

/// An IPv4 interface with its derived addresses and ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceDescriptor {
    pub name: String,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub network: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub kind: InterfaceKind,
    pub priority: i32,
}

impl NetworkInterfaceDescriptor {
    /// Build a descriptor from raw interface data, deriving network and
    /// broadcast addresses and ranking.
    pub fn new(name: &str, address: Ipv4Addr, netmask: Ipv4Addr, mac: Option<String>) -> Self {
        let kind = classify(name);
        NetworkInterfaceDescriptor {
            name: name.to_string(),
            address,
            netmask,
            network: network_of(address, netmask),
            broadcast: broadcast_of(address, netmask),
            mac,
            kind,
            priority: priority_of(name, kind),
        }
    }
}

/// Enumerate the host's IPv4 interfaces, best candidates first.
///
/// Loopback-bound addresses are dropped unless the interface name itself
/// classifies as loopback.
pub fn inventory() -> Vec<NetworkInterfaceDescriptor> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            log::warn!("Interface enumeration failed: {}", e);
            return Vec::new();
        }
    };

    let mut descriptors = Vec::new();
    for itf in interfaces {
        for addr in &itf.addr {
            if let (IpAddr::V4(ip), Some(IpAddr::V4(netmask))) = (addr.ip(), addr.netmask()) {
                if ip.is_unspecified() {
                    continue;
                }
                let descriptor =
                    NetworkInterfaceDescriptor::new(&itf.name, ip, netmask, itf.mac_addr.clone());
                if ip.is_loopback() && descriptor.kind != InterfaceKind::Loopback {
                    continue;
                }
                log::debug!(
                    "Interface '{}' {} / {} -> broadcast {} ({}, priority {})",
                    descriptor.name,
                    descriptor.address,
                    descriptor.netmask,
                    descriptor.broadcast,
                    descriptor.kind,
                    descriptor.priority
                );
                descriptors.push(descriptor);
            }
        }
    }

    descriptors.sort_by_key(|d| std::cmp::Reverse(d.priority));
    descriptors
}

// =============================================================================
// Tests
// =============================================================================
