//! Device data structures.
//!
//! These represent controller metadata and typed configuration values,
//! independent of any I/O or networking code.

use std::net::{Ipv4Addr, SocketAddrV4};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PacketError;
use crate::protocol::{self, bcd, DeviceInfoPayload, Packet};

// =============================================================================
// Serde helpers for Ipv4Addr <-> String
// =============================================================================

mod ipv4_serde {
    use super::*;

    pub fn serialize<S: Serializer>(addr: &Ipv4Addr, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Ipv4Addr, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Device record
// =============================================================================

/// A controller located on the network.
///
/// Created from a validated discovery reply; refreshed by every successful
/// operation. The core never deletes records, that is a persistence-layer
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Serial number, the identity key
    pub serial_number: u32,
    /// Address the device reports as configured
    #[serde(with = "ipv4_serde")]
    pub configured_ip: Ipv4Addr,
    #[serde(with = "ipv4_serde")]
    pub subnet_mask: Ipv4Addr,
    #[serde(with = "ipv4_serde")]
    pub gateway: Ipv4Addr,
    /// MAC address in colon-hex form
    pub mac_address: String,
    /// Driver version as "major.minor"
    pub driver_version: String,
    /// Driver release date; None when the device reports an unset/garbage
    /// BCD date field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_release_date: Option<NaiveDate>,
    /// Actual UDP source of the reply. May legitimately differ from
    /// `configured_ip` on multi-homed or NATed networks; both are kept.
    #[serde(with = "ipv4_serde")]
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
}

impl DeviceRecord {
    /// Validate a discovery reply and build a record from it.
    ///
    /// A reply whose source address differs from its reported configured
    /// address is accepted, not rejected.
    pub fn from_reply(packet: &Packet, remote: SocketAddrV4) -> Result<DeviceRecord, PacketError> {
        if packet.function_id != protocol::FUNC_DISCOVER {
            return Err(PacketError::Validation(format!(
                "unexpected function id {:#04X} in discovery reply",
                packet.function_id
            )));
        }
        if packet.serial_number == 0 {
            return Err(PacketError::Validation("serial number is zero".into()));
        }

        let info = DeviceInfoPayload::parse(&packet.payload)?;

        Ok(DeviceRecord {
            serial_number: packet.serial_number,
            configured_ip: Ipv4Addr::from(info.address),
            subnet_mask: Ipv4Addr::from(info.netmask),
            gateway: Ipv4Addr::from(info.gateway),
            mac_address: format_mac(&info.mac),
            driver_version: bcd::version_string(info.version),
            driver_release_date: bcd::bcd_to_date(&info.date).ok(),
            remote_addr: *remote.ip(),
            remote_port: remote.port(),
        })
    }

    /// Address to use for single-device operations: the configured address,
    /// falling back to the reply source when the device reports none.
    pub fn target_ip(&self) -> Ipv4Addr {
        if self.configured_ip.is_unspecified() {
            self.remote_addr
        } else {
            self.configured_ip
        }
    }
}

fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

// =============================================================================
// Typed configuration values
// =============================================================================

/// Upstream reporting server configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(with = "ipv4_serde")]
    pub server_ip: Ipv4Addr,
    pub port: u16,
    /// Event upload interval in seconds; 0 and 0xFF both disable uploads
    pub upload_interval: u8,
    /// Derived from `upload_interval`, never sent on the wire
    #[serde(default)]
    pub upload_enabled: bool,
}

/// Network configuration pushed to a device with set-network-config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(with = "ipv4_serde")]
    pub address: Ipv4Addr,
    #[serde(with = "ipv4_serde")]
    pub netmask: Ipv4Addr,
    #[serde(with = "ipv4_serde")]
    pub gateway: Ipv4Addr,
}

// =============================================================================
// Tests
// =============================================================================
