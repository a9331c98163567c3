//! Controller wire protocol.
//!
//! All traffic is fixed-size 64-byte UDP frames, little-endian integers,
//! sent to device port 60000. Requests and responses share the same layout:
//!
//! ```text
//! offset  size  field
//! 0       1     type (always 0x17)
//! 1       1     function id
//! 2       2     reserved
//! 4       4     serial number (u32 LE)
//! 8       32    payload
//! 40      4     sequence id (u32 LE)
//! 44      20    extended (reserved, zero)
//! ```
//!
//! This module contains pure encode/decode functions, no I/O.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::device::{NetworkConfig, ServerConfig};
use crate::error::PacketError;

pub mod bcd;

// =============================================================================
// Constants
// =============================================================================

/// UDP port the devices listen on
pub const DEVICE_PORT: u16 = 60000;

/// Every frame is exactly this long
pub const PACKET_SIZE: usize = 64;

/// Fixed value of the first byte of every frame
pub const PACKET_TYPE: u8 = 0x17;

/// Size of the payload field
pub const PAYLOAD_SIZE: usize = 32;

// =============================================================================
// Function IDs
// =============================================================================

/// Read device info; also the discovery broadcast function
pub const FUNC_DISCOVER: u8 = 0x94;

/// Read the device clock
pub const FUNC_GET_TIME: u8 = 0x32;

/// Set the device clock
pub const FUNC_SET_TIME: u8 = 0x30;

/// Read the upstream reporting server configuration
pub const FUNC_GET_SERVER: u8 = 0x92;

/// Set the upstream reporting server configuration
pub const FUNC_SET_SERVER: u8 = 0x90;

/// Push a new network configuration; the device reboots without replying
pub const FUNC_SET_NETWORK: u8 = 0x96;

/// Confirmation word required in a set-network-config payload before the
/// firmware will apply an address change (u32 LE at payload offset 12)
pub const NETWORK_CONFIG_MAGIC: u32 = 0x55AA_AA55;

// =============================================================================
// Frame
// =============================================================================

/// Raw frame layout for bincode deserialization
#[derive(Deserialize, Debug, Copy, Clone)]
#[repr(C, packed)]
struct WireFrame {
    kind: u8,
    function_id: u8,
    _reserved: [u8; 2],
    serial_number: u32,
    payload: [u8; PAYLOAD_SIZE],
    sequence_id: u32,
    _extended: [u8; 20],
}

/// A decoded 64-byte frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Packet {
    pub function_id: u8,
    pub serial_number: u32,
    pub payload: [u8; PAYLOAD_SIZE],
    pub sequence_id: u32,
}

impl Packet {
    /// Decode a frame, rejecting anything that is not exactly 64 bytes or
    /// does not carry the fixed type byte.
    pub fn decode(data: &[u8]) -> Result<Packet, PacketError> {
        if data.len() != PACKET_SIZE {
            return Err(PacketError::WrongLength(data.len()));
        }
        if data[0] != PACKET_TYPE {
            return Err(PacketError::WrongType(data[0]));
        }

        let frame: WireFrame = bincode::deserialize(data)?;
        Ok(Packet {
            function_id: frame.function_id,
            serial_number: frame.serial_number,
            payload: frame.payload,
            sequence_id: frame.sequence_id,
        })
    }
}

/// Encode a request frame.
///
/// Payloads shorter than 32 bytes are zero-padded; longer payloads are
/// rejected.
pub fn encode(function_id: u8, serial_number: u32, payload: &[u8]) -> Result<[u8; PACKET_SIZE], PacketError> {
    if payload.len() > PAYLOAD_SIZE {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }

    let mut frame = [0u8; PACKET_SIZE];
    frame[0] = PACKET_TYPE;
    frame[1] = function_id;
    frame[4..8].copy_from_slice(&serial_number.to_le_bytes());
    frame[8..8 + payload.len()].copy_from_slice(payload);
    Ok(frame)
}

// =============================================================================
// Payload structures
// =============================================================================

/// Discovery (0x94) reply payload
#[derive(Deserialize, Debug, Copy, Clone)]
#[repr(C, packed)]
pub struct DeviceInfoPayload {
    pub address: [u8; 4],
    pub netmask: [u8; 4],
    pub gateway: [u8; 4],
    pub mac: [u8; 6],
    pub version: [u8; 2],
    pub date: [u8; 4],
}

impl DeviceInfoPayload {
    pub fn parse(payload: &[u8; PAYLOAD_SIZE]) -> Result<Self, PacketError> {
        Ok(bincode::deserialize(payload)?)
    }
}

/// Server configuration (0x92 reply / 0x90 request) payload
#[derive(Deserialize, Debug, Copy, Clone)]
#[repr(C, packed)]
struct ServerConfigPayload {
    address: [u8; 4],
    port: [u8; 2],
    interval: u8,
}

// =============================================================================
// Operation payloads
// =============================================================================

/// Extract the 7-byte BCD date/time from a clock reply.
pub fn parse_time_reply(packet: &Packet) -> Result<chrono::NaiveDateTime, PacketError> {
    let mut fields = [0u8; 7];
    fields.copy_from_slice(&packet.payload[0..7]);
    bcd::bcd_to_datetime(&fields)
}

/// Build the payload for a set-time request.
pub fn time_payload(dt: &chrono::NaiveDateTime) -> Result<[u8; 7], PacketError> {
    bcd::datetime_to_bcd(dt)
}

/// Interpret a get-server-config reply.
///
/// `upload_enabled` is derived: interval 0 and 0xFF both mean the device
/// will not push events upstream.
pub fn parse_server_config(packet: &Packet) -> Result<ServerConfig, PacketError> {
    let raw: ServerConfigPayload = bincode::deserialize(&packet.payload)?;
    Ok(ServerConfig {
        server_ip: Ipv4Addr::from(raw.address),
        port: u16::from_le_bytes(raw.port),
        upload_interval: raw.interval,
        upload_enabled: raw.interval != 0 && raw.interval != 0xFF,
    })
}

/// Build the payload for a set-server-config request.
pub fn server_config_payload(config: &ServerConfig) -> [u8; 7] {
    let mut payload = [0u8; 7];
    payload[0..4].copy_from_slice(&config.server_ip.octets());
    payload[4..6].copy_from_slice(&config.port.to_le_bytes());
    payload[6] = config.upload_interval;
    payload
}

/// Build the payload for a set-network-config request.
pub fn network_config_payload(config: &NetworkConfig) -> [u8; 16] {
    let mut payload = [0u8; 16];
    payload[0..4].copy_from_slice(&config.address.octets());
    payload[4..8].copy_from_slice(&config.netmask.octets());
    payload[8..12].copy_from_slice(&config.gateway.octets());
    payload[12..16].copy_from_slice(&NETWORK_CONFIG_MAGIC.to_le_bytes());
    payload
}

/// True if a set-operation reply carries the firmware's success byte.
pub fn parse_set_ack(packet: &Packet) -> bool {
    packet.payload[0] == 1
}

// =============================================================================
// Tests
// =============================================================================
