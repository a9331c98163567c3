//! Error types for the controller link.
//!
//! Two layers: [`PacketError`] for pure wire-format failures (no I/O, cheap
//! to clone and compare in tests) and [`LinkError`] for everything a caller
//! of the discovery engine or device directory can see.

use thiserror::Error;

/// Errors that can occur when encoding or decoding controller packets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacketError {
    /// Frame is not exactly 64 bytes
    #[error("Wrong packet length: expected 64 bytes, got {0}")]
    WrongLength(usize),

    /// First byte is not the fixed packet type
    #[error("Wrong packet type: expected 0x17, got {0:#04X}")]
    WrongType(u8),

    /// Request payload exceeds the 32-byte payload field
    #[error("Payload too large: {0} bytes, maximum is 32")]
    PayloadTooLarge(usize),

    /// Value cannot be represented as a packed-BCD byte
    #[error("Value {0} cannot be BCD encoded (must be 0..=99)")]
    BcdDigit(u16),

    /// BCD date/time field does not decode to a valid calendar value
    #[error("Invalid BCD date/time: {0}")]
    BcdDate(String),

    /// Failed to deserialize a payload structure
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Reply is structurally sound but fails the discovery validation rules
    #[error("Invalid reply: {0}")]
    Validation(String),
}

impl From<bincode::Error> for PacketError {
    fn from(e: bincode::Error) -> Self {
        PacketError::DeserializationFailed(e.to_string())
    }
}

/// Errors surfaced by the transport, discovery engine and device directory.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Wire format error
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// No reply arrived within the allotted time.
    ///
    /// For `set_network_config` this is the expected outcome (the device
    /// reboots without replying) and is handled inside the directory;
    /// everywhere else it triggers a retry or is surfaced to the caller.
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// OS-level socket failure (bind, send, receive)
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Interface detection is enabled but no usable IPv4 interface exists
    #[error("No usable network interfaces")]
    NoNetworkInterfaces,

    /// Device acknowledged a set-operation with a non-success status
    #[error("Device {serial} rejected the configuration")]
    ConfigRejected { serial: u32 },

    /// A single-device operation failed; carries the device identity
    #[error("Operation failed for device {serial}: {source}")]
    Device {
        serial: u32,
        #[source]
        source: Box<LinkError>,
    },
}

impl LinkError {
    /// Wrap an error with the serial number of the device the operation
    /// was addressed to.
    pub fn for_device(self, serial: u32) -> LinkError {
        match self {
            LinkError::Device { .. } | LinkError::ConfigRejected { .. } => self,
            other => LinkError::Device {
                serial,
                source: Box::new(other),
            },
        }
    }
}
