//! # panlink
//!
//! Discovery and control of network-attached hardware controllers that
//! speak a fixed-size 64-byte UDP protocol on port 60000.
//!
//! The crate is split the same way the protocol is: pure wire-format code
//! with no I/O, and an async layer on top of it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  protocol/   64-byte frame codec, BCD arithmetic        │
//! │  device      records, validation, typed config values   │
//! │  network     IPv4 interface inventory + broadcast math  │
//! ├─────────────────────────────────────────────────────────┤
//! │  transport   UDP request/response + broadcast-collect   │
//! │  locator     retry/backoff discovery engine with dedup  │
//! │  directory   typed per-device operations                │
//! │  store       record store seam for the persistence shell│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use panlink::{DeviceDirectory, DeviceLocator, MemoryStore};
//!
//! # async fn example() -> Result<(), panlink::LinkError> {
//! let store = Arc::new(MemoryStore::new());
//! let locator = DeviceLocator::new(store.clone());
//!
//! let devices = locator.discover(Duration::from_secs(5)).await?;
//! let directory = DeviceDirectory::new(store);
//! for device in &devices {
//!     let time = directory.get_time(device).await?;
//!     println!("{}: clock reads {}", device.serial_number, time);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Replies are validated before anything trusts them; a device answering
//! from an address other than its configured one (NAT, multi-homed hosts)
//! is accepted and both addresses are kept on the record.

pub mod device;
pub mod directory;
pub mod error;
pub mod locator;
pub mod network;
pub mod protocol;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use device::{DeviceRecord, NetworkConfig, ServerConfig};
pub use directory::DeviceDirectory;
pub use error::{LinkError, PacketError};
pub use locator::{DeviceLocator, DiscoveryConfig};
pub use network::{InterfaceKind, NetworkInterfaceDescriptor};
pub use protocol::{Packet, DEVICE_PORT};
pub use store::{DeviceStore, MemoryStore};
pub use transport::{Reply, Transport, UdpTransport};
