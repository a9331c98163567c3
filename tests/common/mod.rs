//! Shared test fixtures: a scripted transport and wire-frame builders.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::time::Instant;

use panlink::protocol::{
    self, encode, Packet, FUNC_DISCOVER, FUNC_GET_SERVER, FUNC_GET_TIME, PACKET_SIZE,
};
use panlink::{DeviceRecord, LinkError, Reply, ServerConfig, Transport};

/// Honors RUST_LOG when debugging a test run.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scripted transport: broadcast rounds and unicast replies are queued up
/// front, calls are logged with timestamps for timing assertions.
#[derive(Default)]
pub struct FakeTransport {
    /// One entry per expected broadcast round; an exhausted queue yields
    /// empty rounds
    pub broadcast_rounds: Mutex<VecDeque<Vec<Reply>>>,
    /// (when, targets) per broadcast round
    pub broadcast_log: Mutex<Vec<(Instant, Vec<Ipv4Addr>)>>,
    /// Replies handed out by target address (unicast fallback tests)
    pub unicast_replies: Mutex<HashMap<Ipv4Addr, Reply>>,
    /// Scripted outcomes for send_and_receive, consumed in order and
    /// taking precedence over `unicast_replies`
    pub script: Mutex<VecDeque<Result<Reply, LinkError>>>,
    /// Every send_and_receive target
    pub unicast_log: Mutex<Vec<Ipv4Addr>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_round(&self, replies: Vec<Reply>) {
        self.broadcast_rounds.lock().unwrap().push_back(replies);
    }

    pub fn queue_response(&self, response: Result<Reply, LinkError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn add_unicast_reply(&self, target: Ipv4Addr, reply: Reply) {
        self.unicast_replies.lock().unwrap().insert(target, reply);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcast_log.lock().unwrap().len()
    }

    pub fn broadcast_times(&self) -> Vec<Instant> {
        self.broadcast_log.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_and_receive(
        &self,
        _frame: &[u8; PACKET_SIZE],
        target: Ipv4Addr,
        _timeout: Duration,
    ) -> Result<Reply, LinkError> {
        self.unicast_log.lock().unwrap().push(target);
        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }
        if let Some(reply) = self.unicast_replies.lock().unwrap().get(&target) {
            return Ok(*reply);
        }
        Err(LinkError::Timeout)
    }

    async fn broadcast_and_collect(
        &self,
        _frame: &[u8; PACKET_SIZE],
        targets: &[Ipv4Addr],
        _window: Duration,
    ) -> Result<Vec<Reply>, LinkError> {
        self.broadcast_log
            .lock()
            .unwrap()
            .push((Instant::now(), targets.to_vec()));
        let round = self
            .broadcast_rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(round)
    }
}

// =============================================================================
// Frame builders
// =============================================================================

/// A valid discovery reply frame from a device.
pub fn discovery_reply(serial: u32, configured: Ipv4Addr, remote: Ipv4Addr) -> Reply {
    let mut payload = [0u8; 24];
    payload[0..4].copy_from_slice(&configured.octets());
    payload[4..8].copy_from_slice(&[255, 255, 255, 0]);
    payload[8..12].copy_from_slice(&[192, 168, 1, 1]);
    payload[12..18].copy_from_slice(&[0x00, 0x12, 0x23, 0x34, 0x45, 0x56]);
    payload[18..20].copy_from_slice(&[0x06, 0x62]);
    payload[20..24].copy_from_slice(&[0x20, 0x20, 0x01, 0x01]);
    let frame = encode(FUNC_DISCOVER, serial, &payload).unwrap();
    Reply {
        packet: Packet::decode(&frame).unwrap(),
        remote: SocketAddrV4::new(remote, 60000),
    }
}

/// A clock reply carrying the given date/time.
pub fn time_reply(function_id: u8, serial: u32, datetime: &NaiveDateTime, remote: Ipv4Addr) -> Reply {
    let payload = protocol::time_payload(datetime).unwrap();
    let frame = encode(function_id, serial, &payload).unwrap();
    Reply {
        packet: Packet::decode(&frame).unwrap(),
        remote: SocketAddrV4::new(remote, 60000),
    }
}

/// A get-server-config reply.
pub fn server_config_reply(serial: u32, config: &ServerConfig, remote: Ipv4Addr) -> Reply {
    let payload = protocol::server_config_payload(config);
    let frame = encode(FUNC_GET_SERVER, serial, &payload).unwrap();
    Reply {
        packet: Packet::decode(&frame).unwrap(),
        remote: SocketAddrV4::new(remote, 60000),
    }
}

/// A set-operation acknowledgement.
pub fn ack_reply(function_id: u8, serial: u32, ack: u8, remote: Ipv4Addr) -> Reply {
    let frame = encode(function_id, serial, &[ack]).unwrap();
    Reply {
        packet: Packet::decode(&frame).unwrap(),
        remote: SocketAddrV4::new(remote, 60000),
    }
}

/// A reply with a function id that is never valid for any request.
pub fn bogus_reply(serial: u32, remote: Ipv4Addr) -> Reply {
    let frame = encode(FUNC_GET_TIME, serial, &[]).unwrap();
    Reply {
        packet: Packet::decode(&frame).unwrap(),
        remote: SocketAddrV4::new(remote, 60000),
    }
}

/// A plain device record for directory tests.
pub fn record(serial: u32, ip: Ipv4Addr) -> DeviceRecord {
    DeviceRecord {
        serial_number: serial,
        configured_ip: ip,
        subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(192, 168, 1, 1),
        mac_address: "00:12:23:34:45:56".into(),
        driver_version: "6.62".into(),
        driver_release_date: None,
        remote_addr: ip,
        remote_port: 60000,
    }
}
