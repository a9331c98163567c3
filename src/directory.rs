//! Typed single-device operations.
//!
//! Each operation builds a function-specific payload, performs one
//! request/response exchange against the record's configured address
//! (falling back to the reply source address), and interprets the typed
//! reply. Successful operations refresh the device's record in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::device::{DeviceRecord, NetworkConfig, ServerConfig};
use crate::error::{LinkError, PacketError};
use crate::protocol::{self, Packet};
use crate::store::DeviceStore;
use crate::transport::{Transport, UdpTransport};

/// Default per-operation reply timeout
const OP_TIMEOUT: Duration = Duration::from_millis(2500);

/// Issues typed operations against discovered devices.
pub struct DeviceDirectory<T: Transport + 'static> {
    transport: Arc<T>,
    store: Arc<dyn DeviceStore>,
    timeout: Duration,
}

impl DeviceDirectory<UdpTransport> {
    /// Create a directory with the production UDP transport.
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self::with_transport(Arc::new(UdpTransport::new()), store)
    }
}

impl<T: Transport + 'static> DeviceDirectory<T> {
    pub fn with_transport(transport: Arc<T>, store: Arc<dyn DeviceStore>) -> Self {
        DeviceDirectory {
            transport,
            store,
            timeout: OP_TIMEOUT,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// One request/response exchange, validated against the expected
    /// function id and the device's serial number. A reply for a
    /// different device is an error, not someone else's answer.
    async fn request(
        &self,
        record: &DeviceRecord,
        function_id: u8,
        payload: &[u8],
    ) -> Result<Packet, LinkError> {
        let frame = protocol::encode(function_id, record.serial_number, payload)?;
        let reply = self
            .transport
            .send_and_receive(&frame, record.target_ip(), self.timeout)
            .await?;

        let packet = reply.packet;
        if packet.function_id != function_id {
            return Err(PacketError::Validation(format!(
                "expected function {:#04X}, got {:#04X}",
                function_id, packet.function_id
            ))
            .into());
        }
        if packet.serial_number != record.serial_number {
            return Err(PacketError::Validation(format!(
                "reply from device {} while talking to {}",
                packet.serial_number, record.serial_number
            ))
            .into());
        }
        Ok(packet)
    }

    /// Refresh the record's last-seen state after a successful operation.
    fn touch(&self, record: &DeviceRecord) {
        self.store.add_or_update(record);
    }

    /// Read the device clock.
    pub async fn get_time(&self, record: &DeviceRecord) -> Result<NaiveDateTime, LinkError> {
        let result: Result<NaiveDateTime, LinkError> = async {
            let packet = self.request(record, protocol::FUNC_GET_TIME, &[]).await?;
            Ok(protocol::parse_time_reply(&packet)?)
        }
        .await;
        let datetime = result.map_err(|e| e.for_device(record.serial_number))?;
        self.touch(record);
        Ok(datetime)
    }

    /// Set the device clock. Returns the time the device echoes back.
    pub async fn set_time(
        &self,
        record: &DeviceRecord,
        datetime: &NaiveDateTime,
    ) -> Result<NaiveDateTime, LinkError> {
        let result: Result<NaiveDateTime, LinkError> = async {
            let payload = protocol::time_payload(datetime)?;
            let packet = self
                .request(record, protocol::FUNC_SET_TIME, &payload)
                .await?;
            Ok(protocol::parse_time_reply(&packet)?)
        }
        .await;
        let datetime = result.map_err(|e| e.for_device(record.serial_number))?;
        self.touch(record);
        Ok(datetime)
    }

    /// Read the upstream reporting server configuration.
    pub async fn get_server_config(&self, record: &DeviceRecord) -> Result<ServerConfig, LinkError> {
        let result: Result<ServerConfig, LinkError> = async {
            let packet = self.request(record, protocol::FUNC_GET_SERVER, &[]).await?;
            Ok(protocol::parse_server_config(&packet)?)
        }
        .await;
        let config = result.map_err(|e| e.for_device(record.serial_number))?;
        self.touch(record);
        Ok(config)
    }

    /// Set the upstream reporting server configuration. Fails with
    /// [`LinkError::ConfigRejected`] unless the device acknowledges.
    pub async fn set_server_config(
        &self,
        record: &DeviceRecord,
        config: &ServerConfig,
    ) -> Result<(), LinkError> {
        let payload = protocol::server_config_payload(config);
        let packet = self
            .request(record, protocol::FUNC_SET_SERVER, &payload)
            .await
            .map_err(|e| e.for_device(record.serial_number))?;

        if !protocol::parse_set_ack(&packet) {
            return Err(LinkError::ConfigRejected {
                serial: record.serial_number,
            });
        }
        self.touch(record);
        Ok(())
    }

    /// Push a new network configuration.
    ///
    /// Fire-and-forget: the device applies the new address and reboots
    /// without replying, so a receive timeout is the expected success
    /// path, distinct from a genuine send failure. Only send-level socket
    /// errors are propagated.
    pub async fn set_network_config(
        &self,
        record: &DeviceRecord,
        config: &NetworkConfig,
    ) -> Result<(), LinkError> {
        let payload = protocol::network_config_payload(config);
        match self
            .request(record, protocol::FUNC_SET_NETWORK, &payload)
            .await
        {
            // No reply is how the device signals acceptance
            Ok(_) | Err(LinkError::Timeout) => {
                log::info!(
                    "Device {} instructed to move to {}; it will reboot",
                    record.serial_number,
                    config.address
                );
                self.touch(record);
                Ok(())
            }
            Err(e) => Err(e.for_device(record.serial_number)),
        }
    }
}
