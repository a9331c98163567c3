//! Device discovery engine.
//!
//! Finds controllers on an unknown network by broadcasting the discover
//! function to every plausible broadcast address, retrying with backoff,
//! and deduplicating replies. When broadcast yields nothing it can fall
//! back to probing likely unicast addresses directly.
//!
//! Discovery never fails just because nothing answered: an empty list is a
//! valid result. Total wall-clock time is bounded by the per-attempt
//! windows, the inter-attempt backoff and the fallback budget, so callers
//! do not need external cancellation.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::device::DeviceRecord;
use crate::error::LinkError;
use crate::network::{self, InterfaceKind, NetworkInterfaceDescriptor};
use crate::protocol::{self, FUNC_DISCOVER, PACKET_SIZE};
use crate::store::DeviceStore;
use crate::transport::{Reply, Transport, UdpTransport};

// =============================================================================
// Constants
// =============================================================================

/// Receive window of a single broadcast round
const ATTEMPT_WINDOW: Duration = Duration::from_millis(1000);

/// Floor for the per-target unicast probe timeout
const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum concurrent unicast probes, to keep fd usage bounded
const MAX_PROBE_FANOUT: usize = 16;

/// Broadcast addresses of common private networks, tried in addition to
/// the interface-derived ones. Helps when the host's netmask is wrong or
/// the device sits on a differently-numbered segment of the same wire.
const COMMON_BROADCASTS: [Ipv4Addr; 5] = [
    Ipv4Addr::new(192, 168, 0, 255),
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 2, 255),
    Ipv4Addr::new(10, 0, 0, 255),
    Ipv4Addr::new(172, 16, 0, 255),
];

/// Last octets commonly assigned to controllers, used by unicast fallback
const UNICAST_LAST_OCTETS: [u8; 10] = [1, 2, 10, 20, 50, 66, 100, 120, 200, 254];

// =============================================================================
// Configuration
// =============================================================================

/// Discovery tuning knobs. All fields have defaults; a per-call override
/// can be passed to [`DeviceLocator::discover_with`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Number of broadcast attempts before giving up (or falling back)
    pub max_retries: u32,
    /// Delay between attempts; doubles per attempt with
    /// `exponential_backoff`
    pub retry_delay: Duration,
    pub exponential_backoff: bool,
    /// Probe likely unicast addresses when broadcast finds nothing
    pub enable_unicast_fallback: bool,
    /// Enumerate local interfaces to derive broadcast candidates; when
    /// off, only the static candidate list is used
    pub enable_interface_detection: bool,
    /// Replies with the same (serial, source address, source port) within
    /// this window collapse to one record
    pub dedup_window: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(300),
            exponential_backoff: true,
            enable_unicast_fallback: true,
            enable_interface_detection: true,
            dedup_window: Duration::from_millis(5000),
        }
    }
}

// =============================================================================
// Candidate address selection
// =============================================================================

fn usable(interfaces: &[NetworkInterfaceDescriptor]) -> Vec<&NetworkInterfaceDescriptor> {
    let preferred: Vec<_> = interfaces
        .iter()
        .filter(|d| !matches!(d.kind, InterfaceKind::Virtual | InterfaceKind::Loopback))
        .collect();
    if preferred.is_empty() {
        interfaces.iter().collect()
    } else {
        preferred
    }
}

fn push_unique(targets: &mut Vec<Ipv4Addr>, addr: Ipv4Addr) {
    if !targets.contains(&addr) {
        targets.push(addr);
    }
}

/// Broadcast addresses to try: each usable interface's computed broadcast,
/// the global broadcast, and the static private-network list.
fn candidate_broadcasts(interfaces: &[NetworkInterfaceDescriptor]) -> Vec<Ipv4Addr> {
    let mut candidates = Vec::new();
    for descriptor in usable(interfaces) {
        push_unique(&mut candidates, descriptor.broadcast);
    }
    push_unique(&mut candidates, Ipv4Addr::BROADCAST);
    for addr in COMMON_BROADCASTS {
        push_unique(&mut candidates, addr);
    }
    candidates
}

/// Unicast fallback probe list: previously-seen device addresses plus the
/// common last octets on each usable local network.
fn unicast_probe_targets(
    known: &BTreeSet<Ipv4Addr>,
    interfaces: &[NetworkInterfaceDescriptor],
) -> Vec<Ipv4Addr> {
    let mut targets: Vec<Ipv4Addr> = known.iter().copied().collect();
    for descriptor in usable(interfaces) {
        let net = descriptor.network.octets();
        for octet in UNICAST_LAST_OCTETS {
            let candidate = Ipv4Addr::new(net[0], net[1], net[2], octet);
            if candidate == descriptor.address || candidate == descriptor.broadcast {
                continue;
            }
            push_unique(&mut targets, candidate);
        }
    }
    targets
}

// =============================================================================
// Locator
// =============================================================================

type DedupKey = (u32, Ipv4Addr, u16);

/// Discovers controllers on the local network.
///
/// Generic over [`Transport`] so the retry/dedup logic can be exercised
/// with a scripted transport in tests; production code uses
/// [`DeviceLocator::new`] with the UDP transport.
pub struct DeviceLocator<T: Transport + 'static> {
    transport: Arc<T>,
    config: DiscoveryConfig,
    store: Arc<dyn DeviceStore>,
    /// (serial, source ip, source port) -> last seen. Mutex-guarded so
    /// overlapping discovery calls stay consistent.
    dedup: Mutex<HashMap<DedupKey, Instant>>,
}

impl DeviceLocator<UdpTransport> {
    /// Create a locator with the production UDP transport and default
    /// configuration.
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self::with_transport(
            Arc::new(UdpTransport::new()),
            store,
            DiscoveryConfig::default(),
        )
    }
}

impl<T: Transport + 'static> DeviceLocator<T> {
    pub fn with_transport(
        transport: Arc<T>,
        store: Arc<dyn DeviceStore>,
        config: DiscoveryConfig,
    ) -> Self {
        DeviceLocator {
            transport,
            config,
            store,
            dedup: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run discovery with the locator's own configuration.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<DeviceRecord>, LinkError> {
        let config = self.config.clone();
        self.discover_with(timeout, &config).await
    }

    /// Run discovery with a per-call configuration override.
    ///
    /// Returns the deduplicated set of validated devices; an empty list
    /// means nothing answered and is not an error. Fails with
    /// [`LinkError::NoNetworkInterfaces`] only when interface detection is
    /// enabled and the host has no usable IPv4 interface at all.
    pub async fn discover_with(
        &self,
        timeout: Duration,
        config: &DiscoveryConfig,
    ) -> Result<Vec<DeviceRecord>, LinkError> {
        self.purge_dedup(config.dedup_window);

        let interfaces = if config.enable_interface_detection {
            network::inventory()
        } else {
            Vec::new()
        };
        if config.enable_interface_detection && interfaces.is_empty() {
            return Err(LinkError::NoNetworkInterfaces);
        }

        let frame = protocol::encode(FUNC_DISCOVER, 0, &[])?;
        let deadline = Instant::now() + timeout;
        let candidates = candidate_broadcasts(&interfaces);
        log::debug!("Discovery broadcast candidates: {:?}", candidates);

        let mut found = Vec::new();
        let max_retries = config.max_retries.max(1);
        for attempt in 1..=max_retries {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let window = ATTEMPT_WINDOW.min(deadline.saturating_duration_since(now));
            log::debug!(
                "Discovery attempt {}/{} (window {:?})",
                attempt,
                max_retries,
                window
            );

            match self
                .transport
                .broadcast_and_collect(&frame, &candidates, window)
                .await
            {
                Ok(replies) => {
                    for reply in replies {
                        self.accept_reply(&reply, config.dedup_window, &mut found);
                    }
                }
                Err(e) => {
                    // A socket failure aborts this attempt only
                    log::warn!("Discovery attempt {} failed: {}", attempt, e);
                }
            }

            if !found.is_empty() {
                break;
            }

            if attempt < max_retries {
                let delay = if config.exponential_backoff {
                    // Saturate rather than overflow on large attempt counts;
                    // the deadline cap below bounds the actual sleep anyway
                    config
                        .retry_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                } else {
                    config.retry_delay
                };
                let delay = delay.min(deadline.saturating_duration_since(Instant::now()));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        if found.is_empty() && config.enable_unicast_fallback {
            let budget = deadline.saturating_duration_since(Instant::now());
            if !budget.is_zero() {
                self.unicast_fallback(&frame, &interfaces, budget, config, &mut found)
                    .await;
            }
        }

        Ok(found)
    }

    async fn unicast_fallback(
        &self,
        frame: &[u8; PACKET_SIZE],
        interfaces: &[NetworkInterfaceDescriptor],
        budget: Duration,
        config: &DiscoveryConfig,
        found: &mut Vec<DeviceRecord>,
    ) {
        let known: BTreeSet<Ipv4Addr> = self
            .store
            .list()
            .iter()
            .flat_map(|r| [r.configured_ip, r.remote_addr])
            .filter(|ip| !ip.is_unspecified())
            .collect();
        let targets = unicast_probe_targets(&known, interfaces);
        if targets.is_empty() {
            return;
        }

        let per_target = (budget / targets.len() as u32).max(MIN_PROBE_TIMEOUT);
        log::debug!(
            "Unicast fallback: probing {} addresses, {:?} each",
            targets.len(),
            per_target
        );

        for chunk in targets.chunks(MAX_PROBE_FANOUT) {
            let mut set = JoinSet::new();
            for target in chunk {
                let transport = Arc::clone(&self.transport);
                let frame = *frame;
                let target = *target;
                set.spawn(async move { transport.send_and_receive(&frame, target, per_target).await });
            }
            while let Some(join_result) = set.join_next().await {
                match join_result {
                    Ok(Ok(reply)) => self.accept_reply(&reply, config.dedup_window, found),
                    Ok(Err(LinkError::Timeout)) => {}
                    Ok(Err(e)) => log::debug!("Unicast probe failed: {}", e),
                    Err(e) => log::debug!("Probe task failed: {}", e),
                }
            }
        }
    }

    /// Validate a reply, run it through the dedup cache, and record it.
    /// Invalid and duplicate replies are dropped, never surfaced.
    fn accept_reply(&self, reply: &Reply, window: Duration, found: &mut Vec<DeviceRecord>) {
        let record = match DeviceRecord::from_reply(&reply.packet, reply.remote) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Dropping invalid discovery reply from {}: {}", reply.remote, e);
                return;
            }
        };

        let key = (record.serial_number, record.remote_addr, record.remote_port);
        let now = Instant::now();
        {
            let mut dedup = self.dedup.lock().unwrap();
            if let Some(last) = dedup.insert(key, now) {
                if now.duration_since(last) < window {
                    log::debug!(
                        "Duplicate reply from device {} at {}",
                        record.serial_number,
                        reply.remote
                    );
                    return;
                }
            }
        }

        log::info!(
            "Discovered device {} at {} (configured {}, driver {})",
            record.serial_number,
            reply.remote,
            record.configured_ip,
            record.driver_version
        );
        self.store.add_or_update(&record);
        found.push(record);
    }

    /// Drop dedup entries older than the window. Called lazily at the
    /// start of every discovery.
    fn purge_dedup(&self, window: Duration) {
        let now = Instant::now();
        let mut dedup = self.dedup.lock().unwrap();
        dedup.retain(|_, last| now.duration_since(*last) < window);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, address: [u8; 4], netmask: [u8; 4]) -> NetworkInterfaceDescriptor {
        NetworkInterfaceDescriptor::new(name, Ipv4Addr::from(address), Ipv4Addr::from(netmask), None)
    }

    #[test]
    fn test_candidates_skip_virtual_and_loopback() {
        let interfaces = vec![
            descriptor("eth0", [192, 168, 7, 10], [255, 255, 255, 0]),
            descriptor("docker0", [172, 17, 0, 1], [255, 255, 0, 0]),
            descriptor("lo", [127, 0, 0, 1], [255, 0, 0, 0]),
        ];
        let candidates = candidate_broadcasts(&interfaces);

        assert_eq!(candidates[0], Ipv4Addr::new(192, 168, 7, 255));
        assert!(!candidates.contains(&Ipv4Addr::new(172, 17, 255, 255)));
        assert!(!candidates.contains(&Ipv4Addr::new(127, 255, 255, 255)));
        assert!(candidates.contains(&Ipv4Addr::BROADCAST));
        assert!(candidates.contains(&Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn test_candidates_fall_back_to_virtual_when_nothing_else() {
        let interfaces = vec![descriptor("docker0", [172, 17, 0, 1], [255, 255, 0, 0])];
        let candidates = candidate_broadcasts(&interfaces);
        assert_eq!(candidates[0], Ipv4Addr::new(172, 17, 255, 255));
    }

    #[test]
    fn test_candidates_without_interfaces() {
        let candidates = candidate_broadcasts(&[]);
        assert_eq!(candidates[0], Ipv4Addr::BROADCAST);
        assert_eq!(candidates.len(), 1 + COMMON_BROADCASTS.len());
    }

    #[test]
    fn test_candidates_deduplicated() {
        // Interface broadcast collides with the static list
        let interfaces = vec![descriptor("eth0", [192, 168, 1, 10], [255, 255, 255, 0])];
        let candidates = candidate_broadcasts(&interfaces);
        let count = candidates
            .iter()
            .filter(|&&a| a == Ipv4Addr::new(192, 168, 1, 255))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unicast_targets() {
        let mut known = BTreeSet::new();
        known.insert(Ipv4Addr::new(192, 168, 7, 60));
        let interfaces = vec![descriptor("eth0", [192, 168, 7, 10], [255, 255, 255, 0])];

        let targets = unicast_probe_targets(&known, &interfaces);

        // Known addresses come first
        assert_eq!(targets[0], Ipv4Addr::new(192, 168, 7, 60));
        assert!(targets.contains(&Ipv4Addr::new(192, 168, 7, 1)));
        assert!(targets.contains(&Ipv4Addr::new(192, 168, 7, 254)));
        // The interface's own address is never probed
        assert!(!targets.contains(&Ipv4Addr::new(192, 168, 7, 10)));
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(300));
        assert!(config.exponential_backoff);
        assert!(config.enable_unicast_fallback);
        assert!(config.enable_interface_detection);
        assert_eq!(config.dedup_window, Duration::from_millis(5000));
    }
}
