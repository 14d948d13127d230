//! Event bus port (§6) and its in-process reference adapter.
//!
//! The reference codebase's `DiscoveryService` fans updates out over a
//! `tokio::sync::broadcast` channel with a `subscribe()` returning a fresh
//! `Receiver`. This module follows the same shape, but — per the REDESIGN
//! FLAGS guidance — models each topic as a variant of one tagged enum
//! instead of an opaque `{topic, payload}` pair.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Device, Scan, ServiceMovement};

#[derive(Debug, Clone)]
pub enum ReconEvent {
    ScanStarted { scan: Scan },
    ScanProgress { scan_id: String, hosts_alive: u32, subnet_size: u32 },
    ScanCompleted { scan: Scan },
    DeviceDiscovered { scan_id: String, device: Device },
    DeviceUpdated { scan_id: String, device: Device },
    DeviceLost { device_id: Uuid, ip: std::net::IpAddr, last_seen: DateTime<Utc> },
    ServiceMoved { movement: ServiceMovement },
    DeviceHardwareUpdated { device_id: Uuid, collection_source: String },
}

impl ReconEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            ReconEvent::ScanStarted { .. } => "recon.scan.started",
            ReconEvent::ScanProgress { .. } => "recon.scan.progress",
            ReconEvent::ScanCompleted { .. } => "recon.scan.completed",
            ReconEvent::DeviceDiscovered { .. } => "recon.device.discovered",
            ReconEvent::DeviceUpdated { .. } => "recon.device.updated",
            ReconEvent::DeviceLost { .. } => "recon.device.lost",
            ReconEvent::ServiceMoved { .. } => "recon.service.moved",
            ReconEvent::DeviceHardwareUpdated { .. } => "recon.device.hardware.updated",
        }
    }
}

/// Fan-out publish/subscribe port. `publish` awaits delivery; `publish_async`
/// never blocks the caller on a slow or absent subscriber.
#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: ReconEvent);
    fn publish_async(&self, event: ReconEvent);
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ReconEvent>;
}

/// `tokio::sync::broadcast`-backed adapter. Lagging subscribers drop the
/// oldest events rather than block publishers, matching the channel's own
/// semantics; a slow subscriber never stalls a scan.
pub struct BroadcastEventBus {
    tx: tokio::sync::broadcast::Sender<ReconEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: ReconEvent) {
        let _ = self.tx.send(event);
    }

    fn publish_async(&self, event: ReconEvent) {
        let _ = self.tx.send(event);
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ReconEvent> {
        self.tx.subscribe()
    }
}
