//! Device-lost watchdog (§4.12).
//!
//! Same `tokio::time::interval` + `tokio::select!` shape as [`crate::scheduler::Scheduler`],
//! grounded on the same `DaemonRuntimeService::heartbeat` tick loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::events::{EventBus, ReconEvent};
use crate::model::DeviceStatus;
use crate::store::Store;

const MIN_TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct Watchdog {
    store: Arc<dyn Store>,
    events: Arc<dyn EventBus>,
    device_lost_after: Duration,
}

impl Watchdog {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventBus>, device_lost_after: Duration) -> Self {
        Self { store, events, device_lost_after }
    }

    /// Ticks at `max(device_lost_after / 4, 1 minute)` (§4.12), sweeping for
    /// devices that haven't been seen since `now - device_lost_after`.
    pub async fn run(&self, cancel: CancellationToken) {
        let tick_interval = (self.device_lost_after / 4).max(MIN_TICK_INTERVAL);
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(&cancel).await;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("watchdog stopping: module shutdown");
                    break;
                }
            }
        }
    }

    async fn sweep(&self, cancel: &CancellationToken) {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.device_lost_after).unwrap_or_default();

        let stale = match self.store.stale_devices(cutoff, cancel).await {
            Ok(devices) => devices,
            Err(err) => {
                tracing::error!(error = %err, "watchdog failed to list stale devices");
                return;
            }
        };

        for device in stale {
            if let Err(err) = self.store.update_device_status(device.id, DeviceStatus::Offline, cancel).await {
                tracing::error!(device_id = %device.id, error = %err, "watchdog failed to mark device offline");
                continue;
            }

            let now = Utc::now();
            if let Err(err) = self.store.record_status_change(device.id, DeviceStatus::Offline, now, cancel).await {
                tracing::error!(device_id = %device.id, error = %err, "watchdog failed to record status history");
            }

            let Some(ip) = device.base.primary_ip() else {
                tracing::warn!(device_id = %device.id, "stale device has no recorded IP, skipping event");
                continue;
            };

            tracing::info!(device_id = %device.id, %ip, "device marked lost");
            self.events
                .publish(ReconEvent::DeviceLost { device_id: device.id, ip, last_seen: device.base.last_seen })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventBus;
    use crate::store::memory::MemoryStore;
    use crate::store::DeviceObservation;
    use crate::model::DiscoveryMethod;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn stale_device_marked_offline_and_event_emitted() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = Arc::new(BroadcastEventBus::new(16));
        let mut rx = events.subscribe();

        let observation = DeviceObservation {
            ip: "10.0.0.9".parse().unwrap(),
            hostname: None,
            mac: Some("AA:BB:CC:DD:EE:09".to_string()),
            manufacturer: None,
            device_type: None,
            discovery_method: DiscoveryMethod::Arp,
            observed_at: Utc::now() - chrono::Duration::hours(2),
            parent: None,
        };
        store.upsert_device(observation, &token()).await.unwrap();

        let watchdog = Watchdog::new(store.clone(), events, Duration::from_secs(60));
        watchdog.sweep(&token()).await;

        let devices = store.list_devices(Default::default(), &token()).await.unwrap();
        assert_eq!(devices[0].base.status, DeviceStatus::Offline);

        let event = rx.try_recv().expect("device lost event expected");
        assert!(matches!(event, ReconEvent::DeviceLost { .. }));
    }

    #[tokio::test]
    async fn fresh_device_is_not_touched() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = Arc::new(BroadcastEventBus::new(16));

        let observation = DeviceObservation {
            ip: "10.0.0.10".parse().unwrap(),
            hostname: None,
            mac: Some("AA:BB:CC:DD:EE:10".to_string()),
            manufacturer: None,
            device_type: None,
            discovery_method: DiscoveryMethod::Arp,
            observed_at: Utc::now(),
            parent: None,
        };
        store.upsert_device(observation, &token()).await.unwrap();

        let watchdog = Watchdog::new(store.clone(), events, Duration::from_secs(60));
        watchdog.sweep(&token()).await;

        let devices = store.list_devices(Default::default(), &token()).await.unwrap();
        assert_eq!(devices[0].base.status, DeviceStatus::Online);
    }
}
