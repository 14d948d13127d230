//! Hardware bridge seam (§6 "Inbound subscription").
//!
//! `dispatch.device.profiled` is the inbound topic a passive hardware
//! collector would publish once it finishes profiling an agent. This module
//! defines the handler's signature and the capability interface
//! (`ProfileSource`) that collector would sit behind — per §1, the collector
//! itself (resolving an agent id to a real CPU/storage/GPU/service
//! inventory) is out of scope, so [`NoopProfileSource`] is the only
//! implementation shipped here.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ReconError, Result};
use crate::events::{EventBus, ReconEvent};
use crate::model::HardwareProfile;
use crate::store::{DeviceFilter, Store};

/// Fetches a normalized hardware/storage/GPU/service profile for an agent.
/// The real implementation (talking to whatever collector produced the
/// `dispatch.device.profiled` event) is out of scope here (§1).
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, agent_id: &str, cancel: &CancellationToken) -> Result<HardwareProfile>;
}

/// No-op default: every fetch fails with [`ReconError::Store`], so
/// [`handle_device_profiled`] logs and returns cleanly rather than writing
/// a fabricated profile.
#[derive(Debug, Default)]
pub struct NoopProfileSource;

#[async_trait]
impl ProfileSource for NoopProfileSource {
    async fn fetch_profile(&self, agent_id: &str, _cancel: &CancellationToken) -> Result<HardwareProfile> {
        Err(ReconError::Store(format!("no profile source configured for agent {agent_id}")))
    }
}

/// Handles one `dispatch.device.profiled` payload: resolves `agent_id` to a
/// device (matched by hostname, the only agent-identifying signal this
/// core's data model carries), fetches its profile, and upserts it
/// preserving any manual data already present (§6). Resolution or fetch
/// failures are logged and swallowed — this is a best-effort inbound
/// handler, not a request/response call a caller waits on.
pub async fn handle_device_profiled(
    payload: &serde_json::Value,
    store: &dyn Store,
    events: &dyn EventBus,
    profile_source: &dyn ProfileSource,
    cancel: &CancellationToken,
) {
    let Some(agent_id) = payload.get("agent_id").and_then(|v| v.as_str()) else {
        tracing::warn!("dispatch.device.profiled payload missing agent_id, ignoring");
        return;
    };

    let devices = match store.list_devices(DeviceFilter::default(), cancel).await {
        Ok(devices) => devices,
        Err(err) => {
            tracing::error!(agent_id, error = %err, "failed to list devices while resolving profiled agent");
            return;
        }
    };
    let Some(device) = devices.into_iter().find(|d| d.base.hostname == agent_id) else {
        tracing::debug!(agent_id, "no device matches profiled agent, ignoring");
        return;
    };

    let profile = match profile_source.fetch_profile(agent_id, cancel).await {
        Ok(profile) => profile,
        Err(err) => {
            tracing::debug!(agent_id, error = %err, "profile source fetch failed, ignoring");
            return;
        }
    };
    let collection_source = profile.collection_source.clone();

    if let Err(err) = store.upsert_hardware_profile(device.id, profile, cancel).await {
        tracing::error!(device_id = %device.id, error = %err, "failed to upsert hardware profile");
        return;
    }

    events
        .publish_async(ReconEvent::DeviceHardwareUpdated { device_id: device.id, collection_source });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEventBus;
    use crate::store::memory::MemoryStore;
    use crate::store::DeviceObservation;
    use chrono::Utc;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn noop_source_leaves_store_untouched() {
        let store = MemoryStore::new();
        let events = BroadcastEventBus::default();
        let cancel = token();

        let outcome = store
            .upsert_device(
                DeviceObservation {
                    ip: "10.0.0.9".parse().unwrap(),
                    hostname: Some("agent-1".into()),
                    mac: None,
                    manufacturer: None,
                    device_type: None,
                    discovery_method: crate::model::DiscoveryMethod::Icmp,
                    observed_at: Utc::now(),
                    parent: None,
                },
                &cancel,
            )
            .await
            .unwrap();

        let payload = serde_json::json!({ "agent_id": "agent-1" });
        handle_device_profiled(&payload, &store, &events, &NoopProfileSource, &cancel).await;

        assert!(store.get_hardware_profile(outcome.device.id, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_agent_id_is_ignored() {
        let store = MemoryStore::new();
        let events = BroadcastEventBus::default();
        let cancel = token();
        let payload = serde_json::json!({ "not_agent_id": "x" });
        handle_device_profiled(&payload, &store, &events, &NoopProfileSource, &cancel).await;
    }
}
