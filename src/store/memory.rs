//! In-process adapter for the [`Store`] port.
//!
//! Not a persistence engine: state lives in memory behind a single
//! `RwLock`. Good enough to exercise the full contract under test and to
//! run the CLI binary without an external database, with no fixture or
//! container needed to bring it up.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ReconError, Result};
use crate::model::{
    AggregatePeriod, Device, DeviceBase, DeviceStatus, HardwareProfile, HierarchyAssignment, LinkType, Scan,
    ScanMetrics, ScanMetricsAggregate, ServiceMap, ServiceMovement, TopologyLink,
};

use super::{DeviceFilter, DeviceObservation, Store, UpsertOutcome};

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ReconError::Store("operation cancelled".into()));
    }
    Ok(())
}

#[derive(Default)]
struct Inner {
    devices: HashMap<Uuid, Device>,
    mac_index: HashMap<String, Uuid>,
    ip_index: HashMap<IpAddr, Uuid>,
    /// Keyed on the compound `(hostname, parent)` pair (§3), not hostname
    /// alone, so devices with the same hostname under different parents
    /// resolve to distinct entries.
    hostname_index: HashMap<(String, Option<Uuid>), Uuid>,
    scans: HashMap<String, Scan>,
    scan_devices: HashMap<String, BTreeSet<Uuid>>,
    links: HashMap<(Uuid, Uuid, LinkType), TopologyLink>,
    raw_metrics: Vec<ScanMetrics>,
    aggregates: HashMap<(AggregatePeriod, DateTime<Utc>), ScanMetricsAggregate>,
    service_map: ServiceMap,
    service_movements: Vec<ServiceMovement>,
    status_history: Vec<(Uuid, DeviceStatus, DateTime<Utc>)>,
    hardware: HashMap<Uuid, HardwareProfile>,
}

impl Inner {
    fn unlink_ip_from_other_device(&mut self, ip: IpAddr, keep: Option<Uuid>) {
        if let Some(&owner) = self.ip_index.get(&ip) {
            if Some(owner) != keep {
                if let Some(dev) = self.devices.get_mut(&owner) {
                    dev.base.ips.retain(|i| *i != ip);
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_device(
        &self,
        observation: DeviceObservation,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome> {
        check(cancel)?;
        let mut inner = self.inner.write().await;

        // Identity resolution order (§3): MAC, then (hostname, parent), then
        // primary IP. See DESIGN.md / SPEC_FULL.md §9 for the MAC-reassignment
        // decision: MAC is the durable key; an IP moves to the device owning
        // its new MAC rather than merging into the device previously seen at
        // that IP. The hostname tier is a compound key, not hostname alone —
        // two devices sharing a hostname but reported under different parents
        // (e.g. same-named VM guests on different hypervisors) must resolve
        // to distinct devices.
        let existing_id = observation
            .mac
            .as_deref()
            .filter(|m| !m.is_empty())
            .and_then(|m| inner.mac_index.get(m).copied())
            .or_else(|| {
                observation
                    .hostname
                    .as_deref()
                    .filter(|h| !h.is_empty())
                    .and_then(|h| inner.hostname_index.get(&(h.to_string(), observation.parent)).copied())
            })
            .or_else(|| inner.ip_index.get(&observation.ip).copied());

        let created = existing_id.is_none();

        let device_id = match existing_id {
            Some(id) => id,
            None => Uuid::new_v4(),
        };

        inner.unlink_ip_from_other_device(observation.ip, Some(device_id));

        let stale_hostname_key = (!created)
            .then(|| inner.devices.get(&device_id))
            .flatten()
            .filter(|d| !d.base.hostname.is_empty())
            .map(|d| (d.base.hostname.clone(), d.base.parent));

        if created {
            let mut base = DeviceBase::new(observation.ip, observation.observed_at);
            base.discovery_method = observation.discovery_method;
            if let Some(h) = observation.hostname.filter(|h| !h.is_empty()) {
                base.hostname = h;
            }
            if let Some(m) = observation.mac.filter(|m| !m.is_empty()) {
                base.mac = Some(m);
            }
            base.manufacturer = observation.manufacturer;
            if let Some(t) = observation.device_type {
                base.device_type = t;
            }
            base.parent = observation.parent;
            let device = Device {
                id: device_id,
                created_at: observation.observed_at,
                updated_at: observation.observed_at,
                base,
            };
            inner.devices.insert(device_id, device);
        } else {
            let device = inner.devices.get_mut(&device_id).expect("indexed device must exist");
            if !device.base.ips.contains(&observation.ip) {
                device.base.ips.insert(0, observation.ip);
            }
            if let Some(h) = observation.hostname.filter(|h| !h.is_empty()) {
                device.base.hostname = h;
            }
            if let Some(m) = observation.mac.filter(|m| !m.is_empty()) {
                device.base.mac = Some(m);
            }
            if let Some(man) = observation.manufacturer {
                device.base.manufacturer = Some(man);
            }
            if let Some(t) = observation.device_type {
                device.base.device_type = t;
            }
            if observation.parent.is_some() {
                device.base.parent = observation.parent;
            }
            device.base.discovery_method = observation.discovery_method;
            device.base.status = DeviceStatus::Online;
            device.base.last_seen = observation.observed_at;
            device.updated_at = observation.observed_at;
        }

        // Reindex. The hostname index is keyed on the compound
        // `(hostname, parent)` pair, so a changed hostname or parent leaves a
        // stale entry behind unless it's dropped first.
        if let Some(stale_key) = stale_hostname_key {
            inner.hostname_index.remove(&stale_key);
        }
        inner.ip_index.insert(observation.ip, device_id);
        let device = inner.devices.get(&device_id).unwrap().clone();
        if let Some(mac) = device.base.mac.clone() {
            inner.mac_index.insert(mac, device_id);
        }
        if !device.base.hostname.is_empty() {
            inner
                .hostname_index
                .insert((device.base.hostname.clone(), device.base.parent), device_id);
        }

        Ok(UpsertOutcome { device, created })
    }

    async fn get_device(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<Device>> {
        check(cancel)?;
        Ok(self.inner.read().await.devices.get(&id).cloned())
    }

    async fn list_devices(&self, filter: DeviceFilter, cancel: &CancellationToken) -> Result<Vec<Device>> {
        check(cancel)?;
        let inner = self.inner.read().await;
        let mut devices: Vec<Device> = inner
            .devices
            .values()
            .filter(|d| filter.status.map(|s| s == d.base.status).unwrap_or(true))
            .filter(|d| filter.device_type.map(|t| t == d.base.device_type).unwrap_or(true))
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.id);
        let end = filter
            .limit
            .map(|l| (filter.offset + l).min(devices.len()))
            .unwrap_or(devices.len());
        Ok(devices.into_iter().skip(filter.offset).take(end.saturating_sub(filter.offset)).collect())
    }

    async fn update_device_status(
        &self,
        id: Uuid,
        status: DeviceStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        let mut inner = self.inner.write().await;
        if let Some(device) = inner.devices.get_mut(&id) {
            device.base.status = status;
        }
        Ok(())
    }

    async fn apply_hierarchy(
        &self,
        assignments: Vec<HierarchyAssignment>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        let mut inner = self.inner.write().await;
        for assignment in assignments {
            let Some(device) = inner.devices.get(&assignment.device) else {
                continue;
            };
            let old_key = (!device.base.hostname.is_empty()).then(|| (device.base.hostname.clone(), device.base.parent));
            let new_hostname = device.base.hostname.clone();

            let device = inner.devices.get_mut(&assignment.device).expect("checked above");
            device.base.parent = assignment.parent;
            device.base.layer = assignment.layer;

            // The hierarchy stage changes a device's parent, so its
            // `(hostname, parent)` index entry must move with it.
            if let Some(old_key) = old_key {
                inner.hostname_index.remove(&old_key);
            }
            if !new_hostname.is_empty() {
                inner.hostname_index.insert((new_hostname, assignment.parent), assignment.device);
            }
        }
        Ok(())
    }

    async fn stale_devices(
        &self,
        last_seen_before: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Device>> {
        check(cancel)?;
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .values()
            .filter(|d| d.base.status == DeviceStatus::Online && d.base.last_seen < last_seen_before)
            .cloned()
            .collect())
    }

    async fn create_scan(&self, scan: Scan, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.scans.insert(scan.id.clone(), scan);
        Ok(())
    }

    async fn update_scan(&self, scan: Scan, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.scans.insert(scan.id.clone(), scan);
        Ok(())
    }

    async fn get_scan(&self, id: &str, cancel: &CancellationToken) -> Result<Option<Scan>> {
        check(cancel)?;
        Ok(self.inner.read().await.scans.get(id).cloned())
    }

    async fn link_scan_device(&self, scan_id: &str, device_id: Uuid, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner
            .write()
            .await
            .scan_devices
            .entry(scan_id.to_string())
            .or_default()
            .insert(device_id);
        Ok(())
    }

    async fn upsert_topology_link(&self, link: TopologyLink, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        if link.source == link.target {
            return Err(ReconError::Store("topology self-loops are rejected".into()));
        }
        self.inner.write().await.links.insert(link.key(), link);
        Ok(())
    }

    async fn list_topology_links(&self, cancel: &CancellationToken) -> Result<Vec<TopologyLink>> {
        check(cancel)?;
        Ok(self.inner.read().await.links.values().cloned().collect())
    }

    async fn replace_links_from_source(
        &self,
        source: Uuid,
        link_type: LinkType,
        links: Vec<TopologyLink>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        let mut inner = self.inner.write().await;
        inner.links.retain(|k, _| !(k.0 == source && k.2 == link_type));
        for link in links {
            if link.source == link.target {
                continue;
            }
            inner.links.insert(link.key(), link);
        }
        Ok(())
    }

    async fn record_scan_metrics(&self, metrics: ScanMetrics, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.raw_metrics.push(metrics);
        Ok(())
    }

    async fn list_scan_metrics_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanMetrics>> {
        check(cancel)?;
        Ok(self
            .inner
            .read()
            .await
            .raw_metrics
            .iter()
            .filter(|m| m.recorded_at >= start && m.recorded_at < end)
            .cloned()
            .collect())
    }

    async fn prune_scan_metrics_before(&self, cutoff: DateTime<Utc>, cancel: &CancellationToken) -> Result<u64> {
        check(cancel)?;
        let mut inner = self.inner.write().await;
        let before = inner.raw_metrics.len();
        inner.raw_metrics.retain(|m| m.recorded_at >= cutoff);
        Ok((before - inner.raw_metrics.len()) as u64)
    }

    async fn upsert_metrics_aggregate(
        &self,
        aggregate: ScanMetricsAggregate,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        let key = (aggregate.period, aggregate.period_start);
        self.inner.write().await.aggregates.insert(key, aggregate);
        Ok(())
    }

    async fn list_metrics_aggregates(
        &self,
        period: AggregatePeriod,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanMetricsAggregate>> {
        check(cancel)?;
        Ok(self
            .inner
            .read()
            .await
            .aggregates
            .values()
            .filter(|a| a.period == period)
            .cloned()
            .collect())
    }

    async fn previous_service_map(&self, cancel: &CancellationToken) -> Result<ServiceMap> {
        check(cancel)?;
        Ok(self.inner.read().await.service_map.clone())
    }

    async fn set_service_map(&self, map: ServiceMap, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.service_map = map;
        Ok(())
    }

    async fn record_service_movements(&self, movements: Vec<ServiceMovement>, cancel: &CancellationToken) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.service_movements.extend(movements);
        Ok(())
    }

    async fn record_status_change(
        &self,
        device_id: Uuid,
        status: DeviceStatus,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        self.inner.write().await.status_history.push((device_id, status, at));
        Ok(())
    }

    async fn upsert_hardware_profile(
        &self,
        device_id: Uuid,
        profile: HardwareProfile,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check(cancel)?;
        let mut inner = self.inner.write().await;
        let manual_on_file = inner.hardware.get(&device_id).map(|p| p.manual).unwrap_or(false);
        if manual_on_file && !profile.manual {
            return Ok(());
        }
        inner.hardware.insert(device_id, profile);
        Ok(())
    }

    async fn get_hardware_profile(&self, device_id: Uuid, cancel: &CancellationToken) -> Result<Option<HardwareProfile>> {
        check(cancel)?;
        Ok(self.inner.read().await.hardware.get(&device_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscoveryMethod;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn obs(ip: &str, mac: Option<&str>) -> DeviceObservation {
        DeviceObservation {
            ip: ip.parse().unwrap(),
            hostname: None,
            mac: mac.map(|m| m.to_string()),
            manufacturer: None,
            device_type: None,
            discovery_method: if mac.is_some() { DiscoveryMethod::Arp } else { DiscoveryMethod::Icmp },
            observed_at: Utc::now(),
            parent: None,
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_by_mac() {
        let store = MemoryStore::new();
        let cancel = token();
        let first = store.upsert_device(obs("10.0.0.1", Some("AA:BB:CC:DD:EE:01")), &cancel).await.unwrap();
        assert!(first.created);
        let second = store.upsert_device(obs("10.0.0.1", Some("AA:BB:CC:DD:EE:01")), &cancel).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.device.id, second.device.id);
    }

    #[tokio::test]
    async fn same_hostname_under_different_parents_are_distinct_devices() {
        let store = MemoryStore::new();
        let cancel = token();
        let parent_a = Uuid::new_v4();
        let parent_b = Uuid::new_v4();

        let under_a = DeviceObservation {
            parent: Some(parent_a),
            hostname: Some("guest-1".to_string()),
            ..obs("10.0.1.5", None)
        };
        let under_b = DeviceObservation {
            parent: Some(parent_b),
            hostname: Some("guest-1".to_string()),
            ..obs("10.0.2.5", None)
        };

        let a = store.upsert_device(under_a, &cancel).await.unwrap();
        let b = store.upsert_device(under_b, &cancel).await.unwrap();
        assert!(a.created);
        assert!(b.created);
        assert_ne!(a.device.id, b.device.id, "same hostname under different parents must not collide");

        // A second observation with the same (hostname, parent) pair updates
        // the existing device rather than creating a third one.
        let repeat_under_a = DeviceObservation {
            parent: Some(parent_a),
            hostname: Some("guest-1".to_string()),
            ..obs("10.0.1.6", None)
        };
        let repeat = store.upsert_device(repeat_under_a, &cancel).await.unwrap();
        assert!(!repeat.created);
        assert_eq!(repeat.device.id, a.device.id);
    }

    #[tokio::test]
    async fn mac_reassignment_moves_ip_without_deleting_old_device() {
        let store = MemoryStore::new();
        let cancel = token();
        let old = store.upsert_device(obs("10.0.0.5", Some("AA:AA:AA:AA:AA:01")), &cancel).await.unwrap();
        let new = store.upsert_device(obs("10.0.0.5", Some("BB:BB:BB:BB:BB:02")), &cancel).await.unwrap();
        assert_ne!(old.device.id, new.device.id);
        let old_after = store.get_device(old.device.id, &cancel).await.unwrap().unwrap();
        assert!(!old_after.base.ips.contains(&"10.0.0.5".parse().unwrap()));
        let new_after = store.get_device(new.device.id, &cancel).await.unwrap().unwrap();
        assert!(new_after.base.ips.contains(&"10.0.0.5".parse().unwrap()));
    }

    #[tokio::test]
    async fn topology_link_self_loop_rejected() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let link = TopologyLink { source: id, target: id, link_type: LinkType::Arp, source_port: None, target_port: None, speed_mbps: None };
        assert!(store.upsert_topology_link(link, &token()).await.is_err());
    }

    #[tokio::test]
    async fn hardware_upsert_never_overwrites_a_manual_row() {
        let store = MemoryStore::new();
        let cancel = token();
        let device_id = Uuid::new_v4();
        let manual = HardwareProfile { cpu_model: Some("hand-entered".into()), manual: true, ..Default::default() };
        store.upsert_hardware_profile(device_id, manual.clone(), &cancel).await.unwrap();

        let collected = HardwareProfile { cpu_model: Some("auto-detected".into()), collection_source: "bridge".into(), manual: false, ..Default::default() };
        store.upsert_hardware_profile(device_id, collected, &cancel).await.unwrap();

        let stored = store.get_hardware_profile(device_id, &cancel).await.unwrap().unwrap();
        assert_eq!(stored, manual);
    }

    #[tokio::test]
    async fn topology_link_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let link = TopologyLink { source: a, target: b, link_type: LinkType::Arp, source_port: None, target_port: None, speed_mbps: None };
        store.upsert_topology_link(link.clone(), &token()).await.unwrap();
        store.upsert_topology_link(link, &token()).await.unwrap();
        let links = store.list_topology_links(&token()).await.unwrap();
        assert_eq!(links.len(), 1);
    }
}
