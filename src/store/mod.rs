//! The store port (§6, §4.16).
//!
//! Persistence engine internals are out of scope; this module defines the
//! contract the scan orchestrator, watchdog, scheduler, and consolidator
//! depend on, plus one in-process reference adapter (`memory`) that is
//! enough to exercise the contract under test and to run the CLI binary
//! standalone.

pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    AggregatePeriod, Device, DiscoveryMethod, HardwareProfile, HierarchyAssignment, LinkType, Scan,
    ScanMetrics, ScanMetricsAggregate, ServiceMap, ServiceMovement, TopologyLink,
};

/// What the scan orchestrator knows about a freshly-probed host, before
/// identity resolution decides whether it is a new device or an update to
/// an existing one.
#[derive(Debug, Clone)]
pub struct DeviceObservation {
    pub ip: IpAddr,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub manufacturer: Option<String>,
    pub device_type: Option<crate::model::DeviceType>,
    pub discovery_method: DiscoveryMethod,
    pub observed_at: DateTime<Utc>,
    /// Parent device hint, when the collector already knows one (e.g. a
    /// hardware-bridge observation for a VM guest reporting its hypervisor,
    /// §4.13 Proxmox bridge). The flat ICMP/ARP sweep has no such signal at
    /// observation time — the network hierarchy is only inferred after a
    /// scan completes (§4.9) — so its call sites always pass `None` here.
    /// The second identity-resolution tier (§3) matches on the compound key
    /// `(hostname, parent)`, not hostname alone, so that two same-hostname
    /// devices reported under different parents are never merged into one.
    pub parent: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub status: Option<crate::model::DeviceStatus>,
    pub device_type: Option<crate::model::DeviceType>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Result of an upsert: the resolved device plus whether it was newly
/// created (used to decide `device.discovered` vs `device.updated`).
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub device: Device,
    pub created: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_device(
        &self,
        observation: DeviceObservation,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome>;

    async fn get_device(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<Device>>;

    async fn list_devices(&self, filter: DeviceFilter, cancel: &CancellationToken) -> Result<Vec<Device>>;

    async fn update_device_status(
        &self,
        id: Uuid,
        status: crate::model::DeviceStatus,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Applies a classification result to a device's stored type/confidence.
    /// Implementations must honor the no-downgrade contract themselves only
    /// if they want to be called blindly; the composite classifier already
    /// decides whether to call this at all (§4.6), so the store simply
    /// writes what it is told.
    async fn apply_classification(
        &self,
        device_id: Uuid,
        device_type: crate::model::DeviceType,
        confidence: u8,
        source: &str,
        trace: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn apply_hierarchy(
        &self,
        assignments: Vec<HierarchyAssignment>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn stale_devices(
        &self,
        last_seen_before: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Device>>;

    async fn create_scan(&self, scan: Scan, cancel: &CancellationToken) -> Result<()>;

    async fn update_scan(&self, scan: Scan, cancel: &CancellationToken) -> Result<()>;

    async fn get_scan(&self, id: &str, cancel: &CancellationToken) -> Result<Option<Scan>>;

    async fn link_scan_device(&self, scan_id: &str, device_id: Uuid, cancel: &CancellationToken) -> Result<()>;

    async fn upsert_topology_link(&self, link: TopologyLink, cancel: &CancellationToken) -> Result<()>;

    async fn list_topology_links(&self, cancel: &CancellationToken) -> Result<Vec<TopologyLink>>;

    /// Replace every topology link sourced by `source` with the given set
    /// (per-scan recomputation, §3 "Topology links are recomputed per scan
    /// (per source)").
    async fn replace_links_from_source(
        &self,
        source: Uuid,
        link_type: LinkType,
        links: Vec<TopologyLink>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn record_scan_metrics(&self, metrics: ScanMetrics, cancel: &CancellationToken) -> Result<()>;

    async fn list_scan_metrics_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanMetrics>>;

    async fn prune_scan_metrics_before(&self, cutoff: DateTime<Utc>, cancel: &CancellationToken) -> Result<u64>;

    async fn upsert_metrics_aggregate(
        &self,
        aggregate: ScanMetricsAggregate,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn list_metrics_aggregates(
        &self,
        period: AggregatePeriod,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScanMetricsAggregate>>;

    /// The service map recorded by the previous completed scan, if any.
    async fn previous_service_map(&self, cancel: &CancellationToken) -> Result<ServiceMap>;

    async fn set_service_map(&self, map: ServiceMap, cancel: &CancellationToken) -> Result<()>;

    /// Persists movements detected this scan (§4.10). Append-only history;
    /// not read back by the core itself, but kept for downstream
    /// consumers (e.g. a future API surface).
    async fn record_service_movements(&self, movements: Vec<ServiceMovement>, cancel: &CancellationToken) -> Result<()>;

    /// Appends a status transition to a device's history (§4.12, watchdog).
    /// Append-only, same shape as [`Store::record_service_movements`].
    async fn record_status_change(
        &self,
        device_id: Uuid,
        status: crate::model::DeviceStatus,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Composite hardware/storage/GPU/service upsert for a device (§6 store
    /// port, §6 `dispatch.device.profiled` handler). Implementations must
    /// leave a row untouched if it is currently marked `manual` — an
    /// automated collection source never clobbers a hand-edited profile.
    async fn upsert_hardware_profile(
        &self,
        device_id: Uuid,
        profile: HardwareProfile,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn get_hardware_profile(
        &self,
        device_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<HardwareProfile>>;
}
