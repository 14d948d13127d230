//! Scan orchestrator (§4.7): drives the discovery pipeline end to end.
//!
//! Grounded on the session lifecycle in the reference codebase's
//! `DiscoveryService` (`server::discovery::service`) — a single task owns
//! per-session state, streams progress over a broadcast channel, and
//! writes a historical record on every terminal transition — adapted here
//! to stream per-device events instead of a single session payload, and to
//! drive the probe/enrich/classify pipeline itself rather than delegating
//! it to a remote daemon.

use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::{classify_by_manufacturer, classify_by_port_fingerprint, is_infrastructure_type, CompositeClassifier, SignalBundle};
use crate::events::{EventBus, ReconEvent};
use crate::model::{Device, DeviceType, DiscoveryMethod, ScanMetrics, ServiceMap};
use crate::net::icmp::os_hint_from_ttl;
use crate::net::{portscan, ArpSnapshotter, OuiLookup, Sweeper};
use crate::store::{DeviceFilter, DeviceObservation, Store};

/// Curated probe knobs for the stages that aren't exposed as top-level
/// config options (§6 doesn't name them individually): port-fingerprint
/// timeout/concurrency and the SNMP community/timeout used for the
/// sysDescr signal.
#[derive(Debug, Clone)]
pub struct ScanStageConfig {
    pub port_fingerprint_timeout: Duration,
    pub port_fingerprint_concurrency: usize,
    pub snmp_community: String,
    pub snmp_timeout: Duration,
    pub arp_enabled: bool,
    pub confidence_floor: u8,
}

impl Default for ScanStageConfig {
    fn default() -> Self {
        Self {
            port_fingerprint_timeout: Duration::from_secs(2),
            port_fingerprint_concurrency: 10,
            snmp_community: "public".to_string(),
            snmp_timeout: Duration::from_secs(1),
            arp_enabled: true,
            confidence_floor: 25,
        }
    }
}

/// Everything `run_scan` needs, gathered into one bundle so the module
/// bootstrap constructs it once and every scan task shares it (§9 "inject
/// the event bus via the module's initialization bundle").
pub struct ScanDeps {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventBus>,
    pub sweeper: Arc<dyn Sweeper>,
    pub arp: Arc<dyn ArpSnapshotter>,
    pub oui: Arc<dyn OuiLookup>,
    pub classifier: Arc<CompositeClassifier>,
    pub stage_config: ScanStageConfig,
}

/// Per-host bookkeeping carried from the streaming phase into the
/// post-scan stages, in sweep arrival order.
struct HostContext {
    device_id: Uuid,
    ip: Ipv4Addr,
    ttl: Option<u8>,
    manufacturer: Option<String>,
    /// The device type `classify_by_manufacturer` produced during the
    /// streaming phase (§4.7 step 5) — the "ARP-derived guess" the
    /// port-fingerprint stage must not downgrade.
    arp_derived_type: DeviceType,
}

/// A context that is never itself cancelled, used for the terminal write
/// on the cancellation cleanup path (§4.7 step 6, §5, §9 "cancellation-safe
/// cleanup"). Conflating this with the scan's own cancel token would leave
/// the scan stuck in `running`.
fn cleanup_token() -> CancellationToken {
    CancellationToken::new()
}

/// Drives one scan to completion. Preconditions: a running scan record
/// with `scan_id` already exists in the store (§4.7).
pub async fn run_scan(deps: &ScanDeps, cancel: CancellationToken, scan_id: String, cidr: String) -> anyhow::Result<()> {
    let start = Instant::now();

    let subnet = match crate::net::expand(&cidr) {
        Ok(subnet) => subnet,
        Err(err) => {
            tracing::error!(scan_id, %cidr, error = %err, "invalid CIDR, failing scan");
            fail_scan(deps, &scan_id, err.to_string()).await;
            return Ok(());
        }
    };

    let Some(mut scan) = deps.store.get_scan(&scan_id, &cancel).await? else {
        anyhow::bail!("scan {scan_id} not found: orchestrator precondition violated");
    };

    deps.events.publish(ReconEvent::ScanStarted { scan: scan.clone() }).await;
    tracing::info!(scan_id, %cidr, hosts = subnet.len(), "scan started");

    let arp_map = if deps.stage_config.arp_enabled {
        deps.arp.snapshot(&cancel).await
    } else {
        HashMap::new()
    };

    let mut host_ctx: Vec<HostContext> = Vec::new();
    let mut devices_created = 0u32;
    let mut devices_updated = 0u32;
    let mut alive_count = 0u32;

    let mut sweep = deps.sweeper.sweep(cancel.clone(), subnet.hosts().to_vec());
    while let Some(result) = sweep.next().await {
        let ip = result.ip;
        let mac = arp_map.get(&ip).cloned();
        let hostname = crate::net::dns::resolve_hostname(IpAddr::V4(ip)).await;

        let (discovery_method, manufacturer, arp_derived_type) = match &mac {
            Some(mac) => {
                let manufacturer = deps.oui.lookup(mac);
                let device_type = classify_by_manufacturer(manufacturer.as_deref().unwrap_or(""));
                (DiscoveryMethod::Arp, manufacturer, device_type)
            }
            None => (DiscoveryMethod::Icmp, None, DeviceType::Unknown),
        };

        let observation = DeviceObservation {
            ip: IpAddr::V4(ip),
            hostname: Some(hostname).filter(|h| !h.is_empty()),
            mac: mac.clone(),
            manufacturer: manufacturer.clone(),
            device_type: Some(arp_derived_type).filter(|t| *t != DeviceType::Unknown),
            discovery_method,
            observed_at: Utc::now(),
            // The flat sweep has no parent signal yet; hierarchy is only
            // inferred after every device from this scan has been upserted
            // (`stage_hierarchy`, §4.9).
            parent: None,
        };

        let outcome = match deps.store.upsert_device(observation, &cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(scan_id, %ip, error = %err, "device upsert failed, skipping host");
                continue;
            }
        };

        if let Err(err) = deps.store.link_scan_device(&scan_id, outcome.device.id, &cancel).await {
            tracing::error!(scan_id, %ip, error = %err, "failed to link device to scan");
        }

        if outcome.created {
            devices_created += 1;
            deps.events
                .publish(ReconEvent::DeviceDiscovered { scan_id: scan_id.clone(), device: outcome.device.clone() })
                .await;
        } else {
            devices_updated += 1;
            deps.events
                .publish(ReconEvent::DeviceUpdated { scan_id: scan_id.clone(), device: outcome.device.clone() })
                .await;
        }

        alive_count += 1;
        deps.events
            .publish(ReconEvent::ScanProgress {
                scan_id: scan_id.clone(),
                hosts_alive: alive_count,
                subnet_size: subnet.len() as u32,
            })
            .await;

        host_ctx.push(HostContext {
            device_id: outcome.device.id,
            ip,
            ttl: result.ttl,
            manufacturer,
            arp_derived_type,
        });
    }
    drop(sweep);

    let ping_phase = start.elapsed();

    if cancel.is_cancelled() {
        tracing::warn!(scan_id, "scan cancelled during sweep");
        scan.mark_failed("cancelled", Utc::now());
        if let Err(err) = deps.store.update_scan(scan.clone(), &cleanup_token()).await {
            tracing::error!(scan_id, error = %err, "failed to persist cancelled scan state");
        }
        deps.events.publish_async(ReconEvent::ScanCompleted { scan });
        record_metrics(deps, &scan_id, start.elapsed(), ping_phase, subnet.len() as u32, alive_count, devices_created, devices_updated, true).await;
        return Ok(());
    }

    // §4.7 step 7: post-scan stages, fixed order, cancellation-checked
    // between each.
    let mut device_state: HashMap<Uuid, (DeviceType, u8)> = host_ctx
        .iter()
        .map(|h| (h.device_id, (h.arp_derived_type, 0u8)))
        .collect();
    let mut port_sets: HashMap<Uuid, BTreeSet<u16>> = HashMap::new();

    if !cancel.is_cancelled() {
        stage_port_fingerprint(deps, &cancel, &host_ctx, &mut device_state, &mut port_sets).await;
    }
    if !cancel.is_cancelled() {
        stage_composite_classification(deps, &cancel, &host_ctx, &mut device_state, &port_sets).await;
    }
    if !cancel.is_cancelled() {
        stage_unmanaged_switch(deps, &cancel, &host_ctx, &mut device_state, &port_sets).await;
    }
    if !cancel.is_cancelled() {
        stage_topology_links(deps, &cancel, &subnet, &host_ctx).await;
    }
    if !cancel.is_cancelled() {
        stage_hierarchy(deps, &cancel).await;
    }
    if !cancel.is_cancelled() {
        stage_service_movements(deps, &cancel, &host_ctx, &port_sets).await;
    } else {
        tracing::warn!(scan_id, "scan cancelled mid post-processing, remaining stages skipped");
    }

    scan.mark_completed(alive_count, alive_count, Utc::now());
    if let Err(err) = deps.store.update_scan(scan.clone(), &cancel).await {
        tracing::error!(scan_id, error = %err, "failed to persist completed scan");
    }
    deps.events.publish(ReconEvent::ScanCompleted { scan }).await;
    tracing::info!(scan_id, alive = alive_count, "scan completed");

    record_metrics(deps, &scan_id, start.elapsed(), ping_phase, subnet.len() as u32, alive_count, devices_created, devices_updated, false).await;

    Ok(())
}

async fn fail_scan(deps: &ScanDeps, scan_id: &str, reason: String) {
    if let Ok(Some(mut scan)) = deps.store.get_scan(scan_id, &cleanup_token()).await {
        scan.mark_failed(reason, Utc::now());
        if let Err(err) = deps.store.update_scan(scan, &cleanup_token()).await {
            tracing::error!(scan_id, error = %err, "failed to persist failed scan state");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn record_metrics(
    deps: &ScanDeps,
    scan_id: &str,
    total: Duration,
    ping_phase: Duration,
    hosts_scanned: u32,
    hosts_alive: u32,
    devices_created: u32,
    devices_updated: u32,
    failed: bool,
) {
    let metrics = ScanMetrics {
        scan_id: scan_id.to_string(),
        recorded_at: Utc::now(),
        duration_ms: total.as_millis() as u64,
        ping_phase_ms: ping_phase.as_millis() as u64,
        enrich_phase_ms: total.saturating_sub(ping_phase).as_millis() as u64,
        hosts_scanned,
        hosts_alive,
        devices_created,
        devices_updated,
        failed,
    };
    if let Err(err) = deps.store.record_scan_metrics(metrics, &cleanup_token()).await {
        tracing::error!(scan_id, error = %err, "failed to record scan metrics");
    }
}

/// §4.7 step 7.1: port fingerprint on ARP-derived infrastructure
/// candidates. Retains every alive host's open-port set (default empty)
/// for the composite classifier and the movement detector's current map.
async fn stage_port_fingerprint(
    deps: &ScanDeps,
    cancel: &CancellationToken,
    hosts: &[HostContext],
    device_state: &mut HashMap<Uuid, (DeviceType, u8)>,
    port_sets: &mut HashMap<Uuid, BTreeSet<u16>>,
) {
    let candidates: Vec<&HostContext> = hosts.iter().filter(|h| is_infrastructure_type(h.arp_derived_type)).collect();

    let probes = futures::stream::iter(candidates.iter().map(|h| (h.device_id, h.ip)))
        .map(|(device_id, ip)| {
            let cancel = cancel.clone();
            let timeout = deps.stage_config.port_fingerprint_timeout;
            async move {
                let ports = portscan::scan_tcp_ports(IpAddr::V4(ip), portscan::INFRA_PORT_LIST, timeout, 4, &cancel).await;
                (device_id, ports)
            }
        })
        .buffer_unordered(deps.stage_config.port_fingerprint_concurrency)
        .collect::<Vec<_>>()
        .await;

    for (device_id, ports) in probes {
        port_sets.insert(device_id, ports.clone());

        if let Some(fingerprint_type) = classify_by_port_fingerprint(&ports) {
            let (current_type, _) = device_state.get(&device_id).copied().unwrap_or((DeviceType::Unknown, 0));
            let arp_guess = hosts.iter().find(|h| h.device_id == device_id).map(|h| h.arp_derived_type);
            let no_downgrade = current_type == DeviceType::Unknown || Some(current_type) == arp_guess;
            if no_downgrade {
                device_state.insert(device_id, (fingerprint_type, 60));
                if let Err(err) = deps
                    .store
                    .apply_classification(device_id, fingerprint_type, 60, "port_fingerprint", vec!["arp-infra candidate port probe".to_string()], cancel)
                    .await
                {
                    tracing::error!(%device_id, error = %err, "failed to apply port-fingerprint classification");
                }
            }
        }
    }

    for host in hosts {
        port_sets.entry(host.device_id).or_default();
    }
}

/// §4.7 step 7.2: composite classification over the accumulated signals.
async fn stage_composite_classification(
    deps: &ScanDeps,
    cancel: &CancellationToken,
    hosts: &[HostContext],
    device_state: &mut HashMap<Uuid, (DeviceType, u8)>,
    port_sets: &HashMap<Uuid, BTreeSet<u16>>,
) {
    for host in hosts {
        if cancel.is_cancelled() {
            return;
        }
        let open_ports = port_sets.get(&host.device_id).cloned().unwrap_or_default();
        let snmp_sys_descr = if open_ports.contains(&161) {
            portscan::query_snmp_sys_descr(IpAddr::V4(host.ip), &deps.stage_config.snmp_community, deps.stage_config.snmp_timeout).await
        } else {
            None
        };

        let signals = SignalBundle {
            manufacturer: host.manufacturer.clone(),
            ttl: host.ttl,
            os_hint: os_hint_from_ttl(host.ttl),
            open_ports,
            snmp_sys_descr,
        };

        let result = deps.classifier.classify(&signals);
        tracing::debug!(device_id = %host.device_id, trace = ?result.trace, "composite classification");

        let (existing_type, existing_confidence) = device_state.get(&host.device_id).copied().unwrap_or((DeviceType::Unknown, 0));
        if let Some((device_type, confidence)) = deps.classifier.apply(existing_type, existing_confidence, &result) {
            device_state.insert(host.device_id, (device_type, confidence));
            if let Err(err) = deps
                .store
                .apply_classification(host.device_id, device_type, confidence, result.source, result.trace, cancel)
                .await
            {
                tracing::error!(device_id = %host.device_id, error = %err, "failed to apply composite classification");
            }
        }
    }
}

/// §4.7 step 7.3: a host with an infrastructure OUI, no SNMP reachability,
/// no open ports, and still unknown is labeled switch at low confidence.
async fn stage_unmanaged_switch(
    deps: &ScanDeps,
    cancel: &CancellationToken,
    hosts: &[HostContext],
    device_state: &mut HashMap<Uuid, (DeviceType, u8)>,
    port_sets: &HashMap<Uuid, BTreeSet<u16>>,
) {
    for host in hosts {
        if cancel.is_cancelled() {
            return;
        }
        let (current_type, _) = device_state.get(&host.device_id).copied().unwrap_or((DeviceType::Unknown, 0));
        if current_type != DeviceType::Unknown {
            continue;
        }
        let infra_oui = host.manufacturer.as_deref().map(|m| is_infrastructure_type(classify_by_manufacturer(m))).unwrap_or(false);
        let no_ports = port_sets.get(&host.device_id).map(BTreeSet::is_empty).unwrap_or(true);
        if infra_oui && no_ports {
            device_state.insert(host.device_id, (DeviceType::Switch, 15));
            if let Err(err) = deps
                .store
                .apply_classification(host.device_id, DeviceType::Switch, 15, "unmanaged_switch_inference", vec!["infra OUI, no SNMP, no open ports".to_string()], cancel)
                .await
            {
                tracing::error!(device_id = %host.device_id, error = %err, "failed to apply unmanaged-switch inference");
            }
        }
    }
}

/// §4.7 step 7.4: ARP-edge links from every alive host to the subnet
/// gateway. Silently disabled if the gateway never answered.
async fn stage_topology_links(deps: &ScanDeps, cancel: &CancellationToken, subnet: &crate::net::ExpandedSubnet, hosts: &[HostContext]) {
    let gateway_ip = subnet.gateway();
    let Some(gateway_device) = hosts.iter().find(|h| h.ip == gateway_ip).map(|h| h.device_id) else {
        tracing::debug!(%gateway_ip, "gateway did not respond, topology stage disabled for this scan");
        return;
    };

    let host_devices: Vec<Uuid> = hosts.iter().map(|h| h.device_id).collect();
    let links = super::topology::build_gateway_links(gateway_device, &host_devices);

    // Each host is its own link source (host -> gateway); recompute per
    // source (§3 "Topology links are recomputed per scan (per source)") by
    // replacing that host's arp-type links with the single current one.
    for link in links {
        if let Err(err) = deps
            .store
            .replace_links_from_source(link.source, crate::model::LinkType::Arp, vec![link], cancel)
            .await
        {
            tracing::error!(error = %err, "failed to upsert topology link");
        }
    }
}

/// §4.9: recompute the whole hierarchy from scratch over every known device
/// and link, not just this scan's hosts — "Recomputed from scratch each
/// run" (§3) means the full graph, since a device discovered in an earlier
/// scan can still be another device's parent.
async fn stage_hierarchy(deps: &ScanDeps, cancel: &CancellationToken) {
    let devices = match deps.store.list_devices(DeviceFilter::default(), cancel).await {
        Ok(devices) => devices,
        Err(err) => {
            tracing::error!(error = %err, "failed to list devices for hierarchy inference, skipping");
            return;
        }
    };
    let links = match deps.store.list_topology_links(cancel).await {
        Ok(links) => links,
        Err(err) => {
            tracing::error!(error = %err, "failed to list topology links for hierarchy inference, skipping");
            return;
        }
    };

    let assignments = super::hierarchy::infer(&devices, &links);
    if let Err(err) = deps.store.apply_hierarchy(assignments, cancel).await {
        tracing::error!(error = %err, "failed to persist hierarchy assignments");
    }
}

/// §4.7 step 7.5: diff the previous and current service maps, persist and
/// emit movements. The current map is built from the port sets retained in
/// stage 7.1, with hosts never probed contributing an empty set — the
/// Open Question wiring resolved in SPEC_FULL.md §9.
async fn stage_service_movements(deps: &ScanDeps, cancel: &CancellationToken, hosts: &[HostContext], port_sets: &HashMap<Uuid, BTreeSet<u16>>) {
    let prev = match deps.store.previous_service_map(cancel).await {
        Ok(map) => map,
        Err(err) => {
            tracing::error!(error = %err, "failed to load previous service map, skipping movement detection");
            return;
        }
    };

    let mut curr: ServiceMap = ServiceMap::new();
    for host in hosts {
        curr.insert(host.device_id, port_sets.get(&host.device_id).cloned().unwrap_or_default());
    }

    let movements = super::movement::detect(&prev, &curr);

    if !movements.is_empty() {
        if let Err(err) = deps.store.record_service_movements(movements.clone(), cancel).await {
            tracing::error!(error = %err, "failed to persist service movements");
        }
        for movement in movements {
            deps.events.publish(ReconEvent::ServiceMoved { movement }).await;
        }
    }

    if let Err(err) = deps.store.set_service_map(curr, cancel).await {
        tracing::error!(error = %err, "failed to persist current service map");
    }
}

/// Convenience used by the hardware bridge placeholder (§6 inbound
/// subscription) and the CLI `scan` subcommand to fetch every device seen
/// in a completed scan.
pub async fn devices_for_scan(store: &dyn Store, _scan_id: &str, cancel: &CancellationToken) -> anyhow::Result<Vec<Device>> {
    Ok(store.list_devices(DeviceFilter::default(), cancel).await?)
}
