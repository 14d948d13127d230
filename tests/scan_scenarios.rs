//! End-to-end scan pipeline scenarios (SPEC_FULL.md §8, scenarios 1-5),
//! driven through [`reconcore::scan::run_scan`] against a fresh
//! [`reconcore::store::memory::MemoryStore`] and doubles for the sweeper,
//! ARP reader, and OUI resolver.

mod common;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use common::{host_alive, test_deps, CancellingSweeper, FakeArp, FakeOui, FakeSweeper};
use reconcore::events::EventBus;
use reconcore::model::{DiscoveryMethod, ScanStatus};
use reconcore::store::{DeviceFilter, Store};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn new_scan_id() -> String {
    Uuid::new_v4().to_string()
}

#[tokio::test]
async fn basic_slash_24_scan_discovers_two_hosts() {
    let gw = "192.168.50.1".parse().unwrap();
    let second = "192.168.50.2".parse().unwrap();

    let sweeper = Arc::new(FakeSweeper::new(vec![host_alive(gw), host_alive(second)]));
    let arp = Arc::new(FakeArp::new(HashMap::from([(gw, "AA:BB:CC:DD:EE:01".to_string())])));
    let oui = Arc::new(FakeOui);
    let deps = test_deps(sweeper, arp, oui);

    let scan_id = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &scan_id, "192.168.50.0/24").await;

    let mut events = deps.events.subscribe();

    reconcore::scan::run_scan(&deps, CancellationToken::new(), scan_id.clone(), "192.168.50.0/24".to_string())
        .await
        .unwrap();

    let scan = deps.store.get_scan(&scan_id, &CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.hosts_discovered, 2);
    assert_eq!(scan.hosts_online, 2);

    let devices = deps.store.list_devices(DeviceFilter::default(), &CancellationToken::new()).await.unwrap();
    assert_eq!(devices.len(), 2);

    let gw_device = devices.iter().find(|d| d.base.ips.contains(&IpAddr::V4(gw))).unwrap();
    assert_eq!(gw_device.base.discovery_method, DiscoveryMethod::Arp);
    assert_eq!(gw_device.base.manufacturer.as_deref(), Some("TestVendor"));

    let other_device = devices.iter().find(|d| d.base.ips.contains(&IpAddr::V4(second))).unwrap();
    assert_eq!(other_device.base.discovery_method, DiscoveryMethod::Icmp);
    assert_eq!(other_device.base.manufacturer, None);

    let mut discovered = 0;
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            reconcore::events::ReconEvent::DeviceDiscovered { .. } => discovered += 1,
            reconcore::events::ReconEvent::ScanCompleted { .. } => completed += 1,
            _ => {}
        }
    }
    assert_eq!(discovered, 2);
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn rescanning_the_same_subnet_updates_instead_of_recreating() {
    let gw = "192.168.60.1".parse().unwrap();
    let second = "192.168.60.2".parse().unwrap();

    let sweeper = Arc::new(FakeSweeper::new(vec![host_alive(gw), host_alive(second)]));
    let arp = Arc::new(FakeArp::new(HashMap::from([(gw, "AA:BB:CC:DD:EE:01".to_string())])));
    let deps = test_deps(sweeper, arp, Arc::new(FakeOui));

    let first_scan = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &first_scan, "192.168.60.0/24").await;
    reconcore::scan::run_scan(&deps, CancellationToken::new(), first_scan, "192.168.60.0/24".to_string())
        .await
        .unwrap();

    let mut events = deps.events.subscribe();
    let second_scan = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &second_scan, "192.168.60.0/24").await;
    reconcore::scan::run_scan(&deps, CancellationToken::new(), second_scan, "192.168.60.0/24".to_string())
        .await
        .unwrap();

    let devices = deps.store.list_devices(DeviceFilter::default(), &CancellationToken::new()).await.unwrap();
    assert_eq!(devices.len(), 2, "re-scan must not create duplicate devices");

    let mut discovered = 0;
    let mut updated = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            reconcore::events::ReconEvent::DeviceDiscovered { .. } => discovered += 1,
            reconcore::events::ReconEvent::DeviceUpdated { .. } => updated += 1,
            _ => {}
        }
    }
    assert_eq!(discovered, 0, "second run over the same hosts creates no new devices");
    assert_eq!(updated, 2);
}

#[tokio::test]
async fn cancellation_mid_sweep_leaves_the_scan_failed() {
    let deps = test_deps(Arc::new(CancellingSweeper), Arc::new(FakeArp::empty()), Arc::new(FakeOui));

    let scan_id = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &scan_id, "10.0.0.0/24").await;

    let cancel = CancellationToken::new();
    reconcore::scan::run_scan(&deps, cancel, scan_id.clone(), "10.0.0.0/24".to_string()).await.unwrap();

    let scan = deps.store.get_scan(&scan_id, &CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Failed);
}

#[tokio::test]
async fn malformed_cidr_fails_the_scan_without_touching_devices() {
    let deps = test_deps(Arc::new(FakeSweeper::new(vec![])), Arc::new(FakeArp::empty()), Arc::new(FakeOui));

    let scan_id = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &scan_id, "not-a-cidr").await;

    reconcore::scan::run_scan(&deps, CancellationToken::new(), scan_id.clone(), "not-a-cidr".to_string())
        .await
        .unwrap();

    let scan = deps.store.get_scan(&scan_id, &CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Failed);
    assert!(scan.error.is_some());

    let devices = deps.store.list_devices(DeviceFilter::default(), &CancellationToken::new()).await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn topology_links_point_every_host_at_the_gateway() {
    let gw = "192.168.70.1".parse().unwrap();
    let host_a = "192.168.70.10".parse().unwrap();
    let host_b = "192.168.70.20".parse().unwrap();

    let sweeper = Arc::new(FakeSweeper::new(vec![host_alive(gw), host_alive(host_a), host_alive(host_b)]));
    let arp = Arc::new(FakeArp::new(HashMap::from([
        (gw, "AA:BB:CC:DD:EE:01".to_string()),
        (host_a, "11:22:33:44:55:66".to_string()),
        (host_b, "77:88:99:AA:BB:CC".to_string()),
    ])));
    let deps = test_deps(sweeper, arp, Arc::new(FakeOui));

    let scan_id = new_scan_id();
    common::seed_running_scan(deps.store.as_ref(), &scan_id, "192.168.70.0/24").await;
    reconcore::scan::run_scan(&deps, CancellationToken::new(), scan_id, "192.168.70.0/24".to_string())
        .await
        .unwrap();

    let devices = deps.store.list_devices(DeviceFilter::default(), &CancellationToken::new()).await.unwrap();
    let gw_device = devices.iter().find(|d| d.base.ips.contains(&IpAddr::V4(gw))).unwrap();

    let links = deps.store.list_topology_links(&CancellationToken::new()).await.unwrap();
    assert_eq!(links.len(), 2);
    for link in &links {
        assert_eq!(link.target, gw_device.id);
        assert_ne!(link.source, gw_device.id, "the gateway must never be its own link source");
    }
}
