//! Test doubles and fixture builders shared across the integration suite.
//!
//! Mirrors the seed-scenario fakes named in SPEC_FULL.md §8: a sweeper that
//! plays back a fixed host list instead of sending real ICMP echoes, an ARP
//! table double, and an OUI lookup double that knows one synthetic vendor.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, Stream};
use reconcore::classify::CompositeClassifier;
use reconcore::events::BroadcastEventBus;
use reconcore::model::Scan;
use reconcore::net::{ArpSnapshotter, HostResult, OuiLookup, Sweeper};
use reconcore::scan::{ScanDeps, ScanStageConfig};
use reconcore::store::memory::MemoryStore;
use reconcore::store::Store;
use tokio_util::sync::CancellationToken;

/// Plays back a fixed set of alive hosts, ignoring whatever host list the
/// orchestrator asked it to sweep.
pub struct FakeSweeper {
    hosts: Vec<HostResult>,
}

impl FakeSweeper {
    pub fn new(hosts: Vec<HostResult>) -> Self {
        Self { hosts }
    }
}

impl Sweeper for FakeSweeper {
    fn sweep(&self, _cancel: CancellationToken, _hosts: Vec<Ipv4Addr>) -> Pin<Box<dyn Stream<Item = HostResult> + Send>> {
        Box::pin(stream::iter(self.hosts.clone()))
    }
}

/// Cancels the scan's own token the moment it is asked to sweep, then
/// yields nothing — the seed scenario for mid-sweep cancellation (§8
/// scenario 3) doesn't need a real sweep in flight to exercise the
/// cancellation-safe cleanup path.
pub struct CancellingSweeper;

impl Sweeper for CancellingSweeper {
    fn sweep(&self, cancel: CancellationToken, _hosts: Vec<Ipv4Addr>) -> Pin<Box<dyn Stream<Item = HostResult> + Send>> {
        cancel.cancel();
        Box::pin(stream::empty())
    }
}

pub struct FakeArp(HashMap<Ipv4Addr, String>);

impl FakeArp {
    pub fn new(map: HashMap<Ipv4Addr, String>) -> Self {
        Self(map)
    }

    pub fn empty() -> Self {
        Self(HashMap::new())
    }
}

#[async_trait::async_trait]
impl ArpSnapshotter for FakeArp {
    async fn snapshot(&self, _cancel: &CancellationToken) -> HashMap<Ipv4Addr, String> {
        self.0.clone()
    }
}

/// Knows exactly one vendor: any MAC in the `AA:BB:CC` OUI block resolves to
/// `"TestVendor"` (§8 scenario 1's synthetic mapping); everything else is
/// unknown.
pub struct FakeOui;

impl OuiLookup for FakeOui {
    fn lookup(&self, mac: &str) -> Option<String> {
        if mac.starts_with("AA:BB:CC") {
            Some("TestVendor".to_string())
        } else {
            None
        }
    }
}

pub fn host_alive(ip: Ipv4Addr) -> HostResult {
    HostResult { ip, rtt: Duration::from_millis(3), ttl: Some(64), method: "icmp" }
}

/// Assembles a [`ScanDeps`] bundle around a fresh [`MemoryStore`] and
/// [`BroadcastEventBus`], with the supplied sweeper/ARP/OUI doubles standing
/// in for the platform adapters.
pub fn test_deps(sweeper: Arc<dyn Sweeper>, arp: Arc<dyn ArpSnapshotter>, oui: Arc<dyn OuiLookup>) -> Arc<ScanDeps> {
    let stage_config = ScanStageConfig::default();
    Arc::new(ScanDeps {
        store: Arc::new(MemoryStore::new()),
        events: Arc::new(BroadcastEventBus::default()),
        sweeper,
        arp,
        oui,
        classifier: Arc::new(CompositeClassifier::new(stage_config.confidence_floor)),
        stage_config,
    })
}

/// Creates the running scan row `run_scan` expects to already exist (§4.7
/// precondition) and returns its id.
pub async fn seed_running_scan(store: &dyn Store, scan_id: &str, cidr: &str) {
    let scan = Scan::new_running(scan_id.to_string(), cidr.to_string(), Utc::now());
    store.create_scan(scan, &CancellationToken::new()).await.expect("seed scan row");
}
