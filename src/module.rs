//! Module lifecycle (§4.15, §9 "module wait-group").
//!
//! Wires the store/event-bus adapters, the scan pipeline, and the three
//! background loops (scheduler, watchdog, consolidator) into one handle the
//! binary constructs once. Every spawned task — background loops and
//! individual scans alike — is tracked in a `tokio::task::JoinSet` so
//! [`ReconModule::stop`] can await all of them draining before returning,
//! the same "don't return from shutdown until every worker has actually
//! stopped" contract the reference codebase's `DaemonRuntimeService`
//! observes around its own heartbeat task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::CompositeClassifier;
use crate::config::ReconConfig;
use crate::consolidator::Consolidator;
use crate::diagnostics::DiagnosticsGate;
use crate::error::Result;
use crate::events::EventBus;
use crate::hardware::{NoopProfileSource, ProfileSource};
use crate::model::Scan;
use crate::net::icmp::IcmpSweeper;
use crate::net::{ArpSnapshotter, OuiLookup, Sweeper};
use crate::scan::{ScanDeps, ScanStageConfig};
use crate::scheduler::{ActiveScans, Scheduler, SchedulerConfig, SystemClock};
use crate::store::Store;
use crate::watchdog::Watchdog;

/// Everything needed to construct a [`ReconModule`] without reaching into
/// platform specifics at the call site — lets the CLI binary build real
/// adapters while tests substitute fakes.
pub struct ModuleDeps {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventBus>,
    pub sweeper: Arc<dyn Sweeper>,
    pub arp: Arc<dyn ArpSnapshotter>,
    pub oui: Arc<dyn OuiLookup>,
    pub diagnostic_sweeper: Arc<IcmpSweeper>,
}

pub struct ReconModule {
    store: Arc<dyn Store>,
    events: Arc<dyn EventBus>,
    scan_deps: Arc<ScanDeps>,
    active_scans: Arc<ActiveScans>,
    scheduler: Option<Arc<Scheduler>>,
    watchdog: Arc<Watchdog>,
    consolidator: Arc<Consolidator>,
    pub diagnostics: DiagnosticsGate,
    profile_source: Arc<dyn ProfileSource>,
    root_cancel: CancellationToken,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl ReconModule {
    pub fn new(config: &ReconConfig, deps: ModuleDeps) -> Self {
        let stage_config = ScanStageConfig {
            arp_enabled: config.arp_enabled,
            ..ScanStageConfig::default()
        };
        let classifier = Arc::new(CompositeClassifier::new(stage_config.confidence_floor));

        let scan_deps = Arc::new(ScanDeps {
            store: deps.store.clone(),
            events: deps.events.clone(),
            sweeper: deps.sweeper,
            arp: deps.arp,
            oui: deps.oui,
            classifier,
            stage_config,
        });

        let active_scans = Arc::new(ActiveScans::new());

        let scheduler_config = SchedulerConfig {
            enabled: config.schedule_enabled,
            interval: Duration::from_secs(config.schedule_interval_secs),
            subnet: config.schedule_subnet.clone(),
            quiet_start: config.schedule_quiet_start.clone(),
            quiet_end: config.schedule_quiet_end.clone(),
        };
        let scheduler = Some(Arc::new(Scheduler::new(
            scheduler_config,
            Arc::new(SystemClock),
            deps.store.clone(),
            active_scans.clone(),
            scan_deps.clone(),
        )));

        let watchdog = Arc::new(Watchdog::new(
            deps.store.clone(),
            deps.events.clone(),
            Duration::from_secs(config.device_lost_after_secs),
        ));

        let consolidator = Arc::new(Consolidator::new(deps.store.clone()));

        let diagnostics = DiagnosticsGate::new(3, deps.diagnostic_sweeper);

        Self {
            store: deps.store,
            events: deps.events,
            scan_deps,
            active_scans,
            scheduler,
            watchdog,
            consolidator,
            diagnostics,
            profile_source: Arc::new(NoopProfileSource),
            root_cancel: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Handles one inbound `dispatch.device.profiled` event (§6). The
    /// default `ProfileSource` is a no-op (§1 non-goals); a caller wiring in
    /// a real collector would replace it via [`ReconModule::set_profile_source`].
    pub async fn handle_device_profiled(&self, payload: serde_json::Value) {
        let cancel = self.root_cancel.child_token();
        crate::hardware::handle_device_profiled(&payload, self.store.as_ref(), self.events.as_ref(), self.profile_source.as_ref(), &cancel).await;
    }

    pub fn set_profile_source(&mut self, source: Arc<dyn ProfileSource>) {
        self.profile_source = source;
    }

    /// Starts the background loops. Idempotent only in the sense that
    /// calling it twice spawns a second copy of each loop; callers should
    /// call it exactly once per module instance.
    pub async fn start(&self) {
        let watchdog = self.watchdog.clone();
        let watchdog_cancel = self.root_cancel.child_token();
        self.tasks.lock().await.spawn(async move {
            watchdog.run(watchdog_cancel).await;
        });

        let consolidator = self.consolidator.clone();
        let consolidator_cancel = self.root_cancel.child_token();
        self.tasks.lock().await.spawn(async move {
            consolidator.run(consolidator_cancel).await;
        });

        if let Some(scheduler) = self.scheduler.clone() {
            let scheduler_cancel = self.root_cancel.child_token();
            let tasks = self.tasks.clone();
            self.tasks.lock().await.spawn(async move {
                scheduler.run(scheduler_cancel, tasks).await;
            });
        }

        tracing::info!("recon module started");
    }

    /// Starts one ad hoc scan (the CLI `scan` subcommand and any future API
    /// surface go through here too, not just the scheduler). Rejects a
    /// malformed CIDR before creating the scan row.
    pub async fn start_scan(&self, cidr: String) -> Result<String> {
        crate::net::expand(&cidr)?;

        let scan_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let scan = Scan::new_running(scan_id.clone(), cidr.clone(), now);

        let probe = CancellationToken::new();
        self.store.create_scan(scan, &probe).await?;

        let cancel = self.root_cancel.child_token();
        self.active_scans.insert(scan_id.clone(), cancel.clone());

        let deps = self.scan_deps.clone();
        let active_scans = self.active_scans.clone();
        let id_for_task = scan_id.clone();

        self.tasks.lock().await.spawn(async move {
            if let Err(err) = crate::scan::run_scan(&deps, cancel, id_for_task.clone(), cidr).await {
                tracing::error!(scan_id = %id_for_task, error = %err, "ad hoc scan task failed");
            }
            active_scans.remove(&id_for_task);
        });

        Ok(scan_id)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::events::ReconEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Cancels every background loop and in-flight scan, then drains the
    /// wait-group. Any store write on the cancellation path itself must use
    /// a token that is never cancelled (§4.7, §9 "cancellation-safe
    /// cleanup") — the orchestrator's own cleanup writes already follow
    /// that rule independently of this shutdown signal.
    pub async fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        self.root_cancel.cancel();
        self.active_scans.cancel_all();

        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}

        tracing::info!("recon module stopped");
    }
}
