//! Scan scheduler (§4.11).
//!
//! Grounded on the tick-loop shape of the reference codebase's
//! `DaemonRuntimeService::heartbeat` (`tokio::time::interval` inside a
//! `tokio::select!` alongside a stop signal), but the tick body itself —
//! quiet-window gating, active-scan suppression, `scheduled-<unix-ms>` scan
//! id generation — is bespoke control flow the reference codebase's own
//! `tokio_cron_scheduler`-backed scheduled discoveries don't need (a cron
//! expression has no notion of "skip this tick if a scan is already
//! running"). See DESIGN.md for why that crate wasn't reused here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::model::Scan;
use crate::scan::ScanDeps;
use crate::store::Store;

/// Injectable clock (§9 "deterministic scheduler tests"): production code
/// uses [`SystemClock`], tests supply a fixed or stepped time source so the
/// quiet-window seed scenario (§8 scenario 7) doesn't depend on wall time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A parsed `HH:MM`-`HH:MM` quiet window. `start == end` means "never
/// quiet" (§4.11); `start > end` wraps past midnight.
struct QuietWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl QuietWindow {
    fn parse(start: &str, end: &str) -> Option<Self> {
        if start.is_empty() || end.is_empty() {
            return None;
        }
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        Some(Self { start, end })
    }

    fn contains(&self, now: NaiveTime) -> bool {
        if self.start == self.end {
            return false;
        }
        if self.start < self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub subnet: String,
    pub quiet_start: String,
    pub quiet_end: String,
}

/// Concurrent active-scan registry (§4.7, §4.11, §4.14 "module lifecycle"):
/// every running scan's cancellation token, keyed by scan id, so the
/// scheduler can suppress new ticks while one is in flight and the module's
/// shutdown path can cancel them all at once.
#[derive(Default)]
pub struct ActiveScans {
    inner: std::sync::RwLock<std::collections::HashMap<String, CancellationToken>>,
}

impl ActiveScans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scan_id: String, cancel: CancellationToken) {
        self.inner.write().expect("active scans lock poisoned").insert(scan_id, cancel);
    }

    pub fn remove(&self, scan_id: &str) {
        self.inner.write().expect("active scans lock poisoned").remove(scan_id);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("active scans lock poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("active scans lock poisoned").len()
    }

    /// Cancels every currently-tracked scan (§4.14 shutdown: "cancel every
    /// active scan"). Does not wait for them to finish; the caller awaits
    /// the module wait-group for that.
    pub fn cancel_all(&self) {
        for cancel in self.inner.read().expect("active scans lock poisoned").values() {
            cancel.cancel();
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    time_source: Arc<dyn TimeSource>,
    store: Arc<dyn Store>,
    active_scans: Arc<ActiveScans>,
    scan_deps: Arc<ScanDeps>,
    stop: Notify,
    stopped: AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        time_source: Arc<dyn TimeSource>,
        store: Arc<dyn Store>,
        active_scans: Arc<ActiveScans>,
        scan_deps: Arc<ScanDeps>,
    ) -> Self {
        Self {
            config,
            time_source,
            store,
            active_scans,
            scan_deps,
            stop: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Requests the run loop stop at the next tick boundary. Idempotent:
    /// a second call is a no-op rather than a second notification (the
    /// spec's "stop channel closed exactly once" requirement).
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop.notify_one();
        }
    }

    /// Runs until [`Scheduler::stop`] is called or `parent_cancel` fires.
    /// Spawned scan tasks are tracked in `tasks` (the module wait-group),
    /// not awaited here, so a scan in flight never blocks the next tick
    /// decision.
    pub async fn run(self: Arc<Self>, parent_cancel: CancellationToken, tasks: Arc<Mutex<JoinSet<()>>>) {
        if !self.config.enabled {
            tracing::debug!("scheduler disabled, not starting tick loop");
            return;
        }

        let quiet = QuietWindow::parse(&self.config.quiet_start, &self.config.quiet_end);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(quiet.as_ref(), &parent_cancel, &tasks).await;
                }
                _ = self.stop.notified() => {
                    tracing::info!("scheduler stop requested");
                    break;
                }
                _ = parent_cancel.cancelled() => {
                    tracing::info!("scheduler stopping: module shutdown");
                    break;
                }
            }
        }
    }

    async fn tick(&self, quiet: Option<&QuietWindow>, parent_cancel: &CancellationToken, tasks: &Mutex<JoinSet<()>>) {
        let now = self.time_source.now();

        if let Some(window) = quiet {
            if window.contains(now.time()) {
                tracing::debug!("scheduler tick skipped: inside quiet window");
                return;
            }
        }

        if !self.active_scans.is_empty() {
            tracing::debug!(active = self.active_scans.len(), "scheduler tick skipped: a scan is already active");
            return;
        }

        let scan_id = format!("scheduled-{}", now.timestamp_millis());
        let scan = Scan::new_running(scan_id.clone(), self.config.subnet.clone(), now);

        if let Err(err) = self.store.create_scan(scan, &CancellationToken::new()).await {
            tracing::error!(error = %err, "failed to create scheduled scan row");
            return;
        }

        let cancel = parent_cancel.child_token();
        self.active_scans.insert(scan_id.clone(), cancel.clone());

        let deps = self.scan_deps.clone();
        let active_scans = self.active_scans.clone();
        let subnet = self.config.subnet.clone();
        let id_for_task = scan_id.clone();

        tasks.lock().await.spawn(async move {
            if let Err(err) = crate::scan::run_scan(&deps, cancel, id_for_task.clone(), subnet).await {
                tracing::error!(scan_id = %id_for_task, error = %err, "scheduled scan task failed");
            }
            active_scans.remove(&id_for_task);
        });

        tracing::info!(scan_id, "scheduler dispatched scan");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<Utc>);
    impl TimeSource for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn at(hm: &str) -> DateTime<Utc> {
        let today = Utc::now().date_naive();
        let time = NaiveTime::parse_from_str(hm, "%H:%M").unwrap();
        DateTime::<Utc>::from_naive_utc_and_offset(today.and_time(time), Utc)
    }

    #[test]
    fn equal_bounds_means_never_quiet() {
        let window = QuietWindow::parse("03:00", "03:00").unwrap();
        assert!(!window.contains(NaiveTime::parse_from_str("03:00", "%H:%M").unwrap()));
        assert!(!window.contains(NaiveTime::parse_from_str("12:00", "%H:%M").unwrap()));
    }

    #[test]
    fn same_day_window() {
        let window = QuietWindow::parse("22:00", "23:30").unwrap();
        assert!(window.contains(NaiveTime::parse_from_str("22:30", "%H:%M").unwrap()));
        assert!(!window.contains(NaiveTime::parse_from_str("23:30", "%H:%M").unwrap()));
        assert!(!window.contains(NaiveTime::parse_from_str("06:00", "%H:%M").unwrap()));
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let window = QuietWindow::parse("22:00", "06:00").unwrap();
        assert!(window.contains(NaiveTime::parse_from_str("23:00", "%H:%M").unwrap()));
        assert!(window.contains(NaiveTime::parse_from_str("02:00", "%H:%M").unwrap()));
        assert!(!window.contains(NaiveTime::parse_from_str("12:00", "%H:%M").unwrap()));
    }

    #[test]
    fn fixed_clock_reports_injected_time() {
        let clock = FixedClock(at("03:15"));
        assert_eq!(clock.now().time(), NaiveTime::parse_from_str("03:15", "%H:%M").unwrap());
    }

    #[test]
    fn active_scans_cancel_all_cancels_every_token() {
        let registry = ActiveScans::new();
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        registry.insert("a".into(), a.clone());
        registry.insert("b".into(), b.clone());
        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
