//! Scheduler quiet-hours scenario (SPEC_FULL.md §8, scenario 7): a window
//! covering the entire day must suppress every tick, regardless of how many
//! times the ticker fires.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{FakeArp, FakeOui, FakeSweeper};
use reconcore::scheduler::{ActiveScans, Scheduler, SchedulerConfig, TimeSource};
use reconcore::store::{memory::MemoryStore, Store};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

struct FixedClock(DateTime<Utc>);

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[tokio::test]
async fn quiet_window_covering_the_whole_day_suppresses_every_tick() {
    let deps = common::test_deps(Arc::new(FakeSweeper::new(vec![])), Arc::new(FakeArp::empty()), Arc::new(FakeOui));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let config = SchedulerConfig {
        enabled: true,
        interval: Duration::from_millis(20),
        subnet: "10.0.0.0/24".to_string(),
        quiet_start: "00:00".to_string(),
        quiet_end: "23:59".to_string(),
    };

    // Noon, safely inside the configured window regardless of what day it
    // is — avoids a flaky pass/fail right at the `quiet_end` boundary.
    let today = Utc::now().date_naive();
    let noon = chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    let clock = Arc::new(FixedClock(DateTime::<Utc>::from_naive_utc_and_offset(today.and_time(noon), Utc)));
    let active_scans = Arc::new(ActiveScans::new());
    let scheduler = Arc::new(Scheduler::new(config, clock, store.clone(), active_scans.clone(), deps));

    let tasks = Arc::new(Mutex::new(JoinSet::new()));

    let scheduler_clone = scheduler.clone();
    let tasks_clone = tasks.clone();
    let handle = tokio::spawn(async move { scheduler_clone.run(CancellationToken::new(), tasks_clone).await });

    // Several ticker periods' worth of wall time; a scan row appearing at
    // any point here would mean the quiet window failed to suppress a tick.
    tokio::time::sleep(Duration::from_millis(120)).await;

    scheduler.stop();
    handle.await.unwrap();

    assert!(active_scans.is_empty());
    assert_eq!(tasks.lock().await.len(), 0, "quiet window must stop a tick before any scan task is spawned");
}
