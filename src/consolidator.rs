//! Metrics consolidator (§4.13).
//!
//! Hourly tick, same loop shape as [`crate::watchdog::Watchdog`]. Each
//! phase (weekly aggregate, monthly aggregate, prune) is independently
//! fallible and independently logged — a failure in one never skips the
//! next, matching the reference codebase's per-stage error isolation in
//! its own batch jobs rather than bailing the whole tick on the first
//! `?`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use tokio_util::sync::CancellationToken;

use crate::model::{AggregatePeriod, ScanMetricsAggregate};
use crate::store::Store;

const RAW_METRICS_RETENTION: chrono::Duration = chrono::Duration::days(30);
const TICK_INTERVAL: Duration = Duration::from_secs(3600);

pub struct Consolidator {
    store: Arc<dyn Store>,
}

impl Consolidator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now(), &cancel).await;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("consolidator stopping: module shutdown");
                    break;
                }
            }
        }
    }

    async fn tick(&self, now: DateTime<Utc>, cancel: &CancellationToken) {
        if now.weekday() == Weekday::Mon && now.hour() == 3 {
            if let Err(err) = self.aggregate_weekly(now, cancel).await {
                tracing::error!(error = %err, "weekly aggregation phase failed");
            }
            if now.day() <= 7 {
                if let Err(err) = self.aggregate_monthly(now, cancel).await {
                    tracing::error!(error = %err, "monthly aggregation phase failed");
                }
            }
        }

        if let Err(err) = self.prune(now, cancel).await {
            tracing::error!(error = %err, "raw metrics prune phase failed");
        }
    }

    /// Aggregates the week that just completed: `[now - 7d, now)` at the
    /// Monday boundary (§4.13).
    async fn aggregate_weekly(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let period_end = now.date_naive().and_hms_opt(0, 0, 0).expect("midnight is always valid");
        let period_end = DateTime::<Utc>::from_naive_utc_and_offset(period_end, Utc);
        let period_start = period_end - chrono::Duration::days(7);

        let rows = self.store.list_scan_metrics_between(period_start, period_end, cancel).await?;
        if rows.is_empty() {
            tracing::debug!(%period_start, %period_end, "no raw scan metrics in the completed week, skipping");
            return Ok(());
        }

        let scan_count = rows.len() as u32;
        let devices_per_scan: Vec<u32> = rows.iter().map(|r| r.devices_created + r.devices_updated).collect();

        let aggregate = ScanMetricsAggregate {
            period: AggregatePeriod::Weekly,
            period_start,
            period_end,
            scan_count,
            avg_duration_ms: average(rows.iter().map(|r| r.duration_ms as f64)),
            avg_ping_phase_ms: average(rows.iter().map(|r| r.ping_phase_ms as f64)),
            avg_enrich_phase_ms: average(rows.iter().map(|r| r.enrich_phase_ms as f64)),
            avg_devices: average(devices_per_scan.iter().map(|&d| d as f64)),
            avg_alive: average(rows.iter().map(|r| r.hosts_alive as f64)),
            min_devices: devices_per_scan.iter().copied().min().unwrap_or(0),
            max_devices: devices_per_scan.iter().copied().max().unwrap_or(0),
            new_devices_total: rows.iter().map(|r| r.devices_created).sum(),
            failed_scan_count: rows.iter().filter(|r| r.failed).count() as u32,
        };

        self.store.upsert_metrics_aggregate(aggregate, cancel).await?;
        tracing::info!(%period_start, %period_end, scan_count, "weekly metrics aggregate recorded");
        Ok(())
    }

    /// Aggregates the prior calendar month from the weekly aggregates that
    /// fall inside it, weighted by each week's scan count (§4.13, §9).
    async fn aggregate_monthly(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let (period_start, period_end) = prior_calendar_month_bounds(now);

        let weekly = self.store.list_metrics_aggregates(AggregatePeriod::Weekly, cancel).await?;
        let weeks: Vec<&ScanMetricsAggregate> = weekly
            .iter()
            .filter(|a| a.period_start >= period_start && a.period_start < period_end)
            .collect();

        if weeks.is_empty() {
            tracing::debug!(%period_start, %period_end, "no weekly aggregates in the prior month, skipping");
            return Ok(());
        }

        let total_scans: u32 = weeks.iter().map(|w| w.scan_count).sum();
        let weighted = |f: fn(&ScanMetricsAggregate) -> f64| -> f64 {
            if total_scans == 0 {
                return 0.0;
            }
            weeks.iter().map(|w| f(w) * w.scan_count as f64).sum::<f64>() / total_scans as f64
        };

        let aggregate = ScanMetricsAggregate {
            period: AggregatePeriod::Monthly,
            period_start,
            period_end,
            scan_count: total_scans,
            avg_duration_ms: weighted(|w| w.avg_duration_ms),
            avg_ping_phase_ms: weighted(|w| w.avg_ping_phase_ms),
            avg_enrich_phase_ms: weighted(|w| w.avg_enrich_phase_ms),
            avg_devices: weighted(|w| w.avg_devices),
            avg_alive: weighted(|w| w.avg_alive),
            min_devices: weeks.iter().map(|w| w.min_devices).min().unwrap_or(0),
            max_devices: weeks.iter().map(|w| w.max_devices).max().unwrap_or(0),
            new_devices_total: weeks.iter().map(|w| w.new_devices_total).sum(),
            failed_scan_count: weeks.iter().map(|w| w.failed_scan_count).sum(),
        };

        self.store.upsert_metrics_aggregate(aggregate, cancel).await?;
        tracing::info!(%period_start, %period_end, weeks = weeks.len(), "monthly metrics aggregate recorded");
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> anyhow::Result<()> {
        let cutoff = now - RAW_METRICS_RETENTION;
        let pruned = self.store.prune_scan_metrics_before(cutoff, cancel).await?;
        if pruned > 0 {
            tracing::info!(pruned, %cutoff, "pruned raw scan metrics older than retention window");
        }
        Ok(())
    }
}

fn average(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn prior_calendar_month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (year, month) = (now.year(), now.month());
    let (prev_year, prev_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let start = Utc.with_ymd_and_hms(prev_year, prev_month, 1, 0, 0, 0).single().expect("valid calendar date");
    let end = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().expect("valid calendar date");
    (start, end)
}
