use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub scan_id: String,
    pub recorded_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub ping_phase_ms: u64,
    pub enrich_phase_ms: u64,
    pub hosts_scanned: u32,
    pub hosts_alive: u32,
    pub devices_created: u32,
    pub devices_updated: u32,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AggregatePeriod {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetricsAggregate {
    pub period: AggregatePeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub scan_count: u32,
    pub avg_duration_ms: f64,
    pub avg_ping_phase_ms: f64,
    pub avg_enrich_phase_ms: f64,
    pub avg_devices: f64,
    pub avg_alive: f64,
    pub min_devices: u32,
    pub max_devices: u32,
    pub new_devices_total: u32,
    pub failed_scan_count: u32,
}
