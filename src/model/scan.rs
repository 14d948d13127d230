use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter, Default)]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: String,
    pub cidr: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub hosts_discovered: u32,
    pub hosts_online: u32,
    pub error: Option<String>,
}

impl Scan {
    pub fn new_running(id: String, cidr: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            cidr,
            status: ScanStatus::Running,
            started_at: now,
            ended_at: None,
            hosts_discovered: 0,
            hosts_online: 0,
            error: None,
        }
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = ScanStatus::Failed;
        self.ended_at = Some(now);
        self.error = Some(reason.into());
    }

    pub fn mark_completed(&mut self, hosts_discovered: u32, hosts_online: u32, now: DateTime<Utc>) {
        self.status = ScanStatus::Completed;
        self.ended_at = Some(now);
        self.hosts_discovered = hosts_discovered;
        self.hosts_online = hosts_online;
    }
}
