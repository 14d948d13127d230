//! Layered configuration (§4.15, §6).
//!
//! Defaults, then environment variables prefixed `NV_RECON_`, then explicit
//! CLI overrides — the same `Figment::from(Serialized::defaults(...))
//! .merge(Env::prefixed(...))` shape the reference codebase's
//! `ServerConfig::load` uses.

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

fn default_scan_timeout_secs() -> u64 {
    120
}
fn default_ping_timeout_ms() -> u64 {
    1_000
}
fn default_ping_count() -> u32 {
    2
}
fn default_concurrency() -> usize {
    32
}
fn default_true() -> bool {
    true
}
fn default_device_lost_after_secs() -> u64 {
    15 * 60
}
fn default_mdns_interval_secs() -> u64 {
    300
}
fn default_upnp_interval_secs() -> u64 {
    300
}
fn default_schedule_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub arp_enabled: bool,
    #[serde(default = "default_device_lost_after_secs")]
    pub device_lost_after_secs: u64,

    #[serde(default)]
    pub mdns_enabled: bool,
    #[serde(default = "default_mdns_interval_secs")]
    pub mdns_interval_secs: u64,
    #[serde(default)]
    pub upnp_enabled: bool,
    #[serde(default = "default_upnp_interval_secs")]
    pub upnp_interval_secs: u64,

    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default)]
    pub schedule_quiet_start: String,
    #[serde(default)]
    pub schedule_quiet_end: String,
    #[serde(default)]
    pub schedule_subnet: String,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout_secs(),
            ping_timeout_ms: default_ping_timeout_ms(),
            ping_count: default_ping_count(),
            concurrency: default_concurrency(),
            arp_enabled: true,
            device_lost_after_secs: default_device_lost_after_secs(),
            mdns_enabled: false,
            mdns_interval_secs: default_mdns_interval_secs(),
            upnp_enabled: false,
            upnp_interval_secs: default_upnp_interval_secs(),
            schedule_enabled: false,
            schedule_interval_secs: default_schedule_interval_secs(),
            schedule_quiet_start: String::new(),
            schedule_quiet_end: String::new(),
            schedule_subnet: String::new(),
            log_level: None,
        }
    }
}

/// CLI overrides, applied last. `None` leaves the figment-merged value as is.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub ping_timeout_ms: Option<u64>,
    pub ping_count: Option<u32>,
    pub log_level: Option<String>,
}

impl ReconConfig {
    pub fn load(overrides: CliOverrides) -> crate::error::Result<Self> {
        let mut config: ReconConfig = Figment::from(Serialized::defaults(ReconConfig::default()))
            .merge(Env::prefixed("NV_RECON_"))
            .extract()?;

        if let Some(v) = overrides.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = overrides.ping_timeout_ms {
            config.ping_timeout_ms = v;
        }
        if let Some(v) = overrides.ping_count {
            config.ping_count = v;
        }
        if let Some(v) = overrides.log_level {
            config.log_level = Some(v);
        }

        Ok(config)
    }
}
