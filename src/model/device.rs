use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter, IntoStaticStr, Default)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Router,
    Firewall,
    Switch,
    AccessPoint,
    Printer,
    Nas,
    Server,
    Camera,
    IotDevice,
    Workstation,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter, IntoStaticStr, Default)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter, IntoStaticStr, Default)]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryMethod {
    Icmp,
    Arp,
    Snmp,
    Mdns,
    Upnp,
    Manual,
    Proxmox,
    #[default]
    Unknown,
}

/// Logical tier assigned by the hierarchy inferrer. Ordinal values match §3:
/// 0 gateway, 2 distribution, 3 access, 4 endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter, Default)]
#[strum(serialize_all = "snake_case")]
pub enum NetworkLayer {
    Gateway,
    Distribution,
    Access,
    Endpoint,
    #[default]
    Unknown,
}

impl NetworkLayer {
    pub fn ordinal(self) -> u8 {
        match self {
            NetworkLayer::Gateway => 0,
            NetworkLayer::Distribution => 2,
            NetworkLayer::Access => 3,
            NetworkLayer::Endpoint => 4,
            NetworkLayer::Unknown => 255,
        }
    }
}

/// Field data for a [`Device`], separated from the entity envelope the way
/// the reference codebase splits `HostBase` from `Host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBase {
    pub hostname: String,
    /// Ordered, primary IP first.
    pub ips: Vec<IpAddr>,
    /// Canonical `XX:XX:XX:XX:XX:XX` uppercase, or `None` when unknown.
    pub mac: Option<String>,
    pub manufacturer: Option<String>,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub discovery_method: DiscoveryMethod,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub parent: Option<Uuid>,
    pub layer: NetworkLayer,
    pub confidence: u8,
    pub classification_source: String,
    pub trace: Vec<String>,
    pub tags: Vec<String>,
    pub custom_fields: serde_json::Value,
}

impl DeviceBase {
    pub fn new(primary_ip: IpAddr, now: DateTime<Utc>) -> Self {
        Self {
            hostname: String::new(),
            ips: vec![primary_ip],
            mac: None,
            manufacturer: None,
            device_type: DeviceType::default(),
            status: DeviceStatus::Online,
            discovery_method: DiscoveryMethod::default(),
            first_seen: now,
            last_seen: now,
            parent: None,
            layer: NetworkLayer::default(),
            confidence: 0,
            classification_source: String::new(),
            trace: Vec::new(),
            tags: Vec::new(),
            custom_fields: serde_json::json!({}),
        }
    }

    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.ips.first().copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub base: DeviceBase,
}

impl Device {
    pub fn new(base: DeviceBase) -> Self {
        let now = base.first_seen;
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            base,
        }
    }
}
