use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

/// Snapshot of `device -> open ports` for one scan, used by the
/// service-movement detector (§4.10).
pub type ServiceMap = HashMap<Uuid, BTreeSet<u16>>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceMovement {
    pub port: u16,
    pub service_name: String,
    pub from_device: Option<Uuid>,
    pub to_device: Uuid,
    pub detected_at: chrono::DateTime<chrono::Utc>,
}
