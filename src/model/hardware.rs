//! Hardware/storage/GPU/service composite profile (§6 "hardware-upsert
//! contract"). The profile itself is a seam: the passive collector that
//! actually populates it (the hardware bridge named in §1's non-goals) is
//! out of scope here, but the shape of what it would write, and the
//! manual-preservation rule a store adapter must honor, are not.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageVolume {
    pub name: String,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
}

/// One device's hardware/storage/GPU/service snapshot. `manual` marks a row
/// a user edited by hand; a composite upsert must never let an automated
/// collection source overwrite a manual row (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HardwareProfile {
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<u32>,
    pub memory_mb: Option<u64>,
    pub storage: Vec<StorageVolume>,
    pub gpus: Vec<String>,
    pub services: Vec<String>,
    pub collection_source: String,
    pub manual: bool,
}
