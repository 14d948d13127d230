use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LinkType {
    Arp,
    Fdb,
    Lldp,
    Ethernet,
}

/// Directed edge between two devices. Unique on `(source, target, link_type)`;
/// upserting replaces the mutable attributes below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyLink {
    pub source: Uuid,
    pub target: Uuid,
    pub link_type: LinkType,
    pub source_port: Option<String>,
    pub target_port: Option<String>,
    pub speed_mbps: Option<u32>,
}

impl TopologyLink {
    pub fn key(&self) -> (Uuid, Uuid, LinkType) {
        (self.source, self.target, self.link_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyAssignment {
    pub device: Uuid,
    pub parent: Option<Uuid>,
    pub layer: super::device::NetworkLayer,
}
