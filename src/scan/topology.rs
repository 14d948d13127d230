//! Topology link construction helpers (§4.7 step 7.4, §4.8).
//!
//! The idempotent dedupe-by-`(source, target, type)` contract itself lives
//! on the [`crate::store::Store`] port; this module only builds the ARP-edge
//! records the orchestrator asks the store to upsert.

use uuid::Uuid;

use crate::model::{LinkType, TopologyLink};

/// Builds one ARP-type link per non-gateway host, pointing at the gateway
/// device. Self-loops (a host that happens to resolve to the gateway
/// device itself) are skipped — the store also rejects them, this just
/// avoids the round-trip.
pub fn build_gateway_links(gateway_device: Uuid, host_devices: &[Uuid]) -> Vec<TopologyLink> {
    host_devices
        .iter()
        .filter(|&&host| host != gateway_device)
        .map(|&host| TopologyLink {
            source: host,
            target: gateway_device,
            link_type: LinkType::Arp,
            source_port: None,
            target_port: None,
            speed_mbps: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_excluded_from_its_own_links() {
        let gateway = Uuid::new_v4();
        let host = Uuid::new_v4();
        let links = build_gateway_links(gateway, &[gateway, host]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, host);
        assert_eq!(links[0].target, gateway);
    }
}
