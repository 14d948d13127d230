//! Hierarchy inferrer (§4.9).
//!
//! A pure function over a device and link snapshot — no store access, no
//! I/O — so it can be unit-tested directly against hand-built fixtures,
//! matching the reference codebase's preference for pure planner functions
//! (`server::topology::service::planner`) operating over plain slices and
//! maps rather than live services.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::model::{Device, DeviceType, HierarchyAssignment, LinkType, NetworkLayer, TopologyLink};

fn is_gateway_class(device_type: DeviceType) -> bool {
    matches!(device_type, DeviceType::Router | DeviceType::Firewall)
}

/// Deterministic, acyclic (parent, layer) assignment for every device.
pub fn infer(devices: &[Device], links: &[TopologyLink]) -> Vec<HierarchyAssignment> {
    let mut forward: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut reverse: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut fdb_forward: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

    for link in links {
        forward.entry(link.source).or_default().push(link.target);
        reverse.entry(link.target).or_default().push(link.source);
        if link.link_type == LinkType::Fdb {
            fdb_forward.entry(link.source).or_default().push(link.target);
        }
    }

    let mut parent: HashMap<Uuid, Uuid> = HashMap::new();
    let mut layer: HashMap<Uuid, NetworkLayer> = HashMap::new();

    // Step 2: mark routers/firewalls, pick the root. Deterministic
    // regardless of the input slice's order (§3/§9): the "first" router (or,
    // failing that, the first gateway-class device) is the one with the
    // earliest `first_seen`, not whatever order the caller's device list
    // happens to arrive in — a `Store::list_devices` implementation is free
    // to sort however it likes (e.g. by a randomly-generated device id).
    let earliest = |devices: &[&Device]| -> Option<Uuid> {
        devices.iter().min_by_key(|d| (d.base.first_seen, d.id)).map(|d| d.id)
    };
    let routers: Vec<&Device> = devices.iter().filter(|d| d.base.device_type == DeviceType::Router).collect();
    let root = earliest(&routers).or_else(|| {
        let gateway_class: Vec<&Device> = devices.iter().filter(|d| is_gateway_class(d.base.device_type)).collect();
        earliest(&gateway_class)
    });

    for device in devices {
        if is_gateway_class(device.base.device_type) {
            layer.insert(device.id, NetworkLayer::Gateway);
            if Some(device.id) != root {
                if let Some(root_id) = root {
                    if devices.iter().any(|d| d.id == root_id && d.base.device_type == DeviceType::Router) {
                        parent.insert(device.id, root_id);
                    }
                }
            }
        }
    }

    // Step 3/4: switches.
    let mut distribution: HashSet<Uuid> = HashSet::new();
    if let Some(root_id) = root {
        for device in devices {
            if device.base.device_type != DeviceType::Switch {
                continue;
            }
            let linked_to_root = forward.get(&device.id).is_some_and(|ts| ts.contains(&root_id))
                || reverse.get(&device.id).is_some_and(|ss| ss.contains(&root_id));
            if linked_to_root {
                layer.insert(device.id, NetworkLayer::Distribution);
                parent.insert(device.id, root_id);
                distribution.insert(device.id);
            }
        }

        for device in devices {
            if device.base.device_type != DeviceType::Switch || distribution.contains(&device.id) {
                continue;
            }
            layer.insert(device.id, NetworkLayer::Access);
            let upstream = reverse
                .get(&device.id)
                .and_then(|sources| sources.iter().find(|s| distribution.contains(s)))
                .copied();
            parent.insert(device.id, upstream.unwrap_or(root_id));
        }

        // Step 5: access points.
        for device in devices {
            if device.base.device_type != DeviceType::AccessPoint {
                continue;
            }
            layer.insert(device.id, NetworkLayer::Access);
            let upstream = reverse.get(&device.id).and_then(|sources| {
                sources.iter().find(|s| {
                    devices
                        .iter()
                        .find(|d| d.id == **s)
                        .is_some_and(|d| matches!(d.base.device_type, DeviceType::Switch | DeviceType::Router))
                })
            });
            parent.insert(device.id, upstream.copied().unwrap_or(root_id));
        }

        // Step 6: FDB edges.
        for device in devices {
            if device.base.device_type != DeviceType::Switch {
                continue;
            }
            if let Some(targets) = fdb_forward.get(&device.id) {
                for target_id in targets {
                    if parent.contains_key(target_id) {
                        continue;
                    }
                    if let Some(target) = devices.iter().find(|d| d.id == *target_id) {
                        if is_gateway_class(target.base.device_type) {
                            continue;
                        }
                    }
                    parent.insert(*target_id, device.id);
                }
            }
        }
    }

    // Step 7: remaining devices become endpoints and fall back to root.
    for device in devices {
        layer.entry(device.id).or_insert(NetworkLayer::Endpoint);
        if Some(device.id) != root && !parent.contains_key(&device.id) {
            if let Some(root_id) = root {
                parent.insert(device.id, root_id);
            }
        }
    }

    devices
        .iter()
        .map(|device| HierarchyAssignment {
            device: device.id,
            parent: parent.get(&device.id).copied(),
            layer: layer.get(&device.id).copied().unwrap_or(NetworkLayer::Unknown),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceBase, DeviceStatus, DiscoveryMethod};
    use chrono::Utc;

    fn device(device_type: DeviceType) -> Device {
        let now = Utc::now();
        let mut base = DeviceBase::new("10.0.0.1".parse().unwrap(), now);
        base.device_type = device_type;
        base.status = DeviceStatus::Online;
        base.discovery_method = DiscoveryMethod::Arp;
        Device::new(base)
    }

    fn device_seen_at(device_type: DeviceType, first_seen: chrono::DateTime<Utc>) -> Device {
        let mut base = DeviceBase::new("10.0.0.1".parse().unwrap(), first_seen);
        base.device_type = device_type;
        base.status = DeviceStatus::Online;
        base.discovery_method = DiscoveryMethod::Arp;
        Device::new(base)
    }

    #[test]
    fn router_switch_servers_hierarchy() {
        let router = device(DeviceType::Router);
        let switch = device(DeviceType::Switch);
        let server_a = device(DeviceType::Workstation);
        let server_b = device(DeviceType::Workstation);

        let links = vec![
            TopologyLink {
                source: switch.id,
                target: router.id,
                link_type: LinkType::Arp,
                source_port: None,
                target_port: None,
                speed_mbps: None,
            },
            TopologyLink {
                source: switch.id,
                target: server_a.id,
                link_type: LinkType::Fdb,
                source_port: None,
                target_port: None,
                speed_mbps: None,
            },
            TopologyLink {
                source: switch.id,
                target: server_b.id,
                link_type: LinkType::Fdb,
                source_port: None,
                target_port: None,
                speed_mbps: None,
            },
        ];

        let devices = vec![router.clone(), switch.clone(), server_a.clone(), server_b.clone()];
        let assignments = infer(&devices, &links);

        let by_id: HashMap<Uuid, &HierarchyAssignment> = assignments.iter().map(|a| (a.device, a)).collect();

        assert_eq!(by_id[&router.id].layer, NetworkLayer::Gateway);
        assert_eq!(by_id[&switch.id].layer, NetworkLayer::Distribution);
        assert_eq!(by_id[&switch.id].parent, Some(router.id));
        assert_eq!(by_id[&server_a.id].layer, NetworkLayer::Endpoint);
        assert_eq!(by_id[&server_a.id].parent, Some(switch.id));
        assert_eq!(by_id[&server_b.id].parent, Some(switch.id));
    }

    #[test]
    fn root_is_earliest_router_regardless_of_input_order() {
        let now = Utc::now();
        let early_router = device_seen_at(DeviceType::Router, now - chrono::Duration::hours(2));
        let late_router = device_seen_at(DeviceType::Router, now);

        // Deliberately shuffled order, and deliberately not sorted by id
        // either — the store is free to return devices in any order.
        let forward = infer(&[late_router.clone(), early_router.clone()], &[]);
        let backward = infer(&[early_router.clone(), late_router.clone()], &[]);

        let forward_root: HashMap<Uuid, Option<Uuid>> = forward.iter().map(|a| (a.device, a.parent)).collect();
        let backward_root: HashMap<Uuid, Option<Uuid>> = backward.iter().map(|a| (a.device, a.parent)).collect();

        // The earlier router is root in both orderings: its own parent is
        // `None`, and the later router is parented to it.
        assert_eq!(forward_root[&early_router.id], None);
        assert_eq!(backward_root[&early_router.id], None);
        assert_eq!(forward_root[&late_router.id], Some(early_router.id));
        assert_eq!(backward_root[&late_router.id], Some(early_router.id));
    }

    #[test]
    fn output_is_acyclic() {
        let router = device(DeviceType::Router);
        let endpoint = device(DeviceType::Workstation);
        let devices = vec![router.clone(), endpoint.clone()];
        let assignments = infer(&devices, &[]);

        let parents: HashMap<Uuid, Option<Uuid>> = assignments.iter().map(|a| (a.device, a.parent)).collect();
        for id in parents.keys().copied() {
            let mut seen = HashSet::new();
            seen.insert(id);
            let mut current = parents.get(&id).copied().flatten();
            while let Some(p) = current {
                assert!(seen.insert(p), "cycle detected");
                current = parents.get(&p).copied().flatten();
            }
        }
    }
}
