//! Service-movement detector (§4.10).

use chrono::Utc;
use uuid::Uuid;

use crate::model::{ServiceMap, ServiceMovement};

/// Well-known port -> service name table used to label movements.
fn service_name(port: u16) -> String {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        161 => "snmp",
        443 => "https",
        445 => "smb",
        631 => "ipp",
        2049 => "nfs",
        3389 => "rdp",
        8080 => "http-alt",
        8443 => "https-alt",
        9100 => "jetdirect",
        _ => "unknown",
    }
    .to_string()
}

/// Diffs `prev` against `curr`, emitting one movement per port that now
/// belongs to a different device than before. A port with no prior
/// association produces no movement (first-ever scan of that port).
pub fn detect(prev: &ServiceMap, curr: &ServiceMap) -> Vec<ServiceMovement> {
    let mut prev_owner: std::collections::HashMap<u16, Uuid> = std::collections::HashMap::new();
    for (device, ports) in prev {
        for port in ports {
            prev_owner.insert(*port, *device);
        }
    }

    let mut movements = Vec::new();
    let now = Utc::now();

    for (device, ports) in curr {
        for port in ports {
            match prev_owner.get(port) {
                Some(prior) if prior != device => {
                    movements.push(ServiceMovement {
                        port: *port,
                        service_name: service_name(*port),
                        from_device: Some(*prior),
                        to_device: *device,
                        detected_at: now,
                    });
                }
                Some(_) => {}
                None => {}
            }
        }
    }

    movements
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn unchanged_association_emits_nothing() {
        let device = Uuid::new_v4();
        let prev = ServiceMap::from([(device, BTreeSet::from([80]))]);
        let curr = ServiceMap::from([(device, BTreeSet::from([80]))]);
        assert!(detect(&prev, &curr).is_empty());
    }

    #[test]
    fn first_seen_port_emits_nothing() {
        let device = Uuid::new_v4();
        let prev = ServiceMap::new();
        let curr = ServiceMap::from([(device, BTreeSet::from([80]))]);
        assert!(detect(&prev, &curr).is_empty());
    }

    #[test]
    fn moved_port_emits_one_movement() {
        let old_owner = Uuid::new_v4();
        let new_owner = Uuid::new_v4();
        let prev = ServiceMap::from([(old_owner, BTreeSet::from([80]))]);
        let curr = ServiceMap::from([(new_owner, BTreeSet::from([80]))]);
        let movements = detect(&prev, &curr);
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].from_device, Some(old_owner));
        assert_eq!(movements[0].to_device, new_owner);
        assert_eq!(movements[0].service_name, "http");
    }
}
