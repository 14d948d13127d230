//! Manufacturer classifier (§4.4).
//!
//! An ordered rule table, first match wins — the same shape as
//! `SubnetType::from_interface_name`'s ordered prefix rules in the
//! reference codebase, applied here to OUI manufacturer strings instead of
//! interface names. Rules are ordered specific-before-generic.

use crate::model::DeviceType;

type Rule = (&'static str, DeviceType);

/// Ordered specific-before-generic: "hp networking" must be checked before
/// the generic "hewlett packard" / "hp" entries that would otherwise win
/// first.
const RULES: &[Rule] = &[
    ("hp networking", DeviceType::Switch),
    ("cisco meraki", DeviceType::Switch),
    ("ubiquiti networks", DeviceType::AccessPoint),
    ("mikrotik", DeviceType::Router),
    ("netgear", DeviceType::Router),
    ("tp-link", DeviceType::Router),
    ("fortinet", DeviceType::Firewall),
    ("palo alto networks", DeviceType::Firewall),
    ("sonicwall", DeviceType::Firewall),
    ("cisco systems", DeviceType::Switch),
    ("cisco", DeviceType::Switch),
    ("juniper networks", DeviceType::Switch),
    ("aruba networks", DeviceType::AccessPoint),
    ("hewlett packard enterprise", DeviceType::Switch),
    ("hewlett packard", DeviceType::Server),
    ("dell inc", DeviceType::Server),
    ("dell", DeviceType::Server),
    ("synology", DeviceType::Nas),
    ("qnap systems", DeviceType::Nas),
    ("hikvision", DeviceType::Camera),
    ("dahua technology", DeviceType::Camera),
    ("axis communications", DeviceType::Camera),
    ("brother industries", DeviceType::Printer),
    ("canon", DeviceType::Printer),
    ("seiko epson", DeviceType::Printer),
    ("xerox", DeviceType::Printer),
    ("lexmark", DeviceType::Printer),
    ("espressif", DeviceType::IotDevice),
    ("sonos", DeviceType::IotDevice),
    ("ecobee", DeviceType::IotDevice),
    ("amazon technologies", DeviceType::IotDevice),
    ("nest labs", DeviceType::IotDevice),
    ("apple", DeviceType::Workstation),
    ("microsoft", DeviceType::Workstation),
    ("intel corporate", DeviceType::Workstation),
];

/// Device types treated as network infrastructure (§4.7 steps 7.1/7.3):
/// candidates for the port-fingerprint probe and the unmanaged-switch
/// fallback.
pub fn is_infrastructure_type(device_type: DeviceType) -> bool {
    matches!(
        device_type,
        DeviceType::Router | DeviceType::Switch | DeviceType::Firewall | DeviceType::AccessPoint
    )
}

/// Walks the ordered rule table; the first matching pattern wins. An empty
/// name returns the unknown type.
pub fn classify_by_manufacturer(name: &str) -> DeviceType {
    if name.is_empty() {
        return DeviceType::Unknown;
    }
    let name_lower = name.to_lowercase();
    RULES
        .iter()
        .find(|(pattern, _)| name_lower.contains(pattern))
        .map(|(_, device_type)| *device_type)
        .unwrap_or(DeviceType::Unknown)
}
