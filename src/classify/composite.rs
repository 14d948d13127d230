//! Composite classifier (§4.6).
//!
//! Fuses SNMP sysDescr, port fingerprint, and OUI signals into a single
//! device type + confidence, with TTL contributing only a secondary OS
//! hint. The confidence-ordinal style (distinct numeric tiers per signal
//! source, first-match-wins within a tier) is grounded on
//! `MatchConfidence`/`Pattern` in the reference codebase's
//! `server::services::impl::patterns`.

use std::collections::BTreeSet;

use crate::model::DeviceType;
use crate::net::icmp::OsHint;

use super::manufacturer::classify_by_manufacturer;

#[derive(Debug, Clone, Default)]
pub struct SignalBundle {
    pub manufacturer: Option<String>,
    pub ttl: Option<u8>,
    pub os_hint: OsHint,
    pub open_ports: BTreeSet<u16>,
    pub snmp_sys_descr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub device_type: DeviceType,
    pub confidence: u8,
    pub source: &'static str,
    pub trace: Vec<String>,
}

pub struct CompositeClassifier {
    confidence_floor: u8,
}

impl CompositeClassifier {
    pub fn new(confidence_floor: u8) -> Self {
        Self { confidence_floor }
    }

    pub fn floor(&self) -> u8 {
        self.confidence_floor
    }

    pub fn classify(&self, signals: &SignalBundle) -> ClassificationResult {
        let mut trace = Vec::new();

        if let Some(descr) = signals.snmp_sys_descr.as_deref().filter(|d| !d.is_empty()) {
            if let Some(device_type) = classify_by_sys_descr(descr) {
                trace.push(format!("snmp sysDescr matched {device_type}"));
                return ClassificationResult { device_type, confidence: 75, source: "snmp", trace };
            }
            trace.push("snmp sysDescr present but unrecognized".to_string());
        }

        if let Some(device_type) = classify_by_port_fingerprint(&signals.open_ports) {
            trace.push(format!("port fingerprint matched {device_type}"));
            return ClassificationResult { device_type, confidence: 60, source: "port_fingerprint", trace };
        }

        let manufacturer = signals.manufacturer.as_deref().unwrap_or("");
        let oui_type = classify_by_manufacturer(manufacturer);
        if oui_type != DeviceType::Unknown {
            trace.push(format!("OUI manufacturer `{manufacturer}` matched {oui_type}"));
            return ClassificationResult { device_type: oui_type, confidence: 40, source: "oui", trace };
        }

        trace.push(format!("no specific signal matched, os_hint={:?}", signals.os_hint));
        ClassificationResult { device_type: DeviceType::Unknown, confidence: 0, source: "none", trace }
    }

    /// Decides whether `result` should overwrite a device's current
    /// classification. Below-floor results never overwrite; an existing
    /// type classified with >= confidence is never downgraded.
    pub fn apply(
        &self,
        existing_type: DeviceType,
        existing_confidence: u8,
        result: &ClassificationResult,
    ) -> Option<(DeviceType, u8)> {
        if result.confidence < self.confidence_floor {
            return None;
        }
        if existing_type != DeviceType::Unknown && result.confidence < existing_confidence {
            return None;
        }
        Some((result.device_type, result.confidence))
    }
}

const SYS_DESCR_RULES: &[(&str, DeviceType)] = &[
    ("firewall", DeviceType::Firewall),
    ("router", DeviceType::Router),
    ("switch", DeviceType::Switch),
    ("access point", DeviceType::AccessPoint),
    ("printer", DeviceType::Printer),
    ("nas", DeviceType::Nas),
    ("server", DeviceType::Server),
    ("linux", DeviceType::Server),
    ("kernel", DeviceType::Server),
];

fn classify_by_sys_descr(descr: &str) -> Option<DeviceType> {
    let lower = descr.to_lowercase();
    SYS_DESCR_RULES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, device_type)| *device_type)
}

/// A "specific" port fingerprint (§4.6): a tight set of ports that strongly
/// implies one device role rather than a generic open-port list. Exposed
/// so the orchestrator's port-fingerprint stage (§4.7 step 7.1) can apply
/// the same rule directly to ARP-derived infrastructure candidates.
pub fn classify_by_port_fingerprint(ports: &BTreeSet<u16>) -> Option<DeviceType> {
    if ports.contains(&9100) || ports.contains(&631) {
        return Some(DeviceType::Printer);
    }
    if ports.contains(&445) || ports.contains(&2049) || ports.contains(&5000) {
        return Some(DeviceType::Nas);
    }
    if ports.contains(&23) && (ports.contains(&80) || ports.contains(&443)) {
        return Some(DeviceType::Switch);
    }
    None
}
