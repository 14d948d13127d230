//! OUI resolver (§4.4).
//!
//! Grounded on `Pattern::MacVendor`'s use of `mac_oui::Oui` in the
//! reference codebase's service-pattern matcher
//! (`server::services::impl::patterns`).

use mac_oui::Oui;

pub struct OuiResolver {
    db: Oui,
}

impl OuiResolver {
    pub fn new() -> Self {
        Self { db: Oui::default() }
    }

    /// Resolves a MAC's manufacturer using its first three octets. Malformed
    /// or unrecognized MACs resolve to `None`.
    pub fn lookup(&self, mac: &str) -> Option<String> {
        self.db
            .lookup_by_mac(mac)
            .ok()
            .flatten()
            .map(|entry| entry.company_name.clone())
    }
}

impl Default for OuiResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability interface (§9 "Pluggable scanners/collectors" names
/// `OUIResolver` explicitly): lets the orchestrator depend on a trait
/// object so tests can substitute a fixed vendor table instead of the
/// real `mac_oui` database.
pub trait OuiLookup: Send + Sync {
    fn lookup(&self, mac: &str) -> Option<String>;
}

impl OuiLookup for OuiResolver {
    fn lookup(&self, mac: &str) -> Option<String> {
        OuiResolver::lookup(self, mac)
    }
}
