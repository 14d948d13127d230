//! Network reconnaissance and topology discovery engine.
//!
//! Expands a subnet, sweeps it for live hosts, enriches what it finds with
//! ARP/DNS/OUI/SNMP signals, classifies and places each device in an
//! inferred network hierarchy, and tracks service movement and device loss
//! over time — all behind pluggable ports (`Store`, `EventBus`, `Sweeper`,
//! `ArpSnapshotter`) so the core has no hard platform or storage dependency.

pub mod classify;
pub mod config;
pub mod consolidator;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod hardware;
pub mod model;
pub mod module;
pub mod net;
pub mod scan;
pub mod scheduler;
pub mod store;
pub mod watchdog;

pub use config::{CliOverrides, ReconConfig};
pub use error::{ReconError, Result};
pub use module::{ModuleDeps, ReconModule};
