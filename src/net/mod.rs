pub mod arp;
pub mod dns;
pub mod icmp;
pub mod oui;
pub mod portscan;
pub mod subnet;

pub use arp::{ArpReader, ArpSnapshotter};
pub use icmp::{HostResult, IcmpSweeper, OsHint, Sweeper};
pub use oui::{OuiLookup, OuiResolver};
pub use portscan::{diag_port_check, PortCheckResult};
pub use subnet::{expand, ExpandedSubnet};
