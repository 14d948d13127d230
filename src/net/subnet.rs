//! Subnet expander (§4.1).

use std::net::Ipv4Addr;

use cidr::Ipv4Cidr;

use crate::error::{ReconError, Result};

/// Maximum host-bit count the expander accepts; more-specific than /16 is
/// required (equivalently, host bits <= 16).
const MAX_HOST_BITS: u32 = 16;

pub struct ExpandedSubnet {
    pub cidr: Ipv4Cidr,
    hosts: Vec<Ipv4Addr>,
}

impl ExpandedSubnet {
    pub fn hosts(&self) -> &[Ipv4Addr] {
        &self.hosts
    }

    /// The first-usable address (network + 1), the canonical subnet gateway
    /// used by topology inference (§4.9, GLOSSARY).
    pub fn gateway(&self) -> Ipv4Addr {
        let network = u32::from(self.cidr.first_address());
        Ipv4Addr::from(network.wrapping_add(1))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Parse and expand a CIDR string into its ordered usable host addresses.
pub fn expand(cidr_str: &str) -> Result<ExpandedSubnet> {
    let cidr: Ipv4Cidr = cidr_str
        .parse()
        .map_err(|_| ReconError::InvalidCidr(cidr_str.to_string()))?;

    let prefix = cidr.network_length();
    let host_bits = 32 - prefix as u32;
    if host_bits > MAX_HOST_BITS {
        return Err(ReconError::SubnetTooLarge(cidr_str.to_string()));
    }

    let network = u32::from(cidr.first_address());
    let broadcast = u32::from(cidr.last_address());

    let hosts = match prefix {
        32 => Vec::new(),
        31 => vec![Ipv4Addr::from(network), Ipv4Addr::from(broadcast)],
        _ => (network + 1..broadcast).map(Ipv4Addr::from).collect(),
    };

    Ok(ExpandedSubnet { cidr, hosts })
}
