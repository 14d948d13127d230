//! ARP table reader (§4.3).
//!
//! Grounded on the `/proc/net/arp` + `arp -a` fallback pattern from the
//! retrieval pack's panoptikon scanner, adapted to the spec's canonical
//! uppercase MAC form (the source example normalizes to lowercase; this
//! module upper-cases instead).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const ALL_ZERO_MAC: &str = "00:00:00:00:00:00";
const BROADCAST_MAC: &str = "FF:FF:FF:FF:FF:FF";

pub struct ArpReader;

impl ArpReader {
    /// Best-effort snapshot of the kernel's ARP table. Never fails: any
    /// read or parse error yields an empty mapping.
    pub async fn snapshot(cancel: &CancellationToken) -> HashMap<Ipv4Addr, String> {
        if cancel.is_cancelled() {
            return HashMap::new();
        }

        match read_proc_net_arp().await {
            Ok(map) if !map.is_empty() => map,
            _ => read_arp_command().await.unwrap_or_default(),
        }
    }
}

/// Capability interface (§9 "ARP readers across platforms"): specify by
/// output, let each implementation parse its own source. Lets the
/// orchestrator depend on a trait object and tests substitute a fixed
/// mapping instead of reading the host's real ARP table.
#[async_trait::async_trait]
pub trait ArpSnapshotter: Send + Sync {
    async fn snapshot(&self, cancel: &CancellationToken) -> HashMap<Ipv4Addr, String>;
}

#[async_trait::async_trait]
impl ArpSnapshotter for ArpReader {
    async fn snapshot(&self, cancel: &CancellationToken) -> HashMap<Ipv4Addr, String> {
        ArpReader::snapshot(cancel).await
    }
}

async fn read_proc_net_arp() -> anyhow::Result<HashMap<Ipv4Addr, String>> {
    let contents = tokio::fs::read_to_string("/proc/net/arp").await?;
    let mut map = HashMap::new();

    for line in contents.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        // IP address | HW type | Flags | HW address | Mask | Device
        if cols.len() < 6 {
            continue;
        }
        let ip: Ipv4Addr = match cols[0].parse() {
            Ok(ip) => ip,
            Err(_) => continue,
        };
        let flags = cols[2];
        let mac = normalize_mac(cols[3]);

        if flags == "0x0" || mac == ALL_ZERO_MAC || mac == BROADCAST_MAC {
            continue;
        }

        map.insert(ip, mac);
    }

    Ok(map)
}

async fn read_arp_command() -> anyhow::Result<HashMap<Ipv4Addr, String>> {
    let output = Command::new("arp").arg("-a").output().await?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_arp_output(&text))
}

fn parse_arp_output(output: &str) -> HashMap<Ipv4Addr, String> {
    let mut map = HashMap::new();

    for line in output.lines() {
        if line.contains("<incomplete>") {
            continue;
        }

        let ip = line
            .find('(')
            .zip(line.find(')'))
            .and_then(|(start, end)| line.get(start + 1..end))
            .and_then(|s| s.parse::<Ipv4Addr>().ok());

        let mac = line.find(" at ").and_then(|pos| {
            let rest = &line[pos + 4..];
            rest.split_whitespace().next()
        });

        if let (Some(ip), Some(mac)) = (ip, mac) {
            let mac = normalize_mac(mac);
            if mac != ALL_ZERO_MAC && mac != BROADCAST_MAC {
                map.insert(ip, mac);
            }
        }
    }

    map
}

/// Canonicalizes a MAC into uppercase, colon-separated form.
fn normalize_mac(mac: &str) -> String {
    mac.replace('-', ":").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_arp_output_basic() {
        let output = "? (192.168.1.1) at aa:bb:cc:dd:ee:ff [ether] on eth0\n";
        let map = parse_arp_output(output);
        assert_eq!(map.get(&"192.168.1.1".parse().unwrap()), Some(&"AA:BB:CC:DD:EE:FF".to_string()));
    }

    #[test]
    fn parse_arp_output_skips_incomplete() {
        let output = "? (192.168.1.2) at <incomplete> on eth0\n";
        assert!(parse_arp_output(output).is_empty());
    }

    #[test]
    fn parse_arp_output_empty_input() {
        assert!(parse_arp_output("").is_empty());
    }

    #[test]
    fn normalize_mac_handles_hyphens_and_case() {
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn all_zero_and_broadcast_excluded_from_proc_parse() {
        assert_eq!(ALL_ZERO_MAC, "00:00:00:00:00:00");
        assert_eq!(BROADCAST_MAC, "FF:FF:FF:FF:FF:FF");
    }
}
