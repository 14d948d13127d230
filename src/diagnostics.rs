//! Diagnostics gate (§4.14).
//!
//! One-shot ping/DNS/port-check operations, outside the scan pipeline,
//! bounded by a process-wide non-blocking semaphore so a burst of manual
//! diagnostics can't starve a concurrent scan. The capacity-3 non-blocking
//! `Semaphore::try_acquire` gate is grounded on the scanner modules'
//! concurrency guards in `examples/mikemiles-dev-rust_network_discovery_tool/src/scanner/{port,icmp}.rs`.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{ReconError, Result};
use crate::net::icmp::IcmpSweeper;
use crate::net::{self, PortCheckResult};

const MAX_TARGET_LEN: usize = 253;
const MIN_COUNT: u32 = 1;
const MAX_COUNT: u32 = 10;
const MIN_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_TIMEOUT: Duration = Duration::from_secs(5);

fn clamp_duration(value: Duration, min: Duration, max: Duration) -> Duration {
    value.clamp(min, max)
}

/// Validates a diagnostics target string (§4.14): non-empty, no whitespace,
/// at most 253 characters (the DNS name length ceiling), and either a
/// parseable IP or a syntactically plausible hostname.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() || target.len() > MAX_TARGET_LEN || target.chars().any(char::is_whitespace) {
        return Err(ReconError::InvalidTarget(target.to_string()));
    }
    if target.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    let plausible_hostname = target
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    if !plausible_hostname {
        return Err(ReconError::InvalidTarget(target.to_string()));
    }
    Ok(())
}

/// Process-wide gate over one-shot diagnostics operations. Cloning shares
/// the same underlying semaphore; construct exactly one and hand out
/// clones from the module bootstrap.
#[derive(Clone)]
pub struct DiagnosticsGate {
    semaphore: Arc<Semaphore>,
    sweeper: Arc<IcmpSweeper>,
}

impl DiagnosticsGate {
    pub fn new(capacity: usize, sweeper: Arc<IcmpSweeper>) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(capacity)), sweeper }
    }

    fn try_acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().map_err(|_| ReconError::TooManyConcurrent)
    }

    /// Pings `target` once, bounded by the gate. `count` and `timeout` are
    /// clamped to sane one-shot ranges rather than rejected outright.
    pub async fn ping(&self, target: &str, count: u32, timeout: Duration, cancel: &CancellationToken) -> Result<Option<crate::net::HostResult>> {
        validate_target(target)?;
        let _permit = self.try_acquire()?;

        let ip: Ipv4Addr = match target.parse() {
            Ok(IpAddr::V4(ip)) => ip,
            Ok(IpAddr::V6(_)) => return Err(ReconError::InvalidTarget("IPv6 targets are not supported".to_string())),
            Err(_) => match net::dns::resolve_forward(target.to_string()).await {
                Ok(addrs) => match addrs.into_iter().find_map(|a| match a {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                }) {
                    Some(ip) => ip,
                    None => return Err(ReconError::InvalidTarget(target.to_string())),
                },
                Err(_) => return Err(ReconError::InvalidTarget(target.to_string())),
            },
        };

        let count = count.clamp(MIN_COUNT, MAX_COUNT);
        let timeout = clamp_duration(timeout, MIN_TIMEOUT, MAX_TIMEOUT);

        Ok(self.sweeper.ping_once(ip, count, timeout, cancel).await)
    }

    /// Resolves `target`: reverse lookup if it parses as an IP, forward
    /// lookup otherwise.
    pub async fn dns(&self, target: &str) -> Result<Vec<String>> {
        validate_target(target)?;
        let _permit = self.try_acquire()?;

        match target.parse::<IpAddr>() {
            Ok(ip) => {
                let name = net::dns::resolve_hostname(ip).await;
                Ok(if name.is_empty() { Vec::new() } else { vec![name] })
            }
            Err(_) => net::dns::resolve_forward(target.to_string())
                .await
                .map(|addrs| addrs.into_iter().map(|a| a.to_string()).collect())
                .map_err(|_| ReconError::InvalidTarget(target.to_string())),
        }
    }

    /// Dials `target:port` and attempts a short banner read.
    pub async fn port_check(&self, target: &str, port: u16) -> Result<PortCheckResult> {
        validate_target(target)?;
        let _permit = self.try_acquire()?;

        let ip: IpAddr = match target.parse() {
            Ok(ip) => ip,
            Err(_) => net::dns::resolve_forward(target.to_string())
                .await
                .ok()
                .and_then(|addrs| addrs.into_iter().next())
                .ok_or_else(|| ReconError::InvalidTarget(target.to_string()))?,
        };

        Ok(net::diag_port_check(ip, port, Duration::from_secs(2), Duration::from_secs(1)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_or_overlong_targets() {
        assert!(validate_target("").is_err());
        assert!(validate_target(&"a".repeat(300)).is_err());
    }

    #[test]
    fn rejects_whitespace() {
        assert!(validate_target("10.0.0.1 extra").is_err());
    }

    #[test]
    fn accepts_ip_and_hostname() {
        assert!(validate_target("10.0.0.1").is_ok());
        assert!(validate_target("printer-2.lan").is_ok());
    }

    #[test]
    fn rejects_implausible_hostname() {
        assert!(validate_target("not a host!name").is_err());
    }

    #[tokio::test]
    async fn gate_rejects_fourth_concurrent_holder() {
        let gate_semaphore = Arc::new(Semaphore::new(3));
        let _a = gate_semaphore.clone().try_acquire_owned().unwrap();
        let _b = gate_semaphore.clone().try_acquire_owned().unwrap();
        let _c = gate_semaphore.clone().try_acquire_owned().unwrap();
        assert!(gate_semaphore.try_acquire_owned().is_err());
    }
}
