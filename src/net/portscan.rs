//! Bounded-concurrency TCP port probing and SNMP sysDescr queries, used by
//! the composite classifier's port-fingerprint and SNMP signals (§4.6,
//! §4.7 step 7.1) and by the diagnostics gate's port-check operation
//! (§4.14).
//!
//! The connect-with-retry shape is grounded on
//! `daemon::utils::scanner::scan_tcp_ports`; the SNMP query on
//! `daemon::utils::scanner::test_snmp_service`.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Curated ports probed on ARP-derived infrastructure candidates (§4.7
/// step 7.1): HTTP/HTTPS management UIs, SSH/Telnet, and SNMP.
pub const INFRA_PORT_LIST: &[u16] = &[22, 23, 80, 161, 443, 8080, 8443];

pub async fn scan_tcp_ports(
    ip: IpAddr,
    ports: &[u16],
    dial_timeout: Duration,
    concurrency: usize,
    cancel: &CancellationToken,
) -> BTreeSet<u16> {
    stream::iter(ports.iter().copied())
        .map(|port| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                if probe_tcp_port(ip, port, dial_timeout).await {
                    Some(port)
                } else {
                    None
                }
            }
        })
        .buffer_unordered(concurrency)
        .filter_map(futures::future::ready)
        .collect()
        .await
}

/// Dial once; on a timeout (not a refusal), retry exactly once, matching
/// the reference scanner's "retry-once-on-timeout" policy for noisy links.
async fn probe_tcp_port(ip: IpAddr, port: u16, dial_timeout: Duration) -> bool {
    for attempt in 0..2 {
        match tokio::time::timeout(dial_timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(_stream)) => return true,
            Ok(Err(_refused)) => return false,
            Err(_timeout) if attempt == 0 => continue,
            Err(_timeout) => return false,
        }
    }
    false
}

#[derive(Debug, Clone)]
pub struct PortCheckResult {
    pub open: bool,
    pub banner: Option<String>,
}

/// Single-port dial-and-banner-read used by the diagnostics gate's
/// port-check operation (§4.14): a closed or unreachable port is reported
/// rather than retried, since a one-shot diagnostic should answer promptly.
pub async fn diag_port_check(ip: IpAddr, port: u16, dial_timeout: Duration, banner_timeout: Duration) -> PortCheckResult {
    let mut stream = match tokio::time::timeout(dial_timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(stream)) => stream,
        _ => return PortCheckResult { open: false, banner: None },
    };

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 256];
    let banner = match tokio::time::timeout(banner_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => Some(String::from_utf8_lossy(&buf[..n]).trim().to_string()),
        _ => None,
    };

    PortCheckResult { open: true, banner }
}

const SYS_DESCR_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];

/// Queries sysDescr via SNMPv2c. Returns `None` on any failure — SNMP
/// reachability is an optional signal, never a hard dependency.
pub async fn query_snmp_sys_descr(ip: IpAddr, community: &str, timeout: Duration) -> Option<String> {
    let addr = std::net::SocketAddr::new(ip, 161);
    let mut session =
        snmp2::AsyncSession::new_v2c(addr, community.as_bytes(), timeout.as_millis() as u64, 0)
            .await
            .ok()?;
    let response = session.get(SYS_DESCR_OID).await.ok()?;
    let (_oid, value) = response.varbinds.into_iter().next()?;
    match value {
        snmp2::Value::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}
