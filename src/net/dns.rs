//! Reverse DNS resolver (§4.5).
//!
//! Grounded on `NetworkScanDiscovery::get_hostname_for_ip` in the reference
//! codebase, which wraps `dns_lookup::lookup_addr` in `spawn_blocking` under
//! a `tokio::time::timeout`.

use std::net::IpAddr;
use std::time::Duration;

const REVERSE_DNS_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolves a hostname for `ip`. Never errors: timeout or lookup failure
/// yields an empty string, and any trailing dot is trimmed.
pub async fn resolve_hostname(ip: IpAddr) -> String {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));

    match tokio::time::timeout(REVERSE_DNS_TIMEOUT, lookup).await {
        Ok(Ok(Ok(name))) => name.trim_end_matches('.').to_string(),
        Ok(Ok(Err(err))) => {
            tracing::debug!(%ip, error = %err, "reverse DNS lookup failed");
            String::new()
        }
        Ok(Err(join_err)) => {
            tracing::debug!(%ip, error = %join_err, "reverse DNS task panicked");
            String::new()
        }
        Err(_) => {
            tracing::debug!(%ip, "reverse DNS lookup timed out");
            String::new()
        }
    }
}

/// Forward lookup used by the diagnostics gate's `diag dns` operation
/// (§4.14), for targets that are hostnames rather than addresses.
pub async fn resolve_forward(host: String) -> anyhow::Result<Vec<IpAddr>> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&host));
    match tokio::time::timeout(REVERSE_DNS_TIMEOUT, lookup).await {
        Ok(Ok(Ok(addrs))) => Ok(addrs),
        Ok(Ok(Err(err))) => Err(err.into()),
        Ok(Err(join_err)) => Err(join_err.into()),
        Err(_) => anyhow::bail!("forward DNS lookup timed out"),
    }
}
