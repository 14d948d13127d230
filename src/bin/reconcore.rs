//! `reconcore` CLI entrypoint (§1, §6).
//!
//! Grounded on the reference codebase's `netvisor-daemon` binary: a flat
//! `clap::Parser` struct plus `#[tokio::main]`, adapted here to real
//! subcommands (`scan`/`diag`/`serve`) instead of a single long-running
//! daemon process.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reconcore::config::CliOverrides;
use reconcore::events::BroadcastEventBus;
use reconcore::module::{ModuleDeps, ReconModule};
use reconcore::net::icmp::IcmpSweeper;
use reconcore::net::{ArpReader, ArpSnapshotter, OuiLookup, OuiResolver, Sweeper};
use reconcore::store::memory::MemoryStore;
use reconcore::ReconConfig;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "reconcore")]
#[command(about = "Network reconnaissance and topology discovery engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ping sweep concurrency override.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-host ICMP timeout override, in milliseconds.
    #[arg(long, global = true)]
    ping_timeout_ms: Option<u64>,

    /// Log level override (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one discovery scan over a CIDR and prints what it finds.
    Scan {
        cidr: String,
    },
    /// One-shot diagnostics, outside the scan pipeline.
    Diag {
        #[command(subcommand)]
        operation: DiagOperation,
    },
    /// Boots the scheduler, watchdog, and metrics consolidator and runs
    /// until interrupted.
    Serve,
}

#[derive(Subcommand)]
enum DiagOperation {
    Ping { target: String },
    Dns { target: String },
    Port { target: String, port: u16 },
}

fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .map(|s| s.to_string())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn build_module(config: &ReconConfig) -> anyhow::Result<ReconModule> {
    let store: Arc<dyn reconcore::store::Store> = Arc::new(MemoryStore::new());
    let events = Arc::new(BroadcastEventBus::default());
    let sweeper: Arc<dyn Sweeper> = Arc::new(IcmpSweeper::new(
        config.concurrency,
        config.ping_count,
        Duration::from_millis(config.ping_timeout_ms),
    )?);
    let diagnostic_sweeper = Arc::new(IcmpSweeper::new(4, config.ping_count, Duration::from_millis(config.ping_timeout_ms))?);
    let arp: Arc<dyn ArpSnapshotter> = Arc::new(ArpReader);
    let oui: Arc<dyn OuiLookup> = Arc::new(OuiResolver::new());

    let deps = ModuleDeps {
        store,
        events,
        sweeper,
        arp,
        oui,
        diagnostic_sweeper,
    };

    Ok(ReconModule::new(config, deps))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ReconConfig::load(CliOverrides {
        concurrency: cli.concurrency,
        ping_timeout_ms: cli.ping_timeout_ms,
        ping_count: None,
        log_level: cli.log_level.clone(),
    })?;

    init_tracing(config.log_level.as_deref());

    match cli.command {
        Command::Scan { cidr } => {
            let module = build_module(&config)?;
            let mut events = module.subscribe();
            let scan_id = module.start_scan(cidr).await?;
            println!("scan {scan_id} started");

            loop {
                match events.recv().await {
                    Ok(reconcore::events::ReconEvent::ScanCompleted { scan }) if scan.id == scan_id => {
                        println!("scan {scan_id} completed: {} hosts discovered", scan.hosts_discovered);
                        break;
                    }
                    Ok(reconcore::events::ReconEvent::DeviceDiscovered { scan_id: sid, device }) if sid == scan_id => {
                        println!("  discovered {} ({:?})", device.base.primary_ip().map(|ip| ip.to_string()).unwrap_or_default(), device.base.device_type);
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }

        Command::Diag { operation } => {
            let module = build_module(&config)?;
            let cancel = CancellationToken::new();
            match operation {
                DiagOperation::Ping { target } => {
                    match module.diagnostics.ping(&target, config.ping_count, Duration::from_millis(config.ping_timeout_ms), &cancel).await? {
                        Some(result) => println!("{target} is alive, rtt={:?} ttl={:?}", result.rtt, result.ttl),
                        None => println!("{target} did not respond"),
                    }
                }
                DiagOperation::Dns { target } => {
                    let names = module.diagnostics.dns(&target).await?;
                    if names.is_empty() {
                        println!("{target} did not resolve");
                    } else {
                        for name in names {
                            println!("{name}");
                        }
                    }
                }
                DiagOperation::Port { target, port } => {
                    let result = module.diagnostics.port_check(&target, port).await?;
                    match (result.open, result.banner) {
                        (true, Some(banner)) => println!("{target}:{port} is open, banner: {banner}"),
                        (true, None) => println!("{target}:{port} is open"),
                        (false, _) => println!("{target}:{port} is closed or unreachable"),
                    }
                }
            }
        }

        Command::Serve => {
            let module = build_module(&config)?;
            module.start().await;
            tracing::info!("reconcore serving, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown signal received");
            module.stop().await;
        }
    }

    Ok(())
}
