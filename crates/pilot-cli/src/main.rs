use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pilot_link::monitor::{AlwaysReachable, LinkMonitor, RouteProbe};
use pilot_link::state::FlightControls;
use pilot_link::tx::LinkTransmitter;
use pilot_link::{safety, LinkConfig};

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

mod console;
use console::Console;

#[derive(Debug, Parser)]
#[command(name = "pilot", version, about = "RCpilot - handheld RC control link")]
struct Cli {
    /// Optional config file; every field has a default.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and the target address without going live.
    Doctor,
    /// Operator session: stream control frames and read console commands.
    Run {
        /// Receiver address, overriding [link].target_addr.
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    monitor: MonitorCfg,
    surface: SurfaceCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct MonitorCfg {
    /// Connection check period in milliseconds.
    interval_ms: u64,

    /// Also verify the OS still has a route to the receiver on every check.
    route_probe: bool,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            route_probe: true,
        }
    }
}

/// Virtual stick-surface geometry, matching the handheld layout the console
/// commands are phrased in.
#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct SurfaceCfg {
    width: u32,
    height: u32,
}

impl Default for SurfaceCfg {
    fn default() -> Self {
        Self {
            width: 400,
            height: 400,
        }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run { target } => run(cfg, target).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    anyhow::ensure!(
        (5..=1000).contains(&cfg.link.rate_ms),
        "link.rate_ms out of range (5..=1000)"
    );
    anyhow::ensure!(cfg.link.port != 0, "link.port must be nonzero");
    anyhow::ensure!(
        cfg.monitor.interval_ms >= 100,
        "monitor.interval_ms too small; set >= 100"
    );
    anyhow::ensure!(
        cfg.surface.width > 0 && cfg.surface.height > 0,
        "surface dimensions must be nonzero"
    );

    tokio::net::lookup_host((cfg.link.target_addr.as_str(), cfg.link.port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .with_context(|| format!("link.target_addr does not resolve: {}", cfg.link.target_addr))?;

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: Config, target_override: Option<String>) -> Result<()> {
    info!("run: starting");

    let controls = FlightControls::new();
    let mut tx = LinkTransmitter::new(cfg.link.clone(), controls.clone());
    let target = target_override.unwrap_or_else(|| cfg.link.target_addr.clone());

    if !tx.start(&target).await {
        warn!("link is down; fix the target and use 'connect' to retry");
    }

    let period = Duration::from_millis(cfg.monitor.interval_ms.max(100));
    // The probe reads the session target from the status handle, so a later
    // 'connect' to a new address is checked against that address.
    let monitor = if cfg.monitor.route_probe {
        LinkMonitor::spawn(tx.status(), RouteProbe, period)
    } else {
        LinkMonitor::spawn(tx.status(), AlwaysReachable, period)
    };

    // Connection banner for the operator.
    let mut link_rx = monitor.subscribe();
    let display = tokio::spawn(async move {
        while link_rx.changed().await.is_ok() {
            if *link_rx.borrow() {
                info!("link: connected");
            } else {
                info!("link: disconnected");
            }
        }
    });

    let mut console = Console::new(controls.clone(), target, cfg.surface.width, cfg.surface.height);
    println!("pilot console ready; 'help' lists commands");

    let session = operator_session(BufReader::new(tokio::io::stdin()), &mut console, &mut tx).await;

    // Teardown order matters: safe state first, then the periodic work.
    // A failed stdin read lands here too; its error surfaces only after.
    safety::on_session_suspended(&controls);
    monitor.stop().await;
    tx.stop().await;
    let _ = display.await;
    info!("session closed");
    session.context("read console input")
}

/// Drives the operator console until quit, Ctrl-C, end of input, or a read
/// error. The caller owns all teardown.
async fn operator_session<R>(
    input: R,
    console: &mut Console,
    tx: &mut LinkTransmitter,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt, closing session");
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !console.handle_line(tx, line.trim()).await {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            },
        }
    }
}
