//! vdisplayd: creates one virtual display and keeps it alive.
//!
//! # Usage
//!
//! ```text
//! vdisplayd [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: $XDG_CONFIG_HOME/vdisplay/config.toml]
//!   --width <PX>           Display width  [default: from config, 1920]
//!   --height <PX>          Display height [default: from config, 1080]
//!   --refresh-mhz <MHZ>    Refresh rate in milli-Hz [default: from config, 60000]
//!   --client-name <NAME>   Label logged for the client
//!   --id <UUID>            Client identity [default: random]
//!   --print-edid           Print the EDID for the mode as hex and exit
//!   --primary              Print the primary physical output and exit
//! ```
//!
//! # What happens in a normal run
//!
//! 1. The config file is loaded (defaults if absent) and logging is set up.
//! 2. The manager initializes; without EVDI it runs in passthrough mode.
//! 3. One display is created and the health monitor is started.
//! 4. The daemon waits for Ctrl+C or a `DisplayLost` event.
//! 5. The display is removed and the manager shuts down.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use vdisplay_core::{synthesize, verify};
use vdisplay_linux::infrastructure::native_display_manager;
use vdisplay_linux::infrastructure::storage::config::{load_config, load_config_from, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Linux virtual display daemon.
#[derive(Debug, Parser)]
#[command(
    name = "vdisplayd",
    about = "Creates an EVDI virtual display (or passthrough) for a streaming client",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "VDISPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Display width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Display height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Refresh rate in milli-Hz (59940 = 59.94 Hz).
    #[arg(long = "refresh-mhz")]
    refresh_mhz: Option<u32>,

    /// Human-readable client label, used in logs only.
    #[arg(long, default_value = "vdisplayd")]
    client_name: String,

    /// Client identity; a random one is generated when omitted.
    #[arg(long)]
    id: Option<Uuid>,

    /// Print the synthesized EDID as hex and exit.
    #[arg(long)]
    print_edid: bool,

    /// Print the primary physical output and exit.
    #[arg(long)]
    primary: bool,
}

/// The mode after applying CLI overrides to the config defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestedMode {
    width: u32,
    height: u32,
    refresh_milli_hz: u32,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => load_config().context("failed to load config"),
        }
    }

    fn requested_mode(&self, config: &AppConfig) -> RequestedMode {
        RequestedMode {
            width: self.width.unwrap_or(config.display.width),
            height: self.height.unwrap_or(config.display.height),
            refresh_milli_hz: self.refresh_mhz.unwrap_or(config.display.refresh_milli_hz),
        }
    }
}

/// Formats `bytes` as 16 space-separated hex bytes per line.
fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    let mode = cli.requested_mode(&config);

    if cli.print_edid {
        let edid = synthesize(mode.width, mode.height, mode.refresh_milli_hz / 1000);
        verify(&edid).context("synthesized EDID failed verification")?;
        println!("{}", hex_dump(&edid));
        return Ok(());
    }

    let manager = native_display_manager(&config);

    if cli.primary {
        match manager.primary_display_name() {
            Some(name) => println!("{name}"),
            None => println!("no connected physical output"),
        }
        return Ok(());
    }

    let status = manager.initialize();
    info!(status = ?status, real_driver = manager.is_real_driver_available(), "driver initialized");

    let id = cli.id.unwrap_or_else(Uuid::new_v4);
    let client_id = id.to_string();
    let name = manager
        .create_display(
            &client_id,
            &cli.client_name,
            mode.width,
            mode.height,
            mode.refresh_milli_hz,
            &id,
        )
        .context("display manager refused to create a display")?;
    info!(display = %name, "virtual display ready");

    let mut losses = manager
        .take_loss_events()
        .context("display loss channel already taken")?;
    manager.start_monitor();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for Ctrl+C: {e}");
            }
            info!("received Ctrl+C; removing display");
        }
        Some(lost) = losses.recv() => {
            warn!(display = %lost.display_name, "display lost; shutting down");
        }
    }

    manager.remove_display(&id);
    manager.shutdown();
    info!("vdisplayd stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
