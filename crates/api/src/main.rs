//! Drowsiness Monitor - Main Entry Point

use alerting::AlertDispatcher;
use anyhow::Context;
use api::pipeline::FramePipeline;
use api::{detector_factory, init_logging, run_server, viewer, AppConfig};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drowsiness-monitor", version, about = "Eye-closure drowsiness monitor")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve annotated frames over HTTP (one session per viewer)
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Run a single local session
    Monitor {
        /// Camera index, overrides the config file
        #[arg(short, long)]
        device: Option<i32>,
        /// Read frames from this directory instead of a camera
        #[arg(short, long)]
        frames: Option<PathBuf>,
        /// Write annotated frames here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Do not open a window; `q`/Esc in the window or Ctrl-C stops otherwise
        #[arg(long)]
        headless: bool,
    },
    /// Feed recorded observations (JSON lines) to the state machine
    Replay {
        /// Input file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            run_server(config).await?;
        }
        Command::Monitor {
            device,
            frames,
            output,
            headless,
        } => {
            if let Some(device) = device {
                config.camera.device = device;
            }
            if frames.is_some() {
                config.camera.frames = frames;
            }
            monitor(config, output, headless).await?;
        }
        Command::Replay { input } => {
            let stdout = io::stdout().lock();
            let summary = if input.as_os_str() == "-" {
                viewer::replay(&config.dms, io::stdin().lock(), stdout)?
            } else {
                let file = File::open(&input)
                    .with_context(|| format!("opening {}", input.display()))?;
                viewer::replay(&config.dms, BufReader::new(file), stdout)?
            };
            info!(frames = summary.frames, alerts = summary.alerts, "Replay finished");
        }
    }

    Ok(())
}

async fn monitor(config: AppConfig, output: Option<PathBuf>, headless: bool) -> anyhow::Result<()> {
    let factory = detector_factory(&config.dms)?;
    let dispatcher =
        AlertDispatcher::from_config(&config.alert, tokio::runtime::Handle::current());
    let pipeline = FramePipeline::open(&config.camera, &config.dms, factory()?, dispatcher)?;

    let stop = Arc::new(AtomicBool::new(false));
    let ctrl_c_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopping monitor");
            ctrl_c_stop.store(true, Ordering::Relaxed);
        }
    });

    let interval = config.camera.frame_interval();
    let quality = config.camera.jpeg_quality;
    // highgui windows belong to the thread that created them
    let summary = tokio::task::block_in_place(|| {
        let mut window = viewer::open_window("Drowsiness Monitor", headless)?;
        viewer::run_monitor(
            pipeline,
            interval,
            quality,
            output.as_deref(),
            window.as_mut().map(|w| &mut **w as &mut dyn viewer::FrameWindow),
            &stop,
        )
    })?;

    info!(frames = summary.frames, alerts = summary.alerts, "Done");
    Ok(())
}
