use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::fs;

mod cancel;
mod color;
mod config;
mod engine;
mod error;
mod logging;
mod mirror;
mod protocol;
mod shows;
mod strip;
mod transport;

use cancel::CancelToken;
use config::{Config, Interface};
use engine::{Animation, AnimationEngine, RunOutcome};
use mirror::Mirror;
use protocol::BYTES_PER_LED;
use strip::Apa102Strip;
#[cfg(target_os = "linux")]
use transport::SpidevTransport;
use transport::{DryRunTransport, SerialTransport, Transport};

#[derive(Parser)]
#[command(name = "apa102-show")]
#[command(about = "APA102 light shows\n\nRuns a light show on an APA102 LED strip attached to a Linux SPI device or a clocked serial adapter.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    #[arg(required_unless_present = "list")]
    config: Option<String>,

    /// Run this show instead of the one named in the configuration
    #[arg(long)]
    show: Option<String>,

    /// Log frames instead of opening the SPI device or serial port
    #[arg(long)]
    dry_run: bool,

    /// List the available shows and exit
    #[arg(long)]
    list: bool,

    /// Enable debug output (lifecycle, frame counts)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    logging::init(logging::level_for(cli.debug, cli.ddebug))
        .context("Failed to install logger")?;

    if cli.list {
        for name in shows::NAMES {
            println!("{}", name);
        }
        return Ok(());
    }

    // Load configuration
    let config_path = cli.config.context("No configuration file given")?;
    let config_data = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path))?;
    let config: Config = serde_json::from_str(&config_data)
        .with_context(|| format!("Failed to parse {}", config_path))?;

    // Parameters are checked before the strip is opened
    let show_name = cli.show.as_deref().unwrap_or(&config.show.name);
    let animation = shows::by_name(show_name).with_context(|| {
        format!(
            "Unknown show \"{}\" (available: {})",
            show_name,
            shows::NAMES.join(", ")
        )
    })?;
    let mut engine = AnimationEngine::new(animation);
    engine
        .configure_all(&config.show.parameters)
        .with_context(|| format!("Invalid parameters for show \"{}\"", show_name))?;
    engine
        .check_runnable()
        .with_context(|| format!("Show \"{}\" is not runnable", show_name))?;

    // Ctrl-C ends the show through the regular cleanup path
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_token.cancel();
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if cli.dry_run {
        return run_show(DryRunTransport::new(), &config, &mut engine, &cancel);
    }

    let strip = &config.strip;
    match strip.interface() {
        Interface::Serial => {
            let port = strip
                .port
                .as_deref()
                .context("The serial interface needs strip.port")?;
            let transport = SerialTransport::open(port, strip.max_clock_speed_hz)?;
            run_show(transport, &config, &mut engine, &cancel)
        }
        #[cfg(target_os = "linux")]
        Interface::Spi => {
            let transport =
                SpidevTransport::open(strip.bus, strip.device, strip.max_clock_speed_hz)?;
            run_show(transport, &config, &mut engine, &cancel)
        }
        #[cfg(not(target_os = "linux"))]
        Interface::Spi => anyhow::bail!("SPI devices are only supported on Linux"),
    }
}

fn run_show<T: Transport>(
    transport: T,
    config: &Config,
    engine: &mut AnimationEngine<Box<dyn Animation>>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut strip = Apa102Strip::new(
        transport,
        config.strip.num_leds,
        config.strip.max_clock_speed_hz,
        config.strip.initial_brightness,
    )?;

    if let Some(mirror) = &config.mirror {
        let len = config.strip.num_leds * BYTES_PER_LED;
        strip = strip.with_mirror(open_mirror(&mirror.path, len)?)?;
        debug!("Mirroring buffer to {}", mirror.path);
    }

    let outcome = engine.run(&mut strip, cancel)?;
    match outcome {
        RunOutcome::Finished { cycles, steps } => {
            debug!("Finished {} cycles ({} steps)", cycles, steps)
        }
        RunOutcome::Cancelled { cycle, step, steps } => {
            debug!("Interrupted at cycle {} step {} ({} steps)", cycle, step, steps)
        }
    }
    debug!("{} frames shown", strip.frames_shown());

    Ok(())
}

#[cfg(unix)]
fn open_mirror(path: &str, len: usize) -> Result<Box<dyn Mirror>> {
    let mirror = mirror::FileMirror::create(path, len)?;
    Ok(Box::new(mirror))
}

#[cfg(not(unix))]
fn open_mirror(path: &str, _len: usize) -> Result<Box<dyn Mirror>> {
    anyhow::bail!("File mirrors are not supported on this platform ({})", path)
}
