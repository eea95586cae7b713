//! wirekey - serial-to-input-events bridge.
//!
//! Reads a microcontroller's line-oriented serial stream and fans it out as
//! OS keyboard/pointer input, MIDI, OSC and WebSocket messages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wirekey::config::AppConfig;
use wirekey::dispatch::Dispatcher;
use wirekey::engine::Engine;
use wirekey::serial;
use wirekey::sinks::emulate::InputEmulator;
use wirekey::sinks::midi::MidiSink;
use wirekey::sinks::osc::OscSink;
use wirekey::sinks::websocket;

/// Bridge a microcontroller's serial stream to keyboard, MIDI, OSC and
/// WebSocket events
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the per-user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available serial ports
    #[arg(long)]
    list_ports: bool,

    /// List available MIDI output ports
    #[arg(long)]
    list_midi: bool,

    /// Serial port to open (overrides the configured port)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the configured rate)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Write the effective configuration to disk and exit
    #[arg(long)]
    save_config: bool,

    /// Reset the configuration file to defaults and exit
    #[arg(long)]
    reset_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting wirekey...");

    if args.list_ports {
        return list_serial_ports();
    }
    if args.list_midi {
        return list_midi_ports();
    }
    if args.reset_config {
        let (_, path) = AppConfig::reset(args.config.as_deref()).await?;
        info!("Configuration reset: {}", path.display());
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref()).await?;
    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }

    if args.save_config {
        let path = config.save(args.config.as_deref()).await?;
        info!("Configuration written: {}", path.display());
        return Ok(());
    }

    run_app(config, shutdown_signal()).await?;

    info!("wirekey shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    let mut engine = Engine::new(&config);
    info!(
        "{} channels registered, {} keys in vocabulary",
        engine.registry().len(),
        config.keys.len()
    );

    let mut dispatcher = Dispatcher::new();

    match InputEmulator::spawn() {
        Ok(emulator) => dispatcher.emulator = Some(emulator),
        Err(e) => warn!("Input emulation unavailable: {e}"),
    }

    if config.midi.enabled {
        let midi = Arc::new(MidiSink::new());
        if let Some(pattern) = &config.midi.port {
            if let Err(e) = midi.connect(pattern) {
                warn!("MIDI output unavailable: {e}");
            }
        }
        dispatcher.midi = Some(midi);
    }

    if config.osc.enabled {
        let local = format!("{}:{}", config.osc.local_address, config.osc.local_port);
        let remote = format!("{}:{}", config.osc.remote_address, config.osc.remote_port);
        match OscSink::bind(&local, &remote) {
            Ok(osc) => {
                info!("OSC sending to {remote}");
                dispatcher.osc = Some(osc);
            }
            Err(e) => warn!("OSC unavailable: {e}"),
        }
    }

    let (ws_incoming_tx, mut ws_incoming_rx) = mpsc::channel::<String>(256);
    let mut ws_handle = None;
    if config.websocket.enabled {
        match websocket::start(&config.websocket, ws_incoming_tx).await {
            Ok(handle) => {
                dispatcher.websocket = Some(handle.sender());
                ws_handle = Some(handle);
            }
            Err(e) => warn!("WebSocket unavailable: {e}"),
        }
    }

    let (line_tx, mut line_rx) = mpsc::channel::<String>(1024);
    let mut serial_handle = match &config.serial.port {
        Some(port) => match serial::spawn_reader(port, config.serial.baud_rate, line_tx) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("{e:#}");
                None
            }
        },
        None => {
            info!("No serial port configured; WebSocket input only");
            None
        }
    };
    let mut serial_active = serial_handle.is_some();

    let mut tick = tokio::time::interval(engine.tick_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Serial lines
            line = line_rx.recv(), if serial_active => match line {
                Some(line) => {
                    dispatcher.dispatch_all(&engine.handle_line(&line, Instant::now()));
                }
                None => {
                    serial_active = false;
                    serial_handle.take();
                    warn!("Serial link lost, releasing held keys");
                    dispatcher.dispatch_all(&engine.disconnect());
                }
            },

            // Text from WebSocket peers is treated like serial input
            Some(text) = ws_incoming_rx.recv() => {
                dispatcher.dispatch_all(&engine.handle_line(&text, Instant::now()));
            }

            // Liveness sweep
            _ = tick.tick() => {
                let events = engine.tick(Instant::now());
                if !events.is_empty() {
                    dispatcher.dispatch_all(&events);
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    dispatcher.dispatch_all(&engine.disconnect());
    drop(serial_handle);
    drop(ws_handle);
    dispatcher.shutdown();

    Ok(())
}

fn list_serial_ports() -> Result<()> {
    println!("\n{}", "Available serial ports:".bold());
    let ports = serial::list_ports()?;
    if ports.is_empty() {
        println!("  (none found)");
    }
    for port in ports {
        println!("  {} - {}", port.name.green(), port.label);
    }
    Ok(())
}

fn list_midi_ports() -> Result<()> {
    println!("\n{}", "Available MIDI output ports:".bold());
    let ports = MidiSink::list_ports()?;
    if ports.is_empty() {
        println!("  (none found)");
    }
    for name in ports {
        println!("  {}", name.green());
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
