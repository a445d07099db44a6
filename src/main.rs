//! Pulsemeter - Main entry point
//!
//! Samples the board until Ctrl-C and prints every property change.
//! Host commands are read from stdin, one `<command> <address>` per line.

use anyhow::{Context, Result};
use clap::Parser;
use pulsemeter_lib::core::{Config, EventFormat};
use pulsemeter_lib::driver::{Command, Driver};
use pulsemeter_lib::events::{self, ChannelSink, EventSink, LogSink};
use pulsemeter_lib::hardware;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "pulsemeter")]
#[command(author, version, about = "Pulse metering driver for the Weeco-4M 8DI board", long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the emulated board regardless of configuration
    #[arg(long)]
    emulate: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    log::info!("Starting Pulsemeter v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if args.emulate {
        config.board.emulate = true;
    }

    let source = hardware::open_board(&config.board).context("Failed to open board")?;
    let (sink, mut rx) = ChannelSink::new();
    let mut driver = Driver::new(config.metering.clone(), source, Box::new(sink), true)
        .context("Invalid metering configuration")?;

    let format = config.events.format;
    let printer = tokio::spawn(async move {
        let mut log_sink = LogSink;
        while let Some(event) = rx.recv().await {
            match format {
                EventFormat::Json => match events::to_json_line(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::warn!("Failed to encode event: {}", e),
                },
                EventFormat::Log => log_sink.emit(event),
            }
        }
    });

    let modules = driver.modules().await;
    log::info!("{} modules available", modules.len());
    driver.connect().await.context("Failed to connect")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&driver, &line).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    log::info!("Shutting down");
    if let Err(e) = driver.disconnect().await {
        log::warn!("Failed to clear outputs: {}", e);
    }

    // Dropping the driver closes the event channel and lets the printer drain.
    drop(driver);
    if let Err(e) = printer.await {
        log::error!("Event printer ended abnormally: {}", e);
    }

    Ok(())
}

/// Run one `<command> <address>` line from stdin
async fn handle_line(driver: &Driver, line: &str) {
    let mut parts = line.split_whitespace();
    let (Some(name), Some(address)) = (parts.next(), parts.next()) else {
        if !line.trim().is_empty() {
            log::warn!("Expected '<command> <address>', got '{}'", line.trim());
        }
        return;
    };

    let command = match name.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            log::warn!("{}", e);
            return;
        }
    };
    let address = match address.parse::<u8>() {
        Ok(address) => address,
        Err(e) => {
            log::warn!("Invalid address '{}': {}", address, e);
            return;
        }
    };

    match driver.execute(command, address).await {
        Ok(Some(value)) => log::info!("{} {} -> {}", command, address, value),
        Ok(None) => log::debug!("{} {} done", command, address),
        Err(e) => log::warn!("{} {} failed: {}", command, address, e),
    }
}

fn init_logging(verbose: u8) {
    use env_logger::{Builder, Env};
    use log::LevelFilter;

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}
