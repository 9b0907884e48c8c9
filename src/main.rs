//! midi-relay: forward channel-voice messages from one MIDI device to another.

use anyhow::Result;
use clap::{Parser, Subcommand};
use midi_relay::{
    config::{self, DevicePrefs},
    console::ConsoleChooser,
    directory::{DeviceDirectory, MidirDirectory},
    relay::forwarding_handler,
    resolver::{Resolver, DEFAULT_MAX_FALLBACKS},
    sink::RoutingSink,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "midi-relay",
    version,
    about = "Forward channel-voice messages from one MIDI device to another"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Preferred-device file: line 1 source name, line 2 target name
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Preferred source device name (overrides the config file)
    #[arg(long)]
    source: Option<String>,

    /// Preferred target device name (overrides the config file)
    #[arg(long)]
    target: Option<String>,

    /// Interactive fallbacks allowed per role before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_FALLBACKS)]
    max_fallbacks: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// List available MIDI devices
    ListDevices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let directory = MidirDirectory::new("midi-relay");

    if let Some(Commands::ListDevices) = cli.command {
        let devices = directory.list_devices()?;
        if devices.is_empty() {
            println!("  (none found)");
        }
        for device in &devices {
            println!("  [{}] {} - {}", device.index, device.name, device.description);
        }
        return Ok(());
    }

    let prefs = match (cli.source, cli.target) {
        (Some(source), Some(target)) => Some(DevicePrefs { source, target }),
        (None, None) => config::load(&cli.config),
        _ => anyhow::bail!("--source and --target must be given together"),
    };

    let sink = Arc::new(RoutingSink::new());
    let handler = forwarding_handler(Arc::clone(&sink));
    let chooser = ConsoleChooser::stdio();
    let mut resolver =
        Resolver::new(&directory, chooser).with_max_fallbacks(cli.max_fallbacks);
    let (source, target) = resolver.resolve(prefs.as_ref(), handler, &sink)?;

    info!(
        "forwarding from '{}' to '{}' (press enter to exit)",
        source.descriptor().name,
        target.device_name()
    );

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    drop(source);
    Ok(())
}
