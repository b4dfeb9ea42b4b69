//! streamwatch entry point
//!
//! Wires logging, configuration, the channel registry and the
//! supervisor together, then hands the terminal to the command shell.
//! Ctrl+C and SIGTERM inject a quit command so interactive exit and
//! signal-driven exit share the same stop-all shutdown path.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use streamwatch::cli::{self, Command};
use streamwatch::config::Config;
use streamwatch::logging;
use streamwatch::registry::ChannelRegistry;
use streamwatch::status::StatusReporter;
use streamwatch::supervisor::{Supervisor, SupervisorSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let _log_guard = logging::init_logging()?;
    info!("streamwatch starting...");

    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    let recordings_dir = config.recordings_dir();
    std::fs::create_dir_all(&recordings_dir)
        .with_context(|| format!("Failed to create recordings directory: {:?}", recordings_dir))?;

    let registry_path = config.channels_path()?;
    let first_run = !registry_path.exists();
    let registry = ChannelRegistry::load(&registry_path)?;
    if first_run {
        registry.save(&registry_path)?;
        info!("Created empty channel registry at {:?}", registry_path);
    }
    info!("Loaded {} registered channel(s)", registry.len());

    let (reporter, redraw_rx) = StatusReporter::new();
    let settings = SupervisorSettings::from_config(&config)?;
    let supervisor = Supervisor::new(settings, registry, reporter);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler({
        let command_tx = command_tx.clone();
        move || {
            let _ = command_tx.send(Command::Quit);
        }
    })?;

    supervisor.start_all().await;
    cli::run_shell(&supervisor, redraw_rx, command_rx).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_help() {
    println!("streamwatch - supervised recording of live-streamed channels");
    println!();
    println!("USAGE:");
    println!("    streamwatch [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help    Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                Set log level (e.g., debug, info, warn)");
    println!("    STREAMWATCH_LOG_PATH    Override the log directory");
    println!();
    println!("Commands inside the shell: add, remove, start, stop, quit");
}
