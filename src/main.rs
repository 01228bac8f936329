//! MIDI Host GW
//!
//! Translates MIDI controller input into host command lines sent over a
//! loopback TCP link.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_host_gw::commands::CommandCatalog;
use midi_host_gw::config::AppConfig;
use midi_host_gw::dispatch::Dispatcher;
use midi_host_gw::host::{CommandSink, HostOut};
use midi_host_gw::midi::device::{self, MidiReceiver, MidiSender};
use midi_host_gw::paths::AppPaths;
use midi_host_gw::profile::{ProfileTable, ProfileWatcher};
use midi_host_gw::recenter::RecenterSupervisor;
use midi_host_gw::settings::{default_app_info, SessionSettings};

/// MIDI Host GW - drive a host application from a MIDI control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile to load (overrides the config)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    let paths = AppPaths::detect();
    if let Err(e) = paths.ensure_directories() {
        warn!("Failed to prepare data directory {}: {:#}", paths.base_dir().display(), e);
    }

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());
    let config = AppConfig::load_or_default(&config_path).await?;

    let profile_path = args
        .profile
        .clone()
        .or_else(|| config.profile.path.clone())
        .unwrap_or_else(|| paths.profile.clone());

    info!("Starting MIDI Host GW...");
    if let Err(e) = run_app(config, &profile_path).await {
        error!("Gateway stopped with error: {:#}", e);
        std::process::exit(1);
    }

    info!("MIDI Host GW shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, profile_path: &Path) -> Result<()> {
    let profile = Arc::new(ProfileTable::new(Arc::new(CommandCatalog::default())));
    if profile_path.exists() {
        if let Err(e) = profile.load_from_file(profile_path).await {
            warn!("{}", e);
        }
    } else {
        info!("No profile at {}, starting empty", profile_path.display());
    }

    let model = Arc::new(config.controls.build_model()?);

    // Host link and the settings pushed on every connect
    let host = Arc::new(HostOut::new(&config.host));
    let sink: Arc<dyn CommandSink> = host.clone();
    host.add_observer(Arc::new(SessionSettings::new(
        Arc::downgrade(&sink),
        config.pickup_enabled,
        default_app_info(profile_path),
    )));
    host.start().context("Failed to start host writer")?;

    let recenter = config.midi.output.as_deref().and_then(|pattern| {
        match MidiSender::open(pattern) {
            Ok(sender) => Some(Arc::new(RecenterSupervisor::spawn(
                config.dispatch.recenter_delay(),
                model.clone(),
                Arc::new(sender),
            ))),
            Err(e) => {
                warn!("Recentering disabled: {:#}", e);
                None
            }
        }
    });

    let mut dispatcher = Dispatcher::new(
        profile.clone(),
        model.clone(),
        sink.clone(),
        config.dispatch.debounce(),
    );
    if let Some(recenter) = &recenter {
        dispatcher = dispatcher.with_recenter(recenter.clone());
    }
    let dispatcher = Arc::new(dispatcher);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut receiver = MidiReceiver::open(&config.midi.inputs, event_tx)?;
    info!("Listening on {} MIDI input(s)", receiver.connection_count());
    let dispatch_task = tokio::spawn(dispatcher.run(event_rx));

    let mut watcher = if config.profile.watch && profile_path.exists() {
        match ProfileWatcher::new(profile_path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Profile hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    info!("Gateway running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = shutdown_signal() => break,
            document = next_profile_document(&mut watcher) => match document {
                Some(document) => {
                    let count = profile.import(&document);
                    info!("Profile reloaded ({} bindings)", count);
                }
                None => {
                    debug!("Profile watcher closed");
                    watcher = None;
                }
            },
        }
    }

    // Teardown: inputs first so no new events arrive
    drop(watcher);
    receiver.close();
    if tokio::time::timeout(Duration::from_secs(1), dispatch_task).await.is_err() {
        warn!("Dispatcher did not stop in time");
    }
    if let Some(recenter) = &recenter {
        recenter.stop();
    }

    if config.profile.save_on_exit && profile.has_changes() {
        // failure already reported to the user
        let _ = profile.save_to_file(profile_path).await;
    }

    let host_shutdown = host.clone();
    tokio::task::spawn_blocking(move || host_shutdown.shutdown())
        .await
        .context("Host shutdown task failed")?
        .context("Host shutdown failed")?;

    Ok(())
}

async fn next_profile_document(watcher: &mut Option<ProfileWatcher>) -> Option<String> {
    match watcher {
        Some(w) => w.next_document().await,
        None => std::future::pending().await,
    }
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
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports) in [
        ("Input Ports:", device::list_input_ports()),
        ("Output Ports:", device::list_output_ports()),
    ] {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for port in ports {
                    println!("  {}", port.green());
                }
            }
            Err(e) => println!("  {}", format!("Error: {}", e).red()),
        }
    }
    println!();
}
