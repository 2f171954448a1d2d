//! Spyeswitch - headless motion sensor daemon for Spyeworks players.
//!
//! Watches a motion sensor on a GPIO line and switches the player between
//! its active and idle playlists. Runs until Ctrl+C or SIGTERM; SIGHUP
//! reloads the settings file.

mod config;
mod stdin_sensor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use spyeswitch_core::{
    bootstrap_services, ChannelLevelSource, ConfigStore, ControllerHandle, FileConfigStore,
    LevelSource, LoggingEventEmitter, NoopEventEmitter, PlayerClient, PlayerConnectivity,
    PlayerJob, PlayerSession, PlayerSettings, RuntimeConfig, SwitchError, SysfsLevelSource,
};
use tokio::signal;

use crate::config::ServerConfig;
use crate::stdin_sensor::spawn_stdin_sensor;

/// Spyeswitch - motion sensor playlist switching for Spyeworks players.
#[derive(Parser, Debug)]
#[command(name = "spyeswitch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the settings file (overrides config file).
    #[arg(short, long, value_name = "FILE", env = "SPYESWITCH_SETTINGS_FILE")]
    settings: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SPYESWITCH_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// GPIO line of the motion sensor (overrides config file).
    #[arg(short, long, env = "SPYESWITCH_GPIO_LINE")]
    gpio_line: Option<u32>,

    /// Read sensor levels from stdin (1/on, 0/off) instead of GPIO.
    #[arg(long)]
    simulate: bool,

    /// Query the player's current and stored playlists, print them and exit.
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Spyeswitch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(settings) = args.settings {
        config.settings_file = settings;
    }
    if let Some(line) = args.gpio_line {
        config.gpio_line = line;
    }

    let store = FileConfigStore::new(&config.settings_file);
    let settings = store.load().context("Failed to load settings")?;
    let runtime = config.to_runtime_config();

    log::info!(
        "Configuration: player={}:{}, settings={}, drain_quiet={:?}",
        settings.player_address,
        settings.player_port,
        store.path().display(),
        runtime.drain_quiet
    );

    if args.probe {
        return probe(PlayerSettings::from(&settings), &runtime).await;
    }

    // Pick the sensor input
    let mut simulated_line = None;
    let level_source: Arc<dyn LevelSource> = if args.simulate {
        let (source, line) = ChannelLevelSource::new(false);
        simulated_line = Some(line);
        Arc::new(source)
    } else {
        log::info!(
            "Sensor: GPIO line {} under {}",
            config.gpio_line,
            config.gpio_root.display()
        );
        Arc::new(SysfsLevelSource::new(
            &config.gpio_root,
            config.gpio_line,
            config.gpio_poll_interval(),
        ))
    };

    let services = bootstrap_services(settings, &runtime, level_source)
        .await
        .context("Failed to bootstrap services")?;
    services
        .event_bridge
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    if let Some(line) = simulated_line {
        spawn_stdin_sensor(line, services.cancel_token.clone());
    }

    // Learn what the player is doing before the first sensor edge
    services.player.submit(PlayerJob::RefreshCurrentList);
    services.player.submit(PlayerJob::RefreshAllLists);

    log::info!("Services started");

    let mut reload = ReloadSignal::install()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = reload.recv() => reload_settings(&store, &services.controller),
        }
    }

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Re-reads the settings file and hands it to the controller.
fn reload_settings(store: &FileConfigStore, controller: &ControllerHandle) {
    log::info!("Reloading settings from {}", store.path().display());
    let result = store
        .load()
        .map_err(SwitchError::from)
        .and_then(|settings| controller.reconfigure(settings));
    if let Err(e) = result {
        log::error!("Settings reload failed: {}", e);
    }
}

/// Queries the player once and prints what it reports.
async fn probe(settings: PlayerSettings, runtime: &RuntimeConfig) -> Result<()> {
    let session = PlayerSession::new(
        Arc::new(PlayerClient::new(runtime.drain_quiet)),
        settings,
        Arc::new(NoopEventEmitter),
    );

    let connectivity = session.refresh_current_list().await;
    println!("Player:       {}", connectivity);
    if connectivity != PlayerConnectivity::Online {
        bail!("player at {} is not reachable", session.settings().address);
    }
    session.refresh_all_lists().await;

    println!(
        "Current list: {}",
        session.current_list().as_deref().unwrap_or("(unknown)")
    );
    println!("Stored lists:");
    for list in session.all_lists() {
        println!("  {}", list);
    }
    Ok(())
}

/// SIGHUP listener; never fires on platforms without it.
#[cfg(unix)]
struct ReloadSignal(signal::unix::Signal);

#[cfg(unix)]
impl ReloadSignal {
    fn install() -> Result<Self> {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .map(Self)
            .context("Failed to install SIGHUP handler")
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct ReloadSignal;

#[cfg(not(unix))]
impl ReloadSignal {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
