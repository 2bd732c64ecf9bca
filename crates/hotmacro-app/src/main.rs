//! hotmacro application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Start the global hotkey service and keystroke injector
//! 4. Build the playback engine and install the Activate hotkey
//! 5. Wait for Ctrl-C, then release every hotkey

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hotmacro_core::config::HotmacroConfig;
use hotmacro_core::error::HotmacroError;
use hotmacro_engine::{
    ConfigSource, FileConfigSource, GlobalHotkeyService, HotkeyService, InputInjector,
    MacroController, MacroEngine, StartOutcome, TextInjector,
};

use cli::CliArgs;

/// Load the config file without logging, so the caller can report the
/// outcome after tracing is up. Falls back to defaults on any error.
fn load_config(path: &Path) -> (HotmacroConfig, Option<HotmacroError>) {
    match HotmacroConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (HotmacroConfig::default(), Some(e)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Read before tracing so the file can choose the log level; the
    // outcome is logged once the subscriber exists.
    let config_file = args.resolve_config_path();
    let (config, load_error) = load_config(&config_file);

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting hotmacro v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(
            path = %config_file.display(),
            messages = config.messages.len(),
            "Configuration loaded"
        ),
        Some(_) if !config_file.exists() => tracing::info!(
            path = %config_file.display(),
            "No config file found, using defaults"
        ),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    if args.init {
        if config_file.exists() {
            tracing::info!(path = %config_file.display(), "Config file already exists, leaving it untouched");
        } else {
            HotmacroConfig::default().save(&config_file)?;
        }
        return Ok(());
    }

    // Hotkeys and injection.
    let hotkeys = Arc::new(GlobalHotkeyService::new()?);
    let source: Arc<dyn ConfigSource> = Arc::new(FileConfigSource::new(config_file.clone()));
    let injector: Arc<dyn InputInjector> = Arc::new(TextInjector::new());

    let engine = MacroEngine::new(
        source,
        Arc::clone(&hotkeys) as Arc<dyn HotkeyService>,
        injector,
    );
    let controller = MacroController::new(engine);

    if args.arm {
        match controller.start() {
            Ok(StartOutcome::Armed { run_id, .. }) => {
                tracing::info!(%run_id, "Armed from the command line");
            }
            Ok(StartOutcome::AlreadyActive(state)) => {
                tracing::debug!(%state, "Engine already active");
            }
            Err(e) => tracing::error!(error = %e, "Failed to arm the macro"),
        }
    }

    tracing::info!(
        activate = ?controller.engine().activate_combo().map(|c| c.to_string()),
        state = %controller.state(),
        "Waiting for hotkeys, press Ctrl-C to exit"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    controller.engine().shutdown();
    hotkeys.shutdown();
    Ok(())
}
