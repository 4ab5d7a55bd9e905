//! # pylon-gateway
//!
//! Pylon WebSocket gateway binary. Loads settings, starts the session
//! server, and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use pylon_server::{
    NoopDispatcher, PylonServer, SessionObserver, SessionSnapshot, SettingsProvider,
};
use pylon_settings::{load_settings_from_path, settings_path, ServerSettings};

/// Pylon WebSocket gateway server.
#[derive(Parser, Debug)]
#[command(name = "pylon-gateway", about = "Pylon WebSocket gateway server")]
struct Cli {
    /// Path to the settings file (defaults to `~/.pylon/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Bind host override.
    #[arg(long)]
    host: Option<String>,

    /// Listen port override (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging regardless of settings.
    #[arg(long)]
    debug: bool,
}

/// Log filter when debug logging is on and `RUST_LOG` is unset.
const DEBUG_FILTER: &str =
    "pylon_gateway=debug,pylon_server=debug,pylon_settings=debug,pylon_platform=debug,info";

fn init_logging(debug: bool) {
    let default_filter = if debug { DEBUG_FILTER } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Re-reads the settings file on every server start, with CLI overrides on
/// top. Edits to the file take effect on the next restart.
struct FileSettings {
    path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
}

impl SettingsProvider for FileSettings {
    fn load(&self) -> ServerSettings {
        let mut settings = match load_settings_from_path(&self.path) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to load settings, using defaults"
                );
                ServerSettings::default()
            }
        };
        if let Some(host) = &self.host {
            settings.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        settings
    }
}

/// Mirrors session lifecycle into the log.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_client_connected(&self, session: &SessionSnapshot) {
        info!(handle = %session.handle, remote = %session.remote_address, "client connected");
    }

    fn on_client_disconnected(&self, session: &SessionSnapshot, close_code: u16) {
        info!(handle = %session.handle, close_code, "client disconnected");
    }
}

/// Block the main thread until ctrl-c.
fn wait_for_shutdown() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for ctrl-c")?;
    Ok(())
}

// The server lifecycle is synchronous (stop() blocks on its own runtime), so
// main stays a plain thread and only the signal wait gets a runtime.
fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.settings.unwrap_or_else(settings_path);
    // Peek at settings once so the log filter honors debugEnabled.
    let initial = load_settings_from_path(&path).unwrap_or_default();
    init_logging(args.debug || initial.debug_enabled);

    let provider = Arc::new(FileSettings {
        path,
        host: args.host,
        port: args.port,
    });
    let server = PylonServer::new(provider, Arc::new(NoopDispatcher), Arc::new(LogObserver));

    server.start().context("failed to start server")?;
    if let Some(addr) = server.local_addr() {
        info!(address = %addr, "gateway listening");
    }
    if let Some(connect) = server.connect_string() {
        info!(connect, "connect string ready");
    }

    wait_for_shutdown()?;

    info!("shutting down");
    server.stop();
    info!("shutdown complete");
    Ok(())
}
