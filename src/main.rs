// reasoning-proxy - local HTTP reverse proxy that hides reasoning
// chains-of-thought from OpenAI-compatible clients.
//
// Architecture:
// - Router/Handler (axum): resolves a profile for the client's model,
//   translates the request into the upstream's dialect, injects reasoning
//   params, calls the upstream, translates the response back, and strips
//   <think> blocks from the outbound stream.
// - ConfigService: REST surface for CRUD of profiles and proxy settings,
//   backed by a single atomically-written JSON document.
// - ThinkingBus: process-wide pub/sub that re-emits stripped thinking to
//   any subscriber of /v1/thinking/stream.

mod cli;
mod config;
mod config_api;
mod error;
mod format;
mod handler;
mod logging;
mod profile;
mod reasoning;
mod server;
mod sse;
mod startup;
mod stream_filter;
mod thinking_bus;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::{AppConfig, ConfigStore};
use thinking_bus::ThinkingBus;

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI subcommands first (config --show/--path, profiles --list).
    // If a subcommand was handled, exit early rather than starting the proxy.
    if cli::handle_cli() {
        return Ok(());
    }

    // Write a starter bootstrap TOML file on first run so users can
    // discover the available options.
    AppConfig::ensure_bootstrap_file_exists();

    let app_config = AppConfig::from_env();
    let _logging_guard = logging::init(&app_config);

    let config_store = match ConfigStore::load(app_config.config_doc_path.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("failed to load config document {}: {e}", app_config.config_doc_path.display());
            std::process::exit(2);
        }
    };

    let thinking_bus = Arc::new(ThinkingBus::new());
    let upstream_timeout = Duration::from_secs(app_config.upstream_timeout_secs);

    let proxy_settings = config_store.proxy_settings();
    let snapshot = config_store.profiles().snapshot();
    startup::print_startup(
        &app_config,
        proxy_settings.port,
        snapshot.all().len(),
        snapshot.default_profile().map(|p| p.id.as_str()),
    );
    startup::log_startup(&app_config, proxy_settings.port, snapshot.all().len());
    drop(snapshot);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight requests...");
    };

    let bind_result = server::serve(
        &app_config.bind_host,
        proxy_settings.port,
        config_store,
        thinking_bus,
        upstream_timeout,
        shutdown,
    )
    .await;

    match bind_result {
        Ok(()) => {
            tracing::info!("shutdown complete");
            Ok(())
        }
        Err(e) => {
            eprintln!("failed to start reasoning-proxy: {e:#}");
            std::process::exit(1);
        }
    }
}
