//! Builds the reqwest client, assembles the axum `Router`, and serves it
//! with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::ConfigStore;
use crate::config_api;
use crate::handler::{self, AppState};
use crate::thinking_bus::ThinkingBus;

/// Assemble the full router: the proxy surface plus the config REST
/// surface, CORS-permissive since this is a local developer tool that binds
/// to loopback by default and enforces no origin policy of its own.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handler::chat_completions))
        .route("/v1/models", get(handler::list_models))
        .route("/health", get(handler::health))
        .route("/v1/thinking/stream", get(handler::thinking_stream))
        .route("/v1/config/profiles", get(config_api::list_profiles).post(config_api::create_profile))
        .route(
            "/v1/config/profiles/test",
            post(config_api::test_profile),
        )
        .route(
            "/v1/config/profiles/:id",
            get(config_api::get_profile).put(config_api::update_profile).delete(config_api::delete_profile),
        )
        .route("/v1/config/default-profile", put(config_api::set_default_profile))
        .route(
            "/v1/config/proxy",
            get(config_api::get_proxy_settings).put(config_api::set_proxy_settings),
        )
        .route("/v1/config/reasoning/types", get(config_api::reasoning_types))
        .route("/v1/config/export", get(config_api::export_config))
        .route("/v1/config/import", post(config_api::import_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build the shared reqwest client used for every upstream call: no default
/// User-Agent (so the caller's own is forwarded untouched where a provider
/// checks it), HTTP/1.1 only to sidestep HTTP/2 reset issues some providers
/// exhibit, and a bounded idle-connection pool per host.
pub fn build_http_client(upstream_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(upstream_timeout)
        .pool_max_idle_per_host(10)
        .http1_only()
        .build()
        .context("failed to build upstream HTTP client")
}

/// Bind and serve until `shutdown` resolves. Ctrl+C triggers a graceful
/// shutdown that lets in-flight streams drain.
pub async fn serve(
    bind_host: &str,
    port: u16,
    config: Arc<ConfigStore>,
    thinking_bus: Arc<ThinkingBus>,
    upstream_timeout: Duration,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let http = build_http_client(upstream_timeout)?;
    let state = AppState { config, thinking_bus, http, upstream_timeout };
    let app = build_router(state);

    let addr = format!("{bind_host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "reasoning-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;

    #[test]
    fn router_builds_without_panicking() {
        let dir = std::env::temp_dir().join(format!("reasoning-proxy-server-test-{}", uuid::Uuid::new_v4()));
        let store = ConfigStore::load(dir.join("proxy_config.json")).unwrap();
        let state = AppState {
            config: Arc::new(store),
            thinking_bus: Arc::new(ThinkingBus::new()),
            http: reqwest::Client::new(),
            upstream_timeout: Duration::from_secs(600),
        };
        let _app = build_router(state);
        std::fs::remove_dir_all(dir).ok();
    }
}
