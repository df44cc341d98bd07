//! # clip-contest Binary
//!
//! Loads settings, assembles the plugins behind the core traits and serves
//! the API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use cc_api::middleware::with_middleware;
use cc_api::{router, AppState, ResolvePolicy};
use cc_auth_jwt::JwtIdentityProvider;
use cc_config::{LogSettings, Settings};
use cc_core::traits::MetadataFetcher;
use cc_db_sqlite::SqliteStore;
use cc_meta_oembed::{NoopFetcher, OEmbedFetcher};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured filter when set.
fn init_tracing(log: &LogSettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.filter).with_context(|| format!("invalid log filter '{}'", log.filter))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log)?;

    // 1. Persistence: one store serves all three repository traits
    let store = Arc::new(
        SqliteStore::connect(&settings.database.url, settings.database.max_connections)
            .await
            .with_context(|| format!("opening database {}", settings.database.url))?,
    );

    // 2. Identity
    let identity = JwtIdentityProvider::new(&settings.auth.jwt_secret, settings.auth.audience.as_deref());

    // 3. Metadata
    let metadata: Arc<dyn MetadataFetcher> = if settings.metadata.enabled {
        Arc::new(OEmbedFetcher::new(settings.metadata.timeout())?)
    } else {
        Arc::new(NoopFetcher)
    };

    let policy = ResolvePolicy {
        timeout: settings.session.profile_timeout(),
        retries: settings.session.profile_retries,
        retry_delay: settings.session.retry_delay(),
    };
    let state = AppState::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(identity),
        metadata,
        policy,
        settings.metadata.timeout(),
    );
    let app = with_middleware(router(state), &settings.cors.allowed_origins);

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, metadata = settings.metadata.enabled, "clip-contest listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
