use std::sync::Arc;

use anyhow::Context;
use bot_host::{build_router, AppState, HostConfig, HostMetrics};
use common_auth::{JwtVerifier, MetadataCache, ResolvedPolicy};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HostConfig::from_env()?;
    let token_config = config.load_token_validation()?;
    let policy = ResolvedPolicy::build_for_section(&token_config, &config.auth_section)
        .context("Token validation is not configured")?;

    let metadata_cache = MetadataCache::new();
    let mut builder = JwtVerifier::builder(policy).with_metadata_cache(metadata_cache.clone());
    if let Some(pem) = &config.dev_public_key_pem {
        warn!("Using BOT_DEV_PUBLIC_KEY_PEM for verification; do not enable in production");
        builder = builder
            .with_rsa_pem("local-dev", pem.as_bytes())
            .map_err(anyhow::Error::from)?;
    }
    if config.allow_anonymous {
        warn!("BOT_ALLOW_ANONYMOUS is set; requests without a token are accepted");
    }
    let jwt_verifier = Arc::new(builder.build());
    info!("JWT verifier initialised");

    let addr = config.socket_addr()?;
    let state = AppState {
        jwt_verifier,
        metrics: Arc::new(HostMetrics::new()?),
        config: Arc::new(config),
    };
    let app = build_router(state);

    info!(%addr, "starting bot-host");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metadata_cache.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
