use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common_auth::{AuthConfig, AuthentikClient, Authenticator, CachedIdentityLookup};
use common_security::GroupMappingPolicy;
use common_token::{TokenCodec, TokenSecret};
use multipass_service::config::load_service_config;
use multipass_service::metrics::ServiceMetrics;
use multipass_service::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const MIN_CACHE_SWEEP: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_service_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let policy = GroupMappingPolicy::load(&config.group_mapping_path).with_context(|| {
        format!(
            "Failed to load group mapping from {}",
            config.group_mapping_path.display()
        )
    })?;
    let secret = TokenSecret::new(config.token_secret.clone()).context("Invalid TOKEN_SECRET")?;

    let client = AuthentikClient::new(&config.authentik_url, &config.authentik_api_token)
        .context("Failed to build Authentik client")?;
    let lookup = Arc::new(CachedIdentityLookup::with_ttl(
        client,
        config.identity_cache_ttl,
    ));

    let sweep_every = config.identity_cache_ttl.max(MIN_CACHE_SWEEP);
    let sweeper = lookup.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let removed = sweeper.purge_expired();
            if removed > 0 {
                debug!(removed, "identity_cache_swept");
            }
        }
    });

    let authenticator = Authenticator::new(TokenCodec::new(secret), Arc::new(policy), lookup)
        .with_config(
            AuthConfig::new().with_trusted_proxy_headers(config.trusted_proxy_headers),
        );

    let host = config.host.clone();
    let port = config.port;
    let environment = config.environment.clone();
    let state = AppState {
        authenticator: Arc::new(authenticator),
        config: Arc::new(config),
        metrics: Arc::new(ServiceMetrics::new()?),
    };
    let app = build_router(state);

    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));

    info!(%addr, environment = %environment, "starting multipass-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
