use anyhow::{Context, Result};
use leadrelay::ads::GoogleAdsClient;
use leadrelay::api::{create_router, AppState};
use leadrelay::config::{load_config, StorageBackend, StorageConfig};
use leadrelay::credentials::{CredentialStore, JsonFileStore, SqliteStore, StateStore};
use leadrelay::oauth::{
    run_state_cleanup, AuthorizationFlow, OAuthProvider, StateManager, TokenClient, TokenManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadrelay=info".into()),
        )
        .init();

    info!("leadrelay starting...");

    let config_path = PathBuf::from(
        std::env::var("LEADRELAY_CONFIG").unwrap_or_else(|_| "leadrelay.toml".to_string()),
    );
    let config = load_config(&config_path)?;

    info!(
        config_path = %config_path.display(),
        port = config.server.port,
        backend = ?config.storage.backend,
        redirect_uri = %config.oauth.redirect_uri,
        state_ttl_seconds = config.oauth.state_ttl_seconds,
        "Configuration loaded"
    );
    if config.oauth.client_id.is_none() {
        warn!("GOOGLE_CLIENT_ID is not set, /oauth/authorize will be rejected");
    }

    let (credential_store, state_store) = open_stores(&config.storage)?;
    info!("Durable stores opened");

    let timeout = Duration::from_secs(config.oauth.request_timeout_seconds);
    let provider = Arc::new(OAuthProvider::from_config(&config.oauth));
    let client = TokenClient::new(provider, timeout)?;

    let tokens = Arc::new(
        TokenManager::load(client, credential_store).context("Failed to load stored credentials")?,
    );
    tokens
        .seed(
            config.oauth.access_token.clone(),
            config.oauth.refresh_token.clone(),
        )
        .await
        .context("Failed to seed credentials from environment")?;

    let states = StateManager::load(state_store, config.oauth.state_ttl_seconds)
        .context("Failed to load pending OAuth states")?;
    let flow = Arc::new(AuthorizationFlow::new(Arc::clone(&tokens), states.clone()));
    let google_ads = Arc::new(GoogleAdsClient::new(config.google_ads.clone(), timeout)?);

    // Start background state sweep
    let cleanup_handle = tokio::spawn(run_state_cleanup(
        states.clone(),
        config.oauth.state_cleanup_interval_seconds,
    ));

    let app_state = AppState {
        tokens,
        flow,
        states,
        google_ads,
        configured_refresh_token: config.oauth.refresh_token.clone(),
    };
    let router = create_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "HTTP server listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    cleanup_handle.abort();
    info!("leadrelay stopped");

    Ok(())
}

/// Open the configured backend once and hand out both store views of it.
fn open_stores(config: &StorageConfig) -> Result<(Arc<dyn CredentialStore>, Arc<dyn StateStore>)> {
    match config.backend {
        StorageBackend::Json => {
            let store = Arc::new(JsonFileStore::new(
                &config.credentials_path,
                &config.states_path,
            ));
            let credentials: Arc<dyn CredentialStore> = store.clone();
            let states: Arc<dyn StateStore> = store;
            Ok((credentials, states))
        }
        StorageBackend::Sqlite => {
            let key = config
                .encryption_key
                .as_deref()
                .context("LEADRELAY_ENCRYPTION_KEY is required for the sqlite backend (base64-encoded 32-byte key)")?;
            let store = Arc::new(
                SqliteStore::new(&config.sqlite_path, key)
                    .context("Failed to initialize credential database")?,
            );
            let credentials: Arc<dyn CredentialStore> = store.clone();
            let states: Arc<dyn StateStore> = store;
            Ok((credentials, states))
        }
    }
}
