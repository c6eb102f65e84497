//! BANTER API Server Entry Point
//!
//! Bootstraps configuration from the environment, connects the SQLite and
//! blob stores, wires the LLM/retrieval collaborators, and starts the Axum
//! HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use banter_api::oidc::{HttpKeyFetcher, KeyCache, SystemCacheClock};
use banter_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, FilesConfig,
    IdentityResolver, LlmConfig, StoreConfig,
};
use banter_llm::{
    HttpIngestor, HttpRetriever, Ingestor, NullIngestor, NullRetriever, OpenAiChatProvider,
    OpenAiClient, OpenAiVisionProvider, Retriever,
};
use banter_storage::{LocalFileStore, SqliteStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let filter = EnvFilter::try_from_env("BANTER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    if api_config.is_production() {
        auth_config.validate_for_production()?;
    }

    let store_config = StoreConfig::from_env();
    let files_config = FilesConfig::from_env();
    let llm_config = LlmConfig::from_env();
    tracing::info!(?store_config, ?files_config, ?llm_config, "Loaded configuration");

    let store = Arc::new(SqliteStore::connect(&store_config.db_path).await?);
    let files = Arc::new(LocalFileStore::new(files_config.uploads_dir.clone()).await?);

    let client = OpenAiClient::new(
        llm_config.base_url.clone(),
        llm_config.api_key.expose_secret().to_string(),
    );
    let chat = Arc::new(OpenAiChatProvider::new(
        client.clone(),
        llm_config.model.clone(),
    ));
    let vision = Arc::new(OpenAiVisionProvider::new(
        client,
        llm_config.vision_model().to_string(),
    ));

    let retriever: Arc<dyn Retriever> = match &llm_config.retrieval_url {
        Some(url) => Arc::new(HttpRetriever::new(url.clone())),
        None => {
            tracing::warn!("No retrieval endpoint configured; answers will not be grounded");
            Arc::new(NullRetriever)
        }
    };
    let ingestor: Arc<dyn Ingestor> = match &llm_config.ingest_url {
        Some(url) => Arc::new(HttpIngestor::new(url.clone())),
        None => Arc::new(NullIngestor),
    };

    let fetcher = Arc::new(HttpKeyFetcher::new(auth_config.fetch_timeout)?);
    let keys = KeyCache::new(
        fetcher,
        Arc::new(SystemCacheClock),
        auth_config.key_ttl,
        auth_config.issuer.clone(),
    );
    let resolver = Arc::new(IdentityResolver::new(auth_config, keys));

    let state = AppState {
        store,
        files,
        chat,
        vision,
        retriever,
        ingestor,
        resolver,
        files_config,
        start_time: Instant::now(),
    };

    let app: Router = create_api_router(state, &api_config);

    let addr = resolve_bind_addr(&api_config)?;
    tracing::info!(%addr, "Starting BANTER API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    let mut addr: SocketAddr = config.bind.parse().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", config.bind, e))
    })?;
    if let Some(port) = config.port {
        addr.set_port(port);
    }
    Ok(addr)
}
