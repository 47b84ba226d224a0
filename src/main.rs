use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use case_gateway::config::GatewayConfig;
use case_gateway::history::{store::HistoryStore, writer};
use case_gateway::upstream::graphql::GraphqlClient;
use case_gateway::{api, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Also picks up `log` records from the library
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = GatewayConfig::load_with_dotenv().context("invalid configuration")?;
    tracing::info!(?config, "case-gateway starting");

    let backend = Arc::new(
        GraphqlClient::new(
            &config.graphql_endpoint,
            &config.token,
            config.upstream_timeout(),
        )
        .context("failed to build upstream client")?,
    );

    let store = Arc::new(HistoryStore::new(&config.data_dir, config.calendar()?));
    let (history, worker) = writer::create(store.clone());
    let worker = tokio::spawn(worker);

    let state = AppState::new(backend, history.clone(), store);
    api::start_server(state, &config.bind_addr, shutdown_signal())
        .await
        .with_context(|| format!("server on {} failed", config.bind_addr))?;

    // Let queued history land before exit
    history.flush().await;
    drop(history);
    worker.await.context("history worker panicked")?;

    tracing::info!("case-gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await
        }
    }
}
