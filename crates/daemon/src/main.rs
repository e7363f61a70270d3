use anyhow::Context;

use hrflow_infra::jobs::JobServices;
use hrflow_infra::{Configuration, Orchestrator, OrchestratorConfig, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Configuration::load().context("failed to load configuration")?;
    hrflow_observability::init(&config.log);

    let pool = db::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let orchestrator = Orchestrator::new(OrchestratorConfig::from(&config.jobs), JobServices::postgres(pool));
    let handle = orchestrator.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    handle.shutdown().await;
    Ok(())
}
