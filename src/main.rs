use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lineage_registry_service::config::ServiceConfig;
use lineage_registry_service::RegistryEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lineage_registry_service=debug,lineage_registry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lineage Registry v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    info!("Configuration loaded:");
    info!("  Database URL: {}", config.database.redacted_url());
    info!("  Pool size: {}", config.database.pool_size);
    info!(
        "  Search limit: default {}, max {}",
        config.search.default_limit, config.search.max_limit
    );

    let engine = RegistryEngine::connect(&config)
        .await
        .context("Failed to initialize registry engine")?;

    let report = engine.audit().await.context("Lineage audit failed")?;
    info!(
        "Lineage audit: {} dataset(s), {} edge(s), acyclic = {}",
        report.datasets, report.edges, report.acyclic
    );

    if !report.acyclic {
        error!("Stored lineage graph violates the DAG invariant");
        bail!("lineage graph contains a cycle");
    }

    info!("Lineage Registry check complete");
    Ok(())
}
