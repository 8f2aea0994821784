#![allow(dead_code)]

use std::sync::{Arc, Once};

use lineage_registry_service::catalog::{NewColumn, NewDataset};
use lineage_registry_service::config::{PageConfig, SearchConfig};
use lineage_registry_service::{MemoryRegistry, RegistryEngine};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub fn memory_engine() -> RegistryEngine<MemoryRegistry> {
    init_test_logging();
    RegistryEngine::with_limits(
        Arc::new(MemoryRegistry::new()),
        SearchConfig::default(),
        PageConfig::default(),
    )
}

pub fn columns(names: &[&str]) -> Vec<NewColumn> {
    names.iter().map(|n| NewColumn::new(n, "INT")).collect()
}

/// Registers `connection.database.schema.table` and returns its FQN.
pub async fn register(
    engine: &RegistryEngine<MemoryRegistry>,
    fqn: &str,
    column_names: &[&str],
) -> String {
    let parts: Vec<&str> = fqn.split('.').collect();
    let request = NewDataset::new(parts[0], parts[1], parts[2], parts[3])
        .with_columns(columns(column_names));
    engine
        .create_dataset(request)
        .await
        .expect("Failed to register dataset")
        .fqn
        .to_string()
}
