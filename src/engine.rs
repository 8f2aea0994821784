use std::sync::Arc;
use tracing::info;

use crate::catalog::{Dataset, DatasetLineage, DatasetUpdate, LineageEdge, NewDataset};
use crate::config::{PageConfig, SearchConfig, ServiceConfig};
use crate::database::PgRegistry;
use crate::dataset_manager::DatasetManager;
use crate::error::Result;
use crate::lineage::{IntegrityReport, LineageEngine};
use crate::registry::DatasetRegistry;
use crate::search::{SearchEngine, SearchResponse};

/// Single handle over dataset CRUD, lineage and search, sharing one registry.
pub struct RegistryEngine<R: DatasetRegistry> {
    datasets: DatasetManager<R>,
    lineage: LineageEngine<R>,
    search: SearchEngine<R>,
}

impl RegistryEngine<PgRegistry> {
    pub async fn connect(config: &ServiceConfig) -> Result<Self> {
        info!("Initializing Lineage Registry engine");

        let registry = Arc::new(PgRegistry::new(&config.database).await?);

        info!("Lineage Registry engine initialized successfully");
        Ok(Self::new(registry, config))
    }
}

impl<R: DatasetRegistry> RegistryEngine<R> {
    pub fn new(registry: Arc<R>, config: &ServiceConfig) -> Self {
        Self::with_limits(registry, config.search, config.pagination)
    }

    pub fn with_limits(
        registry: Arc<R>,
        search: SearchConfig,
        pages: PageConfig,
    ) -> Self {
        Self {
            datasets: DatasetManager::new(registry.clone(), pages),
            lineage: LineageEngine::new(registry.clone()),
            search: SearchEngine::new(registry, search),
        }
    }

    pub async fn create_dataset(&self, request: NewDataset) -> Result<Dataset> {
        self.datasets.create_dataset(request).await
    }

    pub async fn get_dataset(&self, fqn: &str) -> Result<Dataset> {
        self.datasets.get_dataset(fqn).await
    }

    pub async fn list_datasets(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Dataset>> {
        self.datasets.list_datasets(offset, limit).await
    }

    pub async fn update_dataset(&self, fqn: &str, update: DatasetUpdate) -> Result<Dataset> {
        self.datasets.update_dataset(fqn, update).await
    }

    pub async fn delete_dataset(&self, fqn: &str) -> Result<()> {
        self.datasets.delete_dataset(fqn).await
    }

    pub async fn create_edge(&self, upstream: &str, downstream: &str) -> Result<LineageEdge> {
        self.lineage.create_edge(upstream, downstream).await
    }

    pub async fn delete_edge(&self, upstream: &str, downstream: &str) -> Result<()> {
        self.lineage.delete_edge(upstream, downstream).await
    }

    pub async fn get_lineage(&self, fqn: &str) -> Result<DatasetLineage> {
        self.lineage.get_lineage(fqn).await
    }

    pub async fn list_edges(&self) -> Result<Vec<LineageEdge>> {
        self.lineage.list_edges().await
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchResponse> {
        self.search.search(query, limit).await
    }

    pub async fn audit(&self) -> Result<IntegrityReport> {
        self.lineage.audit().await
    }
}
