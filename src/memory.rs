use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::catalog::{
    Dataset, DatasetChanges, DatasetDraft, DatasetId, DatasetLineage, DatasetRef, DatasetSummary,
    EdgeIds, Fqn, LineageEdge,
};
use crate::error::{RegistryError, Result};
use crate::registry::{AttributeMatch, DatasetRegistry, EdgeTransaction};
use crate::search::MatchType;

/// Dataset id -> (direct upstream ids, direct downstream ids).
type NeighbourIndex = HashMap<DatasetId, (Vec<DatasetId>, Vec<DatasetId>)>;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: DatasetId,
    datasets: HashMap<DatasetId, Dataset>,
    by_fqn: HashMap<Fqn, DatasetId>,
    edges: BTreeMap<(DatasetId, DatasetId), DateTime<Utc>>,
}

impl MemoryState {
    fn resolve(&self, fqn: &Fqn) -> Option<DatasetRef> {
        let id = *self.by_fqn.get(fqn)?;
        let dataset = self.datasets.get(&id)?;
        Some(DatasetRef {
            id,
            summary: dataset.summary(),
        })
    }

    fn summary(&self, id: DatasetId) -> Result<DatasetSummary> {
        self.datasets
            .get(&id)
            .map(Dataset::summary)
            .ok_or_else(|| RegistryError::Database {
                message: format!("Lineage edge references missing dataset id {}", id),
            })
    }

    fn edge(&self, key: (DatasetId, DatasetId), created_at: DateTime<Utc>) -> Result<LineageEdge> {
        Ok(LineageEdge {
            upstream: self.summary(key.0)?,
            downstream: self.summary(key.1)?,
            created_at,
        })
    }

    /// Built in one pass over the edge map, then shared by every hit of one attribute lookup.
    fn neighbour_index(&self) -> NeighbourIndex {
        let mut index: NeighbourIndex = HashMap::new();
        for &(upstream, downstream) in self.edges.keys() {
            index.entry(downstream).or_default().0.push(upstream);
            index.entry(upstream).or_default().1.push(downstream);
        }
        index
    }

    fn with_relationships(
        &self,
        dataset: &Dataset,
        index: &NeighbourIndex,
    ) -> Result<DatasetLineage> {
        let (mut upstream_datasets, mut downstream_datasets) = match index.get(&dataset.id) {
            Some((parents, children)) => (self.summaries(parents)?, self.summaries(children)?),
            None => (Vec::new(), Vec::new()),
        };
        sort_summaries(&mut upstream_datasets);
        sort_summaries(&mut downstream_datasets);

        Ok(DatasetLineage {
            dataset: dataset.clone(),
            upstream_datasets,
            downstream_datasets,
        })
    }

    fn summaries(&self, ids: &[DatasetId]) -> Result<Vec<DatasetSummary>> {
        ids.iter().map(|&id| self.summary(id)).collect()
    }
}

fn sort_summaries(summaries: &mut [DatasetSummary]) {
    summaries.sort_by_cached_key(|s| s.fqn.to_string());
}

/// In-process registry. Readers share the lock; an edge transaction holds the
/// write half until it commits or rolls back, which makes edge writers
/// strictly sequential.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatasetRegistry for MemoryRegistry {
    type EdgeTx = MemoryEdgeTransaction;

    async fn resolve_by_fqn(&self, fqn: &Fqn) -> Result<Option<DatasetRef>> {
        Ok(self.state.read().await.resolve(fqn))
    }

    async fn load_all_edges(&self) -> Result<Vec<EdgeIds>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .keys()
            .map(|&(upstream_id, downstream_id)| EdgeIds {
                upstream_id,
                downstream_id,
            })
            .collect())
    }

    async fn list_edges(&self) -> Result<Vec<LineageEdge>> {
        let state = self.state.read().await;
        let mut edges = state
            .edges
            .iter()
            .map(|(&key, &created_at)| state.edge(key, created_at))
            .collect::<Result<Vec<_>>>()?;
        edges.sort_by_cached_key(|e| (e.upstream.fqn.to_string(), e.downstream.fqn.to_string()));
        Ok(edges)
    }

    async fn dataset_with_relationships(&self, fqn: &Fqn) -> Result<Option<DatasetLineage>> {
        let state = self.state.read().await;
        let Some(id) = state.by_fqn.get(fqn) else {
            return Ok(None);
        };
        match state.datasets.get(id) {
            Some(dataset) => state
                .with_relationships(dataset, &state.neighbour_index())
                .map(Some),
            None => Ok(None),
        }
    }

    async fn datasets_matching(
        &self,
        attribute: MatchType,
        term: &str,
    ) -> Result<Vec<AttributeMatch>> {
        let needle = term.to_lowercase();
        let state = self.state.read().await;
        let index = state.neighbour_index();

        let mut matches = Vec::new();
        for dataset in state.datasets.values() {
            let matched_on = match attribute {
                MatchType::TableName => Some(dataset.fqn.table_name())
                    .filter(|v| v.contains(&needle))
                    .map(str::to_string),
                MatchType::ColumnName => dataset
                    .columns
                    .iter()
                    .find(|c| c.name.to_lowercase().contains(&needle))
                    .map(|c| c.name.clone()),
                MatchType::SchemaName => Some(dataset.fqn.schema_name())
                    .filter(|v| v.contains(&needle))
                    .map(str::to_string),
                MatchType::DatabaseName => Some(dataset.fqn.database_name())
                    .filter(|v| v.contains(&needle))
                    .map(str::to_string),
            };

            if let Some(matched_on) = matched_on {
                matches.push(AttributeMatch {
                    dataset: state.with_relationships(dataset, &index)?,
                    matched_on,
                });
            }
        }
        Ok(matches)
    }

    async fn begin_edge_write(&self) -> Result<MemoryEdgeTransaction> {
        Ok(MemoryEdgeTransaction {
            state: self.state.clone().write_owned().await,
            inserted: Vec::new(),
            removed: Vec::new(),
        })
    }

    async fn insert_dataset(&self, draft: DatasetDraft) -> Result<Dataset> {
        let mut state = self.state.write().await;
        if state.by_fqn.contains_key(&draft.fqn) {
            return Err(RegistryError::DuplicateDataset {
                fqn: draft.fqn.to_string(),
            });
        }

        state.next_id += 1;
        let now = Utc::now();
        let dataset = Dataset {
            id: state.next_id,
            fqn: draft.fqn,
            source_system: draft.source_system,
            description: draft.description,
            columns: draft.columns,
            created_at: now,
            updated_at: now,
        };
        state.by_fqn.insert(dataset.fqn.clone(), dataset.id);
        state.datasets.insert(dataset.id, dataset.clone());
        Ok(dataset)
    }

    async fn get_dataset(&self, fqn: &Fqn) -> Result<Option<Dataset>> {
        let state = self.state.read().await;
        Ok(state
            .by_fqn
            .get(fqn)
            .and_then(|id| state.datasets.get(id))
            .cloned())
    }

    async fn list_datasets(&self, offset: usize, limit: usize) -> Result<Vec<Dataset>> {
        let state = self.state.read().await;
        let mut datasets: Vec<Dataset> = state.datasets.values().cloned().collect();
        datasets.sort_by_cached_key(|d| d.fqn.to_string());
        Ok(datasets.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_dataset(&self, fqn: &Fqn, changes: DatasetChanges) -> Result<Option<Dataset>> {
        let mut state = self.state.write().await;
        let Some(id) = state.by_fqn.get(fqn).copied() else {
            return Ok(None);
        };
        let Some(dataset) = state.datasets.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(source_system) = changes.source_system {
            dataset.source_system = source_system;
        }
        if let Some(description) = changes.description {
            dataset.description = Some(description);
        }
        if let Some(columns) = changes.columns {
            dataset.columns = columns;
        }
        dataset.updated_at = Utc::now();
        Ok(Some(dataset.clone()))
    }

    async fn delete_dataset(&self, fqn: &Fqn) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(id) = state.by_fqn.remove(fqn) else {
            return Ok(false);
        };
        state.datasets.remove(&id);
        state
            .edges
            .retain(|&(upstream, downstream), _| upstream != id && downstream != id);
        Ok(true)
    }

    async fn count_datasets(&self) -> Result<usize> {
        Ok(self.state.read().await.datasets.len())
    }
}

/// Exclusive edge-write session over a [`MemoryRegistry`]. Changes are staged
/// and only applied to the shared state on commit.
pub struct MemoryEdgeTransaction {
    state: OwnedRwLockWriteGuard<MemoryState>,
    inserted: Vec<((DatasetId, DatasetId), DateTime<Utc>)>,
    removed: Vec<(DatasetId, DatasetId)>,
}

impl MemoryEdgeTransaction {
    fn staged_contains(&self, key: (DatasetId, DatasetId)) -> bool {
        if self.inserted.iter().any(|(k, _)| *k == key) {
            return true;
        }
        self.state.edges.contains_key(&key) && !self.removed.contains(&key)
    }
}

impl EdgeTransaction for MemoryEdgeTransaction {
    async fn resolve_by_fqn(&mut self, fqn: &Fqn) -> Result<Option<DatasetRef>> {
        Ok(self.state.resolve(fqn))
    }

    async fn edge_exists(&mut self, upstream: DatasetId, downstream: DatasetId) -> Result<bool> {
        Ok(self.staged_contains((upstream, downstream)))
    }

    async fn load_all_edges(&mut self) -> Result<Vec<EdgeIds>> {
        Ok(self
            .state
            .edges
            .keys()
            .filter(|key| !self.removed.contains(key))
            .chain(self.inserted.iter().map(|(key, _)| key))
            .map(|&(upstream_id, downstream_id)| EdgeIds {
                upstream_id,
                downstream_id,
            })
            .collect())
    }

    async fn insert_edge(
        &mut self,
        upstream: &DatasetRef,
        downstream: &DatasetRef,
    ) -> Result<LineageEdge> {
        let key = (upstream.id, downstream.id);
        if self.staged_contains(key) {
            return Err(RegistryError::DuplicateEdge {
                upstream: upstream.summary.fqn.to_string(),
                downstream: downstream.summary.fqn.to_string(),
            });
        }

        let created_at = Utc::now();
        self.removed.retain(|k| *k != key);
        self.inserted.push((key, created_at));
        Ok(LineageEdge {
            upstream: upstream.summary.clone(),
            downstream: downstream.summary.clone(),
            created_at,
        })
    }

    async fn remove_edge(&mut self, upstream: DatasetId, downstream: DatasetId) -> Result<bool> {
        let key = (upstream, downstream);
        if !self.staged_contains(key) {
            return Ok(false);
        }
        self.inserted.retain(|(k, _)| *k != key);
        if self.state.edges.contains_key(&key) {
            self.removed.push(key);
        }
        Ok(true)
    }

    async fn commit(mut self) -> Result<()> {
        for key in std::mem::take(&mut self.removed) {
            self.state.edges.remove(&key);
        }
        for (key, created_at) in std::mem::take(&mut self.inserted) {
            self.state.edges.insert(key, created_at);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
