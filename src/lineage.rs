use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::{DatasetLineage, DatasetRef, Fqn, LineageEdge};
use crate::error::{RegistryError, Result};
use crate::graph::{build_adjacency, is_acyclic, would_create_cycle};
use crate::registry::{DatasetRegistry, EdgeTransaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub datasets: usize,
    pub edges: usize,
    pub acyclic: bool,
}

pub struct LineageEngine<R: DatasetRegistry> {
    registry: Arc<R>,
}

impl<R: DatasetRegistry> LineageEngine<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Adds `upstream -> downstream` if both datasets exist, the pair is new,
    /// and the edge keeps the lineage graph acyclic.
    pub async fn create_edge(&self, upstream: &str, downstream: &str) -> Result<LineageEdge> {
        let (upstream, downstream) = parse_pair(upstream, downstream)?;
        if upstream == downstream {
            return Err(RegistryError::SelfLoop {
                fqn: upstream.to_string(),
            });
        }

        let mut tx = self.registry.begin_edge_write().await?;
        let outcome = insert_checked(&mut tx, &upstream, &downstream).await;
        let edge = finish(tx, outcome).await.inspect_err(|e| {
            warn!("Rejected lineage {} -> {}: {}", upstream, downstream, e);
        })?;

        info!("Created lineage: {} -> {}", upstream, downstream);
        Ok(edge)
    }

    pub async fn delete_edge(&self, upstream: &str, downstream: &str) -> Result<()> {
        let (upstream, downstream) = parse_pair(upstream, downstream)?;

        let mut tx = self.registry.begin_edge_write().await?;
        let outcome = remove_existing(&mut tx, &upstream, &downstream).await;
        finish(tx, outcome).await?;

        info!("Removed lineage: {} -> {}", upstream, downstream);
        Ok(())
    }

    /// Direct (one hop) upstream and downstream neighbours of a dataset.
    pub async fn get_lineage(&self, fqn: &str) -> Result<DatasetLineage> {
        let fqn = Fqn::parse(fqn)?;
        self.registry
            .dataset_with_relationships(&fqn)
            .await?
            .ok_or_else(|| RegistryError::DatasetNotFound {
                fqns: vec![fqn.to_string()],
            })
    }

    pub async fn list_edges(&self) -> Result<Vec<LineageEdge>> {
        self.registry.list_edges().await
    }

    /// Read-only check of the stored graph. Never repairs anything.
    pub async fn audit(&self) -> Result<IntegrityReport> {
        let datasets = self.registry.count_datasets().await?;
        let edges = self.registry.load_all_edges().await?;
        let adjacency = build_adjacency(edges.iter().map(|e| (e.upstream_id, e.downstream_id)));
        let acyclic = is_acyclic(&adjacency);
        if !acyclic {
            error!("Lineage graph contains a cycle across {} edge(s)", edges.len());
        }

        Ok(IntegrityReport {
            datasets,
            edges: edges.len(),
            acyclic,
        })
    }
}

fn parse_pair(upstream: &str, downstream: &str) -> Result<(Fqn, Fqn)> {
    Ok((Fqn::parse(upstream)?, Fqn::parse(downstream)?))
}

async fn resolve_pair<T: EdgeTransaction>(
    tx: &mut T,
    upstream: &Fqn,
    downstream: &Fqn,
) -> Result<(DatasetRef, DatasetRef)> {
    let upstream_ref = tx.resolve_by_fqn(upstream).await?;
    let downstream_ref = tx.resolve_by_fqn(downstream).await?;

    match (upstream_ref, downstream_ref) {
        (Some(u), Some(d)) => Ok((u, d)),
        (u, d) => {
            let mut fqns = Vec::new();
            if u.is_none() {
                fqns.push(upstream.to_string());
            }
            if d.is_none() {
                fqns.push(downstream.to_string());
            }
            Err(RegistryError::DatasetNotFound { fqns })
        }
    }
}

async fn insert_checked<T: EdgeTransaction>(
    tx: &mut T,
    upstream: &Fqn,
    downstream: &Fqn,
) -> Result<LineageEdge> {
    let (u, d) = resolve_pair(tx, upstream, downstream).await?;

    if tx.edge_exists(u.id, d.id).await? {
        return Err(RegistryError::DuplicateEdge {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
        });
    }

    let edges = tx.load_all_edges().await?;
    let adjacency = build_adjacency(edges.iter().map(|e| (e.upstream_id, e.downstream_id)));
    if would_create_cycle(&adjacency, u.id, d.id) {
        return Err(RegistryError::CycleDetected {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
        });
    }

    tx.insert_edge(&u, &d).await
}

async fn remove_existing<T: EdgeTransaction>(
    tx: &mut T,
    upstream: &Fqn,
    downstream: &Fqn,
) -> Result<()> {
    let (u, d) = resolve_pair(tx, upstream, downstream).await?;
    if tx.remove_edge(u.id, d.id).await? {
        Ok(())
    } else {
        Err(RegistryError::EdgeNotFound {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
        })
    }
}

/// Commits on success and rolls back on failure. A failed commit surfaces as
/// an error, so the caller never sees an edge that was not persisted.
async fn finish<T: EdgeTransaction, V>(tx: T, outcome: Result<V>) -> Result<V> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback of lineage write failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}
