//! Storage seam for datasets, columns and lineage edges.
//!
//! The lineage and search engines only talk to a [`DatasetRegistry`]. Edge
//! writes go through an [`EdgeTransaction`], which an implementation must
//! serialize against every other edge writer: the cycle check reads the whole
//! edge set, so two writers validating against the same snapshot could
//! otherwise commit a cycle between them.

use std::future::Future;

use crate::catalog::{
    Dataset, DatasetChanges, DatasetDraft, DatasetId, DatasetLineage, DatasetRef, EdgeIds, Fqn,
    LineageEdge,
};
use crate::error::Result;
use crate::search::MatchType;

/// One attribute match: a relationship-loaded dataset and the value that matched.
#[derive(Debug, Clone)]
pub struct AttributeMatch {
    pub dataset: DatasetLineage,
    pub matched_on: String,
}

pub trait DatasetRegistry: Send + Sync + 'static {
    type EdgeTx: EdgeTransaction;

    fn resolve_by_fqn(&self, fqn: &Fqn) -> impl Future<Output = Result<Option<DatasetRef>>> + Send;

    fn load_all_edges(&self) -> impl Future<Output = Result<Vec<EdgeIds>>> + Send;

    fn list_edges(&self) -> impl Future<Output = Result<Vec<LineageEdge>>> + Send;

    fn dataset_with_relationships(
        &self,
        fqn: &Fqn,
    ) -> impl Future<Output = Result<Option<DatasetLineage>>> + Send;

    /// Case-insensitive substring match on one attribute. `term` is the raw
    /// search term; implementations must treat it literally.
    fn datasets_matching(
        &self,
        attribute: MatchType,
        term: &str,
    ) -> impl Future<Output = Result<Vec<AttributeMatch>>> + Send;

    fn begin_edge_write(&self) -> impl Future<Output = Result<Self::EdgeTx>> + Send;

    fn insert_dataset(&self, draft: DatasetDraft) -> impl Future<Output = Result<Dataset>> + Send;

    fn get_dataset(&self, fqn: &Fqn) -> impl Future<Output = Result<Option<Dataset>>> + Send;

    fn list_datasets(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Dataset>>> + Send;

    fn update_dataset(
        &self,
        fqn: &Fqn,
        changes: DatasetChanges,
    ) -> impl Future<Output = Result<Option<Dataset>>> + Send;

    /// Removes the dataset, its columns and every edge touching it.
    fn delete_dataset(&self, fqn: &Fqn) -> impl Future<Output = Result<bool>> + Send;

    fn count_datasets(&self) -> impl Future<Output = Result<usize>> + Send;
}

/// A serialized edge-write unit. Nothing is visible to other callers until
/// [`EdgeTransaction::commit`] succeeds.
pub trait EdgeTransaction: Send {
    fn resolve_by_fqn(
        &mut self,
        fqn: &Fqn,
    ) -> impl Future<Output = Result<Option<DatasetRef>>> + Send;

    fn edge_exists(
        &mut self,
        upstream: DatasetId,
        downstream: DatasetId,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn load_all_edges(&mut self) -> impl Future<Output = Result<Vec<EdgeIds>>> + Send;

    fn insert_edge(
        &mut self,
        upstream: &DatasetRef,
        downstream: &DatasetRef,
    ) -> impl Future<Output = Result<LineageEdge>> + Send;

    fn remove_edge(
        &mut self,
        upstream: DatasetId,
        downstream: DatasetId,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
