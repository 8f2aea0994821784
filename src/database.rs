use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AnsiTransactionManager, AsyncConnection, AsyncPgConnection, RunQueryDsl, TransactionManager,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::catalog::{
    Column, Dataset, DatasetChanges, DatasetDraft, DatasetId, DatasetLineage, DatasetRef,
    DatasetSummary, EdgeIds, Fqn, LineageEdge,
};
use crate::config::DatabaseConfig;
use crate::error::{RegistryError, Result};
use crate::models::*;
use crate::registry::{AttributeMatch, DatasetRegistry, EdgeTransaction};
use crate::schema::{dataset_columns, datasets, lineage};
use crate::search::MatchType;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SHARE ROW EXCLUSIVE conflicts with itself and with row writes, so edge
/// writers queue behind each other while plain readers are not blocked.
const LOCK_LINEAGE: &str = "LOCK TABLE lineage IN SHARE ROW EXCLUSIVE MODE";

#[derive(Clone)]
pub struct PgRegistry {
    pool: Pool<AsyncPgConnection>,
}

impl PgRegistry {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to {}", config.redacted_url());
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| RegistryError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        run_migrations(config.database_url.clone()).await?;

        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}

/// diesel_migrations has no async harness, so migrations run over a
/// synchronous connection on the blocking pool.
pub async fn run_migrations(database_url: String) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut connection =
            PgConnection::establish(&database_url).map_err(|e| RegistryError::ConfigError {
                message: format!("Failed to establish connection for migrations: {}", e),
            })?;

        let applied = connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| RegistryError::ConfigError {
                message: format!("Failed to run migrations: {}", e),
            })?;
        info!("Applied {} pending migration(s)", applied.len());
        Ok(())
    })
    .await
    .map_err(|e| RegistryError::ConfigError {
        message: format!("Migration task failed: {}", e),
    })?
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn sort_summaries(summaries: &mut [DatasetSummary]) {
    summaries.sort_by_cached_key(|s| s.fqn.to_string());
}

async fn find_row(conn: &mut AsyncPgConnection, fqn: &Fqn) -> Result<Option<DatasetRow>> {
    Ok(datasets::table
        .filter(datasets::fqn.eq(fqn.to_string()))
        .select(DatasetRow::as_select())
        .first::<DatasetRow>(conn)
        .await
        .optional()?)
}

async fn load_columns(
    conn: &mut AsyncPgConnection,
    ids: &[DatasetId],
) -> Result<HashMap<DatasetId, Vec<Column>>> {
    let rows = dataset_columns::table
        .filter(dataset_columns::dataset_id.eq_any(ids.to_vec()))
        .order(dataset_columns::id.asc())
        .select(ColumnRow::as_select())
        .load::<ColumnRow>(conn)
        .await?;

    let mut columns: HashMap<DatasetId, Vec<Column>> = HashMap::new();
    for row in rows {
        columns.entry(row.dataset_id).or_default().push(row.into());
    }
    Ok(columns)
}

async fn load_dataset(conn: &mut AsyncPgConnection, row: DatasetRow) -> Result<Dataset> {
    let mut columns = load_columns(conn, &[row.id]).await?;
    let own = columns.remove(&row.id).unwrap_or_default();
    row.into_dataset(own)
}

async fn summaries_by_id(
    conn: &mut AsyncPgConnection,
    ids: Vec<DatasetId>,
) -> Result<HashMap<DatasetId, DatasetSummary>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = datasets::table
        .filter(datasets::id.eq_any(ids))
        .select(DatasetRow::as_select())
        .load::<DatasetRow>(conn)
        .await?;
    rows.iter().map(|row| Ok((row.id, row.summary()?))).collect()
}

fn summary_of(
    summaries: &HashMap<DatasetId, DatasetSummary>,
    id: DatasetId,
) -> Result<DatasetSummary> {
    summaries
        .get(&id)
        .cloned()
        .ok_or_else(|| RegistryError::Database {
            message: format!("Lineage edge references missing dataset id {}", id),
        })
}

/// Attaches columns and one-hop neighbours to a batch of datasets with a fixed
/// number of queries, whatever the batch size. Output order follows `rows`.
async fn with_relationships(
    conn: &mut AsyncPgConnection,
    rows: Vec<DatasetRow>,
) -> Result<Vec<DatasetLineage>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<DatasetId> = rows.iter().map(|r| r.id).collect();

    let mut columns = load_columns(conn, &ids).await?;
    let edges = lineage::table
        .filter(
            lineage::upstream_id
                .eq_any(ids.clone())
                .or(lineage::downstream_id.eq_any(ids.clone())),
        )
        .select(EdgeRow::as_select())
        .load::<EdgeRow>(conn)
        .await?;
    let summaries = summaries_by_id(conn, endpoint_ids(&edges)).await?;

    let mut parents: HashMap<DatasetId, Vec<DatasetSummary>> = HashMap::new();
    let mut children: HashMap<DatasetId, Vec<DatasetSummary>> = HashMap::new();
    for edge in &edges {
        parents
            .entry(edge.downstream_id)
            .or_default()
            .push(summary_of(&summaries, edge.upstream_id)?);
        children
            .entry(edge.upstream_id)
            .or_default()
            .push(summary_of(&summaries, edge.downstream_id)?);
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            let mut upstream_datasets = parents.remove(&id).unwrap_or_default();
            let mut downstream_datasets = children.remove(&id).unwrap_or_default();
            sort_summaries(&mut upstream_datasets);
            sort_summaries(&mut downstream_datasets);
            Ok(DatasetLineage {
                dataset: row.into_dataset(columns.remove(&id).unwrap_or_default())?,
                upstream_datasets,
                downstream_datasets,
            })
        })
        .collect()
}

fn unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

async fn insert_columns(
    conn: &mut AsyncPgConnection,
    dataset_id: DatasetId,
    columns: &[Column],
) -> Result<()> {
    if columns.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewColumnRow<'_>> = columns
        .iter()
        .map(|c| NewColumnRow {
            dataset_id,
            name: &c.name,
            data_type: &c.data_type,
            description: c.description.as_deref(),
        })
        .collect();

    diesel::insert_into(dataset_columns::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(())
}

impl DatasetRegistry for PgRegistry {
    type EdgeTx = PgEdgeTransaction;

    async fn resolve_by_fqn(&self, fqn: &Fqn) -> Result<Option<DatasetRef>> {
        let mut conn = self.connection().await?;
        find_row(&mut conn, fqn)
            .await?
            .map(|row| row.dataset_ref())
            .transpose()
    }

    async fn load_all_edges(&self) -> Result<Vec<EdgeIds>> {
        let mut conn = self.connection().await?;
        let edges = lineage::table
            .select(EdgeRow::as_select())
            .load::<EdgeRow>(&mut conn)
            .await?;
        Ok(edges.iter().map(EdgeIds::from).collect())
    }

    async fn list_edges(&self) -> Result<Vec<LineageEdge>> {
        let mut conn = self.connection().await?;
        let edges = lineage::table
            .select(EdgeRow::as_select())
            .load::<EdgeRow>(&mut conn)
            .await?;
        let summaries = summaries_by_id(&mut conn, endpoint_ids(&edges)).await?;

        let mut result = edges
            .iter()
            .map(|edge| {
                Ok(LineageEdge {
                    upstream: summary_of(&summaries, edge.upstream_id)?,
                    downstream: summary_of(&summaries, edge.downstream_id)?,
                    created_at: edge.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        result.sort_by_cached_key(|e| (e.upstream.fqn.to_string(), e.downstream.fqn.to_string()));
        Ok(result)
    }

    async fn dataset_with_relationships(&self, fqn: &Fqn) -> Result<Option<DatasetLineage>> {
        let mut conn = self.connection().await?;
        let Some(row) = find_row(&mut conn, fqn).await? else {
            return Ok(None);
        };
        Ok(with_relationships(&mut conn, vec![row]).await?.pop())
    }

    async fn datasets_matching(
        &self,
        attribute: MatchType,
        term: &str,
    ) -> Result<Vec<AttributeMatch>> {
        let pattern = format!("%{}%", escape_like(term));
        let mut conn = self.connection().await?;

        let hits: Vec<(DatasetRow, String)> = match attribute {
            MatchType::ColumnName => {
                let columns = dataset_columns::table
                    .filter(dataset_columns::name.ilike(pattern.as_str()))
                    .order(dataset_columns::id.asc())
                    .select(ColumnRow::as_select())
                    .load::<ColumnRow>(&mut conn)
                    .await?;

                let mut first_match: HashMap<DatasetId, String> = HashMap::new();
                for column in columns {
                    first_match.entry(column.dataset_id).or_insert(column.name);
                }
                if first_match.is_empty() {
                    return Ok(Vec::new());
                }

                let rows = datasets::table
                    .filter(datasets::id.eq_any(first_match.keys().copied().collect::<Vec<_>>()))
                    .select(DatasetRow::as_select())
                    .load::<DatasetRow>(&mut conn)
                    .await?;
                rows.into_iter()
                    .filter_map(|row| first_match.remove(&row.id).map(|name| (row, name)))
                    .collect()
            }
            component => {
                let query = datasets::table
                    .select(DatasetRow::as_select())
                    .into_boxed::<Pg>();
                let query = match component {
                    MatchType::TableName => query.filter(datasets::table_name.ilike(pattern.as_str())),
                    MatchType::SchemaName => {
                        query.filter(datasets::schema_name.ilike(pattern.as_str()))
                    }
                    _ => query.filter(datasets::database_name.ilike(pattern.as_str())),
                };
                let rows = query.load::<DatasetRow>(&mut conn).await?;
                rows.into_iter()
                    .map(|row| {
                        let value = match component {
                            MatchType::TableName => row.table_name.clone(),
                            MatchType::SchemaName => row.schema_name.clone(),
                            _ => row.database_name.clone(),
                        };
                        (row, value)
                    })
                    .collect()
            }
        };

        let (rows, values): (Vec<DatasetRow>, Vec<String>) = hits.into_iter().unzip();
        let loaded = with_relationships(&mut conn, rows).await?;
        Ok(loaded
            .into_iter()
            .zip(values)
            .map(|(dataset, matched_on)| AttributeMatch {
                dataset,
                matched_on,
            })
            .collect())
    }

    async fn begin_edge_write(&self) -> Result<PgEdgeTransaction> {
        let mut conn = self.connection().await?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;

        if let Err(e) = diesel::sql_query(LOCK_LINEAGE).execute(&mut *conn).await {
            if let Err(rollback_err) = AnsiTransactionManager::rollback_transaction(&mut *conn).await {
                warn!("Rollback after failed lineage lock errored: {}", rollback_err);
            }
            return Err(e.into());
        }

        Ok(PgEdgeTransaction { conn })
    }

    async fn insert_dataset(&self, draft: DatasetDraft) -> Result<Dataset> {
        let mut conn = self.connection().await?;
        let draft = &draft;

        conn.transaction::<_, RegistryError, _>(|conn| {
            Box::pin(async move {
                let now = Utc::now();
                let fqn = draft.fqn.to_string();
                let new_row = NewDatasetRow {
                    fqn: &fqn,
                    connection_name: draft.fqn.connection_name(),
                    database_name: draft.fqn.database_name(),
                    schema_name: draft.fqn.schema_name(),
                    table_name: draft.fqn.table_name(),
                    source_system: draft.source_system.as_str(),
                    description: draft.description.as_deref(),
                    created_at: now,
                    updated_at: now,
                };

                let row = diesel::insert_into(datasets::table)
                    .values(&new_row)
                    .returning(DatasetRow::as_returning())
                    .get_result::<DatasetRow>(conn)
                    .await
                    .map_err(|e| {
                        if unique_violation(&e) {
                            RegistryError::DuplicateDataset { fqn: fqn.clone() }
                        } else {
                            e.into()
                        }
                    })?;

                insert_columns(conn, row.id, &draft.columns).await?;
                row.into_dataset(draft.columns.clone())
            })
        })
        .await
    }

    async fn get_dataset(&self, fqn: &Fqn) -> Result<Option<Dataset>> {
        let mut conn = self.connection().await?;
        match find_row(&mut conn, fqn).await? {
            Some(row) => load_dataset(&mut conn, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_datasets(&self, offset: usize, limit: usize) -> Result<Vec<Dataset>> {
        let mut conn = self.connection().await?;
        let rows = datasets::table
            .order(datasets::fqn.asc())
            .offset(offset as i64)
            .limit(limit as i64)
            .select(DatasetRow::as_select())
            .load::<DatasetRow>(&mut conn)
            .await?;

        let ids: Vec<DatasetId> = rows.iter().map(|r| r.id).collect();
        let mut columns = load_columns(&mut conn, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let own = columns.remove(&row.id).unwrap_or_default();
                row.into_dataset(own)
            })
            .collect()
    }

    async fn update_dataset(&self, fqn: &Fqn, changes: DatasetChanges) -> Result<Option<Dataset>> {
        let mut conn = self.connection().await?;
        let changes = &changes;

        conn.transaction::<_, RegistryError, _>(|conn| {
            Box::pin(async move {
                let Some(row) = find_row(conn, fqn).await? else {
                    return Ok(None);
                };

                let changeset = DatasetChangeset {
                    source_system: changes.source_system.map(|s| s.as_str()),
                    description: changes.description.as_deref(),
                    updated_at: Utc::now(),
                };
                let row = diesel::update(datasets::table.find(row.id))
                    .set(&changeset)
                    .returning(DatasetRow::as_returning())
                    .get_result::<DatasetRow>(conn)
                    .await?;

                if let Some(columns) = &changes.columns {
                    diesel::delete(dataset_columns::table.filter(dataset_columns::dataset_id.eq(row.id)))
                        .execute(conn)
                        .await?;
                    insert_columns(conn, row.id, columns).await?;
                }

                load_dataset(conn, row).await.map(Some)
            })
        })
        .await
    }

    async fn delete_dataset(&self, fqn: &Fqn) -> Result<bool> {
        let mut conn = self.connection().await?;
        // Columns and lineage rows go with it through ON DELETE CASCADE.
        let deleted = diesel::delete(datasets::table.filter(datasets::fqn.eq(fqn.to_string())))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn count_datasets(&self) -> Result<usize> {
        let mut conn = self.connection().await?;
        let count = datasets::table
            .count()
            .get_result::<i64>(&mut conn)
            .await?;
        Ok(count as usize)
    }
}

/// An open transaction holding the lineage table lock.
pub struct PgEdgeTransaction {
    conn: Object<AsyncPgConnection>,
}

impl EdgeTransaction for PgEdgeTransaction {
    async fn resolve_by_fqn(&mut self, fqn: &Fqn) -> Result<Option<DatasetRef>> {
        find_row(&mut self.conn, fqn)
            .await?
            .map(|row| row.dataset_ref())
            .transpose()
    }

    async fn edge_exists(&mut self, upstream: DatasetId, downstream: DatasetId) -> Result<bool> {
        let exists = diesel::select(diesel::dsl::exists(
            lineage::table
                .filter(lineage::upstream_id.eq(upstream))
                .filter(lineage::downstream_id.eq(downstream)),
        ))
        .get_result::<bool>(&mut *self.conn)
        .await?;
        Ok(exists)
    }

    async fn load_all_edges(&mut self) -> Result<Vec<EdgeIds>> {
        let edges = lineage::table
            .select(EdgeRow::as_select())
            .load::<EdgeRow>(&mut *self.conn)
            .await?;
        Ok(edges.iter().map(EdgeIds::from).collect())
    }

    async fn insert_edge(
        &mut self,
        upstream: &DatasetRef,
        downstream: &DatasetRef,
    ) -> Result<LineageEdge> {
        let row = diesel::insert_into(lineage::table)
            .values(&NewEdgeRow {
                upstream_id: upstream.id,
                downstream_id: downstream.id,
                created_at: Utc::now(),
            })
            .returning(EdgeRow::as_returning())
            .get_result::<EdgeRow>(&mut *self.conn)
            .await
            .map_err(|e| {
                if unique_violation(&e) {
                    RegistryError::DuplicateEdge {
                        upstream: upstream.summary.fqn.to_string(),
                        downstream: downstream.summary.fqn.to_string(),
                    }
                } else {
                    e.into()
                }
            })?;

        Ok(LineageEdge {
            upstream: upstream.summary.clone(),
            downstream: downstream.summary.clone(),
            created_at: row.created_at,
        })
    }

    async fn remove_edge(&mut self, upstream: DatasetId, downstream: DatasetId) -> Result<bool> {
        let deleted = diesel::delete(
            lineage::table
                .filter(lineage::upstream_id.eq(upstream))
                .filter(lineage::downstream_id.eq(downstream)),
        )
        .execute(&mut *self.conn)
        .await?;
        Ok(deleted > 0)
    }

    async fn commit(mut self) -> Result<()> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn).await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn).await?;
        Ok(())
    }
}
