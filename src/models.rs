use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::catalog::{Column, Dataset, DatasetId, DatasetRef, DatasetSummary, EdgeIds, Fqn, SourceSystem};
use crate::error::RegistryError;
use crate::schema::{dataset_columns, datasets, lineage};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DatasetRow {
    pub id: i64,
    pub fqn: String,
    pub connection_name: String,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub source_system: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDatasetRow<'a> {
    pub fqn: &'a str,
    pub connection_name: &'a str,
    pub database_name: &'a str,
    pub schema_name: &'a str,
    pub table_name: &'a str,
    pub source_system: &'a str,
    pub description: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = datasets)]
pub struct DatasetChangeset<'a> {
    pub source_system: Option<&'a str>,
    pub description: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = dataset_columns)]
#[diesel(belongs_to(DatasetRow, foreign_key = dataset_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ColumnRow {
    pub id: i64,
    pub dataset_id: i64,
    pub name: String,
    pub data_type: String,
    pub description: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = dataset_columns)]
pub struct NewColumnRow<'a> {
    pub dataset_id: i64,
    pub name: &'a str,
    pub data_type: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = lineage)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EdgeRow {
    pub id: i64,
    pub upstream_id: i64,
    pub downstream_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = lineage)]
pub struct NewEdgeRow {
    pub upstream_id: i64,
    pub downstream_id: i64,
    pub created_at: DateTime<Utc>,
}

impl DatasetRow {
    pub fn fqn(&self) -> Result<Fqn, RegistryError> {
        Fqn::new(
            &self.connection_name,
            &self.database_name,
            &self.schema_name,
            &self.table_name,
        )
    }

    pub fn summary(&self) -> Result<DatasetSummary, RegistryError> {
        Ok(DatasetSummary {
            fqn: self.fqn()?,
            source_system: self.source_system()?,
            description: self.description.clone(),
        })
    }

    pub fn dataset_ref(&self) -> Result<DatasetRef, RegistryError> {
        Ok(DatasetRef {
            id: self.id,
            summary: self.summary()?,
        })
    }

    pub fn into_dataset(self, columns: Vec<Column>) -> Result<Dataset, RegistryError> {
        Ok(Dataset {
            id: self.id,
            fqn: self.fqn()?,
            source_system: self.source_system()?,
            description: self.description,
            columns,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn source_system(&self) -> Result<SourceSystem, RegistryError> {
        self.source_system.parse()
    }
}

impl From<ColumnRow> for Column {
    fn from(row: ColumnRow) -> Self {
        Column {
            name: row.name,
            data_type: row.data_type,
            description: row.description,
        }
    }
}

impl From<&EdgeRow> for EdgeIds {
    fn from(row: &EdgeRow) -> Self {
        EdgeIds {
            upstream_id: row.upstream_id,
            downstream_id: row.downstream_id,
        }
    }
}

pub fn endpoint_ids(edges: &[EdgeRow]) -> Vec<DatasetId> {
    let mut ids: Vec<DatasetId> = edges
        .iter()
        .flat_map(|e| [e.upstream_id, e.downstream_id])
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
