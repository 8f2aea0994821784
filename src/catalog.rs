use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Surrogate identity used for internal joins; the FQN is the external identity.
pub type DatasetId = i64;

/// Length limits, in characters, matching the column widths of the store.
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_FQN_LEN: usize = 512;
pub const MAX_DATA_TYPE_LEN: usize = 64;
pub const MAX_DATASET_DESCRIPTION_LEN: usize = 1024;
pub const MAX_COLUMN_DESCRIPTION_LEN: usize = 512;

/// Fully-qualified dataset name: `connection.database.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fqn {
    connection_name: String,
    database_name: String,
    schema_name: String,
    table_name: String,
}

impl Fqn {
    pub fn new(
        connection_name: &str,
        database_name: &str,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Self, RegistryError> {
        let fqn = Self {
            connection_name: normalize_component("connection_name", connection_name)?,
            database_name: normalize_component("database_name", database_name)?,
            schema_name: normalize_component("schema_name", schema_name)?,
            table_name: normalize_component("table_name", table_name)?,
        };
        check_length("fqn", &fqn.to_string(), MAX_FQN_LEN)?;
        Ok(fqn)
    }

    pub fn parse(value: &str) -> Result<Self, RegistryError> {
        let parts: Vec<&str> = value.trim().split('.').collect();
        match parts.as_slice() {
            [connection, database, schema, table] => {
                Self::new(connection, database, schema, table)
            }
            _ => Err(RegistryError::invalid(format!(
                "'{}' is not a fully-qualified name (expected connection.database.schema.table)",
                value
            ))),
        }
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn normalize_component(field: &str, value: &str) -> Result<String, RegistryError> {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(RegistryError::invalid(format!("{} must not be empty", field)));
    }
    if normalized.contains('.') {
        return Err(RegistryError::invalid(format!(
            "{} must not contain '.': '{}'",
            field, value
        )));
    }
    check_length(field, &normalized, MAX_NAME_LEN)?;
    Ok(normalized)
}

/// Rejects `value` when it is longer than `max` characters.
pub(crate) fn check_length(field: &str, value: &str, max: usize) -> Result<(), RegistryError> {
    let len = value.chars().count();
    if len > max {
        return Err(RegistryError::invalid(format!(
            "{} must be at most {} characters, got {}",
            field, max, len
        )));
    }
    Ok(())
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.connection_name, self.database_name, self.schema_name, self.table_name
        )
    }
}

impl FromStr for Fqn {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fqn::parse(s)
    }
}

impl TryFrom<String> for Fqn {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fqn::parse(&value)
    }
}

impl From<Fqn> for String {
    fn from(fqn: Fqn) -> Self {
        fqn.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceSystem {
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "MSSQL")]
    MsSql,
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "Snowflake")]
    Snowflake,
    #[serde(rename = "BigQuery")]
    BigQuery,
    #[default]
    #[serde(rename = "Other")]
    Other,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::MySql => "MySQL",
            SourceSystem::MsSql => "MSSQL",
            SourceSystem::PostgreSql => "PostgreSQL",
            SourceSystem::Snowflake => "Snowflake",
            SourceSystem::BigQuery => "BigQuery",
            SourceSystem::Other => "Other",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceSystem {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MySQL" => Ok(SourceSystem::MySql),
            "MSSQL" => Ok(SourceSystem::MsSql),
            "PostgreSQL" => Ok(SourceSystem::PostgreSql),
            "Snowflake" => Ok(SourceSystem::Snowflake),
            "BigQuery" => Ok(SourceSystem::BigQuery),
            "Other" => Ok(SourceSystem::Other),
            other => Err(RegistryError::invalid(format!(
                "unknown source system '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub description: Option<String>,
}

impl Column {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub fqn: Fqn,
    pub source_system: SourceSystem,
    pub description: Option<String>,
    pub columns: Vec<Column>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            fqn: self.fqn.clone(),
            source_system: self.source_system,
            description: self.description.clone(),
        }
    }
}

/// Minimal dataset view embedded in edges, lineage views and search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub fqn: Fqn,
    pub source_system: SourceSystem,
    pub description: Option<String>,
}

/// A resolved dataset identity, enough to write an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub id: DatasetId,
    pub summary: DatasetSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeIds {
    pub upstream_id: DatasetId,
    pub downstream_id: DatasetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub upstream: DatasetSummary,
    pub downstream: DatasetSummary,
    pub created_at: DateTime<Utc>,
}

/// A dataset together with its direct lineage neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLineage {
    pub dataset: Dataset,
    pub upstream_datasets: Vec<DatasetSummary>,
    pub downstream_datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewColumn {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewColumn {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDataset {
    pub connection_name: String,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub source_system: SourceSystem,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<NewColumn>,
}

impl NewDataset {
    pub fn new(connection_name: &str, database_name: &str, schema_name: &str, table_name: &str) -> Self {
        Self {
            connection_name: connection_name.to_string(),
            database_name: database_name.to_string(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            source_system: SourceSystem::Other,
            description: None,
            columns: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<NewColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_source_system(mut self, source_system: SourceSystem) -> Self {
        self.source_system = source_system;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Mutable dataset fields. FQN components cannot change after creation;
/// `columns`, when present, replaces the whole column list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetUpdate {
    #[serde(default)]
    pub source_system: Option<SourceSystem>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<NewColumn>>,
}

/// Validated dataset record handed to a registry for insertion.
#[derive(Debug, Clone)]
pub struct DatasetDraft {
    pub fqn: Fqn,
    pub source_system: SourceSystem,
    pub description: Option<String>,
    pub columns: Vec<Column>,
}

/// Validated update handed to a registry.
#[derive(Debug, Clone, Default)]
pub struct DatasetChanges {
    pub source_system: Option<SourceSystem>,
    pub description: Option<String>,
    pub columns: Option<Vec<Column>>,
}
