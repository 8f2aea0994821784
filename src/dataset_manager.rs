use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{
    check_length, Column, Dataset, DatasetChanges, DatasetDraft, DatasetUpdate, Fqn, NewColumn,
    NewDataset, MAX_COLUMN_DESCRIPTION_LEN, MAX_DATASET_DESCRIPTION_LEN, MAX_DATA_TYPE_LEN,
    MAX_NAME_LEN,
};
use crate::config::PageConfig;
use crate::error::{RegistryError, Result};
use crate::registry::DatasetRegistry;

const DEFAULT_DATA_TYPE: &str = "STRING";

pub struct DatasetManager<R: DatasetRegistry> {
    registry: Arc<R>,
    pages: PageConfig,
}

impl<R: DatasetRegistry> DatasetManager<R> {
    pub fn new(registry: Arc<R>, pages: PageConfig) -> Self {
        Self { registry, pages }
    }

    pub async fn create_dataset(&self, request: NewDataset) -> Result<Dataset> {
        let fqn = Fqn::new(
            &request.connection_name,
            &request.database_name,
            &request.schema_name,
            &request.table_name,
        )?;
        check_description(request.description.as_deref())?;
        let draft = DatasetDraft {
            fqn,
            source_system: request.source_system,
            description: request.description,
            columns: normalize_columns(request.columns)?,
        };

        if self.registry.resolve_by_fqn(&draft.fqn).await?.is_some() {
            return Err(RegistryError::DuplicateDataset {
                fqn: draft.fqn.to_string(),
            });
        }

        let dataset = self.registry.insert_dataset(draft).await?;
        info!("Created dataset: {}", dataset.fqn);
        Ok(dataset)
    }

    pub async fn get_dataset(&self, fqn: &str) -> Result<Dataset> {
        let fqn = Fqn::parse(fqn)?;
        self.registry
            .get_dataset(&fqn)
            .await?
            .ok_or_else(|| not_found(&fqn))
    }

    /// Datasets ordered by FQN. `limit` defaults to the configured page size.
    pub async fn list_datasets(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Dataset>> {
        let limit = limit.unwrap_or(self.pages.default_page_size);
        if !(1..=self.pages.max_page_size).contains(&limit) {
            return Err(RegistryError::invalid(format!(
                "page size must be between 1 and {}, got {}",
                self.pages.max_page_size, limit
            )));
        }
        self.registry.list_datasets(offset, limit).await
    }

    pub async fn update_dataset(&self, fqn: &str, update: DatasetUpdate) -> Result<Dataset> {
        let fqn = Fqn::parse(fqn)?;
        check_description(update.description.as_deref())?;
        let changes = DatasetChanges {
            source_system: update.source_system,
            description: update.description,
            columns: update.columns.map(normalize_columns).transpose()?,
        };

        let dataset = self
            .registry
            .update_dataset(&fqn, changes)
            .await?
            .ok_or_else(|| not_found(&fqn))?;
        info!("Updated dataset: {}", fqn);
        Ok(dataset)
    }

    /// Deletes the dataset together with its columns and every lineage edge
    /// it takes part in, in either direction.
    pub async fn delete_dataset(&self, fqn: &str) -> Result<()> {
        let fqn = Fqn::parse(fqn)?;
        if !self.registry.delete_dataset(&fqn).await? {
            return Err(not_found(&fqn));
        }
        info!("Deleted dataset: {}", fqn);
        Ok(())
    }
}

fn not_found(fqn: &Fqn) -> RegistryError {
    RegistryError::DatasetNotFound {
        fqns: vec![fqn.to_string()],
    }
}

fn check_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(text) => check_length("description", text, MAX_DATASET_DESCRIPTION_LEN),
        None => Ok(()),
    }
}

fn normalize_columns(columns: Vec<NewColumn>) -> Result<Vec<Column>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(columns.len());

    for column in columns {
        let name = column.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::invalid("column name must not be empty"));
        }
        check_length("column name", &name, MAX_NAME_LEN)?;
        if !seen.insert(name.clone()) {
            return Err(RegistryError::invalid(format!(
                "duplicate column name '{}'",
                name
            )));
        }

        let data_type = match column.data_type.trim() {
            "" => DEFAULT_DATA_TYPE.to_string(),
            other => other.to_uppercase(),
        };
        check_length("column data_type", &data_type, MAX_DATA_TYPE_LEN)?;
        if let Some(text) = &column.description {
            check_length("column description", text, MAX_COLUMN_DESCRIPTION_LEN)?;
        }

        normalized.push(Column {
            name,
            data_type,
            description: column.description,
        });
    }

    Ok(normalized)
}
