use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("upstream and downstream must be different datasets: '{fqn}' cannot feed itself")]
    SelfLoop { fqn: String },

    #[error("Dataset not found: {}", .fqns.join(", "))]
    DatasetNotFound { fqns: Vec<String> },

    #[error("Lineage edge '{upstream}' -> '{downstream}' does not exist")]
    EdgeNotFound { upstream: String, downstream: String },

    #[error("Dataset '{fqn}' already exists")]
    DuplicateDataset { fqn: String },

    #[error("Lineage edge '{upstream}' -> '{downstream}' already exists")]
    DuplicateEdge { upstream: String, downstream: String },

    #[error(
        "Cannot add lineage '{upstream}' -> '{downstream}': this would create a cycle. \
         '{upstream}' is already downstream of '{downstream}' (directly or transitively)"
    )]
    CycleDetected { upstream: String, downstream: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Coarse classification a transport layer maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    CycleConflict,
    Store,
    Configuration,
}

impl RegistryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RegistryError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidInput { .. } | RegistryError::SelfLoop { .. } => {
                ErrorKind::Validation
            }
            RegistryError::DatasetNotFound { .. } | RegistryError::EdgeNotFound { .. } => {
                ErrorKind::NotFound
            }
            RegistryError::DuplicateDataset { .. } | RegistryError::DuplicateEdge { .. } => {
                ErrorKind::Conflict
            }
            RegistryError::CycleDetected { .. } => ErrorKind::CycleConflict,
            RegistryError::Database { .. } => ErrorKind::Store,
            RegistryError::ConfigError { .. } => ErrorKind::Configuration,
        }
    }
}

impl From<diesel::result::Error> for RegistryError {
    fn from(err: diesel::result::Error) -> Self {
        RegistryError::Database {
            message: err.to_string(),
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for RegistryError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        RegistryError::Database {
            message: format!("Failed to get database connection: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
