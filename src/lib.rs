pub mod catalog;
pub mod config;
pub mod database;
pub mod dataset_manager;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lineage;
pub mod memory;
pub mod models;
pub mod registry;
pub mod schema;
pub mod search;

pub use engine::RegistryEngine;
pub use error::{ErrorKind, RegistryError};
pub use memory::MemoryRegistry;
