//! Storage backends for Polis
//!
//! Every component persists through the `Store` trait.
//! The primary implementation is `SqliteStore` for persistent storage.

mod rows;
mod sqlite;
mod traits;

pub use rows::EntityRow;
pub use sqlite::SqliteStore;
pub use traits::{CatalogFilter, Endpoint, OpenStore, PageRequest, StorageError, StorageResult, Store};
