//! Polis: typed policy ontology and evaluation backend
//!
//! Stores a catalog of concepts, frameworks, tensions, evidence and
//! proposals, connects them with a typed relation graph, and layers a
//! multi-rater PRIME evaluation workflow and a versioned document ledger on
//! top.
//!
//! # Core Concepts
//!
//! - **Entities**: typed catalog records addressed by id or stable code
//! - **Relations**: directed, typed edges between polymorphic endpoints that
//!   may dangle
//! - **Graph**: a read-side projection of entities, relations and tension
//!   poles for visualization
//! - **Evaluations**: one scored row per (proposal, evaluator), aggregated
//!   over submitted rows
//!
//! # Example
//!
//! ```
//! use polis::{OpenStore, SqliteStore};
//! use polis::graph::GraphAssembler;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let graph = GraphAssembler::new(&store).build().unwrap();
//! assert_eq!(graph.metadata.node_count, 0);
//! ```

#[macro_use]
mod macros;

pub mod activity;
pub mod api;
pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod identity;
pub mod mcp;
pub mod relation;
pub mod seed;
pub mod storage;

pub use api::{Params, PolisApi};
pub use catalog::{CodeRef, Entity, EntityKind, EntityRef};
pub use error::{PolisError, PolisResult};
pub use identity::{Identity, IdentityProvider, Role};
pub use storage::{OpenStore, SqliteStore, StorageError, StorageResult, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
