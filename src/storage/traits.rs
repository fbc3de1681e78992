//! Storage trait definitions

use super::rows::EntityRow;
use crate::catalog::{EntityKind, EntityRef, FrameworkElement, LinkType, LinkedEvidence, Proposal};
use crate::document::{Document, DocumentChange, DocumentInsert, DocumentVersion};
use crate::evaluation::{Evaluation, EvaluationStatus, EvaluationWrite};
use crate::relation::{NewRelation, Relation};
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A unique key already holds a row
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// An optimistic version check found a newer row
    #[error("Stale write: {0}")]
    StaleWrite(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Equality and substring predicates for catalog listings.
///
/// `None` means "no constraint", never "match NULL". A constraint on a
/// column the kind does not have is rejected by `Catalog::list` before it
/// reaches the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilter {
    /// Matched against the kind's type column (e.g. `concept_type`)
    pub entity_type: Option<String>,
    pub domain: Option<String>,
    pub status: Option<String>,
    /// Case-insensitive substring over title and summary
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

/// Which column of a relation to match on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

/// Persistence backend for every component.
///
/// Multi-statement writes (evaluation upsert, document archive-then-update)
/// are atomic inside a single call.
pub trait Store: Send + Sync {
    // === Catalog ===

    /// Insert a new record and return its id
    fn insert_entity<E: EntityRow>(&self, entity: &E) -> StorageResult<i64>;

    /// Insert unless a record with the same code exists; `None` if it did
    fn insert_entity_if_absent<E: EntityRow>(&self, entity: &E) -> StorageResult<Option<i64>>;

    /// Overwrite the record with `entity.id()`
    fn update_entity<E: EntityRow>(&self, entity: &E) -> StorageResult<bool>;

    fn delete_entity<E: EntityRow>(&self, id: i64) -> StorageResult<bool>;

    fn load_entity<E: EntityRow>(&self, id: i64) -> StorageResult<Option<E>>;

    fn load_entity_by_code<E: EntityRow>(&self, code: &str) -> StorageResult<Option<E>>;

    /// One page of records matching `filter`, in the kind's listing order
    fn find_entities<E: EntityRow>(&self, filter: &CatalogFilter, page: PageRequest) -> StorageResult<Vec<E>>;

    /// Number of records matching `filter`, independent of paging
    fn count_entities<E: EntityRow>(&self, filter: &CatalogFilter) -> StorageResult<usize>;

    /// Every record of a kind, in listing order
    fn all_entities<E: EntityRow>(&self) -> StorageResult<Vec<E>>;

    fn entity_id_by_code(&self, kind: EntityKind, code: &str) -> StorageResult<Option<i64>>;

    fn entity_exists(&self, entity: &EntityRef) -> StorageResult<bool>;

    /// Link evidence to a concept; `false` if the link already existed
    fn link_evidence(&self, evidence_id: i64, concept_id: i64, link_type: LinkType) -> StorageResult<bool>;

    /// Evidence linked to a concept, strongest quality first
    fn evidence_for_concept(&self, concept_id: i64) -> StorageResult<Vec<LinkedEvidence>>;

    /// Elements of a framework in `(layer_number, sort_order)` order
    fn framework_elements(&self, framework_id: i64) -> StorageResult<Vec<FrameworkElement>>;

    fn proposals_for_architecture_element(&self, element_id: i64) -> StorageResult<Vec<Proposal>>;

    // === Relations ===

    /// Insert unless the 5-tuple exists; `None` for a duplicate
    fn insert_relation(&self, relation: &NewRelation) -> StorageResult<Option<i64>>;

    fn load_relation(&self, id: i64) -> StorageResult<Option<Relation>>;

    /// Relations whose `endpoint` is `entity`, by type then descending weight
    fn relations_at(&self, endpoint: Endpoint, entity: &EntityRef) -> StorageResult<Vec<Relation>>;

    fn all_relations(&self) -> StorageResult<Vec<Relation>>;

    fn delete_relation(&self, id: i64) -> StorageResult<bool>;

    // === Evaluations ===

    /// Insert or replace the row for `(proposal_id, evaluator_id)`
    fn upsert_evaluation(&self, write: &EvaluationWrite) -> StorageResult<Evaluation>;

    fn load_evaluation(&self, id: i64) -> StorageResult<Option<Evaluation>>;

    fn evaluations_for_proposal(
        &self,
        proposal_id: i64,
        status: Option<EvaluationStatus>,
    ) -> StorageResult<Vec<Evaluation>>;

    // === Documents ===

    fn insert_document(&self, document: &DocumentInsert) -> StorageResult<Document>;

    fn load_document(&self, id: i64) -> StorageResult<Option<Document>>;

    fn load_document_by_slug(&self, slug: &str) -> StorageResult<Option<Document>>;

    fn list_documents(&self) -> StorageResult<Vec<Document>>;

    fn slug_exists(&self, slug: &str) -> StorageResult<bool>;

    /// Archive (if planned) and update in one transaction.
    ///
    /// Fails with `StaleWrite` when the stored version moved past
    /// `change.expected_version`.
    fn apply_document_change(&self, change: &DocumentChange) -> StorageResult<Document>;

    fn set_document_published(&self, id: i64, published: bool, at: DateTime<Utc>) -> StorageResult<bool>;

    fn delete_document(&self, id: i64) -> StorageResult<bool>;

    /// Archived versions, oldest first
    fn document_versions(&self, document_id: i64) -> StorageResult<Vec<DocumentVersion>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Store + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
