//! Shared fixtures for the integration tests

#![allow(dead_code)]

use polis::activity::ActivityRecorder;
use polis::catalog::{Concept, ConceptType, Proposal};
use polis::{Identity, OpenStore, PolisApi, Role, SqliteStore};
use std::sync::Arc;

/// API over a fresh in-memory store that also records activity.
pub fn api() -> PolisApi<SqliteStore> {
    with_store(SqliteStore::open_in_memory().expect("in-memory store"))
}

pub fn with_store(store: SqliteStore) -> PolisApi<SqliteStore> {
    let store = Arc::new(store);
    let activity: Arc<dyn ActivityRecorder> = store.clone();
    PolisApi::new(store, activity)
}

pub fn curator() -> Identity {
    Identity::new("cora", Role::Curator)
}

pub fn admin() -> Identity {
    Identity::admin("root")
}

pub fn concept(api: &PolisApi<SqliteStore>, code: &str, concept_type: ConceptType) -> Concept {
    api.catalog()
        .create(Some(&curator()), Concept::new(code, format!("Concept {}", code), concept_type))
        .expect("create concept")
}

pub fn proposal(api: &PolisApi<SqliteStore>, author: &Identity, code: &str) -> i64 {
    api.catalog()
        .create_proposal(Some(author), Proposal::new(code, format!("Proposal {}", code), &author.user_id))
        .expect("create proposal")
        .id
}
