//! Entity Catalog: typed storage and lookup for the ontology's nouns.

mod api;
mod entities;
mod entity_ref;
mod kinds;
mod query;

pub use api::{Catalog, EntityKey};
pub use entities::*;
pub use entity_ref::{CodeRef, EntityRef};
pub use kinds::*;
pub use query::{CatalogQuery, Page, DEFAULT_PAGE_SIZE};
