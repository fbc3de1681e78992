//! Listing queries over the catalog.

use super::kinds::EntityKind;
use crate::storage::CatalogFilter;
use serde::Serialize;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Filter plus pagination for a catalog listing.
///
/// Every filter is optional; an absent value never constrains the result.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    pub filter: CatalogFilter,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl CatalogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.filter.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.filter.domain = Some(domain.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.filter.status = Some(status.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.filter.search = Some(search.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Limit after clamping to `[1, kind max]`.
    pub fn effective_limit(&self, kind: EntityKind) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, kind.max_page_size())
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Blank strings are treated as absent.
    pub fn normalized_filter(&self) -> CatalogFilter {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        CatalogFilter {
            entity_type: clean(&self.filter.entity_type),
            domain: clean(&self.filter.domain),
            status: clean(&self.filter.status),
            search: clean(&self.filter.search),
        }
    }
}

/// One page of results with the total under the same filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
