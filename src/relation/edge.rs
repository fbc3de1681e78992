//! Stored relation rows

use crate::catalog::EntityRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known relation types
pub mod relation_types {
    pub const CONFLICTS_WITH: &str = "conflicts_with";
    pub const PART_OF: &str = "part_of";
    pub const SUPPORTS: &str = "supports";
    pub const CHALLENGES: &str = "challenges";
    pub const DERIVES_FROM: &str = "derives_from";
    pub const ENABLES: &str = "enables";
    pub const REQUIRES: &str = "requires";
    pub const INFORMS: &str = "informs";
    pub const IMPLEMENTS: &str = "implements";
    pub const ADDRESSES: &str = "addresses";
    pub const COMPLEMENTS: &str = "complements";
    pub const RELATED_TO: &str = "related_to";

    /// Types that have no meaningful direction.
    pub fn is_symmetric(relation_type: &str) -> bool {
        matches!(relation_type, CONFLICTS_WITH | COMPLEMENTS | RELATED_TO)
    }
}

/// A typed edge between two polymorphic endpoints.
///
/// At most one row exists per `(source, relation_type, target)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: i64,
    pub source: EntityRef,
    pub relation_type: String,
    pub target: EntityRef,
    pub description: Option<String>,
    /// In `[0, 1]`
    pub weight: f64,
    pub is_bidirectional: bool,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// The endpoint opposite `from`, if `from` is one of the endpoints.
    pub fn other_end(&self, from: &EntityRef) -> Option<EntityRef> {
        if &self.source == from {
            Some(self.target)
        } else if &self.target == from {
            Some(self.source)
        } else {
            None
        }
    }
}

/// Insert request for a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelation {
    pub source: EntityRef,
    pub relation_type: String,
    pub target: EntityRef,
    pub description: Option<String>,
    pub weight: f64,
    pub is_bidirectional: bool,
}

impl NewRelation {
    /// Symmetric relation types start out bidirectional.
    pub fn new(source: EntityRef, relation_type: impl Into<String>, target: EntityRef) -> Self {
        let relation_type = relation_type.into();
        let is_bidirectional = relation_types::is_symmetric(&relation_type);
        Self {
            source,
            relation_type,
            target,
            description: None,
            weight: 1.0,
            is_bidirectional,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn bidirectional(mut self, yes: bool) -> Self {
        self.is_bidirectional = yes;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.relation_type.trim().is_empty() {
            return Err("relation type is required".into());
        }
        if !(0.0..=1.0).contains(&self.weight) || self.weight.is_nan() {
            return Err(format!("weight must be between 0 and 1 (got {})", self.weight));
        }
        Ok(())
    }
}
