//! Visualization edges and the projections that derive them.
//!
//! All three constructors are pure; nothing here writes.

use crate::catalog::{EntityRef, FrameworkElement, Severity, Tension};
use crate::relation::{relation_types, Relation};
use serde::Serialize;

string_enum! {
    /// Where an edge came from.
    pub enum EdgeOrigin ("edge origin") {
        Stored => "stored",
        Tension => "tension",
        Membership => "membership",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique per origin: `relation:7`, `tension:3`, `part_of:12`
    pub key: String,
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub weight: f64,
    pub bidirectional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub origin: EdgeOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tension_id: Option<i64>,
}

impl GraphEdge {
    /// A stored relation, verbatim.
    pub fn from_relation(relation: &Relation) -> Self {
        Self {
            key: format!("relation:{}", relation.id),
            source: relation.source.key(),
            target: relation.target.key(),
            relation_type: relation.relation_type.clone(),
            weight: relation.weight,
            bidirectional: relation.is_bidirectional,
            description: relation.description.clone(),
            origin: EdgeOrigin::Stored,
            relation_id: Some(relation.id),
            severity: None,
            tension_id: None,
        }
    }

    /// Synthetic `conflicts_with` edge for a tension with both poles set.
    pub fn from_tension(tension: &Tension) -> Option<Self> {
        let (a, b) = tension.poles()?;
        Some(Self {
            key: format!("tension:{}", tension.id),
            source: EntityRef::concept(a).key(),
            target: EntityRef::concept(b).key(),
            relation_type: relation_types::CONFLICTS_WITH.to_string(),
            weight: 1.0,
            bidirectional: true,
            description: Some(tension.title.clone()),
            origin: EdgeOrigin::Tension,
            relation_id: None,
            severity: Some(tension.severity),
            tension_id: Some(tension.id),
        })
    }

    /// Synthetic `part_of` edge from an element to its framework.
    pub fn membership(element: &FrameworkElement) -> Self {
        Self {
            key: format!("part_of:{}", element.id),
            source: EntityRef::framework_element(element.id).key(),
            target: EntityRef::framework(element.framework_id).key(),
            relation_type: relation_types::PART_OF.to_string(),
            weight: 1.0,
            bidirectional: false,
            description: None,
            origin: EdgeOrigin::Membership,
            relation_id: None,
            severity: None,
            tension_id: None,
        }
    }
}
