//! Visualization nodes

use crate::catalog::{
    metadata_view, Concept, Confidence, EntityKind, EntityRef, Framework, FrameworkElement, Maturity, RenderHints,
};
use serde::Serialize;

/// A renderable node. Carries only what a renderer needs, never bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// `kind:id`, unique across kinds
    pub key: String,
    pub id: i64,
    #[serde(rename = "type")]
    pub node_type: EntityKind,
    pub sub_type: String,
    pub code: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity: Option<Maturity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Core concept or primary framework
    pub is_core: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<i64>,
    #[serde(skip_serializing_if = "RenderHints::is_empty")]
    pub hints: RenderHints,
}

impl GraphNode {
    fn base(entity: EntityRef, sub_type: &str, code: &str, label: &str) -> Self {
        Self {
            key: entity.key(),
            id: entity.id,
            node_type: entity.kind,
            sub_type: sub_type.to_string(),
            code: code.to_string(),
            label: label.to_string(),
            domain: None,
            maturity: None,
            confidence: None,
            is_core: false,
            layer: None,
            framework_id: None,
            hints: RenderHints::default(),
        }
    }

    pub fn from_concept(concept: &Concept) -> Self {
        Self {
            domain: concept.domain.clone(),
            maturity: Some(concept.maturity),
            confidence: Some(concept.confidence),
            is_core: concept.is_core,
            hints: metadata_view(&concept.metadata),
            ..Self::base(
                EntityRef::concept(concept.id),
                concept.concept_type.as_str(),
                &concept.code,
                &concept.title,
            )
        }
    }

    pub fn from_framework(framework: &Framework) -> Self {
        Self {
            domain: framework.domain.clone(),
            is_core: framework.is_primary,
            hints: metadata_view(&framework.metadata),
            ..Self::base(
                EntityRef::framework(framework.id),
                &framework.framework_type,
                &framework.code,
                &framework.title,
            )
        }
    }

    pub fn from_element(element: &FrameworkElement) -> Self {
        Self {
            layer: Some(element.layer_number),
            framework_id: Some(element.framework_id),
            hints: metadata_view(&element.metadata),
            ..Self::base(
                EntityRef::framework_element(element.id),
                &element.element_type,
                &element.code,
                &element.title,
            )
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.node_type, self.id)
    }
}
