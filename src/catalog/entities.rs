//! Typed records of the ontology.

use super::kinds::*;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Schema-less key/value blob stored with several entities.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Read a narrow typed view out of a metadata blob.
///
/// Missing or mistyped keys fall back to the view's defaults rather than
/// failing the read.
pub fn metadata_view<T: DeserializeOwned + Default>(metadata: &Metadata) -> T {
    match serde_json::from_value(serde_json::Value::Object(metadata.clone())) {
        Ok(view) => view,
        Err(e) => {
            tracing::debug!(error = %e, "metadata does not match view, using defaults");
            T::default()
        }
    }
}

/// Rendering hints curators may attach under metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderHints {
    pub color: Option<String>,
    pub icon: Option<String>,
    pub group: Option<String>,
}

impl RenderHints {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.icon.is_none() && self.group.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub concept_type: ConceptType,
    #[serde(default)]
    pub domain: Option<String>,
    pub maturity: Maturity,
    pub confidence: Confidence,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Concept {
    pub fn new(code: impl Into<String>, title: impl Into<String>, concept_type: ConceptType) -> Self {
        Self {
            id: 0,
            code: code.into(),
            title: title.into(),
            summary: None,
            concept_type,
            domain: None,
            maturity: Maturity::Embryonic,
            confidence: Confidence::Speculative,
            is_core: false,
            status: EntityStatus::Active,
            metadata: Metadata::new(),
        }
    }
}

/// Fields of a concept that may change after creation. `code` never does.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub maturity: Option<Maturity>,
    pub confidence: Option<Confidence>,
    pub status: Option<EntityStatus>,
}

impl ConceptPatch {
    pub fn apply(&self, concept: &mut Concept) {
        if let Some(ref title) = self.title {
            concept.title = title.clone();
        }
        if let Some(ref summary) = self.summary {
            concept.summary = Some(summary.clone());
        }
        if let Some(maturity) = self.maturity {
            concept.maturity = maturity;
        }
        if let Some(confidence) = self.confidence {
            concept.confidence = confidence;
        }
        if let Some(status) = self.status {
            concept.status = status;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Framework {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub framework_type: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A layer entry of a framework. Ordered by `(layer_number, sort_order)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkElement {
    #[serde(default)]
    pub id: i64,
    pub framework_id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub element_type: String,
    pub layer_number: i64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tension {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub pole_a_id: Option<i64>,
    #[serde(default)]
    pub pole_b_id: Option<i64>,
    pub severity: Severity,
    pub resolution_status: ResolutionStatus,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Tension {
    /// Both poles, when the tension is a full conflict between two concepts.
    pub fn poles(&self) -> Option<(i64, i64)> {
        Some((self.pole_a_id?, self.pole_b_id?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub evidence_type: String,
    pub quality: EvidenceQuality,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Evidence as seen from one concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEvidence {
    #[serde(flatten)]
    pub evidence: Evidence,
    pub link_type: LinkType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntellectualSource {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub source_type: String,
    #[serde(default)]
    pub era: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorType {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub actor_category: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureElement {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub element_type: String,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(default)]
    pub id: i64,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub author_id: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub architecture_element_id: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(code: impl Into<String>, title: impl Into<String>, author_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            code: code.into(),
            title: title.into(),
            summary: None,
            body: None,
            author_id: author_id.into(),
            status: ProposalStatus::Draft,
            architecture_element_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Any catalog record, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Concept(Concept),
    Framework(Framework),
    FrameworkElement(FrameworkElement),
    Tension(Tension),
    Evidence(Evidence),
    Source(IntellectualSource),
    Actor(ActorType),
    ArchitectureElement(ArchitectureElement),
    Proposal(Proposal),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Concept(_) => EntityKind::Concept,
            Entity::Framework(_) => EntityKind::Framework,
            Entity::FrameworkElement(_) => EntityKind::FrameworkElement,
            Entity::Tension(_) => EntityKind::Tension,
            Entity::Evidence(_) => EntityKind::Evidence,
            Entity::Source(_) => EntityKind::Source,
            Entity::Actor(_) => EntityKind::Actor,
            Entity::ArchitectureElement(_) => EntityKind::ArchitectureElement,
            Entity::Proposal(_) => EntityKind::Proposal,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Entity::Concept(e) => &e.title,
            Entity::Framework(e) => &e.title,
            Entity::FrameworkElement(e) => &e.title,
            Entity::Tension(e) => &e.title,
            Entity::Evidence(e) => &e.title,
            Entity::Source(e) => &e.title,
            Entity::Actor(e) => &e.title,
            Entity::ArchitectureElement(e) => &e.title,
            Entity::Proposal(e) => &e.title,
        }
    }
}

/// Common surface of every catalog record.
pub trait CatalogEntity: Clone + Serialize + Into<Entity> {
    const KIND: EntityKind;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn code(&self) -> &str;
    fn set_code(&mut self, code: String);
    fn title(&self) -> &str;

    /// Field checks run before any write.
    fn validate(&self) -> Result<(), String> {
        if self.code().trim().is_empty() {
            return Err(format!("{} code is required", Self::KIND));
        }
        if self.title().trim().is_empty() {
            return Err(format!("{} title is required", Self::KIND));
        }
        Ok(())
    }
}

macro_rules! catalog_entity {
    ($ty:ident, $kind:ident) => {
        impl CatalogEntity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> i64 {
                self.id
            }
            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
            fn code(&self) -> &str {
                &self.code
            }
            fn set_code(&mut self, code: String) {
                self.code = code;
            }
            fn title(&self) -> &str {
                &self.title
            }
        }

        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$kind(value)
            }
        }
    };
}

catalog_entity!(Concept, Concept);
catalog_entity!(Framework, Framework);
catalog_entity!(FrameworkElement, FrameworkElement);
catalog_entity!(Tension, Tension);
catalog_entity!(Evidence, Evidence);
catalog_entity!(IntellectualSource, Source);
catalog_entity!(ActorType, Actor);
catalog_entity!(ArchitectureElement, ArchitectureElement);
catalog_entity!(Proposal, Proposal);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_view_reads_known_keys() {
        let mut metadata = Metadata::new();
        metadata.insert("color".into(), json!("#aa3300"));
        metadata.insert("unrelated".into(), json!({ "nested": true }));

        let hints: RenderHints = metadata_view(&metadata);
        assert_eq!(hints.color.as_deref(), Some("#aa3300"));
        assert!(hints.icon.is_none());
    }

    #[test]
    fn metadata_view_fails_soft_on_wrong_shape() {
        let mut metadata = Metadata::new();
        metadata.insert("color".into(), json!(42));

        let hints: RenderHints = metadata_view(&metadata);
        assert!(hints.is_empty());
    }

    #[test]
    fn patch_leaves_code_alone() {
        let mut concept = Concept::new("UBI", "Universal basic income", ConceptType::Proposal);
        ConceptPatch {
            title: Some("Basic income".into()),
            maturity: Some(Maturity::Established),
            ..Default::default()
        }
        .apply(&mut concept);

        assert_eq!(concept.code, "UBI");
        assert_eq!(concept.title, "Basic income");
        assert_eq!(concept.maturity, Maturity::Established);
        assert_eq!(concept.confidence, Confidence::Speculative);
    }

    #[test]
    fn validation_requires_code_and_title() {
        let concept = Concept::new(" ", "Title", ConceptType::Mechanism);
        assert_eq!(concept.validate().unwrap_err(), "concept code is required");
    }

    #[test]
    fn tension_poles_need_both_sides() {
        let mut tension = Tension {
            id: 1,
            code: "T1".into(),
            title: "Growth vs limits".into(),
            summary: None,
            pole_a_id: Some(3),
            pole_b_id: None,
            severity: Severity::Minor,
            resolution_status: ResolutionStatus::Unresolved,
            domain: None,
            metadata: Metadata::new(),
        };
        assert_eq!(tension.poles(), None);
        tension.pole_b_id = Some(4);
        assert_eq!(tension.poles(), Some((3, 4)));
    }

    #[test]
    fn entity_serializes_with_kind_tag() {
        let entity: Entity = Concept::new("C1", "Commons", ConceptType::Phenomenon).into();
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["kind"], "concept");
        assert_eq!(value["code"], "C1");
        assert_eq!(entity.kind(), EntityKind::Concept);
    }
}
