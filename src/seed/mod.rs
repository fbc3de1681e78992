//! Bulk seeding of a fixed ontology from YAML.
//!
//! Entities are matched by code and never overwritten. Relations name their
//! endpoints by code; an endpoint that does not resolve skips that relation
//! and seeding carries on.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::catalog::{
    ActorType, ArchitectureElement, CodeRef, Concept, EntityKind, EntityRef, Evidence, Framework, FrameworkElement,
    IntellectualSource, LinkType, Metadata, ResolutionStatus, Severity, Tension,
};
use crate::error::PolisResult;
use crate::relation::NewRelation;
use crate::storage::{EntityRow, Store};

/// The ontology shipped with the crate.
pub const DEFAULT_ONTOLOGY: &str = include_str!("../../ontology/seed.yaml");

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read ontology: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ontology: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ontology {
    pub concepts: Vec<Concept>,
    pub frameworks: Vec<FrameworkSeed>,
    pub sources: Vec<IntellectualSource>,
    pub actors: Vec<ActorType>,
    pub architecture: Vec<ArchitectureElement>,
    pub evidence: Vec<EvidenceSeed>,
    pub tensions: Vec<TensionSeed>,
    pub relations: Vec<RelationSeed>,
}

/// A framework with its elements inline.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameworkSeed {
    #[serde(flatten)]
    pub framework: Framework,
    #[serde(default)]
    pub elements: Vec<ElementSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSeed {
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

impl ElementSeed {
    fn to_element(&self, framework_id: i64) -> FrameworkElement {
        FrameworkElement {
            id: 0,
            framework_id,
            code: self.code.clone(),
            title: self.title.clone(),
            summary: self.summary.clone(),
            element_type: self.element_type.clone(),
            layer_number: self.layer_number,
            sort_order: self.sort_order,
            metadata: self.metadata.clone(),
        }
    }
}

/// Evidence with the concepts it bears on, by concept code.
#[derive(Debug, Clone, Deserialize)]
pub struct EvidenceSeed {
    #[serde(flatten)]
    pub evidence: Evidence,
    #[serde(default)]
    pub links: Vec<EvidenceLinkSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceLinkSeed {
    pub concept: String,
    pub link_type: LinkType,
}

/// A tension whose poles are concept codes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensionSeed {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub pole_a: Option<String>,
    #[serde(default)]
    pub pole_b: Option<String>,
    pub severity: Severity,
    #[serde(default = "unresolved")]
    pub resolution_status: ResolutionStatus,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn unresolved() -> ResolutionStatus {
    ResolutionStatus::Unresolved
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationSeed {
    pub source: CodeRef,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub target: CodeRef,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the default for the relation type
    #[serde(default)]
    pub bidirectional: Option<bool>,
}

impl Ontology {
    pub fn from_yaml(yaml: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn builtin() -> Result<Self, SeedError> {
        Self::from_yaml(DEFAULT_ONTOLOGY)
    }
}

/// Row counts from one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    /// Already present by code or key; left untouched
    pub existing: usize,
    /// Invalid entries and unresolved references
    pub skipped: usize,
}

impl SeedReport {
    fn count(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.existing += 1;
        }
    }
}

pub struct Seeder<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> Seeder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Seed everything in dependency order. Safe to re-run.
    pub fn seed(&self, ontology: &Ontology) -> PolisResult<SeedReport> {
        let mut report = SeedReport::default();

        for concept in &ontology.concepts {
            self.entity(concept.clone(), &mut report)?;
        }

        for seed in &ontology.frameworks {
            self.entity(seed.framework.clone(), &mut report)?;
            let Some(framework_id) = self.id_of(EntityKind::Framework, &seed.framework.code)? else {
                report.skipped += seed.elements.len();
                continue;
            };
            for element in &seed.elements {
                self.entity(element.to_element(framework_id), &mut report)?;
            }
        }

        for source in &ontology.sources {
            self.entity(source.clone(), &mut report)?;
        }
        for actor in &ontology.actors {
            self.entity(actor.clone(), &mut report)?;
        }
        for element in &ontology.architecture {
            self.entity(element.clone(), &mut report)?;
        }

        for seed in &ontology.evidence {
            self.entity(seed.evidence.clone(), &mut report)?;
            let Some(evidence_id) = self.id_of(EntityKind::Evidence, &seed.evidence.code)? else {
                report.skipped += seed.links.len();
                continue;
            };
            for link in &seed.links {
                match self.id_of(EntityKind::Concept, &link.concept)? {
                    Some(concept_id) => {
                        let linked = self.store.link_evidence(evidence_id, concept_id, link.link_type)?;
                        report.count(linked);
                    }
                    None => {
                        tracing::warn!(evidence = %seed.evidence.code, concept = %link.concept, "skipping evidence link to unknown concept");
                        report.skipped += 1;
                    }
                }
            }
        }

        for seed in &ontology.tensions {
            let tension = Tension {
                id: 0,
                code: seed.code.clone(),
                title: seed.title.clone(),
                summary: seed.summary.clone(),
                pole_a_id: self.pole(&seed.code, seed.pole_a.as_deref())?,
                pole_b_id: self.pole(&seed.code, seed.pole_b.as_deref())?,
                severity: seed.severity,
                resolution_status: seed.resolution_status,
                domain: seed.domain.clone(),
                metadata: seed.metadata.clone(),
            };
            self.entity(tension, &mut report)?;
        }

        for seed in &ontology.relations {
            self.relation(seed, &mut report)?;
        }

        tracing::info!(
            inserted = report.inserted,
            existing = report.existing,
            skipped = report.skipped,
            "ontology seeded"
        );
        Ok(report)
    }

    fn entity<E: EntityRow>(&self, entity: E, report: &mut SeedReport) -> PolisResult<()> {
        if let Err(reason) = entity.validate() {
            tracing::warn!(kind = %E::KIND, code = entity.code(), %reason, "skipping invalid seed entry");
            report.skipped += 1;
            return Ok(());
        }
        let inserted = self.store.insert_entity_if_absent(&entity)?;
        report.count(inserted.is_some());
        Ok(())
    }

    fn relation(&self, seed: &RelationSeed, report: &mut SeedReport) -> PolisResult<()> {
        let source = self.id_of(seed.source.kind, &seed.source.code)?;
        let target = self.id_of(seed.target.kind, &seed.target.code)?;
        let (Some(source), Some(target)) = (source, target) else {
            tracing::warn!(
                source = %seed.source,
                relation_type = %seed.relation_type,
                target = %seed.target,
                "skipping relation with unresolved endpoint"
            );
            report.skipped += 1;
            return Ok(());
        };

        let mut relation = NewRelation::new(
            EntityRef::new(seed.source.kind, source),
            seed.relation_type.clone(),
            EntityRef::new(seed.target.kind, target),
        );
        if let Some(weight) = seed.weight {
            relation = relation.with_weight(weight);
        }
        if let Some(ref description) = seed.description {
            relation = relation.with_description(description.clone());
        }
        if let Some(bidirectional) = seed.bidirectional {
            relation = relation.bidirectional(bidirectional);
        }
        if let Err(reason) = relation.validate() {
            tracing::warn!(source = %seed.source, target = %seed.target, %reason, "skipping invalid relation");
            report.skipped += 1;
            return Ok(());
        }

        report.count(self.store.insert_relation(&relation)?.is_some());
        Ok(())
    }

    fn pole(&self, tension: &str, code: Option<&str>) -> PolisResult<Option<i64>> {
        let Some(code) = code else {
            return Ok(None);
        };
        let id = self.id_of(EntityKind::Concept, code)?;
        if id.is_none() {
            tracing::warn!(tension, pole = code, "tension pole does not resolve, leaving it empty");
        }
        Ok(id)
    }

    fn id_of(&self, kind: EntityKind, code: &str) -> PolisResult<Option<i64>> {
        Ok(self.store.entity_id_by_code(kind, code)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAssembler;
    use crate::storage::{OpenStore, SqliteStore};

    #[test]
    fn builtin_ontology_seeds_cleanly() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ontology = Ontology::builtin().unwrap();
        let report = Seeder::new(&store).seed(&ontology).unwrap();

        assert_eq!(report.skipped, 0);
        assert_eq!(report.existing, 0);
        assert_eq!(store.all_relations().unwrap().len(), ontology.relations.len());

        let prime = store.entity_id_by_code(EntityKind::Framework, "PRIME").unwrap().unwrap();
        assert_eq!(store.framework_elements(prime).unwrap().len(), 5);

        let graph = GraphAssembler::new(&store).build().unwrap();
        assert!(graph.edges.iter().any(|e| e.key.starts_with("tension:")));
        let stored = graph.edges.iter().filter(|e| e.key.starts_with("relation:")).count();
        assert_eq!(stored, ontology.relations.len());
        assert_eq!(graph.metadata.skipped_edge_count, 0);
    }

    #[test]
    fn reseeding_changes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ontology = Ontology::builtin().unwrap();
        let first = Seeder::new(&store).seed(&ontology).unwrap();
        let second = Seeder::new(&store).seed(&ontology).unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, first.inserted);
    }

    #[test]
    fn unresolved_relation_is_skipped_and_rest_continue() {
        let yaml = r#"
concepts:
  - { code: A, title: Alpha, conceptType: mechanism, maturity: developing, confidence: supported }
  - { code: B, title: Beta, conceptType: mechanism, maturity: developing, confidence: supported }
relations:
  - { source: A, type: supports, target: MISSING }
  - { source: A, type: supports, target: B, weight: 0.3 }
  - { source: "framework:NOPE", type: informs, target: B }
"#;
        let store = SqliteStore::open_in_memory().unwrap();
        let report = Seeder::new(&store).seed(&Ontology::from_yaml(yaml).unwrap()).unwrap();

        assert_eq!(report.inserted, 3);
        assert_eq!(report.skipped, 2);
        let relations = store.all_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].weight, 0.3);
    }

    #[test]
    fn tension_with_unknown_pole_keeps_the_other() {
        let yaml = r#"
concepts:
  - { code: A, title: Alpha, conceptType: critique, maturity: embryonic, confidence: speculative }
tensions:
  - { code: T, title: Lonely, poleA: A, poleB: GHOST, severity: minor }
"#;
        let store = SqliteStore::open_in_memory().unwrap();
        Seeder::new(&store).seed(&Ontology::from_yaml(yaml).unwrap()).unwrap();
        let tension: Tension = store.load_entity_by_code("T").unwrap().unwrap();
        assert!(tension.pole_a_id.is_some());
        assert_eq!(tension.pole_b_id, None);
        assert_eq!(tension.resolution_status, ResolutionStatus::Unresolved);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = Ontology::from_yaml("concepts: [ { code: A } ]").unwrap_err();
        assert!(matches!(err, SeedError::Parse(_)));
    }
}
