//! Graph Assembler: catalog + relations + tension poles → one renderable graph.

use std::collections::{BTreeSet, HashSet};

use super::edge::GraphEdge;
use super::node::GraphNode;
use crate::catalog::{Concept, EntityKind, EntityRef, Framework, FrameworkElement, Tension};
use crate::error::PolisResult;
use crate::relation::Relation;
use crate::storage::Store;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    /// Stored relations left out because an endpoint no longer resolves
    pub skipped_edge_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

/// Everything the projection reads.
#[derive(Debug, Clone, Default)]
pub struct GraphSources {
    pub concepts: Vec<Concept>,
    pub frameworks: Vec<Framework>,
    pub elements: Vec<FrameworkElement>,
    pub tensions: Vec<Tension>,
    pub relations: Vec<Relation>,
    /// Relation endpoints outside the node kinds that still resolve
    pub endpoints: BTreeSet<EntityRef>,
}

/// Kinds projected as nodes; every other endpoint kind is edge-only.
fn is_node_kind(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Concept | EntityKind::Framework | EntityKind::FrameworkElement
    )
}

/// Project the sources into nodes and edges.
///
/// Node keys are namespaced by kind, so a concept and a framework sharing an
/// id stay distinct. Stored relations are kept whenever both endpoints
/// resolve, even when one of them (a source, an actor) has no node. An edge
/// with a dangling endpoint is dropped and counted, never an error.
pub fn assemble(sources: &GraphSources) -> VisualizationGraph {
    let nodes: Vec<GraphNode> = sources
        .concepts
        .iter()
        .map(GraphNode::from_concept)
        .chain(sources.frameworks.iter().map(GraphNode::from_framework))
        .chain(sources.elements.iter().map(GraphNode::from_element))
        .collect();

    let endpoint_keys: Vec<String> = sources.endpoints.iter().map(EntityRef::key).collect();
    let keys: HashSet<&str> = nodes
        .iter()
        .map(|n| n.key.as_str())
        .chain(endpoint_keys.iter().map(String::as_str))
        .collect();

    let candidates = sources
        .relations
        .iter()
        .map(GraphEdge::from_relation)
        .chain(sources.tensions.iter().filter_map(GraphEdge::from_tension))
        .chain(sources.elements.iter().map(GraphEdge::membership));

    let mut edges = Vec::new();
    let mut skipped = 0;
    for edge in candidates {
        if keys.contains(edge.source.as_str()) && keys.contains(edge.target.as_str()) {
            edges.push(edge);
        } else {
            tracing::debug!(edge = %edge.key, source = %edge.source, target = %edge.target, "skipping edge with dangling endpoint");
            skipped += 1;
        }
    }

    let metadata = GraphMetadata {
        node_count: nodes.len(),
        edge_count: edges.len(),
        skipped_edge_count: skipped,
    };
    VisualizationGraph { nodes, edges, metadata }
}

/// Reads the sources from a store and assembles them.
pub struct GraphAssembler<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> GraphAssembler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn load_sources(&self) -> PolisResult<GraphSources> {
        let relations = self.store.all_relations()?;

        let mut endpoints = BTreeSet::new();
        let mut checked = HashSet::new();
        for entity in relations.iter().flat_map(|r| [r.source, r.target]) {
            if is_node_kind(entity.kind) || !checked.insert(entity) {
                continue;
            }
            if self.store.entity_exists(&entity)? {
                endpoints.insert(entity);
            }
        }

        Ok(GraphSources {
            concepts: self.store.all_entities()?,
            frameworks: self.store.all_entities()?,
            elements: self.store.all_entities()?,
            tensions: self.store.all_entities()?,
            relations,
            endpoints,
        })
    }

    pub fn build(&self) -> PolisResult<VisualizationGraph> {
        let graph = assemble(&self.load_sources()?);
        tracing::debug!(
            nodes = graph.metadata.node_count,
            edges = graph.metadata.edge_count,
            skipped = graph.metadata.skipped_edge_count,
            "assembled visualization graph"
        );
        Ok(graph)
    }
}
