//! Typed Relation Graph: directed edges between polymorphic endpoints.
//!
//! Edges of a bidirectional type are stored once with a fixed source and
//! target but are reported from both ends.

mod edge;

pub use edge::{relation_types, NewRelation, Relation};

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::activity::{self, ActivityEntry, ActivityRecorder};
use crate::catalog::{Catalog, Entity, EntityRef};
use crate::error::{PolisError, PolisResult};
use crate::identity::{require, Identity};
use crate::storage::{Endpoint, Store};

/// Direction for edge lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Edges leaving the entity
    #[default]
    Outgoing,
    /// Edges arriving at the entity
    Incoming,
    Both,
}

/// Result of [`RelationGraph::insert_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// The 5-tuple already existed; nothing was written.
    Duplicate,
}

/// An edge together with the entity at its far end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub relation: Relation,
    pub entity: Entity,
}

pub struct RelationGraph<'a, S: Store> {
    store: &'a S,
    activity: &'a dyn ActivityRecorder,
}

impl<'a, S: Store> RelationGraph<'a, S> {
    pub fn new(store: &'a S, activity: &'a dyn ActivityRecorder) -> Self {
        Self { store, activity }
    }

    /// Insert an edge; first write wins.
    ///
    /// Repeating an existing `(source, type, target)` is not an error.
    pub fn insert_edge(&self, actor: Option<&Identity>, edge: &NewRelation) -> PolisResult<InsertOutcome> {
        let actor = require(actor)?;
        if !actor.can_curate() {
            return Err(PolisError::denied("curator role required to add relations"));
        }
        edge.validate().map_err(PolisError::Validation)?;
        for endpoint in [edge.source, edge.target] {
            if !self.store.entity_exists(&endpoint)? {
                return Err(PolisError::validation(format!("relation endpoint {} does not exist", endpoint)));
            }
        }

        match self.store.insert_relation(edge)? {
            Some(id) => {
                activity::record(
                    self.activity,
                    ActivityEntry::new(Some(actor.user_id.as_str()), "relation.created", "relation", id)
                        .with_details(json!({
                            "source": edge.source.key(),
                            "type": edge.relation_type,
                            "target": edge.target.key(),
                        })),
                );
                Ok(InsertOutcome::Inserted(id))
            }
            None => {
                tracing::debug!(
                    source = %edge.source,
                    relation_type = %edge.relation_type,
                    target = %edge.target,
                    "relation already exists"
                );
                Ok(InsertOutcome::Duplicate)
            }
        }
    }

    pub fn delete_edge(&self, actor: Option<&Identity>, id: i64) -> PolisResult<()> {
        let actor = require(actor)?;
        if !actor.can_curate() {
            return Err(PolisError::denied("curator role required to remove relations"));
        }
        if !self.store.delete_relation(id)? {
            return Err(PolisError::not_found(format!("relation {} not found", id)));
        }
        activity::record(
            self.activity,
            ActivityEntry::new(Some(actor.user_id.as_str()), "relation.deleted", "relation", id),
        );
        Ok(())
    }

    pub fn outbound(&self, entity: &EntityRef) -> PolisResult<Vec<Relation>> {
        self.edges(entity, Direction::Outgoing)
    }

    pub fn inbound(&self, entity: &EntityRef) -> PolisResult<Vec<Relation>> {
        self.edges(entity, Direction::Incoming)
    }

    pub fn both(&self, entity: &EntityRef) -> PolisResult<Vec<Relation>> {
        self.edges(entity, Direction::Both)
    }

    /// Edges at `entity`, ordered by type then descending weight.
    pub fn edges(&self, entity: &EntityRef, direction: Direction) -> PolisResult<Vec<Relation>> {
        let from = self.store.relations_at(Endpoint::Source, entity)?;
        let to = self.store.relations_at(Endpoint::Target, entity)?;

        let selected: Vec<Relation> = match direction {
            Direction::Outgoing => from
                .into_iter()
                .chain(to.into_iter().filter(|r| r.is_bidirectional))
                .collect(),
            Direction::Incoming => to
                .into_iter()
                .chain(from.into_iter().filter(|r| r.is_bidirectional))
                .collect(),
            Direction::Both => from.into_iter().chain(to).collect(),
        };

        // Self-loops and bidirectional edges can show up from both ends.
        let unique: BTreeMap<i64, Relation> = selected.into_iter().map(|r| (r.id, r)).collect();
        let mut edges: Vec<Relation> = unique.into_values().collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    /// Edges at `entity` with their far endpoint resolved.
    ///
    /// Dangling endpoints are skipped.
    pub fn neighbors(&self, entity: &EntityRef, direction: Direction) -> PolisResult<Vec<Neighbor>> {
        let catalog = Catalog::new(self.store, self.activity);
        let mut neighbors = Vec::new();
        for relation in self.edges(entity, direction)? {
            let Some(far) = relation.other_end(entity) else {
                continue;
            };
            match catalog.resolve(&far)? {
                Some(found) => neighbors.push(Neighbor {
                    relation,
                    entity: found,
                }),
                None => tracing::debug!(relation = relation.id, endpoint = %far, "skipping dangling relation"),
            }
        }
        Ok(neighbors)
    }
}

fn sort_edges(edges: &mut [Relation]) {
    edges.sort_by(|a, b| {
        a.relation_type
            .cmp(&b.relation_type)
            .then(b.weight.total_cmp(&a.weight))
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::testing::MemoryRecorder;
    use crate::catalog::{Concept, ConceptType, EntityKind};
    use crate::identity::Role;
    use crate::storage::{OpenStore, SqliteStore};

    struct Fixture {
        store: SqliteStore,
        recorder: MemoryRecorder,
        curator: Identity,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: SqliteStore::open_in_memory().unwrap(),
                recorder: MemoryRecorder::default(),
                curator: Identity::new("cura", Role::Curator),
            }
        }

        fn graph(&self) -> RelationGraph<'_, SqliteStore> {
            RelationGraph::new(&self.store, &self.recorder)
        }

        fn concept(&self, code: &str) -> EntityRef {
            let c = Catalog::new(&self.store, &self.recorder)
                .create(Some(&self.curator), Concept::new(code, code, ConceptType::Mechanism))
                .unwrap();
            EntityRef::concept(c.id)
        }
    }

    #[test]
    fn insert_twice_leaves_one_row() {
        let fx = Fixture::new();
        let (a, b) = (fx.concept("A"), fx.concept("B"));
        let edge = NewRelation::new(a, relation_types::SUPPORTS, b);

        assert!(matches!(
            fx.graph().insert_edge(Some(&fx.curator), &edge).unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(
            fx.graph().insert_edge(Some(&fx.curator), &edge).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(fx.store.all_relations().unwrap().len(), 1);
    }

    #[test]
    fn insert_checks_endpoints_and_role() {
        let fx = Fixture::new();
        let a = fx.concept("A");
        let edge = NewRelation::new(a, relation_types::SUPPORTS, EntityRef::framework(77));
        assert_eq!(fx.graph().insert_edge(Some(&fx.curator), &edge).unwrap_err().status(), 400);

        let member = Identity::member("m");
        let edge = NewRelation::new(a, relation_types::SUPPORTS, a);
        assert_eq!(fx.graph().insert_edge(Some(&member), &edge).unwrap_err().status(), 403);
    }

    #[test]
    fn bidirectional_edges_are_seen_from_both_ends() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.concept("A"), fx.concept("B"), fx.concept("C"));
        let graph = fx.graph();
        graph
            .insert_edge(Some(&fx.curator), &NewRelation::new(a, relation_types::CONFLICTS_WITH, b))
            .unwrap();
        graph
            .insert_edge(Some(&fx.curator), &NewRelation::new(a, relation_types::ENABLES, c))
            .unwrap();

        let from_b = graph.outbound(&b).unwrap();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].relation_type, relation_types::CONFLICTS_WITH);

        // Directed edges stay directed.
        assert!(graph.outbound(&c).unwrap().is_empty());
        assert_eq!(graph.inbound(&c).unwrap().len(), 1);
        assert_eq!(graph.both(&a).unwrap().len(), 2);
    }

    #[test]
    fn edges_ordered_by_type_then_weight() {
        let fx = Fixture::new();
        let (a, b, c, d) = (fx.concept("A"), fx.concept("B"), fx.concept("C"), fx.concept("D"));
        let graph = fx.graph();
        for (target, ty, w) in [(b, "supports", 0.4), (c, "informs", 0.2), (d, "supports", 0.9)] {
            graph
                .insert_edge(Some(&fx.curator), &NewRelation::new(a, ty, target).with_weight(w))
                .unwrap();
        }
        let order: Vec<(String, EntityRef)> = graph
            .outbound(&a)
            .unwrap()
            .into_iter()
            .map(|r| (r.relation_type, r.target))
            .collect();
        assert_eq!(
            order,
            vec![("informs".into(), c), ("supports".into(), d), ("supports".into(), b)]
        );
    }

    #[test]
    fn neighbors_skip_dangling_endpoints() {
        let fx = Fixture::new();
        let (a, b) = (fx.concept("A"), fx.concept("B"));
        fx.graph()
            .insert_edge(Some(&fx.curator), &NewRelation::new(a, relation_types::REQUIRES, b))
            .unwrap();
        // Written straight to the store, as a stale seed or a later delete would leave it.
        fx.store
            .insert_relation(&NewRelation::new(a, relation_types::REQUIRES, EntityRef::new(EntityKind::Evidence, 404)))
            .unwrap();

        let neighbors = fx.graph().neighbors(&a, Direction::Outgoing).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].entity.title(), "B");
    }

    #[test]
    fn delete_edge_is_curated_and_logged() {
        let fx = Fixture::new();
        let (a, b) = (fx.concept("A"), fx.concept("B"));
        let InsertOutcome::Inserted(id) = fx
            .graph()
            .insert_edge(Some(&fx.curator), &NewRelation::new(a, relation_types::INFORMS, b))
            .unwrap()
        else {
            panic!("expected a new row");
        };

        let member = Identity::member("m");
        assert_eq!(fx.graph().delete_edge(Some(&member), id).unwrap_err().status(), 403);
        fx.graph().delete_edge(Some(&fx.curator), id).unwrap();
        assert_eq!(fx.graph().delete_edge(Some(&fx.curator), id).unwrap_err().status(), 404);
        assert!(fx.graph().outbound(&a).unwrap().is_empty());
        assert!(fx.recorder.actions().contains(&"relation.deleted".to_string()));
    }
}
