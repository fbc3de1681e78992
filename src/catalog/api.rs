//! Catalog operations over a [`Store`].
//!
//! Reads are open to anyone. Writes need an identity: curators manage the
//! ontology, members manage their own proposals, and only admins hard
//! delete.

use chrono::Utc;
use serde_json::json;
use std::fmt;

use super::entities::*;
use super::entity_ref::{CodeRef, EntityRef};
use super::kinds::{EntityKind, LinkType, ProposalStatus};
use super::query::{CatalogQuery, Page};
use crate::activity::{self, ActivityEntry, ActivityRecorder};
use crate::error::{PolisError, PolisResult};
use crate::identity::{require, Identity};
use crate::storage::{CatalogFilter, EntityRow, PageRequest, Store};

/// A filter on a column the kind lacks is rejected rather than ignored.
fn check_filter<E: EntityRow>(filter: &CatalogFilter) -> PolisResult<()> {
    let unsupported = [
        ("type", filter.entity_type.is_some() && E::TYPE_COLUMN.is_none()),
        ("domain", filter.domain.is_some() && E::DOMAIN_COLUMN.is_none()),
        ("status", filter.status.is_some() && E::STATUS_COLUMN.is_none()),
    ];
    match unsupported.iter().find(|(_, rejected)| *rejected) {
        Some((name, _)) => Err(PolisError::validation(format!(
            "{} listings cannot be filtered by {}",
            E::KIND,
            name
        ))),
        None => Ok(()),
    }
}

/// Lookup key for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey<'k> {
    Id(i64),
    Code(&'k str),
}

impl fmt::Display for EntityKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Id(id) => write!(f, "{}", id),
            EntityKey::Code(code) => write!(f, "'{}'", code),
        }
    }
}

/// High-level catalog API bound to one store.
pub struct Catalog<'a, S: Store> {
    store: &'a S,
    activity: &'a dyn ActivityRecorder,
}

impl<'a, S: Store> Catalog<'a, S> {
    pub fn new(store: &'a S, activity: &'a dyn ActivityRecorder) -> Self {
        Self { store, activity }
    }

    // === Reads ===

    pub fn find<E: EntityRow>(&self, key: EntityKey<'_>) -> PolisResult<Option<E>> {
        Ok(match key {
            EntityKey::Id(id) => self.store.load_entity(id)?,
            EntityKey::Code(code) => self.store.load_entity_by_code(code)?,
        })
    }

    /// Like [`find`](Self::find), but a miss is `NotFound`.
    pub fn get<E: EntityRow>(&self, key: EntityKey<'_>) -> PolisResult<E> {
        self.find(key)?
            .ok_or_else(|| PolisError::not_found(format!("{} {} not found", E::KIND, key)))
    }

    /// One page plus the total under the same predicate.
    ///
    /// The count runs as its own query so `total` stays right when the page
    /// is empty.
    pub fn list<E: EntityRow>(&self, query: &CatalogQuery) -> PolisResult<Page<E>> {
        let filter = query.normalized_filter();
        check_filter::<E>(&filter)?;
        let limit = query.effective_limit(E::KIND);
        let offset = query.effective_offset();

        let total = self.store.count_entities::<E>(&filter)?;
        let items = self.store.find_entities::<E>(&filter, PageRequest { limit, offset })?;

        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    pub fn all<E: EntityRow>(&self) -> PolisResult<Vec<E>> {
        Ok(self.store.all_entities()?)
    }

    /// Resolve a polymorphic reference. A dangling reference is `None`.
    pub fn resolve(&self, entity: &EntityRef) -> PolisResult<Option<Entity>> {
        fn load<S: Store, E: EntityRow>(store: &S, id: i64) -> PolisResult<Option<Entity>> {
            Ok(store.load_entity::<E>(id)?.map(Into::into))
        }

        let store = self.store;
        match entity.kind {
            EntityKind::Concept => load::<S, Concept>(store, entity.id),
            EntityKind::Framework => load::<S, Framework>(store, entity.id),
            EntityKind::FrameworkElement => load::<S, FrameworkElement>(store, entity.id),
            EntityKind::Tension => load::<S, Tension>(store, entity.id),
            EntityKind::Evidence => load::<S, Evidence>(store, entity.id),
            EntityKind::Source => load::<S, IntellectualSource>(store, entity.id),
            EntityKind::Actor => load::<S, ActorType>(store, entity.id),
            EntityKind::ArchitectureElement => load::<S, ArchitectureElement>(store, entity.id),
            EntityKind::Proposal => load::<S, Proposal>(store, entity.id),
        }
    }

    pub fn resolve_code(&self, code: &CodeRef) -> PolisResult<Option<EntityRef>> {
        Ok(self
            .store
            .entity_id_by_code(code.kind, &code.code)?
            .map(|id| EntityRef::new(code.kind, id)))
    }

    pub fn evidence_for_concept(&self, concept_id: i64) -> PolisResult<Vec<LinkedEvidence>> {
        Ok(self.store.evidence_for_concept(concept_id)?)
    }

    pub fn framework_elements(&self, framework_id: i64) -> PolisResult<Vec<FrameworkElement>> {
        Ok(self.store.framework_elements(framework_id)?)
    }

    pub fn proposals_for_architecture_element(&self, element_id: i64) -> PolisResult<Vec<Proposal>> {
        Ok(self.store.proposals_for_architecture_element(element_id)?)
    }

    // === Writes ===

    /// Validate and insert a new record. Its `id` is assigned by the store.
    pub fn create<E: EntityRow>(&self, actor: Option<&Identity>, mut entity: E) -> PolisResult<E> {
        let actor = require(actor)?;
        let tagged: Entity = entity.clone().into();
        if !may_write(actor, &tagged) {
            return Err(PolisError::denied(format!("not allowed to create a {}", E::KIND)));
        }
        entity.validate().map_err(PolisError::Validation)?;
        self.check_references(&tagged)?;

        let id = self.store.insert_entity(&entity)?;
        entity.set_id(id);

        activity::record(
            self.activity,
            ActivityEntry::new(Some(actor.user_id.as_str()), format!("{}.created", E::KIND), E::KIND.as_str(), id)
                .with_details(json!({ "code": entity.code() })),
        );
        Ok(entity)
    }

    /// Load, edit and store a record. `id` and `code` survive any edit.
    pub fn update<E: EntityRow>(
        &self,
        actor: Option<&Identity>,
        id: i64,
        edit: impl FnOnce(&mut E),
    ) -> PolisResult<E> {
        let actor = require(actor)?;
        let mut entity: E = self.get(EntityKey::Id(id))?;
        if !may_write(actor, &entity.clone().into()) {
            return Err(PolisError::denied(format!("not allowed to modify {} {}", E::KIND, id)));
        }

        let code = entity.code().to_string();
        edit(&mut entity);
        entity.set_id(id);
        entity.set_code(code);

        entity.validate().map_err(PolisError::Validation)?;
        self.check_references(&entity.clone().into())?;

        if !self.store.update_entity(&entity)? {
            return Err(PolisError::not_found(format!("{} {} not found", E::KIND, id)));
        }
        activity::record(
            self.activity,
            ActivityEntry::new(Some(actor.user_id.as_str()), format!("{}.updated", E::KIND), E::KIND.as_str(), id),
        );
        Ok(entity)
    }

    pub fn update_concept(&self, actor: Option<&Identity>, id: i64, patch: &ConceptPatch) -> PolisResult<Concept> {
        self.update(actor, id, |concept| patch.apply(concept))
    }

    /// Admin-only hard delete.
    pub fn delete<E: EntityRow>(&self, actor: Option<&Identity>, id: i64) -> PolisResult<()> {
        let actor = require(actor)?;
        if !actor.is_admin() {
            return Err(PolisError::denied(format!("only admins may delete a {}", E::KIND)));
        }
        if !self.store.delete_entity::<E>(id)? {
            return Err(PolisError::not_found(format!("{} {} not found", E::KIND, id)));
        }
        activity::record(
            self.activity,
            ActivityEntry::new(Some(actor.user_id.as_str()), format!("{}.deleted", E::KIND), E::KIND.as_str(), id),
        );
        Ok(())
    }

    /// Link evidence to a concept. Linking twice is a no-op.
    pub fn link_evidence(
        &self,
        actor: Option<&Identity>,
        evidence_id: i64,
        concept_id: i64,
        link_type: LinkType,
    ) -> PolisResult<bool> {
        let actor = require(actor)?;
        if !actor.can_curate() {
            return Err(PolisError::denied("curator role required to link evidence"));
        }
        for target in [EntityRef::new(EntityKind::Evidence, evidence_id), EntityRef::concept(concept_id)] {
            if !self.store.entity_exists(&target)? {
                return Err(PolisError::not_found(format!("{} not found", target)));
            }
        }

        let linked = self.store.link_evidence(evidence_id, concept_id, link_type)?;
        if linked {
            activity::record(
                self.activity,
                ActivityEntry::new(Some(actor.user_id.as_str()), "evidence.linked", "evidence", evidence_id)
                    .with_details(json!({ "conceptId": concept_id, "linkType": link_type })),
            );
        }
        Ok(linked)
    }

    // === Proposals ===

    /// Create a proposal authored by `actor`.
    pub fn create_proposal(&self, actor: Option<&Identity>, mut proposal: Proposal) -> PolisResult<Proposal> {
        let author = require(actor)?;
        let now = Utc::now();
        proposal.author_id = author.user_id.clone();
        proposal.created_at = now;
        proposal.updated_at = now;
        self.create(actor, proposal)
    }

    /// Edit a proposal as its author or an admin. The author never changes.
    pub fn update_proposal(
        &self,
        actor: Option<&Identity>,
        id: i64,
        edit: impl FnOnce(&mut Proposal),
    ) -> PolisResult<Proposal> {
        self.update(actor, id, |proposal: &mut Proposal| {
            let author = proposal.author_id.clone();
            let created = proposal.created_at;
            edit(proposal);
            proposal.author_id = author;
            proposal.created_at = created;
            proposal.updated_at = Utc::now();
        })
    }

    pub fn set_proposal_status(
        &self,
        actor: Option<&Identity>,
        id: i64,
        status: ProposalStatus,
    ) -> PolisResult<Proposal> {
        self.update_proposal(actor, id, |proposal| proposal.status = status)
    }

    /// References the store cannot check on its own terms.
    fn check_references(&self, entity: &Entity) -> PolisResult<()> {
        let refs: Vec<EntityRef> = match entity {
            Entity::FrameworkElement(e) => vec![EntityRef::framework(e.framework_id)],
            Entity::Tension(t) => [t.pole_a_id, t.pole_b_id]
                .into_iter()
                .flatten()
                .map(EntityRef::concept)
                .collect(),
            Entity::Proposal(p) => p
                .architecture_element_id
                .map(|id| EntityRef::new(EntityKind::ArchitectureElement, id))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        for target in refs {
            if !self.store.entity_exists(&target)? {
                return Err(PolisError::validation(format!("referenced {} does not exist", target)));
            }
        }
        Ok(())
    }
}

/// Proposals are owned by their author; everything else is curated.
fn may_write(actor: &Identity, entity: &Entity) -> bool {
    match entity {
        Entity::Proposal(p) => actor.may_modify(&p.author_id),
        _ => actor.can_curate(),
    }
}
