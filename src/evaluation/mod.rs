//! PRIME Evaluation Engine
//!
//! One evaluation per `(proposal, evaluator)`. A second save by the same
//! evaluator updates the row in place; the store's unique key settles
//! concurrent saves. Drafts are private to their evaluator and admins.

mod aggregate;
mod types;

pub use aggregate::{compute_aggregate, round1, Aggregate, DimensionAggregate};
pub use types::{
    validate_scores, Dimension, Evaluation, EvaluationInput, EvaluationStatus, EvaluationWrite, Notes, ScoreError,
    Scores, MAX_SCORE, MIN_SCORE,
};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::activity::{self, ActivityEntry, ActivityRecorder};
use crate::catalog::{EntityKind, EntityRef};
use crate::error::{PolisError, PolisResult};
use crate::identity::{require, Identity};
use crate::storage::Store;

/// Evaluations of one proposal as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalEvaluations {
    pub evaluations: Vec<Evaluation>,
    /// Over every submitted row, whoever is looking
    pub aggregate: Option<Aggregate>,
}

pub struct EvaluationEngine<'a, S: Store> {
    store: &'a S,
    activity: &'a dyn ActivityRecorder,
}

fn visible_to(evaluation: &Evaluation, viewer: Option<&Identity>) -> bool {
    evaluation.is_submitted() || viewer.is_some_and(|v| v.may_modify(&evaluation.evaluator_id))
}

impl<'a, S: Store> EvaluationEngine<'a, S> {
    pub fn new(store: &'a S, activity: &'a dyn ActivityRecorder) -> Self {
        Self { store, activity }
    }

    /// Save the caller's evaluation of `input.proposal_id`.
    ///
    /// Every score is checked before anything is written.
    pub fn save(&self, identity: Option<&Identity>, input: &EvaluationInput) -> PolisResult<Evaluation> {
        let evaluator = require(identity)?;
        let proposal_id = input
            .proposal_id
            .ok_or_else(|| PolisError::validation("proposalId is required"))?;
        let scores = input.validated_scores().map_err(|e| PolisError::Validation(e.to_string()))?;
        self.require_proposal(proposal_id)?;

        self.write(evaluator, proposal_id, &evaluator.user_id, scores, input)
    }

    /// Update evaluation `id` as its evaluator or an admin.
    ///
    /// Goes through the same upsert as [`save`](Self::save); the row keeps
    /// its evaluator.
    pub fn update(&self, identity: Option<&Identity>, id: i64, input: &EvaluationInput) -> PolisResult<Evaluation> {
        let editor = require(identity)?;
        let scores = input.validated_scores().map_err(|e| PolisError::Validation(e.to_string()))?;

        let existing = self
            .store
            .load_evaluation(id)?
            .filter(|e| visible_to(e, Some(editor)))
            .ok_or_else(|| PolisError::not_found(format!("evaluation {} not found", id)))?;
        if !editor.may_modify(&existing.evaluator_id) {
            return Err(PolisError::denied("only the evaluator or an admin may edit this evaluation"));
        }
        if input.proposal_id.is_some_and(|p| p != existing.proposal_id) {
            return Err(PolisError::validation("proposalId does not match the evaluation"));
        }

        self.write(editor, existing.proposal_id, &existing.evaluator_id, scores, input)
    }

    fn write(
        &self,
        actor: &Identity,
        proposal_id: i64,
        evaluator_id: &str,
        scores: Scores,
        input: &EvaluationInput,
    ) -> PolisResult<Evaluation> {
        let write = EvaluationWrite {
            proposal_id,
            evaluator_id: evaluator_id.to_string(),
            scores,
            notes: input.notes.clone(),
            status: input.status.unwrap_or(EvaluationStatus::Draft),
            total_score: scores.total(),
            at: Utc::now(),
        };
        let saved = self.store.upsert_evaluation(&write)?;

        let action = match write.status {
            EvaluationStatus::Submitted => "evaluation.submitted",
            EvaluationStatus::Draft => "evaluation.saved",
        };
        activity::record(
            self.activity,
            ActivityEntry::new(Some(actor.user_id.as_str()), action, "evaluation", saved.id)
                .with_details(json!({ "proposalId": proposal_id, "totalScore": saved.total_score })),
        );
        Ok(saved)
    }

    /// A single evaluation; a draft the viewer may not see is `NotFound`.
    pub fn get(&self, viewer: Option<&Identity>, id: i64) -> PolisResult<Evaluation> {
        self.store
            .load_evaluation(id)?
            .filter(|e| visible_to(e, viewer))
            .ok_or_else(|| PolisError::not_found(format!("evaluation {} not found", id)))
    }

    /// Visible evaluations of a proposal plus the aggregate.
    pub fn for_proposal(&self, viewer: Option<&Identity>, proposal_id: i64) -> PolisResult<ProposalEvaluations> {
        self.require_proposal(proposal_id)?;
        let rows = self.store.evaluations_for_proposal(proposal_id, None)?;
        let aggregate = compute_aggregate(&rows);
        let evaluations = rows.into_iter().filter(|e| visible_to(e, viewer)).collect();
        Ok(ProposalEvaluations { evaluations, aggregate })
    }

    /// `None` iff the proposal has no submitted evaluation.
    pub fn aggregate(&self, proposal_id: i64) -> PolisResult<Option<Aggregate>> {
        let submitted = self
            .store
            .evaluations_for_proposal(proposal_id, Some(EvaluationStatus::Submitted))?;
        Ok(compute_aggregate(&submitted))
    }

    fn require_proposal(&self, proposal_id: i64) -> PolisResult<()> {
        if self
            .store
            .entity_exists(&EntityRef::new(EntityKind::Proposal, proposal_id))?
        {
            Ok(())
        } else {
            Err(PolisError::not_found(format!("proposal {} not found", proposal_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::testing::MemoryRecorder;
    use crate::catalog::Proposal;
    use crate::storage::{OpenStore, SqliteStore};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn setup() -> (SqliteStore, MemoryRecorder, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let proposal_id = store.insert_entity(&Proposal::new("P-1", "Land trust", "author")).unwrap();
        (store, MemoryRecorder::default(), proposal_id)
    }

    fn input(proposal_id: i64, scores: &[(&str, Value)], status: EvaluationStatus) -> EvaluationInput {
        EvaluationInput {
            proposal_id: Some(proposal_id),
            scores: scores
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            notes: Notes::default(),
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn second_save_updates_in_place() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");

        let first = engine
            .save(Some(&alice), &input(pid, &[("practicality", json!(2))], EvaluationStatus::Draft))
            .unwrap();
        let second = engine
            .save(Some(&alice), &input(pid, &[("practicality", json!(4))], EvaluationStatus::Submitted))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.scores.practicality, Some(4));
        assert_eq!(second.status, EvaluationStatus::Submitted);
        assert!(second.submitted_at.is_some());
        assert_eq!(store.evaluations_for_proposal(pid, None).unwrap().len(), 1);
        assert_eq!(recorder.actions(), vec!["evaluation.saved", "evaluation.submitted"]);
    }

    #[test]
    fn invalid_scores_reject_the_whole_write() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");

        for bad in [json!(6), json!(2.5), json!("3"), json!(0)] {
            let err = engine
                .save(
                    Some(&alice),
                    &input(pid, &[("equity", json!(3)), ("rights", bad)], EvaluationStatus::Submitted),
                )
                .unwrap_err();
            assert_eq!(err.status(), 400);
            assert!(err.to_string().starts_with("rights score"), "{}", err);
        }
        assert!(store.evaluations_for_proposal(pid, None).unwrap().is_empty());
        assert!(recorder.actions().is_empty());
    }

    #[test]
    fn save_requires_identity_and_known_proposal() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let draft = input(pid, &[], EvaluationStatus::Draft);
        assert_eq!(engine.save(None, &draft).unwrap_err().status(), 401);

        let missing = input(pid + 100, &[], EvaluationStatus::Draft);
        assert_eq!(engine.save(Some(&Identity::member("a")), &missing).unwrap_err().status(), 404);

        let no_proposal = EvaluationInput::default();
        assert_eq!(engine.save(Some(&Identity::member("a")), &no_proposal).unwrap_err().status(), 400);
    }

    #[test]
    fn drafts_are_hidden_from_others() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");
        let bob = Identity::member("bob");

        let draft = engine
            .save(Some(&alice), &input(pid, &[("monitoring", json!(3))], EvaluationStatus::Draft))
            .unwrap();
        engine
            .save(Some(&bob), &input(pid, &[("monitoring", json!(5))], EvaluationStatus::Submitted))
            .unwrap();

        assert_eq!(engine.get(Some(&bob), draft.id).unwrap_err().status(), 404);
        assert_eq!(engine.get(None, draft.id).unwrap_err().status(), 404);
        assert!(engine.get(Some(&alice), draft.id).is_ok());
        assert!(engine.get(Some(&Identity::admin("root")), draft.id).is_ok());

        let seen_by_bob = engine.for_proposal(Some(&bob), pid).unwrap();
        assert_eq!(seen_by_bob.evaluations.len(), 1);
        let seen_by_alice = engine.for_proposal(Some(&alice), pid).unwrap();
        assert_eq!(seen_by_alice.evaluations.len(), 2);

        // only bob's submitted row counts
        let agg = seen_by_alice.aggregate.unwrap();
        assert_eq!(agg.evaluation_count, 1);
        assert_eq!(agg.dimensions[&Dimension::Monitoring].mean, Some(5.0));
    }

    #[test]
    fn aggregate_is_none_until_something_is_submitted() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");

        assert!(engine.aggregate(pid).unwrap().is_none());
        engine
            .save(Some(&alice), &input(pid, &[("rights", json!(4))], EvaluationStatus::Draft))
            .unwrap();
        assert!(engine.aggregate(pid).unwrap().is_none());
        engine
            .save(Some(&alice), &input(pid, &[("rights", json!(4))], EvaluationStatus::Submitted))
            .unwrap();
        assert!(engine.aggregate(pid).unwrap().is_some());
    }

    #[test]
    fn submission_is_sticky() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");

        let submitted = engine
            .save(Some(&alice), &input(pid, &[("rights", json!(4))], EvaluationStatus::Submitted))
            .unwrap();
        let resaved = engine
            .save(Some(&alice), &input(pid, &[("rights", json!(2))], EvaluationStatus::Draft))
            .unwrap();
        assert_eq!(resaved.status, EvaluationStatus::Submitted);
        assert_eq!(resaved.scores.rights, Some(2));
        assert_eq!(resaved.submitted_at, submitted.submitted_at);
    }

    #[test]
    fn update_is_owner_or_admin() {
        let (store, recorder, pid) = setup();
        let engine = EvaluationEngine::new(&store, &recorder);
        let alice = Identity::member("alice");
        let saved = engine
            .save(Some(&alice), &input(pid, &[("equity", json!(1))], EvaluationStatus::Submitted))
            .unwrap();

        let change = input(pid, &[("equity", json!(5))], EvaluationStatus::Submitted);
        assert_eq!(
            engine.update(Some(&Identity::member("bob")), saved.id, &change).unwrap_err().status(),
            403
        );
        let by_admin = engine.update(Some(&Identity::admin("root")), saved.id, &change).unwrap();
        assert_eq!(by_admin.id, saved.id);
        assert_eq!(by_admin.evaluator_id, "alice");
        assert_eq!(by_admin.scores.equity, Some(5));
    }
}
