//! Cross-evaluator statistics for one proposal.

use super::types::{Dimension, Evaluation, MAX_SCORE, MIN_SCORE};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionAggregate {
    /// Rounded to one decimal; `None` when nobody scored the dimension
    pub mean: Option<f64>,
    pub count: usize,
    /// Always holds every bucket from 1 to 5
    pub distribution: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub evaluation_count: usize,
    pub dimensions: BTreeMap<Dimension, DimensionAggregate>,
    /// Mean of the non-null row totals, one decimal
    pub overall_score: Option<f64>,
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Aggregate the submitted rows among `evaluations`.
///
/// Drafts are ignored. With no submitted row the result is `None`.
pub fn compute_aggregate(evaluations: &[Evaluation]) -> Option<Aggregate> {
    let submitted: Vec<&Evaluation> = evaluations.iter().filter(|e| e.is_submitted()).collect();
    if submitted.is_empty() {
        return None;
    }

    let dimensions = Dimension::ALL
        .iter()
        .map(|&dimension| {
            let scores: Vec<u8> = submitted.iter().filter_map(|e| e.scores.get(dimension)).collect();
            let mut distribution: BTreeMap<u8, usize> = (MIN_SCORE..=MAX_SCORE).map(|s| (s, 0)).collect();
            for score in &scores {
                *distribution.entry(*score).or_insert(0) += 1;
            }
            let aggregate = DimensionAggregate {
                mean: mean(scores.iter().map(|s| f64::from(*s))).map(round1),
                count: scores.len(),
                distribution,
            };
            (dimension, aggregate)
        })
        .collect();

    Some(Aggregate {
        evaluation_count: submitted.len(),
        dimensions,
        overall_score: mean(submitted.iter().filter_map(|e| e.total_score)).map(round1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationStatus, Notes, Scores};
    use chrono::Utc;

    fn eval(status: EvaluationStatus, scores: Scores) -> Evaluation {
        let now = Utc::now();
        Evaluation {
            id: 1,
            proposal_id: 1,
            evaluator_id: "u".into(),
            scores,
            notes: Notes::default(),
            status,
            total_score: scores.total(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
        }
    }

    fn scores(p: Option<u8>, r: Option<u8>) -> Scores {
        Scores {
            practicality: p,
            rights: r,
            ..Default::default()
        }
    }

    #[test]
    fn no_submitted_rows_is_none() {
        assert!(compute_aggregate(&[]).is_none());
        let drafts = [eval(EvaluationStatus::Draft, scores(Some(5), None))];
        assert!(compute_aggregate(&drafts).is_none());
    }

    #[test]
    fn means_counts_and_histogram() {
        let rows = [
            eval(EvaluationStatus::Submitted, scores(Some(4), Some(2))),
            eval(EvaluationStatus::Submitted, scores(Some(5), None)),
            eval(EvaluationStatus::Submitted, scores(Some(4), Some(3))),
            eval(EvaluationStatus::Draft, scores(Some(1), Some(1))),
        ];
        let agg = compute_aggregate(&rows).unwrap();
        assert_eq!(agg.evaluation_count, 3);

        let practicality = &agg.dimensions[&Dimension::Practicality];
        assert_eq!(practicality.count, 3);
        assert_eq!(practicality.mean, Some(4.3));
        assert_eq!(practicality.distribution[&4], 2);
        assert_eq!(practicality.distribution[&1], 0);
        assert_eq!(practicality.distribution.len(), 5);

        let rights = &agg.dimensions[&Dimension::Rights];
        assert_eq!(rights.count, 2);
        assert_eq!(rights.mean, Some(2.5));

        let equity = &agg.dimensions[&Dimension::Equity];
        assert_eq!(equity.count, 0);
        assert_eq!(equity.mean, None);

        // totals: 3.0, 5.0, 3.5
        assert_eq!(agg.overall_score, Some(3.8));
    }

    #[test]
    fn rows_without_total_are_left_out_of_overall() {
        let rows = [
            eval(EvaluationStatus::Submitted, Scores::default()),
            eval(EvaluationStatus::Submitted, scores(Some(2), None)),
        ];
        let agg = compute_aggregate(&rows).unwrap();
        assert_eq!(agg.evaluation_count, 2);
        assert_eq!(agg.overall_score, Some(2.0));
    }

    #[test]
    fn serializes_with_string_keys() {
        let rows = [eval(EvaluationStatus::Submitted, scores(Some(3), None))];
        let value = serde_json::to_value(compute_aggregate(&rows).unwrap()).unwrap();
        assert_eq!(value["dimensions"]["practicality"]["distribution"]["3"], 1);
        assert_eq!(value["evaluationCount"], 1);
    }
}
