//! PRIME evaluation records and score validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

string_enum! {
    /// The five PRIME axes.
    pub enum Dimension ("PRIME dimension") {
        Practicality => "practicality",
        Rights => "rights",
        Implementation => "implementation",
        Monitoring => "monitoring",
        Equity => "equity",
    }
}

string_enum! {
    pub enum EvaluationStatus ("evaluation status") {
        Draft => "draft",
        Submitted => "submitted",
    }
}

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// One optional integer score per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub practicality: Option<u8>,
    pub rights: Option<u8>,
    pub implementation: Option<u8>,
    pub monitoring: Option<u8>,
    pub equity: Option<u8>,
}

impl Scores {
    pub fn get(&self, dimension: Dimension) -> Option<u8> {
        match dimension {
            Dimension::Practicality => self.practicality,
            Dimension::Rights => self.rights,
            Dimension::Implementation => self.implementation,
            Dimension::Monitoring => self.monitoring,
            Dimension::Equity => self.equity,
        }
    }

    pub fn set(&mut self, dimension: Dimension, score: Option<u8>) {
        let slot = match dimension {
            Dimension::Practicality => &mut self.practicality,
            Dimension::Rights => &mut self.rights,
            Dimension::Implementation => &mut self.implementation,
            Dimension::Monitoring => &mut self.monitoring,
            Dimension::Equity => &mut self.equity,
        };
        *slot = score;
    }

    /// Arithmetic mean of the scores that are present.
    pub fn total(&self) -> Option<f64> {
        let present: Vec<f64> = Dimension::ALL
            .iter()
            .filter_map(|d| self.get(*d))
            .map(f64::from)
            .collect();
        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
    }
}

/// Free-text rationale per dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notes {
    pub practicality: Option<String>,
    pub rights: Option<String>,
    pub implementation: Option<String>,
    pub monitoring: Option<String>,
    pub equity: Option<String>,
}

impl Notes {
    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Practicality => self.practicality.as_deref(),
            Dimension::Rights => self.rights.as_deref(),
            Dimension::Implementation => self.implementation.as_deref(),
            Dimension::Monitoring => self.monitoring.as_deref(),
            Dimension::Equity => self.equity.as_deref(),
        }
    }
}

/// A stored evaluation; one per `(proposal_id, evaluator_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: i64,
    pub proposal_id: i64,
    pub evaluator_id: String,
    pub scores: Scores,
    pub notes: Notes,
    pub status: EvaluationStatus,
    pub total_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    pub fn is_submitted(&self) -> bool {
        self.status == EvaluationStatus::Submitted
    }
}

/// Client payload for saving an evaluation.
///
/// Scores arrive untyped so that a non-integer can be reported per
/// dimension instead of failing deserialization as a whole. They may be
/// nested under `scores` or given at the top level; any other top-level key
/// is treated as a dimension name and so rejected when it is not one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    pub proposal_id: Option<i64>,
    #[serde(default)]
    pub scores: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub notes: Notes,
    #[serde(default)]
    pub status: Option<EvaluationStatus>,
    #[serde(flatten)]
    pub top_level: BTreeMap<String, serde_json::Value>,
}

impl EvaluationInput {
    /// Nested and top-level scores merged; a dimension given in both places
    /// is an error.
    pub fn raw_scores(&self) -> Result<BTreeMap<String, serde_json::Value>, ScoreError> {
        let mut merged = self.scores.clone();
        for (name, value) in &self.top_level {
            if merged.insert(name.clone(), value.clone()).is_some() {
                return Err(ScoreError::Repeated(name.clone()));
            }
        }
        Ok(merged)
    }

    /// Validated scores from both locations.
    pub fn validated_scores(&self) -> Result<Scores, ScoreError> {
        validate_scores(&self.raw_scores()?)
    }
}

/// Validated write handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationWrite {
    pub proposal_id: i64,
    pub evaluator_id: String,
    pub scores: Scores,
    pub notes: Notes,
    pub status: EvaluationStatus,
    pub total_score: Option<f64>,
    pub at: DateTime<Utc>,
}

/// Why a score was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreError {
    UnknownDimension(String),
    Repeated(String),
    OutOfRange { dimension: Dimension, value: String },
}

impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDimension(name) => write!(f, "unknown PRIME dimension '{}'", name),
            Self::Repeated(name) => write!(f, "score for '{}' given twice", name),
            Self::OutOfRange { dimension, value } => write!(
                f,
                "{} score must be an integer between {} and {} (got {})",
                dimension, MIN_SCORE, MAX_SCORE, value
            ),
        }
    }
}

/// Validate every supplied score; the first bad one rejects the whole set.
///
/// `null` clears a dimension. Integral floats such as `4.0` are accepted.
pub fn validate_scores(raw: &BTreeMap<String, serde_json::Value>) -> Result<Scores, ScoreError> {
    let mut scores = Scores::default();
    for (name, value) in raw {
        let dimension: Dimension = name
            .parse()
            .map_err(|_| ScoreError::UnknownDimension(name.clone()))?;
        let score = match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => {
                let integral = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
                match integral {
                    Some(v) if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&v) => Some(v as u8),
                    _ => {
                        return Err(ScoreError::OutOfRange {
                            dimension,
                            value: value.to_string(),
                        })
                    }
                }
            }
            other => {
                return Err(ScoreError::OutOfRange {
                    dimension,
                    value: other.to_string(),
                })
            }
        };
        scores.set(dimension, score);
    }
    Ok(scores)
}
