//! Activity recording for write operations.
//!
//! Recording is fire-and-forget: a failing recorder is logged and never
//! fails the operation that produced the entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("activity recorder failed: {0}")]
pub struct ActivityError(pub String);

/// One audit-trail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        user_id: Option<&str>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            user_id: user_id.map(str::to_string),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            details: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

pub trait ActivityRecorder: Send + Sync {
    fn record(&self, entry: &ActivityEntry) -> Result<(), ActivityError>;
}

/// Recorder that only emits a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl ActivityRecorder for TracingRecorder {
    fn record(&self, entry: &ActivityEntry) -> Result<(), ActivityError> {
        tracing::info!(
            user = entry.user_id.as_deref().unwrap_or("-"),
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "activity"
        );
        Ok(())
    }
}

/// Hand an entry to the recorder, swallowing failures.
pub fn record(recorder: &dyn ActivityRecorder, entry: ActivityEntry) {
    if let Err(e) = recorder.record(&entry) {
        tracing::warn!(
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            error = %e,
            "dropping activity entry"
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{BrokenRecorder, MemoryRecorder};
    use super::*;

    #[test]
    fn record_swallows_recorder_failures() {
        record(&BrokenRecorder, ActivityEntry::new(Some("u1"), "document.updated", "document", 3));
    }

    #[test]
    fn record_forwards_entries() {
        let recorder = MemoryRecorder::default();
        record(
            &recorder,
            ActivityEntry::new(None, "seed", "ontology", "default")
                .with_details(serde_json::json!({ "inserted": 4 })),
        );
        assert_eq!(recorder.actions(), vec!["seed".to_string()]);
    }

    #[test]
    fn tracing_recorder_never_fails() {
        let entry = ActivityEntry::new(None, "concept.created", "concept", 1);
        assert!(TracingRecorder.record(&entry).is_ok());
    }
}
