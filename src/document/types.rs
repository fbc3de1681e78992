//! Document records and the pure update planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum Visibility ("visibility") {
        Public => "public",
        Members => "members",
        Private => "private",
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub doc_type: String,
    pub visibility: Visibility,
    pub is_published: bool,
    pub owner_id: String,
    /// Current version; the ledger holds every earlier one.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Archived snapshot of a document's previous content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub id: i64,
    pub document_id: i64,
    pub version: i64,
    pub title: String,
    pub content: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub doc_type: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Row insert produced from a [`NewDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInsert {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub doc_type: String,
    pub visibility: Visibility,
    pub owner_id: String,
    pub at: DateTime<Utc>,
}

/// The outgoing content that an update moves into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedContent {
    pub version: i64,
    pub title: String,
    pub content: String,
}

/// Fully resolved write for one update, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub document_id: i64,
    /// Version the plan was computed against.
    pub expected_version: i64,
    pub title: String,
    pub content: String,
    pub doc_type: String,
    pub visibility: Visibility,
    pub version: i64,
    pub archive: Option<ArchivedContent>,
    pub edited_by: String,
    pub at: DateTime<Utc>,
}

/// Compute the write for `update` against `current`.
///
/// Only a change in content value archives the outgoing content and bumps
/// the version; other fields follow supplied-or-keep.
pub fn plan_update(current: &Document, update: &DocumentUpdate, editor: &str, at: DateTime<Utc>) -> DocumentChange {
    let new_content = update
        .content
        .as_ref()
        .filter(|content| **content != current.content);

    let (content, version, archive) = match new_content {
        Some(content) => (
            content.clone(),
            current.version + 1,
            Some(ArchivedContent {
                version: current.version,
                title: current.title.clone(),
                content: current.content.clone(),
            }),
        ),
        None => (current.content.clone(), current.version, None),
    };

    DocumentChange {
        document_id: current.id,
        expected_version: current.version,
        title: update.title.clone().unwrap_or_else(|| current.title.clone()),
        content,
        doc_type: update.doc_type.clone().unwrap_or_else(|| current.doc_type.clone()),
        visibility: update.visibility.unwrap_or(current.visibility),
        version,
        archive,
        edited_by: editor.to_string(),
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, version: i64) -> Document {
        let now = Utc::now();
        Document {
            id: 9,
            slug: "charter".into(),
            title: "Charter".into(),
            content: content.into(),
            doc_type: "policy".into(),
            visibility: Visibility::Members,
            is_published: false,
            owner_id: "u1".into(),
            version,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn changed_content_archives_outgoing_version() {
        let current = doc("A", 3);
        let change = plan_update(
            &current,
            &DocumentUpdate {
                content: Some("B".into()),
                ..Default::default()
            },
            "u1",
            Utc::now(),
        );
        assert_eq!(change.version, 4);
        assert_eq!(change.content, "B");
        assert_eq!(
            change.archive,
            Some(ArchivedContent {
                version: 3,
                title: "Charter".into(),
                content: "A".into()
            })
        );
        assert_eq!(change.expected_version, 3);
    }

    #[test]
    fn identical_or_missing_content_keeps_version() {
        let current = doc("A", 2);
        let same = plan_update(
            &current,
            &DocumentUpdate {
                content: Some("A".into()),
                title: Some("Renamed".into()),
                ..Default::default()
            },
            "u1",
            Utc::now(),
        );
        assert_eq!(same.version, 2);
        assert!(same.archive.is_none());
        assert_eq!(same.title, "Renamed");

        let none = plan_update(&current, &DocumentUpdate::default(), "u1", Utc::now());
        assert_eq!(none.version, 2);
        assert_eq!(none.visibility, Visibility::Members);
        assert_eq!(none.doc_type, "policy");
    }
}
