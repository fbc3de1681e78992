//! Document Version Ledger
//!
//! A content-changing update first archives the outgoing content under the
//! outgoing version number, then bumps the version by one. Both steps run in
//! one store transaction, so the ledger per document is gapless from 1.

mod slug;
mod types;

pub use slug::{slugify, unique_slug};
pub use types::{
    plan_update, ArchivedContent, Document, DocumentChange, DocumentInsert, DocumentUpdate, DocumentVersion,
    NewDocument, Visibility,
};

use chrono::Utc;
use serde_json::json;
use std::fmt;

use crate::activity::{self, ActivityEntry, ActivityRecorder};
use crate::error::{PolisError, PolisResult};
use crate::identity::{require, Identity};
use crate::storage::Store;

/// Document type used when the creator gives none.
pub const DEFAULT_DOC_TYPE: &str = "note";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKey<'k> {
    Id(i64),
    Slug(&'k str),
}

impl fmt::Display for DocumentKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Id(id) => write!(f, "{}", id),
            DocumentKey::Slug(slug) => write!(f, "'{}'", slug),
        }
    }
}

/// Whether `viewer` may read `document`.
///
/// Owners and admins always can. Anyone else needs the document published,
/// and then `members` needs an identity while `private` stays closed.
pub fn can_read(document: &Document, viewer: Option<&Identity>) -> bool {
    if viewer.is_some_and(|v| v.may_modify(&document.owner_id)) {
        return true;
    }
    if !document.is_published {
        return false;
    }
    match document.visibility {
        Visibility::Public => true,
        Visibility::Members => viewer.is_some(),
        Visibility::Private => false,
    }
}

pub struct DocumentLedger<'a, S: Store> {
    store: &'a S,
    activity: &'a dyn ActivityRecorder,
}

impl<'a, S: Store> DocumentLedger<'a, S> {
    pub fn new(store: &'a S, activity: &'a dyn ActivityRecorder) -> Self {
        Self { store, activity }
    }

    pub fn create(&self, identity: Option<&Identity>, new: &NewDocument) -> PolisResult<Document> {
        let owner = require(identity)?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(PolisError::validation("title is required"));
        }

        let base = match new.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => slugify(requested),
            None => slugify(title),
        };
        let slug = unique_slug(&base, |candidate| self.store.slug_exists(candidate))?;

        let document = self.store.insert_document(&DocumentInsert {
            slug,
            title: title.to_string(),
            content: new.content.clone(),
            doc_type: new.doc_type.clone().unwrap_or_else(|| DEFAULT_DOC_TYPE.to_string()),
            visibility: new.visibility.unwrap_or_default(),
            owner_id: owner.user_id.clone(),
            at: Utc::now(),
        })?;

        activity::record(
            self.activity,
            ActivityEntry::new(Some(owner.user_id.as_str()), "document.created", "document", document.id)
                .with_details(json!({ "slug": document.slug })),
        );
        Ok(document)
    }

    /// Documents the viewer may not read are reported as missing.
    pub fn get(&self, viewer: Option<&Identity>, key: DocumentKey<'_>) -> PolisResult<Document> {
        let found = match key {
            DocumentKey::Id(id) => self.store.load_document(id)?,
            DocumentKey::Slug(slug) => self.store.load_document_by_slug(slug)?,
        };
        found
            .filter(|d| can_read(d, viewer))
            .ok_or_else(|| PolisError::not_found(format!("document {} not found", key)))
    }

    /// Every document the viewer may read, most recently updated first.
    pub fn list(&self, viewer: Option<&Identity>) -> PolisResult<Vec<Document>> {
        Ok(self
            .store
            .list_documents()?
            .into_iter()
            .filter(|d| can_read(d, viewer))
            .collect())
    }

    /// Apply `update`; a changed content value archives the previous one.
    pub fn update(&self, identity: Option<&Identity>, id: i64, update: &DocumentUpdate) -> PolisResult<Document> {
        let editor = require(identity)?;
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(PolisError::validation("title must not be empty"));
        }
        let current = self.owned(editor, id)?;

        let change = plan_update(&current, update, &editor.user_id, Utc::now());
        let archived = change.archive.as_ref().map(|a| a.version);
        let updated = self.store.apply_document_change(&change)?;

        activity::record(
            self.activity,
            ActivityEntry::new(Some(editor.user_id.as_str()), "document.updated", "document", id)
                .with_details(json!({ "version": updated.version, "archivedVersion": archived })),
        );
        Ok(updated)
    }

    pub fn publish(&self, identity: Option<&Identity>, id: i64) -> PolisResult<Document> {
        self.set_published(identity, id, true)
    }

    pub fn unpublish(&self, identity: Option<&Identity>, id: i64) -> PolisResult<Document> {
        self.set_published(identity, id, false)
    }

    fn set_published(&self, identity: Option<&Identity>, id: i64, published: bool) -> PolisResult<Document> {
        let editor = require(identity)?;
        self.owned(editor, id)?;
        if !self.store.set_document_published(id, published, Utc::now())? {
            return Err(PolisError::not_found(format!("document {} not found", id)));
        }
        let action = if published { "document.published" } else { "document.unpublished" };
        activity::record(
            self.activity,
            ActivityEntry::new(Some(editor.user_id.as_str()), action, "document", id),
        );
        self.get(Some(editor), DocumentKey::Id(id))
    }

    /// Hard delete, owner or admin. The ledger goes with it.
    pub fn delete(&self, identity: Option<&Identity>, id: i64) -> PolisResult<()> {
        let editor = require(identity)?;
        self.owned(editor, id)?;
        if !self.store.delete_document(id)? {
            return Err(PolisError::not_found(format!("document {} not found", id)));
        }
        activity::record(
            self.activity,
            ActivityEntry::new(Some(editor.user_id.as_str()), "document.deleted", "document", id),
        );
        Ok(())
    }

    /// Archived versions, oldest first.
    pub fn versions(&self, viewer: Option<&Identity>, id: i64) -> PolisResult<Vec<DocumentVersion>> {
        let document = self.get(viewer, DocumentKey::Id(id))?;
        Ok(self.store.document_versions(document.id)?)
    }

    /// Load a document the editor may change.
    fn owned(&self, editor: &Identity, id: i64) -> PolisResult<Document> {
        let document = self.get(Some(editor), DocumentKey::Id(id))?;
        if !editor.may_modify(&document.owner_id) {
            return Err(PolisError::denied("only the owner or an admin may change this document"));
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::testing::{BrokenRecorder, MemoryRecorder};
    use crate::storage::{OpenStore, SqliteStore};

    fn new_doc(title: &str, content: &str) -> NewDocument {
        NewDocument {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    fn content_update(content: &str) -> DocumentUpdate {
        DocumentUpdate {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    #[test]
    fn content_change_archives_previous_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");

        let doc = ledger.create(Some(&owner), &new_doc("Charter", "A")).unwrap();
        assert_eq!(doc.version, 1);

        let updated = ledger.update(Some(&owner), doc.id, &content_update("B")).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.content, "B");

        let versions = ledger.versions(Some(&owner), doc.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[0].content, "A");
        assert_eq!(versions[0].created_by.as_deref(), Some("owner"));
    }

    #[test]
    fn identical_content_writes_no_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");

        let doc = ledger.create(Some(&owner), &new_doc("Charter", "A")).unwrap();
        let same = ledger
            .update(
                Some(&owner),
                doc.id,
                &DocumentUpdate {
                    content: Some("A".into()),
                    visibility: Some(Visibility::Public),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(same.version, 1);
        assert_eq!(same.visibility, Visibility::Public);
        assert!(ledger.versions(Some(&owner), doc.id).unwrap().is_empty());
    }

    #[test]
    fn ledger_is_gapless() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");

        let doc = ledger.create(Some(&owner), &new_doc("Notes", "v1")).unwrap();
        for content in ["v2", "v2", "v3", "v4"] {
            ledger.update(Some(&owner), doc.id, &content_update(content)).unwrap();
        }
        let versions: Vec<(i64, String)> = ledger
            .versions(Some(&owner), doc.id)
            .unwrap()
            .into_iter()
            .map(|v| (v.version, v.content))
            .collect();
        assert_eq!(
            versions,
            vec![(1, "v1".to_string()), (2, "v2".to_string()), (3, "v3".to_string())]
        );
        assert_eq!(ledger.get(Some(&owner), DocumentKey::Id(doc.id)).unwrap().version, 4);
    }

    #[test]
    fn slugs_are_unique() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");

        let a = ledger.create(Some(&owner), &new_doc("Open Letter", "")).unwrap();
        let b = ledger.create(Some(&owner), &new_doc("Open letter!", "")).unwrap();
        assert_eq!(a.slug, "open-letter");
        assert_eq!(b.slug, "open-letter-2");
        assert_eq!(ledger.get(Some(&owner), DocumentKey::Slug("open-letter-2")).unwrap().id, b.id);
    }

    #[test]
    fn visibility_gates_reads() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");
        let member = Identity::member("other");

        let doc = ledger
            .create(
                Some(&owner),
                &NewDocument {
                    visibility: Some(Visibility::Members),
                    ..new_doc("Minutes", "...")
                },
            )
            .unwrap();

        // unpublished: owner only
        assert_eq!(ledger.get(Some(&member), DocumentKey::Id(doc.id)).unwrap_err().status(), 404);

        ledger.publish(Some(&owner), doc.id).unwrap();
        assert!(ledger.get(Some(&member), DocumentKey::Id(doc.id)).is_ok());
        assert_eq!(ledger.get(None, DocumentKey::Id(doc.id)).unwrap_err().status(), 404);
        assert_eq!(ledger.list(None).unwrap().len(), 0);
        assert_eq!(ledger.list(Some(&member)).unwrap().len(), 1);
        assert!(ledger.get(Some(&Identity::admin("root")), DocumentKey::Id(doc.id)).is_ok());
    }

    #[test]
    fn only_owner_or_admin_may_change() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let owner = Identity::member("owner");
        let doc = ledger
            .create(
                Some(&owner),
                &NewDocument {
                    visibility: Some(Visibility::Public),
                    ..new_doc("Open", "x")
                },
            )
            .unwrap();
        ledger.publish(Some(&owner), doc.id).unwrap();

        let stranger = Identity::member("stranger");
        assert_eq!(ledger.update(Some(&stranger), doc.id, &content_update("y")).unwrap_err().status(), 403);
        assert_eq!(ledger.delete(Some(&stranger), doc.id).unwrap_err().status(), 403);
        assert_eq!(ledger.delete(None, doc.id).unwrap_err().status(), 401);

        ledger.delete(Some(&Identity::admin("root")), doc.id).unwrap();
        assert_eq!(ledger.get(Some(&owner), DocumentKey::Id(doc.id)).unwrap_err().status(), 404);
        assert!(store.document_versions(doc.id).unwrap().is_empty());
        assert_eq!(
            recorder.actions(),
            vec!["document.created", "document.published", "document.deleted"]
        );
    }

    #[test]
    fn activity_failure_does_not_fail_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ledger = DocumentLedger::new(&store, &BrokenRecorder);
        let owner = Identity::member("owner");
        let doc = ledger.create(Some(&owner), &new_doc("Doc", "A")).unwrap();
        let updated = ledger.update(Some(&owner), doc.id, &content_update("B")).unwrap();
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn blank_title_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recorder = MemoryRecorder::default();
        let ledger = DocumentLedger::new(&store, &recorder);
        let err = ledger.create(Some(&Identity::member("a")), &new_doc("  ", "x")).unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
