//! SQLite storage backend for Polis

use super::rows::{opt_timestamp, text_enum, timestamp, EntityRow};
use super::traits::{CatalogFilter, Endpoint, OpenStore, PageRequest, StorageError, StorageResult, Store};
use crate::activity::{ActivityEntry, ActivityError, ActivityRecorder};
use crate::catalog::{
    EntityKind, EntityRef, Evidence, EvidenceQuality, FrameworkElement, LinkType, LinkedEvidence, Proposal,
};
use crate::document::{Document, DocumentChange, DocumentInsert, DocumentVersion};
use crate::evaluation::{Evaluation, EvaluationStatus, EvaluationWrite, Notes, Scores};
use crate::relation::{NewRelation, Relation};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Bumped whenever the DDL below changes shape.
const SCHEMA_VERSION: i64 = 1;

const RELATION_COLUMNS: &str = "id, source_type, source_id, relation_type, target_type, target_id, \
     description, weight, is_bidirectional, created_at";

const EVALUATION_COLUMNS: &str = "id, proposal_id, evaluator_id, \
     practicality_score, rights_score, implementation_score, monitoring_score, equity_score, \
     practicality_notes, rights_notes, implementation_notes, monitoring_notes, equity_notes, \
     status, total_score, created_at, updated_at, submitted_at";

const DOCUMENT_COLUMNS: &str =
    "id, slug, title, content, doc_type, visibility, is_published, owner_id, version, created_at, updated_at";

/// SQLite-backed store
///
/// One database file holds the catalog, relations, evaluations, documents
/// and the activity log. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Bootstrap the schema once for this connection.
    ///
    /// The DDL is idempotent and runs under the connection mutex, guarded by
    /// `PRAGMA user_version` so repeated opens skip it.
    fn init_schema(conn: &mut Connection) -> StorageResult<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        let tx = conn.transaction()?;
        tx.execute_batch(
            r#"
            -- Ontology
            CREATE TABLE IF NOT EXISTS concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                concept_type TEXT NOT NULL,
                domain TEXT,
                maturity TEXT NOT NULL,
                confidence TEXT NOT NULL,
                is_core INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS frameworks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                framework_type TEXT NOT NULL,
                domain TEXT,
                is_primary INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            -- Elements are owned by their framework
            CREATE TABLE IF NOT EXISTS framework_elements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                framework_id INTEGER NOT NULL REFERENCES frameworks(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                summary TEXT,
                element_type TEXT NOT NULL,
                layer_number INTEGER NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_framework_elements_order
                ON framework_elements(framework_id, layer_number, sort_order);

            CREATE TABLE IF NOT EXISTS tensions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                pole_a_id INTEGER REFERENCES concepts(id) ON DELETE SET NULL,
                pole_b_id INTEGER REFERENCES concepts(id) ON DELETE SET NULL,
                severity TEXT NOT NULL,
                resolution_status TEXT NOT NULL,
                domain TEXT,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS evidence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                evidence_type TEXT NOT NULL,
                quality TEXT NOT NULL,
                source_url TEXT,
                domain TEXT,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS evidence_concepts (
                evidence_id INTEGER NOT NULL REFERENCES evidence(id) ON DELETE CASCADE,
                concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                link_type TEXT NOT NULL,
                PRIMARY KEY (evidence_id, concept_id, link_type)
            );
            CREATE INDEX IF NOT EXISTS idx_evidence_concepts_concept
                ON evidence_concepts(concept_id);

            CREATE TABLE IF NOT EXISTS intellectual_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                source_type TEXT NOT NULL,
                era TEXT,
                url TEXT,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS actor_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                actor_category TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS architecture_elements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                element_type TEXT NOT NULL,
                layer TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS proposals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                body TEXT,
                author_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                architecture_element_id INTEGER REFERENCES architecture_elements(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Polymorphic endpoints: no foreign keys on purpose
            CREATE TABLE IF NOT EXISTS relations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_type TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                relation_type TEXT NOT NULL,
                target_type TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                description TEXT,
                weight REAL NOT NULL DEFAULT 1.0 CHECK (weight >= 0.0 AND weight <= 1.0),
                is_bidirectional INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (source_type, source_id, relation_type, target_type, target_id)
            );
            CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_type, source_id);
            CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_type, target_id);

            -- PRIME evaluations
            CREATE TABLE IF NOT EXISTS evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
                evaluator_id TEXT NOT NULL,
                practicality_score INTEGER CHECK (practicality_score BETWEEN 1 AND 5),
                rights_score INTEGER CHECK (rights_score BETWEEN 1 AND 5),
                implementation_score INTEGER CHECK (implementation_score BETWEEN 1 AND 5),
                monitoring_score INTEGER CHECK (monitoring_score BETWEEN 1 AND 5),
                equity_score INTEGER CHECK (equity_score BETWEEN 1 AND 5),
                practicality_notes TEXT,
                rights_notes TEXT,
                implementation_notes TEXT,
                monitoring_notes TEXT,
                equity_notes TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                total_score REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                submitted_at TEXT,
                UNIQUE (proposal_id, evaluator_id)
            );

            -- Documents and their version ledger
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                visibility TEXT NOT NULL,
                is_published INTEGER NOT NULL DEFAULT 0,
                owner_id TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                version INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_by TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (document_id, version)
            );

            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                details_json TEXT NOT NULL DEFAULT 'null',
                recorded_at TEXT NOT NULL
            );
            "#,
        )?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        tx.commit()?;

        tracing::info!(version = SCHEMA_VERSION, "database schema initialised");
        Ok(())
    }

    fn from_connection(mut conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Most recent activity entries, newest first
    pub fn recent_activity(&self, limit: usize) -> StorageResult<Vec<ActivityEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, action, entity_type, entity_id, details_json, recorded_at
             FROM activity_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let details: String = row.get(4)?;
            Ok((
                ActivityEntry {
                    user_id: row.get(0)?,
                    action: row.get(1)?,
                    entity_type: row.get(2)?,
                    entity_id: row.get(3)?,
                    details: serde_json::Value::Null,
                    recorded_at: timestamp(row, 5)?,
                },
                details,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (mut entry, details) = row?;
            entry.details = serde_json::from_str(&details)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Map constraint failures onto `UniqueViolation`, naming `what`.
fn classify(err: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StorageError::UniqueViolation(what())
        }
        _ => StorageError::Database(err),
    }
}

fn select_list<E: EntityRow>(alias: &str) -> String {
    std::iter::once("id")
        .chain(E::COLUMNS.iter().copied())
        .map(|c| format!("{}{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tri-state predicate: each `?n IS NULL` short-circuits its constraint.
/// Kinds without a column get a constant-true slot so parameter numbering
/// stays fixed; callers never bind a value there.
fn filter_clause<E: EntityRow>() -> String {
    let eq = |column: Option<&str>, n: usize| match column {
        Some(column) => format!("(?{n} IS NULL OR {column} = ?{n})"),
        None => format!("(?{n} IS NULL OR 1)"),
    };
    format!(
        "{} AND {} AND {} AND (?4 IS NULL OR instr(lower(title), lower(?4)) > 0 \
         OR instr(lower(COALESCE(summary, '')), lower(?4)) > 0)",
        eq(E::TYPE_COLUMN, 1),
        eq(E::DOMAIN_COLUMN, 2),
        eq(E::STATUS_COLUMN, 3),
    )
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> StorageResult<Vec<T>> {
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn row_to_relation(row: &Row<'_>) -> rusqlite::Result<Relation> {
    Ok(Relation {
        id: row.get(0)?,
        source: EntityRef::new(text_enum(row, 1)?, row.get(2)?),
        relation_type: row.get(3)?,
        target: EntityRef::new(text_enum(row, 4)?, row.get(5)?),
        description: row.get(6)?,
        weight: row.get(7)?,
        is_bidirectional: row.get(8)?,
        created_at: timestamp(row, 9)?,
    })
}

fn row_to_evaluation(row: &Row<'_>) -> rusqlite::Result<Evaluation> {
    Ok(Evaluation {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        evaluator_id: row.get(2)?,
        scores: Scores {
            practicality: row.get(3)?,
            rights: row.get(4)?,
            implementation: row.get(5)?,
            monitoring: row.get(6)?,
            equity: row.get(7)?,
        },
        notes: Notes {
            practicality: row.get(8)?,
            rights: row.get(9)?,
            implementation: row.get(10)?,
            monitoring: row.get(11)?,
            equity: row.get(12)?,
        },
        status: text_enum(row, 13)?,
        total_score: row.get(14)?,
        created_at: timestamp(row, 15)?,
        updated_at: timestamp(row, 16)?,
        submitted_at: opt_timestamp(row, 17)?,
    })
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        doc_type: row.get(4)?,
        visibility: text_enum(row, 5)?,
        is_published: row.get(6)?,
        owner_id: row.get(7)?,
        version: row.get(8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
    })
}

fn document_where(conn: &Connection, column: &str, value: &dyn ToSql) -> StorageResult<Option<Document>> {
    let sql = format!("SELECT {} FROM documents WHERE {} = ?1", DOCUMENT_COLUMNS, column);
    Ok(conn.query_row(&sql, &[value], row_to_document).optional()?)
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL for concurrent reads during writes
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::from_connection(conn)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl Store for SqliteStore {
    // === Catalog ===

    fn insert_entity<E: EntityRow>(&self, entity: &E) -> StorageResult<i64> {
        let conn = self.conn()?;
        let placeholders: Vec<String> = (1..=E::COLUMNS.len()).map(|n| format!("?{}", n)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::KIND.table(),
            E::COLUMNS.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(entity.to_values()?))
            .map_err(|e| classify(e, || format!("{} '{}'", E::KIND, entity.code())))?;
        Ok(conn.last_insert_rowid())
    }

    fn insert_entity_if_absent<E: EntityRow>(&self, entity: &E) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let placeholders: Vec<String> = (1..=E::COLUMNS.len()).map(|n| format!("?{}", n)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(code) DO NOTHING",
            E::KIND.table(),
            E::COLUMNS.join(", "),
            placeholders.join(", ")
        );
        let rows = conn.execute(&sql, params_from_iter(entity.to_values()?))?;
        Ok((rows > 0).then(|| conn.last_insert_rowid()))
    }

    fn update_entity<E: EntityRow>(&self, entity: &E) -> StorageResult<bool> {
        let conn = self.conn()?;
        let assignments: Vec<String> = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            E::KIND.table(),
            assignments.join(", "),
            E::COLUMNS.len() + 1
        );
        let mut values = entity.to_values()?;
        values.push(entity.id().into());
        let rows = conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| classify(e, || format!("{} '{}'", E::KIND, entity.code())))?;
        Ok(rows > 0)
    }

    fn delete_entity<E: EntityRow>(&self, id: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::KIND.table());
        Ok(conn.execute(&sql, params![id])? > 0)
    }

    fn load_entity<E: EntityRow>(&self, id: i64) -> StorageResult<Option<E>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", select_list::<E>(""), E::KIND.table());
        Ok(conn.query_row(&sql, params![id], |row| E::from_row(row)).optional()?)
    }

    fn load_entity_by_code<E: EntityRow>(&self, code: &str) -> StorageResult<Option<E>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM {} WHERE code = ?1", select_list::<E>(""), E::KIND.table());
        Ok(conn.query_row(&sql, params![code], |row| E::from_row(row)).optional()?)
    }

    fn find_entities<E: EntityRow>(&self, filter: &CatalogFilter, page: PageRequest) -> StorageResult<Vec<E>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ?5 OFFSET ?6",
            select_list::<E>(""),
            E::KIND.table(),
            filter_clause::<E>(),
            E::order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.entity_type,
                filter.domain,
                filter.status,
                filter.search,
                page.limit as i64,
                page.offset as i64
            ],
            |row| E::from_row(row),
        )?;
        collect(rows)
    }

    fn count_entities<E: EntityRow>(&self, filter: &CatalogFilter) -> StorageResult<usize> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", E::KIND.table(), filter_clause::<E>());
        let count: i64 = conn.query_row(
            &sql,
            params![filter.entity_type, filter.domain, filter.status, filter.search],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn all_entities<E: EntityRow>(&self) -> StorageResult<Vec<E>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list::<E>(""),
            E::KIND.table(),
            E::order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| E::from_row(row))?;
        collect(rows)
    }

    fn entity_id_by_code(&self, kind: EntityKind, code: &str) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let sql = format!("SELECT id FROM {} WHERE code = ?1", kind.table());
        Ok(conn.query_row(&sql, params![code], |row| row.get(0)).optional()?)
    }

    fn entity_exists(&self, entity: &EntityRef) -> StorageResult<bool> {
        let conn = self.conn()?;
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", entity.kind.table());
        Ok(conn.query_row(&sql, params![entity.id], |row| row.get(0))?)
    }

    fn link_evidence(&self, evidence_id: i64, concept_id: i64, link_type: LinkType) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT INTO evidence_concepts (evidence_id, concept_id, link_type)
             VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![evidence_id, concept_id, link_type.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn evidence_for_concept(&self, concept_id: i64) -> StorageResult<Vec<LinkedEvidence>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {}, ec.link_type
             FROM evidence_concepts ec JOIN evidence e ON e.id = ec.evidence_id
             WHERE ec.concept_id = ?1
             ORDER BY {}, e.title COLLATE NOCASE ASC, e.id ASC, ec.link_type ASC",
            select_list::<Evidence>("e."),
            EvidenceQuality::order_case("e.quality")
        );
        let link_idx = Evidence::COLUMNS.len() + 1;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![concept_id], |row| {
            Ok(LinkedEvidence {
                evidence: Evidence::from_row(row)?,
                link_type: text_enum(row, link_idx)?,
            })
        })?;
        collect(rows)
    }

    fn framework_elements(&self, framework_id: i64) -> StorageResult<Vec<FrameworkElement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM framework_elements WHERE framework_id = ?1 ORDER BY {}",
            select_list::<FrameworkElement>(""),
            FrameworkElement::order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![framework_id], |row| FrameworkElement::from_row(row))?;
        collect(rows)
    }

    fn proposals_for_architecture_element(&self, element_id: i64) -> StorageResult<Vec<Proposal>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM proposals WHERE architecture_element_id = ?1 ORDER BY {}",
            select_list::<Proposal>(""),
            Proposal::order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![element_id], |row| Proposal::from_row(row))?;
        collect(rows)
    }

    // === Relations ===

    fn insert_relation(&self, relation: &NewRelation) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        // First write wins; duplicates are silently ignored.
        let rows = conn.execute(
            r#"
            INSERT INTO relations (source_type, source_id, relation_type, target_type, target_id,
                                   description, weight, is_bidirectional, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(source_type, source_id, relation_type, target_type, target_id) DO NOTHING
            "#,
            params![
                relation.source.kind.as_str(),
                relation.source.id,
                relation.relation_type,
                relation.target.kind.as_str(),
                relation.target.id,
                relation.description,
                relation.weight,
                relation.is_bidirectional,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok((rows > 0).then(|| conn.last_insert_rowid()))
    }

    fn load_relation(&self, id: i64) -> StorageResult<Option<Relation>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM relations WHERE id = ?1", RELATION_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_relation).optional()?)
    }

    fn relations_at(&self, endpoint: Endpoint, entity: &EntityRef) -> StorageResult<Vec<Relation>> {
        let conn = self.conn()?;
        let (type_col, id_col) = match endpoint {
            Endpoint::Source => ("source_type", "source_id"),
            Endpoint::Target => ("target_type", "target_id"),
        };
        let sql = format!(
            "SELECT {} FROM relations WHERE {} = ?1 AND {} = ?2
             ORDER BY relation_type ASC, weight DESC, id ASC",
            RELATION_COLUMNS, type_col, id_col
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![entity.kind.as_str(), entity.id], row_to_relation)?;
        collect(rows)
    }

    fn all_relations(&self) -> StorageResult<Vec<Relation>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM relations ORDER BY relation_type ASC, weight DESC, id ASC",
            RELATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_relation)?;
        collect(rows)
    }

    fn delete_relation(&self, id: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM relations WHERE id = ?1", params![id])? > 0)
    }

    // === Evaluations ===

    fn upsert_evaluation(&self, write: &EvaluationWrite) -> StorageResult<Evaluation> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let at = write.at.to_rfc3339();
        let submitted_at = (write.status == EvaluationStatus::Submitted).then(|| at.clone());

        // The unique key serializes racing writes from one evaluator;
        // submission is sticky and the first submission time is kept.
        tx.execute(
            r#"
            INSERT INTO evaluations (proposal_id, evaluator_id,
                practicality_score, rights_score, implementation_score, monitoring_score, equity_score,
                practicality_notes, rights_notes, implementation_notes, monitoring_notes, equity_notes,
                status, total_score, created_at, updated_at, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?16)
            ON CONFLICT(proposal_id, evaluator_id) DO UPDATE SET
                practicality_score = excluded.practicality_score,
                rights_score = excluded.rights_score,
                implementation_score = excluded.implementation_score,
                monitoring_score = excluded.monitoring_score,
                equity_score = excluded.equity_score,
                practicality_notes = excluded.practicality_notes,
                rights_notes = excluded.rights_notes,
                implementation_notes = excluded.implementation_notes,
                monitoring_notes = excluded.monitoring_notes,
                equity_notes = excluded.equity_notes,
                status = CASE WHEN evaluations.status = 'submitted' THEN 'submitted' ELSE excluded.status END,
                total_score = excluded.total_score,
                updated_at = excluded.updated_at,
                submitted_at = COALESCE(evaluations.submitted_at, excluded.submitted_at)
            "#,
            params![
                write.proposal_id,
                write.evaluator_id,
                write.scores.practicality,
                write.scores.rights,
                write.scores.implementation,
                write.scores.monitoring,
                write.scores.equity,
                write.notes.practicality,
                write.notes.rights,
                write.notes.implementation,
                write.notes.monitoring,
                write.notes.equity,
                write.status.as_str(),
                write.total_score,
                at,
                submitted_at,
            ],
        )?;

        let sql = format!(
            "SELECT {} FROM evaluations WHERE proposal_id = ?1 AND evaluator_id = ?2",
            EVALUATION_COLUMNS
        );
        let evaluation = tx.query_row(&sql, params![write.proposal_id, write.evaluator_id], row_to_evaluation)?;
        tx.commit()?;
        Ok(evaluation)
    }

    fn load_evaluation(&self, id: i64) -> StorageResult<Option<Evaluation>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM evaluations WHERE id = ?1", EVALUATION_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_evaluation).optional()?)
    }

    fn evaluations_for_proposal(
        &self,
        proposal_id: i64,
        status: Option<EvaluationStatus>,
    ) -> StorageResult<Vec<Evaluation>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM evaluations
             WHERE proposal_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY updated_at DESC, id DESC",
            EVALUATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![proposal_id, status.map(|s| s.as_str())], row_to_evaluation)?;
        collect(rows)
    }

    // === Documents ===

    fn insert_document(&self, document: &DocumentInsert) -> StorageResult<Document> {
        let conn = self.conn()?;
        let at = document.at.to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documents (slug, title, content, doc_type, visibility, is_published,
                                   owner_id, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 1, ?7, ?7)
            "#,
            params![
                document.slug,
                document.title,
                document.content,
                document.doc_type,
                document.visibility.as_str(),
                document.owner_id,
                at,
            ],
        )
        .map_err(|e| classify(e, || format!("document slug '{}'", document.slug)))?;
        let id = conn.last_insert_rowid();
        document_where(&conn, "id", &id)?
            .ok_or_else(|| StorageError::Database(rusqlite::Error::QueryReturnedNoRows))
    }

    fn load_document(&self, id: i64) -> StorageResult<Option<Document>> {
        let conn = self.conn()?;
        document_where(&conn, "id", &id)
    }

    fn load_document_by_slug(&self, slug: &str) -> StorageResult<Option<Document>> {
        let conn = self.conn()?;
        document_where(&conn, "slug", &slug)
    }

    fn list_documents(&self) -> StorageResult<Vec<Document>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM documents ORDER BY updated_at DESC, id DESC",
            DOCUMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_document)?;
        collect(rows)
    }

    fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE slug = ?1)",
            params![slug],
            |row| row.get(0),
        )?)
    }

    fn apply_document_change(&self, change: &DocumentChange) -> StorageResult<Document> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let at = change.at.to_rfc3339();
        let stale = || StorageError::StaleWrite(format!("document {}", change.document_id));

        if let Some(ref archive) = change.archive {
            tx.execute(
                r#"
                INSERT INTO document_versions (document_id, version, title, content, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    change.document_id,
                    archive.version,
                    archive.title,
                    archive.content,
                    change.edited_by,
                    at,
                ],
            )
            .map_err(|e| match classify(e, || String::new()) {
                StorageError::UniqueViolation(_) => stale(),
                other => other,
            })?;
        }

        let rows = tx.execute(
            r#"
            UPDATE documents
            SET title = ?1, content = ?2, doc_type = ?3, visibility = ?4, version = ?5, updated_at = ?6
            WHERE id = ?7 AND version = ?8
            "#,
            params![
                change.title,
                change.content,
                change.doc_type,
                change.visibility.as_str(),
                change.version,
                at,
                change.document_id,
                change.expected_version,
            ],
        )?;
        if rows == 0 {
            // Dropping the transaction rolls back the archived row.
            return Err(stale());
        }

        let document = document_where(&tx, "id", &change.document_id)?.ok_or_else(stale)?;
        tx.commit()?;
        Ok(document)
    }

    fn set_document_published(&self, id: i64, published: bool, at: DateTime<Utc>) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE documents SET is_published = ?1, updated_at = ?2 WHERE id = ?3",
            params![published, at.to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    fn delete_document(&self, id: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM documents WHERE id = ?1", params![id])? > 0)
    }

    fn document_versions(&self, document_id: i64) -> StorageResult<Vec<DocumentVersion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, version, title, content, created_by, created_at
             FROM document_versions WHERE document_id = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![document_id], |row| {
            Ok(DocumentVersion {
                id: row.get(0)?,
                document_id: row.get(1)?,
                version: row.get(2)?,
                title: row.get(3)?,
                content: row.get(4)?,
                created_by: row.get(5)?,
                created_at: timestamp(row, 6)?,
            })
        })?;
        collect(rows)
    }
}

impl ActivityRecorder for SqliteStore {
    fn record(&self, entry: &ActivityEntry) -> Result<(), ActivityError> {
        let conn = self.conn().map_err(|e| ActivityError(e.to_string()))?;
        let details = serde_json::to_string(&entry.details).map_err(|e| ActivityError(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO activity_log (user_id, action, entity_type, entity_id, details_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.user_id,
                entry.action,
                entry.entity_type,
                entry.entity_id,
                details,
                entry.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ActivityError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        Concept, ConceptType, Confidence, Framework, Maturity, Metadata, Severity, ResolutionStatus, Tension,
    };
    use crate::document::Visibility;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn concept(code: &str, title: &str) -> Concept {
        Concept::new(code, title, ConceptType::Mechanism)
    }

    fn framework(code: &str) -> Framework {
        Framework {
            id: 0,
            code: code.into(),
            title: format!("Framework {}", code),
            summary: None,
            framework_type: "pyramid".into(),
            domain: None,
            is_primary: false,
            status: Default::default(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("polis.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_entity(&concept("A", "Alpha")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let loaded: Option<Concept> = store.load_entity_by_code("A").unwrap();
        assert_eq!(loaded.unwrap().title, "Alpha");
    }

    #[test]
    fn test_insert_and_load_concept() {
        let store = create_test_store();
        let mut c = concept("UBI", "Universal basic income");
        c.metadata.insert("color".into(), serde_json::json!("#123456"));
        c.domain = Some("economy".into());
        let id = store.insert_entity(&c).unwrap();

        let loaded: Concept = store.load_entity(id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.code, "UBI");
        assert_eq!(loaded.domain.as_deref(), Some("economy"));
        assert_eq!(loaded.metadata.get("color"), Some(&serde_json::json!("#123456")));
    }

    #[test]
    fn test_duplicate_code_is_unique_violation() {
        let store = create_test_store();
        store.insert_entity(&concept("X", "One")).unwrap();
        let err = store.insert_entity(&concept("X", "Two")).unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation(_)));

        assert_eq!(store.insert_entity_if_absent(&concept("X", "Three")).unwrap(), None);
        assert!(store.insert_entity_if_absent(&concept("Y", "Four")).unwrap().is_some());
    }

    #[test]
    fn test_listing_order_core_then_maturity_then_title() {
        let store = create_test_store();
        let mut b = concept("B", "beta");
        b.maturity = Maturity::Canonical;
        let mut a = concept("A", "alpha");
        a.maturity = Maturity::Embryonic;
        let mut z = concept("Z", "zeta");
        z.is_core = true;
        let mut c = concept("C", "Gamma");
        c.maturity = Maturity::Canonical;
        for e in [&b, &a, &z, &c] {
            store.insert_entity(e).unwrap();
        }

        let page: Vec<Concept> = store
            .find_entities(&CatalogFilter::default(), PageRequest { limit: 10, offset: 0 })
            .unwrap();
        let codes: Vec<&str> = page.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["Z", "B", "C", "A"]);
    }

    #[test]
    fn test_filters_and_count_share_predicate() {
        let store = create_test_store();
        for i in 0..7 {
            let mut c = concept(&format!("C{}", i), &format!("Commons {}", i));
            c.domain = Some(if i % 2 == 0 { "economy" } else { "ecology" }.into());
            store.insert_entity(&c).unwrap();
        }
        let mut other = concept("O", "Other");
        other.summary = Some("about the COMMONS".into());
        other.domain = Some("economy".into());
        store.insert_entity(&other).unwrap();

        let filter = CatalogFilter {
            domain: Some("economy".into()),
            search: Some("commons".into()),
            ..Default::default()
        };
        assert_eq!(store.count_entities::<Concept>(&filter).unwrap(), 5);

        let past_end: Vec<Concept> = store
            .find_entities(&filter, PageRequest { limit: 10, offset: 50 })
            .unwrap();
        assert!(past_end.is_empty());

        let unfiltered = store.count_entities::<Concept>(&CatalogFilter::default()).unwrap();
        assert_eq!(unfiltered, 8);
    }

    #[test]
    fn test_filter_on_missing_column_passes_through() {
        let store = create_test_store();
        let fid = store.insert_entity(&framework("F1")).unwrap();
        store
            .insert_entity(&FrameworkElement {
                id: 0,
                framework_id: fid,
                code: "F1-E".into(),
                title: "Base".into(),
                summary: None,
                element_type: "layer".into(),
                layer_number: 1,
                sort_order: 0,
                metadata: Metadata::new(),
            })
            .unwrap();
        let filter = CatalogFilter {
            domain: Some("anything".into()),
            ..Default::default()
        };
        // frameworks do have a domain column; elements do not
        assert_eq!(store.count_entities::<Framework>(&filter).unwrap(), 0);
        assert_eq!(store.count_entities::<FrameworkElement>(&filter).unwrap(), 1);
    }

    #[test]
    fn test_framework_delete_cascades_to_elements() {
        let store = create_test_store();
        let fid = store.insert_entity(&framework("F")).unwrap();
        for (code, layer, order) in [("E2", 2, 0), ("E1b", 1, 2), ("E1a", 1, 1)] {
            store
                .insert_entity(&FrameworkElement {
                    id: 0,
                    framework_id: fid,
                    code: code.into(),
                    title: code.into(),
                    summary: None,
                    element_type: "layer".into(),
                    layer_number: layer,
                    sort_order: order,
                    metadata: Metadata::new(),
                })
                .unwrap();
        }
        let codes: Vec<String> = store.framework_elements(fid).unwrap().into_iter().map(|e| e.code).collect();
        assert_eq!(codes, vec!["E1a", "E1b", "E2"]);

        assert!(store.delete_entity::<Framework>(fid).unwrap());
        assert!(store.framework_elements(fid).unwrap().is_empty());
    }

    #[test]
    fn test_deleting_pole_concept_clears_tension_pole() {
        let store = create_test_store();
        let a = store.insert_entity(&concept("A", "A")).unwrap();
        let b = store.insert_entity(&concept("B", "B")).unwrap();
        let tid = store
            .insert_entity(&Tension {
                id: 0,
                code: "T".into(),
                title: "A vs B".into(),
                summary: None,
                pole_a_id: Some(a),
                pole_b_id: Some(b),
                severity: Severity::Fundamental,
                resolution_status: ResolutionStatus::Unresolved,
                domain: None,
                metadata: Metadata::new(),
            })
            .unwrap();
        store.delete_entity::<Concept>(b).unwrap();
        let tension: Tension = store.load_entity(tid).unwrap().unwrap();
        assert_eq!(tension.pole_b_id, None);
    }

    #[test]
    fn test_relation_uniqueness_first_write_wins() {
        let store = create_test_store();
        let edge = NewRelation::new(EntityRef::concept(1), "supports", EntityRef::concept(2)).with_weight(0.3);
        assert!(store.insert_relation(&edge).unwrap().is_some());
        assert!(store.insert_relation(&edge.clone().with_weight(0.9)).unwrap().is_none());

        let all = store.all_relations().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].weight, 0.3);
    }

    #[test]
    fn test_relations_at_orders_by_type_then_weight() {
        let store = create_test_store();
        let src = EntityRef::concept(1);
        store
            .insert_relation(&NewRelation::new(src, "supports", EntityRef::concept(2)).with_weight(0.2))
            .unwrap();
        store
            .insert_relation(&NewRelation::new(src, "supports", EntityRef::concept(3)).with_weight(0.8))
            .unwrap();
        store
            .insert_relation(&NewRelation::new(src, "enables", EntityRef::framework(1)).with_weight(0.1))
            .unwrap();

        let out = store.relations_at(Endpoint::Source, &src).unwrap();
        let summary: Vec<(String, f64)> = out.iter().map(|r| (r.relation_type.clone(), r.weight)).collect();
        assert_eq!(
            summary,
            vec![
                ("enables".to_string(), 0.1),
                ("supports".to_string(), 0.8),
                ("supports".to_string(), 0.2)
            ]
        );
        assert_eq!(out[2].target, EntityRef::concept(2));
    }

    #[test]
    fn test_document_change_rolls_back_on_stale_version() {
        let store = create_test_store();
        let doc = store
            .insert_document(&DocumentInsert {
                slug: "charter".into(),
                title: "Charter".into(),
                content: "A".into(),
                doc_type: "policy".into(),
                visibility: Visibility::Public,
                owner_id: "u1".into(),
                at: Utc::now(),
            })
            .unwrap();
        assert_eq!(doc.version, 1);

        let change = crate::document::plan_update(
            &doc,
            &crate::document::DocumentUpdate {
                content: Some("B".into()),
                ..Default::default()
            },
            "u1",
            Utc::now(),
        );
        let updated = store.apply_document_change(&change).unwrap();
        assert_eq!(updated.version, 2);

        // Replaying the same plan is stale and must not leave a second archive row.
        let err = store.apply_document_change(&change).unwrap_err();
        assert!(matches!(err, StorageError::StaleWrite(_)));
        assert_eq!(store.document_versions(doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_activity_log_round_trip() {
        let store = create_test_store();
        store
            .record(&ActivityEntry::new(Some("u1"), "concept.created", "concept", 4))
            .unwrap();
        let entries = store.recent_activity(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "concept.created");
        assert_eq!(entries[0].entity_id, "4");
    }

    #[test]
    fn test_concept_enums_round_trip() {
        let store = create_test_store();
        let mut c = concept("K", "Kappa");
        c.confidence = Confidence::Contested;
        let id = store.insert_entity(&c).unwrap();
        let loaded: Concept = store.load_entity(id).unwrap().unwrap();
        assert_eq!(loaded.confidence, Confidence::Contested);
        assert_eq!(loaded.concept_type, ConceptType::Mechanism);
    }
}
