//! Row mapping between catalog records and their tables.
//!
//! Every `SELECT` reads `id` first, then `COLUMNS` in order.

use super::traits::StorageResult;
use crate::catalog::*;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use std::str::FromStr;

/// SQL shape of a catalog record.
pub trait EntityRow: CatalogEntity {
    /// Stored columns excluding `id`; `code` is always first
    const COLUMNS: &'static [&'static str];
    /// Column matched by the `type` filter
    const TYPE_COLUMN: Option<&'static str> = None;
    const DOMAIN_COLUMN: Option<&'static str> = None;
    const STATUS_COLUMN: Option<&'static str> = None;

    /// `ORDER BY` body: primary flag, then rank, then title
    fn order_by() -> String;

    /// Values for `COLUMNS`, same order
    fn to_values(&self) -> StorageResult<Vec<Value>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub(crate) fn conversion_error(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, msg.into())
}

pub(crate) fn text_enum<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

pub(crate) fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
    })
    .transpose()
}

fn metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

fn metadata_value(metadata: &Metadata) -> StorageResult<Value> {
    Ok(Value::Text(serde_json::to_string(metadata)?))
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

impl EntityRow for Concept {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "concept_type", "domain", "maturity", "confidence", "is_core", "status",
        "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("concept_type");
    const DOMAIN_COLUMN: Option<&'static str> = Some("domain");
    const STATUS_COLUMN: Option<&'static str> = Some("status");

    fn order_by() -> String {
        format!(
            "is_core DESC, {}, title COLLATE NOCASE ASC, id ASC",
            Maturity::order_case("maturity")
        )
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(self.concept_type.as_str()),
            self.domain.clone().into(),
            text(self.maturity.as_str()),
            text(self.confidence.as_str()),
            self.is_core.into(),
            text(self.status.as_str()),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Concept {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            concept_type: text_enum(row, 4)?,
            domain: row.get(5)?,
            maturity: text_enum(row, 6)?,
            confidence: text_enum(row, 7)?,
            is_core: row.get(8)?,
            status: text_enum(row, 9)?,
            metadata: metadata(row, 10)?,
        })
    }
}

impl EntityRow for Framework {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "framework_type", "domain", "is_primary", "status", "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("framework_type");
    const DOMAIN_COLUMN: Option<&'static str> = Some("domain");
    const STATUS_COLUMN: Option<&'static str> = Some("status");

    fn order_by() -> String {
        "is_primary DESC, title COLLATE NOCASE ASC, id ASC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.framework_type),
            self.domain.clone().into(),
            self.is_primary.into(),
            text(self.status.as_str()),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Framework {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            framework_type: row.get(4)?,
            domain: row.get(5)?,
            is_primary: row.get(6)?,
            status: text_enum(row, 7)?,
            metadata: metadata(row, 8)?,
        })
    }
}

impl EntityRow for FrameworkElement {
    const COLUMNS: &'static [&'static str] = &[
        "code", "framework_id", "title", "summary", "element_type", "layer_number", "sort_order", "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("element_type");

    fn order_by() -> String {
        "framework_id ASC, layer_number ASC, sort_order ASC, id ASC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            self.framework_id.into(),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.element_type),
            self.layer_number.into(),
            self.sort_order.into(),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FrameworkElement {
            id: row.get(0)?,
            code: row.get(1)?,
            framework_id: row.get(2)?,
            title: row.get(3)?,
            summary: row.get(4)?,
            element_type: row.get(5)?,
            layer_number: row.get(6)?,
            sort_order: row.get(7)?,
            metadata: metadata(row, 8)?,
        })
    }
}

impl EntityRow for Tension {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "pole_a_id", "pole_b_id", "severity", "resolution_status", "domain",
        "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("severity");
    const DOMAIN_COLUMN: Option<&'static str> = Some("domain");
    const STATUS_COLUMN: Option<&'static str> = Some("resolution_status");

    fn order_by() -> String {
        format!(
            "{}, title COLLATE NOCASE ASC, id ASC",
            Severity::order_case("severity")
        )
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            self.pole_a_id.into(),
            self.pole_b_id.into(),
            text(self.severity.as_str()),
            text(self.resolution_status.as_str()),
            self.domain.clone().into(),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Tension {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            pole_a_id: row.get(4)?,
            pole_b_id: row.get(5)?,
            severity: text_enum(row, 6)?,
            resolution_status: text_enum(row, 7)?,
            domain: row.get(8)?,
            metadata: metadata(row, 9)?,
        })
    }
}

impl EntityRow for Evidence {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "evidence_type", "quality", "source_url", "domain", "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("evidence_type");
    const DOMAIN_COLUMN: Option<&'static str> = Some("domain");

    fn order_by() -> String {
        format!(
            "{}, title COLLATE NOCASE ASC, id ASC",
            EvidenceQuality::order_case("quality")
        )
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.evidence_type),
            text(self.quality.as_str()),
            self.source_url.clone().into(),
            self.domain.clone().into(),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Evidence {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            evidence_type: row.get(4)?,
            quality: text_enum(row, 5)?,
            source_url: row.get(6)?,
            domain: row.get(7)?,
            metadata: metadata(row, 8)?,
        })
    }
}

impl EntityRow for IntellectualSource {
    const COLUMNS: &'static [&'static str] =
        &["code", "title", "summary", "source_type", "era", "url", "metadata_json"];
    const TYPE_COLUMN: Option<&'static str> = Some("source_type");

    fn order_by() -> String {
        "title COLLATE NOCASE ASC, id ASC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.source_type),
            self.era.clone().into(),
            self.url.clone().into(),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(IntellectualSource {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            source_type: row.get(4)?,
            era: row.get(5)?,
            url: row.get(6)?,
            metadata: metadata(row, 7)?,
        })
    }
}

impl EntityRow for ActorType {
    const COLUMNS: &'static [&'static str] = &["code", "title", "summary", "actor_category", "metadata_json"];
    const TYPE_COLUMN: Option<&'static str> = Some("actor_category");

    fn order_by() -> String {
        "title COLLATE NOCASE ASC, id ASC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.actor_category),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ActorType {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            actor_category: row.get(4)?,
            metadata: metadata(row, 5)?,
        })
    }
}

impl EntityRow for ArchitectureElement {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "element_type", "layer", "sort_order", "status", "metadata_json",
    ];
    const TYPE_COLUMN: Option<&'static str> = Some("element_type");
    const DOMAIN_COLUMN: Option<&'static str> = Some("layer");
    const STATUS_COLUMN: Option<&'static str> = Some("status");

    fn order_by() -> String {
        "sort_order ASC, title COLLATE NOCASE ASC, id ASC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            text(&self.element_type),
            self.layer.clone().into(),
            self.sort_order.into(),
            text(self.status.as_str()),
            metadata_value(&self.metadata)?,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ArchitectureElement {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            element_type: row.get(4)?,
            layer: row.get(5)?,
            sort_order: row.get(6)?,
            status: text_enum(row, 7)?,
            metadata: metadata(row, 8)?,
        })
    }
}

impl EntityRow for Proposal {
    const COLUMNS: &'static [&'static str] = &[
        "code", "title", "summary", "body", "author_id", "status", "architecture_element_id", "created_at",
        "updated_at",
    ];
    const STATUS_COLUMN: Option<&'static str> = Some("status");

    fn order_by() -> String {
        "created_at DESC, id DESC".to_string()
    }

    fn to_values(&self) -> StorageResult<Vec<Value>> {
        Ok(vec![
            text(&self.code),
            text(&self.title),
            self.summary.clone().into(),
            self.body.clone().into(),
            text(&self.author_id),
            text(self.status.as_str()),
            self.architecture_element_id.into(),
            Value::Text(self.created_at.to_rfc3339()),
            Value::Text(self.updated_at.to_rfc3339()),
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Proposal {
            id: row.get(0)?,
            code: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            body: row.get(4)?,
            author_id: row.get(5)?,
            status: text_enum(row, 6)?,
            architecture_element_id: row.get(7)?,
            created_at: timestamp(row, 8)?,
            updated_at: timestamp(row, 9)?,
        })
    }
}
