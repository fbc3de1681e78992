//! MCP tool parameter structs with schemars-derived JSON schemas.

use schemars::JsonSchema;
use serde::Deserialize;

// ── Catalog params ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetResourceParams {
    #[schemars(description = "One of: concepts, frameworks, tensions, evidence, sources, actors, graph")]
    pub resource: String,
    #[schemars(description = "Numeric id of a single record")]
    pub id: Option<i64>,
    #[schemars(description = "Stable code of a single record")]
    pub code: Option<String>,
    #[schemars(description = "Type filter, e.g. a concept type")]
    pub r#type: Option<String>,
    pub domain: Option<String>,
    pub status: Option<String>,
    #[schemars(description = "Case-insensitive substring of title or summary")]
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[schemars(description = "With resource=evidence: evidence linked to this concept")]
    pub concept_id: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetArchitectureParams {
    pub id: Option<i64>,
    pub code: Option<String>,
    pub r#type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NeighborsParams {
    #[schemars(description = "Entity kind, e.g. concept or framework_element")]
    pub kind: String,
    pub id: i64,
    #[schemars(description = "outgoing (default), incoming or both")]
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRelationParams {
    pub token: Option<String>,
    #[schemars(description = "{source: {kind, id}, relationType, target: {kind, id}, weight, description, bidirectional}")]
    pub relation: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteRelationParams {
    pub token: Option<String>,
    pub id: i64,
}

// ── Evaluation params ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetEvaluationsParams {
    #[schemars(description = "Bearer token of the caller; omit to read anonymously")]
    pub token: Option<String>,
    pub id: Option<i64>,
    pub proposal_id: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveEvaluationParams {
    pub token: Option<String>,
    #[schemars(description = "Existing evaluation id; omit to create or upsert by proposal")]
    pub id: Option<i64>,
    #[schemars(description = "{proposalId, scores: {practicality..equity: 1-5}, notes, status: draft|submitted}")]
    pub evaluation: serde_json::Value,
}

// ── Document params ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetDocumentsParams {
    pub token: Option<String>,
    pub id: Option<i64>,
    pub slug: Option<String>,
    #[schemars(description = "Include the archived version ledger")]
    pub versions: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDocumentParams {
    pub token: Option<String>,
    #[schemars(description = "{title, content, docType, visibility: public|members|private, slug}")]
    pub document: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateDocumentParams {
    pub token: Option<String>,
    pub id: i64,
    #[schemars(description = "publish or unpublish; omit for a field update")]
    pub action: Option<String>,
    #[schemars(description = "{title, content, docType, visibility}; each field optional")]
    pub changes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteDocumentParams {
    pub token: Option<String>,
    pub id: i64,
}
