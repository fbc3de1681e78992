//! MCP server for Polis. Exposes the `PolisApi` operations as tools over
//! stdio.
//!
//! Write tools take an optional bearer `token`, resolved through the
//! configured identity provider.

pub mod params;

use params::*;
use crate::activity::ActivityRecorder;
use crate::api::{Params, PolisApi};
use crate::catalog::{EntityKind, EntityRef};
use crate::config::PolisConfig;
use crate::error::PolisResult;
use crate::identity::{Identity, IdentityProvider};
use crate::relation::Direction;
use crate::seed::Ontology;
use crate::storage::{OpenStore, SqliteStore};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn err_text(msg: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg)]))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Success bodies as JSON; failures as the error envelope plus status.
fn respond(result: PolisResult<Value>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(body) => ok_text(pretty(&body)),
        Err(e) => {
            let envelope = serde_json::to_value(e.envelope()).unwrap_or(Value::Null);
            err_text(pretty(&json!({ "status": e.status(), "body": envelope })))
        }
    }
}

fn params<'p>(pairs: impl IntoIterator<Item = (&'p str, Option<String>)>) -> Params {
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
}

fn direction(raw: Option<&str>) -> Result<Direction, String> {
    match raw.unwrap_or("outgoing") {
        "outgoing" => Ok(Direction::Outgoing),
        "incoming" => Ok(Direction::Incoming),
        "both" => Ok(Direction::Both),
        other => Err(format!("invalid direction: '{}'", other)),
    }
}

// ---------------------------------------------------------------------------
// PolisMcpServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PolisMcpServer {
    api: PolisApi<SqliteStore>,
    identities: Arc<dyn IdentityProvider>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PolisMcpServer {
    pub fn new(api: PolisApi<SqliteStore>, identities: Arc<dyn IdentityProvider>) -> Self {
        Self {
            api,
            identities,
            tool_router: Self::tool_router(),
        }
    }

    fn caller(&self, token: Option<&str>) -> Option<Identity> {
        self.identities.current_user(token)
    }

    // ── Catalog tools ───────────────────────────────────────────────────

    #[tool(description = "Read the ontology: one record by id or code, a filtered page, or the visualization graph")]
    fn get_resource(&self, Parameters(p): Parameters<GetResourceParams>) -> Result<CallToolResult, McpError> {
        let params = params([
            ("resource", Some(p.resource)),
            ("id", p.id.map(|v| v.to_string())),
            ("code", p.code),
            ("type", p.r#type),
            ("domain", p.domain),
            ("status", p.status),
            ("search", p.search),
            ("limit", p.limit.map(|v| v.to_string())),
            ("offset", p.offset.map(|v| v.to_string())),
            ("conceptId", p.concept_id.map(|v| v.to_string())),
        ]);
        respond(self.api.get_resource(&params))
    }

    #[tool(description = "Read architecture elements, or one element with the proposals attached to it")]
    fn get_architecture(
        &self,
        Parameters(p): Parameters<GetArchitectureParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params([
            ("id", p.id.map(|v| v.to_string())),
            ("code", p.code),
            ("type", p.r#type),
            ("search", p.search),
            ("limit", p.limit.map(|v| v.to_string())),
            ("offset", p.offset.map(|v| v.to_string())),
        ]);
        respond(self.api.get_architecture(&params))
    }

    #[tool(description = "List relations at an entity together with the entity at the other end")]
    fn get_neighbors(&self, Parameters(p): Parameters<NeighborsParams>) -> Result<CallToolResult, McpError> {
        let kind: EntityKind = match p.kind.parse() {
            Ok(kind) => kind,
            Err(e) => return err_text(e),
        };
        let direction = match direction(p.direction.as_deref()) {
            Ok(d) => d,
            Err(e) => return err_text(e),
        };
        respond(self.api.get_neighbors(&EntityRef::new(kind, p.id), direction))
    }

    #[tool(description = "Add a typed relation between two entities (curator or admin); duplicates are reported")]
    fn create_relation(&self, Parameters(p): Parameters<CreateRelationParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        respond(self.api.post_relation(caller.as_ref(), p.relation))
    }

    #[tool(description = "Delete a relation by id (curator or admin)")]
    fn delete_relation(&self, Parameters(p): Parameters<DeleteRelationParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        respond(self.api.delete_relation(caller.as_ref(), &Params::new().with("id", p.id)))
    }

    // ── Evaluation tools ────────────────────────────────────────────────

    #[tool(description = "Read one PRIME evaluation by id, or a proposal's evaluations with their aggregate")]
    fn get_evaluations(&self, Parameters(p): Parameters<GetEvaluationsParams>) -> Result<CallToolResult, McpError> {
        let viewer = self.caller(p.token.as_deref());
        let params = params([
            ("id", p.id.map(|v| v.to_string())),
            ("proposalId", p.proposal_id.map(|v| v.to_string())),
        ]);
        respond(self.api.get_evaluations(viewer.as_ref(), &params))
    }

    #[tool(description = "Save the caller's PRIME evaluation of a proposal (draft or submitted)")]
    fn save_evaluation(&self, Parameters(p): Parameters<SaveEvaluationParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        match p.id {
            Some(id) => respond(self.api.put_evaluation(
                caller.as_ref(),
                &Params::new().with("id", id),
                p.evaluation,
            )),
            None => respond(self.api.post_evaluation(caller.as_ref(), p.evaluation)),
        }
    }

    // ── Document tools ──────────────────────────────────────────────────

    #[tool(description = "Read one document by id or slug, or list the documents visible to the caller")]
    fn get_documents(&self, Parameters(p): Parameters<GetDocumentsParams>) -> Result<CallToolResult, McpError> {
        let viewer = self.caller(p.token.as_deref());
        let params = params([
            ("id", p.id.map(|v| v.to_string())),
            ("slug", p.slug),
            ("versions", p.versions.map(|v| v.to_string())),
        ]);
        respond(self.api.get_documents(viewer.as_ref(), &params))
    }

    #[tool(description = "Create a document owned by the caller")]
    fn create_document(&self, Parameters(p): Parameters<CreateDocumentParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        respond(self.api.post_document(caller.as_ref(), p.document))
    }

    #[tool(description = "Update a document (archiving changed content), or publish/unpublish it")]
    fn update_document(&self, Parameters(p): Parameters<UpdateDocumentParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        let params = params([("id", Some(p.id.to_string())), ("action", p.action)]);
        let changes = p.changes.unwrap_or_else(|| json!({}));
        respond(self.api.put_document(caller.as_ref(), &params, changes))
    }

    #[tool(description = "Delete a document and its version history (owner or admin)")]
    fn delete_document(&self, Parameters(p): Parameters<DeleteDocumentParams>) -> Result<CallToolResult, McpError> {
        let caller = self.caller(p.token.as_deref());
        respond(self.api.delete_document(caller.as_ref(), &Params::new().with("id", p.id)))
    }
}

#[tool_handler]
impl ServerHandler for PolisMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Polis MCP server: policy ontology, relation graph, PRIME evaluations and versioned documents".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run_mcp_server(config: &PolisConfig) -> i32 {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to create tokio runtime");
            return 1;
        }
    };

    rt.block_on(async {
        let store = match SqliteStore::open(&config.db_path) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!(path = %config.db_path.display(), error = %e, "failed to open database");
                return 1;
            }
        };
        let activity: Arc<dyn ActivityRecorder> = store.clone();
        let api = PolisApi::new(store, activity);

        if config.seed_on_start {
            let seeded = Ontology::builtin()
                .map_err(|e| e.to_string())
                .and_then(|ontology| api.seed(&ontology).map_err(|e| e.to_string()));
            if let Err(e) = seeded {
                tracing::error!(error = %e, "seeding failed");
                return 1;
            }
        }

        let server = PolisMcpServer::new(api, Arc::new(config.identity_provider()));

        tracing::info!(db = %config.db_path.display(), "polis mcp server starting on stdio");

        let service = match server.serve(rmcp::transport::stdio()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to start MCP server");
                return 1;
            }
        };

        if let Err(e) = service.waiting().await {
            tracing::error!(error = %e, "MCP server error");
            return 1;
        }

        0
    })
}
