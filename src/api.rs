//! Transport-independent API layer.
//!
//! `PolisApi` is the single entry point for consumer-facing operations, one
//! method per (verb, resource) pair. Transports resolve the caller's identity
//! and hand over query parameters and JSON bodies; they never reach into the
//! components directly.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::activity::ActivityRecorder;
use crate::catalog::{
    ActorType, ArchitectureElement, Catalog, CatalogQuery, Concept, EntityKey, EntityRef, Evidence, Framework,
    IntellectualSource, Page, Tension,
};
use crate::document::{DocumentKey, DocumentLedger, DocumentUpdate, NewDocument};
use crate::error::{PolisError, PolisResult};
use crate::evaluation::{EvaluationEngine, EvaluationInput};
use crate::graph::GraphAssembler;
use crate::identity::Identity;
use crate::relation::{Direction, InsertOutcome, NewRelation, RelationGraph};
use crate::seed::{Ontology, SeedReport, Seeder};
use crate::storage::{EntityRow, Store};

string_enum! {
    /// Collections served by the read-only catalog endpoint.
    pub enum Resource ("resource") {
        Concepts => "concepts",
        Frameworks => "frameworks",
        Tensions => "tensions",
        Evidence => "evidence",
        Sources => "sources",
        Actors => "actors",
        Graph => "graph",
    }
}

/// Query-string parameters of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Trimmed value; blank counts as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> PolisResult<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| PolisError::validation(format!("invalid {}: '{}'", key, raw)))
            })
            .transpose()
    }

    pub fn required<T: FromStr>(&self, key: &str) -> PolisResult<T> {
        self.parse(key)?
            .ok_or_else(|| PolisError::validation(format!("{} is required", key)))
    }

    fn entity_key(&self) -> PolisResult<Option<EntityKey<'_>>> {
        if let Some(id) = self.parse::<i64>("id")? {
            return Ok(Some(EntityKey::Id(id)));
        }
        Ok(self.get("code").map(EntityKey::Code))
    }

    fn catalog_query(&self) -> PolisResult<CatalogQuery> {
        let mut query = CatalogQuery::new();
        query.filter.entity_type = self.get("type").map(str::to_string);
        query.filter.domain = self.get("domain").map(str::to_string);
        query.filter.status = self.get("status").map(str::to_string);
        query.filter.search = self.get("search").map(str::to_string);
        query.limit = self.parse("limit")?;
        query.offset = self.parse("offset")?;
        Ok(query)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Relation insert payload; endpoints are `{kind, id}` objects.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationBody {
    source: EntityRef,
    relation_type: String,
    target: EntityRef,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bidirectional: Option<bool>,
}

impl RelationBody {
    fn into_relation(self) -> NewRelation {
        let mut relation = NewRelation::new(self.source, self.relation_type, self.target);
        if let Some(weight) = self.weight {
            relation = relation.with_weight(weight);
        }
        if let Some(description) = self.description {
            relation = relation.with_description(description);
        }
        if let Some(bidirectional) = self.bidirectional {
            relation = relation.bidirectional(bidirectional);
        }
        relation
    }
}

fn body<T: DeserializeOwned>(value: Value) -> PolisResult<T> {
    serde_json::from_value(value).map_err(|e| PolisError::validation(format!("invalid request body: {}", e)))
}

/// `{<name>: items, total, limit, offset}`
fn page_body<T: Serialize>(name: &str, page: Page<T>) -> PolisResult<Value> {
    let mut body = Map::new();
    body.insert(name.to_string(), serde_json::to_value(&page.items)?);
    body.insert("total".into(), json!(page.total));
    body.insert("limit".into(), json!(page.limit));
    body.insert("offset".into(), json!(page.offset));
    Ok(Value::Object(body))
}

/// Single entry point for all consumer-facing operations.
pub struct PolisApi<S: Store> {
    store: Arc<S>,
    activity: Arc<dyn ActivityRecorder>,
}

impl<S: Store> Clone for PolisApi<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            activity: Arc::clone(&self.activity),
        }
    }
}

impl<S: Store> PolisApi<S> {
    pub fn new(store: Arc<S>, activity: Arc<dyn ActivityRecorder>) -> Self {
        Self { store, activity }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> Catalog<'_, S> {
        Catalog::new(&*self.store, &*self.activity)
    }

    pub fn relations(&self) -> RelationGraph<'_, S> {
        RelationGraph::new(&*self.store, &*self.activity)
    }

    pub fn evaluations(&self) -> EvaluationEngine<'_, S> {
        EvaluationEngine::new(&*self.store, &*self.activity)
    }

    pub fn documents(&self) -> DocumentLedger<'_, S> {
        DocumentLedger::new(&*self.store, &*self.activity)
    }

    pub fn seed(&self, ontology: &Ontology) -> PolisResult<SeedReport> {
        Seeder::new(&*self.store).seed(ontology)
    }

    // === Catalog ===

    /// `GET ?resource=...`: one record by `id`/`code`, or a filtered page.
    pub fn get_resource(&self, params: &Params) -> PolisResult<Value> {
        let resource: Resource = params.required("resource")?;
        match resource {
            Resource::Concepts => match params.entity_key()? {
                Some(key) => {
                    let concept: Concept = self.catalog().get(key)?;
                    let evidence = self.catalog().evidence_for_concept(concept.id)?;
                    let relations = self.relations().both(&EntityRef::concept(concept.id))?;
                    Ok(json!({ "concept": concept, "evidence": evidence, "relations": relations }))
                }
                None => self.listing::<Concept>("concepts", params),
            },
            Resource::Frameworks => match params.entity_key()? {
                Some(key) => {
                    let framework: Framework = self.catalog().get(key)?;
                    let elements = self.catalog().framework_elements(framework.id)?;
                    Ok(json!({ "framework": framework, "elements": elements }))
                }
                None => self.listing::<Framework>("frameworks", params),
            },
            Resource::Tensions => self.single_or_list::<Tension>("tension", "tensions", params),
            Resource::Evidence => {
                if let Some(concept_id) = params.parse::<i64>("conceptId")? {
                    let evidence = self.catalog().evidence_for_concept(concept_id)?;
                    return Ok(json!({ "evidence": evidence }));
                }
                self.single_or_list::<Evidence>("evidence", "evidence", params)
            }
            Resource::Sources => self.single_or_list::<IntellectualSource>("source", "sources", params),
            Resource::Actors => self.single_or_list::<ActorType>("actor", "actors", params),
            Resource::Graph => Ok(serde_json::to_value(GraphAssembler::new(&*self.store).build()?)?),
        }
    }

    /// `GET architecture`: one element with its proposals, or a page.
    pub fn get_architecture(&self, params: &Params) -> PolisResult<Value> {
        match params.entity_key()? {
            Some(key) => {
                let element: ArchitectureElement = self.catalog().get(key)?;
                let proposals = self.catalog().proposals_for_architecture_element(element.id)?;
                Ok(json!({ "element": element, "proposals": proposals }))
            }
            None => self.listing::<ArchitectureElement>("elements", params),
        }
    }

    fn single_or_list<E: EntityRow>(&self, one: &str, many: &str, params: &Params) -> PolisResult<Value> {
        match params.entity_key()? {
            Some(key) => {
                let entity: E = self.catalog().get(key)?;
                let mut body = Map::new();
                body.insert(one.to_string(), serde_json::to_value(entity)?);
                Ok(Value::Object(body))
            }
            None => self.listing::<E>(many, params),
        }
    }

    fn listing<E: EntityRow>(&self, name: &str, params: &Params) -> PolisResult<Value> {
        page_body(name, self.catalog().list::<E>(&params.catalog_query()?)?)
    }

    // === Evaluations ===

    /// `GET evaluations`: by `id`, or every visible row of `proposalId` with
    /// the aggregate.
    pub fn get_evaluations(&self, viewer: Option<&Identity>, params: &Params) -> PolisResult<Value> {
        if let Some(id) = params.parse::<i64>("id")? {
            let evaluation = self.evaluations().get(viewer, id)?;
            return Ok(json!({ "evaluation": evaluation }));
        }
        let proposal_id: i64 = params.required("proposalId")?;
        Ok(serde_json::to_value(self.evaluations().for_proposal(viewer, proposal_id)?)?)
    }

    pub fn post_evaluation(&self, identity: Option<&Identity>, payload: Value) -> PolisResult<Value> {
        let input: EvaluationInput = body(payload)?;
        let evaluation = self.evaluations().save(identity, &input)?;
        Ok(json!({ "evaluation": evaluation }))
    }

    pub fn put_evaluation(&self, identity: Option<&Identity>, params: &Params, payload: Value) -> PolisResult<Value> {
        let id: i64 = params.required("id")?;
        let input: EvaluationInput = body(payload)?;
        let evaluation = self.evaluations().update(identity, id, &input)?;
        Ok(json!({ "evaluation": evaluation }))
    }

    // === Documents ===

    /// `GET documents`: by `id` or `slug` (add `versions=true` for the
    /// ledger), otherwise every document the viewer may read.
    pub fn get_documents(&self, viewer: Option<&Identity>, params: &Params) -> PolisResult<Value> {
        let key = match (params.parse::<i64>("id")?, params.get("slug")) {
            (Some(id), _) => Some(DocumentKey::Id(id)),
            (None, Some(slug)) => Some(DocumentKey::Slug(slug)),
            (None, None) => None,
        };
        let Some(key) = key else {
            return Ok(json!({ "documents": self.documents().list(viewer)? }));
        };

        let document = self.documents().get(viewer, key)?;
        if params.parse::<bool>("versions")?.unwrap_or(false) {
            let versions = self.documents().versions(viewer, document.id)?;
            return Ok(json!({ "document": document, "versions": versions }));
        }
        Ok(json!({ "document": document }))
    }

    pub fn post_document(&self, identity: Option<&Identity>, payload: Value) -> PolisResult<Value> {
        let new: NewDocument = body(payload)?;
        let document = self.documents().create(identity, &new)?;
        Ok(json!({ "document": document }))
    }

    /// `PUT documents?id=`: `action=publish|unpublish`, else a field update.
    pub fn put_document(&self, identity: Option<&Identity>, params: &Params, payload: Value) -> PolisResult<Value> {
        let id: i64 = params.required("id")?;
        let document = match params.get("action") {
            Some("publish") => self.documents().publish(identity, id)?,
            Some("unpublish") => self.documents().unpublish(identity, id)?,
            Some(other) => return Err(PolisError::validation(format!("unknown action '{}'", other))),
            None => {
                let update: DocumentUpdate = body(payload)?;
                self.documents().update(identity, id, &update)?
            }
        };
        Ok(json!({ "document": document }))
    }

    pub fn delete_document(&self, identity: Option<&Identity>, params: &Params) -> PolisResult<Value> {
        let id: i64 = params.required("id")?;
        self.documents().delete(identity, id)?;
        Ok(json!({ "deleted": id }))
    }

    // === Relations ===

    /// Neighbours of one entity, far endpoints resolved.
    pub fn get_neighbors(&self, entity: &EntityRef, direction: Direction) -> PolisResult<Value> {
        Ok(json!({ "neighbors": self.relations().neighbors(entity, direction)? }))
    }

    /// `{relationId, duplicate}`; a repeated 5-tuple is reported, not rejected.
    pub fn post_relation(&self, identity: Option<&Identity>, payload: Value) -> PolisResult<Value> {
        let relation = body::<RelationBody>(payload)?.into_relation();
        Ok(match self.relations().insert_edge(identity, &relation)? {
            InsertOutcome::Inserted(id) => json!({ "relationId": id, "duplicate": false }),
            InsertOutcome::Duplicate => json!({ "relationId": null, "duplicate": true }),
        })
    }

    pub fn delete_relation(&self, identity: Option<&Identity>, params: &Params) -> PolisResult<Value> {
        let id: i64 = params.required("id")?;
        self.relations().delete_edge(identity, id)?;
        Ok(json!({ "deleted": id }))
    }
}
