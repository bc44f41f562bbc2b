//! Federated joins with a direct-lookup fallback.
//!
//! A join that matches nothing is re-run as a plain lookup on the parent
//! index with the same query, and the envelope carries a `note` saying so.

use super::params::{GraphJoinParams, GraphLookupParams};
use super::{Envelope, TaskHandler, TaskKind, TaskParams};
use crate::backend::{
    client::{JOIN_TIMEOUT, LOOKUP_TIMEOUT},
    search_body, Catalog, JoinClause, Query, SearchBackend, SearchResponse,
};
use crate::error::{BackendError, TaskError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Child/parent join keys, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeys {
    pub child_key: String,
    pub parent_key: String,
}

/// Builds lookups and joins against arbitrary indices.
#[derive(Clone)]
pub struct JoinComposer {
    backend: Arc<dyn SearchBackend>,
    catalog: Catalog,
}

impl JoinComposer {
    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        Self { backend, catalog }
    }

    /// Direct search on one index.
    pub async fn lookup(
        &self,
        index: &str,
        query: &Value,
        size: usize,
    ) -> Result<Envelope, BackendError> {
        let body = search_body(size, &Query::Raw(query.clone()));
        let path = self.catalog.search_path(index);
        let response = SearchResponse::parse(
            &path,
            self.backend.post(&path, &body, LOOKUP_TIMEOUT).await?,
        )?;
        Ok(hits_envelope(&response, index))
    }

    /// Join `parent_index` to `child_index` documents matching `query`.
    pub async fn join(
        &self,
        parent_index: &str,
        child_index: &str,
        keys: &JoinKeys,
        query: &Value,
        size: usize,
        join_type: Option<String>,
    ) -> Result<Envelope, BackendError> {
        let join = JoinClause::new(child_index, &keys.child_key, &keys.parent_key)
            .with_type(join_type)
            .with_request(Query::Raw(query.clone()));
        let body = search_body(size, &Query::Join(join));
        let path = self.catalog.join_path(parent_index);
        let response =
            SearchResponse::parse(&path, self.backend.post(&path, &body, JOIN_TIMEOUT).await?)?;

        if response.total() == 0 {
            warn!(
                "Join {}<-{} on {:?} returned nothing, falling back to lookup",
                parent_index, child_index, keys
            );
            let fallback = self.lookup(parent_index, query, size).await?;
            return Ok(fallback.with_note(format!(
                "join {} <- {} on [{}, {}] returned no hits; showing a direct lookup on {} with the same query",
                parent_index, child_index, keys.child_key, keys.parent_key, parent_index
            )));
        }

        info!(
            "Join {}<-{} matched {} documents",
            parent_index,
            child_index,
            response.total()
        );
        Ok(hits_envelope(&response, parent_index))
    }
}

fn hits_envelope(response: &SearchResponse, index: &str) -> Envelope {
    let items = response.sources();
    Envelope::success(format!(
        "{} results (top {}) in {}.",
        response.total(),
        items.len(),
        index
    ))
    .with_items(items)
}

/// Handler exposing raw lookups and joins as tasks.
pub struct RelationsHandler {
    composer: JoinComposer,
}

impl RelationsHandler {
    pub const TASKS: &'static [TaskKind] = &[TaskKind::GraphLookup, TaskKind::GraphJoin];

    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        Self {
            composer: JoinComposer::new(backend, catalog),
        }
    }

    async fn graph_lookup(&self, params: GraphLookupParams) -> Result<Envelope, TaskError> {
        Ok(self
            .composer
            .lookup(&params.index, &params.query, params.size)
            .await?)
    }

    async fn graph_join(&self, params: GraphJoinParams) -> Result<Envelope, TaskError> {
        let keys = JoinKeys {
            child_key: params.child_key,
            parent_key: params.parent_key,
        };
        Ok(self
            .composer
            .join(
                &params.parent_index,
                &params.child_index,
                &keys,
                &params.query,
                params.size,
                params.join_type,
            )
            .await?)
    }
}

#[async_trait]
impl TaskHandler for RelationsHandler {
    fn declared_tasks(&self) -> &'static [TaskKind] {
        Self::TASKS
    }

    async fn handle(&self, params: TaskParams) -> Result<Envelope, TaskError> {
        match params {
            TaskParams::GraphLookup(p) => self.graph_lookup(p).await,
            TaskParams::GraphJoin(p) => self.graph_join(p).await,
            other => Err(TaskError::Unsupported {
                task: other.kind().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{hits, FakeBackend};
    use serde_json::json;

    fn keys() -> JoinKeys {
        JoinKeys {
            child_key: "companies".to_string(),
            parent_key: "id".to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_with_hits_uses_join_endpoint() {
        let backend = Arc::new(FakeBackend::new().respond(|path, _| {
            (path == "/siren/company/_search").then(|| hits(&[json!({ "id": "c1" })]))
        }));
        let composer = JoinComposer::new(backend.clone(), Catalog::default());

        let envelope = composer
            .join("company", "investment", &keys(), &json!({ "match_all": {} }), 10, None)
            .await
            .unwrap();

        assert!(envelope.note.is_none());
        assert_eq!(envelope.record_count(), 1);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].body,
            json!({
                "size": 10,
                "query": { "join": {
                    "indices": ["investment"],
                    "on": ["companies", "id"],
                    "request": { "query": { "match_all": {} } }
                }}
            })
        );
    }

    #[tokio::test]
    async fn test_empty_join_falls_back_to_same_lookup() {
        let query = json!({ "term": { "raised_currency_code": "USD" } });
        let responder = |path: &str, _: &Value| {
            (path == "/company/_search").then(|| hits(&[json!({ "id": "c1", "label": "Acme" })]))
        };

        let backend = Arc::new(FakeBackend::new().respond(responder));
        let composer = JoinComposer::new(backend.clone(), Catalog::default());
        let fallback = composer
            .join("company", "investment", &keys(), &query, 5, Some("HASH_JOIN".to_string()))
            .await
            .unwrap();

        let direct = JoinComposer::new(
            Arc::new(FakeBackend::new().respond(responder)),
            Catalog::default(),
        )
        .lookup("company", &query, 5)
        .await
        .unwrap();

        assert!(fallback.note.is_some());
        assert_eq!(fallback.summary, direct.summary);
        assert_eq!(fallback.body, direct.body);
        assert_eq!(Envelope { note: None, ..fallback }, direct);

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].path, "/siren/company/_search");
        assert_eq!(calls[0].body["query"]["join"]["type"], "HASH_JOIN");
        assert_eq!(calls[1].path, "/company/_search");
        assert_eq!(calls[1].body["query"], query);
    }

    #[tokio::test]
    async fn test_join_with_one_malformed_hit_keeps_the_others() {
        let backend = Arc::new(FakeBackend::new().respond(|path, _| {
            (path == "/siren/company/_search").then(|| {
                json!({ "hits": {
                    "total": { "value": 2 },
                    "hits": [{ "_source": { "id": "c1" } }, { "_source": null }]
                }})
            })
        }));
        let composer = JoinComposer::new(backend.clone(), Catalog::default());

        let envelope = composer
            .join("company", "investment", &keys(), &json!({ "match_all": {} }), 10, None)
            .await
            .unwrap();

        assert!(envelope.note.is_none());
        assert_eq!(envelope.summary.as_deref(), Some("2 results (top 1) in company."));
        assert_eq!(envelope.get("items"), Some(&json!([{ "id": "c1" }])));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_join_reply_that_is_not_a_search_response_is_an_error() {
        let backend = Arc::new(FakeBackend::new().respond(|_, _| Some(json!({ "hits": "oops" }))));
        let err = JoinComposer::new(backend.clone(), Catalog::default())
            .join("company", "investment", &keys(), &json!({ "match_all": {} }), 10, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::InvalidResponse { .. }));
        assert_eq!(err.path(), "/siren/company/_search");
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_declares_graph_tasks() {
        let handler = RelationsHandler::new(Arc::new(FakeBackend::new()), Catalog::default());
        assert!(handler.supports(TaskKind::GraphJoin));
        assert!(!handler.supports(TaskKind::LookupCompany));

        let envelope = handler
            .handle(TaskParams::GraphLookup(GraphLookupParams {
                index: "investor".to_string(),
                query: json!({ "match_all": {} }),
                size: 50,
            }))
            .await
            .unwrap();
        assert_eq!(envelope.summary.as_deref(), Some("0 results (top 0) in investor."));
    }
}
