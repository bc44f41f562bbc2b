//! Simple filtered lookups over the three collections.

use super::params::{InvestmentLookupParams, LabelLookupParams};
use super::{Envelope, TaskHandler, TaskKind, TaskParams};
use crate::backend::{
    client::LOOKUP_TIMEOUT, search_body, Catalog, Query, SearchBackend, SearchResponse,
};
use crate::error::{BackendError, TaskError};
use crate::models::{fields, Collection};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub struct ForagingHandler {
    backend: Arc<dyn SearchBackend>,
    catalog: Catalog,
}

impl ForagingHandler {
    pub const TASKS: &'static [TaskKind] = &[
        TaskKind::LookupCompany,
        TaskKind::LookupInvestment,
        TaskKind::LookupInvestor,
    ];

    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        Self { backend, catalog }
    }

    async fn lookup(
        &self,
        collection: Collection,
        query: &Query,
        size: usize,
    ) -> Result<Envelope, BackendError> {
        let index = self.catalog.index(collection);
        let body = search_body(size, query);
        let path = self.catalog.search_path(index);
        let response = SearchResponse::parse(
            &path,
            self.backend.post(&path, &body, LOOKUP_TIMEOUT).await?,
        )?;
        let items = response.sources();
        info!("Lookup in {} matched {}", index, response.total());

        Ok(Envelope::success(format!(
            "{} results (top {}) in {}.",
            response.total(),
            items.len(),
            index
        ))
        .with_items(items))
    }
}

/// `label` as full-text match, else `label_wildcard`, else everything.
fn label_query(params: &LabelLookupParams) -> Query {
    if let Some(ref label) = params.label {
        Query::Match {
            field: fields::LABEL.to_string(),
            value: json!(label),
        }
    } else if let Some(ref pattern) = params.label_wildcard {
        Query::Wildcard {
            field: fields::LABEL.to_string(),
            pattern: pattern.clone(),
        }
    } else {
        Query::MatchAll
    }
}

fn investment_query(params: &InvestmentLookupParams) -> Query {
    if params.filter.is_empty() {
        Query::MatchAll
    } else {
        params.filter.to_query()
    }
}

#[async_trait]
impl TaskHandler for ForagingHandler {
    fn declared_tasks(&self) -> &'static [TaskKind] {
        Self::TASKS
    }

    async fn handle(&self, params: TaskParams) -> Result<Envelope, TaskError> {
        let envelope = match params {
            TaskParams::LookupCompany(p) => {
                self.lookup(Collection::Company, &label_query(&p), p.size)
                    .await?
            }
            TaskParams::LookupInvestor(p) => {
                self.lookup(Collection::Investor, &label_query(&p), p.size)
                    .await?
            }
            TaskParams::LookupInvestment(p) => {
                self.lookup(Collection::Investment, &investment_query(&p), p.size)
                    .await?
            }
            other => {
                return Err(TaskError::Unsupported {
                    task: other.kind().to_string(),
                })
            }
        };
        Ok(envelope)
    }
}
