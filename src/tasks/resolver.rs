//! Label to id resolution.
//!
//! Exact match on the non-analyzed `label.raw` field first, then on the
//! analyzed `label` field. Duplicate labels resolve to the backend's first
//! ranked hit.

use super::params::EntityRef;
use crate::backend::{
    client::JOIN_TIMEOUT, search_body, Catalog, Query, SearchBackend, SearchResponse,
};
use crate::error::{BackendError, TaskError};
use crate::models::{fields, Collection};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct LabelResolver {
    backend: Arc<dyn SearchBackend>,
    catalog: Catalog,
}

impl LabelResolver {
    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        Self { backend, catalog }
    }

    /// Id of the first document whose label matches exactly, if any.
    pub async fn resolve_id(
        &self,
        collection: Collection,
        label: &str,
    ) -> Result<Option<String>, BackendError> {
        let path = self.catalog.search_path(self.catalog.index(collection));

        for field in [fields::LABEL_RAW, fields::LABEL] {
            let body = search_body(1, &Query::term(field, label));
            let response =
                SearchResponse::parse(&path, self.backend.post(&path, &body, JOIN_TIMEOUT).await?)?;
            if let Some(hit) = response.hits().first() {
                debug!("Resolved {} '{}' via {}", collection, label, field);
                return Ok(hit.id());
            }
        }

        Ok(None)
    }

    /// Turn an entity reference into an id, reporting unknown labels.
    pub async fn require_id(
        &self,
        collection: Collection,
        entity: &EntityRef,
    ) -> Result<String, TaskError> {
        match entity {
            EntityRef::Id(id) => Ok(id.clone()),
            EntityRef::Label(label) => self
                .resolve_id(collection, label)
                .await?
                .ok_or_else(|| TaskError::NotFound {
                    kind: collection.kind(),
                    label: label.clone(),
                }),
        }
    }
}
