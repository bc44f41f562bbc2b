//! Search backend access.
//!
//! This module provides the HTTP client, the query DSL and the catalogue of
//! index names shared by every task handler.

pub mod client;
pub mod query;

#[cfg(test)]
pub mod fake;

pub use client::{ClientConfig, SearchBackend, SearchClient};
pub use query::{search_body, Hit, JoinClause, Query, SearchResponse};

use crate::error::BackendError;
use crate::models::Collection;
use serde_json::Value;

/// Index names of the three collections plus the join endpoint prefix.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub company: String,
    pub investment: String,
    pub investor: String,
    pub join_prefix: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            company: "company".to_string(),
            investment: "investment".to_string(),
            investor: "investor".to_string(),
            join_prefix: "/siren".to_string(),
        }
    }
}

impl Catalog {
    pub fn index(&self, collection: Collection) -> &str {
        match collection {
            Collection::Company => &self.company,
            Collection::Investment => &self.investment,
            Collection::Investor => &self.investor,
        }
    }

    /// Plain search endpoint for an index.
    pub fn search_path(&self, index: &str) -> String {
        format!("/{}/_search", index)
    }

    /// Join-capable search endpoint for a parent index.
    pub fn join_path(&self, index: &str) -> String {
        format!("{}/{}/_search", self.join_prefix.trim_end_matches('/'), index)
    }
}

/// Cluster info from `/`.
pub async fn health(backend: &dyn SearchBackend) -> Result<Value, BackendError> {
    backend.get("/", client::HEALTH_TIMEOUT).await
}

/// Index listing from `/_cat/indices`.
pub async fn list_indices(backend: &dyn SearchBackend) -> Result<Value, BackendError> {
    backend
        .get("/_cat/indices?format=json", client::LISTING_TIMEOUT)
        .await
}

/// Field mapping of one index.
pub async fn mapping(backend: &dyn SearchBackend, index: &str) -> Result<Value, BackendError> {
    backend
        .get(&format!("/{}/_mapping", index), client::LOOKUP_TIMEOUT)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_paths() {
        let catalog = Catalog::default();
        assert_eq!(catalog.search_path("company"), "/company/_search");
        assert_eq!(catalog.join_path("company"), "/siren/company/_search");
        assert_eq!(catalog.index(Collection::Investor), "investor");

        let custom = Catalog {
            join_prefix: "/federate/".to_string(),
            ..Catalog::default()
        };
        assert_eq!(custom.join_path("investor"), "/federate/investor/_search");
    }
}
