//! Answers without an LLM.
//!
//! Lists the companies reachable from investments through the
//! `companies -> id` join.

use crate::backend::{
    self, client::JOIN_TIMEOUT, search_body, Catalog, JoinClause, Query, SearchBackend,
    SearchResponse,
};
use crate::error::BackendError;
use crate::models::fields;
use tracing::warn;

const TOP_COMPANIES: usize = 10;

pub async fn local_summary(
    backend: &dyn SearchBackend,
    catalog: &Catalog,
) -> Result<String, BackendError> {
    if let Err(e) = backend::list_indices(backend).await {
        warn!("Backend check failed: {}", e);
        return Ok("Search backend is unavailable.".to_string());
    }

    let join = JoinClause::new(&catalog.investment, fields::COMPANIES, fields::ID)
        .with_request(Query::MatchAll);
    let body = search_body(TOP_COMPANIES, &Query::Join(join));
    let path = catalog.join_path(&catalog.company);
    let response = SearchResponse::parse(&path, backend.post(&path, &body, JOIN_TIMEOUT).await?)?;

    if response.hits().is_empty() {
        return Ok(format!(
            "No results via {}→{} (on=['{}','{}']).",
            catalog.investment,
            catalog.company,
            fields::COMPANIES,
            fields::ID
        ));
    }

    let lines: Vec<String> = response
        .hits()
        .iter()
        .map(|hit| {
            let name = hit
                .str_field(fields::LABEL)
                .map(String::from)
                .or_else(|| hit.id())
                .unwrap_or_default();
            format!("- {}", name)
        })
        .collect();
    Ok(format!("Top results:\n{}", lines.join("\n")))
}
