//! Query DSL and search response types.
//!
//! Queries are built as a small typed tree and rendered to the backend's JSON
//! request format only when they are sent.

use crate::error::BackendError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

/// A predicate tree understood by the search backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    Match { field: String, value: Value },
    Term { field: String, value: Value },
    Terms { field: String, values: Vec<Value> },
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
    Wildcard { field: String, pattern: String },
    GeoDistance {
        field: String,
        distance_km: f64,
        lat: f64,
        lon: f64,
    },
    /// Conjunctive filter context.
    Filter(Vec<Query>),
    Join(JoinClause),
    /// Caller-supplied DSL passed through untouched.
    Raw(Value),
}

/// The federated `join` clause: parent documents whose `parent_key` matches
/// `child_key` of child documents selected by `request`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub child_index: String,
    pub child_key: String,
    pub parent_key: String,
    pub join_type: Option<String>,
    pub request: Option<Box<Query>>,
}

impl Query {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Query::Terms {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Match { field, value } => json!({ "match": { field.as_str(): value } }),
            Query::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Query::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Query::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), gte.clone());
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), lte.clone());
                }
                json!({ "range": { field.as_str(): bounds } })
            }
            Query::Wildcard { field, pattern } => {
                json!({ "wildcard": { field.as_str(): { "value": pattern } } })
            }
            Query::GeoDistance {
                field,
                distance_km,
                lat,
                lon,
            } => json!({
                "geo_distance": {
                    "distance": format!("{}km", distance_km),
                    field.as_str(): { "lat": lat, "lon": lon }
                }
            }),
            Query::Filter(clauses) => {
                let filter: Vec<Value> = clauses.iter().map(Query::to_value).collect();
                json!({ "bool": { "filter": filter } })
            }
            Query::Join(join) => json!({ "join": join.to_value() }),
            Query::Raw(value) => value.clone(),
        }
    }
}

impl JoinClause {
    pub fn new(child_index: &str, child_key: &str, parent_key: &str) -> Self {
        Self {
            child_index: child_index.to_string(),
            child_key: child_key.to_string(),
            parent_key: parent_key.to_string(),
            join_type: None,
            request: None,
        }
    }

    pub fn with_request(mut self, query: Query) -> Self {
        self.request = Some(Box::new(query));
        self
    }

    pub fn with_type(mut self, join_type: Option<String>) -> Self {
        self.join_type = join_type;
        self
    }

    fn to_value(&self) -> Value {
        let mut join = Map::new();
        join.insert("indices".to_string(), json!([self.child_index]));
        join.insert("on".to_string(), json!([self.child_key, self.parent_key]));
        if let Some(ref join_type) = self.join_type {
            join.insert("type".to_string(), json!(join_type));
        }
        if let Some(ref request) = self.request {
            join.insert("request".to_string(), json!({ "query": request.to_value() }));
        }
        Value::Object(join)
    }
}

/// Build a `{size, query}` search body.
pub fn search_body(size: usize, query: &Query) -> Value {
    json!({ "size": size, "query": query.to_value() })
}

/// Search response: `{hits: {total: {value}, hits: [{_source}]}}`.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    total: u64,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    hits: Option<RawHits>,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Count(u64),
    Other(Value),
}

/// A single matched document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

impl Hit {
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.source.get(field).and_then(Value::as_str)
    }

    pub fn field(&self, field: &str) -> Value {
        self.source.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Elements of an array field rendered as ids (strings or numbers).
    pub fn id_list(&self, field: &str) -> Vec<String> {
        match self.source.get(field) {
            Some(Value::Array(items)) => items.iter().filter_map(value_as_id).collect(),
            _ => Vec::new(),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.source.get("id").and_then(value_as_id)
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SearchResponse {
    /// Parse the reply of a search on `path`.
    ///
    /// A reply without `hits` reads as empty. Hits that do not parse are
    /// skipped one by one; a reply that is not a search response at all is
    /// an `InvalidResponse`.
    pub fn parse(path: &str, value: Value) -> Result<Self, BackendError> {
        let raw: RawResponse =
            serde_json::from_value(value).map_err(|e| BackendError::InvalidResponse {
                path: path.to_string(),
                message: format!("not a search response: {}", e),
            })?;
        let Some(section) = raw.hits else {
            return Ok(Self::default());
        };

        let total = match section.total {
            Some(TotalHits::Object { value }) => value,
            Some(TotalHits::Count(count)) => count,
            Some(TotalHits::Other(_)) | None => 0,
        };

        let mut hits = Vec::new();
        for (position, hit) in section.hits.unwrap_or_default().into_iter().enumerate() {
            match serde_json::from_value::<Hit>(hit) {
                Ok(hit) => hits.push(hit),
                Err(e) => warn!("Skipping malformed hit #{} from {}: {}", position, path, e),
            }
        }

        Ok(Self { total, hits })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn sources(&self) -> Vec<Value> {
        self.hits
            .iter()
            .map(|h| Value::Object(h.source.clone()))
            .collect()
    }
}
