//! Typed task parameters.
//!
//! The open-ended `params` mapping is validated once, at the coordinator
//! boundary, into one struct per task. Numbers may arrive as JSON numbers or
//! numeric strings, which is what LLM tool calls tend to produce.

use super::TaskKind;
use crate::backend::Query;
use crate::error::TaskError;
use crate::models::fields;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A company given either by id or by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Id(String),
    Label(String),
}

impl EntityRef {
    /// Ids win over labels; empty strings count as absent.
    fn from_parts(id: Option<String>, label: Option<String>) -> Option<Self> {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        non_empty(id)
            .map(EntityRef::Id)
            .or_else(|| non_empty(label).map(EntityRef::Label))
    }
}

/// Conjunctive investment filter on amount, currency and funding year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvestmentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_max: Option<i64>,
}

impl InvestmentFilter {
    pub fn is_empty(&self) -> bool {
        self.min_amount.is_none()
            && self.currency_code.is_none()
            && self.year_min.is_none()
            && self.year_max.is_none()
    }

    /// Filter clauses in a fixed order: amount, currency, year range.
    pub fn to_query(&self) -> Query {
        let mut clauses = Vec::new();
        if let Some(min) = self.min_amount {
            clauses.push(Query::Range {
                field: fields::RAISED_AMOUNT.to_string(),
                gte: Some(json!(min)),
                lte: None,
            });
        }
        if let Some(ref currency) = self.currency_code {
            clauses.push(Query::term(fields::RAISED_CURRENCY, currency.as_str()));
        }
        if self.year_min.is_some() || self.year_max.is_some() {
            clauses.push(Query::Range {
                field: fields::FUNDED_YEAR.to_string(),
                gte: self.year_min.map(|y| json!(y)),
                lte: self.year_max.map(|y| json!(y)),
            });
        }
        Query::Filter(clauses)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityParams {
    pub entity: EntityRef,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityPairParams {
    pub a: EntityRef,
    pub b: EntityRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalParams {
    pub a: EntityRef,
    pub b: EntityRef,
    pub window_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredInvestmentsParams {
    #[serde(flatten)]
    pub filter: InvestmentFilter,
    pub join_company: bool,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoParams {
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
    pub size: usize,
}

/// Lookup by full-text label, label wildcard, or everything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelLookupParams {
    pub label: Option<String>,
    pub label_wildcard: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentLookupParams {
    pub filter: InvestmentFilter,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphLookupParams {
    pub index: String,
    pub query: Value,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphJoinParams {
    pub parent_index: String,
    pub child_index: String,
    pub child_key: String,
    pub parent_key: String,
    pub query: Value,
    pub size: usize,
    pub join_type: Option<String>,
}

/// Validated parameters, one variant per task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskParams {
    EntityInvestors(EntityParams),
    FilteredInvestments(FilteredInvestmentsParams),
    InvestmentsInPeriodCurrency(FilteredInvestmentsParams),
    TopInvestmentsForEntity(EntityParams),
    CommonRelationsBetweenEntities(EntityPairParams),
    CoInvestedEntities(EntityParams),
    GeoNearEntities(GeoParams),
    TemporalOverlapForEntities(TemporalParams),
    LookupCompany(LabelLookupParams),
    LookupInvestment(InvestmentLookupParams),
    LookupInvestor(LabelLookupParams),
    GraphLookup(GraphLookupParams),
    GraphJoin(GraphJoinParams),
}

/// Every key any task reads. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParams {
    #[serde(alias = "entity_id", deserialize_with = "lenient::opt_string")]
    company_id: Option<String>,
    #[serde(alias = "entity_label", deserialize_with = "lenient::opt_string")]
    company_label: Option<String>,
    #[serde(alias = "entity_id_a", deserialize_with = "lenient::opt_string")]
    company_id_a: Option<String>,
    #[serde(alias = "entity_label_a", deserialize_with = "lenient::opt_string")]
    company_label_a: Option<String>,
    #[serde(alias = "entity_id_b", deserialize_with = "lenient::opt_string")]
    company_id_b: Option<String>,
    #[serde(alias = "entity_label_b", deserialize_with = "lenient::opt_string")]
    company_label_b: Option<String>,
    #[serde(deserialize_with = "lenient::opt_usize")]
    size: Option<usize>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    min_amount: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    currency_code: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    year_min: Option<i64>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    year_max: Option<i64>,
    #[serde(alias = "join", deserialize_with = "lenient::opt_bool")]
    join_company: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    window_days: Option<i64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    distance_km: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    label: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    label_wildcard: Option<String>,
    #[serde(alias = "index", deserialize_with = "lenient::opt_string")]
    parent_index: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    child_index: Option<String>,
    on: Option<Value>,
    #[serde(alias = "query")]
    es_query: Option<Value>,
    #[serde(deserialize_with = "lenient::opt_string")]
    join_type: Option<String>,
}

impl RawParams {
    fn filter(&self) -> InvestmentFilter {
        InvestmentFilter {
            min_amount: self.min_amount,
            currency_code: self.currency_code.clone(),
            year_min: self.year_min,
            year_max: self.year_max,
        }
    }

    fn entity(&self) -> Option<EntityRef> {
        EntityRef::from_parts(self.company_id.clone(), self.company_label.clone())
    }

    fn pair(&self) -> Option<(EntityRef, EntityRef)> {
        let a = EntityRef::from_parts(self.company_id_a.clone(), self.company_label_a.clone())?;
        let b = EntityRef::from_parts(self.company_id_b.clone(), self.company_label_b.clone())?;
        Some((a, b))
    }

    /// The caller's query, or `match_all`. A JSON-encoded string is decoded.
    fn query(&self) -> Value {
        match self.es_query {
            Some(Value::String(ref text)) => {
                serde_json::from_str(text).unwrap_or_else(|_| json!({ "match_all": {} }))
            }
            Some(Value::Null) | None => json!({ "match_all": {} }),
            Some(ref query) => query.clone(),
        }
    }

    fn join_keys(&self) -> Option<(String, String)> {
        match self.on {
            Some(Value::Array(ref keys)) if keys.len() == 2 => {
                let child = keys[0].as_str()?.to_string();
                let parent = keys[1].as_str()?.to_string();
                Some((child, parent))
            }
            _ => None,
        }
    }
}

impl TaskParams {
    /// Validate `params` for `task`.
    pub fn parse(task: TaskKind, params: &Value) -> Result<Self, TaskError> {
        let params = match params {
            Value::Null => json!({}),
            Value::Object(_) => params.clone(),
            _ => return Err(TaskError::validation(format!("{} params must be an object", task))),
        };

        let raw: RawParams = serde_json::from_value(params.clone())
            .map_err(|e| TaskError::validation(format!("{} has invalid params: {}", task, e)))?;

        let needs_entity = || {
            TaskError::validation(format!("{} needs company_id or company_label", task))
        };
        let needs_pair = || {
            TaskError::validation(format!(
                "{} needs company_a and company_b (company_id_* or company_label_*)",
                task
            ))
        };

        let parsed = match task {
            TaskKind::EntityInvestors => TaskParams::EntityInvestors(EntityParams {
                entity: raw.entity().ok_or_else(needs_entity)?,
                size: raw.size.unwrap_or(5),
            }),
            TaskKind::TopInvestmentsForEntity => TaskParams::TopInvestmentsForEntity(EntityParams {
                entity: raw.entity().ok_or_else(needs_entity)?,
                size: raw.size.unwrap_or(5),
            }),
            TaskKind::CoInvestedEntities => TaskParams::CoInvestedEntities(EntityParams {
                entity: raw.entity().ok_or_else(needs_entity)?,
                size: raw.size.unwrap_or(10),
            }),
            TaskKind::FilteredInvestments => {
                TaskParams::FilteredInvestments(FilteredInvestmentsParams {
                    filter: raw.filter(),
                    join_company: raw.join_company.unwrap_or(true),
                    size: raw.size.unwrap_or(10),
                })
            }
            TaskKind::InvestmentsInPeriodCurrency => {
                let mut filter = raw.filter();
                filter.min_amount.get_or_insert(0.0);
                TaskParams::InvestmentsInPeriodCurrency(FilteredInvestmentsParams {
                    filter,
                    join_company: raw.join_company.unwrap_or(true),
                    size: raw.size.unwrap_or(10),
                })
            }
            TaskKind::CommonRelationsBetweenEntities => {
                let (a, b) = raw.pair().ok_or_else(needs_pair)?;
                TaskParams::CommonRelationsBetweenEntities(EntityPairParams { a, b })
            }
            TaskKind::TemporalOverlapForEntities => {
                let (a, b) = raw.pair().ok_or_else(needs_pair)?;
                let window_days = raw.window_days.unwrap_or(90);
                if window_days < 0 {
                    return Err(TaskError::validation(format!(
                        "{} needs a non-negative window_days",
                        task
                    )));
                }
                TaskParams::TemporalOverlapForEntities(TemporalParams { a, b, window_days })
            }
            TaskKind::LookupCompany | TaskKind::LookupInvestor => {
                let lookup = LabelLookupParams {
                    label: raw.label.clone(),
                    label_wildcard: raw.label_wildcard.clone(),
                    size: raw.size.unwrap_or(10),
                };
                if task == TaskKind::LookupCompany {
                    TaskParams::LookupCompany(lookup)
                } else {
                    TaskParams::LookupInvestor(lookup)
                }
            }
            TaskKind::LookupInvestment => TaskParams::LookupInvestment(InvestmentLookupParams {
                filter: raw.filter(),
                size: raw.size.unwrap_or(10),
            }),
            TaskKind::GraphLookup => TaskParams::GraphLookup(GraphLookupParams {
                index: raw
                    .parent_index
                    .clone()
                    .ok_or_else(|| TaskError::validation("graph_lookup needs parent_index"))?,
                query: raw.query(),
                size: raw.size.unwrap_or(50),
            }),
            TaskKind::GraphJoin => {
                let invalid = || {
                    TaskError::validation(
                        "graph_join needs parent_index, child_index, on=[child_key,parent_key]",
                    )
                };
                let (child_key, parent_key) = raw.join_keys().ok_or_else(invalid)?;
                TaskParams::GraphJoin(GraphJoinParams {
                    parent_index: raw.parent_index.clone().ok_or_else(invalid)?,
                    child_index: raw.child_index.clone().ok_or_else(invalid)?,
                    child_key,
                    parent_key,
                    query: raw.query(),
                    size: raw.size.unwrap_or(50),
                    join_type: raw.join_type.clone(),
                })
            }
            TaskKind::GeoNearEntities => parse_geo(&params, &raw)?,
        };

        Ok(parsed)
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskParams::EntityInvestors(_) => TaskKind::EntityInvestors,
            TaskParams::FilteredInvestments(_) => TaskKind::FilteredInvestments,
            TaskParams::InvestmentsInPeriodCurrency(_) => TaskKind::InvestmentsInPeriodCurrency,
            TaskParams::TopInvestmentsForEntity(_) => TaskKind::TopInvestmentsForEntity,
            TaskParams::CommonRelationsBetweenEntities(_) => {
                TaskKind::CommonRelationsBetweenEntities
            }
            TaskParams::CoInvestedEntities(_) => TaskKind::CoInvestedEntities,
            TaskParams::GeoNearEntities(_) => TaskKind::GeoNearEntities,
            TaskParams::TemporalOverlapForEntities(_) => TaskKind::TemporalOverlapForEntities,
            TaskParams::LookupCompany(_) => TaskKind::LookupCompany,
            TaskParams::LookupInvestment(_) => TaskKind::LookupInvestment,
            TaskParams::LookupInvestor(_) => TaskKind::LookupInvestor,
            TaskParams::GraphLookup(_) => TaskKind::GraphLookup,
            TaskParams::GraphJoin(_) => TaskKind::GraphJoin,
        }
    }
}

/// lat/lon are read from the raw mapping so a bad coordinate gets a precise message.
fn parse_geo(params: &Value, raw: &RawParams) -> Result<TaskParams, TaskError> {
    let coordinate = |key: &str| params.get(key).and_then(lenient::coerce_f64);
    let (lat, lon) = match (coordinate("lat"), coordinate("lon")) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err(TaskError::validation("geo_near_entities needs lat, lon")),
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(TaskError::validation(format!(
            "geo_near_entities got out-of-range coordinates ({}, {})",
            lat, lon
        )));
    }

    let distance_km = raw.distance_km.unwrap_or(50.0);
    if distance_km <= 0.0 {
        return Err(TaskError::validation(
            "geo_near_entities needs a positive distance_km",
        ));
    }

    Ok(TaskParams::GeoNearEntities(GeoParams {
        lat,
        lon,
        distance_km,
        size: raw.size.unwrap_or(10),
    }))
}

/// Deserializers that accept numbers, numeric strings and `null`.
mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    pub fn coerce_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    fn coerce_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    fn read<'de, D, T>(
        deserializer: D,
        expected: &str,
        coerce: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        coerce(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected {}, got {}", expected, value)))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        read(d, "a number", coerce_f64)
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        read(d, "an integer", coerce_i64)
    }

    pub fn opt_usize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        read(d, "a non-negative integer", |v| {
            coerce_i64(v).and_then(|i| usize::try_from(i).ok())
        })
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        read(d, "a boolean", |v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            _ => None,
        })
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        read(d, "a string", |v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}
