//! Multi-step investigative tasks over companies, investments and investors.
//!
//! Each task resolves company references, composes one or more filter or
//! join queries, and projects the hits into normalized records.

use super::params::{
    EntityPairParams, EntityParams, FilteredInvestmentsParams, GeoParams, TemporalParams,
};
use super::resolver::LabelResolver;
use super::{Envelope, TaskHandler, TaskKind, TaskParams};
use crate::backend::{
    client::JOIN_TIMEOUT, search_body, Catalog, JoinClause, Query, SearchBackend, SearchResponse,
};
use crate::error::{BackendError, TaskError};
use crate::models::{
    fields, CoInvestedCompany, Collection, CompanyRef, DatePair, InvestmentSummary, InvestorRef,
    LocatedCompany,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Investments scanned per company when collecting its investors or dates.
pub const COMPANY_SCAN_CAP: usize = 200;
/// Investments scanned when looking for co-invested companies.
pub const CO_INVESTMENT_SCAN_CAP: usize = 500;
/// Date pairs returned by the temporal overlap task.
pub const MAX_TEMPORAL_PAIRS: usize = 50;
/// Sample investments attached to joined results.
pub const SAMPLE_INVESTMENTS: usize = 3;

pub struct SpecialistHandler {
    backend: Arc<dyn SearchBackend>,
    catalog: Catalog,
    resolver: LabelResolver,
}

impl SpecialistHandler {
    pub const TASKS: &'static [TaskKind] = &[
        TaskKind::EntityInvestors,
        TaskKind::FilteredInvestments,
        TaskKind::InvestmentsInPeriodCurrency,
        TaskKind::TopInvestmentsForEntity,
        TaskKind::CommonRelationsBetweenEntities,
        TaskKind::CoInvestedEntities,
        TaskKind::GeoNearEntities,
        TaskKind::TemporalOverlapForEntities,
    ];

    pub fn new(backend: Arc<dyn SearchBackend>, catalog: Catalog) -> Self {
        let resolver = LabelResolver::new(backend.clone(), catalog.clone());
        Self {
            backend,
            catalog,
            resolver,
        }
    }

    async fn search(
        &self,
        collection: Collection,
        size: usize,
        query: &Query,
    ) -> Result<SearchResponse, BackendError> {
        let path = self.catalog.search_path(self.catalog.index(collection));
        let body = search_body(size, query);
        SearchResponse::parse(&path, self.backend.post(&path, &body, JOIN_TIMEOUT).await?)
    }

    async fn join_search(
        &self,
        parent: Collection,
        size: usize,
        join: JoinClause,
    ) -> Result<SearchResponse, BackendError> {
        let path = self.catalog.join_path(self.catalog.index(parent));
        let body = search_body(size, &Query::Join(join));
        SearchResponse::parse(&path, self.backend.post(&path, &body, JOIN_TIMEOUT).await?)
    }

    fn investments_of(company_id: &str) -> Query {
        Query::terms(fields::COMPANIES, [company_id])
    }

    /// Distinct investor ids across a company's investments, in discovery order.
    async fn investors_for_company(&self, company_id: &str) -> Result<Vec<String>, BackendError> {
        let response = self
            .search(
                Collection::Investment,
                COMPANY_SCAN_CAP,
                &Self::investments_of(company_id),
            )
            .await?;

        let mut seen = HashSet::new();
        let investors: Vec<String> = response
            .hits()
            .iter()
            .flat_map(|hit| hit.id_list(fields::INVESTORS))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        debug!("Company {} has {} investors", company_id, investors.len());
        Ok(investors)
    }

    /// Raw `funded_date` values of a company's investments.
    async fn funding_dates(&self, company_id: &str) -> Result<Vec<String>, BackendError> {
        let response = self
            .search(
                Collection::Investment,
                COMPANY_SCAN_CAP,
                &Self::investments_of(company_id),
            )
            .await?;
        Ok(response
            .hits()
            .iter()
            .filter_map(|hit| hit.str_field(fields::FUNDED_DATE))
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect())
    }

    async fn entity_investors(&self, params: EntityParams) -> Result<Envelope, TaskError> {
        let company_id = self
            .resolver
            .require_id(Collection::Company, &params.entity)
            .await?;

        let join = JoinClause::new(&self.catalog.investment, fields::INVESTORS, fields::ID)
            .with_request(Self::investments_of(&company_id));
        let response = self
            .join_search(Collection::Investor, params.size, join)
            .await?;

        let investors: Vec<InvestorRef> = response.hits().iter().map(InvestorRef::from).collect();
        Ok(Envelope::success(format!(
            "{} investors for {} (top {}).",
            response.total(),
            company_id,
            investors.len()
        ))
        .with("company_id", &company_id)
        .with_entities(investors))
    }

    async fn filtered_investments(
        &self,
        params: FilteredInvestmentsParams,
    ) -> Result<Envelope, TaskError> {
        let query = params.filter.to_query();
        let investments = self
            .search(Collection::Investment, params.size, &query)
            .await?;

        if !params.join_company {
            let items = investments.sources();
            return Ok(Envelope::success(format!(
                "{} investments (top {}).",
                investments.total(),
                items.len()
            ))
            .with("filters", &params.filter)
            .with_items(items));
        }

        let join = JoinClause::new(&self.catalog.investment, fields::COMPANIES, fields::ID)
            .with_request(query);
        let response = self
            .join_search(Collection::Company, params.size, join)
            .await?;

        let companies: Vec<CompanyRef> = response.hits().iter().map(CompanyRef::from).collect();
        let mut samples = investments.sources();
        samples.truncate(SAMPLE_INVESTMENTS);

        Ok(Envelope::success(format!(
            "{} linked companies (top {}).",
            response.total(),
            companies.len()
        ))
        .with("filters", &params.filter)
        .with_entities(companies)
        .with("sample_investments", samples))
    }

    async fn top_investments_for_entity(&self, params: EntityParams) -> Result<Envelope, TaskError> {
        let company_id = self
            .resolver
            .require_id(Collection::Company, &params.entity)
            .await?;

        let response = self
            .search(
                Collection::Investment,
                params.size,
                &Self::investments_of(&company_id),
            )
            .await?;
        let investments: Vec<InvestmentSummary> =
            response.hits().iter().map(InvestmentSummary::from).collect();

        Ok(Envelope::success(format!(
            "{} investments for {} (top {}).",
            response.total(),
            company_id,
            investments.len()
        ))
        .with("company_id", &company_id)
        .with_items(investments))
    }

    async fn common_relations_between_entities(
        &self,
        params: EntityPairParams,
    ) -> Result<Envelope, TaskError> {
        let a = self.resolver.require_id(Collection::Company, &params.a).await?;
        let b = self.resolver.require_id(Collection::Company, &params.b).await?;

        let (investors_a, investors_b) = futures::future::try_join(
            self.investors_for_company(&a),
            self.investors_for_company(&b),
        )
        .await?;

        let in_b: HashSet<&String> = investors_b.iter().collect();
        let common: Vec<String> = investors_a
            .iter()
            .filter(|id| in_b.contains(id))
            .take(COMPANY_SCAN_CAP)
            .cloned()
            .collect();

        if common.is_empty() {
            return Ok(Envelope::success(format!(
                "No common investors between {} and {}.",
                a, b
            ))
            .with("company_a", &a)
            .with("company_b", &b)
            .with_entities(Vec::<InvestorRef>::new()));
        }

        let response = self
            .search(
                Collection::Investor,
                common.len(),
                &Query::terms(fields::ID, common.iter().map(String::as_str)),
            )
            .await?;
        let investors: Vec<InvestorRef> = response.hits().iter().map(InvestorRef::from).collect();

        info!("{} common investors between {} and {}", common.len(), a, b);
        Ok(
            Envelope::success(format!("{} common investors.", common.len()))
                .with("company_a", &a)
                .with("company_b", &b)
                .with_entities(investors),
        )
    }

    async fn co_invested_entities(&self, params: EntityParams) -> Result<Envelope, TaskError> {
        let company_id = self
            .resolver
            .require_id(Collection::Company, &params.entity)
            .await?;

        let mut investor_ids = self.investors_for_company(&company_id).await?;
        investor_ids.truncate(COMPANY_SCAN_CAP);
        if investor_ids.is_empty() {
            return Ok(
                Envelope::success(format!("No investors found for {}.", company_id))
                    .with("company_id", &company_id)
                    .with_entities(Vec::<CoInvestedCompany>::new()),
            );
        }

        let response = self
            .search(
                Collection::Investment,
                CO_INVESTMENT_SCAN_CAP,
                &Query::terms(fields::INVESTORS, investor_ids.iter().map(String::as_str)),
            )
            .await?;

        let mut ranked = rank_co_investments(
            response.hits().iter().map(|h| h.id_list(fields::COMPANIES)),
            &company_id,
        );
        ranked.truncate(params.size);

        if ranked.is_empty() {
            return Ok(Envelope::success("No co-invested companies found.")
                .with("company_id", &company_id)
                .with_entities(Vec::<CoInvestedCompany>::new()));
        }

        let labels_response = self
            .search(
                Collection::Company,
                ranked.len(),
                &Query::terms(fields::ID, ranked.iter().map(|(id, _)| id.as_str())),
            )
            .await?;
        let labels: HashMap<String, String> = labels_response
            .hits()
            .iter()
            .filter_map(|hit| Some((hit.id()?, hit.str_field(fields::LABEL)?.to_string())))
            .collect();

        let companies: Vec<CoInvestedCompany> = ranked
            .into_iter()
            .map(|(id, count)| CoInvestedCompany {
                company_label: labels.get(&id).cloned(),
                company_id: id,
                co_invest_count: count,
            })
            .collect();

        Ok(Envelope::success(format!(
            "{} companies co-invested with {}.",
            companies.len(),
            company_id
        ))
        .with("company_id", &company_id)
        .with_entities(companies))
    }

    async fn geo_near_entities(&self, params: GeoParams) -> Result<Envelope, TaskError> {
        let query = Query::Filter(vec![Query::GeoDistance {
            field: fields::LOCATION.to_string(),
            distance_km: params.distance_km,
            lat: params.lat,
            lon: params.lon,
        }]);
        let response = self
            .search(Collection::Company, params.size, &query)
            .await?;
        let companies: Vec<LocatedCompany> =
            response.hits().iter().map(LocatedCompany::from).collect();

        Ok(Envelope::success(format!(
            "{} companies within ~{}km (top {}).",
            response.total(),
            params.distance_km,
            companies.len()
        ))
        .with_entities(companies))
    }

    async fn temporal_overlap_for_entities(
        &self,
        params: TemporalParams,
    ) -> Result<Envelope, TaskError> {
        let a = self.resolver.require_id(Collection::Company, &params.a).await?;
        let b = self.resolver.require_id(Collection::Company, &params.b).await?;

        let (raw_a, raw_b) =
            futures::future::try_join(self.funding_dates(&a), self.funding_dates(&b)).await?;
        let dates_a = parse_dates(&raw_a);
        let dates_b = parse_dates(&raw_b);

        let mut pairs = overlapping_pairs(&dates_a, &dates_b, params.window_days);
        let total = pairs.len();
        pairs.truncate(MAX_TEMPORAL_PAIRS);

        Ok(Envelope::success(format!(
            "{} event pairs within ±{} days.",
            total, params.window_days
        ))
        .with("company_a", &a)
        .with("company_b", &b)
        .with_items(pairs))
    }
}

/// Count how often each company co-occurs, excluding `target`.
///
/// Sorted by descending count; ties keep first-seen order.
pub fn rank_co_investments<I>(company_lists: I, target: &str) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut ranked: Vec<(String, usize)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for company in company_lists.into_iter().flatten() {
        if company == target {
            continue;
        }
        match position.get(&company) {
            Some(&i) => ranked[i].1 += 1,
            None => {
                position.insert(company.clone(), ranked.len());
                ranked.push((company, 1));
            }
        }
    }

    // sort_by is stable
    ranked.sort_by(|x, y| y.1.cmp(&x.1));
    ranked
}

/// Parse funding dates, skipping values in unknown formats.
fn parse_dates(raw: &[String]) -> Vec<NaiveDateTime> {
    raw.iter()
        .filter_map(|value| {
            let parsed = parse_funding_date(value);
            if parsed.is_none() {
                warn!("Skipping unparseable funded_date '{}'", value);
            }
            parsed
        })
        .collect()
}

/// RFC 3339 (normalized to UTC), ISO date-times, or plain dates.
pub fn parse_funding_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Every (a, b) pair at most `window_days` apart, in a-major order.
///
/// The gap counts whole days of the absolute span, so 8.5 days is 8 in
/// either argument order.
pub fn overlapping_pairs(
    dates_a: &[NaiveDateTime],
    dates_b: &[NaiveDateTime],
    window_days: i64,
) -> Vec<DatePair> {
    let mut pairs = Vec::new();
    for da in dates_a {
        for db in dates_b {
            let delta = (*da - *db).num_days().abs();
            if delta <= window_days {
                pairs.push(DatePair {
                    date_a: da.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    date_b: db.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    delta_days: delta,
                });
            }
        }
    }
    pairs
}

#[async_trait]
impl TaskHandler for SpecialistHandler {
    fn declared_tasks(&self) -> &'static [TaskKind] {
        Self::TASKS
    }

    async fn handle(&self, params: TaskParams) -> Result<Envelope, TaskError> {
        match params {
            TaskParams::EntityInvestors(p) => self.entity_investors(p).await,
            TaskParams::FilteredInvestments(p) | TaskParams::InvestmentsInPeriodCurrency(p) => {
                self.filtered_investments(p).await
            }
            TaskParams::TopInvestmentsForEntity(p) => self.top_investments_for_entity(p).await,
            TaskParams::CommonRelationsBetweenEntities(p) => {
                self.common_relations_between_entities(p).await
            }
            TaskParams::CoInvestedEntities(p) => self.co_invested_entities(p).await,
            TaskParams::GeoNearEntities(p) => self.geo_near_entities(p).await,
            TaskParams::TemporalOverlapForEntities(p) => {
                self.temporal_overlap_for_entities(p).await
            }
            other => Err(TaskError::Unsupported {
                task: other.kind().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{hits, hits_with_total, FakeBackend};
    use crate::tasks::params::{EntityRef, InvestmentFilter};
    use serde_json::{json, Value};

    fn handler(backend: &Arc<FakeBackend>) -> SpecialistHandler {
        SpecialistHandler::new(backend.clone(), Catalog::default())
    }

    fn id(value: &str) -> EntityRef {
        EntityRef::Id(value.to_string())
    }

    /// Investment documents keyed by company for `terms companies` queries.
    fn investments_by_company(
        table: Vec<(&'static str, Vec<Value>)>,
    ) -> impl Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static {
        move |path, body| {
            if path != "/investment/_search" {
                return None;
            }
            let company = body["query"]["terms"]["companies"][0].as_str()?;
            table
                .iter()
                .find(|(c, _)| *c == company)
                .map(|(_, docs)| hits(docs))
        }
    }

    fn date_a() -> NaiveDateTime {
        parse_funding_date("2020-01-01").unwrap()
    }

    #[test]
    fn test_overlapping_pairs_window_boundary() {
        let dates_b = vec![
            parse_funding_date("2020-01-10").unwrap(),
            parse_funding_date("2020-04-01").unwrap(),
        ];
        let pairs = overlapping_pairs(&[date_a()], &dates_b, 90);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].date_b, "2020-01-10T00:00:00");
        assert_eq!(pairs[0].delta_days, 9);
    }

    #[test]
    fn test_overlapping_pairs_counts_whole_days_of_the_span() {
        let noon = parse_funding_date("2020-01-01T12:00:00").unwrap();
        let later = parse_funding_date("2020-01-10T00:00:00").unwrap();

        let forward = overlapping_pairs(&[noon], &[later], 8);
        let backward = overlapping_pairs(&[later], &[noon], 8);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].delta_days, 8);
        assert_eq!(forward[0].date_a, "2020-01-01T12:00:00");
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].delta_days, 8);

        assert!(overlapping_pairs(&[noon], &[later], 7).is_empty());
    }

    #[test]
    fn test_parse_funding_date_formats() {
        assert_eq!(parse_funding_date("2020-01-01 00:00:00"), Some(date_a()));
        assert_eq!(parse_funding_date("2020-01-01T00:00:00Z"), Some(date_a()));
        assert_eq!(parse_funding_date("2020/01/01"), Some(date_a()));
        assert_eq!(parse_funding_date("last spring"), None);
    }

    #[test]
    fn test_rank_co_investments_excludes_target_and_keeps_tie_order() {
        let lists = vec![
            vec!["target".to_string(), "b".to_string()],
            vec!["c".to_string(), "target".to_string()],
            vec!["b".to_string(), "d".to_string()],
            vec!["c".to_string()],
            vec!["e".to_string()],
        ];
        let ranked = rank_co_investments(lists, "target");

        assert_eq!(
            ranked,
            vec![
                ("b".to_string(), 2),
                ("c".to_string(), 2),
                ("d".to_string(), 1),
                ("e".to_string(), 1),
            ]
        );
        assert!(ranked.iter().all(|(id, _)| id != "target"));
    }

    #[tokio::test]
    async fn test_entity_investors_resolves_label_then_joins() {
        let backend = Arc::new(
            FakeBackend::new()
                .respond(|path, body| {
                    (path == "/company/_search" && body["query"]["term"]["label.raw"] == "Acme")
                        .then(|| hits(&[json!({ "id": "c1", "label": "Acme" })]))
                })
                .respond(|path, _| {
                    (path == "/siren/investor/_search").then(|| {
                        hits_with_total(&[json!({ "id": "i1", "label": "Fund One" })], 4)
                    })
                }),
        );

        let envelope = handler(&backend)
            .handle(TaskParams::EntityInvestors(EntityParams {
                entity: EntityRef::Label("Acme".to_string()),
                size: 5,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("4 investors for c1 (top 1)."));
        assert_eq!(
            envelope.get("entities"),
            Some(&json!([{ "investor_id": "i1", "investor_label": "Fund One" }]))
        );

        let join_call = &backend.calls()[1];
        assert_eq!(
            join_call.body["query"]["join"],
            json!({
                "indices": ["investment"],
                "on": ["investors", "id"],
                "request": { "query": { "terms": { "companies": ["c1"] } } }
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_label_is_not_found() {
        let backend = Arc::new(FakeBackend::new());
        let err = handler(&backend)
            .handle(TaskParams::TopInvestmentsForEntity(EntityParams {
                entity: EntityRef::Label("Ghost".to_string()),
                size: 5,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound { .. }));
    }

    /// Evaluates one rendered `range` or `term` clause against a document.
    fn clause_matches(doc: &Value, clause: &Value) -> Option<bool> {
        if let Some(range) = clause.get("range").and_then(Value::as_object) {
            let (field, bounds) = range.iter().next()?;
            let value = doc[field].as_f64()?;
            return Some(
                bounds["gte"].as_f64().map_or(true, |g| value >= g)
                    && bounds["lte"].as_f64().map_or(true, |l| value <= l),
            );
        }
        let (field, expected) = clause.get("term")?.as_object()?.iter().next()?;
        Some(&doc[field] == expected)
    }

    #[tokio::test]
    async fn test_filtered_investments_without_join() {
        let matching = json!({
            "label": "Series A", "raised_amount": 2500000.0,
            "raised_currency_code": "USD", "funded_year": 2015
        });
        let other = json!({
            "label": "Seed", "raised_amount": 50000.0,
            "raised_currency_code": "EUR", "funded_year": 2012
        });
        let backend = Arc::new(FakeBackend::new().respond(move |path, body| {
            if path != "/investment/_search" {
                return None;
            }
            let filter = body["query"]["bool"]["filter"].as_array()?.clone();
            let docs: Vec<Value> = [matching.clone(), other.clone()]
                .into_iter()
                .filter(|doc| filter.iter().all(|c| clause_matches(doc, c).unwrap_or(false)))
                .collect();
            Some(hits(&docs))
        }));

        let envelope = handler(&backend)
            .handle(TaskParams::FilteredInvestments(FilteredInvestmentsParams {
                filter: InvestmentFilter {
                    min_amount: Some(1_000_000.0),
                    currency_code: Some("USD".to_string()),
                    year_min: Some(2015),
                    year_max: Some(2016),
                },
                join_company: false,
                size: 10,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("1 investments (top 1)."));
        assert_eq!(envelope.record_count(), 1);
        assert_eq!(envelope.get("items").unwrap()[0]["label"], "Series A");
        assert_eq!(envelope.get("filters").unwrap()["currency_code"], "USD");
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_investments_with_join() {
        let backend = Arc::new(
            FakeBackend::new()
                .respond(|path, _| {
                    (path == "/investment/_search").then(|| {
                        hits(&[json!({ "label": "a" }), json!({ "label": "b" }), json!({ "label": "c" }), json!({ "label": "d" })])
                    })
                })
                .respond(|path, _| {
                    (path == "/siren/company/_search")
                        .then(|| hits_with_total(&[json!({ "id": "c1", "label": "Acme" })], 9))
                }),
        );

        let envelope = handler(&backend)
            .handle(TaskParams::InvestmentsInPeriodCurrency(FilteredInvestmentsParams {
                filter: InvestmentFilter {
                    min_amount: Some(0.0),
                    currency_code: Some("USD".to_string()),
                    ..InvestmentFilter::default()
                },
                join_company: true,
                size: 10,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("9 linked companies (top 1)."));
        assert_eq!(
            envelope.get("entities"),
            Some(&json!([{ "company_id": "c1", "company_label": "Acme" }]))
        );
        assert_eq!(envelope.get("sample_investments").unwrap().as_array().unwrap().len(), 3);

        let calls = backend.calls();
        assert_eq!(calls[1].body["query"]["join"]["on"], json!(["companies", "id"]));
        assert_eq!(calls[1].body["query"]["join"]["request"]["query"], calls[0].body["query"]);
    }

    #[tokio::test]
    async fn test_top_investments_projects_headline_fields() {
        let backend = Arc::new(FakeBackend::new().respond(investments_by_company(vec![(
            "c1",
            vec![json!({
                "label": "Series B", "funded_year": 2019, "raised_amount": 10.0,
                "raised_currency_code": "USD", "investors": ["i1"]
            })],
        )])));

        let envelope = handler(&backend)
            .handle(TaskParams::TopInvestmentsForEntity(EntityParams {
                entity: id("c1"),
                size: 5,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("1 investments for c1 (top 1)."));
        assert_eq!(
            envelope.get("items"),
            Some(&json!([{
                "label": "Series B", "funded_year": 2019,
                "raised_amount": 10.0, "raised_currency_code": "USD"
            }]))
        );
        assert_eq!(backend.calls()[0].body["size"], 5);
    }

    fn common_fixture() -> Arc<FakeBackend> {
        Arc::new(
            FakeBackend::new()
                .respond(investments_by_company(vec![
                    ("a", vec![json!({ "investors": ["i1", "i2"] }), json!({ "investors": ["i3"] })]),
                    ("b", vec![json!({ "investors": ["i3", "i2", "i9"] })]),
                ]))
                .respond(|path, body| {
                    if path != "/investor/_search" {
                        return None;
                    }
                    let docs: Vec<Value> = body["query"]["terms"]["id"]
                        .as_array()?
                        .iter()
                        .map(|id| json!({ "id": id, "label": format!("Investor {}", id.as_str().unwrap_or("")) }))
                        .collect();
                    Some(hits(&docs))
                }),
        )
    }

    fn common_ids(envelope: &Envelope) -> HashSet<String> {
        envelope.get("entities").unwrap().as_array().unwrap()
            .iter()
            .map(|e| e["investor_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_common_relations_is_symmetric() {
        let backend = common_fixture();
        let forward = handler(&backend)
            .handle(TaskParams::CommonRelationsBetweenEntities(EntityPairParams {
                a: id("a"),
                b: id("b"),
            }))
            .await
            .unwrap();
        let backward = handler(&backend)
            .handle(TaskParams::CommonRelationsBetweenEntities(EntityPairParams {
                a: id("b"),
                b: id("a"),
            }))
            .await
            .unwrap();

        let expected: HashSet<String> = ["i2", "i3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(common_ids(&forward), expected);
        assert_eq!(common_ids(&backward), expected);
        assert_eq!(forward.summary.as_deref(), Some("2 common investors."));
    }

    #[tokio::test]
    async fn test_common_relations_empty_intersection() {
        let backend = Arc::new(FakeBackend::new().respond(investments_by_company(vec![
            ("a", vec![json!({ "investors": ["i1"] })]),
            ("b", vec![json!({ "investors": ["i2"] })]),
        ])));

        let envelope = handler(&backend)
            .handle(TaskParams::CommonRelationsBetweenEntities(EntityPairParams {
                a: id("a"),
                b: id("b"),
            }))
            .await
            .unwrap();

        assert!(!envelope.is_error());
        assert_eq!(envelope.summary.as_deref(), Some("No common investors between a and b."));
        assert_eq!(envelope.get("entities"), Some(&json!([])));
        // No label lookup for an empty intersection.
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_co_invested_ranking() {
        let backend = Arc::new(
            FakeBackend::new()
                .respond(investments_by_company(vec![(
                    "target",
                    vec![json!({ "companies": ["target"], "investors": ["i1", "i2"] })],
                )]))
                .respond(|path, body| {
                    (path == "/investment/_search" && body["query"]["terms"].get("investors").is_some())
                        .then(|| {
                            hits(&[
                                json!({ "companies": ["target", "x"] }),
                                json!({ "companies": ["y", "target"] }),
                                json!({ "companies": ["y"] }),
                                json!({ "companies": ["x", "z"] }),
                                json!({ "companies": ["w"] }),
                            ])
                        })
                })
                .respond(|path, _| {
                    (path == "/company/_search").then(|| {
                        hits(&[json!({ "id": "y", "label": "Ypsilon" }), json!({ "id": "x", "label": "Xylo" })])
                    })
                }),
        );

        let envelope = handler(&backend)
            .handle(TaskParams::CoInvestedEntities(EntityParams {
                entity: id("target"),
                size: 3,
            }))
            .await
            .unwrap();

        assert_eq!(
            envelope.get("entities"),
            Some(&json!([
                { "company_id": "x", "company_label": "Xylo", "co_invest_count": 2 },
                { "company_id": "y", "company_label": "Ypsilon", "co_invest_count": 2 },
                { "company_id": "z", "company_label": null, "co_invest_count": 1 }
            ]))
        );
        assert_eq!(envelope.summary.as_deref(), Some("3 companies co-invested with target."));

        let calls = backend.calls();
        assert_eq!(calls[1].body["size"], CO_INVESTMENT_SCAN_CAP);
        assert_eq!(calls[1].body["query"]["terms"]["investors"], json!(["i1", "i2"]));
        assert_eq!(calls[2].body["query"]["terms"]["id"], json!(["x", "y", "z"]));
    }

    #[tokio::test]
    async fn test_co_invested_without_investors() {
        let backend = Arc::new(FakeBackend::new());
        let envelope = handler(&backend)
            .handle(TaskParams::CoInvestedEntities(EntityParams {
                entity: id("lonely"),
                size: 10,
            }))
            .await
            .unwrap();
        assert_eq!(envelope.summary.as_deref(), Some("No investors found for lonely."));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_geo_near_entities_query() {
        let backend = Arc::new(FakeBackend::new().respond(|path, _| {
            (path == "/company/_search").then(|| {
                hits(&[json!({ "id": "c1", "label": "Acme", "city": "Paris", "countrycode": "FRA" })])
            })
        }));

        let envelope = handler(&backend)
            .handle(TaskParams::GeoNearEntities(GeoParams {
                lat: 48.85,
                lon: 2.35,
                distance_km: 10.0,
                size: 10,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("1 companies within ~10km (top 1)."));
        assert_eq!(envelope.get("entities").unwrap()[0]["city"], "Paris");
        assert_eq!(
            backend.calls()[0].body["query"]["bool"]["filter"][0]["geo_distance"]["distance"],
            "10km"
        );
    }

    #[tokio::test]
    async fn test_temporal_overlap_pairs() {
        let backend = Arc::new(FakeBackend::new().respond(investments_by_company(vec![
            ("a", vec![json!({ "funded_date": "2020-01-01" })]),
            (
                "b",
                vec![
                    json!({ "funded_date": "2020-01-10" }),
                    json!({ "funded_date": "2020-04-01" }),
                    json!({ "funded_date": "not a date" }),
                    json!({}),
                ],
            ),
        ])));

        let envelope = handler(&backend)
            .handle(TaskParams::TemporalOverlapForEntities(TemporalParams {
                a: id("a"),
                b: id("b"),
                window_days: 90,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("1 event pairs within ±90 days."));
        assert_eq!(
            envelope.get("items"),
            Some(&json!([{
                "date_a": "2020-01-01T00:00:00",
                "date_b": "2020-01-10T00:00:00",
                "delta_days": 9
            }]))
        );
        assert_eq!(backend.calls()[0].body["size"], COMPANY_SCAN_CAP);
    }

    #[tokio::test]
    async fn test_temporal_overlap_truncates_pairs() {
        let days: Vec<Value> = (1..=10)
            .map(|d| json!({ "funded_date": format!("2021-03-{:02}", d) }))
            .collect();
        let backend = Arc::new(FakeBackend::new().respond(investments_by_company(vec![
            ("a", days.clone()),
            ("b", days),
        ])));

        let envelope = handler(&backend)
            .handle(TaskParams::TemporalOverlapForEntities(TemporalParams {
                a: id("a"),
                b: id("b"),
                window_days: 30,
            }))
            .await
            .unwrap();

        assert_eq!(envelope.summary.as_deref(), Some("100 event pairs within ±30 days."));
        assert_eq!(envelope.record_count(), MAX_TEMPORAL_PAIRS);
    }
}
