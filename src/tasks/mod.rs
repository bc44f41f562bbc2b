//! Task routing and query composition.
//!
//! A [`Coordinator`] routes a named task to the first registered
//! [`TaskHandler`] that declares it. Handlers receive parameters already
//! validated into [`TaskParams`] and answer with an [`Envelope`].

pub mod coordinator;
pub mod envelope;
pub mod foraging;
pub mod params;
pub mod relations;
pub mod resolver;
pub mod specialist;

pub use coordinator::Coordinator;
pub use envelope::Envelope;
pub use params::TaskParams;

use crate::error::TaskError;
use async_trait::async_trait;
use std::fmt;

/// Every task the agent knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    EntityInvestors,
    FilteredInvestments,
    InvestmentsInPeriodCurrency,
    TopInvestmentsForEntity,
    CommonRelationsBetweenEntities,
    CoInvestedEntities,
    GeoNearEntities,
    TemporalOverlapForEntities,
    LookupCompany,
    LookupInvestment,
    LookupInvestor,
    GraphLookup,
    GraphJoin,
}

impl TaskKind {
    pub const ALL: [TaskKind; 13] = [
        TaskKind::EntityInvestors,
        TaskKind::FilteredInvestments,
        TaskKind::InvestmentsInPeriodCurrency,
        TaskKind::TopInvestmentsForEntity,
        TaskKind::CommonRelationsBetweenEntities,
        TaskKind::CoInvestedEntities,
        TaskKind::GeoNearEntities,
        TaskKind::TemporalOverlapForEntities,
        TaskKind::LookupCompany,
        TaskKind::LookupInvestment,
        TaskKind::LookupInvestor,
        TaskKind::GraphLookup,
        TaskKind::GraphJoin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::EntityInvestors => "entity_investors",
            TaskKind::FilteredInvestments => "filtered_investments",
            TaskKind::InvestmentsInPeriodCurrency => "investments_in_period_currency",
            TaskKind::TopInvestmentsForEntity => "top_investments_for_entity",
            TaskKind::CommonRelationsBetweenEntities => "common_relations_between_entities",
            TaskKind::CoInvestedEntities => "co_invested_entities",
            TaskKind::GeoNearEntities => "geo_near_entities",
            TaskKind::TemporalOverlapForEntities => "temporal_overlap_for_entities",
            TaskKind::LookupCompany => "lookup_company",
            TaskKind::LookupInvestment => "lookup_investment",
            TaskKind::LookupInvestor => "lookup_investor",
            TaskKind::GraphLookup => "graph_lookup",
            TaskKind::GraphJoin => "graph_join",
        }
    }

    /// Older company-centric names still sent by existing prompts.
    fn alias(&self) -> Option<&'static str> {
        match self {
            TaskKind::EntityInvestors => Some("company_investors"),
            TaskKind::FilteredInvestments => Some("investments_by_amount"),
            TaskKind::TopInvestmentsForEntity => Some("top_investments_for_company"),
            TaskKind::CommonRelationsBetweenEntities => Some("common_investors_between_companies"),
            TaskKind::CoInvestedEntities => Some("co_invested_companies_for_company"),
            TaskKind::GeoNearEntities => Some("geo_near_companies"),
            TaskKind::TemporalOverlapForEntities => Some("temporal_overlap_for_companies"),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskKind::EntityInvestors => "Investors of a company (by label or id).",
            TaskKind::FilteredInvestments => {
                "Filter investments by amount, currency and period, optionally joined to companies."
            }
            TaskKind::InvestmentsInPeriodCurrency => {
                "Investments in a period and currency, joined to companies."
            }
            TaskKind::TopInvestmentsForEntity => "Investments of a given company.",
            TaskKind::CommonRelationsBetweenEntities => "Investors shared by two companies.",
            TaskKind::CoInvestedEntities => {
                "Companies sharing at least one investor with a target, ranked by frequency."
            }
            TaskKind::GeoNearEntities => "Companies within a distance (km) of a point.",
            TaskKind::TemporalOverlapForEntities => {
                "Investments of two companies close to each other in time."
            }
            TaskKind::LookupCompany => "Search companies by label or wildcard.",
            TaskKind::LookupInvestment => "Search investments by amount, currency and period.",
            TaskKind::LookupInvestor => "Search investors by label or wildcard.",
            TaskKind::GraphLookup => "Run a raw query against one index.",
            TaskKind::GraphJoin => {
                "Federated join between a parent and a child index, with lookup fallback."
            }
        }
    }

    /// Parse a task name or one of its aliases.
    pub fn parse(name: &str) -> Option<TaskKind> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == name || k.alias() == Some(name))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handler for a fixed set of tasks.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The tasks this handler can run.
    fn declared_tasks(&self) -> &'static [TaskKind];

    fn supports(&self, task: TaskKind) -> bool {
        self.declared_tasks().contains(&task)
    }

    /// Run a task whose parameters were validated by the coordinator.
    async fn handle(&self, params: TaskParams) -> Result<Envelope, TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!(TaskKind::parse("geo_near_entities"), Some(TaskKind::GeoNearEntities));
        assert_eq!(TaskKind::parse("geo_near_companies"), Some(TaskKind::GeoNearEntities));
        assert_eq!(TaskKind::parse("company_investors"), Some(TaskKind::EntityInvestors));
        assert_eq!(TaskKind::parse("nope"), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = TaskKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TaskKind::ALL.len());
    }
}
