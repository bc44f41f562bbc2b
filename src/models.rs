//! Data models for the investigation graph.
//!
//! This module contains the collections the agent knows about, the document
//! fields it queries, and the normalized records it returns.

use crate::backend::Hit;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Document fields the handlers rely on.
pub mod fields {
    pub const ID: &str = "id";
    pub const LABEL: &str = "label";
    pub const LABEL_RAW: &str = "label.raw";
    pub const COMPANIES: &str = "companies";
    pub const INVESTORS: &str = "investors";
    pub const RAISED_AMOUNT: &str = "raised_amount";
    pub const RAISED_CURRENCY: &str = "raised_currency_code";
    pub const FUNDED_YEAR: &str = "funded_year";
    pub const FUNDED_DATE: &str = "funded_date";
    pub const LOCATION: &str = "location";
    pub const CITY: &str = "city";
    pub const COUNTRY_CODE: &str = "countrycode";
}

/// The logical collections of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Organizations.
    Company,
    /// Funding events linking companies and investors.
    Investment,
    /// Funding sources.
    Investor,
}

impl Collection {
    /// Name used in log lines and not-found messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Collection::Company => "Company",
            Collection::Investment => "Investment",
            Collection::Investor => "Investor",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// An investor resolved to its label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestorRef {
    pub investor_id: Option<String>,
    pub investor_label: Option<String>,
}

impl From<&Hit> for InvestorRef {
    fn from(hit: &Hit) -> Self {
        Self {
            investor_id: hit.id(),
            investor_label: hit.str_field(fields::LABEL).map(String::from),
        }
    }
}

/// A company resolved to its label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyRef {
    pub company_id: Option<String>,
    pub company_label: Option<String>,
}

impl From<&Hit> for CompanyRef {
    fn from(hit: &Hit) -> Self {
        Self {
            company_id: hit.id(),
            company_label: hit.str_field(fields::LABEL).map(String::from),
        }
    }
}

/// A company with its location fields, as returned by proximity searches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedCompany {
    pub company_id: Option<String>,
    pub company_label: Option<String>,
    pub city: Option<String>,
    pub countrycode: Option<String>,
}

impl From<&Hit> for LocatedCompany {
    fn from(hit: &Hit) -> Self {
        Self {
            company_id: hit.id(),
            company_label: hit.str_field(fields::LABEL).map(String::from),
            city: hit.str_field(fields::CITY).map(String::from),
            countrycode: hit.str_field(fields::COUNTRY_CODE).map(String::from),
        }
    }
}

/// A company ranked by how many investments it shares with a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoInvestedCompany {
    pub company_id: String,
    pub company_label: Option<String>,
    pub co_invest_count: usize,
}

/// The headline fields of one funding event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentSummary {
    pub label: Value,
    pub funded_year: Value,
    pub raised_amount: Value,
    pub raised_currency_code: Value,
}

impl From<&Hit> for InvestmentSummary {
    fn from(hit: &Hit) -> Self {
        Self {
            label: hit.field(fields::LABEL),
            funded_year: hit.field(fields::FUNDED_YEAR),
            raised_amount: hit.field(fields::RAISED_AMOUNT),
            raised_currency_code: hit.field(fields::RAISED_CURRENCY),
        }
    }
}

/// Two funding events of different companies close in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatePair {
    pub date_a: String,
    pub date_b: String,
    pub delta_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(source: Value) -> Hit {
        serde_json::from_value(json!({ "_source": source })).unwrap()
    }

    #[test]
    fn test_company_ref_from_hit() {
        let company = CompanyRef::from(&hit(json!({ "id": "c1", "label": "Acme" })));
        assert_eq!(company.company_id.as_deref(), Some("c1"));
        assert_eq!(company.company_label.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_investment_summary_keeps_missing_fields_null() {
        let summary = InvestmentSummary::from(&hit(json!({ "label": "Seed", "funded_year": 2015 })));
        assert_eq!(summary.label, json!("Seed"));
        assert_eq!(summary.funded_year, json!(2015));
        assert_eq!(summary.raised_amount, Value::Null);
    }

    #[test]
    fn test_collection_display() {
        assert_eq!(Collection::Company.to_string(), "Company");
        assert_eq!(Collection::Investor.kind(), "Investor");
        for c in [Collection::Company, Collection::Investment, Collection::Investor] {
            assert_eq!(c.to_string(), c.kind());
        }
    }
}
