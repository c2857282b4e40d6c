use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic interpretation of a physical column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    LifetimeTotal,
    AnnualRecurringRevenue,
    Date,
    DaysRemaining,
    Text,
    Integer,
    Float,
    Boolean,
    /// Field has no mapping for the backend it came from; the value passes
    /// through harmonization untouched.
    Unknown,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::LifetimeTotal => "lifetime_total",
            SemanticType::AnnualRecurringRevenue => "annual_recurring_revenue",
            SemanticType::Date => "date",
            SemanticType::DaysRemaining => "days_remaining",
            SemanticType::Text => "text",
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Boolean => "boolean",
            SemanticType::Unknown => "unknown",
        }
    }
}

/// Physical location and encoding of a concept within one customer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMapping {
    pub customer_id: String,
    pub table_name: String,
    pub column_name: String,
    /// SQL data type of the physical column (TEXT, INTEGER, REAL, ...).
    pub data_type: String,
    pub semantic_type: SemanticType,
    /// SQL expression template with a `{column}` placeholder, set when the
    /// physical value must be rewritten to reach the concept's canonical form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    /// Additional tables that must be joined to reach this column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join_requirements: Vec<String>,
}

/// A backend-independent semantic field spanning multiple customer schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticConcept {
    pub concept_id: String,
    pub concept_name: String,
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Mappings per customer, keyed by customer id.
    #[serde(default)]
    pub customer_mappings: BTreeMap<String, ConceptMapping>,
}

impl SemanticConcept {
    pub fn get_mapping(&self, customer_id: &str) -> Option<&ConceptMapping> {
        self.customer_mappings.get(customer_id)
    }

    /// True when `text` matches the concept id, display name, or any alias,
    /// case-insensitively.
    pub fn matches_alias(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.concept_id.to_lowercase() == needle
            || self.concept_name.to_lowercase() == needle
            || self.aliases.iter().any(|a| a.to_lowercase() == needle)
    }
}
