use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the caller wants done with the matched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FindContracts,
    CountContracts,
    AggregateValues,
    CompareCustomers,
    GroupBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
    Contains,
    StartsWith,
    WithinNextDays,
    DateRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// A filter condition expressed in concept space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub concept: String,
    pub operator: QueryOperator,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAggregation {
    pub function: AggregateFunction,
    pub concept: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Schema-independent query representation, produced by the external
/// query-understanding collaborator and consumed read-only by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Concepts to return; empty means all mapped concepts.
    #[serde(default)]
    pub projections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Vec<QueryAggregation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<(String, SortDirection)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Explicit customer subset; None queries every known customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_customers: Option<Vec<String>>,
}

impl QueryPlan {
    /// A bare FIND plan over the given projections, the common starting
    /// point for callers that build plans by hand.
    pub fn find(projections: Vec<String>) -> Self {
        Self {
            intent: QueryIntent::FindContracts,
            filters: vec![],
            projections,
            aggregations: None,
            group_by: None,
            order_by: None,
            limit: None,
            target_customers: None,
        }
    }

    /// Every concept id referenced anywhere in the plan, deduplicated and
    /// sorted. Does not expand an empty projection list; callers that need
    /// "all mapped concepts" handle that against the graph.
    pub fn referenced_concepts(&self) -> Vec<String> {
        let mut concepts: Vec<String> = self.projections.clone();
        concepts.extend(self.filters.iter().map(|f| f.concept.clone()));
        if let Some(aggs) = &self.aggregations {
            concepts.extend(aggs.iter().map(|a| a.concept.clone()));
        }
        if let Some(group_by) = &self.group_by {
            concepts.extend(group_by.iter().cloned());
        }
        if let Some(order_by) = &self.order_by {
            concepts.extend(order_by.iter().map(|(c, _)| c.clone()));
        }
        concepts.sort();
        concepts.dedup();
        concepts
    }
}
