use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Raw result of running one compiled statement against one customer backend.
/// Produced once per fan-out call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub customer_id: String,
    /// Result rows keyed by physical field names.
    pub data: Vec<Map<String, Value>>,
    pub sql_executed: String,
    pub execution_time_ms: f64,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Build the error-shaped result used when a customer's pipeline fails
    /// before or during execution.
    pub fn failed(
        customer_id: impl Into<String>,
        sql: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            data: vec![],
            sql_executed: sql.into(),
            execution_time_ms: 0.0,
            row_count: 0,
            error: Some(error.into()),
        }
    }
}

/// A value together with its normalized form and the conversion applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub original_value: Value,
    pub normalized_value: Value,
    pub original_type: crate::models::SemanticType,
    pub normalized_type: crate::models::SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_applied: Option<String>,
}

/// One row translated back into concept space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonizedRow {
    pub customer_id: String,
    /// Normalized values keyed by concept id. Concepts declared for the
    /// customer but absent from the physical row are present with a null
    /// value so row shapes stay uniform across customers.
    pub data: BTreeMap<String, Value>,
    /// Debugging context (original row, executed SQL, aggregation info).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Unified outcome of one fan-out call across N customer backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonizedResult {
    pub results: Vec<HarmonizedRow>,
    pub total_count: usize,
    pub customers_queried: Vec<String>,
    pub customers_succeeded: Vec<String>,
    #[serde(default)]
    pub customers_failed: Vec<String>,
    /// Error message per failed customer.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    pub execution_time_ms: f64,
}

impl HarmonizedResult {
    /// Percentage of queried customers that returned results, 0 when none
    /// were queried.
    pub fn success_rate(&self) -> f64 {
        if self.customers_queried.is_empty() {
            return 0.0;
        }
        self.customers_succeeded.len() as f64 / self.customers_queried.len() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_zero_when_nothing_queried() {
        let result = HarmonizedResult {
            results: vec![],
            total_count: 0,
            customers_queried: vec![],
            customers_succeeded: vec![],
            customers_failed: vec![],
            errors: BTreeMap::new(),
            execution_time_ms: 0.0,
        };
        assert_eq!(result.success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate_partial() {
        let result = HarmonizedResult {
            results: vec![],
            total_count: 0,
            customers_queried: vec![
                "customer_a".to_string(),
                "customer_b".to_string(),
                "customer_c".to_string(),
                "customer_d".to_string(),
            ],
            customers_succeeded: vec!["customer_a".to_string(), "customer_c".to_string()],
            customers_failed: vec!["customer_b".to_string(), "customer_d".to_string()],
            errors: BTreeMap::new(),
            execution_time_ms: 1.5,
        };
        assert_eq!(result.success_rate(), 50.0);
    }

    #[test]
    fn test_failed_query_result_shape() {
        let result = QueryResult::failed("customer_b", "", "boom".to_string());
        assert!(!result.success());
        assert_eq!(result.row_count, 0);
        assert!(result.data.is_empty());
    }
}
