//! Result harmonization: raw per-customer rows into a single
//! concept-keyed shape.
//!
//! Compiled SQL already aliases projected columns to concept ids; this
//! layer covers the rest: `SELECT *` rows keyed by physical column names,
//! value-level normalization (day counts to dates, vocabulary cleanup),
//! and cross-customer bookkeeping.

pub mod vocabulary;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::graph::KnowledgeGraph;
use crate::models::{
    AggregateFunction, ConceptMapping, HarmonizedResult, HarmonizedRow, NormalizedValue,
    QueryPlan, QueryResult, SemanticType,
};

pub struct ResultHarmonizer {
    graph: Arc<KnowledgeGraph>,
}

impl ResultHarmonizer {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }

    /// Merge per-customer results into one harmonized set. Failed results
    /// contribute an error entry instead of rows; every queried customer is
    /// accounted for in exactly one of succeeded or failed.
    pub fn harmonize(&self, plan: &QueryPlan, results: Vec<QueryResult>) -> HarmonizedResult {
        let mut rows = Vec::new();
        let mut queried = Vec::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut errors = BTreeMap::new();
        let mut total_time = 0.0;

        for result in results {
            total_time += result.execution_time_ms;
            queried.push(result.customer_id.clone());
            if let Some(error) = &result.error {
                errors.insert(result.customer_id.clone(), error.clone());
                failed.push(result.customer_id);
                continue;
            }

            let concepts = self.concepts_for(plan, &result.customer_id);
            for row in &result.data {
                rows.push(self.harmonize_row(
                    &result.customer_id,
                    row,
                    &concepts,
                    &result.sql_executed,
                ));
            }
            succeeded.push(result.customer_id);
        }

        debug!(
            queried = queried.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            rows = rows.len(),
            "harmonized results"
        );

        HarmonizedResult {
            total_count: rows.len(),
            results: rows,
            customers_queried: queried,
            customers_succeeded: succeeded,
            customers_failed: failed,
            errors,
            execution_time_ms: total_time,
        }
    }

    /// Concepts to extract per row: the plan's projections together with
    /// every concept its filters and aggregations touch, or everything this
    /// customer maps when the plan projects nothing. Filtered-on concepts
    /// appear in the output rows even when the SQL never selected them, so
    /// row shapes stay uniform across the plan.
    fn concepts_for(&self, plan: &QueryPlan, customer_id: &str) -> Vec<(String, ConceptMapping)> {
        let concept_ids: Vec<String> = if plan.projections.is_empty() {
            self.graph
                .all_concepts()
                .filter(|c| c.get_mapping(customer_id).is_some())
                .map(|c| c.concept_id.clone())
                .collect()
        } else {
            let mut ids = plan.projections.clone();
            ids.extend(plan.filters.iter().map(|f| f.concept.clone()));
            if let Some(aggregations) = &plan.aggregations {
                ids.extend(aggregations.iter().map(|a| a.concept.clone()));
            }
            ids.sort();
            ids.dedup();
            ids
        };

        concept_ids
            .into_iter()
            .filter_map(|concept_id| {
                self.graph
                    .get_mapping(&concept_id, customer_id)
                    .map(|m| (concept_id.clone(), m.clone()))
            })
            .collect()
    }

    fn harmonize_row(
        &self,
        customer_id: &str,
        row: &serde_json::Map<String, Value>,
        concepts: &[(String, ConceptMapping)],
        sql: &str,
    ) -> HarmonizedRow {
        let mut data = BTreeMap::new();
        let mut consumed = BTreeSet::new();

        for (concept_id, mapping) in concepts {
            // Projected columns arrive already aliased to the concept id;
            // SELECT * rows carry the physical column name instead.
            let raw = if let Some(value) = row.get(concept_id) {
                consumed.insert(concept_id.clone());
                value.clone()
            } else if let Some(value) = row.get(&mapping.column_name) {
                consumed.insert(mapping.column_name.clone());
                value.clone()
            } else {
                Value::Null
            };
            let normalized = self.normalize_value(concept_id, Some(mapping), raw, None);
            data.insert(concept_id.clone(), normalized.normalized_value);
        }

        // Columns no concept claimed survive untouched in the metadata, so
        // SELECT * queries never silently drop customer-specific fields.
        let mut metadata = BTreeMap::new();
        for (column, value) in row {
            if !consumed.contains(column) {
                metadata.insert(column.clone(), normalize_categorical(column, value.clone()));
            }
        }
        metadata.insert("original_row".to_string(), Value::Object(row.clone()));
        metadata.insert("sql_executed".to_string(), Value::from(sql));

        HarmonizedRow {
            customer_id: customer_id.to_string(),
            data,
            metadata,
        }
    }

    /// Normalize one field value according to its mapping's semantic type,
    /// then convert to `target_type` when one is requested and differs.
    ///
    /// A field with no mapping for its backend passes through untouched
    /// with both types reported as unknown. An unconvertible value keeps
    /// its normalized form rather than erroring.
    pub fn normalize_value(
        &self,
        concept_id: &str,
        mapping: Option<&ConceptMapping>,
        value: Value,
        target_type: Option<SemanticType>,
    ) -> NormalizedValue {
        let Some(mapping) = mapping else {
            return NormalizedValue {
                original_value: value.clone(),
                normalized_value: value,
                original_type: SemanticType::Unknown,
                normalized_type: SemanticType::Unknown,
                transformation_applied: None,
            };
        };

        let original = value.clone();
        let original_type = mapping.semantic_type;

        let (normalized, normalized_type, applied) = match mapping.semantic_type {
            // A transformation in the compiled SQL already produced a date
            // string; a bare integer means the raw day count leaked through
            // and still needs converting.
            SemanticType::DaysRemaining => match value.as_i64() {
                Some(days) => (
                    Value::from(days_to_date(days)),
                    SemanticType::Date,
                    Some("days_remaining_to_date".to_string()),
                ),
                None => (value, SemanticType::Date, None),
            },
            // Annual values multiply up to lifetime totals in SQL; the
            // semantic label changes even when the number passes through.
            SemanticType::AnnualRecurringRevenue => {
                (value, SemanticType::LifetimeTotal, None)
            }
            SemanticType::Date => {
                // Dates stay textual; non-ISO spellings are carried rather
                // than rejected so one odd row cannot sink a result set.
                (value, SemanticType::Date, None)
            }
            _ => (
                normalize_categorical(concept_id, value),
                mapping.semantic_type,
                None,
            ),
        };

        if let Some(target) = target_type {
            if target != normalized_type {
                if let Some(converted) = convert_type(&normalized, target) {
                    return NormalizedValue {
                        original_value: original,
                        normalized_value: converted,
                        original_type,
                        normalized_type: target,
                        transformation_applied: applied
                            .or_else(|| Some(format!("cast_to_{}", target.as_str()))),
                    };
                }
            }
        }

        NormalizedValue {
            original_value: original,
            normalized_value: normalized,
            original_type,
            normalized_type,
            transformation_applied: applied,
        }
    }
}

/// Cast a value to the requested semantic type; None when the value cannot
/// represent that type, in which case the caller keeps the original.
fn convert_type(value: &Value, target: SemanticType) -> Option<Value> {
    match target {
        SemanticType::Float => value.as_f64().map(Value::from),
        SemanticType::Integer => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(Value::from),
        SemanticType::Date => match value {
            // bare integer is a day count
            Value::Number(n) => n.as_i64().map(|days| Value::from(days_to_date(days))),
            Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|_| value.clone()),
            _ => None,
        },
        SemanticType::Text => Some(Value::from(value_text(value))),
        _ => None,
    }
}

/// Sort a harmonized result by a data field, keeping all cross-customer
/// bookkeeping. Numbers compare numerically, strings lexicographically,
/// mixed types through their text form.
pub fn sort_results(
    mut result: HarmonizedResult,
    field: &str,
    descending: bool,
) -> HarmonizedResult {
    result.results.sort_by(|a, b| {
        let left = a.data.get(field).unwrap_or(&Value::Null);
        let right = b.data.get(field).unwrap_or(&Value::Null);
        let ordering = compare_values(left, right);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    result
}

/// Keep only the rows the predicate accepts; queried/succeeded/failed
/// bookkeeping and errors carry over unchanged.
pub fn filter_results<F>(mut result: HarmonizedResult, predicate: F) -> HarmonizedResult
where
    F: Fn(&HarmonizedRow) -> bool,
{
    result.results.retain(|row| predicate(row));
    result.total_count = result.results.len();
    result
}

/// Group a harmonized result by one or more fields and aggregate others
/// across the whole set. Output rows carry the synthetic customer id
/// "aggregated" and record group size and contributing customers in their
/// metadata; the result keeps the input's cross-customer bookkeeping.
pub fn aggregate_results(
    result: &HarmonizedResult,
    group_by: &[String],
    aggregations: &BTreeMap<String, AggregateFunction>,
) -> HarmonizedResult {
    let mut groups: BTreeMap<Vec<String>, Vec<&HarmonizedRow>> = BTreeMap::new();
    for row in &result.results {
        let key: Vec<String> = group_by
            .iter()
            .map(|field| {
                row.data
                    .get(field)
                    .map(value_text)
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect();
        groups.entry(key).or_default().push(row);
    }

    let mut aggregated = Vec::new();
    for (key, members) in groups {
        let mut data = BTreeMap::new();
        for (field, part) in group_by.iter().zip(key) {
            data.insert(field.clone(), Value::from(part));
        }

        for (field, function) in aggregations {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|row| row.data.get(field).and_then(Value::as_f64))
                .collect();
            let computed = match function {
                // count covers non-null values only, not group size
                AggregateFunction::Count => Some(
                    members
                        .iter()
                        .filter(|row| row.data.get(field).is_some_and(|v| !v.is_null()))
                        .count() as f64,
                ),
                AggregateFunction::Sum => Some(values.iter().sum()),
                AggregateFunction::Avg if !values.is_empty() => {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
                AggregateFunction::Min => values.iter().cloned().reduce(f64::min),
                AggregateFunction::Max => values.iter().cloned().reduce(f64::max),
                _ => None,
            };
            data.insert(
                format!("{}_{}", field, function.as_str()),
                computed.map(Value::from).unwrap_or(Value::Null),
            );
        }

        let customers: BTreeSet<&str> =
            members.iter().map(|row| row.customer_id.as_str()).collect();
        let mut metadata = BTreeMap::new();
        metadata.insert("row_count".to_string(), Value::from(members.len()));
        metadata.insert(
            "customers".to_string(),
            Value::from(customers.into_iter().collect::<Vec<_>>()),
        );

        aggregated.push(HarmonizedRow {
            customer_id: "aggregated".to_string(),
            data,
            metadata,
        });
    }

    HarmonizedResult {
        total_count: aggregated.len(),
        results: aggregated,
        customers_queried: result.customers_queried.clone(),
        customers_succeeded: result.customers_succeeded.clone(),
        customers_failed: result.customers_failed.clone(),
        errors: result.errors.clone(),
        execution_time_ms: result.execution_time_ms,
    }
}

/// Categorical fields with known vocabularies get canonical spellings;
/// everything else passes through.
fn normalize_categorical(name: &str, value: Value) -> Value {
    let is_industry = name.contains("industry") || name.contains("sector");
    match (&value, is_industry) {
        (Value::String(s), true) => Value::from(vocabulary::normalize_industry(s)),
        _ => value,
    }
}

fn days_to_date(days: i64) -> String {
    let date = Utc::now().date_naive() + Duration::days(days);
    date.format("%Y-%m-%d").to_string()
}

fn compare_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => match (left.as_str(), right.as_str()) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => value_text(left).cmp(&value_text(right)),
        },
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(table: &str, column: &str, semantic_type: SemanticType) -> ConceptMapping {
        ConceptMapping {
            customer_id: "customer_a".to_string(),
            table_name: table.to_string(),
            column_name: column.to_string(),
            data_type: "TEXT".to_string(),
            semantic_type,
            transformation: None,
            join_requirements: vec![],
        }
    }

    fn fixture_graph() -> Arc<KnowledgeGraph> {
        let mut graph = KnowledgeGraph::new();
        graph
            .add_concept("contract_identifier", "Contract Identifier", "", vec![])
            .unwrap();
        graph
            .add_concept("contract_value", "Contract Value", "", vec![])
            .unwrap();
        graph
            .add_mapping(
                "contract_identifier",
                mapping("contracts", "contract_id", SemanticType::Integer),
            )
            .unwrap();
        graph
            .add_mapping(
                "contract_value",
                mapping("contracts", "contract_value", SemanticType::LifetimeTotal),
            )
            .unwrap();
        Arc::new(graph)
    }

    fn result_of(rows: Vec<HarmonizedRow>) -> HarmonizedResult {
        HarmonizedResult {
            total_count: rows.len(),
            results: rows,
            customers_queried: vec!["customer_a".to_string()],
            customers_succeeded: vec!["customer_a".to_string()],
            customers_failed: vec![],
            errors: BTreeMap::new(),
            execution_time_ms: 2.5,
        }
    }

    fn result_with_rows(customer_id: &str, rows: Vec<Value>) -> QueryResult {
        QueryResult {
            customer_id: customer_id.to_string(),
            row_count: rows.len(),
            data: rows
                .into_iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect(),
            sql_executed: "SELECT *".to_string(),
            execution_time_ms: 1.0,
            error: None,
        }
    }

    #[test]
    fn test_harmonize_keys_rows_by_concept() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let plan = QueryPlan::find(vec![
            "contract_identifier".to_string(),
            "contract_value".to_string(),
        ]);
        let results = vec![result_with_rows(
            "customer_a",
            vec![json!({"contract_identifier": 1, "contract_value": 120000.0})],
        )];

        let harmonized = harmonizer.harmonize(&plan, results);
        assert_eq!(harmonized.total_count, 1);
        assert_eq!(harmonized.customers_succeeded, vec!["customer_a"]);
        assert!(harmonized.customers_failed.is_empty());
        let row = &harmonized.results[0];
        assert_eq!(row.data["contract_identifier"], json!(1));
        assert_eq!(row.data["contract_value"], json!(120000.0));
    }

    #[test]
    fn test_harmonize_select_star_uses_column_names() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let plan = QueryPlan::find(vec![]);
        let results = vec![result_with_rows(
            "customer_a",
            vec![json!({"contract_id": 7, "contract_value": 500.0, "industry": "tech"})],
        )];

        let harmonized = harmonizer.harmonize(&plan, results);
        let row = &harmonized.results[0];
        assert_eq!(row.data["contract_identifier"], json!(7));
        // column no concept claims lands in metadata, vocabulary applied
        assert_eq!(row.metadata["industry"], json!("Technology"));
    }

    #[test]
    fn test_filter_and_aggregation_concepts_appear_in_rows() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        // projection covers only the identifier; the filter's concept must
        // still get a key in every harmonized row
        let plan = QueryPlan {
            filters: vec![crate::models::QueryFilter {
                concept: "contract_value".to_string(),
                operator: crate::models::QueryOperator::GreaterThan,
                value: json!(1000),
                semantic_note: None,
            }],
            ..QueryPlan::find(vec!["contract_identifier".to_string()])
        };
        let results = vec![result_with_rows(
            "customer_a",
            vec![json!({"contract_identifier": 1})],
        )];

        let harmonized = harmonizer.harmonize(&plan, results);
        let row = &harmonized.results[0];
        assert!(row.data.contains_key("contract_value"));
        assert_eq!(row.data["contract_value"], Value::Null);
        assert_eq!(row.data["contract_identifier"], json!(1));
    }

    #[test]
    fn test_row_metadata_carries_original_row_and_sql() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let plan = QueryPlan::find(vec!["contract_identifier".to_string()]);
        let results = vec![result_with_rows(
            "customer_a",
            vec![json!({"contract_identifier": 1})],
        )];

        let harmonized = harmonizer.harmonize(&plan, results);
        let row = &harmonized.results[0];
        assert_eq!(row.metadata["sql_executed"], json!("SELECT *"));
        assert_eq!(
            row.metadata["original_row"],
            json!({"contract_identifier": 1})
        );
    }

    #[test]
    fn test_harmonize_accounts_for_failures() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let plan = QueryPlan::find(vec!["contract_identifier".to_string()]);
        let results = vec![
            result_with_rows("customer_a", vec![json!({"contract_identifier": 1})]),
            QueryResult::failed("customer_b", "SELECT 1", "no such table: contracts"),
        ];

        let harmonized = harmonizer.harmonize(&plan, results);
        assert_eq!(harmonized.customers_queried, vec!["customer_a", "customer_b"]);
        assert_eq!(harmonized.customers_succeeded, vec!["customer_a"]);
        assert_eq!(harmonized.customers_failed, vec!["customer_b"]);
        assert!(harmonized.errors["customer_b"].contains("no such table"));
        assert!((harmonized.success_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_field_becomes_null() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let plan = QueryPlan::find(vec![
            "contract_identifier".to_string(),
            "contract_value".to_string(),
        ]);
        let results = vec![result_with_rows(
            "customer_a",
            vec![json!({"contract_identifier": 1})],
        )];

        let harmonized = harmonizer.harmonize(&plan, results);
        assert_eq!(harmonized.results[0].data["contract_value"], Value::Null);
    }

    #[test]
    fn test_normalize_days_remaining_to_date() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let days_mapping = mapping("contracts", "days_remaining", SemanticType::DaysRemaining);

        let normalized =
            harmonizer.normalize_value("contract_expiration", Some(&days_mapping), json!(30), None);
        assert_eq!(normalized.normalized_type, SemanticType::Date);
        assert_eq!(
            normalized.transformation_applied.as_deref(),
            Some("days_remaining_to_date")
        );
        let expected = (Utc::now().date_naive() + Duration::days(30))
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(normalized.normalized_value, json!(expected));

        // already a date string: idempotent
        let again = harmonizer.normalize_value(
            "contract_expiration",
            Some(&days_mapping),
            normalized.normalized_value.clone(),
            None,
        );
        assert_eq!(again.normalized_value, normalized.normalized_value);
    }

    #[test]
    fn test_annual_value_relabeled_as_lifetime() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let annual = mapping(
            "contracts",
            "contract_value",
            SemanticType::AnnualRecurringRevenue,
        );
        // SQL already multiplied by the term; the number passes through
        let normalized =
            harmonizer.normalize_value("contract_value", Some(&annual), json!(200000.0), None);
        assert_eq!(normalized.normalized_value, json!(200000.0));
        assert_eq!(normalized.normalized_type, SemanticType::LifetimeTotal);
    }

    #[test]
    fn test_unmapped_field_passes_through_as_unknown() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let normalized =
            harmonizer.normalize_value("custom_field", None, json!("verbatim"), None);
        assert_eq!(normalized.normalized_value, json!("verbatim"));
        assert_eq!(normalized.original_type, SemanticType::Unknown);
        assert_eq!(normalized.normalized_type, SemanticType::Unknown);
        assert!(normalized.transformation_applied.is_none());
    }

    #[test]
    fn test_target_type_conversion() {
        let harmonizer = ResultHarmonizer::new(fixture_graph());
        let int_mapping = mapping("contracts", "contract_value", SemanticType::Integer);

        // integer to float
        let as_float = harmonizer.normalize_value(
            "contract_value",
            Some(&int_mapping),
            json!(42),
            Some(SemanticType::Float),
        );
        assert_eq!(as_float.normalized_value, json!(42.0));
        assert_eq!(as_float.normalized_type, SemanticType::Float);
        assert_eq!(as_float.transformation_applied.as_deref(), Some("cast_to_float"));

        // integer day count to date
        let as_date = harmonizer.normalize_value(
            "contract_expiration",
            Some(&int_mapping),
            json!(7),
            Some(SemanticType::Date),
        );
        let expected = (Utc::now().date_naive() + Duration::days(7))
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(as_date.normalized_value, json!(expected));

        // anything to text
        let as_text = harmonizer.normalize_value(
            "contract_value",
            Some(&int_mapping),
            json!(42),
            Some(SemanticType::Text),
        );
        assert_eq!(as_text.normalized_value, json!("42"));

        // unconvertible: original survives under its normalized type
        let text_mapping = mapping("contracts", "status", SemanticType::Text);
        let kept = harmonizer.normalize_value(
            "contract_status",
            Some(&text_mapping),
            json!("active"),
            Some(SemanticType::Float),
        );
        assert_eq!(kept.normalized_value, json!("active"));
        assert_eq!(kept.normalized_type, SemanticType::Text);
    }

    #[test]
    fn test_sort_results_numeric_and_descending() {
        let rows: Vec<HarmonizedRow> = [10.0, 300.0, 25.0]
            .iter()
            .enumerate()
            .map(|(i, v)| HarmonizedRow {
                customer_id: format!("customer_{}", i),
                data: BTreeMap::from([("contract_value".to_string(), json!(v))]),
                metadata: BTreeMap::new(),
            })
            .collect();
        let sorted = sort_results(result_of(rows), "contract_value", true);
        let values: Vec<f64> = sorted
            .results
            .iter()
            .map(|r| r.data["contract_value"].as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![300.0, 25.0, 10.0]);
        // bookkeeping survives the sort
        assert_eq!(sorted.customers_queried, vec!["customer_a"]);
    }

    #[test]
    fn test_aggregate_results_groups_and_computes() {
        let row = |customer: &str, status: &str, value: f64| HarmonizedRow {
            customer_id: customer.to_string(),
            data: BTreeMap::from([
                ("contract_status".to_string(), json!(status)),
                ("contract_value".to_string(), json!(value)),
            ]),
            metadata: BTreeMap::new(),
        };
        let rows = vec![
            row("customer_a", "active", 100.0),
            row("customer_b", "active", 50.0),
            row("customer_a", "expired", 10.0),
        ];
        let aggregations =
            BTreeMap::from([("contract_value".to_string(), AggregateFunction::Sum)]);

        let input = result_of(rows);
        let aggregated = aggregate_results(
            &input,
            &["contract_status".to_string()],
            &aggregations,
        );
        assert_eq!(aggregated.total_count, 2);
        let active = &aggregated.results[0];
        assert_eq!(active.customer_id, "aggregated");
        assert_eq!(active.data["contract_status"], json!("active"));
        assert_eq!(active.data["contract_value_sum"], json!(150.0));
        assert_eq!(active.metadata["row_count"], json!(2));
        assert_eq!(
            active.metadata["customers"],
            json!(["customer_a", "customer_b"])
        );
        // the input's cross-customer bookkeeping carries over
        assert_eq!(aggregated.customers_queried, input.customers_queried);
        assert_eq!(aggregated.errors, input.errors);
    }

    #[test]
    fn test_aggregate_results_multiple_group_fields() {
        let row = |status: &str, region: &str, value: f64| HarmonizedRow {
            customer_id: "customer_a".to_string(),
            data: BTreeMap::from([
                ("contract_status".to_string(), json!(status)),
                ("region".to_string(), json!(region)),
                ("contract_value".to_string(), json!(value)),
            ]),
            metadata: BTreeMap::new(),
        };
        let rows = vec![
            row("active", "east", 100.0),
            row("active", "west", 50.0),
            row("active", "east", 25.0),
        ];
        let aggregations =
            BTreeMap::from([("contract_value".to_string(), AggregateFunction::Sum)]);

        let aggregated = aggregate_results(
            &result_of(rows),
            &["contract_status".to_string(), "region".to_string()],
            &aggregations,
        );
        assert_eq!(aggregated.total_count, 2);
        let east = &aggregated.results[0];
        assert_eq!(east.data["contract_status"], json!("active"));
        assert_eq!(east.data["region"], json!("east"));
        assert_eq!(east.data["contract_value_sum"], json!(125.0));
    }

    #[test]
    fn test_count_skips_null_values() {
        let row = |value: Value| HarmonizedRow {
            customer_id: "customer_a".to_string(),
            data: BTreeMap::from([
                ("contract_status".to_string(), json!("active")),
                ("contract_value".to_string(), value),
            ]),
            metadata: BTreeMap::new(),
        };
        let rows = vec![row(json!(100.0)), row(Value::Null), row(json!(50.0))];
        let aggregations =
            BTreeMap::from([("contract_value".to_string(), AggregateFunction::Count)]);

        let aggregated = aggregate_results(
            &result_of(rows),
            &["contract_status".to_string()],
            &aggregations,
        );
        let group = &aggregated.results[0];
        assert_eq!(group.data["contract_value_count"], json!(2.0));
        // group size still reflects every member
        assert_eq!(group.metadata["row_count"], json!(3));
    }

    #[test]
    fn test_filter_results() {
        let row = |value: f64| HarmonizedRow {
            customer_id: "customer_a".to_string(),
            data: BTreeMap::from([("contract_value".to_string(), json!(value))]),
            metadata: BTreeMap::new(),
        };
        let rows = vec![row(10.0), row(500.0)];
        let kept = filter_results(result_of(rows), |r| {
            r.data["contract_value"].as_f64().unwrap_or(0.0) > 100.0
        });
        assert_eq!(kept.total_count, 1);
        assert_eq!(kept.results[0].data["contract_value"], json!(500.0));
        assert_eq!(kept.customers_succeeded, vec!["customer_a"]);
    }
}
