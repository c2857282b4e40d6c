//! Query compiler: turns one abstract query plan into customer-specific SQL.
//!
//! Compilation is deterministic: table sets live in ordered collections and
//! concept iteration follows the graph's ordered keys, so the same plan and
//! customer always produce byte-identical SQL.

pub mod joins;

pub use joins::{JoinCatalog, JoinRule};

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::KnowledgeGraph;
use crate::models::{ConceptMapping, QueryFilter, QueryOperator, QueryPlan, SemanticType};

#[derive(Clone)]
pub struct QueryCompiler {
    graph: Arc<KnowledgeGraph>,
    joins: Arc<JoinCatalog>,
}

impl QueryCompiler {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self {
            graph,
            joins: Arc::new(JoinCatalog::with_defaults()),
        }
    }

    pub fn with_joins(graph: Arc<KnowledgeGraph>, joins: JoinCatalog) -> Self {
        Self {
            graph,
            joins: Arc::new(joins),
        }
    }

    /// Compile a query plan to SQL for one customer.
    ///
    /// Fails if any referenced concept lacks a mapping for this customer,
    /// or if two required tables have no registered join rule.
    pub fn compile_for_customer(&self, plan: &QueryPlan, customer_id: &str) -> Result<String> {
        let mappings = self.resolve_mappings(plan, customer_id)?;
        let tables = self.required_tables(plan, customer_id, &mappings);
        if tables.is_empty() {
            return Err(Error::Compile(format!(
                "no tables identified for query against {}",
                customer_id
            )));
        }

        let primary_table = self.primary_table(plan, &mappings, &tables);

        let select = self.select_clause(plan, customer_id, &mappings, &tables);
        let from = self.from_clause(customer_id, &primary_table, &tables)?;

        let mut parts = vec![select, from];
        if let Some(where_clause) = self.where_clause(plan, &mappings)? {
            parts.push(where_clause);
        }
        if let Some(group_by) = self.group_by_clause(plan, &mappings) {
            parts.push(group_by);
        }
        if let Some(order_by) = self.order_by_clause(plan, &mappings) {
            parts.push(order_by);
        }
        if let Some(limit) = plan.limit {
            parts.push(format!("LIMIT {}", limit));
        }

        Ok(parts.join("\n"))
    }

    /// Look up the mapping of every concept the plan references, failing on
    /// the first concept this customer does not map.
    fn resolve_mappings(
        &self,
        plan: &QueryPlan,
        customer_id: &str,
    ) -> Result<BTreeMap<String, ConceptMapping>> {
        let mut mappings = BTreeMap::new();
        for concept in plan.referenced_concepts() {
            let mapping = self.graph.get_mapping(&concept, customer_id).ok_or_else(|| {
                Error::UnmappedConcept {
                    concept: concept.clone(),
                    customer_id: customer_id.to_string(),
                }
            })?;
            mappings.insert(concept, mapping.clone());
        }
        Ok(mappings)
    }

    /// Union of physical tables needed by the plan. A mapping with a
    /// transformation contributes only its join requirements: the
    /// transformation expression subsumes the access path to its own table.
    fn required_tables(
        &self,
        plan: &QueryPlan,
        customer_id: &str,
        mappings: &BTreeMap<String, ConceptMapping>,
    ) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();

        let mut add = |mapping: &ConceptMapping| {
            if mapping.transformation.is_none() {
                tables.insert(mapping.table_name.clone());
            }
            tables.extend(mapping.join_requirements.iter().cloned());
        };

        for mapping in mappings.values() {
            add(mapping);
        }

        // An empty projection list means "all mapped concepts", which pulls
        // in their tables as well.
        if plan.projections.is_empty() {
            for concept in self.graph.all_concepts() {
                if let Some(mapping) = concept.get_mapping(customer_id) {
                    add(mapping);
                }
            }
        }

        tables
    }

    /// Single table wins outright; otherwise prefer the table backing the
    /// first projected concept, falling back to the lexicographically
    /// smallest table name.
    fn primary_table(
        &self,
        plan: &QueryPlan,
        mappings: &BTreeMap<String, ConceptMapping>,
        tables: &BTreeSet<String>,
    ) -> String {
        if tables.len() == 1 {
            return tables.iter().next().cloned().unwrap_or_default();
        }
        if let Some(first) = plan.projections.first() {
            if let Some(mapping) = mappings.get(first) {
                if tables.contains(&mapping.table_name) {
                    return mapping.table_name.clone();
                }
            }
        }
        tables.iter().next().cloned().unwrap_or_default()
    }

    fn select_clause(
        &self,
        plan: &QueryPlan,
        customer_id: &str,
        mappings: &BTreeMap<String, ConceptMapping>,
        tables: &BTreeSet<String>,
    ) -> String {
        let mut items = Vec::new();
        let aggregations = plan
            .aggregations
            .as_deref()
            .filter(|a| !a.is_empty());
        let has_aggregations = aggregations.is_some();

        if let Some(aggregations) = aggregations {
            for agg in aggregations {
                let expr = column_expression(&mappings[&agg.concept]);
                let alias = agg
                    .alias
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", agg.function.as_str(), agg.concept));
                items.push(format!("{}({}) AS {}", agg.function.as_sql(), expr, alias));
            }
            if let Some(group_by) = &plan.group_by {
                for concept_id in group_by {
                    let expr = column_expression(&mappings[concept_id]);
                    items.push(format!("{} AS {}", expr, concept_id));
                }
            }
        } else if !plan.projections.is_empty() {
            for concept_id in &plan.projections {
                let expr = column_expression(&mappings[concept_id]);
                items.push(format!("{} AS {}", expr, concept_id));
            }
        } else if tables.len() > 1 {
            // No explicit projection over a join: select every concept whose
            // mapping resolves into a table the query already requires.
            for concept in self.graph.all_concepts() {
                if let Some(mapping) = concept.get_mapping(customer_id) {
                    if tables.contains(&mapping.table_name) {
                        items.push(format!(
                            "{} AS {}",
                            column_expression(mapping),
                            concept.concept_id
                        ));
                    }
                }
            }
        } else {
            items.push("*".to_string());
        }

        // Joins over one-to-many tables duplicate rows; DISTINCT collapses
        // them unless an aggregation already produces one row per group.
        let distinct = if tables.len() > 1 && !has_aggregations {
            "DISTINCT "
        } else {
            ""
        };

        format!("SELECT {}{}", distinct, items.join(", "))
    }

    fn from_clause(
        &self,
        customer_id: &str,
        primary_table: &str,
        tables: &BTreeSet<String>,
    ) -> Result<String> {
        let mut parts = vec![format!(
            "FROM {} AS {}",
            primary_table,
            table_alias(primary_table)
        )];

        for table in tables {
            if table == primary_table {
                continue;
            }
            let rule = self
                .joins
                .get(customer_id, primary_table, table)
                .ok_or_else(|| Error::MissingJoinRule {
                    customer_id: customer_id.to_string(),
                    primary_table: primary_table.to_string(),
                    join_table: table.clone(),
                })?;
            parts.push(format!(
                "JOIN {} AS {} ON {}.{} = {}.{}",
                table,
                table_alias(table),
                table_alias(primary_table),
                rule.primary_column,
                table_alias(table),
                rule.join_column
            ));
        }

        Ok(parts.join("\n"))
    }

    fn where_clause(
        &self,
        plan: &QueryPlan,
        mappings: &BTreeMap<String, ConceptMapping>,
    ) -> Result<Option<String>> {
        if plan.filters.is_empty() {
            return Ok(None);
        }
        let conditions = plan
            .filters
            .iter()
            .map(|f| compile_filter(f, &mappings[&f.concept]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(format!("WHERE {}", conditions.join(" AND "))))
    }

    fn group_by_clause(
        &self,
        plan: &QueryPlan,
        mappings: &BTreeMap<String, ConceptMapping>,
    ) -> Option<String> {
        let group_by = plan.group_by.as_ref()?;
        if group_by.is_empty() {
            return None;
        }
        let items: Vec<String> = group_by
            .iter()
            .map(|concept_id| column_expression(&mappings[concept_id]))
            .collect();
        Some(format!("GROUP BY {}", items.join(", ")))
    }

    fn order_by_clause(
        &self,
        plan: &QueryPlan,
        mappings: &BTreeMap<String, ConceptMapping>,
    ) -> Option<String> {
        let order_by = plan.order_by.as_ref()?;
        if order_by.is_empty() {
            return None;
        }
        let items: Vec<String> = order_by
            .iter()
            .map(|(concept_id, direction)| {
                format!(
                    "{} {}",
                    column_expression(&mappings[concept_id]),
                    direction.as_sql()
                )
            })
            .collect();
        Some(format!("ORDER BY {}", items.join(", ")))
    }
}

/// `<alias>.<column>`, or the mapping's transformation template with
/// `{column}` substituted by that base expression.
fn column_expression(mapping: &ConceptMapping) -> String {
    let base = format!("{}.{}", table_alias(&mapping.table_name), mapping.column_name);
    match &mapping.transformation {
        Some(template) => template.replace("{column}", &base),
        None => base,
    }
}

/// Short table aliases come from a fixed lookup, with the table's first
/// character as the fallback for anything unknown.
fn table_alias(table_name: &str) -> String {
    match table_name {
        "contracts" => "c".to_string(),
        "contract_headers" => "h".to_string(),
        "contract_status_history" => "s".to_string(),
        "renewal_schedule" => "r".to_string(),
        other => other.chars().next().unwrap_or('t').to_string(),
    }
}

fn compile_filter(filter: &QueryFilter, mapping: &ConceptMapping) -> Result<String> {
    let expr = column_expression(mapping);
    let condition = match filter.operator {
        QueryOperator::Equals => format!("{} = {}", expr, quote_value(&filter.value)),
        QueryOperator::NotEquals => format!("{} != {}", expr, quote_value(&filter.value)),
        QueryOperator::GreaterThan => format!("{} > {}", expr, quote_value(&filter.value)),
        QueryOperator::GreaterThanOrEqual => {
            format!("{} >= {}", expr, quote_value(&filter.value))
        }
        QueryOperator::LessThan => format!("{} < {}", expr, quote_value(&filter.value)),
        QueryOperator::LessThanOrEqual => format!("{} <= {}", expr, quote_value(&filter.value)),
        QueryOperator::Between => {
            let (lo, hi) = value_pair(filter)?;
            format!("{} BETWEEN {} AND {}", expr, quote_value(lo), quote_value(hi))
        }
        QueryOperator::In => format!("{} IN ({})", expr, value_list(filter)?),
        QueryOperator::NotIn => format!("{} NOT IN ({})", expr, value_list(filter)?),
        QueryOperator::Contains => {
            format!("{} LIKE {}", expr, quote_str(&format!("%{}%", value_text(&filter.value))))
        }
        QueryOperator::StartsWith => {
            format!("{} LIKE {}", expr, quote_str(&format!("{}%", value_text(&filter.value))))
        }
        QueryOperator::WithinNextDays => {
            let days = filter.value.as_i64().ok_or_else(|| {
                Error::Compile(format!(
                    "within_next_days requires an integer day count, got {}",
                    filter.value
                ))
            })?;
            if mapping.semantic_type == SemanticType::DaysRemaining {
                // compare the raw day count, not the derived date expression
                let raw = format!(
                    "{}.{}",
                    table_alias(&mapping.table_name),
                    mapping.column_name
                );
                format!("{} BETWEEN 0 AND {}", raw, days)
            } else {
                format!(
                    "{} BETWEEN CURRENT_DATE AND DATE(CURRENT_DATE, '+{} days')",
                    expr, days
                )
            }
        }
        QueryOperator::DateRange => {
            let (start, end) = value_pair(filter)?;
            format!(
                "{} BETWEEN {} AND {}",
                expr,
                quote_value(start),
                quote_value(end)
            )
        }
    };
    Ok(condition)
}

fn value_pair(filter: &QueryFilter) -> Result<(&Value, &Value)> {
    match filter.value.as_array() {
        Some(pair) if pair.len() == 2 => Ok((&pair[0], &pair[1])),
        _ => Err(Error::Compile(format!(
            "operator {:?} on '{}' requires a [start, end] pair",
            filter.operator, filter.concept
        ))),
    }
}

fn value_list(filter: &QueryFilter) -> Result<String> {
    let values = filter.value.as_array().ok_or_else(|| {
        Error::Compile(format!(
            "operator {:?} on '{}' requires a value list",
            filter.operator, filter.concept
        ))
    })?;
    Ok(values.iter().map(quote_value).collect::<Vec<_>>().join(", "))
}

/// SQL literal for a JSON value: strings are single-quoted with internal
/// quotes doubled, booleans become 1/0, null stays NULL, numbers pass
/// through.
fn quote_value(value: &Value) -> String {
    match value {
        Value::String(s) => quote_str(s),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Null => "NULL".to_string(),
        Value::Number(n) => n.to_string(),
        other => quote_str(&other.to_string()),
    }
}

fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
