//! Built-in knowledge graph covering the six known customer schemas.
//!
//! Kept as code rather than a checked-in JSON document so mapping changes
//! go through the same validation as runtime additions.

use crate::error::Result;
use crate::models::{ConceptMapping, SemanticType};

use super::KnowledgeGraph;

fn mapping(
    customer_id: &str,
    table_name: &str,
    column_name: &str,
    data_type: &str,
    semantic_type: SemanticType,
) -> ConceptMapping {
    ConceptMapping {
        customer_id: customer_id.to_string(),
        table_name: table_name.to_string(),
        column_name: column_name.to_string(),
        data_type: data_type.to_string(),
        semantic_type,
        transformation: None,
        join_requirements: vec![],
    }
}

/// Build the graph for customers a through f: flat and normalized
/// layouts, day-count expirations, and annual contract values.
pub fn bootstrap_graph() -> Result<KnowledgeGraph> {
    let mut graph = KnowledgeGraph::new();

    graph.add_concept(
        "contract_identifier",
        "Contract Identifier",
        "Unique identifier for a contract",
        vec![
            "contract_id".to_string(),
            "id".to_string(),
            "contract_name".to_string(),
            "name".to_string(),
        ],
    )?;
    for (customer, table, column) in [
        ("customer_a", "contracts", "contract_id"),
        ("customer_b", "contract_headers", "id"),
        ("customer_c", "contracts", "id"),
        ("customer_d", "contracts", "contract_id"),
        ("customer_e", "contracts", "contract_id"),
        ("customer_f", "contracts", "contract_id"),
    ] {
        graph.add_mapping(
            "contract_identifier",
            mapping(customer, table, column, "INTEGER", SemanticType::Integer),
        )?;
    }

    graph.add_concept(
        "contract_expiration",
        "Contract Expiration",
        "When the contract expires or is due for renewal",
        vec![
            "expiry".to_string(),
            "expiration".to_string(),
            "renewal_date".to_string(),
            "end_date".to_string(),
        ],
    )?;
    graph.add_mapping(
        "contract_expiration",
        mapping("customer_a", "contracts", "expiry_date", "TEXT", SemanticType::Date),
    )?;
    let mut b_expiration = mapping(
        "customer_b",
        "renewal_schedule",
        "renewal_date",
        "TEXT",
        SemanticType::Date,
    );
    b_expiration.join_requirements = vec!["contract_headers".to_string()];
    graph.add_mapping("contract_expiration", b_expiration)?;
    graph.add_mapping(
        "contract_expiration",
        mapping("customer_c", "contracts", "expiration_date", "TEXT", SemanticType::Date),
    )?;
    let mut d_expiration = mapping(
        "customer_d",
        "contracts",
        "days_remaining",
        "INTEGER",
        SemanticType::DaysRemaining,
    );
    d_expiration.transformation =
        Some("DATE(CURRENT_DATE, '+' || {column} || ' days')".to_string());
    graph.add_mapping("contract_expiration", d_expiration)?;
    graph.add_mapping(
        "contract_expiration",
        mapping("customer_e", "contracts", "expiry_date", "TEXT", SemanticType::Date),
    )?;
    graph.add_mapping(
        "contract_expiration",
        mapping("customer_f", "contracts", "expiration_date", "TEXT", SemanticType::Date),
    )?;

    graph.add_concept(
        "contract_value",
        "Contract Value",
        "Monetary value of the contract",
        vec![
            "value".to_string(),
            "amount".to_string(),
            "total_value".to_string(),
            "contract_amount".to_string(),
        ],
    )?;
    for (customer, column) in [
        ("customer_a", "contract_value"),
        ("customer_d", "contract_value"),
        ("customer_e", "contract_value"),
    ] {
        graph.add_mapping(
            "contract_value",
            mapping(customer, "contracts", column, "INTEGER", SemanticType::LifetimeTotal),
        )?;
    }
    graph.add_mapping(
        "contract_value",
        mapping(
            "customer_b",
            "contract_headers",
            "contract_value",
            "INTEGER",
            SemanticType::LifetimeTotal,
        ),
    )?;
    graph.add_mapping(
        "contract_value",
        mapping("customer_c", "contracts", "total_value", "INTEGER", SemanticType::LifetimeTotal),
    )?;
    // customer_f stores annual recurring revenue; lifetime value is the
    // annual figure times the contract term
    let mut f_value = mapping(
        "customer_f",
        "contracts",
        "contract_value",
        "INTEGER",
        SemanticType::AnnualRecurringRevenue,
    );
    f_value.transformation = Some("({column} * term_years)".to_string());
    graph.add_mapping("contract_value", f_value)?;

    graph.add_concept(
        "contract_status",
        "Contract Status",
        "Current status of the contract (active, inactive, expired, pending)",
        vec![
            "status".to_string(),
            "current_status".to_string(),
            "state".to_string(),
        ],
    )?;
    for (customer, column) in [
        ("customer_a", "status"),
        ("customer_d", "status"),
        ("customer_e", "status"),
        ("customer_f", "status"),
    ] {
        graph.add_mapping(
            "contract_status",
            mapping(customer, "contracts", column, "TEXT", SemanticType::Text),
        )?;
    }
    graph.add_mapping(
        "contract_status",
        mapping("customer_c", "contracts", "current_status", "TEXT", SemanticType::Text),
    )?;
    // customer_b keeps a status history; the current status is the latest
    // entry, fetched with a correlated subquery against the header row
    let mut b_status = mapping(
        "customer_b",
        "contract_status_history",
        "status",
        "TEXT",
        SemanticType::Text,
    );
    b_status.transformation = Some(
        "(SELECT status FROM contract_status_history \
         WHERE contract_id = h.id ORDER BY status_date DESC LIMIT 1)"
            .to_string(),
    );
    b_status.join_requirements = vec!["contract_headers".to_string()];
    graph.add_mapping("contract_status", b_status)?;

    graph.add_concept(
        "contract_start",
        "Contract Start Date",
        "When the contract began or was signed",
        vec![
            "start_date".to_string(),
            "inception_date".to_string(),
            "begin_date".to_string(),
            "effective_date".to_string(),
        ],
    )?;
    for (customer, table, column) in [
        ("customer_a", "contracts", "start_date"),
        ("customer_b", "contract_headers", "start_date"),
        ("customer_c", "contracts", "inception_date"),
        ("customer_d", "contracts", "start_date"),
        ("customer_e", "contracts", "start_date"),
        ("customer_f", "contracts", "start_date"),
    ] {
        graph.add_mapping(
            "contract_start",
            mapping(customer, table, column, "TEXT", SemanticType::Date),
        )?;
    }

    graph.add_transformation(
        "days_remaining",
        "date",
        "DATE(CURRENT_DATE, '+' || {column} || ' days')",
    )?;
    graph.add_transformation(
        "date",
        "days_remaining",
        "CAST((JULIANDAY({column}) - JULIANDAY(CURRENT_DATE)) AS INTEGER)",
    )?;
    graph.add_transformation("annual", "lifetime", "({column} * {term_years_column})")?;
    graph.add_transformation("lifetime", "annual", "({column} / {term_years_column})")?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_graph_is_valid() {
        let graph = bootstrap_graph().unwrap();
        let validation = graph.validate();
        assert!(validation.valid, "issues: {:?}", validation.issues);
        assert!(validation.warnings.is_empty(), "warnings: {:?}", validation.warnings);
    }

    #[test]
    fn test_bootstrap_covers_all_customers() {
        let graph = bootstrap_graph().unwrap();
        let customers: Vec<String> = graph.all_customers().into_iter().collect();
        assert_eq!(
            customers,
            vec![
                "customer_a",
                "customer_b",
                "customer_c",
                "customer_d",
                "customer_e",
                "customer_f"
            ]
        );
        // every customer maps every concept
        for concept in graph.all_concepts() {
            assert_eq!(concept.customer_mappings.len(), 6, "{}", concept.concept_id);
        }
    }

    #[test]
    fn test_bootstrap_aliases_resolve() {
        let graph = bootstrap_graph().unwrap();
        assert_eq!(
            graph.find_concept_by_alias("expiry").map(|c| c.concept_id.as_str()),
            Some("contract_expiration")
        );
        assert_eq!(
            graph.find_concept_by_alias("Total_Value").map(|c| c.concept_id.as_str()),
            Some("contract_value")
        );
        assert!(graph.find_concept_by_alias("nonexistent").is_none());
    }
}
