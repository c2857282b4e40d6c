use std::collections::BTreeMap;

/// Equality join predicate between a primary table and one joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRule {
    pub primary_column: String,
    pub join_column: String,
}

/// Static lookup of join predicates, keyed by (customer, primary table,
/// join table). There is no foreign-key discovery; a pair not present here
/// cannot be joined and compilation fails rather than emitting a cartesian
/// product.
#[derive(Debug, Clone, Default)]
pub struct JoinCatalog {
    rules: BTreeMap<(String, String, String), JoinRule>,
}

impl JoinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the known multi-table customer layouts.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        // customer_b splits contracts across a header table plus two
        // satellite tables keyed by contract_id.
        catalog.register(
            "customer_b",
            "contract_headers",
            "renewal_schedule",
            "id",
            "contract_id",
        );
        catalog.register(
            "customer_b",
            "contract_headers",
            "contract_status_history",
            "id",
            "contract_id",
        );
        catalog.register(
            "customer_b",
            "renewal_schedule",
            "contract_headers",
            "contract_id",
            "id",
        );
        catalog.register(
            "customer_b",
            "contract_status_history",
            "contract_headers",
            "contract_id",
            "id",
        );
        catalog
    }

    pub fn register(
        &mut self,
        customer_id: &str,
        primary_table: &str,
        join_table: &str,
        primary_column: &str,
        join_column: &str,
    ) {
        self.rules.insert(
            (
                customer_id.to_string(),
                primary_table.to_string(),
                join_table.to_string(),
            ),
            JoinRule {
                primary_column: primary_column.to_string(),
                join_column: join_column.to_string(),
            },
        );
    }

    pub fn get(
        &self,
        customer_id: &str,
        primary_table: &str,
        join_table: &str,
    ) -> Option<&JoinRule> {
        self.rules.get(&(
            customer_id.to_string(),
            primary_table.to_string(),
            join_table.to_string(),
        ))
    }
}
