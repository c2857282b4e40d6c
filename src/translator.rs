//! Top-level facade tying the knowledge graph, compiler, executor, and
//! harmonizer together, with a query history for inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::compiler::QueryCompiler;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{BackendAdapter, ColumnInfo, SqliteExecutor};
use crate::fanout::FanoutScheduler;
use crate::graph::KnowledgeGraph;
use crate::models::{HarmonizedResult, QueryPlan};

/// Record of one executed fan-out, kept in memory per translator instance.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHistoryEntry {
    pub id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub plan: QueryPlan,
    pub row_count: usize,
    pub customers_queried: usize,
    pub success_rate: f64,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslatorStats {
    pub total_queries: usize,
    pub failed_queries: usize,
    pub total_rows: usize,
    pub avg_success_rate: f64,
    pub avg_execution_time_ms: f64,
}

/// Per-customer view: physical tables plus the concepts mapped onto them.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerInfo {
    pub customer_id: String,
    pub available: bool,
    pub tables: BTreeMap<String, Vec<ColumnInfo>>,
    pub row_counts: BTreeMap<String, u64>,
    pub mapped_concepts: Vec<String>,
}

pub struct SchemaTranslator {
    graph: Arc<KnowledgeGraph>,
    compiler: QueryCompiler,
    executor: Arc<SqliteExecutor>,
    fanout: FanoutScheduler,
    history: Mutex<Vec<QueryHistoryEntry>>,
}

impl SchemaTranslator {
    pub fn new(config: &Config, graph: KnowledgeGraph) -> Self {
        let graph = Arc::new(graph);
        let executor = Arc::new(SqliteExecutor::new(config));
        let adapter: Arc<dyn BackendAdapter> = executor.clone();
        Self {
            compiler: QueryCompiler::new(graph.clone()),
            fanout: FanoutScheduler::new(graph.clone(), adapter, config),
            graph,
            executor,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Load the graph from the configured path and build a translator on it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut graph = KnowledgeGraph::new();
        graph.load(&config.graph.path)?;
        Ok(Self::new(config, graph))
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Run a plan across customers and record the outcome in the history.
    ///
    /// The customer set resolves from the explicit argument, then the
    /// plan's targets, then every database file present on disk.
    pub async fn run(
        &self,
        plan: &QueryPlan,
        customer_ids: Option<&[String]>,
    ) -> Result<HarmonizedResult> {
        let resolved;
        let customers: &[String] = match customer_ids {
            Some(ids) => ids,
            None => match &plan.target_customers {
                Some(targets) => targets,
                None => {
                    resolved = self.executor.list_customers()?;
                    &resolved
                }
            },
        };

        let outcome = self
            .fanout
            .execute_across_customers(plan, Some(customers), true)
            .await;

        let entry = match &outcome {
            Ok(result) => QueryHistoryEntry {
                id: Uuid::new_v4(),
                executed_at: Utc::now(),
                plan: plan.clone(),
                row_count: result.total_count,
                customers_queried: result.customers_queried.len(),
                success_rate: result.success_rate(),
                execution_time_ms: result.execution_time_ms,
                error: None,
            },
            Err(e) => QueryHistoryEntry {
                id: Uuid::new_v4(),
                executed_at: Utc::now(),
                plan: plan.clone(),
                row_count: 0,
                customers_queried: customers.len(),
                success_rate: 0.0,
                execution_time_ms: 0.0,
                error: Some(e.to_string()),
            },
        };
        info!(
            query_id = %entry.id,
            rows = entry.row_count,
            success_rate = entry.success_rate,
            "query recorded"
        );
        self.history.lock().await.push(entry);

        outcome
    }

    /// Compile without executing: per-customer SQL, or the compile error
    /// message for customers the plan cannot reach.
    pub fn explain(&self, plan: &QueryPlan) -> Result<BTreeMap<String, String>> {
        let customers = match &plan.target_customers {
            Some(targets) => targets.clone(),
            None => self.executor.list_customers()?,
        };
        let mut compiled = BTreeMap::new();
        for customer_id in customers {
            let entry = match self.compiler.compile_for_customer(plan, &customer_id) {
                Ok(sql) => sql,
                Err(e) => format!("error: {}", e),
            };
            compiled.insert(customer_id, entry);
        }
        Ok(compiled)
    }

    pub async fn customer_info(&self, customer_id: &str) -> Result<CustomerInfo> {
        let available = self
            .executor
            .test_connection(customer_id)
            .await
            .unwrap_or(false);
        let tables = self.executor.table_info(customer_id).await?;
        let mut row_counts = BTreeMap::new();
        for table in tables.keys() {
            row_counts.insert(
                table.clone(),
                self.executor.count_rows(customer_id, table).await?,
            );
        }
        let mapped_concepts = self
            .graph
            .all_concepts()
            .filter(|c| c.get_mapping(customer_id).is_some())
            .map(|c| c.concept_id.clone())
            .collect();
        Ok(CustomerInfo {
            customer_id: customer_id.to_string(),
            available,
            tables,
            row_counts,
            mapped_concepts,
        })
    }

    /// Most recent history entries, newest first.
    pub async fn recent(&self, n: usize) -> Vec<QueryHistoryEntry> {
        let history = self.history.lock().await;
        history.iter().rev().take(n).cloned().collect()
    }

    /// History entries that errored or reached no customer.
    pub async fn failed(&self) -> Vec<QueryHistoryEntry> {
        let history = self.history.lock().await;
        history
            .iter()
            .filter(|e| e.error.is_some() || e.success_rate == 0.0)
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> TranslatorStats {
        let history = self.history.lock().await;
        let total = history.len();
        let failed = history
            .iter()
            .filter(|e| e.error.is_some() || e.success_rate == 0.0)
            .count();
        let total_rows = history.iter().map(|e| e.row_count).sum();
        let (avg_success, avg_time) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                history.iter().map(|e| e.success_rate).sum::<f64>() / total as f64,
                history.iter().map(|e| e.execution_time_ms).sum::<f64>() / total as f64,
            )
        };
        TranslatorStats {
            total_queries: total,
            failed_queries: failed,
            total_rows,
            avg_success_rate: avg_success,
            avg_execution_time_ms: avg_time,
        }
    }
}
