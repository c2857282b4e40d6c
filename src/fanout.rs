//! Concurrent fan-out: compile once per customer, execute across all of
//! them, harmonize what comes back.
//!
//! One customer failing to compile or execute never aborts the fan-out;
//! the failure is recorded against that customer and the rest proceed.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::compiler::QueryCompiler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::BackendAdapter;
use crate::graph::KnowledgeGraph;
use crate::harmonizer::ResultHarmonizer;
use crate::models::{HarmonizedResult, QueryPlan, QueryResult};
use crate::validation::SqlValidator;

pub struct FanoutScheduler {
    compiler: QueryCompiler,
    executor: Arc<dyn BackendAdapter>,
    harmonizer: ResultHarmonizer,
    default_limit: u64,
    max_parallelism: usize,
}

impl FanoutScheduler {
    pub fn new(
        graph: Arc<KnowledgeGraph>,
        executor: Arc<dyn BackendAdapter>,
        config: &Config,
    ) -> Self {
        Self {
            compiler: QueryCompiler::new(graph.clone()),
            executor,
            harmonizer: ResultHarmonizer::new(graph),
            default_limit: config.query.default_limit,
            max_parallelism: config.query.max_parallelism.max(1),
        }
    }

    /// Run one plan across a set of customers and harmonize the results.
    ///
    /// The customer list comes from the explicit argument, falling back to
    /// the plan's own targets, and finally to every customer the executor
    /// knows about. Result ordering follows the input customer order
    /// regardless of completion order.
    pub async fn execute_across_customers(
        &self,
        plan: &QueryPlan,
        customer_ids: Option<&[String]>,
        parallel: bool,
    ) -> Result<HarmonizedResult> {
        let customers: Vec<String> = match customer_ids {
            Some(ids) => ids.to_vec(),
            None => match &plan.target_customers {
                Some(targets) => targets.clone(),
                // no explicit list anywhere: query every known backend
                None => self.executor.list_customers().await?,
            },
        };
        if customers.is_empty() {
            return Err(Error::Compile("no target customers for fan-out".to_string()));
        }

        let started = Instant::now();
        let results = if parallel {
            self.run_parallel(plan, &customers).await
        } else {
            self.run_sequential(plan, &customers).await
        };

        let mut harmonized = self.harmonizer.harmonize(plan, results);
        harmonized.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            customers = harmonized.customers_queried.len(),
            succeeded = harmonized.customers_succeeded.len(),
            failed = harmonized.customers_failed.len(),
            rows = harmonized.total_count,
            elapsed_ms = harmonized.execution_time_ms,
            "fan-out complete"
        );
        Ok(harmonized)
    }

    /// Convenience wrapper with targets from the plan and parallelism on.
    pub async fn execute(&self, plan: &QueryPlan) -> Result<HarmonizedResult> {
        self.execute_across_customers(plan, None, true).await
    }

    async fn run_sequential(&self, plan: &QueryPlan, customers: &[String]) -> Vec<QueryResult> {
        let mut results = Vec::with_capacity(customers.len());
        for customer_id in customers {
            results.push(
                run_one(
                    &self.compiler,
                    self.executor.clone(),
                    plan,
                    customer_id,
                    self.default_limit,
                )
                .await,
            );
        }
        results
    }

    async fn run_parallel(&self, plan: &QueryPlan, customers: &[String]) -> Vec<QueryResult> {
        let permits = Arc::new(Semaphore::new(self.max_parallelism.min(customers.len())));
        let mut handles = Vec::with_capacity(customers.len());

        for customer_id in customers {
            let compiler = self.compiler.clone();
            let executor = self.executor.clone();
            let permits = permits.clone();
            let plan = plan.clone();
            let customer_id = customer_id.clone();
            let default_limit = self.default_limit;

            handles.push(tokio::spawn(async move {
                // Holding a permit for the whole compile+execute bounds the
                // number of concurrently open customer databases.
                let _permit = permits.acquire().await;
                run_one(&compiler, executor, &plan, &customer_id, default_limit).await
            }));
        }

        let joined = futures::future::join_all(handles).await;
        joined
            .into_iter()
            .zip(customers)
            .map(|(outcome, customer_id)| match outcome {
                Ok(result) => result,
                Err(e) => {
                    warn!(customer_id, error = %e, "fan-out task panicked");
                    QueryResult::failed(customer_id, "", format!("task failed: {}", e))
                }
            })
            .collect()
    }
}

/// Compile, validate, and execute for one customer. Every failure mode
/// lands in the QueryResult's error field.
async fn run_one(
    compiler: &QueryCompiler,
    executor: Arc<dyn BackendAdapter>,
    plan: &QueryPlan,
    customer_id: &str,
    default_limit: u64,
) -> QueryResult {
    let sql = match compiler.compile_for_customer(plan, customer_id) {
        Ok(sql) => sql,
        Err(e) => return QueryResult::failed(customer_id, "", e.to_string()),
    };

    let prepared = match SqlValidator::validate_and_prepare(&sql, default_limit) {
        Ok((prepared, _limit_applied)) => prepared,
        Err(e) => return QueryResult::failed(customer_id, sql, e.to_string()),
    };

    match executor.execute_query(customer_id, &prepared).await {
        Ok(result) => result,
        Err(e) => QueryResult::failed(customer_id, prepared, e.to_string()),
    }
}
