//! Initialize and persist the bootstrap knowledge graph.
//!
//! Validates the built-in concept graph, prints its statistics, and writes
//! the JSON document to the configured path.

use tracing::{error, info, warn};

use schema_fanout::config::Config;
use schema_fanout::graph::{bootstrap_graph, KnowledgeGraph};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("failed to load configuration: {}", e);
        e
    })?;

    let graph = bootstrap_graph()?;

    let validation = graph.validate();
    for warning in &validation.warnings {
        warn!("graph warning: {}", warning);
    }
    if !validation.valid {
        for issue in &validation.issues {
            error!("graph issue: {}", issue);
        }
        return Err("bootstrap graph failed validation".into());
    }

    let stats = graph.stats();
    info!(
        concepts = stats.total_concepts,
        customers = stats.total_customers,
        mappings = stats.total_mappings,
        transformations = stats.total_transformations,
        "knowledge graph validated"
    );

    if let Some(parent) = config.graph.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    graph.save(&config.graph.path)?;

    // reload to prove the document round-trips
    let mut reloaded = KnowledgeGraph::new();
    reloaded.load(&config.graph.path)?;
    info!(path = %config.graph.path.display(), "knowledge graph saved and verified");

    Ok(())
}
