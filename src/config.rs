use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub graph: GraphConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory containing the per-customer SQLite databases.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    /// Path of the persisted knowledge graph document.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// LIMIT appended to compiled statements that carry none.
    pub default_limit: u64,
    /// Upper bound on concurrent backend queries during fan-out.
    pub max_parallelism: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("database.dir", "./databases")?
            .set_default("graph.path", "./knowledge_graph.json")?
            .set_default("query.default_limit", 1000i64)?
            .set_default("query.max_parallelism", 10i64)?
            .set_default("logging.level", "info")?;

        // Load from environment variables
        if let Ok(dir) = env::var("DATABASE_DIR") {
            builder = builder.set_override("database.dir", dir)?;
        }

        if let Ok(path) = env::var("KNOWLEDGE_GRAPH_PATH") {
            builder = builder.set_override("graph.path", path)?;
        }

        if let Ok(limit) = env::var("QUERY_DEFAULT_LIMIT") {
            builder = builder.set_override(
                "query.default_limit",
                limit.parse::<i64>().unwrap_or(1000),
            )?;
        }

        if let Ok(parallelism) = env::var("QUERY_MAX_PARALLELISM") {
            builder = builder.set_override(
                "query.max_parallelism",
                parallelism.parse::<i64>().unwrap_or(10),
            )?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        // Try to load from .env file
        let _ = dotenv::dotenv();

        builder.build()?.try_deserialize()
    }

    /// Build a config rooted at an explicit database directory and graph path.
    /// Used by tests and embedders that manage their own layout.
    pub fn with_paths<P: Into<PathBuf>, Q: Into<PathBuf>>(database_dir: P, graph_path: Q) -> Self {
        Self {
            database: DatabaseConfig {
                dir: database_dir.into(),
            },
            graph: GraphConfig {
                path: graph_path.into(),
            },
            query: QueryConfig {
                default_limit: 1000,
                max_parallelism: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Resolve a customer identifier to its SQLite database path.
    /// Accepts both bare ids ("a") and full ids ("customer_a").
    pub fn database_path(&self, customer_id: &str) -> PathBuf {
        let customer_id = customer_id.to_lowercase();
        let file_name = if customer_id.starts_with("customer_") {
            format!("{}.db", customer_id)
        } else {
            format!("customer_{}.db", customer_id)
        };
        self.database.dir.join(file_name)
    }

    pub fn database_dir(&self) -> &Path {
        &self.database.dir
    }
}
