use thiserror::Error;

/// Crate-level error type.
///
/// Errors raised while mutating the knowledge graph or opening backend
/// storage are hard failures; anything that happens inside a single
/// customer's query pipeline is captured per customer by the fan-out
/// scheduler and never surfaces as an `Err` from the top-level call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("concept '{0}' already exists")]
    DuplicateConcept(String),

    #[error("alias '{alias}' collides with existing concept '{existing}'")]
    AliasCollision { alias: String, existing: String },

    #[error("concept '{0}' not found, add it with add_concept first")]
    UnknownConcept(String),

    #[error("no mapping for concept '{concept}' in {customer_id}")]
    UnmappedConcept { concept: String, customer_id: String },

    #[error("no join rule for {customer_id}: {primary_table} -> {join_table}")]
    MissingJoinRule {
        customer_id: String,
        primary_table: String,
        join_table: String,
    },

    #[error("invalid transformation template: {0}")]
    InvalidTemplate(String),

    #[error("query compilation failed: {0}")]
    Compile(String),

    #[error("invalid SQL: {0}")]
    InvalidSql(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
