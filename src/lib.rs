pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod graph;
pub mod harmonizer;
pub mod models;
pub mod translator;
pub mod validation;

pub use compiler::QueryCompiler;
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{BackendAdapter, SqliteExecutor};
pub use fanout::FanoutScheduler;
pub use graph::KnowledgeGraph;
pub use harmonizer::ResultHarmonizer;
pub use models::*;
pub use translator::SchemaTranslator;
pub use validation::SqlValidator;
