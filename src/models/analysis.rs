use serde::{Deserialize, Serialize};

use super::concept::ConceptMapping;

/// A mapping proposal produced by the external schema-analyzer collaborator.
///
/// Confidence and reasoning travel with the mapping instead of being bolted
/// onto it after the fact; the graph decides what to do with low-confidence
/// proposals when the analysis is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingAnalysis {
    pub concept_id: String,
    pub mapping: ConceptMapping,
    /// 0.0..=1.0, how sure the analyzer is about this mapping.
    pub confidence: f64,
    pub reasoning: String,
}
