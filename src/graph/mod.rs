//! Knowledge graph of semantic concepts and their per-customer mappings.
//!
//! Plain map lookups, no graph traversal: concepts are keyed by id, each
//! concept carries its customer mappings, and transformation rules bridge
//! semantic types. Mutations happen at startup; query execution only reads.

pub mod bootstrap;

pub use bootstrap::bootstrap_graph;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{ConceptMapping, MappingAnalysis, SemanticConcept};

/// Concepts every customer is expected to map. A customer missing any of
/// these fails `validate()`.
pub const CORE_CONCEPTS: &[&str] = &[
    "contract_identifier",
    "contract_expiration",
    "contract_value",
];

/// Placeholders allowed inside transformation templates. Anything else in
/// braces is rejected so a graph document can't smuggle arbitrary SQL
/// fragments through substitution.
const ALLOWED_PLACEHOLDERS: &[&str] = &["column", "term_years_column"];

/// Confidence below which an applied analyzer proposal is logged for review.
const ANALYSIS_CONFIDENCE_FLOOR: f64 = 0.7;

/// Persisted representation: all concepts with their nested mappings plus
/// the transformation table. Round-trips exactly through save/load.
#[derive(Debug, Serialize, Deserialize)]
struct GraphDocument {
    concepts: BTreeMap<String, SemanticConcept>,
    transformations: BTreeMap<String, BTreeMap<String, String>>,
}

/// Outcome of `validate()`. Issues are fatal, warnings are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub concepts_count: usize,
    pub customers_count: usize,
    pub transformations_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_concepts: usize,
    pub total_customers: usize,
    pub total_mappings: usize,
    pub total_transformations: usize,
}

#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    concepts: BTreeMap<String, SemanticConcept>,
    transformations: BTreeMap<String, BTreeMap<String, String>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a semantic concept. Fails if the id already exists or if the id,
    /// name, or any alias collides case-insensitively with an existing
    /// concept's id, name, or aliases.
    pub fn add_concept(
        &mut self,
        concept_id: &str,
        concept_name: &str,
        description: &str,
        aliases: Vec<String>,
    ) -> Result<()> {
        if self.concepts.contains_key(concept_id) {
            return Err(Error::DuplicateConcept(concept_id.to_string()));
        }

        let mut candidates = vec![concept_id.to_string(), concept_name.to_string()];
        candidates.extend(aliases.iter().cloned());
        for candidate in &candidates {
            if let Some(existing) = self.find_concept_by_alias(candidate) {
                return Err(Error::AliasCollision {
                    alias: candidate.clone(),
                    existing: existing.concept_id.clone(),
                });
            }
        }

        self.concepts.insert(
            concept_id.to_string(),
            SemanticConcept {
                concept_id: concept_id.to_string(),
                concept_name: concept_name.to_string(),
                description: description.to_string(),
                aliases,
                customer_mappings: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Add a customer-specific mapping for an existing concept. The
    /// transformation template, if any, is validated before the mapping is
    /// stored.
    pub fn add_mapping(&mut self, concept_id: &str, mapping: ConceptMapping) -> Result<()> {
        if let Some(template) = &mapping.transformation {
            validate_template(template)?;
        }
        let concept = self
            .concepts
            .get_mut(concept_id)
            .ok_or_else(|| Error::UnknownConcept(concept_id.to_string()))?;
        concept
            .customer_mappings
            .insert(mapping.customer_id.clone(), mapping);
        Ok(())
    }

    /// Apply a mapping proposal from the external schema analyzer.
    pub fn apply_analysis(&mut self, analysis: MappingAnalysis) -> Result<()> {
        if analysis.confidence < ANALYSIS_CONFIDENCE_FLOOR {
            warn!(
                concept = %analysis.concept_id,
                customer = %analysis.mapping.customer_id,
                confidence = analysis.confidence,
                reasoning = %analysis.reasoning,
                "applying low-confidence mapping proposal"
            );
        }
        self.add_mapping(&analysis.concept_id, analysis.mapping)
    }

    /// Register a transformation rule between two semantic types.
    pub fn add_transformation(
        &mut self,
        from_type: &str,
        to_type: &str,
        transformation_sql: &str,
    ) -> Result<()> {
        validate_template(transformation_sql)?;
        self.transformations
            .entry(from_type.to_string())
            .or_default()
            .insert(to_type.to_string(), transformation_sql.to_string());
        Ok(())
    }

    pub fn get_concept(&self, concept_id: &str) -> Option<&SemanticConcept> {
        self.concepts.get(concept_id)
    }

    pub fn get_mapping(&self, concept_id: &str, customer_id: &str) -> Option<&ConceptMapping> {
        self.concepts
            .get(concept_id)
            .and_then(|c| c.get_mapping(customer_id))
    }

    pub fn get_transformation(&self, from_type: &str, to_type: &str) -> Option<&str> {
        self.transformations
            .get(from_type)
            .and_then(|m| m.get(to_type))
            .map(|s| s.as_str())
    }

    /// Find a concept by its id, display name, or alias, case-insensitively.
    pub fn find_concept_by_alias(&self, text: &str) -> Option<&SemanticConcept> {
        self.concepts.values().find(|c| c.matches_alias(text))
    }

    pub fn all_concepts(&self) -> impl Iterator<Item = &SemanticConcept> {
        self.concepts.values()
    }

    pub fn customers_for_concept(&self, concept_id: &str) -> Vec<String> {
        self.concepts
            .get(concept_id)
            .map(|c| c.customer_mappings.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every customer id that appears in at least one mapping.
    pub fn all_customers(&self) -> BTreeSet<String> {
        self.concepts
            .values()
            .flat_map(|c| c.customer_mappings.keys().cloned())
            .collect()
    }

    /// Check graph completeness. A customer missing a core concept is an
    /// issue; a concept with no mappings at all is a warning.
    pub fn validate(&self) -> GraphValidation {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        for (concept_id, concept) in &self.concepts {
            if concept.customer_mappings.is_empty() {
                warnings.push(format!("Concept '{}' has no customer mappings", concept_id));
            }
        }

        let customers = self.all_customers();
        for customer_id in &customers {
            for core_concept in CORE_CONCEPTS {
                if let Some(concept) = self.concepts.get(*core_concept) {
                    if !concept.customer_mappings.contains_key(customer_id) {
                        issues.push(format!(
                            "Customer '{}' missing core concept '{}'",
                            customer_id, core_concept
                        ));
                    }
                }
            }
        }

        GraphValidation {
            valid: issues.is_empty(),
            issues,
            warnings,
            concepts_count: self.concepts.len(),
            customers_count: customers.len(),
            transformations_count: self.transformations.values().map(|m| m.len()).sum(),
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            total_concepts: self.concepts.len(),
            total_customers: self.all_customers().len(),
            total_mappings: self
                .concepts
                .values()
                .map(|c| c.customer_mappings.len())
                .sum(),
            total_transformations: self.transformations.values().map(|m| m.len()).sum(),
        }
    }

    /// Persist the graph as a single JSON document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let document = GraphDocument {
            concepts: self.concepts.clone(),
            transformations: self.transformations.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), concepts = self.concepts.len(), "saved knowledge graph");
        Ok(())
    }

    /// Replace the graph's contents from a persisted document. Templates in
    /// the document go through the same validation as runtime mutations.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "knowledge graph file not found: {}",
                path.display()
            )));
        }

        let json = std::fs::read_to_string(path)?;
        let document: GraphDocument = serde_json::from_str(&json)?;

        for concept in document.concepts.values() {
            for mapping in concept.customer_mappings.values() {
                if let Some(template) = &mapping.transformation {
                    validate_template(template)?;
                }
            }
        }
        for targets in document.transformations.values() {
            for template in targets.values() {
                validate_template(template)?;
            }
        }

        self.concepts = document.concepts;
        self.transformations = document.transformations;
        info!(path = %path.display(), concepts = self.concepts.len(), "loaded knowledge graph");
        Ok(())
    }
}

/// Reject any `{placeholder}` not on the allow-list, and unbalanced braces.
fn validate_template(template: &str) -> Result<()> {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::InvalidTemplate(format!("unbalanced braces in '{}'", template)))?;
        let placeholder = &after[..close];
        if !ALLOWED_PLACEHOLDERS.contains(&placeholder) {
            return Err(Error::InvalidTemplate(format!(
                "unknown placeholder '{{{}}}' in '{}'",
                placeholder, template
            )));
        }
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(Error::InvalidTemplate(format!(
            "unbalanced braces in '{}'",
            template
        )));
    }
    Ok(())
}
