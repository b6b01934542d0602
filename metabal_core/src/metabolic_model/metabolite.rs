//! This module provides the metabolite struct representing a species in a model

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::metabolic_model::SIMPLE_CHEMICAL;

/// Note key recording the formula a species had before it was made specific
pub const NON_SPECIFIC_FORMULA: &str = "NON_SPECIFIC_FORMULA";

/// Represents a metabolite
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    #[builder(setter(into))]
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite, treated as 0 when balancing if unknown
    #[builder(setter(strip_option), default = "None")]
    #[serde(default)]
    pub charge: Option<i32>,
    /// Chemical Formula of the metabolite
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub formula: Option<String>,
    /// Notes about the metabolite, keyed by note name
    #[builder(default = "IndexMap::new()")]
    #[serde(default)]
    pub notes: IndexMap<String, String>,
    /// Ontology ids such as `CHEBI:15377`
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub ontology_terms: Vec<String>,
    /// Systems Biology Ontology term number, e.g. 247 for a simple chemical
    #[builder(setter(strip_option), default = "None")]
    #[serde(default)]
    pub sbo_term: Option<u32>,
}

impl Metabolite {
    /// Charge used for balancing
    pub fn charge_or_default(&self) -> i32 {
        self.charge.unwrap_or(0)
    }

    /// Whether the metabolite is a simple chemical, species without an SBO term count as one
    pub fn is_simple_chemical(&self) -> bool {
        match self.sbo_term {
            None => true,
            Some(term) => term == SIMPLE_CHEMICAL,
        }
    }

    pub fn has_ontology_term(&self, term: &str) -> bool {
        self.ontology_terms.iter().any(|t| t == term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let metabolite = MetaboliteBuilder::default().id("glc__D_c").build().unwrap();
        assert_eq!(metabolite.charge_or_default(), 0);
        assert!(metabolite.formula.is_none());
        assert!(metabolite.is_simple_chemical());
        assert!(metabolite.notes.is_empty());
    }

    #[test]
    fn sbo_term_controls_simple_chemical() {
        let protein = MetaboliteBuilder::default()
            .id("enzyme_c")
            .sbo_term(252)
            .build()
            .unwrap();
        assert!(!protein.is_simple_chemical());
        let water = MetaboliteBuilder::default()
            .id("h2o_c")
            .sbo_term(SIMPLE_CHEMICAL)
            .ontology_terms(vec!["CHEBI:15377".to_string()])
            .build()
            .unwrap();
        assert!(water.is_simple_chemical());
        assert!(water.has_ontology_term("CHEBI:15377"));
    }
}
