//! Well known small molecules the balancer may add to either side of a reaction
use std::sync::Arc;

use crate::chemistry::formula::{Formula, FormulaError};
use crate::metabolic_model::metabolite::Metabolite;

/// ChEBI id of the proton
pub const PROTON: &str = "CHEBI:24636";
/// ChEBI id of the hydron, treated as a synonym of [`PROTON`]
pub const HYDRON: &str = "CHEBI:15378";
/// ChEBI id of water
pub const WATER: &str = "CHEBI:15377";

/// A molecule that can be freely added to a reaction to balance it
#[derive(Debug, Clone, PartialEq)]
pub struct Cofactor {
    /// Name given to species created for this cofactor
    pub name: String,
    /// Parsed formula
    pub formula: Formula,
    /// Net charge
    pub charge: i32,
    /// Ontology ids identifying the cofactor, the first one is attached to created species
    pub ontology_ids: Vec<String>,
}

impl Cofactor {
    /// Create a cofactor from a formula string
    pub fn new(
        name: &str,
        formula: &str,
        charge: i32,
        ontology_ids: &[&str],
    ) -> Result<Cofactor, FormulaError> {
        Ok(Cofactor {
            name: name.to_string(),
            formula: Formula::parse(formula)?,
            charge,
            ontology_ids: ontology_ids.iter().map(|id| id.to_string()).collect(),
        })
    }

    pub fn proton() -> Cofactor {
        Cofactor {
            name: "proton".to_string(),
            formula: Formula::parse("H").unwrap_or_default(),
            charge: 1,
            ontology_ids: vec![PROTON.to_string(), HYDRON.to_string()],
        }
    }

    pub fn water() -> Cofactor {
        Cofactor {
            name: "water".to_string(),
            formula: Formula::parse("H2O").unwrap_or_default(),
            charge: 0,
            ontology_ids: vec![WATER.to_string()],
        }
    }

    /// Ontology id attached to species created for this cofactor
    pub fn primary_id(&self) -> Option<&str> {
        self.ontology_ids.first().map(String::as_str)
    }

    /// Whether this is the proton, under either of its ids
    pub fn is_proton(&self) -> bool {
        self.ontology_ids
            .iter()
            .any(|id| id == PROTON || id == HYDRON)
    }

    /// Whether `metabolite` is annotated with any of this cofactor's ontology ids
    pub fn matches(&self, metabolite: &Metabolite) -> bool {
        metabolite
            .ontology_terms
            .iter()
            .any(|term| self.ontology_ids.contains(term))
    }
}

/// Ordered collection of cofactors available to the balancer
#[derive(Debug, Clone)]
pub struct CofactorSet {
    cofactors: Vec<Arc<Cofactor>>,
}

impl CofactorSet {
    pub fn new(cofactors: Vec<Cofactor>) -> Self {
        CofactorSet {
            cofactors: cofactors.into_iter().map(Arc::new).collect(),
        }
    }

    /// A fresh list of every cofactor, consumed as cofactors are matched to a reaction side
    pub fn candidates(&self) -> Vec<Arc<Cofactor>> {
        self.cofactors.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Cofactor>> {
        self.cofactors.iter()
    }

    pub fn len(&self) -> usize {
        self.cofactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cofactors.is_empty()
    }
}

impl Default for CofactorSet {
    /// Proton and water
    fn default() -> Self {
        CofactorSet::new(vec![Cofactor::proton(), Cofactor::water()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;

    #[test]
    fn default_set_is_proton_and_water() {
        let set = CofactorSet::default();
        assert_eq!(set.len(), 2);
        let candidates = set.candidates();
        assert!(candidates[0].is_proton());
        assert_eq!(candidates[0].formula.get("H"), 1);
        assert_eq!(candidates[0].charge, 1);
        assert!(!candidates[1].is_proton());
        assert_eq!(candidates[1].formula.get("O"), 1);
    }

    #[test]
    fn hydron_matches_proton() {
        let hydron = MetaboliteBuilder::default()
            .id("h_c".to_string())
            .ontology_terms(vec![HYDRON.to_string()])
            .build()
            .unwrap();
        assert!(Cofactor::proton().matches(&hydron));
        assert!(!Cofactor::water().matches(&hydron));
    }

    #[test]
    fn custom_cofactor_rejects_bad_formula() {
        assert!(Cofactor::new("carbon dioxide", "CO2", 0, &["CHEBI:16526"]).is_ok());
        assert!(Cofactor::new("broken", "C(O2", 0, &[]).is_err());
    }
}
