//! This module provides a struct for representing reactions
use std::fmt::{Display, Formatter};

use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::metabolic_model::OMITTED_PROCESS;

/// A species taking part in a reaction, with its stoichiometric coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesReference {
    /// Id of the referenced metabolite
    pub species: String,
    /// Stoichiometric coefficient, always non-negative
    pub stoichiometry: f64,
}

impl SpeciesReference {
    pub fn new(species: &str, stoichiometry: f64) -> Self {
        SpeciesReference {
            species: species.to_string(),
            stoichiometry,
        }
    }
}

/// Side of a reaction a species appears on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Reactant,
    Product,
}

impl Side {
    /// Sign applied to element counts in the balance equations, +1 for reactants
    pub fn sign(self) -> f64 {
        match self {
            Side::Reactant => 1.,
            Side::Product => -1.,
        }
    }
}

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Used to identify the reaction
    #[builder(setter(into))]
    pub id: String,
    /// Human-readable reaction name
    #[builder(setter(into, strip_option), default = "None")]
    #[serde(default)]
    pub name: Option<String>,
    /// Species consumed by the reaction
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub reactants: Vec<SpeciesReference>,
    /// Species produced by the reaction
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub products: Vec<SpeciesReference>,
    /// Species that affect the reaction without being consumed
    #[builder(default = "Vec::new()")]
    #[serde(default)]
    pub modifiers: Vec<String>,
    /// Systems Biology Ontology term number
    #[builder(setter(strip_option), default = "None")]
    #[serde(default)]
    pub sbo_term: Option<u32>,
    /// Notes about the reaction
    #[builder(default = "IndexMap::new()")]
    #[serde(default)]
    pub notes: IndexMap<String, String>,
}

impl Reaction {
    /// References on one side of the reaction
    pub fn side(&self, side: Side) -> &[SpeciesReference] {
        match side {
            Side::Reactant => &self.reactants,
            Side::Product => &self.products,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut Vec<SpeciesReference> {
        match side {
            Side::Reactant => &mut self.reactants,
            Side::Product => &mut self.products,
        }
    }

    /// Every reactant then every product, tagged with its side
    pub fn participants(&self) -> impl Iterator<Item = (Side, &SpeciesReference)> {
        self.reactants
            .iter()
            .map(|r| (Side::Reactant, r))
            .chain(self.products.iter().map(|p| (Side::Product, p)))
    }

    /// Ids of the species appearing as reactant or product, without repeats
    pub fn species_ids(&self) -> IndexSet<String> {
        self.participants()
            .map(|(_, r)| r.species.clone())
            .collect()
    }

    /// Whether `species` is a reactant or product of this reaction
    pub fn references(&self, species: &str) -> bool {
        self.participants().any(|(_, r)| r.species == species)
    }

    /// Whether the reaction stands for an omitted biological process and should be skipped
    pub fn is_omitted_process(&self) -> bool {
        self.sbo_term == Some(OMITTED_PROCESS)
    }

    /// Whether the reactant and product species are the same set
    pub fn is_pointless(&self) -> bool {
        let reactants: IndexSet<&str> =
            self.reactants.iter().map(|r| r.species.as_str()).collect();
        let products: IndexSet<&str> = self.products.iter().map(|p| p.species.as_str()).collect();
        reactants == products
    }

    /// Add `stoichiometry` of `species` to `side`, summing with any existing reference
    pub fn add_to_side(&mut self, side: Side, species: &str, stoichiometry: f64) {
        let references = self.side_mut(side);
        match references.iter_mut().find(|r| r.species == species) {
            Some(reference) => reference.stoichiometry += stoichiometry,
            None => references.push(SpeciesReference::new(species, stoichiometry)),
        }
    }

    /// Drop every reference to `species` from both sides
    pub fn remove_species(&mut self, species: &str) {
        self.reactants.retain(|r| r.species != species);
        self.products.retain(|p| p.species != species);
    }
}

impl Display for Reaction {
    /// Equation form, e.g. `2 h2o_c + atp_c -> adp_c`
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn write_side(f: &mut Formatter<'_>, references: &[SpeciesReference]) -> std::fmt::Result {
            for (index, reference) in references.iter().enumerate() {
                if index > 0 {
                    write!(f, " + ")?;
                }
                if reference.stoichiometry == 1. {
                    write!(f, "{}", reference.species)?;
                } else {
                    write!(f, "{} {}", reference.stoichiometry, reference.species)?;
                }
            }
            Ok(())
        }
        write_side(f, &self.reactants)?;
        write!(f, " -> ")?;
        write_side(f, &self.products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atp_hydrolysis() -> Reaction {
        ReactionBuilder::default()
            .id("ATPH")
            .reactants(vec![
                SpeciesReference::new("atp_c", 1.),
                SpeciesReference::new("h2o_c", 1.),
            ])
            .products(vec![
                SpeciesReference::new("adp_c", 1.),
                SpeciesReference::new("pi_c", 1.),
                SpeciesReference::new("h_c", 1.),
            ])
            .build()
            .unwrap()
    }

    #[test]
    fn add_to_side_sums_existing() {
        let mut reaction = atp_hydrolysis();
        reaction.add_to_side(Side::Product, "h_c", 2.);
        reaction.add_to_side(Side::Reactant, "co2_c", 1.);
        assert_eq!(reaction.products[2].stoichiometry, 3.);
        assert_eq!(reaction.reactants.len(), 3);
        assert_eq!(reaction.reactants[2], SpeciesReference::new("co2_c", 1.));
    }

    #[test]
    fn remove_species_and_references() {
        let mut reaction = atp_hydrolysis();
        assert!(reaction.references("pi_c"));
        reaction.remove_species("pi_c");
        assert!(!reaction.references("pi_c"));
        assert_eq!(reaction.species_ids().len(), 4);
    }

    #[test]
    fn pointless_and_omitted() {
        let reaction = ReactionBuilder::default()
            .id("LOOP")
            .reactants(vec![SpeciesReference::new("a_c", 1.)])
            .products(vec![SpeciesReference::new("a_c", 2.)])
            .sbo_term(OMITTED_PROCESS)
            .build()
            .unwrap();
        assert!(reaction.is_pointless());
        assert!(reaction.is_omitted_process());
        assert!(!atp_hydrolysis().is_pointless());
    }

    #[test]
    fn display_equation() {
        let mut reaction = atp_hydrolysis();
        reaction.reactants[1].stoichiometry = 2.;
        assert_eq!(reaction.to_string(), "atp_c + 2 h2o_c -> adp_c + pi_c + h_c");
    }
}
