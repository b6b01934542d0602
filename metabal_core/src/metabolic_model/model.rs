//! This module provides the Model struct for representing an entire metabolic model
use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Id associated with the Model
    #[serde(default)]
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    #[serde(default)]
    pub compartments: Option<IndexMap<String, String>>,
    /// Map of metabolite ids to Metabolites
    #[serde(default)]
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to Reactions
    #[serde(default)]
    pub reactions: IndexMap<String, Reaction>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model::default()
    }

    /// Read a model from its JSON representation
    pub fn from_json_str(json: &str) -> Result<Model, ModelError> {
        let model: Model = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Write the model as pretty printed JSON
    pub fn to_json_string(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every reaction references only known metabolites
    pub fn validate(&self) -> Result<(), ModelError> {
        for reaction in self.reactions.values() {
            for (_, reference) in reaction.participants() {
                if !self.metabolites.contains_key(&reference.species) {
                    return Err(ModelError::UnknownMetabolite {
                        reaction: reaction.id.clone(),
                        metabolite: reference.species.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Add a reaction to the model
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::metabolic_model::model::Model;
    /// use metabal_core::metabolic_model::reaction::ReactionBuilder;
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction").build().unwrap();
    /// model.add_reaction(new_reaction);
    /// assert!(model.get_reaction("new_reaction").is_some());
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a metabolite to the model
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::metabolic_model::metabolite::MetaboliteBuilder;
    /// use metabal_core::metabolic_model::model::Model;
    /// let mut model = Model::new_empty();
    /// let new_metabolite = MetaboliteBuilder::default().id("new_metabolite").build().unwrap();
    /// model.add_metabolite(new_metabolite);
    /// ```
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    pub fn get_metabolite(&self, id: &str) -> Option<&Metabolite> {
        self.metabolites.get(id)
    }

    pub fn get_metabolite_mut(&mut self, id: &str) -> Option<&mut Metabolite> {
        self.metabolites.get_mut(id)
    }

    pub fn get_reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.get(id)
    }

    pub fn get_reaction_mut(&mut self, id: &str) -> Option<&mut Reaction> {
        self.reactions.get_mut(id)
    }

    // region Topology
    /// Number of reactions each metabolite appears in as a reactant or product
    ///
    /// Every metabolite of the model has an entry, metabolites in no reaction map to 0.
    pub fn metabolite_degree(&self) -> IndexMap<String, usize> {
        let mut degree: IndexMap<String, usize> =
            self.metabolites.keys().map(|id| (id.clone(), 0)).collect();
        for reaction in self.reactions.values() {
            for species in reaction.species_ids() {
                *degree.entry(species).or_insert(0) += 1;
            }
        }
        degree
    }

    /// Whether the reaction's participants span more than one compartment
    pub fn is_transport(&self, reaction: &Reaction) -> bool {
        let compartments: IndexSet<Option<&str>> = reaction
            .participants()
            .filter_map(|(_, r)| self.metabolites.get(&r.species))
            .map(|m| m.compartment.as_deref())
            .collect();
        compartments.len() > 1
    }

    /// Metabolites referenced by no reaction as reactant, product or modifier
    pub fn orphan_metabolites(&self) -> Vec<String> {
        let mut referenced: IndexSet<&str> = IndexSet::new();
        for reaction in self.reactions.values() {
            referenced.extend(reaction.participants().map(|(_, r)| r.species.as_str()));
            referenced.extend(reaction.modifiers.iter().map(String::as_str));
        }
        self.metabolites
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Reactions whose reactant and product species are identical
    pub fn pointless_reactions(&self) -> Vec<String> {
        self.reactions
            .values()
            .filter(|r| r.is_pointless())
            .map(|r| r.id.clone())
            .collect()
    }
    // endregion Topology

    // region Removal
    /// Remove reactions by id, returning the ids that were present
    pub fn remove_reactions(&mut self, ids: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for id in ids {
            if self.reactions.shift_remove(id).is_some() {
                debug!("Removed reaction {}", id);
                removed.push(id.clone());
            }
        }
        removed
    }

    /// Remove metabolites by id
    ///
    /// # Parameters
    /// - `ids`: metabolites to remove
    /// - `delete_reactions`: if true every reaction referencing a removed metabolite is
    ///     removed as well, otherwise only the references to it are dropped
    ///
    /// # Returns
    /// The removed metabolite and reaction ids
    pub fn remove_metabolites(
        &mut self,
        ids: &[String],
        delete_reactions: bool,
    ) -> (Vec<String>, Vec<String>) {
        let targets: IndexSet<&str> = ids.iter().map(String::as_str).collect();
        let mut removed_reactions = Vec::new();
        if delete_reactions {
            let doomed: Vec<String> = self
                .reactions
                .values()
                .filter(|r| r.participants().any(|(_, s)| targets.contains(s.species.as_str())))
                .map(|r| r.id.clone())
                .collect();
            removed_reactions = self.remove_reactions(&doomed);
        } else {
            for reaction in self.reactions.values_mut() {
                for id in &targets {
                    reaction.remove_species(id);
                }
            }
        }
        for reaction in self.reactions.values_mut() {
            reaction.modifiers.retain(|m| !targets.contains(m.as_str()));
        }
        let mut removed_metabolites = Vec::new();
        for id in ids {
            if self.metabolites.shift_remove(id).is_some() {
                debug!("Removed metabolite {}", id);
                removed_metabolites.push(id.clone());
            }
        }
        (removed_metabolites, removed_reactions)
    }

    /// Remove every metabolite no reaction refers to
    pub fn remove_orphan_metabolites(&mut self) -> Vec<String> {
        let orphans = self.orphan_metabolites();
        self.remove_metabolites(&orphans, false).0
    }

    /// Remove every reaction whose reactant and product species are identical
    pub fn remove_pointless_reactions(&mut self) -> Vec<String> {
        let pointless = self.pointless_reactions();
        self.remove_reactions(&pointless)
    }
    // endregion Removal
}

/// Errors associated with the Model
#[derive(Error, Debug)]
pub enum ModelError {
    /// The JSON representation could not be read or written
    #[error("Failed to (de)serialize model: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A reaction refers to a metabolite that isn't in the model
    #[error("Reaction {reaction} references unknown metabolite {metabolite}")]
    UnknownMetabolite { reaction: String, metabolite: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::{ReactionBuilder, SpeciesReference};

    fn metabolite(id: &str, compartment: &str) -> Metabolite {
        MetaboliteBuilder::default()
            .id(id)
            .compartment(compartment)
            .build()
            .unwrap()
    }

    fn reaction(id: &str, reactants: &[&str], products: &[&str]) -> Reaction {
        ReactionBuilder::default()
            .id(id)
            .reactants(reactants.iter().map(|s| SpeciesReference::new(s, 1.)).collect())
            .products(products.iter().map(|s| SpeciesReference::new(s, 1.)).collect())
            .build()
            .unwrap()
    }

    fn small_model() -> Model {
        let mut model = Model::new_empty();
        model.add_metabolite(metabolite("a_c", "c"));
        model.add_metabolite(metabolite("b_c", "c"));
        model.add_metabolite(metabolite("a_e", "e"));
        model.add_metabolite(metabolite("x_c", "c"));
        model.add_reaction(reaction("R1", &["a_c"], &["b_c"]));
        model.add_reaction(reaction("T1", &["a_e"], &["a_c"]));
        model
    }

    #[test]
    fn degree_counts_reactions() {
        let degree = small_model().metabolite_degree();
        assert_eq!(degree["a_c"], 2);
        assert_eq!(degree["b_c"], 1);
        assert_eq!(degree["x_c"], 0);
    }

    #[test]
    fn transport_detection() {
        let model = small_model();
        assert!(model.is_transport(model.get_reaction("T1").unwrap()));
        assert!(!model.is_transport(model.get_reaction("R1").unwrap()));
    }

    #[test]
    fn remove_metabolites_with_reactions() {
        let mut model = small_model();
        let (metabolites, reactions) = model.remove_metabolites(&["a_e".to_string()], true);
        assert_eq!(metabolites, vec!["a_e".to_string()]);
        assert_eq!(reactions, vec!["T1".to_string()]);
        assert!(model.get_reaction("R1").is_some());
    }

    #[test]
    fn remove_metabolites_keeps_reactions() {
        let mut model = small_model();
        let (_, reactions) = model.remove_metabolites(&["a_e".to_string()], false);
        assert!(reactions.is_empty());
        assert!(!model.get_reaction("T1").unwrap().references("a_e"));
    }

    #[test]
    fn orphans_and_pointless() {
        let mut model = small_model();
        model.add_reaction(reaction("P1", &["b_c"], &["b_c"]));
        assert_eq!(model.remove_pointless_reactions(), vec!["P1".to_string()]);
        assert_eq!(model.remove_orphan_metabolites(), vec!["x_c".to_string()]);
        assert_eq!(model.metabolites.len(), 3);
    }

    #[test]
    fn json_round_trip_validates() {
        let model = small_model();
        let json = model.to_json_string().unwrap();
        assert_eq!(Model::from_json_str(&json).unwrap(), model);
        let broken = r#"{"reactions": {"R": {"id": "R", "reactants": [{"species": "z", "stoichiometry": 1.0}]}}}"#;
        match Model::from_json_str(broken) {
            Err(ModelError::UnknownMetabolite { metabolite, .. }) => assert_eq!(metabolite, "z"),
            _ => panic!("Expected an unknown metabolite error"),
        }
    }
}
