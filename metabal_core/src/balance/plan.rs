//! Changes to a model computed from a balancing solution, applied in one step
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};

use crate::balance::error::BalanceError;
use crate::chemistry::cofactor::Cofactor;
use crate::chemistry::formula::Formula;
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, Side};
use crate::metabolic_model::SIMPLE_CHEMICAL;
use crate::utils::hashing::generated_species_id;

/// A cofactor to add to one side of the reaction
#[derive(Debug, Clone, PartialEq)]
pub struct CofactorAddition {
    pub cofactor: Arc<Cofactor>,
    pub side: Side,
    pub stoichiometry: f64,
}

/// Every change balancing makes to a model
///
/// A plan is computed from a read-only model and validated completely before
/// [`BalancePlan::apply`] touches the model, so a reaction is never left half balanced.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancePlan {
    pub reaction_id: String,
    /// New stoichiometry of existing references, by side and position; zero marks removal
    pub stoichiometries: Vec<(Side, usize, f64)>,
    pub cofactor_additions: Vec<CofactorAddition>,
    /// Formulas to store on species, in order of first change
    pub formula_updates: IndexMap<String, Formula>,
}

impl BalancePlan {
    pub fn new(reaction_id: &str) -> Self {
        BalancePlan {
            reaction_id: reaction_id.to_string(),
            stoichiometries: Vec::new(),
            cofactor_additions: Vec::new(),
            formula_updates: IndexMap::new(),
        }
    }

    /// Apply the plan to `model`
    ///
    /// References solved to zero are removed after every other change, cofactors are
    /// resolved to an existing species where possible and created otherwise.
    ///
    /// # Returns
    /// Ids of species created for cofactors
    pub fn apply(&self, model: &mut Model) -> Result<Vec<String>, BalanceError> {
        let reaction = model
            .get_reaction(&self.reaction_id)
            .ok_or_else(|| BalanceError::UnknownReaction(self.reaction_id.clone()))?;
        for (side, index, _) in &self.stoichiometries {
            if *index >= reaction.side(*side).len() {
                return Err(BalanceError::UnknownSpecies(format!(
                    "{:?} {} of {}",
                    side, index, self.reaction_id
                )));
            }
        }
        for species_id in self.formula_updates.keys() {
            if model.get_metabolite(species_id).is_none() {
                return Err(BalanceError::UnknownSpecies(species_id.clone()));
            }
        }

        for (species_id, formula) in &self.formula_updates {
            if let Some(metabolite) = model.get_metabolite_mut(species_id) {
                debug!("Updating formula of {} to {}", species_id, formula);
                metabolite.formula = Some(formula.to_string());
            }
        }

        // Compartments are taken from the reaction before anything is removed
        let mut resolved = Vec::with_capacity(self.cofactor_additions.len());
        let mut created = Vec::new();
        for addition in &self.cofactor_additions {
            let compartment = match model.get_reaction(&self.reaction_id) {
                Some(reaction) => cofactor_compartment(model, reaction, addition.side),
                None => None,
            };
            let species_id = match find_cofactor_species(model, &addition.cofactor, &compartment)
            {
                Some(id) => id,
                None => {
                    let metabolite = create_cofactor_species(model, &addition.cofactor, &compartment);
                    let id = metabolite.id.clone();
                    info!(
                        "Created species {} for cofactor {}",
                        id, addition.cofactor.name
                    );
                    model.add_metabolite(metabolite);
                    created.push(id.clone());
                    id
                }
            };
            resolved.push(species_id);
        }

        let reaction = model
            .get_reaction_mut(&self.reaction_id)
            .ok_or_else(|| BalanceError::UnknownReaction(self.reaction_id.clone()))?;
        for (side, index, stoichiometry) in &self.stoichiometries {
            reaction.side_mut(*side)[*index].stoichiometry = *stoichiometry;
        }
        for (addition, species_id) in self.cofactor_additions.iter().zip(&resolved) {
            reaction.add_to_side(addition.side, species_id, addition.stoichiometry.abs());
        }
        reaction.reactants.retain(|r| r.stoichiometry != 0.);
        reaction.products.retain(|p| p.stoichiometry != 0.);
        Ok(created)
    }
}

/// Compartment of the first reactant for reactant side additions, otherwise of the first
/// product, falling back to whichever side has a reference
fn cofactor_compartment(model: &Model, reaction: &Reaction, side: Side) -> Option<String> {
    let first = match side {
        Side::Reactant => reaction.reactants.first().or(reaction.products.first()),
        Side::Product => reaction.products.first().or(reaction.reactants.first()),
    }?;
    model
        .get_metabolite(&first.species)
        .and_then(|m| m.compartment.clone())
}

/// First simple chemical in `compartment` annotated as the cofactor, or with the same
/// formula and charge
fn find_cofactor_species(
    model: &Model,
    cofactor: &Cofactor,
    compartment: &Option<String>,
) -> Option<String> {
    model
        .metabolites
        .values()
        .filter(|m| m.is_simple_chemical() && &m.compartment == compartment)
        .find(|m| {
            cofactor.matches(m)
                || (m.charge_or_default() == cofactor.charge
                    && m
                        .formula
                        .as_deref()
                        .and_then(|f| Formula::parse(f).ok())
                        .is_some_and(|f| f == cofactor.formula))
        })
        .map(|m| m.id.clone())
}

fn create_cofactor_species(
    model: &Model,
    cofactor: &Cofactor,
    compartment: &Option<String>,
) -> Metabolite {
    let seed = cofactor.primary_id().unwrap_or(cofactor.name.as_str());
    let compartment_id = compartment.clone().unwrap_or_default();
    let mut id = generated_species_id(seed, &compartment_id);
    let mut attempt = 1;
    while model.get_metabolite(&id).is_some() {
        id = generated_species_id(&format!("{}#{}", seed, attempt), &compartment_id);
        attempt += 1;
    }
    Metabolite {
        id,
        name: Some(cofactor.name.clone()),
        compartment: compartment.clone(),
        charge: Some(cofactor.charge),
        formula: Some(cofactor.formula.to_string()),
        notes: IndexMap::new(),
        ontology_terms: cofactor.primary_id().map(String::from).into_iter().collect(),
        sbo_term: Some(SIMPLE_CHEMICAL),
    }
}
