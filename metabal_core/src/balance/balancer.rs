//! Automatic stoichiometric balancing of a single reaction
//!
//! Each explicit reactant and product, each cofactor that could be added to either side,
//! and each repeating unit of a participant's formula becomes an integer column `x`.
//! Element and charge conservation give one equality row per element. Deviation from the
//! target stoichiometry is measured with continuous columns `p` and `n` in rows
//! `x + p - n = target`, and the objective minimises `Σ (p + n)` over everything but
//! repeating units, with a small weight on `x` so smaller coefficients win ties.
use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use crate::balance::error::BalanceError;
use crate::balance::matrix::{CoefficientMatrix, CoefficientMatrixBuilder};
use crate::balance::participant::{Participant, ParticipantKind};
use crate::balance::plan::{BalancePlan, CofactorAddition};
use crate::chemistry::cofactor::CofactorSet;
use crate::chemistry::formula::Formula;
use crate::configuration;
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, Side};
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::{Problem, ProblemBuilder, ProblemError};
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::variable::VariableType;
use crate::optimize::OptimizationStatus;

/// Largest objective weight on each non repeating coefficient
///
/// The weights summed over a solution must stay below the smallest change in total
/// deviation worth preferring, or the tie break overrides the deviation. With whole
/// targets that change is 1, so [`tie_break_weight`] shrinks the weight until every
/// coefficient at the maximum contributes at most [`TIE_BREAK_BUDGET`]. Fractional
/// targets can differ by less than that and are not protected.
const TIE_BREAK_WEIGHT: f64 = 1e-4;

/// Most the tie break may add to the objective at the coefficient bound
const TIE_BREAK_BUDGET: f64 = 0.5;

/// Limits applied when balancing
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct BalanceOptions {
    /// Upper bound for explicit reactants and products
    #[builder(default = "configuration::current().max_stoichiometric_coefficient")]
    pub max_stoichiometric_coefficient: u32,
    /// Residuals within this of zero count as balanced
    #[builder(default = "configuration::current().residual_tolerance")]
    pub residual_tolerance: f64,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        let config = configuration::current();
        BalanceOptions {
            max_stoichiometric_coefficient: config.max_stoichiometric_coefficient,
            residual_tolerance: config.residual_tolerance,
        }
    }
}

/// What the balancing problem minimises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceMode {
    /// Deviation from the reaction's current stoichiometries
    MinimiseDeviation,
    /// Deviation from a stoichiometry of 1 for every explicit participant
    MinimiseDeviationFromUnit,
    /// Sum of all coefficients other than repeating units
    MinimiseStoichiometries,
}

/// Outcome of planning a balance
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceAttempt {
    /// A solution was found, applying the plan balances the reaction
    Balanced(BalancePlan),
    /// The solver found no solution, or ran out of time
    Infeasible(OptimizationStatus),
    /// A repeating unit's count is not a whole multiple of its species' coefficient
    NonIntegerRepeatRatio { species_id: String, ratio: f64 },
    /// The same species would need two different expansions
    ConflictingExpansion { species_id: String },
}

/// Participants and coefficient matrix of the reaction in its current state
struct Assembly {
    participants: Vec<Participant>,
    matrix: CoefficientMatrix,
}

/// Balances one reaction of a model
///
/// The balancer reads the reaction afresh for every call, so it can be reused after
/// [`ReactionBalancer::balance`] has changed the reaction.
pub struct ReactionBalancer<'a> {
    model: &'a mut Model,
    reaction_id: String,
    cofactors: &'a CofactorSet,
    solver: &'a dyn Solver,
    options: BalanceOptions,
    /// Formulas used in place of the model's, stored on the species only on success
    formula_overrides: IndexMap<String, Formula>,
    updated_species_ids: IndexSet<String>,
}

impl<'a> ReactionBalancer<'a> {
    /// Create a balancer for `reaction_id`
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::balance::balancer::ReactionBalancer;
    /// use metabal_core::chemistry::cofactor::CofactorSet;
    /// use metabal_core::metabolic_model::metabolite::MetaboliteBuilder;
    /// use metabal_core::metabolic_model::model::Model;
    /// use metabal_core::metabolic_model::reaction::{ReactionBuilder, SpeciesReference};
    /// use metabal_core::optimize::solvers::microlp::MicrolpSolver;
    ///
    /// let mut model = Model::new_empty();
    /// for (id, formula) in [("h2_c", "H2"), ("o2_c", "O2"), ("h2o_c", "H2O")] {
    ///     let metabolite = MetaboliteBuilder::default()
    ///         .id(id)
    ///         .formula(formula)
    ///         .compartment("c")
    ///         .build()
    ///         .unwrap();
    ///     model.add_metabolite(metabolite);
    /// }
    /// let reaction = ReactionBuilder::default()
    ///     .id("R")
    ///     .reactants(vec![SpeciesReference::new("h2_c", 2.), SpeciesReference::new("o2_c", 1.)])
    ///     .products(vec![SpeciesReference::new("h2o_c", 1.)])
    ///     .build()
    ///     .unwrap();
    /// model.add_reaction(reaction);
    ///
    /// let cofactors = CofactorSet::new(vec![]);
    /// let solver = MicrolpSolver::default();
    /// let mut balancer = ReactionBalancer::new(&mut model, "R", &cofactors, &solver).unwrap();
    /// assert!(!balancer.is_balanced().unwrap().is_empty());
    /// assert!(balancer.balance().unwrap());
    /// assert!(balancer.is_balanced().unwrap().is_empty());
    /// ```
    pub fn new(
        model: &'a mut Model,
        reaction_id: &str,
        cofactors: &'a CofactorSet,
        solver: &'a dyn Solver,
    ) -> Result<Self, BalanceError> {
        if model.get_reaction(reaction_id).is_none() {
            return Err(BalanceError::UnknownReaction(reaction_id.to_string()));
        }
        Ok(ReactionBalancer {
            model,
            reaction_id: reaction_id.to_string(),
            cofactors,
            solver,
            options: BalanceOptions::default(),
            formula_overrides: IndexMap::new(),
            updated_species_ids: IndexSet::new(),
        })
    }

    pub fn with_options(mut self, options: BalanceOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `overrides` in place of the model's formula for the given species
    pub fn with_formula_overrides(mut self, overrides: IndexMap<String, Formula>) -> Self {
        self.formula_overrides = overrides;
        self
    }

    pub fn model(&self) -> &Model {
        &*self.model
    }

    /// Species whose formula was changed by the last successful balance
    pub fn updated_species_ids(&self) -> &IndexSet<String> {
        &self.updated_species_ids
    }

    // region Balance checks
    /// Element and charge residuals of the reaction's current stoichiometries
    ///
    /// An empty map means the reaction is balanced. Repeating units count as absent.
    pub fn is_balanced(&self) -> Result<IndexMap<String, f64>, BalanceError> {
        let assembly = self.assemble()?;
        Ok(self.residual(&assembly, false))
    }

    /// Element and charge residuals with every explicit coefficient set to 1
    pub fn is_balanced_reset_stoichiometry(&self) -> Result<IndexMap<String, f64>, BalanceError> {
        let assembly = self.assemble()?;
        Ok(self.residual(&assembly, true))
    }

    fn residual(&self, assembly: &Assembly, reset: bool) -> IndexMap<String, f64> {
        let stoichiometries: Vec<f64> = assembly
            .participants
            .iter()
            .map(|p| match p.kind {
                ParticipantKind::Species { .. } => p.target(reset),
                _ => 0.,
            })
            .collect();
        assembly
            .matrix
            .residual(&stoichiometries, self.options.residual_tolerance)
    }
    // endregion Balance checks

    // region Balancing
    /// Balance the reaction staying as close as possible to its current stoichiometries
    ///
    /// # Returns
    /// - `Ok(true)`: the reaction was balanced and the model updated
    /// - `Ok(false)`: no balance exists within the bounds, the model is unchanged
    /// - `Err`: the reaction could not be examined, such as a species missing a formula
    pub fn balance(&mut self) -> Result<bool, BalanceError> {
        self.balance_with(BalanceMode::MinimiseDeviation)
    }

    /// Balance the reaction staying as close as possible to unit stoichiometries
    pub fn balance_reset_stoichiometry(&mut self) -> Result<bool, BalanceError> {
        self.balance_with(BalanceMode::MinimiseDeviationFromUnit)
    }

    /// Balance the reaction with the smallest total of coefficients
    pub fn balance_minimise_stoichiometries(&mut self) -> Result<bool, BalanceError> {
        self.balance_with(BalanceMode::MinimiseStoichiometries)
    }

    /// Plan a balance with `mode` and apply it if one was found
    pub fn balance_with(&mut self, mode: BalanceMode) -> Result<bool, BalanceError> {
        self.updated_species_ids.clear();
        match self.plan(mode)? {
            BalanceAttempt::Balanced(plan) => {
                plan.apply(self.model)?;
                for species_id in plan.formula_updates.keys() {
                    self.formula_overrides.shift_remove(species_id);
                    self.updated_species_ids.insert(species_id.clone());
                }
                info!("Balanced reaction {}", self.reaction_id);
                Ok(true)
            }
            attempt => {
                debug!("Could not balance {}: {:?}", self.reaction_id, attempt);
                Ok(false)
            }
        }
    }

    /// Solve the balancing problem without changing the model
    pub fn plan(&self, mode: BalanceMode) -> Result<BalanceAttempt, BalanceError> {
        let assembly = self.assemble()?;
        let problem = self.build_problem(&assembly, mode)?;
        if problem.has_integer_variables() && !self.solver.integer_variable_capable() {
            return Err(SolverError::IntegerVariablesUnsupported(
                self.solver.name().to_string(),
            )
            .into());
        }
        let solution = self.solver.solve(&problem)?;
        match solution.values() {
            Some(values) if solution.is_optimal() => Ok(self.interpret(&assembly, &values)),
            _ => Ok(BalanceAttempt::Infeasible(solution.status)),
        }
    }
    // endregion Balancing

    // region Problem assembly
    fn reaction(&self) -> Result<&Reaction, BalanceError> {
        self.model
            .get_reaction(&self.reaction_id)
            .ok_or_else(|| BalanceError::UnknownReaction(self.reaction_id.clone()))
    }

    fn species_formula(&self, metabolite: &Metabolite) -> Result<Formula, BalanceError> {
        if let Some(formula) = self.formula_overrides.get(&metabolite.id) {
            return Ok(formula.clone());
        }
        let text = metabolite
            .formula
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| BalanceError::MissingFormula {
                species_id: metabolite.id.clone(),
            })?;
        Formula::parse(text).map_err(|source| BalanceError::InvalidFormula {
            species_id: metabolite.id.clone(),
            source,
        })
    }

    /// Build the participants and coefficient matrix
    ///
    /// Existing reactants come first, then existing products, then the cofactors left
    /// on the reactant side and on the product side. Repeating units follow their
    /// parent directly.
    fn assemble(&self) -> Result<Assembly, BalanceError> {
        let reaction = self.reaction()?;
        let is_transport = self.model.is_transport(reaction);
        let max_coefficient = self.options.max_stoichiometric_coefficient as f64;
        let mut reactant_candidates = self.cofactors.candidates();
        let mut product_candidates = self.cofactors.candidates();
        let mut participants = Vec::new();

        for side in [Side::Reactant, Side::Product] {
            let candidates = match side {
                Side::Reactant => &mut reactant_candidates,
                Side::Product => &mut product_candidates,
            };
            for (index, reference) in reaction.side(side).iter().enumerate() {
                let metabolite = self
                    .model
                    .get_metabolite(&reference.species)
                    .ok_or_else(|| BalanceError::UnknownSpecies(reference.species.clone()))?;
                let formula = self.species_formula(metabolite)?;
                let (lower_bound, upper_bound) =
                    match candidates.iter().position(|c| c.matches(metabolite)) {
                        Some(position) => {
                            let cofactor = candidates.remove(position);
                            let lower_bound = if is_transport && cofactor.is_proton() {
                                reference.stoichiometry.trunc()
                            } else {
                                0.
                            };
                            (lower_bound, f64::INFINITY)
                        }
                        None => (1., max_coefficient),
                    };

                let parent = participants.len();
                participants.push(Participant {
                    name: metabolite.name.clone().unwrap_or_else(|| metabolite.id.clone()),
                    kind: ParticipantKind::Species {
                        species_id: metabolite.id.clone(),
                        index,
                    },
                    formula: formula.clone(),
                    charge: metabolite.charge_or_default(),
                    side,
                    lower_bound,
                    upper_bound,
                    stoichiometry: reference.stoichiometry,
                });
                for (unit_index, repeat) in formula.repeating_units().iter().enumerate() {
                    participants.push(Participant {
                        name: format!("({}){}", repeat.unit, repeat.variable),
                        kind: ParticipantKind::RepeatingUnit {
                            parent,
                            unit: unit_index,
                        },
                        formula: repeat.unit.clone(),
                        charge: 0,
                        side,
                        lower_bound: 0.,
                        upper_bound: f64::INFINITY,
                        stoichiometry: 0.,
                    });
                }
            }
        }

        for (side, candidates) in [
            (Side::Reactant, reactant_candidates),
            (Side::Product, product_candidates),
        ] {
            for cofactor in candidates {
                participants.push(Participant {
                    name: cofactor.name.clone(),
                    formula: cofactor.formula.clone(),
                    charge: cofactor.charge,
                    kind: ParticipantKind::Cofactor(cofactor),
                    side,
                    lower_bound: 0.,
                    upper_bound: f64::INFINITY,
                    stoichiometry: 0.,
                });
            }
        }

        let mut builder = CoefficientMatrixBuilder::new();
        for participant in &participants {
            builder.add_column(&participant.formula, participant.charge, participant.side);
        }
        Ok(Assembly {
            participants,
            matrix: builder.build(),
        })
    }

    fn build_problem(&self, assembly: &Assembly, mode: BalanceMode) -> Result<Problem, ProblemError> {
        let participants = &assembly.participants;
        let count = participants.len();
        let tie_break = tie_break_weight(
            participants.iter().filter(|p| !p.is_repeating_unit()).count(),
            self.options.max_stoichiometric_coefficient,
        );
        let mut builder = ProblemBuilder::new(ObjectiveSense::Minimize);

        for (j, participant) in participants.iter().enumerate() {
            let weight = match (mode, participant.is_repeating_unit()) {
                (_, true) => 0.,
                (BalanceMode::MinimiseStoichiometries, false) => 1.,
                (_, false) => tie_break,
            };
            builder.add_variable(
                &format!("x{}", j),
                VariableType::Integer,
                participant.lower_bound,
                participant.upper_bound,
                weight,
            )?;
        }

        for row in assembly.matrix.matrix().row_iter() {
            let terms: Vec<(usize, f64)> = row
                .iter()
                .enumerate()
                .filter(|(_, coefficient)| **coefficient != 0.)
                .map(|(column, coefficient)| (column, *coefficient))
                .collect();
            builder.add_equality_row(&terms, 0.)?;
        }

        if mode == BalanceMode::MinimiseStoichiometries {
            return Ok(builder.build());
        }

        let reset = mode == BalanceMode::MinimiseDeviationFromUnit;
        for prefix in ["p", "n"] {
            for (j, participant) in participants.iter().enumerate() {
                let weight = if participant.is_repeating_unit() { 0. } else { 1. };
                builder.add_variable(
                    &format!("{}{}", prefix, j),
                    VariableType::Continuous,
                    0.,
                    f64::INFINITY,
                    weight,
                )?;
            }
        }
        for (j, participant) in participants.iter().enumerate() {
            builder.add_equality_row(
                &[(j, 1.), (count + j, 1.), (2 * count + j, -1.)],
                participant.target(reset),
            )?;
        }
        Ok(builder.build())
    }
    // endregion Problem assembly

    // region Solution interpretation
    /// Turn solved coefficients into a plan, `values` starts with one entry per participant
    fn interpret(&self, assembly: &Assembly, values: &[f64]) -> BalanceAttempt {
        let participants = &assembly.participants;
        let mut plan = BalancePlan::new(&self.reaction_id);
        let mut unit_counts: IndexMap<usize, Vec<u32>> = IndexMap::new();

        for (j, participant) in participants.iter().enumerate() {
            let value = values[j];
            match &participant.kind {
                ParticipantKind::RepeatingUnit { parent, .. } => {
                    let ratio = value / values[*parent];
                    if !is_whole_count(ratio) {
                        return BalanceAttempt::NonIntegerRepeatRatio {
                            species_id: participants[*parent]
                                .species_id()
                                .unwrap_or_default()
                                .to_string(),
                            ratio,
                        };
                    }
                    unit_counts.entry(*parent).or_default().push(ratio as u32);
                }
                ParticipantKind::Species { species_id, index } => {
                    plan.stoichiometries.push((participant.side, *index, value));
                    if let Some(formula) = self.formula_overrides.get(species_id) {
                        plan.formula_updates
                            .entry(species_id.clone())
                            .or_insert_with(|| formula.clone());
                    }
                }
                ParticipantKind::Cofactor(cofactor) => {
                    if value != 0. {
                        plan.cofactor_additions.push(CofactorAddition {
                            cofactor: cofactor.clone(),
                            side: participant.side,
                            stoichiometry: value,
                        });
                    }
                }
            }
        }

        let mut expansions: IndexMap<String, Formula> = IndexMap::new();
        for (parent, counts) in unit_counts {
            let participant = &participants[parent];
            let species_id = participant.species_id().unwrap_or_default().to_string();
            let expanded = match participant.formula.expand_units(&counts) {
                Ok(formula) => formula,
                Err(_) => return BalanceAttempt::ConflictingExpansion { species_id },
            };
            match expansions.get(&species_id) {
                Some(existing) if *existing != expanded => {
                    return BalanceAttempt::ConflictingExpansion { species_id };
                }
                _ => {
                    expansions.insert(species_id, expanded);
                }
            }
        }
        for (species_id, formula) in expansions {
            plan.formula_updates.insert(species_id, formula);
        }
        BalanceAttempt::Balanced(plan)
    }
    // endregion Solution interpretation
}

/// Whether `value` is a finite, non-negative whole number that fits a repeat count
fn is_whole_count(value: f64) -> bool {
    value.is_finite() && value == value.floor() && value >= 0. && value <= u32::MAX as f64
}

/// Tie break weight for `columns` coefficients bounded by `max_coefficient`
fn tie_break_weight(columns: usize, max_coefficient: u32) -> f64 {
    let scale = (columns.max(1) as f64) * (max_coefficient.max(1) as f64);
    TIE_BREAK_WEIGHT.min(TIE_BREAK_BUDGET / scale)
}
