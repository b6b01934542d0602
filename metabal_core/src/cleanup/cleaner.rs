//! Repeated balancing passes until a model stops changing
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use derive_builder::Builder;
use indexmap::IndexSet;
use log::info;

use crate::balance::balancer::BalanceOptions;
use crate::chemistry::cofactor::CofactorSet;
use crate::cleanup::pass::BalancePass;
use crate::cleanup::report::CleanupReport;
use crate::cleanup::rgroup::{MethyleneChainExpansion, RGroupPolicy};
use crate::cleanup::CleanupError;
use crate::configuration;
use crate::metabolic_model::model::Model;
use crate::optimize::solvers::Solver;

/// Limits and switches of the cleanup loop
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct CleanupOptions {
    /// Upper bound for explicit reactants and products
    #[builder(default = "configuration::current().cleanup_max_stoichiometric_coefficient")]
    pub max_stoichiometric_coefficient: u32,
    #[builder(default = "configuration::current().residual_tolerance")]
    pub residual_tolerance: f64,
    #[builder(default = "configuration::current().max_cleanup_passes")]
    pub max_passes: usize,
    /// Smallest change in balanced fraction that counts as progress
    #[builder(default = "configuration::current().convergence_tolerance")]
    pub convergence_tolerance: f64,
    #[builder(default = "configuration::current().remove_pointless_reactions")]
    pub remove_pointless_reactions: bool,
    #[builder(default = "configuration::current().remove_orphan_species")]
    pub remove_orphan_species: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        let config = configuration::current();
        CleanupOptions {
            max_stoichiometric_coefficient: config.cleanup_max_stoichiometric_coefficient,
            residual_tolerance: config.residual_tolerance,
            max_passes: config.max_cleanup_passes,
            convergence_tolerance: config.convergence_tolerance,
            remove_pointless_reactions: config.remove_pointless_reactions,
            remove_orphan_species: config.remove_orphan_species,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Scanning,
    Converged,
}

/// Balances every reaction of a model, removing species that can't be balanced
///
/// After each pass, species blamed for exactly one unbalanced reaction and appearing in
/// exactly one reaction are deleted together with that reaction. The loop stops once a
/// pass deletes nothing, makes no formula specific and leaves the balanced fraction
/// unchanged.
pub struct ModelCleaner<'a> {
    cofactors: &'a CofactorSet,
    solver: &'a dyn Solver,
    r_group_policy: Box<dyn RGroupPolicy + 'a>,
    options: CleanupOptions,
    cancel: Arc<AtomicBool>,
    state: CleanupState,
}

impl<'a> ModelCleaner<'a> {
    pub fn new(cofactors: &'a CofactorSet, solver: &'a dyn Solver) -> Self {
        ModelCleaner {
            cofactors,
            solver,
            r_group_policy: Box::new(MethyleneChainExpansion::default()),
            options: CleanupOptions::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            state: CleanupState::Scanning,
        }
    }

    pub fn with_options(mut self, options: CleanupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_r_group_policy(mut self, policy: Box<dyn RGroupPolicy + 'a>) -> Self {
        self.r_group_policy = policy;
        self
    }

    /// Flag that stops the loop between reactions when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> CleanupState {
        self.state
    }

    /// Run passes over `model` until it converges
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::chemistry::cofactor::CofactorSet;
    /// use metabal_core::cleanup::cleaner::ModelCleaner;
    /// use metabal_core::metabolic_model::model::Model;
    /// use metabal_core::optimize::solvers::microlp::MicrolpSolver;
    ///
    /// let mut model = Model::new_empty();
    /// let cofactors = CofactorSet::default();
    /// let solver = MicrolpSolver::default();
    /// let report = ModelCleaner::new(&cofactors, &solver).run(&mut model).unwrap();
    /// // The first pass always counts as progress
    /// assert_eq!(report.passes, 2);
    /// assert_eq!(report.final_pass.balanced_fraction(), 1.);
    /// ```
    pub fn run(&mut self, model: &mut Model) -> Result<CleanupReport, CleanupError> {
        self.state = CleanupState::Scanning;
        let balance_options = BalanceOptions {
            max_stoichiometric_coefficient: self.options.max_stoichiometric_coefficient,
            residual_tolerance: self.options.residual_tolerance,
        };
        let mut previous_fraction = 0.;
        let mut deleted_species = Vec::new();
        let mut deleted_reactions = Vec::new();
        let mut balanced_fractions = Vec::new();
        let mut updated_species = IndexSet::new();

        for pass in 1..=self.options.max_passes {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(CleanupError::Cancelled { passes: pass - 1 });
            }
            let report = BalancePass {
                cofactors: self.cofactors,
                solver: self.solver,
                r_group_policy: self.r_group_policy.as_ref(),
                options: balance_options.clone(),
                cancel: Some(self.cancel.as_ref()),
            }
            .run(model, pass)?;
            info!(
                "Pass {}: {} of {} reactions unbalanced",
                pass,
                report.unbalanced.len(),
                report.total_reactions
            );

            let degree = model.metabolite_degree();
            let candidates: Vec<String> = report
                .problematic
                .iter()
                .filter(|(id, count)| **count == 1 && degree.get(*id) == Some(&1))
                .map(|(id, _)| id.clone())
                .collect();
            let (mut species, mut reactions) = model.remove_metabolites(&candidates, true);
            if self.options.remove_pointless_reactions {
                reactions.extend(model.remove_pointless_reactions());
            }
            if self.options.remove_orphan_species {
                species.extend(model.remove_orphan_metabolites());
            }
            if !species.is_empty() || !reactions.is_empty() {
                info!(
                    "Pass {} deleted species {:?} and reactions {:?}",
                    pass, species, reactions
                );
            }

            let fraction = report.balanced_fraction();
            let changed = (fraction - previous_fraction).abs() >= self.options.convergence_tolerance
                || !species.is_empty()
                || !reactions.is_empty()
                || !report.updated_species.is_empty();
            previous_fraction = fraction;
            balanced_fractions.push(fraction);
            updated_species.extend(report.updated_species.iter().cloned());
            deleted_species.extend(species);
            deleted_reactions.extend(reactions);

            if !changed {
                self.state = CleanupState::Converged;
                info!("Model cleanup converged after {} passes", pass);
                return Ok(CleanupReport {
                    passes: pass,
                    deleted_species,
                    deleted_reactions,
                    balanced_fractions,
                    updated_species,
                    final_pass: report,
                });
            }
        }
        Err(CleanupError::NotConverged {
            passes: self.options.max_passes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::{ReactionBuilder, SpeciesReference};
    use crate::optimize::solvers::microlp::MicrolpSolver;
    use std::time::Duration;

    fn options(max_passes: usize) -> CleanupOptions {
        CleanupOptionsBuilder::default()
            .max_stoichiometric_coefficient(12)
            .residual_tolerance(1e-8)
            .max_passes(max_passes)
            .convergence_tolerance(1e-8)
            .remove_pointless_reactions(false)
            .remove_orphan_species(false)
            .build()
            .unwrap()
    }

    /// `a -> b` can never balance, `x -> y` already is balanced
    fn model() -> Model {
        let mut model = Model::new_empty();
        for (id, formula) in [("a", "C"), ("b", "N"), ("x", "CH4"), ("y", "CH4")] {
            model.add_metabolite(
                MetaboliteBuilder::default()
                    .id(id)
                    .formula(formula)
                    .compartment("c")
                    .build()
                    .unwrap(),
            );
        }
        for (id, reactant, product) in [("R1", "a", "b"), ("R2", "x", "y")] {
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id)
                    .reactants(vec![SpeciesReference::new(reactant, 1.)])
                    .products(vec![SpeciesReference::new(product, 1.)])
                    .build()
                    .unwrap(),
            );
        }
        model
    }

    #[test]
    fn deletes_unbalanceable_species_and_converges() {
        let mut model = model();
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let mut cleaner = ModelCleaner::new(&cofactors, &solver).with_options(options(100));
        let report = cleaner.run(&mut model).unwrap();

        assert_eq!(cleaner.state(), CleanupState::Converged);
        assert_eq!(report.deleted_species, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.deleted_reactions, vec!["R1".to_string()]);
        assert_eq!(report.passes, 3);
        assert_eq!(report.balanced_fractions, vec![0.5, 1., 1.]);
        assert!(model.get_reaction("R1").is_none());
        assert!(model.get_metabolite("a").is_none());
        assert!(model.get_reaction("R2").is_some());
        assert!(report.final_pass.unbalanced.is_empty());
    }

    #[test]
    fn deletions_cascade_across_passes() {
        let mut model = model();
        // a appears in two unbalanceable reactions and only goes once b's reaction is gone
        model.add_reaction(
            ReactionBuilder::default()
                .id("R3")
                .reactants(vec![SpeciesReference::new("a", 1.)])
                .products(vec![SpeciesReference::new("x", 1.)])
                .build()
                .unwrap(),
        );
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let report = ModelCleaner::new(&cofactors, &solver)
            .with_options(options(100))
            .run(&mut model)
            .unwrap();
        assert_eq!(report.deleted_species, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(report.deleted_reactions, vec!["R1".to_string(), "R3".to_string()]);
        assert_eq!(report.passes, 4);
        // x was blamed once but still takes part in R2
        assert!(model.get_metabolite("x").is_some());
        assert_eq!(model.reactions.len(), 1);
    }

    #[test]
    fn pass_limit_reports_non_convergence() {
        let mut model = model();
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let mut cleaner = ModelCleaner::new(&cofactors, &solver).with_options(options(1));
        match cleaner.run(&mut model) {
            Err(CleanupError::NotConverged { passes }) => assert_eq!(passes, 1),
            _ => panic!("Expected the loop to stop at the pass limit"),
        }
        assert_eq!(cleaner.state(), CleanupState::Scanning);
    }

    #[test]
    fn cancel_flag_stops_before_first_pass() {
        let mut model = model();
        let before = model.clone();
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let mut cleaner = ModelCleaner::new(&cofactors, &solver).with_options(options(100));
        cleaner.cancel_flag().store(true, Ordering::Relaxed);
        match cleaner.run(&mut model) {
            Err(CleanupError::Cancelled { passes }) => assert_eq!(passes, 0),
            _ => panic!("Expected the loop to be cancelled"),
        }
        assert_eq!(model, before);
    }

    #[test]
    fn optional_removals() {
        let mut model = model();
        model.add_metabolite(MetaboliteBuilder::default().id("lonely").build().unwrap());
        model.add_reaction(
            ReactionBuilder::default()
                .id("loop")
                .reactants(vec![SpeciesReference::new("x", 1.)])
                .products(vec![SpeciesReference::new("x", 1.)])
                .build()
                .unwrap(),
        );
        let mut options = options(100);
        options.remove_pointless_reactions = true;
        options.remove_orphan_species = true;
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let report = ModelCleaner::new(&cofactors, &solver)
            .with_options(options)
            .run(&mut model)
            .unwrap();
        assert!(report.deleted_reactions.contains(&"loop".to_string()));
        assert!(report.deleted_species.contains(&"lonely".to_string()));
        assert!(model.get_reaction("loop").is_none());
    }
}
