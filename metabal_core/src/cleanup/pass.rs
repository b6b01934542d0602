//! A single balancing pass over every reaction of a model
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};

use crate::balance::balancer::{BalanceOptions, ReactionBalancer};
use crate::balance::error::BalanceError;
use crate::chemistry::cofactor::CofactorSet;
use crate::chemistry::formula::Formula;
use crate::cleanup::report::{PassReport, UnbalancedReaction};
use crate::cleanup::rgroup::RGroupPolicy;
use crate::cleanup::CleanupError;
use crate::metabolic_model::metabolite::NON_SPECIFIC_FORMULA;
use crate::metabolic_model::model::Model;
use crate::optimize::solvers::Solver;

/// What happened to one reaction during a pass
#[derive(Debug, Clone, PartialEq)]
enum ReactionOutcome {
    AlreadyBalanced,
    /// Balanced by the pass, with the species whose formula changed
    Balanced(IndexSet<String>),
    Unbalanced {
        residual: IndexMap<String, f64>,
        reset_residual: IndexMap<String, f64>,
    },
}

/// Tries to balance every reaction of a model once
pub struct BalancePass<'a> {
    pub cofactors: &'a CofactorSet,
    pub solver: &'a dyn Solver,
    pub r_group_policy: &'a dyn RGroupPolicy,
    pub options: BalanceOptions,
    pub cancel: Option<&'a AtomicBool>,
}

impl BalancePass<'_> {
    /// Run pass number `pass` over `model`
    ///
    /// Failures confined to one reaction are recorded in the report, anything else
    /// stops the pass.
    pub fn run(&self, model: &mut Model, pass: usize) -> Result<PassReport, CleanupError> {
        let reaction_ids: Vec<String> = model.reactions.keys().cloned().collect();
        let mut report = PassReport::new(pass, reaction_ids.len());

        for reaction_id in reaction_ids {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(CleanupError::Cancelled {
                    passes: pass.saturating_sub(1),
                });
            }
            let reaction = match model.get_reaction(&reaction_id) {
                Some(reaction) => reaction,
                None => continue,
            };
            if reaction.is_omitted_process() {
                report.skipped.push(reaction_id);
                continue;
            }

            let overrides = self.r_group_policy.overrides(model, reaction);
            let expanded = !overrides.is_empty();
            let species_ids = reaction.species_ids();
            let name = reaction.name.clone();
            let equation = reaction.to_string();
            let previous_formulas: IndexMap<String, Option<String>> = species_ids
                .iter()
                .map(|id| {
                    let formula = model.get_metabolite(id).and_then(|m| m.formula.clone());
                    (id.clone(), formula)
                })
                .collect();

            match self.balance_reaction(model, &reaction_id, overrides) {
                Ok(ReactionOutcome::AlreadyBalanced) => report.balanced.push(reaction_id),
                Ok(ReactionOutcome::Balanced(updated)) => {
                    for species_id in updated {
                        let previous = previous_formulas.get(&species_id).cloned().flatten();
                        if let (Some(metabolite), Some(previous)) =
                            (model.get_metabolite_mut(&species_id), previous)
                        {
                            metabolite
                                .notes
                                .insert(NON_SPECIFIC_FORMULA.to_string(), previous);
                        }
                        report.updated_species.insert(species_id);
                    }
                    if expanded {
                        report.r_group_expanded.push(reaction_id.clone());
                    }
                    report.balanced.push(reaction_id);
                }
                Ok(ReactionOutcome::Unbalanced {
                    residual,
                    reset_residual,
                }) => {
                    debug!("Reaction {} remains unbalanced", reaction_id);
                    for species_id in &species_ids {
                        report.blame(species_id);
                    }
                    report.unbalanced.push(UnbalancedReaction {
                        reaction_id,
                        name,
                        equation,
                        residual: Some(residual),
                        reset_residual: Some(reset_residual),
                        failure: None,
                    });
                }
                Err(error) if error.is_reaction_local() => {
                    warn!("Reaction {} not balanced: {}", reaction_id, error);
                    if let Some(species_id) = error.species_id() {
                        report.blame(species_id);
                    }
                    report.unbalanced.push(UnbalancedReaction {
                        reaction_id,
                        name,
                        equation,
                        residual: None,
                        reset_residual: None,
                        failure: Some(error.to_string()),
                    });
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(report)
    }

    /// Check the reaction, then balance against its current and then unit stoichiometries
    fn balance_reaction(
        &self,
        model: &mut Model,
        reaction_id: &str,
        overrides: IndexMap<String, Formula>,
    ) -> Result<ReactionOutcome, BalanceError> {
        let mut balancer = ReactionBalancer::new(model, reaction_id, self.cofactors, self.solver)?
            .with_options(self.options.clone())
            .with_formula_overrides(overrides.clone());
        let residual = balancer.is_balanced()?;
        if residual.is_empty() {
            if overrides.is_empty() {
                return Ok(ReactionOutcome::AlreadyBalanced);
            }
            // The substituted formulas alone balance the reaction
            let mut updated = IndexSet::new();
            for (species_id, formula) in overrides {
                if let Some(metabolite) = model.get_metabolite_mut(&species_id) {
                    debug!("Updating formula of {} to {}", species_id, formula);
                    metabolite.formula = Some(formula.to_string());
                    updated.insert(species_id);
                }
            }
            return Ok(ReactionOutcome::Balanced(updated));
        }
        if balancer.balance()? {
            return Ok(ReactionOutcome::Balanced(
                balancer.updated_species_ids().clone(),
            ));
        }
        let reset_residual = balancer.is_balanced_reset_stoichiometry()?;
        if balancer.balance_reset_stoichiometry()? {
            return Ok(ReactionOutcome::Balanced(
                balancer.updated_species_ids().clone(),
            ));
        }
        Ok(ReactionOutcome::Unbalanced {
            residual,
            reset_residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::formula::R_GROUP;
    use crate::cleanup::rgroup::{KeepRGroups, MethyleneChainExpansion};
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::{ReactionBuilder, SpeciesReference};
    use crate::metabolic_model::OMITTED_PROCESS;
    use crate::optimize::solvers::microlp::MicrolpSolver;
    use std::time::Duration;

    fn add_species(model: &mut Model, id: &str, formula: Option<&str>) {
        let mut builder = MetaboliteBuilder::default();
        builder.id(id).compartment("c");
        if let Some(formula) = formula {
            builder.formula(formula);
        }
        model.add_metabolite(builder.build().unwrap());
    }

    fn add_reaction(model: &mut Model, id: &str, reactant: &str, product: &str) {
        model.add_reaction(
            ReactionBuilder::default()
                .id(id)
                .reactants(vec![SpeciesReference::new(reactant, 1.)])
                .products(vec![SpeciesReference::new(product, 1.)])
                .build()
                .unwrap(),
        );
    }

    fn run(model: &mut Model, policy: &dyn RGroupPolicy) -> PassReport {
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let pass = BalancePass {
            cofactors: &cofactors,
            solver: &solver,
            r_group_policy: policy,
            options: BalanceOptions {
                max_stoichiometric_coefficient: 12,
                residual_tolerance: 1e-8,
            },
            cancel: None,
        };
        pass.run(model, 1).unwrap()
    }

    #[test]
    fn classifies_reactions() {
        let mut model = Model::new_empty();
        add_species(&mut model, "a", Some("C"));
        add_species(&mut model, "b", Some("C"));
        add_species(&mut model, "c", Some("N"));
        add_species(&mut model, "d", None);
        add_reaction(&mut model, "ok", "a", "b");
        add_reaction(&mut model, "impossible", "a", "c");
        add_reaction(&mut model, "missing", "d", "b");
        add_reaction(&mut model, "omitted", "c", "d");
        model.get_reaction_mut("omitted").unwrap().sbo_term = Some(OMITTED_PROCESS);

        let report = run(&mut model, &KeepRGroups);
        assert_eq!(report.total_reactions, 4);
        assert_eq!(report.balanced, vec!["ok".to_string()]);
        assert_eq!(report.skipped, vec!["omitted".to_string()]);
        assert_eq!(report.unbalanced.len(), 2);

        let impossible = &report.unbalanced[0];
        assert_eq!(impossible.reaction_id, "impossible");
        assert_eq!(impossible.residual.as_ref().unwrap()["N"], -1.);
        assert!(impossible.failure.is_none());

        let missing = &report.unbalanced[1];
        assert!(missing.residual.is_none());
        assert!(missing.failure.as_ref().unwrap().contains("MISSING FORMULA"));

        // The missing formula only blames its species
        assert_eq!(report.problematic.get("a"), Some(&1));
        assert_eq!(report.problematic.get("c"), Some(&1));
        assert_eq!(report.problematic.get("d"), Some(&1));
        assert_eq!(report.problematic.get("b"), None);
        assert_eq!(report.balanced_fraction(), 0.5);
    }

    #[test]
    fn r_group_expansion_is_recorded() {
        let mut model = Model::new_empty();
        add_species(&mut model, "acyl", Some("C2H3O2R"));
        add_species(&mut model, "acid", Some("C5H10O2"));
        add_reaction(&mut model, "R", "acyl", "acid");

        let report = run(&mut model, &MethyleneChainExpansion::default());
        assert_eq!(report.balanced, vec!["R".to_string()]);
        assert_eq!(report.r_group_expanded, vec!["R".to_string()]);
        assert!(report.updated_species.contains("acyl"));

        let acyl = model.get_metabolite("acyl").unwrap();
        assert_eq!(acyl.notes[NON_SPECIFIC_FORMULA], "C2H3O2R");
        let formula = Formula::parse(acyl.formula.as_deref().unwrap()).unwrap();
        assert_eq!(formula, Formula::parse("C5H10O2").unwrap());
        assert_eq!(formula.get(R_GROUP), 0);
    }

    #[test]
    fn expansion_balancing_without_solving_is_persisted() {
        let mut model = Model::new_empty();
        add_species(&mut model, "a", Some("CR"));
        add_species(&mut model, "b", Some("C2H3"));
        add_reaction(&mut model, "R", "a", "b");

        let report = run(&mut model, &MethyleneChainExpansion::default());
        assert_eq!(report.balanced, vec!["R".to_string()]);
        assert_eq!(report.r_group_expanded, vec!["R".to_string()]);
        assert!(report.updated_species.contains("a"));

        let a = model.get_metabolite("a").unwrap();
        assert_eq!(a.notes[NON_SPECIFIC_FORMULA], "CR");
        let formula = Formula::parse(a.formula.as_deref().unwrap()).unwrap();
        assert_eq!(formula.get(R_GROUP), 0);
        assert_eq!(formula.get("C"), 2);
        assert_eq!(formula.get("H"), 3);

        // The stored formula keeps the reaction balanced on the next pass
        let report = run(&mut model, &MethyleneChainExpansion::default());
        assert_eq!(report.balanced, vec!["R".to_string()]);
        assert!(report.r_group_expanded.is_empty());
        assert!(report.updated_species.is_empty());
    }

    #[test]
    fn malformed_formula_does_not_stop_the_pass() {
        let mut model = Model::new_empty();
        add_species(&mut model, "a", Some("C"));
        add_species(&mut model, "b", Some("C"));
        add_species(&mut model, "bad", Some("C2)H"));
        add_species(&mut model, "huge", Some("C9223372036854775807C"));
        add_reaction(&mut model, "first", "a", "b");
        add_reaction(&mut model, "broken", "bad", "b");
        add_reaction(&mut model, "overflowing", "huge", "a");
        add_reaction(&mut model, "last", "b", "a");

        let report = run(&mut model, &KeepRGroups);
        assert_eq!(report.balanced, vec!["first".to_string(), "last".to_string()]);
        assert_eq!(report.unbalanced.len(), 2);
        for (unbalanced, species_id) in report.unbalanced.iter().zip(["bad", "huge"]) {
            assert!(unbalanced.residual.is_none());
            let failure = unbalanced.failure.as_deref().unwrap();
            assert!(failure.contains("INVALID FORMULA"));
            assert!(failure.contains(species_id));
            assert_eq!(report.problematic.get(species_id), Some(&1));
        }
        assert_eq!(report.problematic.get("a"), None);
        assert_eq!(report.problematic.get("b"), None);
        assert_eq!(model.get_metabolite("bad").unwrap().formula.as_deref(), Some("C2)H"));
    }

    #[test]
    fn failed_expansion_is_not_persisted() {
        let mut model = Model::new_empty();
        add_species(&mut model, "acyl", Some("C2H3O2R"));
        add_species(&mut model, "amine", Some("CH5N"));
        add_reaction(&mut model, "R", "acyl", "amine");

        let report = run(&mut model, &MethyleneChainExpansion::default());
        assert_eq!(report.unbalanced.len(), 1);
        assert!(report.r_group_expanded.is_empty());
        let acyl = model.get_metabolite("acyl").unwrap();
        assert_eq!(acyl.formula.as_deref(), Some("C2H3O2R"));
        assert!(acyl.notes.is_empty());
    }

    #[test]
    fn cancelled_before_first_reaction() {
        let mut model = Model::new_empty();
        add_species(&mut model, "a", Some("C"));
        add_species(&mut model, "b", Some("C2"));
        add_reaction(&mut model, "R", "a", "b");
        let before = model.clone();
        let cofactors = CofactorSet::default();
        let solver = MicrolpSolver::new(Duration::from_secs(10));
        let cancel = AtomicBool::new(true);
        let pass = BalancePass {
            cofactors: &cofactors,
            solver: &solver,
            r_group_policy: &KeepRGroups,
            options: BalanceOptions::default(),
            cancel: Some(&cancel),
        };
        match pass.run(&mut model, 3) {
            Err(CleanupError::Cancelled { passes }) => assert_eq!(passes, 2),
            _ => panic!("Expected the pass to be cancelled"),
        }
        assert_eq!(model, before);
    }
}
