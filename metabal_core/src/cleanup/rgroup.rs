//! Substitution of unresolved R groups before balancing
use indexmap::IndexMap;
use log::debug;

use crate::chemistry::formula::{Formula, R_GROUP, R_GROUP_EXPANSION};
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, Side};

/// Decides which species of a reaction get their R groups replaced
pub trait RGroupPolicy {
    /// Formulas to balance the reaction with in place of the model's
    ///
    /// An empty map leaves the reaction as it is.
    fn overrides(&self, model: &Model, reaction: &Reaction) -> IndexMap<String, Formula>;
}

/// Replaces R groups with a variable length side chain, `CH3(CH2)n` by default
///
/// Applies when exactly one species of the reaction carries R groups, or exactly two
/// whose reactant and product R totals differ by one. Each species has its R count minus
/// the smaller side total replaced, so R groups present on both sides are left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct MethyleneChainExpansion {
    expansion: Formula,
}

impl MethyleneChainExpansion {
    pub fn new(expansion: Formula) -> Self {
        MethyleneChainExpansion { expansion }
    }

    pub fn expansion(&self) -> &Formula {
        &self.expansion
    }
}

impl Default for MethyleneChainExpansion {
    fn default() -> Self {
        MethyleneChainExpansion::new(Formula::parse(R_GROUP_EXPANSION).unwrap_or_default())
    }
}

impl RGroupPolicy for MethyleneChainExpansion {
    fn overrides(&self, model: &Model, reaction: &Reaction) -> IndexMap<String, Formula> {
        let mut reactant_total = 0;
        let mut product_total = 0;
        let mut carriers: IndexMap<String, (Formula, i64)> = IndexMap::new();
        for (side, reference) in reaction.participants() {
            let formula = match model
                .get_metabolite(&reference.species)
                .and_then(|m| m.formula.as_deref())
                .and_then(|f| Formula::parse(f).ok())
            {
                Some(formula) => formula,
                None => continue,
            };
            let count = formula.get(R_GROUP);
            if count <= 0 {
                continue;
            }
            match side {
                Side::Reactant => reactant_total += count,
                Side::Product => product_total += count,
            }
            carriers.insert(reference.species.clone(), (formula, count));
        }

        let applies = match carriers.len() {
            1 => true,
            2 => (reactant_total - product_total).abs() == 1,
            _ => false,
        };
        if !applies {
            return IndexMap::new();
        }
        let shared = reactant_total.min(product_total);
        let overrides: IndexMap<String, Formula> = carriers
            .into_iter()
            .filter(|(_, (_, count))| *count > shared)
            .map(|(id, (formula, count))| {
                let replaced = formula.replace_r_group(&self.expansion, count - shared);
                (id, replaced)
            })
            .collect();
        if !overrides.is_empty() {
            debug!(
                "Expanding R groups of {:?} in {}",
                overrides.keys().collect::<Vec<_>>(),
                reaction.id
            );
        }
        overrides
    }
}

/// Leaves R groups untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepRGroups;

impl RGroupPolicy for KeepRGroups {
    fn overrides(&self, _model: &Model, _reaction: &Reaction) -> IndexMap<String, Formula> {
        IndexMap::new()
    }
}
