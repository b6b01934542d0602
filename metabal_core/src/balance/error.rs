//! Errors raised while balancing a reaction
use thiserror::Error;

use crate::chemistry::formula::FormulaError;
use crate::optimize::problem::ProblemError;
use crate::optimize::solvers::SolverError;

/// Errors that stop a reaction from being balanced at all
///
/// An infeasible reaction is not an error, see [`crate::balance::balancer::BalanceAttempt`].
#[derive(Debug, Error)]
pub enum BalanceError {
    /// A participating species has no formula
    #[error("MISSING FORMULA: {species_id}")]
    MissingFormula { species_id: String },
    /// A participating species has a formula that can't be parsed
    #[error("INVALID FORMULA: {species_id}: {source}")]
    InvalidFormula {
        species_id: String,
        source: FormulaError,
    },
    /// The reaction isn't in the model
    #[error("Reaction {0} is not in the model")]
    UnknownReaction(String),
    /// The reaction references a species that isn't in the model
    #[error("Species {0} is not in the model")]
    UnknownSpecies(String),
    /// The balancing problem could not be assembled
    #[error("Failed to assemble balancing problem: {0}")]
    Problem(#[from] ProblemError),
    /// The solver could not attempt the problem
    #[error("Solver failure: {0}")]
    Solver(#[from] SolverError),
}

impl BalanceError {
    /// Species blamed for the failure, if the failure is specific to one species
    pub fn species_id(&self) -> Option<&str> {
        match self {
            BalanceError::MissingFormula { species_id }
            | BalanceError::InvalidFormula { species_id, .. } => Some(species_id),
            _ => None,
        }
    }

    /// Whether the failure is confined to the reaction being balanced
    pub fn is_reaction_local(&self) -> bool {
        matches!(
            self,
            BalanceError::MissingFormula { .. } | BalanceError::InvalidFormula { .. }
        )
    }
}
