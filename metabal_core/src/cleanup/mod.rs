//! Iterative cleanup of a whole model
//!
//! [`cleaner::ModelCleaner`] runs [`pass::BalancePass`] over every reaction until the model
//! stops changing, deleting species that only ever appear in one unbalanceable reaction.
use thiserror::Error;

use crate::balance::error::BalanceError;

pub mod cleaner;
pub mod pass;
pub mod report;
pub mod rgroup;

/// Errors that stop the cleanup loop
#[derive(Debug, Error)]
pub enum CleanupError {
    /// The model was still changing when the pass limit was reached
    #[error("Model cleanup did not converge after {passes} passes")]
    NotConverged { passes: usize },
    /// The cancel flag was raised, `passes` is the number of completed passes
    #[error("Model cleanup cancelled after {passes} passes")]
    Cancelled { passes: usize },
    /// A fault in the model or solver rather than in a single reaction
    #[error("Balancing failed: {0}")]
    Balance(#[from] BalanceError),
}
