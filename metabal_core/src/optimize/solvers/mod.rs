//! Solvers able to optimize a [`Problem`]
use thiserror::Error;

use crate::optimize::problem::Problem;
use crate::optimize::ProblemSolution;

pub mod microlp;

/// A solver session
///
/// Implementations hold no mutable state, so one session can serve any number of
/// sequential or concurrent solves.
pub trait Solver: Send + Sync {
    /// Name of the backend, used in log messages
    fn name(&self) -> &str;

    /// Whether integer and binary variables are honoured
    fn integer_variable_capable(&self) -> bool;

    /// Optimize `problem`
    ///
    /// Infeasible, unbounded, timed out and numerically failed solves are reported
    /// through [`ProblemSolution::status`], errors are reserved for problems the solver
    /// can't attempt.
    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError>;
}

/// Errors raised when a solve can't be attempted
#[derive(Debug, Error)]
pub enum SolverError {
    /// The problem contains integer variables but the solver is continuous only
    #[error("Solver {0} does not support integer variables")]
    IntegerVariablesUnsupported(String),
    /// The worker thread running the solve could not be started
    #[error("Failed to start solver worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
