//! Mixed integer solver backed by the microlp crate
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::{debug, warn};

use crate::configuration;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::variable::VariableType;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Rows with no coefficients must have a bound within this of zero
const EMPTY_ROW_TOLERANCE: f64 = 1e-9;

/// Most timed out workers left running at once, across every session
pub const MAX_DETACHED_WORKERS: usize = 4;

static DETACHED: DetachedWorkers = DetachedWorkers {
    count: Mutex::new(0),
    finished: Condvar::new(),
};

/// Count of workers still running after their solve timed out
struct DetachedWorkers {
    count: Mutex<usize>,
    finished: Condvar,
}

impl DetachedWorkers {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the count to drop below the limit
    fn wait_for_capacity(&self, timeout: Duration) -> bool {
        let count = self.lock();
        let (count, _) = self
            .finished
            .wait_timeout_while(count, timeout, |count| *count >= MAX_DETACHED_WORKERS)
            .unwrap_or_else(PoisonError::into_inner);
        *count < MAX_DETACHED_WORKERS
    }

    /// Called by the worker when its solve returns
    fn finish(&self, job: &Job) {
        let mut count = self.lock();
        job.finished.store(true, Ordering::Relaxed);
        if job.detached.load(Ordering::Relaxed) {
            *count = count.saturating_sub(1);
            self.finished.notify_all();
        }
    }

    /// Called by the session when it stops waiting on the worker
    fn detach(&self, job: &Job) {
        let mut count = self.lock();
        if !job.finished.load(Ordering::Relaxed) {
            job.detached.store(true, Ordering::Relaxed);
            *count += 1;
        }
    }
}

/// Flags of one worker, only changed while [`DETACHED`] is locked
#[derive(Default)]
struct Job {
    finished: AtomicBool,
    detached: AtomicBool,
}

/// Number of timed out solves whose worker thread hasn't returned yet
pub fn detached_workers() -> usize {
    *DETACHED.lock()
}

/// Solver session running microlp's branch and bound under a wall clock limit
///
/// Every solve runs on its own worker thread. When the limit is hit the worker is
/// detached and the solve is reported as [`OptimizationStatus::SolverHalted`]. While
/// [`MAX_DETACHED_WORKERS`] detached workers are still running, new solves wait for one
/// of them within their own limit and are halted without starting otherwise.
#[derive(Debug, Clone)]
pub struct MicrolpSolver {
    timeout: Duration,
}

impl MicrolpSolver {
    pub fn new(timeout: Duration) -> Self {
        MicrolpSolver { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for MicrolpSolver {
    /// Session using the configured solver timeout
    fn default() -> Self {
        MicrolpSolver::new(Duration::from_millis(configuration::current().solver_timeout_ms))
    }
}

impl Solver for MicrolpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn integer_variable_capable(&self) -> bool {
        true
    }

    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        let deadline = Instant::now() + self.timeout;
        if !DETACHED.wait_for_capacity(self.timeout) {
            warn!(
                "{} timed out microlp solves still running, not starting another",
                MAX_DETACHED_WORKERS
            );
            return Ok(ProblemSolution::unsolved(OptimizationStatus::SolverHalted));
        }

        let (sender, receiver) = mpsc::channel();
        let owned = problem.clone();
        let job = Arc::new(Job::default());
        let worker_job = Arc::clone(&job);
        thread::Builder::new()
            .name("microlp-solve".to_string())
            .spawn(move || {
                let result = solve_problem(&owned);
                DETACHED.finish(&worker_job);
                // The receiver is gone if the solve timed out
                let _ = sender.send(result);
            })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let solution = match receiver.recv_timeout(remaining) {
            Ok(Ok((objective_value, values))) => ProblemSolution {
                status: OptimizationStatus::Optimal,
                objective_value: Some(objective_value),
                variable_values: Some(
                    problem
                        .variables()
                        .iter()
                        .map(|v| v.id.clone())
                        .zip(values)
                        .collect::<IndexMap<String, f64>>(),
                ),
            },
            Ok(Err(::microlp::Error::Infeasible)) => {
                ProblemSolution::unsolved(OptimizationStatus::Infeasible)
            }
            Ok(Err(::microlp::Error::Unbounded)) => {
                ProblemSolution::unsolved(OptimizationStatus::Unbounded)
            }
            Ok(Err(::microlp::Error::InternalError(message))) => {
                warn!("microlp failed internally: {}", message);
                ProblemSolution::unsolved(OptimizationStatus::NumericalError)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                DETACHED.detach(&job);
                warn!("microlp solve exceeded {:?}", self.timeout);
                ProblemSolution::unsolved(OptimizationStatus::SolverHalted)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("microlp worker stopped without reporting a result");
                ProblemSolution::unsolved(OptimizationStatus::NumericalError)
            }
        };
        debug!(
            "Solved {}x{} problem with status {:?}",
            problem.num_constraints(),
            problem.num_variables(),
            solution.status
        );
        Ok(solution)
    }
}

/// Translate `problem` into microlp and solve it, returning the objective and column values
fn solve_problem(problem: &Problem) -> Result<(f64, Vec<f64>), ::microlp::Error> {
    let direction = match problem.sense() {
        ObjectiveSense::Minimize => ::microlp::OptimizationDirection::Minimize,
        ObjectiveSense::Maximize => ::microlp::OptimizationDirection::Maximize,
    };
    let mut lp = ::microlp::Problem::new(direction);

    let columns: Vec<::microlp::Variable> = problem
        .variables()
        .iter()
        .map(|variable| match variable.variable_type {
            VariableType::Continuous => lp.add_var(
                variable.objective_coefficient,
                (variable.lower_bound, variable.upper_bound),
            ),
            VariableType::Integer => lp.add_integer_var(
                variable.objective_coefficient,
                (
                    integer_bound(variable.lower_bound.ceil()),
                    integer_bound(variable.upper_bound.floor()),
                ),
            ),
            VariableType::Binary => lp.add_binary_var(variable.objective_coefficient),
        })
        .collect();

    for (row, bound) in problem.matrix().row_iter().zip(problem.row_bounds()) {
        let mut expression = ::microlp::LinearExpr::empty();
        let mut empty = true;
        for (column, coefficient) in row.iter().enumerate() {
            if *coefficient != 0. {
                expression.add(columns[column], *coefficient);
                empty = false;
            }
        }
        if empty {
            if bound.abs() > EMPTY_ROW_TOLERANCE {
                return Err(::microlp::Error::Infeasible);
            }
            continue;
        }
        lp.add_constraint(expression, ::microlp::ComparisonOp::Eq, *bound);
    }

    let solution = lp.solve()?;
    let values = columns
        .iter()
        .zip(problem.variables())
        .map(|(column, variable)| {
            let value = *solution.var_value(*column);
            match variable.variable_type {
                VariableType::Continuous => value,
                VariableType::Integer | VariableType::Binary => snap_to_integer(value),
            }
        })
        .collect();
    Ok((solution.objective(), values))
}

/// Clamp a whole-valued float to the i32 range microlp uses for integer bounds
fn integer_bound(value: f64) -> i32 {
    if value >= i32::MAX as f64 {
        i32::MAX
    } else if value <= i32::MIN as f64 {
        i32::MIN
    } else {
        value as i32
    }
}

/// Nearest whole number, never negative zero
fn snap_to_integer(value: f64) -> f64 {
    let rounded = value.round();
    if rounded == 0. {
        0.
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::problem::ProblemBuilder;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn solver() -> MicrolpSolver {
        MicrolpSolver::new(Duration::from_secs(5))
    }

    #[test]
    fn smallest_integer_solution() {
        // A + 2C = B + 2D, A, B, C >= 1, D >= 0
        let problem = Problem::from_dense(
            DMatrix::from_row_slice(1, 4, &[1., -1., 2., -2.]),
            &["A", "B", "C", "D"].map(String::from),
            &[VariableType::Integer; 4],
            &[0.],
            &[1., 1., 1., 0.],
            &[f64::INFINITY; 4],
            &[1.; 4],
        )
        .unwrap();
        let solution = solver().solve(&problem).unwrap();
        assert!(solution.is_optimal());
        assert_eq!(solution.values().unwrap(), vec![1., 1., 1., 1.]);
        assert_relative_eq!(solution.objective_value.unwrap(), 4.);
        let values = solution.variable_values.unwrap();
        assert_eq!(values.get_index(3).map(|(id, _)| id.as_str()), Some("D"));
    }

    #[test]
    fn continuous_deviation_columns() {
        // x + p - n = 3 with x fixed to 5 by a second row
        let mut builder = ProblemBuilder::new(ObjectiveSense::Minimize);
        let x = builder
            .add_variable("x", VariableType::Integer, 0., 10., 0.)
            .unwrap();
        let p = builder
            .add_variable("p", VariableType::Continuous, 0., f64::INFINITY, 1.)
            .unwrap();
        let n = builder
            .add_variable("n", VariableType::Continuous, 0., f64::INFINITY, 1.)
            .unwrap();
        builder.add_equality_row(&[(x, 1.)], 5.).unwrap();
        builder
            .add_equality_row(&[(x, 1.), (p, 1.), (n, -1.)], 3.)
            .unwrap();
        let solution = solver().solve(&builder.build()).unwrap();
        let values = solution.values().unwrap();
        assert_eq!(values[0], 5.);
        assert_relative_eq!(values[1], 0., epsilon = 1e-9);
        assert_relative_eq!(values[2], 2., epsilon = 1e-9);
    }

    #[test]
    fn infeasible_problem() {
        let mut builder = ProblemBuilder::new(ObjectiveSense::Minimize);
        let x = builder
            .add_variable("x", VariableType::Integer, 1., 3., 1.)
            .unwrap();
        builder.add_equality_row(&[(x, 2.)], 3.).unwrap();
        let solution = solver().solve(&builder.build()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.values().is_none());
    }

    #[test]
    fn empty_row_with_nonzero_bound_is_infeasible() {
        let mut builder = ProblemBuilder::new(ObjectiveSense::Minimize);
        builder
            .add_variable("x", VariableType::Continuous, 0., 1., 1.)
            .unwrap();
        builder.add_equality_row(&[], 1.).unwrap();
        let solution = solver().solve(&builder.build()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
    }

    #[test]
    fn timed_out_workers_are_bounded() {
        let problem = Problem::from_dense(
            DMatrix::from_row_slice(1, 4, &[3., -7., 5., -11.]),
            &["A", "B", "C", "D"].map(String::from),
            &[VariableType::Integer; 4],
            &[0.],
            &[1.; 4],
            &[f64::INFINITY; 4],
            &[1.; 4],
        )
        .unwrap();
        let impatient = MicrolpSolver::new(Duration::ZERO);
        for _ in 0..4 * MAX_DETACHED_WORKERS {
            let solution = impatient.solve(&problem).unwrap();
            assert!(matches!(
                solution.status,
                OptimizationStatus::SolverHalted | OptimizationStatus::Optimal
            ));
            assert!(detached_workers() <= MAX_DETACHED_WORKERS);
        }

        // A patient session still solves once the detached workers drain
        let solution = solver().solve(&problem).unwrap();
        assert!(solution.is_optimal());
        assert!(detached_workers() <= MAX_DETACHED_WORKERS);
    }

    #[test]
    fn bound_conversion() {
        assert_eq!(integer_bound(f64::INFINITY), i32::MAX);
        assert_eq!(integer_bound(f64::NEG_INFINITY), i32::MIN);
        assert_eq!(integer_bound(7.), 7);
        assert_eq!(snap_to_integer(-0.0000001).to_string(), "0");
        assert_eq!(snap_to_integer(3.9999999), 4.);
    }
}
