//! Provides struct representing an optimization problem
use indexmap::IndexSet;
use nalgebra::DMatrix;
use thiserror::Error;

use crate::optimize::objective::ObjectiveSense;
use crate::optimize::variable::{Variable, VariableType};

/// A linear program with equality rows
///
/// Each row `i` requires `matrix.row(i) · x == row_bounds[i]`. Problems are immutable once
/// built, use [`ProblemBuilder`] or [`Problem::from_dense`] to create one.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Dense constraint matrix, one column per variable
    matrix: DMatrix<f64>,
    /// Right hand side of each equality row
    row_bounds: Vec<f64>,
    /// Variables of the optimization problem, in column order
    variables: Vec<Variable>,
    /// Sense of the objective
    sense: ObjectiveSense,
}

impl Problem {
    // region Creation Functions
    /// Create a minimization problem from dense data
    ///
    /// # Parameters
    /// - `matrix`: constraint matrix with one column per entry of `column_ids`
    /// - `column_ids`: unique variable ids
    /// - `column_kinds`: type of each variable
    /// - `row_bounds`: value each row must equal
    /// - `lower_bounds`, `upper_bounds`: bounds of each variable
    /// - `objective`: linear objective coefficient of each variable
    ///
    /// # Examples
    /// ```rust
    /// use nalgebra::DMatrix;
    /// use metabal_core::optimize::problem::Problem;
    /// use metabal_core::optimize::variable::VariableType;
    /// let problem = Problem::from_dense(
    ///     DMatrix::from_row_slice(1, 2, &[1., -1.]),
    ///     &["a".to_string(), "b".to_string()],
    ///     &[VariableType::Integer, VariableType::Integer],
    ///     &[0.],
    ///     &[1., 1.],
    ///     &[10., 10.],
    ///     &[1., 1.],
    /// ).unwrap();
    /// assert_eq!(problem.num_variables(), 2);
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn from_dense(
        matrix: DMatrix<f64>,
        column_ids: &[String],
        column_kinds: &[VariableType],
        row_bounds: &[f64],
        lower_bounds: &[f64],
        upper_bounds: &[f64],
        objective: &[f64],
    ) -> Result<Problem, ProblemError> {
        let columns = column_ids.len();
        if matrix.ncols() != columns
            || column_kinds.len() != columns
            || lower_bounds.len() != columns
            || upper_bounds.len() != columns
            || objective.len() != columns
            || row_bounds.len() != matrix.nrows()
        {
            return Err(ProblemError::DimensionMismatch);
        }
        let mut builder = ProblemBuilder::new(ObjectiveSense::Minimize);
        for (index, id) in column_ids.iter().enumerate() {
            builder.add_variable(
                id,
                column_kinds[index],
                lower_bounds[index],
                upper_bounds[index],
                objective[index],
            )?;
        }
        for (row, bound) in matrix.row_iter().zip(row_bounds) {
            let terms: Vec<(usize, f64)> = row
                .iter()
                .enumerate()
                .filter(|(_, coefficient)| **coefficient != 0.)
                .map(|(column, coefficient)| (column, *coefficient))
                .collect();
            builder.add_equality_row(&terms, *bound)?;
        }
        Ok(builder.build())
    }
    // endregion Creation Functions

    // region Accessors
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn row_bounds(&self) -> &[f64] {
        &self.row_bounds
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.row_bounds.len()
    }

    /// Objective coefficients in column order
    pub fn objective(&self) -> Vec<f64> {
        self.variables
            .iter()
            .map(|v| v.objective_coefficient)
            .collect()
    }
    // endregion Accessors

    // region Check Problem
    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .iter()
            .any(|v| v.variable_type != VariableType::Continuous)
    }

    pub fn problem_type(&self) -> ProblemType {
        if self.has_integer_variables() {
            ProblemType::LinearMixedInteger
        } else {
            ProblemType::LinearContinuous
        }
    }
    // endregion Check Problem
}

/// Incrementally assembles a [`Problem`]
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    sense: ObjectiveSense,
    variables: Vec<Variable>,
    variable_ids: IndexSet<String>,
    /// Sparse rows, converted to a dense matrix on build
    rows: Vec<(Vec<(usize, f64)>, f64)>,
}

impl ProblemBuilder {
    pub fn new(sense: ObjectiveSense) -> Self {
        ProblemBuilder {
            sense,
            variables: Vec::new(),
            variable_ids: IndexSet::new(),
            rows: Vec::new(),
        }
    }

    /// Add a variable, returning its column index
    pub fn add_variable(
        &mut self,
        id: &str,
        variable_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
        objective_coefficient: f64,
    ) -> Result<usize, ProblemError> {
        if self.variable_ids.contains(id) {
            return Err(ProblemError::VariableIdAlreadyExists(id.to_string()));
        }
        if lower_bound.is_nan() || upper_bound.is_nan() || lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds(id.to_string()));
        }
        self.variable_ids.insert(id.to_string());
        self.variables.push(Variable {
            id: id.to_string(),
            variable_type,
            lower_bound,
            upper_bound,
            objective_coefficient,
        });
        Ok(self.variables.len() - 1)
    }

    /// Add the row `Σ coefficient * x[column] == equals`
    pub fn add_equality_row(
        &mut self,
        terms: &[(usize, f64)],
        equals: f64,
    ) -> Result<usize, ProblemError> {
        if terms.iter().any(|(column, _)| *column >= self.variables.len()) {
            return Err(ProblemError::NonExistentVariablesInConstraint);
        }
        if !equals.is_finite() {
            return Err(ProblemError::InvalidConstraintBounds);
        }
        self.rows.push((terms.to_vec(), equals));
        Ok(self.rows.len() - 1)
    }

    pub fn build(self) -> Problem {
        let mut matrix = DMatrix::zeros(self.rows.len(), self.variables.len());
        let mut row_bounds = Vec::with_capacity(self.rows.len());
        for (row, (terms, equals)) in self.rows.into_iter().enumerate() {
            for (column, coefficient) in terms {
                matrix[(row, column)] += coefficient;
            }
            row_bounds.push(equals);
        }
        Problem {
            matrix,
            row_bounds,
            variables: self.variables,
            sense: self.sense,
        }
    }
}

/// Types of optimization problems
#[derive(Clone, Debug, PartialEq)]
pub enum ProblemType {
    /// Problem with linear objectives and constraints, and continuous variables
    LinearContinuous,
    /// Problem with linear objective and constraints, with integer and continuous variables
    LinearMixedInteger,
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add variable {0} with the same id as an existing variable")]
    VariableIdAlreadyExists(String),
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to add variable {0} with lower_bound>upper_bound")]
    InvalidVariableBounds(String),
    /// Error when trying to add a row whose bound isn't a finite number
    #[error("Tried to add a constraint with a non-finite bound")]
    InvalidConstraintBounds,
    /// Error when trying to add a constraint that contains variables not in the problem
    #[error("Tried to add a constraint with variables not in the problem")]
    NonExistentVariablesInConstraint,
    /// Error when dense inputs disagree on the number of rows or columns
    #[error("Dense problem inputs have inconsistent dimensions")]
    DimensionMismatch,
}
