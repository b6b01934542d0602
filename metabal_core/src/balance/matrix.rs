//! Element and charge coefficient matrix of a reaction
use indexmap::{IndexMap, IndexSet};
use nalgebra::{DMatrix, DVector};

use crate::chemistry::formula::{Formula, CHARGE};
use crate::metabolic_model::reaction::Side;

/// Signed element counts of every participant
///
/// Rows are elements in first-seen order followed by a [`CHARGE`] row, columns are
/// participants. Reactant counts are positive and product counts negative, so a
/// stoichiometry vector `s` balances the reaction when `matrix * s` is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientMatrix {
    elements: Vec<String>,
    matrix: DMatrix<f64>,
}

impl CoefficientMatrix {
    /// Row labels
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn num_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.matrix.ncols()
    }

    /// Element and charge imbalance of `stoichiometries`, omitting rows within `tolerance`
    /// of zero
    pub fn residual(&self, stoichiometries: &[f64], tolerance: f64) -> IndexMap<String, f64> {
        let product = &self.matrix * DVector::from_column_slice(stoichiometries);
        self.elements
            .iter()
            .zip(product.iter())
            .filter(|(_, value)| value.abs() > tolerance)
            .map(|(element, value)| (element.clone(), *value))
            .collect()
    }
}

/// Collects participant columns for a [`CoefficientMatrix`]
#[derive(Debug, Default)]
pub struct CoefficientMatrixBuilder {
    elements: IndexSet<String>,
    columns: Vec<Vec<(usize, f64)>>,
    charges: Vec<f64>,
}

impl CoefficientMatrixBuilder {
    pub fn new() -> Self {
        CoefficientMatrixBuilder::default()
    }

    /// Add a column for `formula` carrying `charge` on `side`, returning its index
    ///
    /// Any [`CHARGE`] entry in the formula itself is ignored.
    pub fn add_column(&mut self, formula: &Formula, charge: i32, side: Side) -> usize {
        let sign = side.sign();
        let mut column = Vec::new();
        for (element, count) in formula.element_counts() {
            if element == CHARGE {
                continue;
            }
            let (row, _) = self.elements.insert_full(element.clone());
            column.push((row, sign * *count as f64));
        }
        self.columns.push(column);
        self.charges.push(sign * charge as f64);
        self.columns.len() - 1
    }

    pub fn build(self) -> CoefficientMatrix {
        let charge_row = self.elements.len();
        let mut matrix = DMatrix::zeros(charge_row + 1, self.columns.len());
        for (column, entries) in self.columns.into_iter().enumerate() {
            for (row, value) in entries {
                matrix[(row, column)] += value;
            }
            matrix[(charge_row, column)] = self.charges[column];
        }
        let mut elements: Vec<String> = self.elements.into_iter().collect();
        elements.push(CHARGE.to_string());
        CoefficientMatrix { elements, matrix }
    }
}
