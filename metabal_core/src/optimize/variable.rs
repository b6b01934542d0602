//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

/// A column of an optimization problem
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Variable {
    /// Identifier, unique within a problem
    #[builder(setter(into))]
    pub id: String,
    /// Kind of values the variable may take
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    /// Smallest permitted value
    #[builder(default = "0.")]
    pub lower_bound: f64,
    /// Largest permitted value
    #[builder(default = "f64::INFINITY")]
    pub upper_bound: f64,
    /// Coefficient of the variable in the linear objective
    #[builder(default = "0.")]
    pub objective_coefficient: f64,
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.variable_type)
    }
}

/// Represents the type of variable in an optimization problem
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_and_display() {
        let variable = VariableBuilder::default()
            .id("x_0")
            .variable_type(VariableType::Integer)
            .build()
            .unwrap();
        assert_eq!(variable.lower_bound, 0.);
        assert!(variable.upper_bound.is_infinite());
        assert_eq!(variable.to_string(), "x_0:INTEGER");
    }
}
