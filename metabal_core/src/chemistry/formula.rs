//! This module provides the Formula struct representing a molecular formula
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use thiserror::Error;

use crate::chemistry::formula_parse::{parse_formula, FormulaParseError};

/// Pseudo-element holding the net charge of a participant
pub const CHARGE: &str = "CHARGE";
/// Pseudo-element standing for an unresolved substituent
pub const R_GROUP: &str = "R";
/// Side chain substituted for an R group, a methyl group followed by a methylene chain
pub const R_GROUP_EXPANSION: &str = "CH3(CH2)n";

/// Molecular formula: element counts plus any repeating units
///
/// Equality ignores the order in which elements were written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Formula {
    /// Map of element symbol to count, zero counts are never stored
    elements: IndexMap<String, i64>,
    /// Units repeated a symbolic number of times, such as `(CH2)n`
    repeating_units: Vec<RepeatingUnit>,
}

/// A fragment of a formula repeated an unknown number of times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingUnit {
    /// The repeated fragment
    pub unit: Formula,
    /// Symbol used for the repeat count
    pub variable: String,
}

impl Formula {
    /// Create an empty formula
    pub fn new() -> Self {
        Formula::default()
    }

    /// Parse a formula string such as `C6H12O6` or `CH3(CH2)nCOOH`
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::chemistry::formula::Formula;
    /// let glucose = Formula::parse("C6H12O6").unwrap();
    /// assert_eq!(glucose.get("C"), 6);
    /// assert_eq!(glucose.get("N"), 0);
    /// ```
    pub fn parse(text: &str) -> Result<Formula, FormulaError> {
        Ok(parse_formula(text)?)
    }

    /// Count of `element` outside of repeating units
    pub fn get(&self, element: &str) -> i64 {
        self.elements.get(element).copied().unwrap_or(0)
    }

    /// Element counts outside of repeating units, in first-seen order
    pub fn element_counts(&self) -> &IndexMap<String, i64> {
        &self.elements
    }

    /// Repeating units in the order they were written
    pub fn repeating_units(&self) -> &[RepeatingUnit] {
        &self.repeating_units
    }

    pub fn has_repeating_units(&self) -> bool {
        !self.repeating_units.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.repeating_units.is_empty()
    }

    /// Copy of this formula carrying `charge` in the [`CHARGE`] pseudo-element
    pub fn with_charge(&self, charge: i32) -> Formula {
        let mut charged = self.clone();
        charged.elements.shift_remove(CHARGE);
        charged.add_element(CHARGE, charge as i64);
        charged
    }

    /// Value of the [`CHARGE`] pseudo-element, 0 when absent
    pub fn charge(&self) -> i32 {
        self.get(CHARGE) as i32
    }

    /// Replace every repeating unit with `multiplier` copies of its fragment
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::chemistry::formula::Formula;
    /// let chain = Formula::parse("CH3(CH2)n").unwrap();
    /// assert_eq!(chain.expand(3).to_string(), "C4H9");
    /// ```
    pub fn expand(&self, multiplier: u32) -> Formula {
        let multipliers = vec![multiplier; self.repeating_units.len()];
        self.expand_with(&multipliers)
    }

    /// Replace each repeating unit with its own multiplier, given in unit order
    pub fn expand_units(&self, multipliers: &[u32]) -> Result<Formula, FormulaError> {
        if multipliers.len() != self.repeating_units.len() {
            return Err(FormulaError::RepeatCountMismatch {
                expected: self.repeating_units.len(),
                found: multipliers.len(),
            });
        }
        Ok(self.expand_with(multipliers))
    }

    fn expand_with(&self, multipliers: &[u32]) -> Formula {
        let mut expanded = Formula {
            elements: self.elements.clone(),
            repeating_units: Vec::new(),
        };
        for (repeat, multiplier) in self.repeating_units.iter().zip(multipliers) {
            expanded.add_formula(&repeat.unit, *multiplier as i64);
        }
        expanded
    }

    /// Substitute `count` R groups with the `expansion` side chain
    ///
    /// At most as many R groups as the formula carries are replaced, and a non-positive
    /// count leaves the formula unchanged.
    pub fn replace_r_group(&self, expansion: &Formula, count: i64) -> Formula {
        let count = count.min(self.get(R_GROUP));
        if count <= 0 {
            return self.clone();
        }
        let mut replaced = self.clone();
        replaced.add_element(R_GROUP, -count);
        replaced.add_formula(expansion, count);
        replaced
    }

    /// Neutral form of a species with this formula and `charge`, by adding or removing
    /// hydrogens
    pub fn neutralise(&self, charge: i32) -> Result<Formula, FormulaError> {
        let mut neutral = self.clone();
        neutral.elements.shift_remove(CHARGE);
        let hydrogens = neutral.get("H") - charge as i64;
        if hydrogens < 0 {
            return Err(FormulaError::NegativeCount {
                element: "H".to_string(),
            });
        }
        neutral.elements.shift_remove("H");
        neutral.add_element("H", hydrogens);
        Ok(neutral)
    }

    /// Whether two charged formulae differ only in protonation state
    pub fn is_neutral_equivalent(&self, charge: i32, other: &Formula, other_charge: i32) -> bool {
        match (self.neutralise(charge), other.neutralise(other_charge)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    // region Building helpers
    /// Add `count` atoms of `element`, dropping the entry if it reaches zero
    ///
    /// Counts saturate at the bounds of `i64`.
    pub(crate) fn add_element(&mut self, element: &str, count: i64) {
        let total = self.get(element).saturating_add(count);
        self.set_element(element, total);
    }

    /// [`Formula::add_element`], or `None` if the count would overflow
    pub(crate) fn checked_add_element(&mut self, element: &str, count: i64) -> Option<()> {
        let total = self.get(element).checked_add(count)?;
        self.set_element(element, total);
        Some(())
    }

    fn set_element(&mut self, element: &str, total: i64) {
        if total == 0 {
            self.elements.shift_remove(element);
        } else {
            self.elements.insert(element.to_string(), total);
        }
    }

    pub(crate) fn push_repeating_unit(&mut self, unit: Formula, variable: String) {
        self.repeating_units.push(RepeatingUnit { unit, variable });
    }

    /// Add `times` copies of `other`, including its repeating units
    pub(crate) fn add_formula(&mut self, other: &Formula, times: i64) {
        for (element, count) in &other.elements {
            self.add_element(element, count.saturating_mul(times));
        }
        self.extend_repeating_units(other, times);
    }

    /// [`Formula::add_formula`], or `None` if any count would overflow
    pub(crate) fn checked_add_formula(&mut self, other: &Formula, times: i64) -> Option<()> {
        for (element, count) in &other.elements {
            self.checked_add_element(element, count.checked_mul(times)?)?;
        }
        self.extend_repeating_units(other, times);
        Some(())
    }

    fn extend_repeating_units(&mut self, other: &Formula, times: i64) {
        if other.repeating_units.is_empty() {
            return;
        }
        for _ in 0..times.max(0) {
            self.repeating_units.extend(other.repeating_units.iter().cloned());
        }
    }
    // endregion Building helpers
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (element, count) in &self.elements {
            if element == CHARGE {
                continue;
            }
            if *count == 1 {
                write!(f, "{}", element)?;
            } else {
                write!(f, "{}{}", element, count)?;
            }
        }
        for repeat in &self.repeating_units {
            write!(f, "({}){}", repeat.unit, repeat.variable)?;
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

/// Errors associated with formulae
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// The formula string could not be parsed
    #[error("Invalid formula: {0}")]
    Parse(#[from] FormulaParseError),
    /// Number of repeat counts differs from the number of repeating units
    #[error("Formula has {expected} repeating units but {found} counts were given")]
    RepeatCountMismatch { expected: usize, found: usize },
    /// An operation would leave a negative number of atoms
    #[error("Operation would leave a negative count of {element}")]
    NegativeCount { element: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_element_order() {
        let a = Formula::parse("C2H6O").unwrap();
        let b = Formula::parse("H6OC2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Formula::parse("C2H6").unwrap());
    }

    #[test]
    fn display_round_trips_repeating_units() {
        let formula = Formula::parse("CH3(CH2)nCOOH").unwrap();
        assert_eq!(formula.to_string(), "C2H4O2(CH2)n");
        assert_eq!(Formula::parse(&formula.to_string()).unwrap(), formula);
    }

    #[test]
    fn element_counts_exclude_repeating_units() {
        let formula = Formula::parse("(C)nH").unwrap();
        assert_eq!(formula.get("C"), 0);
        assert_eq!(formula.get("H"), 1);
        assert_eq!(formula.repeating_units().len(), 1);
        assert_eq!(formula.repeating_units()[0].unit.get("C"), 1);
    }

    #[test]
    fn expand_units_uses_separate_multipliers() {
        let formula = Formula::parse("(CH2)nO(NH)m").unwrap();
        let expanded = formula.expand_units(&[2, 3]).unwrap();
        assert_eq!(expanded.get("C"), 2);
        assert_eq!(expanded.get("H"), 7);
        assert_eq!(expanded.get("N"), 3);
        assert!(!expanded.has_repeating_units());
        match formula.expand_units(&[1]) {
            Err(FormulaError::RepeatCountMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            _ => panic!("Expected a repeat count mismatch"),
        }
    }

    #[test]
    fn expand_by_zero_removes_units() {
        let formula = Formula::parse("H2(CH2)n").unwrap();
        assert_eq!(formula.expand(0), Formula::parse("H2").unwrap());
    }

    #[test]
    fn replace_r_group_adds_side_chain() {
        let expansion = Formula::parse(R_GROUP_EXPANSION).unwrap();
        let formula = Formula::parse("C2H3O2R").unwrap();
        let replaced = formula.replace_r_group(&expansion, 1);
        assert_eq!(replaced.get(R_GROUP), 0);
        assert_eq!(replaced.get("C"), 3);
        assert_eq!(replaced.get("H"), 6);
        assert_eq!(replaced.repeating_units().len(), 1);

        // Never replaces more R groups than are present
        let over = formula.replace_r_group(&expansion, 4);
        assert_eq!(over, replaced);
        assert_eq!(formula.replace_r_group(&expansion, 0), formula);
    }

    #[test]
    fn charge_round_trip() {
        let formula = Formula::parse("C3H3O3").unwrap().with_charge(-1);
        assert_eq!(formula.charge(), -1);
        assert_eq!(formula.to_string(), "C3H3O3");
        assert_eq!(formula.with_charge(0).get(CHARGE), 0);
    }

    #[test]
    fn neutral_equivalence() {
        let pyruvate = Formula::parse("C3H3O3").unwrap();
        let pyruvic_acid = Formula::parse("C3H4O3").unwrap();
        assert!(pyruvate.is_neutral_equivalent(-1, &pyruvic_acid, 0));
        assert!(!pyruvate.is_neutral_equivalent(0, &pyruvic_acid, 0));
        match Formula::parse("O").unwrap().neutralise(1) {
            Err(FormulaError::NegativeCount { element }) => assert_eq!(element, "H"),
            _ => panic!("Expected negative hydrogen count"),
        }
    }
}
