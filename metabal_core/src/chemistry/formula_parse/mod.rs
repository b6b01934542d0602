//! Module for parsing molecular formula strings into Formula values

use crate::chemistry::formula::Formula;
use crate::chemistry::formula_parse::lexer::LexerError;
use crate::chemistry::formula_parse::parser::ParseError;
use thiserror::Error;

pub mod lexer;
pub mod parser;
pub mod token;

/// Parse a molecular formula string into a [`Formula`]
///
/// # Parameters
/// - `input`: &str holding the formula, e.g. `C6H12O6` or `CH3(CH2)nCOOH`
///
/// # Returns
/// Parse result which is
/// - `Ok`: The parsed Formula
/// - `Err`: The FormulaParseError describing the problem with the formula string
///
/// # Examples
/// ```rust
/// use metabal_core::chemistry::formula_parse::parse_formula;
/// let formula = parse_formula("CH3(CH2)nCOOH").unwrap();
/// assert_eq!(formula.get("O"), 2);
/// assert_eq!(formula.repeating_units().len(), 1);
/// ```
pub fn parse_formula(input: &str) -> Result<Formula, FormulaParseError> {
    let tokens = lexer::Lexer::new(input).scan_tokens()?;
    let mut parser = parser::FormulaParser::new(tokens.into_iter().collect());
    Ok(parser.parse()?)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaParseError {
    /// Lexing Error
    #[error("Error occurred during lexing of formula: {0}")]
    LexingError(#[from] LexerError),
    /// Parsing Error
    #[error("Error occurred during parsing of formula: {0}")]
    ParsingError(#[from] ParseError),
}
