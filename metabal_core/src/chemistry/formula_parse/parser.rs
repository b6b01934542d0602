use crate::chemistry::formula::Formula;
use crate::chemistry::formula_parse::token::Token;

use thiserror::Error;
/*
Formula Grammar:
formula -> term* EOF ;
term -> ELEMENT COUNT? | "(" term+ ")" multiplier? ;
multiplier -> COUNT | VARIABLE ;

e.g. CH3(CH2)nCOOH or Fe2(SO4)3
 */

/// Formula Parser
pub struct FormulaParser {
    /// Vector of tokens from the formula string
    tokens: Vec<Token>,
    /// Current token being processed
    current: usize,
}

impl FormulaParser {
    /// Create a new FormulaParser
    pub fn new(mut tokens: Vec<Token>) -> FormulaParser {
        if tokens.last() != Some(&Token::Eof) {
            tokens.push(Token::Eof);
        }
        FormulaParser { tokens, current: 0 }
    }

    // region Parsing Functions

    /// Parse the token vector into a Formula
    pub fn parse(&mut self) -> Result<Formula, ParseError> {
        if self.is_at_end() {
            return Err(ParseError::EmptyFormula);
        }
        let formula = self.sequence(0)?;
        if !self.is_at_end() {
            // Only an unmatched ')' stops a top level sequence early
            return Err(ParseError::UnbalancedParenthesis);
        }
        Ok(formula)
    }

    /// Parse terms until a closing parenthesis or the end of input
    fn sequence(&mut self, depth: usize) -> Result<Formula, ParseError> {
        let mut formula = Formula::new();
        while !self.is_at_end() && !self.check(&Token::RightParen) {
            self.term(&mut formula, depth)?;
        }
        Ok(formula)
    }

    fn term(&mut self, formula: &mut Formula, depth: usize) -> Result<(), ParseError> {
        if let Some(symbol) = self.match_element() {
            let count = self.match_count().unwrap_or(1);
            formula
                .checked_add_element(&symbol, count)
                .ok_or(ParseError::CountOverflow)?;
            return Ok(());
        }

        if self.match_token(&Token::LeftParen) {
            let group = self.sequence(depth + 1)?;
            self.consume(&Token::RightParen)?;
            if group.is_empty() {
                return Err(ParseError::EmptyGroup);
            }
            if let Some(variable) = self.match_variable() {
                if depth > 0 || group.has_repeating_units() {
                    return Err(ParseError::NestedRepeatingUnit);
                }
                formula.push_repeating_unit(group, variable);
                return Ok(());
            }
            let count = self.match_count().unwrap_or(1);
            if group.has_repeating_units() && count != 1 {
                return Err(ParseError::NestedRepeatingUnit);
            }
            formula
                .checked_add_formula(&group, count)
                .ok_or(ParseError::CountOverflow)?;
            return Ok(());
        }

        Err(ParseError::UnexpectedToken(self.peek().clone()))
    }

    // endregion Parsing Functions

    // region parsing helper functions

    /// If the current token is `token` advance past it and return true
    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            return true;
        }
        false
    }

    fn match_element(&mut self) -> Option<String> {
        if let Token::Element(symbol) = self.peek() {
            let symbol = symbol.clone();
            self.advance();
            return Some(symbol);
        }
        None
    }

    fn match_count(&mut self) -> Option<i64> {
        if let Token::Count(count) = self.peek() {
            let count = *count;
            self.advance();
            return Some(count);
        }
        None
    }

    fn match_variable(&mut self) -> Option<String> {
        if let Token::Variable(variable) = self.peek() {
            let variable = variable.clone();
            self.advance();
            return Some(variable);
        }
        None
    }

    /// Check whether the current token matches the provided `token`
    fn check(&self, token: &Token) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek() == token
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek() == &Token::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    /// Advance past `token`, or fail if the current token is anything else
    fn consume(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.match_token(token) {
            return Ok(());
        }
        Err(ParseError::UnbalancedParenthesis)
    }

    // endregion parsing helper functions
}

/// Enum representing possible parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ParseError {
    /// The formula contained no tokens
    #[error("Formula is empty")]
    EmptyFormula,
    /// A parenthesised group contained nothing
    #[error("Empty parenthesised group")]
    EmptyGroup,
    /// Parentheses don't pair up
    #[error("Unbalanced parenthesis")]
    UnbalancedParenthesis,
    /// Repeating unit inside another group, or a multiplied group containing one
    #[error("Repeating units can't be nested")]
    NestedRepeatingUnit,
    /// Token that can't start a term, such as a leading count
    #[error("Unexpected token {0:?}")]
    UnexpectedToken(Token),
    /// An element count doesn't fit in an `i64` once repeats and multipliers are applied
    #[error("Element count overflows")]
    CountOverflow,
}
