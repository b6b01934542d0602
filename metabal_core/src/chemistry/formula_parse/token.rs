//! Module providing Token struct for lexing molecular formulae

/// Represents Tokens in a molecular formula
#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub enum Token {
    /// Element symbol, an uppercase letter followed by any lowercase letters
    Element(String),
    /// Literal integer count
    Count(i64),
    /// Symbolic repeat count such as the `n` in `(CH2)n`
    Variable(String),
    LeftParen,
    RightParen,
    Eof,
}
