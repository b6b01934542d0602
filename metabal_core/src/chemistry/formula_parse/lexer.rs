//! Lex a formula string into a series of tokens for later parsing

use std::collections::VecDeque;

use thiserror::Error;

use crate::chemistry::formula_parse::token::Token;

pub struct Lexer {
    source: Vec<char>,
    tokens: VecDeque<Token>,
    start: usize,
    current: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            tokens: VecDeque::new(),
            start: 0,
            current: 0,
        }
    }

    /// Convert the source into tokens, terminated by [`Token::Eof`]
    pub fn scan_tokens(mut self) -> Result<VecDeque<Token>, LexerError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push_back(Token::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c: char = self.advance();
        match c {
            '(' => self.add_token(Token::LeftParen),
            ')' => self.add_token(Token::RightParen),
            'A'..='Z' => self.read_element(),
            'a'..='z' => self.read_variable(),
            '0'..='9' => self.read_count()?,
            ' ' | '\r' | '\n' | '\t' => {}
            _ => {
                return Err(LexerError::InvalidCharacter {
                    character: c,
                    position: self.start,
                })
            }
        };
        Ok(())
    }

    fn advance(&mut self) -> char {
        let char_at_current = self.source[self.current];
        self.current += 1;
        char_at_current
    }

    fn read_element(&mut self) {
        while self.peek().is_ascii_lowercase() {
            self.advance();
        }
        let symbol = self.current_text();
        self.add_token(Token::Element(symbol));
    }

    fn read_variable(&mut self) {
        while self.peek().is_ascii_lowercase() {
            self.advance();
        }
        let variable = self.current_text();
        self.add_token(Token::Variable(variable));
    }

    fn read_count(&mut self) -> Result<(), LexerError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let text = self.current_text();
        match text.parse::<i64>() {
            Ok(count) => {
                self.add_token(Token::Count(count));
                Ok(())
            }
            Err(_) => Err(LexerError::CountOverflow {
                position: self.start,
            }),
        }
    }

    fn current_text(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        self.source[self.current]
    }

    fn add_token(&mut self, token: Token) {
        self.tokens.push_back(token);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

/// Errors raised while lexing a formula
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexerError {
    /// Character that can't appear in a formula
    #[error("Invalid character '{character}' at position {position}")]
    InvalidCharacter { character: char, position: usize },
    /// Count too large to represent
    #[error("Count starting at position {position} is too large")]
    CountOverflow { position: usize },
}
