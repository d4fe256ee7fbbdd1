use thiserror::Error;

use super::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unterminated string literal")]
    UnterminatedString(Token),
    #[error("Invalid character '{1}'")]
    InvalidChar(Token, char),
    #[error("Invalid number literal \"{1}\"")]
    InvalidNumber(Token, String),
}

impl LexerError {
    pub fn token(&self) -> &Token {
        match self {
            LexerError::UnterminatedString(token) => token,
            LexerError::InvalidChar(token, _) => token,
            LexerError::InvalidNumber(token, _) => token,
        }
    }
}
