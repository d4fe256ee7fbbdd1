use thiserror::Error;

use crate::eval::module::ModuleId;
use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseError {
    #[error("Unexpected token \"{0}\"")]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected(ModuleId),
    #[error("Expected {1}, found \"{0}\"")]
    ExpectedToken(Token, String),
    #[error("Expected a closing parenthesis")]
    ExpectedClosingParen(Token),
    #[error("Expected a closing brace")]
    ExpectedClosingBrace(Token),
    #[error("Expected a closing bracket")]
    ExpectedClosingBracket(Token),
}

impl ParseError {
    pub fn token(&self) -> Option<&Token> {
        match self {
            ParseError::UnexpectedToken(token) => Some(token),
            ParseError::UnexpectedEOFDetected(_) => None,
            ParseError::ExpectedToken(token, _) => Some(token),
            ParseError::ExpectedClosingParen(token) => Some(token),
            ParseError::ExpectedClosingBrace(token) => Some(token),
            ParseError::ExpectedClosingBracket(token) => Some(token),
        }
    }
}
