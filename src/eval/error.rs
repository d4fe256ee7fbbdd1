use std::rc::Rc;

use thiserror::Error;

use super::runtime_value::{ErrorKind, ErrorValue, RuntimeValue};
use crate::ast::node::Ident;
use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum EvalError {
    /// A runtime error value travelling up the stack towards a matching
    /// `catch` or the top level. `trace` accumulates the names of the
    /// call frames it unwound through, innermost first.
    #[error("{error}")]
    Raised {
        token: Token,
        error: Rc<ErrorValue>,
        trace: Vec<Ident>,
    },
    /// `return` control flow, intercepted at the function call boundary.
    #[error("\"return\" outside of a function")]
    Return(RuntimeValue),
    #[error("Recursion limit of {0} exceeded")]
    RecursionError(u32),
}

impl EvalError {
    pub fn raise(token: &Token, kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError::Raised {
            token: token.clone(),
            error: Rc::new(ErrorValue::new(kind, message)),
            trace: Vec::new(),
        }
    }

    pub fn raise_error(token: &Token, error: Rc<ErrorValue>) -> Self {
        EvalError::Raised {
            token: token.clone(),
            error,
            trace: Vec::new(),
        }
    }

    pub fn type_error(token: &Token, message: impl Into<String>) -> Self {
        Self::raise(token, ErrorKind::Type, message)
    }

    pub fn name_error(token: &Token, name: &str) -> Self {
        Self::raise(token, ErrorKind::Name, format!("\"{}\" is not defined", name))
    }

    pub fn division_error(token: &Token) -> Self {
        Self::raise(token, ErrorKind::Division, "Division by zero")
    }

    pub fn value_error(token: &Token, message: impl Into<String>) -> Self {
        Self::raise(token, ErrorKind::Value, message)
    }

    pub fn import_error(token: &Token, message: impl Into<String>) -> Self {
        Self::raise(token, ErrorKind::Import, message)
    }

    /// Records `name` as a call frame the error unwound through.
    pub fn in_frame(self, name: &Ident) -> Self {
        match self {
            EvalError::Raised {
                token,
                error,
                mut trace,
            } => {
                trace.push(name.clone());
                EvalError::Raised {
                    token,
                    error,
                    trace,
                }
            }
            other => other,
        }
    }

    #[cold]
    pub fn token(&self) -> Option<&Token> {
        match self {
            EvalError::Raised { token, .. } => Some(token),
            EvalError::Return(_) => Option::None,
            EvalError::RecursionError(_) => Option::None,
        }
    }
}
