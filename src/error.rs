//! The public error type. Each layer reports through its own enum;
//! this wrapper pairs the cause with the offending source span so the
//! caller gets a rendered, pointed-at diagnostic.

use std::fmt;

use itertools::Itertools;
use miette::{Diagnostic, LabeledSpan, SourceCode, SourceOffset, SourceSpan};
use thiserror::Error;

use crate::ast::error::ParseError;
use crate::eval::error::EvalError;
use crate::eval::module::ModuleError;
use crate::lexer::error::LexerError;
use crate::range::Range;

#[derive(Error, Debug, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

impl InnerError {
    fn range(&self) -> Option<&Range> {
        match self {
            InnerError::Lexer(e) => Some(&e.token().range),
            InnerError::Parse(e) => e.token().map(|t| &t.range),
            InnerError::Eval(e) => e.token().map(|t| &t.range),
            InnerError::Module(_) => None,
        }
    }
}

#[derive(Error, Debug)]
#[error("{cause}")]
pub struct Error {
    pub cause: InnerError,
    source_code: String,
    location: Option<SourceSpan>,
}

impl Error {
    pub fn from_error(source: &str, cause: impl Into<InnerError>) -> Self {
        let cause = cause.into();
        let location = cause.range().map(|range| span_for(source, range));
        Self {
            cause,
            source_code: source.to_string(),
            location,
        }
    }
}

fn span_for(source: &str, range: &Range) -> SourceSpan {
    let start =
        SourceOffset::from_location(source, range.start.line as usize, range.start.column);
    let end = SourceOffset::from_location(source, range.end.line as usize, range.end.column);
    let len = end.offset().saturating_sub(start.offset()).max(1);
    SourceSpan::new(start, len)
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.cause {
            InnerError::Lexer(_) => "rabbit::lexer",
            InnerError::Parse(_) => "rabbit::parser",
            InnerError::Eval(_) => "rabbit::eval",
            InnerError::Module(_) => "rabbit::module",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match &self.cause {
            InnerError::Eval(EvalError::Raised { trace, .. }) if !trace.is_empty() => {
                Some(Box::new(format!(
                    "raised in {}",
                    trace.iter().join(", called from ")
                )))
            }
            InnerError::Eval(EvalError::RecursionError(_)) => Some(Box::new(
                "check for unbounded recursion or raise the call stack limit",
            )),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.location.map(|span| {
            Box::new(std::iter::once(LabeledSpan::new_with_span(
                Some("here".to_string()),
                span,
            ))) as Box<dyn Iterator<Item = LabeledSpan>>
        })
    }
}
