//! The structural-match primitive shared by `match` expressions and
//! `try`/`catch` kind filtering.

use smallvec::SmallVec;

use super::runtime_value::{ErrorKind, ErrorValue, RuntimeValue};
use crate::ast::node::{Ident, Literal, Pattern};

pub type Bindings = SmallVec<[(Ident, RuntimeValue); 1]>;

/// Compares `value` against `pattern`, returning the name bindings the
/// pattern introduces, or `None` when the shapes differ.
pub fn match_pattern(value: &RuntimeValue, pattern: &Pattern) -> Option<Bindings> {
    match (pattern, value) {
        (Pattern::Wildcard, _) => Some(Bindings::new()),
        (Pattern::Literal(literal), _) => {
            if literal_matches(literal, value) {
                Some(Bindings::new())
            } else {
                Option::None
            }
        }
        // range patterns apply to numbers only; any other value simply
        // does not match
        (
            Pattern::Range {
                start,
                end,
                inclusive,
            },
            RuntimeValue::Number(n),
        ) => {
            let in_range = if *inclusive {
                *n >= *start && *n <= *end
            } else {
                *n >= *start && *n < *end
            };
            if in_range { Some(Bindings::new()) } else { Option::None }
        }
        (Pattern::Range { .. }, _) => Option::None,
        (Pattern::Some(binding), RuntimeValue::Some(inner)) => {
            Some(SmallVec::from_buf([(binding.clone(), (**inner).clone())]))
        }
        (Pattern::None, RuntimeValue::None) => Some(Bindings::new()),
        (Pattern::Ok(binding), RuntimeValue::Ok(inner)) => {
            Some(SmallVec::from_buf([(binding.clone(), (**inner).clone())]))
        }
        (Pattern::Err(binding), RuntimeValue::Err(inner)) => {
            Some(SmallVec::from_buf([(binding.clone(), (**inner).clone())]))
        }
        _ => Option::None,
    }
}

fn literal_matches(literal: &Literal, value: &RuntimeValue) -> bool {
    match (literal, value) {
        (Literal::Nil, RuntimeValue::Nil) => true,
        (Literal::None, RuntimeValue::None) => true,
        (Literal::Bool(a), RuntimeValue::Bool(b)) => a == b,
        (Literal::Number(a), RuntimeValue::Number(b)) => a == b,
        (Literal::String(a), RuntimeValue::String(b)) => a == b,
        _ => false,
    }
}

/// `catch` filtering: no filter catches everything, otherwise the error
/// kind must match the filter name exactly.
pub fn error_matches(error: &ErrorValue, filter: Option<&Ident>) -> bool {
    match filter {
        Option::None => true,
        Some(name) => error.kind == ErrorKind::from_name(name),
    }
}
