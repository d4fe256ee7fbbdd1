use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::env::Env;
use crate::ast::node::{Ident, Node, Params};
use crate::lexer::token::TokenId;
use crate::number::Number;

/// Identity of a user function, used by the profiler to track tiers.
/// It is the arena id of the `def`/`fn` token that introduced it.
pub type FunctionId = TokenId;

#[derive(Clone)]
pub enum RuntimeValue {
    Nil,
    Bool(bool),
    Number(Number),
    String(String),
    List(Rc<RefCell<Vec<RuntimeValue>>>),
    Map(Rc<RefCell<FxHashMap<String, RuntimeValue>>>),
    Function(Params, Rc<Node>, Rc<RefCell<Env>>, FunctionId),
    NativeFunction(Ident),
    Some(Box<RuntimeValue>),
    None,
    Ok(Box<RuntimeValue>),
    Err(Box<RuntimeValue>),
    Error(Rc<ErrorValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Type,
    Name,
    Division,
    Value,
    Parse,
    Import,
    UserDefined(SmolStr),
}

impl ErrorKind {
    pub fn name(&self) -> &str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Name => "NameError",
            ErrorKind::Division => "DivisionError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Import => "ImportError",
            ErrorKind::UserDefined(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "TypeError" => ErrorKind::Type,
            "NameError" => ErrorKind::Name,
            "DivisionError" => ErrorKind::Division,
            "ValueError" => ErrorKind::Value,
            "ParseError" => ErrorKind::Parse,
            "ImportError" => ErrorKind::Import,
            _ => ErrorKind::UserDefined(SmolStr::new(name)),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    pub payload: Option<RuntimeValue>,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: Option::None,
        }
    }

    pub fn with_payload(kind: ErrorKind, message: impl Into<String>, payload: RuntimeValue) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: Some(payload),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl RuntimeValue {
    pub const TRUE: RuntimeValue = RuntimeValue::Bool(true);
    pub const FALSE: RuntimeValue = RuntimeValue::Bool(false);

    pub fn is_truthy(&self) -> bool {
        !matches!(
            self,
            RuntimeValue::Bool(false) | RuntimeValue::Nil | RuntimeValue::None
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Nil => "nil",
            RuntimeValue::Bool(_) => "bool",
            RuntimeValue::Number(_) => "number",
            RuntimeValue::String(_) => "string",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Map(_) => "map",
            RuntimeValue::Function(..) | RuntimeValue::NativeFunction(_) => "function",
            RuntimeValue::Some(_) | RuntimeValue::None => "option",
            RuntimeValue::Ok(_) | RuntimeValue::Err(_) => "result",
            RuntimeValue::Error(_) => "error",
        }
    }

    pub fn list(values: Vec<RuntimeValue>) -> Self {
        RuntimeValue::List(Rc::new(RefCell::new(values)))
    }

    pub fn map(entries: FxHashMap<String, RuntimeValue>) -> Self {
        RuntimeValue::Map(Rc::new(RefCell::new(entries)))
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Nil, RuntimeValue::Nil) => true,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (RuntimeValue::Map(a), RuntimeValue::Map(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (RuntimeValue::Function(_, _, _, a), RuntimeValue::Function(_, _, _, b)) => a == b,
            (RuntimeValue::NativeFunction(a), RuntimeValue::NativeFunction(b)) => a == b,
            (RuntimeValue::Some(a), RuntimeValue::Some(b)) => a == b,
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::Ok(a), RuntimeValue::Ok(b)) => a == b,
            (RuntimeValue::Err(a), RuntimeValue::Err(b)) => a == b,
            (RuntimeValue::Error(a), RuntimeValue::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Nil => write!(f, "nil"),
            RuntimeValue::Bool(b) => write!(f, "{}", b),
            RuntimeValue::Number(n) => write!(f, "{}", n),
            RuntimeValue::String(s) => write!(f, "{}", s),
            RuntimeValue::List(values) => {
                write!(f, "[{}]", values.borrow().iter().join(", "))
            }
            RuntimeValue::Map(entries) => {
                let entries = entries.borrow();
                let body = entries
                    .iter()
                    .sorted_by(|(a, _), (b, _)| a.cmp(b))
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ");
                write!(f, "{{{}}}", body)
            }
            RuntimeValue::Function(params, _, _, _) => write!(f, "function/{}", params.len()),
            RuntimeValue::NativeFunction(name) => write!(f, "native function {}", name),
            RuntimeValue::Some(value) => write!(f, "Some({})", value),
            RuntimeValue::None => write!(f, "None"),
            RuntimeValue::Ok(value) => write!(f, "Ok({})", value),
            RuntimeValue::Err(value) => write!(f, "Err({})", value),
            RuntimeValue::Error(error) => write!(f, "{}", error),
        }
    }
}

impl fmt::Debug for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // closures hold their definition environment, which may in turn
            // contain the closure; never recurse into it
            RuntimeValue::Function(params, _, _, id) => {
                write!(f, "Function(/{} params, {:?})", params.len(), id)
            }
            RuntimeValue::NativeFunction(name) => write!(f, "NativeFunction({})", name),
            RuntimeValue::String(s) => write!(f, "String({:?})", s),
            other => write!(f, "{}", other),
        }
    }
}
