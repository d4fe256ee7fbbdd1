use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

use crate::eval::runtime_value::RuntimeValue;
use crate::number::Number;

/// An owned, engine-independent result value. Unlike
/// [`RuntimeValue`], it holds no environments or shared cells, so it
/// can outlive the engine that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A function value, reported by arity only.
    Function(usize),
    Some(Box<Value>),
    None,
    Ok(Box<Value>),
    Err(Box<Value>),
    Error {
        kind: String,
        message: String,
    },
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl From<RuntimeValue> for Value {
    fn from(value: RuntimeValue) -> Self {
        match value {
            RuntimeValue::Nil => Value::Nil,
            RuntimeValue::Bool(b) => Value::Bool(b),
            RuntimeValue::Number(n) => Value::Number(n),
            RuntimeValue::String(s) => Value::String(s),
            RuntimeValue::List(values) => {
                Value::List(values.borrow().iter().cloned().map(Value::from).collect())
            }
            RuntimeValue::Map(entries) => Value::Map(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect(),
            ),
            RuntimeValue::Function(params, ..) => Value::Function(params.len()),
            RuntimeValue::NativeFunction(_) => Value::Function(0),
            RuntimeValue::Some(inner) => Value::Some(Box::new(Value::from(*inner))),
            RuntimeValue::None => Value::None,
            RuntimeValue::Ok(inner) => Value::Ok(Box::new(Value::from(*inner))),
            RuntimeValue::Err(inner) => Value::Err(Box::new(Value::from(*inner))),
            RuntimeValue::Error(error) => Value::Error {
                kind: error.kind.name().to_string(),
                message: error.message.clone(),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(values) => write!(f, "[{}]", values.iter().join(", ")),
            Value::Map(entries) => {
                let body = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ");
                write!(f, "{{{}}}", body)
            }
            Value::Function(arity) => write!(f, "function/{}", arity),
            Value::Some(value) => write!(f, "Some({})", value),
            Value::None => write!(f, "None"),
            Value::Ok(value) => write!(f, "Ok({})", value),
            Value::Err(value) => write!(f, "Err({})", value),
            Value::Error { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_runtime_value() {
        let list = RuntimeValue::list(vec![
            RuntimeValue::Number(Number::new(1.0)),
            RuntimeValue::Nil,
        ]);
        assert_eq!(
            Value::from(list),
            Value::List(vec![Value::Number(Number::new(1.0)), Value::Nil])
        );
    }

    #[test]
    fn test_display_sorts_map_keys() {
        let mut entries = BTreeMap::new();
        entries.insert("b".to_string(), Value::Number(Number::new(2.0)));
        entries.insert("a".to_string(), Value::Number(Number::new(1.0)));
        assert_eq!(Value::Map(entries).to_string(), "{a: 1, b: 2}");
    }
}
