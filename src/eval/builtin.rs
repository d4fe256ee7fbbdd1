//! Pre-registered builtin callables. All builtins share one ABI:
//! `fn(&mut Evaluator, &Token, &[RuntimeValue]) -> Result<RuntimeValue, EvalError>`;
//! the evaluator never branches on which builtin is being invoked, and
//! higher-order builtins use the evaluator to invoke their callable
//! arguments.

use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use super::Evaluator;
use super::error::EvalError;
use super::runtime_value::{ErrorKind, ErrorValue, RuntimeValue};
use crate::ast::node::Ident;
use crate::lexer::token::Token;
use crate::number::{self, Number};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    pub fn is_valid(&self, num_args: u8) -> bool {
        match self {
            ParamNum::None => num_args == 0,
            ParamNum::Fixed(n) => num_args == *n,
            ParamNum::Range(min, max) => num_args >= *min && num_args <= *max,
        }
    }
}

impl fmt::Display for ParamNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamNum::None => write!(f, "0"),
            ParamNum::Fixed(n) => write!(f, "{}", n),
            ParamNum::Range(min, max) => write!(f, "{} to {}", min, max),
        }
    }
}

type BuiltinFn =
    fn(&mut Evaluator, &Token, &[RuntimeValue]) -> Result<RuntimeValue, EvalError>;

pub struct BuiltinFunction {
    pub num_params: ParamNum,
    pub func: BuiltinFn,
}

fn invalid_types(token: &Token, name: &str, args: &[RuntimeValue]) -> EvalError {
    EvalError::type_error(
        token,
        format!(
            "\"{}\" is not callable with {}",
            name,
            args.iter().map(|a| a.type_name()).join(", ")
        ),
    )
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<&'static str, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map: FxHashMap<&'static str, BuiltinFunction> = FxHashMap::default();

        map.insert(
            "print",
            BuiltinFunction {
                num_params: ParamNum::Range(0, u8::MAX),
                func: |_, _, args| {
                    println!("{}", args.iter().map(|a| a.to_string()).join(" "));
                    Ok(RuntimeValue::Nil)
                },
            },
        );
        map.insert(
            "len",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s)] => {
                        Ok(RuntimeValue::Number(s.chars().count().into()))
                    }
                    [RuntimeValue::List(values)] => {
                        Ok(RuntimeValue::Number(values.borrow().len().into()))
                    }
                    [RuntimeValue::Map(entries)] => {
                        Ok(RuntimeValue::Number(entries.borrow().len().into()))
                    }
                    args => Err(invalid_types(token, "len", args)),
                },
            },
        );
        map.insert(
            "type",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, _, args| Ok(RuntimeValue::String(args[0].type_name().to_string())),
            },
        );
        map.insert(
            "str",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, _, args| Ok(RuntimeValue::String(args[0].to_string())),
            },
        );
        map.insert(
            "push",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values), value] => {
                        values.borrow_mut().push(value.clone());
                        Ok(RuntimeValue::Nil)
                    }
                    args => Err(invalid_types(token, "push", args)),
                },
            },
        );
        map.insert(
            "pop",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values)] => Ok(values
                        .borrow_mut()
                        .pop()
                        .map(|v| RuntimeValue::Some(Box::new(v)))
                        .unwrap_or(RuntimeValue::None)),
                    args => Err(invalid_types(token, "pop", args)),
                },
            },
        );
        map.insert(
            "get",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values), RuntimeValue::Number(index)] => {
                        Ok(usize::try_from(index.to_int())
                            .ok()
                            .and_then(|i| values.borrow().get(i).cloned())
                            .map(|v| RuntimeValue::Some(Box::new(v)))
                            .unwrap_or(RuntimeValue::None))
                    }
                    [RuntimeValue::Map(entries), RuntimeValue::String(key)] => Ok(entries
                        .borrow()
                        .get(key)
                        .map(|v| RuntimeValue::Some(Box::new(v.clone())))
                        .unwrap_or(RuntimeValue::None)),
                    args => Err(invalid_types(token, "get", args)),
                },
            },
        );
        map.insert(
            "set",
            BuiltinFunction {
                num_params: ParamNum::Fixed(3),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values), RuntimeValue::Number(index), value] => {
                        let mut values = values.borrow_mut();
                        let index = index.to_int();
                        if index < 0 || index as usize >= values.len() {
                            return Err(EvalError::value_error(
                                token,
                                format!("Index {} out of bounds", index),
                            ));
                        }
                        values[index as usize] = value.clone();
                        Ok(RuntimeValue::Nil)
                    }
                    [RuntimeValue::Map(entries), RuntimeValue::String(key), value] => {
                        entries.borrow_mut().insert(key.clone(), value.clone());
                        Ok(RuntimeValue::Nil)
                    }
                    args => Err(invalid_types(token, "set", args)),
                },
            },
        );
        map.insert(
            "keys",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Map(entries)] => Ok(RuntimeValue::list(
                        entries
                            .borrow()
                            .keys()
                            .sorted()
                            .map(|k| RuntimeValue::String(k.clone()))
                            .collect(),
                    )),
                    args => Err(invalid_types(token, "keys", args)),
                },
            },
        );
        map.insert(
            "values",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Map(entries)] => Ok(RuntimeValue::list(
                        entries
                            .borrow()
                            .iter()
                            .sorted_by(|(a, _), (b, _)| a.cmp(b))
                            .map(|(_, v)| v.clone())
                            .collect(),
                    )),
                    args => Err(invalid_types(token, "values", args)),
                },
            },
        );
        map.insert(
            "map",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |evaluator, token, args| match args {
                    [RuntimeValue::List(values), f] => {
                        let items = values.borrow().clone();
                        let mut mapped = Vec::with_capacity(items.len());
                        for item in items {
                            mapped.push(evaluator.call_callable(
                                token,
                                f.clone(),
                                vec![item],
                                None,
                            )?);
                        }
                        Ok(RuntimeValue::list(mapped))
                    }
                    args => Err(invalid_types(token, "map", args)),
                },
            },
        );
        map.insert(
            "filter",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |evaluator, token, args| match args {
                    [RuntimeValue::List(values), f] => {
                        let items = values.borrow().clone();
                        let mut kept = Vec::new();
                        for item in items {
                            let verdict = evaluator.call_callable(
                                token,
                                f.clone(),
                                vec![item.clone()],
                                None,
                            )?;
                            if verdict.is_truthy() {
                                kept.push(item);
                            }
                        }
                        Ok(RuntimeValue::list(kept))
                    }
                    args => Err(invalid_types(token, "filter", args)),
                },
            },
        );
        map.insert(
            "reduce",
            BuiltinFunction {
                num_params: ParamNum::Range(2, 3),
                func: |evaluator, token, args| {
                    let (values, f, init) = match args {
                        [RuntimeValue::List(values), f] => (values, f, None),
                        [RuntimeValue::List(values), f, init] => (values, f, Some(init.clone())),
                        args => return Err(invalid_types(token, "reduce", args)),
                    };
                    let mut items = values.borrow().clone().into_iter();
                    let mut acc = match init {
                        Some(init) => init,
                        None => items.next().ok_or_else(|| {
                            EvalError::value_error(
                                token,
                                "\"reduce\" of an empty list with no initial value",
                            )
                        })?,
                    };
                    for item in items {
                        acc = evaluator.call_callable(token, f.clone(), vec![acc, item], None)?;
                    }
                    Ok(acc)
                },
            },
        );
        map.insert(
            "split",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s), RuntimeValue::String(sep)] => Ok(RuntimeValue::list(
                        s.split(sep.as_str())
                            .map(|part| RuntimeValue::String(part.to_string()))
                            .collect(),
                    )),
                    args => Err(invalid_types(token, "split", args)),
                },
            },
        );
        map.insert(
            "join",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values), RuntimeValue::String(sep)] => {
                        Ok(RuntimeValue::String(
                            values.borrow().iter().map(|v| v.to_string()).join(sep),
                        ))
                    }
                    args => Err(invalid_types(token, "join", args)),
                },
            },
        );
        map.insert(
            "trim",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s)] => Ok(RuntimeValue::String(s.trim().to_string())),
                    args => Err(invalid_types(token, "trim", args)),
                },
            },
        );
        map.insert(
            "upper",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s)] => Ok(RuntimeValue::String(s.to_uppercase())),
                    args => Err(invalid_types(token, "upper", args)),
                },
            },
        );
        map.insert(
            "lower",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s)] => Ok(RuntimeValue::String(s.to_lowercase())),
                    args => Err(invalid_types(token, "lower", args)),
                },
            },
        );
        map.insert(
            "abs",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(n)] => Ok(RuntimeValue::Number(n.abs())),
                    args => Err(invalid_types(token, "abs", args)),
                },
            },
        );
        map.insert(
            "sqrt",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(n)] => {
                        Ok(RuntimeValue::Number(Number::new(n.value().sqrt())))
                    }
                    args => Err(invalid_types(token, "sqrt", args)),
                },
            },
        );
        map.insert(
            "pow",
            BuiltinFunction {
                num_params: ParamNum::Fixed(2),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(base), RuntimeValue::Number(exp)] => {
                        Ok(RuntimeValue::Number(base.pow(*exp)))
                    }
                    args => Err(invalid_types(token, "pow", args)),
                },
            },
        );
        map.insert(
            "sin",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(n)] => {
                        Ok(RuntimeValue::Number(Number::new(n.value().sin())))
                    }
                    args => Err(invalid_types(token, "sin", args)),
                },
            },
        );
        map.insert(
            "cos",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(n)] => {
                        Ok(RuntimeValue::Number(Number::new(n.value().cos())))
                    }
                    args => Err(invalid_types(token, "cos", args)),
                },
            },
        );
        map.insert(
            "tan",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::Number(n)] => {
                        Ok(RuntimeValue::Number(Number::new(n.value().tan())))
                    }
                    args => Err(invalid_types(token, "tan", args)),
                },
            },
        );
        map.insert(
            "min",
            BuiltinFunction {
                num_params: ParamNum::Range(1, u8::MAX),
                func: |_, token, args| fold_numbers(token, "min", args, |a, b| a.min(b)),
            },
        );
        map.insert(
            "max",
            BuiltinFunction {
                num_params: ParamNum::Range(1, u8::MAX),
                func: |_, token, args| fold_numbers(token, "max", args, |a, b| a.max(b)),
            },
        );
        map.insert(
            "sum",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values)] => {
                        let mut total = Number::default();
                        for value in values.borrow().iter() {
                            match value {
                                RuntimeValue::Number(n) => total = total + *n,
                                other => {
                                    return Err(EvalError::type_error(
                                        token,
                                        format!("\"sum\" expects numbers, got {}", other.type_name()),
                                    ));
                                }
                            }
                        }
                        Ok(RuntimeValue::Number(total))
                    }
                    args => Err(invalid_types(token, "sum", args)),
                },
            },
        );
        map.insert(
            "sort",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values)] => {
                        let values = values.borrow();
                        if values.iter().all(|v| matches!(v, RuntimeValue::Number(_))) {
                            let sorted = values
                                .iter()
                                .filter_map(|v| match v {
                                    RuntimeValue::Number(n) => Some(*n),
                                    _ => None,
                                })
                                .sorted()
                                .map(RuntimeValue::Number)
                                .collect();
                            Ok(RuntimeValue::list(sorted))
                        } else if values.iter().all(|v| matches!(v, RuntimeValue::String(_))) {
                            let sorted = values
                                .iter()
                                .filter_map(|v| match v {
                                    RuntimeValue::String(s) => Some(s.clone()),
                                    _ => None,
                                })
                                .sorted()
                                .map(RuntimeValue::String)
                                .collect();
                            Ok(RuntimeValue::list(sorted))
                        } else {
                            Err(EvalError::type_error(
                                token,
                                "\"sort\" expects a list of numbers or a list of strings",
                            ))
                        }
                    }
                    args => Err(invalid_types(token, "sort", args)),
                },
            },
        );
        map.insert(
            "reverse",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::List(values)] => Ok(RuntimeValue::list(
                        values.borrow().iter().rev().cloned().collect(),
                    )),
                    [RuntimeValue::String(s)] => {
                        Ok(RuntimeValue::String(s.chars().rev().collect()))
                    }
                    args => Err(invalid_types(token, "reverse", args)),
                },
            },
        );
        map.insert(
            "Some",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, _, args| Ok(RuntimeValue::Some(Box::new(args[0].clone()))),
            },
        );
        map.insert(
            "Ok",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, _, args| Ok(RuntimeValue::Ok(Box::new(args[0].clone()))),
            },
        );
        map.insert(
            "Err",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, _, args| Ok(RuntimeValue::Err(Box::new(args[0].clone()))),
            },
        );
        map.insert(
            "error",
            BuiltinFunction {
                num_params: ParamNum::Range(2, 3),
                func: |_, token, args| match args {
                    [RuntimeValue::String(kind), RuntimeValue::String(message)] => {
                        Ok(RuntimeValue::Error(Rc::new(ErrorValue::new(
                            ErrorKind::from_name(kind),
                            message.clone(),
                        ))))
                    }
                    [RuntimeValue::String(kind), RuntimeValue::String(message), payload] => {
                        Ok(RuntimeValue::Error(Rc::new(ErrorValue::with_payload(
                            ErrorKind::from_name(kind),
                            message.clone(),
                            payload.clone(),
                        ))))
                    }
                    args => Err(invalid_types(token, "error", args)),
                },
            },
        );
        map.insert(
            "json.parse",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| match args {
                    [RuntimeValue::String(s)] => serde_json::from_str::<serde_json::Value>(s)
                        .map(|value| from_json(&value))
                        .map_err(|e| {
                            EvalError::raise(token, ErrorKind::Parse, e.to_string())
                        }),
                    args => Err(invalid_types(token, "json.parse", args)),
                },
            },
        );
        map.insert(
            "json.stringify",
            BuiltinFunction {
                num_params: ParamNum::Fixed(1),
                func: |_, token, args| {
                    to_json(token, &args[0]).map(|v| RuntimeValue::String(v.to_string()))
                },
            },
        );

        map
    });

fn fold_numbers(
    token: &Token,
    name: &str,
    args: &[RuntimeValue],
    f: fn(Number, Number) -> Number,
) -> Result<RuntimeValue, EvalError> {
    let numbers: Vec<Number> = match args {
        [RuntimeValue::List(values)] => values
            .borrow()
            .iter()
            .map(|v| match v {
                RuntimeValue::Number(n) => Some(*n),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_types(token, name, args))?,
        args => args
            .iter()
            .map(|v| match v {
                RuntimeValue::Number(n) => Some(*n),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_types(token, name, args))?,
    };

    numbers
        .into_iter()
        .reduce(f)
        .map(RuntimeValue::Number)
        .ok_or_else(|| EvalError::value_error(token, format!("\"{}\" of an empty list", name)))
}

fn from_json(value: &serde_json::Value) -> RuntimeValue {
    match value {
        serde_json::Value::Null => RuntimeValue::Nil,
        serde_json::Value::Bool(b) => RuntimeValue::Bool(*b),
        serde_json::Value::Number(n) => {
            RuntimeValue::Number(Number::new(n.as_f64().unwrap_or(f64::NAN)))
        }
        serde_json::Value::String(s) => RuntimeValue::String(s.clone()),
        serde_json::Value::Array(values) => {
            RuntimeValue::list(values.iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => RuntimeValue::map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}

fn to_json(token: &Token, value: &RuntimeValue) -> Result<serde_json::Value, EvalError> {
    match value {
        RuntimeValue::Nil | RuntimeValue::None => Ok(serde_json::Value::Null),
        RuntimeValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        RuntimeValue::Number(n) => serde_json::Number::from_f64(n.value())
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                EvalError::value_error(token, "Cannot serialize a non-finite number")
            }),
        RuntimeValue::String(s) => Ok(serde_json::Value::String(s.clone())),
        RuntimeValue::List(values) => values
            .borrow()
            .iter()
            .map(|v| to_json(token, v))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        RuntimeValue::Map(entries) => entries
            .borrow()
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(k, v)| to_json(token, v).map(|v| (k.clone(), v)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(serde_json::Value::Object),
        RuntimeValue::Some(inner) | RuntimeValue::Ok(inner) => to_json(token, inner),
        other => Err(EvalError::type_error(
            token,
            format!("Cannot serialize a {} to JSON", other.type_name()),
        )),
    }
}

/// Process-wide registry lookup used as the last step of scope
/// resolution. Builtin callables resolve to `NativeFunction` values;
/// `pi`/`e`/`inf` and the `json` module table resolve directly.
pub fn lookup(name: &Ident) -> Option<RuntimeValue> {
    if BUILTIN_FUNCTIONS.contains_key(name.as_str()) {
        return Some(RuntimeValue::NativeFunction(name.clone()));
    }

    match name.as_str() {
        "pi" => Some(RuntimeValue::Number(Number::new(std::f64::consts::PI))),
        "e" => Some(RuntimeValue::Number(Number::new(std::f64::consts::E))),
        "inf" => Some(RuntimeValue::Number(number::INFINITE)),
        "json" => Some(json_module()),
        _ => None,
    }
}

pub(crate) fn json_module() -> RuntimeValue {
    let mut table = FxHashMap::default();
    table.insert(
        "parse".to_string(),
        RuntimeValue::NativeFunction(Ident::new("json.parse")),
    );
    table.insert(
        "stringify".to_string(),
        RuntimeValue::NativeFunction(Ident::new("json.stringify")),
    );
    RuntimeValue::map(table)
}

/// Dispatches a call to a registered builtin, checking arity first.
pub fn call(
    evaluator: &mut Evaluator,
    name: &str,
    token: &Token,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, EvalError> {
    let Some(builtin) = BUILTIN_FUNCTIONS.get(name) else {
        return Err(EvalError::name_error(token, name));
    };

    if !builtin.num_params.is_valid(args.len().min(u8::MAX as usize) as u8) {
        return Err(EvalError::type_error(
            token,
            format!(
                "\"{}\" expects {} arguments, got {}",
                name, builtin.num_params, args.len()
            ),
        ));
    }

    (builtin.func)(evaluator, token, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenArena;
    use crate::arena::Arena;
    use crate::eval::Options;
    use crate::eval::module::{ModuleId, ModuleLoader};
    use crate::range::Range;
    use rstest::rstest;
    use std::cell::RefCell;

    fn token() -> Token {
        Token {
            range: Range::default(),
            kind: crate::lexer::token::TokenKind::Eof,
            module_id: ModuleId::new(0),
        }
    }

    fn evaluator() -> Evaluator {
        let token_arena: TokenArena = Rc::new(RefCell::new(Arena::new(8)));
        Evaluator::new(token_arena, ModuleLoader::default(), Options::default())
    }

    fn num(n: f64) -> RuntimeValue {
        RuntimeValue::Number(Number::new(n))
    }

    #[rstest]
    #[case("len", vec![RuntimeValue::String("héllo".into())], Ok(num(5.0)))]
    #[case("len", vec![RuntimeValue::list(vec![num(1.0), num(2.0)])], Ok(num(2.0)))]
    #[case("abs", vec![num(-3.0)], Ok(num(3.0)))]
    #[case("sqrt", vec![num(9.0)], Ok(num(3.0)))]
    #[case("pow", vec![num(2.0), num(10.0)], Ok(num(1024.0)))]
    #[case("min", vec![num(3.0), num(1.0), num(2.0)], Ok(num(1.0)))]
    #[case("max", vec![RuntimeValue::list(vec![num(3.0), num(7.0)])], Ok(num(7.0)))]
    #[case("sum", vec![RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)])], Ok(num(6.0)))]
    #[case("trim", vec![RuntimeValue::String("  a ".into())], Ok(RuntimeValue::String("a".into())))]
    #[case("upper", vec![RuntimeValue::String("ab".into())], Ok(RuntimeValue::String("AB".into())))]
    #[case("join", vec![RuntimeValue::list(vec![num(1.0), num(2.0)]), RuntimeValue::String("-".into())], Ok(RuntimeValue::String("1-2".into())))]
    #[case("Some", vec![num(1.0)], Ok(RuntimeValue::Some(Box::new(num(1.0)))))]
    fn test_builtin_call(
        #[case] name: &str,
        #[case] args: Vec<RuntimeValue>,
        #[case] expected: Result<RuntimeValue, EvalError>,
    ) {
        assert_eq!(call(&mut evaluator(), name, &token(), &args), expected);
    }

    #[test]
    fn test_arity_mismatch_is_type_error() {
        let result = call(&mut evaluator(), "len", &token(), &[]);
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Type
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let result = call(
            &mut evaluator(),
            "sqrt",
            &token(),
            &[RuntimeValue::String("x".into())],
        );
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Type
        ));
    }

    #[test]
    fn test_push_mutates_shared_list() {
        let list = RuntimeValue::list(vec![]);
        call(&mut evaluator(), "push", &token(), &[list.clone(), num(1.0)]).unwrap();
        call(&mut evaluator(), "push", &token(), &[list.clone(), num(2.0)]).unwrap();

        assert_eq!(list, RuntimeValue::list(vec![num(1.0), num(2.0)]));
    }

    #[test]
    fn test_pop_returns_option() {
        let list = RuntimeValue::list(vec![num(1.0)]);
        assert_eq!(
            call(&mut evaluator(), "pop", &token(), &[list.clone()]),
            Ok(RuntimeValue::Some(Box::new(num(1.0))))
        );
        assert_eq!(
            call(&mut evaluator(), "pop", &token(), &[list]),
            Ok(RuntimeValue::None)
        );
    }

    #[test]
    fn test_map_invokes_its_callable_argument() {
        let list = RuntimeValue::list(vec![num(-1.0), num(2.0), num(-3.0)]);
        let f = RuntimeValue::NativeFunction(Ident::new("abs"));
        assert_eq!(
            call(&mut evaluator(), "map", &token(), &[list, f]),
            Ok(RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)]))
        );
    }

    #[test]
    fn test_reduce_folds_pairwise() {
        let list = RuntimeValue::list(vec![num(3.0), num(1.0), num(2.0)]);
        let f = RuntimeValue::NativeFunction(Ident::new("min"));
        assert_eq!(
            call(&mut evaluator(), "reduce", &token(), &[list, f]),
            Ok(num(1.0))
        );
    }

    #[test]
    fn test_reduce_of_empty_list_without_init_raises() {
        let list = RuntimeValue::list(vec![]);
        let f = RuntimeValue::NativeFunction(Ident::new("min"));
        let result = call(&mut evaluator(), "reduce", &token(), &[list, f]);
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Value
        ));
    }

    #[test]
    fn test_json_parse_roundtrip() {
        let parsed = call(
            &mut evaluator(),
            "json.parse",
            &token(),
            &[RuntimeValue::String("{\"a\": [1, true, null]}".into())],
        )
        .unwrap();

        let RuntimeValue::Map(entries) = &parsed else {
            panic!("expected a map, got {:?}", parsed);
        };
        assert_eq!(
            entries.borrow().get("a"),
            Some(&RuntimeValue::list(vec![
                num(1.0),
                RuntimeValue::Bool(true),
                RuntimeValue::Nil
            ]))
        );

        let text = call(&mut evaluator(), "json.stringify", &token(), &[parsed]).unwrap();
        assert_eq!(
            text,
            RuntimeValue::String("{\"a\":[1.0,true,null]}".into())
        );
    }

    #[test]
    fn test_json_parse_error_is_catchable_parse_kind() {
        let result = call(
            &mut evaluator(),
            "json.parse",
            &token(),
            &[RuntimeValue::String("{not json".into())],
        );
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Parse
        ));
    }

    #[test]
    fn test_lookup_constants_and_module() {
        assert_eq!(
            lookup(&Ident::new("pi")),
            Some(RuntimeValue::Number(Number::new(std::f64::consts::PI)))
        );
        assert!(matches!(lookup(&Ident::new("json")), Some(RuntimeValue::Map(_))));
        assert!(matches!(
            lookup(&Ident::new("print")),
            Some(RuntimeValue::NativeFunction(_))
        ));
        assert_eq!(lookup(&Ident::new("nope")), None);
    }
}
