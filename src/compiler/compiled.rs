use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::eval::Evaluator;
use crate::eval::env::Env;
use crate::eval::error::EvalError;
use crate::eval::runtime_value::RuntimeValue;

/// A compiled expression. Dispatch on the tree shape happens once at
/// compile time; what remains is a closure per node.
pub type CompiledExpr =
    Box<dyn Fn(&mut Evaluator, &Rc<RefCell<Env>>) -> Result<RuntimeValue, EvalError>>;

/// The compiled body of a hot user function. The closure chain borrows
/// the evaluator on every call, so compiled and interpreted frames can
/// interleave freely.
pub struct CompiledFunction {
    pub body: CompiledExpr,
}

impl CompiledFunction {
    pub fn new(body: CompiledExpr) -> Self {
        Self { body }
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledFunction")
    }
}
