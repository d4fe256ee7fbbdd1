//! The tree-walking evaluator. Hot user functions are handed to the
//! closure compiler in [`crate::compiler`]; both tiers funnel through
//! the shared operator and call primitives defined here.

pub mod builtin;
pub mod env;
pub mod error;
pub mod module;
pub mod pattern;
pub mod runtime_value;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::TokenArena;
use crate::ast::Parser;
use crate::ast::node::{BinaryOp, Expr, Ident, Literal, Node, Program, UnaryOp};
use crate::compiler::Compiler;
use crate::compiler::profiler::Profiler;
use crate::lexer::Lexer;
use crate::lexer::token::{Token, TokenId, TokenKind};
use crate::number::Number;

use env::Env;
use error::EvalError;
use module::ModuleLoader;
use runtime_value::{ErrorKind, ErrorValue, RuntimeValue};

#[derive(Debug, Clone)]
pub struct Options {
    /// Each guest call frame costs several interpreter frames of native
    /// stack; the default keeps the guard ahead of a 2 MB thread stack.
    pub max_call_stack_depth: u32,
    /// Number of calls after which a function body is compiled.
    pub hot_call_threshold: u32,
    pub enable_jit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 48,
            hot_call_threshold: 32,
            enable_jit: true,
        }
    }
}

pub struct Evaluator {
    pub(crate) env: Rc<RefCell<Env>>,
    pub(crate) token_arena: TokenArena,
    pub(crate) module_loader: ModuleLoader,
    pub(crate) profiler: Profiler,
    pub(crate) options: Options,
    call_stack_depth: u32,
    loaded_modules: FxHashMap<Ident, RuntimeValue>,
}

impl Evaluator {
    pub fn new(token_arena: TokenArena, module_loader: ModuleLoader, options: Options) -> Self {
        let profiler = Profiler::new(options.hot_call_threshold);
        Self {
            env: Rc::new(RefCell::new(Env::default())),
            token_arena,
            module_loader,
            profiler,
            options,
            call_stack_depth: 0,
            loaded_modules: FxHashMap::default(),
        }
    }

    /// Evaluates a program in the top-level scope, returning the value
    /// of its last statement.
    pub fn eval(&mut self, program: &Program) -> Result<RuntimeValue, EvalError> {
        let env = Rc::clone(&self.env);
        let mut last = RuntimeValue::Nil;
        for node in program {
            last = self.eval_node(node, &env)?;
        }
        Ok(last)
    }

    pub(crate) fn token(&self, token_id: TokenId) -> Rc<Token> {
        Rc::clone(&self.token_arena.borrow()[token_id])
    }

    pub(crate) fn child_env(env: &Rc<RefCell<Env>>) -> Rc<RefCell<Env>> {
        Rc::new(RefCell::new(Env::with_parent(Rc::clone(env))))
    }

    pub(crate) fn eval_node(
        &mut self,
        node: &Rc<Node>,
        env: &Rc<RefCell<Env>>,
    ) -> Result<RuntimeValue, EvalError> {
        match &*node.expr {
            Expr::Literal(literal) => Ok(Self::literal_value(literal)),
            Expr::Ident(name) => env
                .borrow()
                .resolve(name)
                .map_err(|_| EvalError::name_error(&self.token(node.token_id), name)),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_node(item, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RuntimeValue::list(values))
            }
            Expr::BinaryOp(BinaryOp::And, lhs, rhs) => {
                if !self.eval_node(lhs, env)?.is_truthy() {
                    return Ok(RuntimeValue::FALSE);
                }
                Ok(RuntimeValue::Bool(self.eval_node(rhs, env)?.is_truthy()))
            }
            Expr::BinaryOp(BinaryOp::Or, lhs, rhs) => {
                if self.eval_node(lhs, env)?.is_truthy() {
                    return Ok(RuntimeValue::TRUE);
                }
                Ok(RuntimeValue::Bool(self.eval_node(rhs, env)?.is_truthy()))
            }
            Expr::BinaryOp(op, lhs, rhs) => {
                let lhs = self.eval_node(lhs, env)?;
                let rhs = self.eval_node(rhs, env)?;
                self.eval_binary_op(node.token_id, *op, lhs, rhs)
            }
            Expr::UnaryOp(op, operand) => {
                let value = self.eval_node(operand, env)?;
                self.eval_unary_op(node.token_id, *op, value)
            }
            Expr::Pow(base, exp) => {
                let base = self.eval_node(base, env)?;
                match base {
                    RuntimeValue::Number(n) => {
                        Ok(RuntimeValue::Number(n.pow(Number::from(*exp as i64))))
                    }
                    other => Err(EvalError::type_error(
                        &self.token(node.token_id),
                        format!("Cannot raise a {} to a power", other.type_name()),
                    )),
                }
            }
            Expr::Call(callee, args) => {
                if let Expr::Access(recv, name) = &*callee.expr {
                    let recv_value = self.eval_node(recv, env)?;
                    let arg_values = args
                        .iter()
                        .map(|arg| self.eval_node(arg, env))
                        .collect::<Result<Vec<_>, _>>()?;
                    return self.call_method(node.token_id, recv_value, name, arg_values, env);
                }

                let callee_name = match &*callee.expr {
                    Expr::Ident(name) => Some(name.clone()),
                    _ => Option::None,
                };
                let callee_value = self.eval_node(callee, env)?;
                let arg_values = args
                    .iter()
                    .map(|arg| self.eval_node(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_value(node.token_id, callee_value, arg_values, callee_name.as_ref())
            }
            Expr::Access(recv, name) => {
                let value = self.eval_node(recv, env)?;
                self.eval_access(node.token_id, value, name)
            }
            Expr::Index(recv, index) => {
                let value = self.eval_node(recv, env)?;
                let index = self.eval_node(index, env)?;
                self.eval_index(node.token_id, value, index)
            }
            Expr::If(branches) => {
                for (condition, body) in branches {
                    let taken = match condition {
                        Some(condition) => self.eval_node(condition, env)?.is_truthy(),
                        Option::None => true,
                    };
                    if taken {
                        return self.eval_node(body, &Self::child_env(env));
                    }
                }
                Ok(RuntimeValue::Nil)
            }
            Expr::Match(subject, arms) => {
                let value = self.eval_node(subject, env)?;
                for arm in arms {
                    if let Some(bindings) = pattern::match_pattern(&value, &arm.pattern) {
                        let arm_env = Self::child_env(env);
                        {
                            let mut arm_env = arm_env.borrow_mut();
                            for (ident, bound) in bindings {
                                arm_env.define(ident, bound);
                            }
                        }
                        return self.eval_node(&arm.body, &arm_env);
                    }
                }
                Err(EvalError::value_error(
                    &self.token(node.token_id),
                    format!("No pattern matched {}", value),
                ))
            }
            Expr::For(var, iterable, body) => {
                let iterable = self.eval_node(iterable, env)?;
                let items: Vec<RuntimeValue> = match iterable {
                    RuntimeValue::List(values) => values.borrow().clone(),
                    RuntimeValue::String(s) => s
                        .chars()
                        .map(|c| RuntimeValue::String(c.to_string()))
                        .collect(),
                    other => {
                        return Err(EvalError::type_error(
                            &self.token(node.token_id),
                            format!("Cannot iterate over a {}", other.type_name()),
                        ));
                    }
                };
                // each iteration binds the loop variable in its own
                // scope, so closures created in the body capture the
                // value of that iteration
                for item in items {
                    let iter_env = Self::child_env(env);
                    iter_env.borrow_mut().define(var.clone(), item);
                    self.eval_node(body, &iter_env)?;
                }
                Ok(RuntimeValue::Nil)
            }
            Expr::Def(name, params, body) => {
                let function = RuntimeValue::Function(
                    params.clone(),
                    Rc::clone(body),
                    Rc::clone(env),
                    node.token_id,
                );
                env.borrow_mut().define(name.clone(), function);
                Ok(RuntimeValue::Nil)
            }
            Expr::Fn(params, body) => Ok(RuntimeValue::Function(
                params.clone(),
                Rc::clone(body),
                Rc::clone(env),
                node.token_id,
            )),
            Expr::Assign(idents, exprs) => {
                let values = exprs
                    .iter()
                    .map(|expr| self.eval_node(expr, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.eval_assign(node.token_id, idents, values, env)
            }
            Expr::Try {
                body,
                kind,
                binding,
                catch,
            } => match self.eval_node(body, &Self::child_env(env)) {
                Err(EvalError::Raised { error, .. })
                    if pattern::error_matches(&error, kind.as_ref()) =>
                {
                    let catch_env = Self::child_env(env);
                    if let Some(binding) = binding {
                        catch_env
                            .borrow_mut()
                            .define(binding.clone(), RuntimeValue::Error(Rc::clone(&error)));
                    }
                    self.eval_node(catch, &catch_env)
                }
                other => other,
            },
            Expr::Throw(kind, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_node(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                let token = self.token(node.token_id);
                let error = match values.as_slice() {
                    [] => ErrorValue::new(ErrorKind::from_name(kind), ""),
                    [RuntimeValue::String(message)] => {
                        ErrorValue::new(ErrorKind::from_name(kind), message.clone())
                    }
                    [RuntimeValue::String(message), payload] => ErrorValue::with_payload(
                        ErrorKind::from_name(kind),
                        message.clone(),
                        payload.clone(),
                    ),
                    _ => {
                        return Err(EvalError::type_error(
                            &token,
                            "\"throw\" expects a message string and an optional payload",
                        ));
                    }
                };
                Err(EvalError::raise_error(&token, Rc::new(error)))
            }
            Expr::Use(name) => self.eval_use(node.token_id, name, env),
            Expr::Return(value) => {
                let value = match value {
                    Some(value) => self.eval_node(value, env)?,
                    Option::None => RuntimeValue::Nil,
                };
                Err(EvalError::Return(value))
            }
            Expr::Block(statements) => {
                let block_env = Self::child_env(env);
                let mut last = RuntimeValue::Nil;
                for statement in statements {
                    last = self.eval_node(statement, &block_env)?;
                }
                Ok(last)
            }
        }
    }

    pub(crate) fn literal_value(literal: &Literal) -> RuntimeValue {
        match literal {
            Literal::Nil => RuntimeValue::Nil,
            Literal::None => RuntimeValue::None,
            Literal::Bool(b) => RuntimeValue::Bool(*b),
            Literal::Number(n) => RuntimeValue::Number(*n),
            Literal::String(s) => RuntimeValue::String(s.clone()),
        }
    }

    pub(crate) fn eval_assign(
        &mut self,
        token_id: TokenId,
        idents: &[Ident],
        values: Vec<RuntimeValue>,
        env: &Rc<RefCell<Env>>,
    ) -> Result<RuntimeValue, EvalError> {
        let values = if idents.len() == values.len() {
            values
        } else if let [RuntimeValue::List(items)] = values.as_slice() {
            let items = items.borrow().clone();
            if items.len() != idents.len() {
                return Err(EvalError::value_error(
                    &self.token(token_id),
                    format!(
                        "Cannot unpack {} values into {} names",
                        items.len(),
                        idents.len()
                    ),
                ));
            }
            items
        } else {
            return Err(EvalError::value_error(
                &self.token(token_id),
                format!(
                    "Cannot unpack {} values into {} names",
                    values.len(),
                    idents.len()
                ),
            ));
        };

        for (ident, value) in idents.iter().zip(values) {
            let updated = env.borrow_mut().update(ident, value.clone());
            if !updated {
                env.borrow_mut().define(ident.clone(), value);
            }
        }
        Ok(RuntimeValue::Nil)
    }

    pub(crate) fn call_method(
        &mut self,
        token_id: TokenId,
        recv: RuntimeValue,
        name: &Ident,
        args: Vec<RuntimeValue>,
        env: &Rc<RefCell<Env>>,
    ) -> Result<RuntimeValue, EvalError> {
        // a matching map entry is a real member and receives the
        // arguments as-is; anything else is sugar for f(recv, args..)
        if let RuntimeValue::Map(entries) = &recv {
            let entry = entries.borrow().get(name.as_str()).cloned();
            if let Some(member) = entry {
                return self.call_value(token_id, member, args, Some(name));
            }
        }

        let function = env
            .borrow()
            .resolve(name)
            .map_err(|_| EvalError::name_error(&self.token(token_id), name))?;
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(recv);
        all_args.extend(args);
        self.call_value(token_id, function, all_args, Some(name))
    }

    pub(crate) fn call_value(
        &mut self,
        token_id: TokenId,
        callee: RuntimeValue,
        args: Vec<RuntimeValue>,
        name: Option<&Ident>,
    ) -> Result<RuntimeValue, EvalError> {
        let token = self.token(token_id);
        self.call_callable(&token, callee, args, name)
    }

    /// Call dispatch on an already-resolved token. Builtins re-enter
    /// evaluation through this path when invoking a callable argument.
    pub(crate) fn call_callable(
        &mut self,
        token: &Token,
        callee: RuntimeValue,
        args: Vec<RuntimeValue>,
        name: Option<&Ident>,
    ) -> Result<RuntimeValue, EvalError> {
        match callee {
            RuntimeValue::NativeFunction(native) => {
                builtin::call(self, native.as_str(), token, &args)
            }
            RuntimeValue::Function(params, body, closure_env, function_id) => {
                if params.len() != args.len() {
                    return Err(EvalError::type_error(
                        token,
                        format!(
                            "Function expects {} arguments, got {}",
                            params.len(),
                            args.len()
                        ),
                    ));
                }
                if self.call_stack_depth >= self.options.max_call_stack_depth {
                    return Err(EvalError::RecursionError(self.options.max_call_stack_depth));
                }

                let call_env = Self::child_env(&closure_env);
                {
                    let mut call_env = call_env.borrow_mut();
                    for (param, value) in params.iter().zip(args) {
                        call_env.define(param.clone(), value);
                    }
                }

                self.call_stack_depth += 1;
                let result = self.run_function_body(function_id, &body, &call_env);
                self.call_stack_depth -= 1;

                match result {
                    Err(EvalError::Return(value)) => Ok(value),
                    Err(err) => {
                        Err(err.in_frame(name.unwrap_or(&Ident::new_static("fn"))))
                    }
                    ok => ok,
                }
            }
            other => Err(EvalError::type_error(
                token,
                format!("A {} is not callable", other.type_name()),
            )),
        }
    }

    /// Runs a function body in the hottest available tier. A body that
    /// crosses the call threshold is compiled once; compilation failure
    /// pins the function to the interpreter.
    fn run_function_body(
        &mut self,
        function_id: TokenId,
        body: &Rc<Node>,
        env: &Rc<RefCell<Env>>,
    ) -> Result<RuntimeValue, EvalError> {
        if self.options.enable_jit {
            if let Some(compiled) = self.profiler.compiled(function_id) {
                return (compiled.body)(self, env);
            }
            if self.profiler.record_call(function_id) {
                match Compiler::new().compile(body) {
                    Ok(compiled) => {
                        let compiled = Rc::new(compiled);
                        self.profiler.promote(function_id, Rc::clone(&compiled));
                        return (compiled.body)(self, env);
                    }
                    Err(_) => self.profiler.decline(function_id),
                }
            }
        }
        self.eval_node(body, env)
    }

    pub(crate) fn eval_access(
        &self,
        token_id: TokenId,
        value: RuntimeValue,
        name: &Ident,
    ) -> Result<RuntimeValue, EvalError> {
        match &value {
            RuntimeValue::Map(entries) => Ok(entries
                .borrow()
                .get(name.as_str())
                .cloned()
                .unwrap_or(RuntimeValue::Nil)),
            RuntimeValue::Error(error) => match name.as_str() {
                "kind" => Ok(RuntimeValue::String(error.kind.name().to_string())),
                "message" => Ok(RuntimeValue::String(error.message.clone())),
                "payload" => Ok(error.payload.clone().unwrap_or(RuntimeValue::Nil)),
                _ => Err(EvalError::name_error(&self.token(token_id), name)),
            },
            other => Err(EvalError::type_error(
                &self.token(token_id),
                format!("Cannot access \"{}\" on a {}", name, other.type_name()),
            )),
        }
    }

    pub(crate) fn eval_index(
        &self,
        token_id: TokenId,
        value: RuntimeValue,
        index: RuntimeValue,
    ) -> Result<RuntimeValue, EvalError> {
        match (&value, &index) {
            (RuntimeValue::List(values), RuntimeValue::Number(n)) => {
                if !n.is_int() {
                    return Err(EvalError::type_error(
                        &self.token(token_id),
                        format!("Cannot index with non-integer {}", n),
                    ));
                }
                let values = values.borrow();
                let i = n.to_int();
                if i < 0 || i as usize >= values.len() {
                    return Err(EvalError::value_error(
                        &self.token(token_id),
                        format!("Index {} out of bounds for length {}", i, values.len()),
                    ));
                }
                Ok(values[i as usize].clone())
            }
            (RuntimeValue::String(s), RuntimeValue::Number(n)) => {
                if !n.is_int() {
                    return Err(EvalError::type_error(
                        &self.token(token_id),
                        format!("Cannot index with non-integer {}", n),
                    ));
                }
                let i = n.to_int();
                s.chars()
                    .nth(i.max(0) as usize)
                    .filter(|_| i >= 0)
                    .map(|c| RuntimeValue::String(c.to_string()))
                    .ok_or_else(|| {
                        EvalError::value_error(
                            &self.token(token_id),
                            format!("Index {} out of bounds for length {}", i, s.chars().count()),
                        )
                    })
            }
            (RuntimeValue::Map(entries), RuntimeValue::String(key)) => Ok(entries
                .borrow()
                .get(key)
                .cloned()
                .unwrap_or(RuntimeValue::Nil)),
            (recv, index) => Err(EvalError::type_error(
                &self.token(token_id),
                format!(
                    "Cannot index a {} with a {}",
                    recv.type_name(),
                    index.type_name()
                ),
            )),
        }
    }

    pub(crate) fn eval_binary_op(
        &self,
        token_id: TokenId,
        op: BinaryOp,
        lhs: RuntimeValue,
        rhs: RuntimeValue,
    ) -> Result<RuntimeValue, EvalError> {
        match op {
            BinaryOp::Add => match (lhs, rhs) {
                (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                    Ok(RuntimeValue::Number(a + b))
                }
                (RuntimeValue::String(a), RuntimeValue::String(b)) => {
                    Ok(RuntimeValue::String(a + &b))
                }
                (RuntimeValue::List(a), RuntimeValue::List(b)) => Ok(RuntimeValue::list(
                    a.borrow().iter().chain(b.borrow().iter()).cloned().collect(),
                )),
                (lhs, rhs) => Err(self.binary_type_error(token_id, "+", &lhs, &rhs)),
            },
            BinaryOp::Sub => self.numeric_op(token_id, "-", lhs, rhs, |a, b| a - b),
            BinaryOp::Mul => self.numeric_op(token_id, "*", lhs, rhs, |a, b| a * b),
            BinaryOp::Div => match (lhs, rhs) {
                (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                    if b.is_zero() {
                        Err(EvalError::division_error(&self.token(token_id)))
                    } else {
                        Ok(RuntimeValue::Number(a / b))
                    }
                }
                (lhs, rhs) => Err(self.binary_type_error(token_id, "/", &lhs, &rhs)),
            },
            BinaryOp::Mod => match (lhs, rhs) {
                (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                    if b.is_zero() {
                        Err(EvalError::division_error(&self.token(token_id)))
                    } else {
                        Ok(RuntimeValue::Number(a % b))
                    }
                }
                (lhs, rhs) => Err(self.binary_type_error(token_id, "%", &lhs, &rhs)),
            },
            BinaryOp::Pow => self.numeric_op(token_id, "^", lhs, rhs, |a, b| a.pow(b)),
            BinaryOp::Eq => Ok(RuntimeValue::Bool(lhs == rhs)),
            BinaryOp::Ne => Ok(RuntimeValue::Bool(lhs != rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a.cmp(b),
                    (RuntimeValue::String(a), RuntimeValue::String(b)) => a.cmp(b),
                    _ => {
                        return Err(EvalError::type_error(
                            &self.token(token_id),
                            format!(
                                "Cannot compare a {} with a {}",
                                lhs.type_name(),
                                rhs.type_name()
                            ),
                        ));
                    }
                };
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(RuntimeValue::Bool(result))
            }
            BinaryOp::And => Ok(RuntimeValue::Bool(lhs.is_truthy() && rhs.is_truthy())),
            BinaryOp::Or => Ok(RuntimeValue::Bool(lhs.is_truthy() || rhs.is_truthy())),
            BinaryOp::RangeExclusive | BinaryOp::RangeInclusive => match (lhs, rhs) {
                (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                    let start = a.to_int();
                    let end = if op == BinaryOp::RangeInclusive {
                        b.to_int() + 1
                    } else {
                        b.to_int()
                    };
                    Ok(RuntimeValue::list(
                        (start..end).map(|i| RuntimeValue::Number(i.into())).collect(),
                    ))
                }
                (lhs, rhs) => Err(self.binary_type_error(token_id, "..", &lhs, &rhs)),
            },
        }
    }

    fn numeric_op(
        &self,
        token_id: TokenId,
        symbol: &str,
        lhs: RuntimeValue,
        rhs: RuntimeValue,
        f: fn(Number, Number) -> Number,
    ) -> Result<RuntimeValue, EvalError> {
        match (lhs, rhs) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                Ok(RuntimeValue::Number(f(a, b)))
            }
            (lhs, rhs) => Err(self.binary_type_error(token_id, symbol, &lhs, &rhs)),
        }
    }

    fn binary_type_error(
        &self,
        token_id: TokenId,
        symbol: &str,
        lhs: &RuntimeValue,
        rhs: &RuntimeValue,
    ) -> EvalError {
        EvalError::type_error(
            &self.token(token_id),
            format!(
                "\"{}\" is not defined for a {} and a {}",
                symbol,
                lhs.type_name(),
                rhs.type_name()
            ),
        )
    }

    pub(crate) fn eval_unary_op(
        &self,
        token_id: TokenId,
        op: UnaryOp,
        value: RuntimeValue,
    ) -> Result<RuntimeValue, EvalError> {
        match (op, value) {
            (UnaryOp::Neg, RuntimeValue::Number(n)) => Ok(RuntimeValue::Number(-n)),
            (UnaryOp::Neg, other) => Err(EvalError::type_error(
                &self.token(token_id),
                format!("Cannot negate a {}", other.type_name()),
            )),
            (UnaryOp::Not, value) => Ok(RuntimeValue::Bool(!value.is_truthy())),
        }
    }

    fn eval_use(
        &mut self,
        token_id: TokenId,
        name: &Ident,
        env: &Rc<RefCell<Env>>,
    ) -> Result<RuntimeValue, EvalError> {
        if let Some(module) = self.loaded_modules.get(name) {
            let module = module.clone();
            env.borrow_mut().define(name.clone(), module);
            return Ok(RuntimeValue::Nil);
        }

        let module = match module::native_module(name) {
            Some(native) => native,
            Option::None => self.load_source_module(token_id, name)?,
        };
        self.loaded_modules.insert(name.clone(), module.clone());
        env.borrow_mut().define(name.clone(), module);
        Ok(RuntimeValue::Nil)
    }

    /// Loads, parses and evaluates a `.rab` module in a fresh scope,
    /// exporting its top-level bindings as a map.
    fn load_source_module(
        &mut self,
        token_id: TokenId,
        name: &Ident,
    ) -> Result<RuntimeValue, EvalError> {
        let token = self.token(token_id);
        let (source, module_id) = self
            .module_loader
            .load_file(name)
            .map_err(|e| EvalError::import_error(&token, e.to_string()))?;

        let tokens = Lexer::new()
            .tokenize(&source, module_id)
            .map_err(|e| import_failed(&token, name, &e))?;
        let tokens: Vec<Rc<Token>> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
            .map(Rc::new)
            .collect();
        let program = Parser::new(&tokens, Rc::clone(&self.token_arena), module_id)
            .parse()
            .map_err(|e| import_failed(&token, name, &e))?;

        let module_env = Rc::new(RefCell::new(Env::default()));
        for node in &program {
            self.eval_node(node, &module_env)?;
        }
        let exports = module_env.borrow().exports();
        Ok(RuntimeValue::map(exports))
    }
}

fn import_failed(token: &Token, name: &Ident, error: &dyn std::fmt::Display) -> EvalError {
    EvalError::import_error(token, format!("Failed to load module \"{}\": {}", name, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use rstest::rstest;

    fn eval_with_options(source: &str, options: Options) -> Result<RuntimeValue, EvalError> {
        let token_arena: TokenArena = Rc::new(RefCell::new(Arena::new(64)));
        let tokens = Lexer::new()
            .tokenize(source, ModuleLoader::TOP_LEVEL)
            .unwrap();
        let tokens: Vec<Rc<Token>> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
            .map(Rc::new)
            .collect();
        let program = Parser::new(&tokens, Rc::clone(&token_arena), ModuleLoader::TOP_LEVEL)
            .parse()
            .unwrap();
        Evaluator::new(token_arena, ModuleLoader::default(), options).eval(&program)
    }

    fn eval_source(source: &str) -> Result<RuntimeValue, EvalError> {
        eval_with_options(source, Options::default())
    }

    fn num(n: f64) -> RuntimeValue {
        RuntimeValue::Number(Number::new(n))
    }

    fn s(v: &str) -> RuntimeValue {
        RuntimeValue::String(v.to_string())
    }

    #[rstest]
    #[case("1 + 2 * 3", num(7.0))]
    #[case("(1 + 2) * 3", num(9.0))]
    #[case("2 ^ 3 ^ 2", num(512.0))]
    #[case("3²", num(9.0))]
    #[case("2³ + 1", num(9.0))]
    #[case("10 % 3", num(1.0))]
    #[case("-4 + 1", num(-3.0))]
    #[case("\"a\" + \"b\"", s("ab"))]
    #[case("[1, 2] + [3]", RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)]))]
    #[case("1 == 1.0", RuntimeValue::TRUE)]
    #[case("1 == \"1\"", RuntimeValue::FALSE)]
    #[case("\"a\" < \"b\"", RuntimeValue::TRUE)]
    #[case("!nil", RuntimeValue::TRUE)]
    #[case("true && false", RuntimeValue::FALSE)]
    #[case("false || true", RuntimeValue::TRUE)]
    #[case("1..4", RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)]))]
    #[case("1..=3", RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)]))]
    #[case("[10, 20][1]", num(20.0))]
    #[case("\"héllo\"[1]", s("é"))]
    fn test_expressions(#[case] source: &str, #[case] expected: RuntimeValue) {
        assert_eq!(eval_source(source), Ok(expected));
    }

    #[rstest]
    #[case("x = 10\nx + 1", num(11.0))]
    #[case("x, y = 10, 20\nx + y", num(30.0))]
    #[case("pair = [1, 2]\nx, y = pair\ny", num(2.0))]
    #[case("x = 1\nif x > 0 { \"pos\" } else { \"neg\" }", s("pos"))]
    #[case("if false { 1 }", RuntimeValue::Nil)]
    #[case("x = 0\nfor i in 1..=3 { x = x + i }\nx", num(6.0))]
    #[case("total = 0\nfor c in \"abc\" { total = total + 1 }\ntotal", num(3.0))]
    #[case("{ a = 1\n a + 1 }", num(2.0))]
    fn test_statements(#[case] source: &str, #[case] expected: RuntimeValue) {
        assert_eq!(eval_source(source), Ok(expected));
    }

    #[test]
    fn test_def_and_recursion() {
        let source = "def fact(n) {\n  if n <= 1 { 1 } else { n * fact(n - 1) }\n}\nfact(10)";
        assert_eq!(eval_source(source), Ok(num(3628800.0)));
    }

    #[test]
    fn test_lambda_and_higher_order() {
        let source = "def apply(f, x) { f(x) }\napply(fn(n) => n * 2, 21)";
        assert_eq!(eval_source(source), Ok(num(42.0)));
    }

    #[test]
    fn test_return_short_circuits_body() {
        let source = "def first(xs) {\n  for x in xs {\n    return x\n  }\n  nil\n}\nfirst([7, 8, 9])";
        assert_eq!(eval_source(source), Ok(num(7.0)));
    }

    #[test]
    fn test_loop_closures_capture_iteration_value() {
        let source = "funcs = []\nfor i in 1..=3 {\n  funcs.push(fn() => i)\n}\nfuncs[0]() + funcs[1]() + funcs[2]()";
        assert_eq!(eval_source(source), Ok(num(6.0)));
    }

    #[test]
    fn test_match_takes_first_matching_arm() {
        let source = "match 5 {\n  1..=9 => \"range\"\n  5 => \"exact\"\n  _ => \"other\"\n}";
        assert_eq!(eval_source(source), Ok(s("range")));
    }

    #[test]
    fn test_match_destructures_option() {
        let source = "match Some(41) {\n  Some(v) => v + 1\n  None => 0\n}";
        assert_eq!(eval_source(source), Ok(num(42.0)));
    }

    #[rstest]
    #[case("try { 1 / 0 } catch { -1 }", num(-1.0))]
    #[case("try { 1 / 0 } catch DivisionError { -1 }", num(-1.0))]
    #[case("try { throw ValueError(\"bad\") } catch ValueError as e { e.message }", s("bad"))]
    #[case(
        "try { throw MyError(\"boom\", 42) } catch MyError as e { e.payload }",
        num(42.0)
    )]
    #[case("try { missing } catch NameError { \"caught\" }", s("caught"))]
    #[case("try { \"x\" + 1 } catch TypeError as e { e.kind }", s("TypeError"))]
    fn test_try_catch(#[case] source: &str, #[case] expected: RuntimeValue) {
        assert_eq!(eval_source(source), Ok(expected));
    }

    #[test]
    fn test_catch_with_wrong_kind_propagates() {
        let result = eval_source("try { 1 / 0 } catch ValueError { -1 }");
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Division
        ));
    }

    #[test]
    fn test_error_trace_accumulates_frames() {
        let source = "def inner() { 1 / 0 }\ndef outer() { inner() }\nouter()";
        match eval_source(source) {
            Err(EvalError::Raised { trace, .. }) => {
                assert_eq!(trace, vec![Ident::new("inner"), Ident::new("outer")]);
            }
            other => panic!("expected a raised error, got {:?}", other),
        }
    }

    #[test]
    fn test_recursion_limit() {
        let result = eval_source("def down() { down() }\ndown()");
        assert!(matches!(result, Err(EvalError::RecursionError(_))));
    }

    #[rstest]
    #[case("[1, 2, 3].map(fn(x) => x * 2)", RuntimeValue::list(vec![num(2.0), num(4.0), num(6.0)]))]
    #[case("[1, 2, 3, 4].filter(fn(x) => x % 2 == 0)", RuntimeValue::list(vec![num(2.0), num(4.0)]))]
    #[case("[1, 2, 3, 4].reduce(fn(a, b) => a + b)", num(10.0))]
    #[case("[1, 2, 3].reduce(fn(a, b) => a + b, 10)", num(16.0))]
    #[case("map([-1, 2], abs)", RuntimeValue::list(vec![num(1.0), num(2.0)]))]
    fn test_higher_order_builtins_call_user_functions(
        #[case] source: &str,
        #[case] expected: RuntimeValue,
    ) {
        assert_eq!(eval_source(source), Ok(expected));
    }

    #[test]
    fn test_reduce_of_empty_list_raises() {
        let result = eval_source("[].reduce(fn(a, b) => a + b)");
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Value
        ));
    }

    #[rstest]
    #[case("[10, 20][1.5]")]
    #[case("\"abc\"[0.5]")]
    fn test_fractional_index_is_type_error(#[case] source: &str) {
        assert!(matches!(
            eval_source(source),
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Type
        ));
    }

    #[test]
    fn test_method_sugar_falls_back_to_function() {
        let source = "xs = [3, 1, 2]\nxs.sort()";
        assert_eq!(
            eval_source(source),
            Ok(RuntimeValue::list(vec![num(1.0), num(2.0), num(3.0)]))
        );
    }

    #[test]
    fn test_use_std_math() {
        let source = "use std/math\nmath.sqrt(16)";
        assert_eq!(eval_source(source), Ok(num(4.0)));
    }

    #[test]
    fn test_use_unknown_module_is_catchable() {
        let source = "try { use std/nope } catch ImportError { \"caught\" }";
        let result = eval_with_options(
            source,
            Options {
                enable_jit: false,
                ..Options::default()
            },
        );
        assert_eq!(result, Ok(s("caught")));
    }

    #[test]
    fn test_hot_function_keeps_behavior_after_compilation() {
        let source = "def double(n) { n * 2 }\ntotal = 0\nfor i in 1..=64 { total = total + double(i) }\ntotal";
        let jit = eval_with_options(
            source,
            Options {
                hot_call_threshold: 2,
                ..Options::default()
            },
        );
        let interpreted = eval_with_options(
            source,
            Options {
                enable_jit: false,
                ..Options::default()
            },
        );
        assert_eq!(jit, interpreted);
        assert_eq!(jit, Ok(num(4160.0)));
    }

    #[test]
    fn test_multi_assign_arity_mismatch() {
        let result = eval_source("x, y = [1, 2, 3]");
        assert!(matches!(
            result,
            Err(EvalError::Raised { error, .. }) if error.kind == ErrorKind::Value
        ));
    }
}
