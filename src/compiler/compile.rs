//! Translates a function body into a closure chain ahead of execution.
//! The compiled tier reuses the evaluator's operator, call and pattern
//! primitives, so both tiers observe identical semantics by
//! construction.

use std::rc::Rc;

use thiserror::Error;

use super::compiled::{CompiledExpr, CompiledFunction};
use crate::ast::node::{BinaryOp, Expr, Literal, Node, Pattern};
use crate::eval::Evaluator;
use crate::eval::error::EvalError;
use crate::eval::pattern;
use crate::eval::runtime_value::RuntimeValue;
use crate::number::Number;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    /// The construct stays on the interpreted tier.
    #[error("\"{0}\" cannot be compiled")]
    Unsupported(&'static str),
}

pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, body: &Rc<Node>) -> Result<CompiledFunction, CompileError> {
        Ok(CompiledFunction::new(self.compile_node(body)?))
    }

    fn compile_node(&self, node: &Rc<Node>) -> Result<CompiledExpr, CompileError> {
        let token_id = node.token_id;
        match &*node.expr {
            Expr::Literal(literal) => {
                let value = Evaluator::literal_value(literal);
                Ok(Box::new(move |_, _| Ok(value.clone())))
            }
            Expr::Ident(name) => {
                let name = name.clone();
                Ok(Box::new(move |evaluator, env| {
                    env.borrow()
                        .resolve(&name)
                        .map_err(|_| EvalError::name_error(&evaluator.token(token_id), &name))
                }))
            }
            Expr::List(items) => {
                let items = self.compile_all(items)?;
                Ok(Box::new(move |evaluator, env| {
                    let values = items
                        .iter()
                        .map(|item| item(evaluator, env))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(RuntimeValue::list(values))
                }))
            }
            Expr::BinaryOp(BinaryOp::And, lhs, rhs) => {
                let lhs = self.compile_node(lhs)?;
                let rhs = self.compile_node(rhs)?;
                Ok(Box::new(move |evaluator, env| {
                    if !lhs(evaluator, env)?.is_truthy() {
                        return Ok(RuntimeValue::FALSE);
                    }
                    Ok(RuntimeValue::Bool(rhs(evaluator, env)?.is_truthy()))
                }))
            }
            Expr::BinaryOp(BinaryOp::Or, lhs, rhs) => {
                let lhs = self.compile_node(lhs)?;
                let rhs = self.compile_node(rhs)?;
                Ok(Box::new(move |evaluator, env| {
                    if lhs(evaluator, env)?.is_truthy() {
                        return Ok(RuntimeValue::TRUE);
                    }
                    Ok(RuntimeValue::Bool(rhs(evaluator, env)?.is_truthy()))
                }))
            }
            Expr::BinaryOp(op, lhs, rhs) => {
                if let Some(value) = constant_fold(*op, lhs, rhs) {
                    return Ok(Box::new(move |_, _| Ok(value.clone())));
                }
                let op = *op;
                let lhs = self.compile_node(lhs)?;
                let rhs = self.compile_node(rhs)?;
                Ok(Box::new(move |evaluator, env| {
                    let lhs = lhs(evaluator, env)?;
                    let rhs = rhs(evaluator, env)?;
                    evaluator.eval_binary_op(token_id, op, lhs, rhs)
                }))
            }
            Expr::UnaryOp(op, operand) => {
                let op = *op;
                let operand = self.compile_node(operand)?;
                Ok(Box::new(move |evaluator, env| {
                    let value = operand(evaluator, env)?;
                    evaluator.eval_unary_op(token_id, op, value)
                }))
            }
            Expr::Pow(base, exp) => {
                let exp = *exp;
                let base = self.compile_node(base)?;
                Ok(Box::new(move |evaluator, env| {
                    match base(evaluator, env)? {
                        RuntimeValue::Number(n) => {
                            Ok(RuntimeValue::Number(n.pow(Number::from(exp as i64))))
                        }
                        other => Err(EvalError::type_error(
                            &evaluator.token(token_id),
                            format!("Cannot raise a {} to a power", other.type_name()),
                        )),
                    }
                }))
            }
            Expr::Call(callee, args) => {
                if let Expr::Access(recv, name) = &*callee.expr {
                    let name = name.clone();
                    let recv = self.compile_node(recv)?;
                    let args = self.compile_all(args)?;
                    return Ok(Box::new(move |evaluator, env| {
                        let recv_value = recv(evaluator, env)?;
                        let arg_values = args
                            .iter()
                            .map(|arg| arg(evaluator, env))
                            .collect::<Result<Vec<_>, _>>()?;
                        evaluator.call_method(token_id, recv_value, &name, arg_values, env)
                    }));
                }

                let callee_name = match &*callee.expr {
                    Expr::Ident(name) => Some(name.clone()),
                    _ => None,
                };
                let callee = self.compile_node(callee)?;
                let args = self.compile_all(args)?;
                Ok(Box::new(move |evaluator, env| {
                    let callee_value = callee(evaluator, env)?;
                    let arg_values = args
                        .iter()
                        .map(|arg| arg(evaluator, env))
                        .collect::<Result<Vec<_>, _>>()?;
                    evaluator.call_value(token_id, callee_value, arg_values, callee_name.as_ref())
                }))
            }
            Expr::Access(recv, name) => {
                let name = name.clone();
                let recv = self.compile_node(recv)?;
                Ok(Box::new(move |evaluator, env| {
                    let value = recv(evaluator, env)?;
                    evaluator.eval_access(token_id, value, &name)
                }))
            }
            Expr::Index(recv, index) => {
                let recv = self.compile_node(recv)?;
                let index = self.compile_node(index)?;
                Ok(Box::new(move |evaluator, env| {
                    let value = recv(evaluator, env)?;
                    let index = index(evaluator, env)?;
                    evaluator.eval_index(token_id, value, index)
                }))
            }
            Expr::If(branches) => {
                let branches = branches
                    .iter()
                    .map(|(condition, body)| {
                        let condition = condition
                            .as_ref()
                            .map(|c| self.compile_node(c))
                            .transpose()?;
                        Ok((condition, self.compile_node(body)?))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Ok(Box::new(move |evaluator, env| {
                    for (condition, body) in &branches {
                        let taken = match condition {
                            Some(condition) => condition(evaluator, env)?.is_truthy(),
                            None => true,
                        };
                        if taken {
                            return body(evaluator, &Evaluator::child_env(env));
                        }
                    }
                    Ok(RuntimeValue::Nil)
                }))
            }
            Expr::Match(subject, arms) => {
                let subject = self.compile_node(subject)?;
                let arms = arms
                    .iter()
                    .map(|arm| Ok((arm.pattern.clone(), self.compile_node(&arm.body)?)))
                    .collect::<Result<Vec<(Pattern, CompiledExpr)>, CompileError>>()?;
                Ok(Box::new(move |evaluator, env| {
                    let value = subject(evaluator, env)?;
                    for (arm_pattern, body) in &arms {
                        if let Some(bindings) = pattern::match_pattern(&value, arm_pattern) {
                            let arm_env = Evaluator::child_env(env);
                            {
                                let mut arm_env = arm_env.borrow_mut();
                                for (ident, bound) in bindings {
                                    arm_env.define(ident, bound);
                                }
                            }
                            return body(evaluator, &arm_env);
                        }
                    }
                    Err(EvalError::value_error(
                        &evaluator.token(token_id),
                        format!("No pattern matched {}", value),
                    ))
                }))
            }
            Expr::For(var, iterable, body) => {
                let var = var.clone();
                let iterable = self.compile_node(iterable)?;
                let body = self.compile_node(body)?;
                Ok(Box::new(move |evaluator, env| {
                    let items: Vec<RuntimeValue> = match iterable(evaluator, env)? {
                        RuntimeValue::List(values) => values.borrow().clone(),
                        RuntimeValue::String(s) => s
                            .chars()
                            .map(|c| RuntimeValue::String(c.to_string()))
                            .collect(),
                        other => {
                            return Err(EvalError::type_error(
                                &evaluator.token(token_id),
                                format!("Cannot iterate over a {}", other.type_name()),
                            ));
                        }
                    };
                    for item in items {
                        let iter_env = Evaluator::child_env(env);
                        iter_env.borrow_mut().define(var.clone(), item);
                        body(evaluator, &iter_env)?;
                    }
                    Ok(RuntimeValue::Nil)
                }))
            }
            Expr::Def(name, params, body) => {
                let name = name.clone();
                let params = params.clone();
                let body = Rc::clone(body);
                Ok(Box::new(move |_, env| {
                    let function = RuntimeValue::Function(
                        params.clone(),
                        Rc::clone(&body),
                        Rc::clone(env),
                        token_id,
                    );
                    env.borrow_mut().define(name.clone(), function);
                    Ok(RuntimeValue::Nil)
                }))
            }
            Expr::Fn(params, body) => {
                let params = params.clone();
                let body = Rc::clone(body);
                Ok(Box::new(move |_, env| {
                    Ok(RuntimeValue::Function(
                        params.clone(),
                        Rc::clone(&body),
                        Rc::clone(env),
                        token_id,
                    ))
                }))
            }
            Expr::Assign(idents, exprs) => {
                let idents = idents.clone();
                let exprs = self.compile_all(exprs)?;
                Ok(Box::new(move |evaluator, env| {
                    let values = exprs
                        .iter()
                        .map(|expr| expr(evaluator, env))
                        .collect::<Result<Vec<_>, _>>()?;
                    evaluator.eval_assign(token_id, &idents, values, env)
                }))
            }
            Expr::Try { .. } => Err(CompileError::Unsupported("try")),
            Expr::Throw(..) => Err(CompileError::Unsupported("throw")),
            Expr::Use(..) => Err(CompileError::Unsupported("use")),
            Expr::Return(value) => {
                let value = value.as_ref().map(|v| self.compile_node(v)).transpose()?;
                Ok(Box::new(move |evaluator, env| {
                    let value = match &value {
                        Some(value) => value(evaluator, env)?,
                        None => RuntimeValue::Nil,
                    };
                    Err(EvalError::Return(value))
                }))
            }
            Expr::Block(statements) => {
                let statements = self.compile_all(statements)?;
                Ok(Box::new(move |evaluator, env| {
                    let block_env = Evaluator::child_env(env);
                    let mut last = RuntimeValue::Nil;
                    for statement in &statements {
                        last = statement(evaluator, &block_env)?;
                    }
                    Ok(last)
                }))
            }
        }
    }

    fn compile_all(&self, nodes: &[Rc<Node>]) -> Result<Vec<CompiledExpr>, CompileError> {
        nodes.iter().map(|node| self.compile_node(node)).collect()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds the closed numeric operators over literal operands. Operators
/// with failure modes keep their runtime checks.
fn constant_fold(op: BinaryOp, lhs: &Rc<Node>, rhs: &Rc<Node>) -> Option<RuntimeValue> {
    let (Expr::Literal(Literal::Number(a)), Expr::Literal(Literal::Number(b))) =
        (&*lhs.expr, &*rhs.expr)
    else {
        return None;
    };

    match op {
        BinaryOp::Add => Some(RuntimeValue::Number(*a + *b)),
        BinaryOp::Sub => Some(RuntimeValue::Number(*a - *b)),
        BinaryOp::Mul => Some(RuntimeValue::Number(*a * *b)),
        BinaryOp::Pow => Some(RuntimeValue::Number(a.pow(*b))),
        _ => None,
    }
}
