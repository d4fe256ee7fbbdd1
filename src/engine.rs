//! The embedding surface. An [`Engine`] turns source text into a
//! [`Value`], optionally persisting parse results and hot-function
//! markers through an [`ArtifactCache`] so a later run starts warm.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use itertools::Itertools;

use crate::TokenArena;
use crate::arena::Arena;
use crate::ast::Parser;
use crate::ast::node::{Expr, Node, Program};
use crate::cache::{ArtifactCache, CompiledUnit, source_hash};
use crate::compiler::Compiler;
use crate::error::Error;
use crate::eval::module::ModuleLoader;
use crate::eval::{Evaluator, Options};
use crate::lexer::Lexer;
use crate::lexer::token::{Token, TokenId, TokenKind};
use crate::value::Value;

#[derive(Default)]
pub struct Engine {
    options: Options,
    search_paths: Option<Vec<PathBuf>>,
    cache: Option<ArtifactCache>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn set_search_paths(&mut self, paths: Vec<PathBuf>) {
        self.search_paths = Some(paths);
    }

    pub fn set_cache(&mut self, cache: ArtifactCache) {
        self.cache = Some(cache);
    }

    /// Evaluates `source`, returning the value of its last statement.
    pub fn eval(&mut self, source: &str) -> Result<Value, Box<Error>> {
        let token_arena: TokenArena = Rc::new(RefCell::new(Arena::new(64)));
        let mut module_loader = ModuleLoader::new(self.search_paths.clone());

        let (program, cached_hot) = match self.load_cached(source, &token_arena, &mut module_loader)
        {
            Some((program, hot)) => (program, hot),
            None => (self.parse_source(source, &token_arena)?, Vec::new()),
        };

        let mut evaluator = Evaluator::new(
            Rc::clone(&token_arena),
            module_loader,
            self.options.clone(),
        );
        // a warm start: bodies that were hot last run skip the
        // interpreted tier entirely
        if self.options.enable_jit {
            precompile(&mut evaluator, &program, &cached_hot);
        }

        let result = evaluator
            .eval(&program)
            .map_err(|e| Box::new(Error::from_error(source, e)))?;

        if let Some(cache) = &self.cache {
            let unit = compiled_unit(source, &token_arena, &program, &evaluator);
            // failure to persist never fails the evaluation
            let _ = cache.store(&unit);
        }

        Ok(Value::from(result))
    }

    fn parse_source(
        &self,
        source: &str,
        token_arena: &TokenArena,
    ) -> Result<Program, Box<Error>> {
        let tokens = Lexer::new()
            .tokenize(source, ModuleLoader::TOP_LEVEL)
            .map_err(|e| Box::new(Error::from_error(source, e)))?;
        let tokens: Vec<Rc<Token>> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
            .map(Rc::new)
            .collect();
        Parser::new(&tokens, Rc::clone(token_arena), ModuleLoader::TOP_LEVEL)
            .parse()
            .map_err(|e| Box::new(Error::from_error(source, e)))
    }

    /// Restores a cached parse if one exists and every dependency
    /// still matches. The cached token list refills the arena in
    /// allocation order, so the program's token ids stay valid.
    fn load_cached(
        &self,
        source: &str,
        token_arena: &TokenArena,
        module_loader: &mut ModuleLoader,
    ) -> Option<(Program, Vec<TokenId>)> {
        let unit = self.cache.as_ref()?.load(source)?;
        for (name, hash) in &unit.dependencies {
            let (dep_source, _) = module_loader.load_file(name).ok()?;
            if source_hash(&dep_source) != *hash {
                return None;
            }
        }

        let mut arena = token_arena.borrow_mut();
        for token in unit.tokens {
            arena.alloc(Rc::new(token));
        }
        Some((unit.program, unit.hot_functions))
    }
}

fn compiled_unit(
    source: &str,
    token_arena: &TokenArena,
    program: &Program,
    evaluator: &Evaluator,
) -> CompiledUnit {
    let tokens: Vec<Token> = token_arena
        .borrow()
        .iter()
        .map(|token| (**token).clone())
        .collect();
    let dependencies = evaluator
        .module_loader
        .loaded_sources()
        .map(|(name, dep_source)| (name.to_string(), source_hash(dep_source)))
        .sorted()
        .collect();
    CompiledUnit::new(
        source,
        tokens,
        program.clone(),
        evaluator.profiler.hot_functions(),
        dependencies,
    )
}

/// Compiles the marked function bodies up front and promotes them in
/// the profiler. A body that fails to compile simply starts cold.
fn precompile(evaluator: &mut Evaluator, program: &Program, hot: &[TokenId]) {
    if hot.is_empty() {
        return;
    }
    let compiler = Compiler::new();
    for node in program {
        for_each_function(node, &mut |function_id, body| {
            if hot.contains(&function_id) {
                if let Ok(compiled) = compiler.compile(body) {
                    evaluator.profiler.promote(function_id, Rc::new(compiled));
                }
            }
        });
    }
}

/// Walks a subtree, invoking `f` with the id and body of every `def`
/// and `fn` it contains.
fn for_each_function(node: &Rc<Node>, f: &mut impl FnMut(TokenId, &Rc<Node>)) {
    match &*node.expr {
        Expr::Def(_, _, body) | Expr::Fn(_, body) => {
            f(node.token_id, body);
            for_each_function(body, f);
        }
        Expr::Literal(_) | Expr::Ident(_) | Expr::Use(_) => {}
        Expr::List(items) | Expr::Block(items) => {
            for item in items {
                for_each_function(item, f);
            }
        }
        Expr::BinaryOp(_, lhs, rhs) | Expr::Index(lhs, rhs) => {
            for_each_function(lhs, f);
            for_each_function(rhs, f);
        }
        Expr::UnaryOp(_, operand) | Expr::Pow(operand, _) | Expr::Access(operand, _) => {
            for_each_function(operand, f);
        }
        Expr::Call(callee, args) => {
            for_each_function(callee, f);
            for arg in args {
                for_each_function(arg, f);
            }
        }
        Expr::If(branches) => {
            for (condition, body) in branches {
                if let Some(condition) = condition {
                    for_each_function(condition, f);
                }
                for_each_function(body, f);
            }
        }
        Expr::Match(subject, arms) => {
            for_each_function(subject, f);
            for arm in arms {
                for_each_function(&arm.body, f);
            }
        }
        Expr::For(_, iterable, body) => {
            for_each_function(iterable, f);
            for_each_function(body, f);
        }
        Expr::Assign(_, exprs) => {
            for expr in exprs {
                for_each_function(expr, f);
            }
        }
        Expr::Throw(_, args) => {
            for arg in args {
                for_each_function(arg, f);
            }
        }
        Expr::Try {
            body,
            catch,
            ..
        } => {
            for_each_function(body, f);
            for_each_function(catch, f);
        }
        Expr::Return(value) => {
            if let Some(value) = value {
                for_each_function(value, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;

    #[test]
    fn test_eval_returns_last_value() {
        let mut engine = Engine::new();
        assert_eq!(
            engine.eval("x = 20\nx * 2 + 2").unwrap(),
            Value::Number(Number::new(42.0))
        );
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let mut engine = Engine::new();
        let error = engine.eval("1 +").unwrap_err();
        assert!(error.to_string().contains("Unexpected"));
    }

    #[test]
    fn test_cache_round_trip_preserves_result() {
        let dir = tempfile::tempdir().unwrap();
        let source = "def double(n) { n * 2 }\ntotal = 0\nfor i in 1..=8 { total = total + double(i) }\ntotal";

        let mut engine = Engine::new();
        engine.set_options(Options {
            hot_call_threshold: 2,
            ..Options::default()
        });
        engine.set_cache(ArtifactCache::new(dir.path()));

        let cold = engine.eval(source).unwrap();
        let warm = engine.eval(source).unwrap();
        assert_eq!(cold, warm);
        assert_eq!(cold, Value::Number(Number::new(72.0)));
    }

    #[test]
    fn test_cache_records_hot_functions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let source = "def double(n) { n * 2 }\ntotal = 0\nfor i in 1..=8 { total = total + double(i) }\ntotal";

        let mut engine = Engine::new();
        engine.set_options(Options {
            hot_call_threshold: 2,
            ..Options::default()
        });
        engine.set_cache(cache.clone());
        engine.eval(source).unwrap();

        let unit = cache.load(source).expect("expected a cache entry");
        assert!(!unit.hot_functions.is_empty());
    }

    #[test]
    fn test_engines_do_not_share_state() {
        let mut engine = Engine::new();
        engine.eval("x = 1").unwrap();
        let error = engine.eval("x").unwrap_err();
        assert!(error.to_string().contains("not defined"));
    }
}
