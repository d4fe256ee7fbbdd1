//! An embeddable execution core for the rabbit scripting language: a
//! lexer and parser, a tree-walking evaluator, a profiling closure
//! compiler for hot functions, and an on-disk artifact cache for warm
//! starts.
//!
//! ```
//! use rabbit_lang::Engine;
//!
//! let mut engine = Engine::new();
//! let value = engine.eval("def add(a, b) { a + b }\nadd(40, 2)").unwrap();
//! assert_eq!(value.to_string(), "42");
//! ```
//!
//! Errors carry the offending source span and render through
//! [`miette`]:
//!
//! ```
//! use rabbit_lang::Engine;
//!
//! let mut engine = Engine::new();
//! let error = engine.eval("1 / 0").unwrap_err();
//! assert_eq!(error.to_string(), "DivisionError: Division by zero");
//! ```

pub mod arena;
pub mod ast;
pub mod cache;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod number;
pub mod range;
pub mod value;

use std::cell::RefCell;
use std::rc::Rc;

use arena::Arena;
use lexer::token::{Token, TokenKind};

pub use cache::{ArtifactCache, CompiledUnit};
pub use engine::Engine;
pub use error::Error;
pub use eval::module::ModuleLoader;
pub use eval::{Evaluator, Options};
pub use number::Number;
pub use value::Value;

/// Tokens live in a shared arena; AST nodes and runtime errors refer
/// to them by id.
pub type TokenArena = Rc<RefCell<Arena<Rc<Token>>>>;

/// One-shot evaluation with default options and no cache.
pub fn eval(source: &str) -> Result<Value, Box<Error>> {
    Engine::new().eval(source)
}

/// Tokenizes `source` without parsing it. Comment tokens are kept.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Box<Error>> {
    lexer::Lexer::new()
        .tokenize(source, ModuleLoader::TOP_LEVEL)
        .map_err(|e| Box::new(Error::from_error(source, e)))
}

/// Tokenizes and parses `source` without evaluating it, returning the
/// program alongside the arena its token ids point into.
pub fn parse(source: &str) -> Result<(ast::Program, TokenArena), Box<Error>> {
    let token_arena: TokenArena = Rc::new(RefCell::new(Arena::new(64)));
    let tokens = lexer::Lexer::new()
        .tokenize(source, ModuleLoader::TOP_LEVEL)
        .map_err(|e| Box::new(Error::from_error(source, e)))?;
    let tokens: Vec<Rc<Token>> = tokens
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
        .map(Rc::new)
        .collect();
    let program = ast::Parser::new(&tokens, Rc::clone(&token_arena), ModuleLoader::TOP_LEVEL)
        .parse()
        .map_err(|e| Box::new(Error::from_error(source, e)))?;
    Ok((program, token_arena))
}
