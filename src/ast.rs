pub mod error;
pub mod node;
pub mod parser;

pub use node::{Expr, Ident, Node, Program};
pub use parser::Parser;
