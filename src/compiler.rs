//! The optional second execution tier: hot function bodies are
//! compiled into closure chains by [`compile::Compiler`], driven by
//! call counts from [`profiler::Profiler`].

pub mod compile;
pub mod compiled;
pub mod profiler;

pub use compile::{CompileError, Compiler};
pub use compiled::{CompiledExpr, CompiledFunction};
