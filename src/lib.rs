//! A just-in-time native compiler translating a stack-based Lisp bytecode into IR for a
//! third-party code-generation backend (named out of scope via the [`ir::Backend`] trait).
//!
//! The four components run leaves-first: [`rtb`] (runtime-type binding) and [`symtab`] (the
//! symbol table) are built once per backend context; [`cfg`] reconstructs a function's control
//! flow from its byte string; [`translator`] walks the bytecode in program-counter order and
//! emits IR against that CFG. [`compile::native_compile`] wires the four together behind one
//! entry point.

pub mod bytecode;
pub mod cfg;
pub mod compile;
pub mod debug;
pub mod error;
pub mod ir;
pub mod rtb;
pub mod symtab;
pub mod translator;

#[cfg(any(test, feature = "test-util"))]
pub mod tests_support;

pub use compile::{CompiledInput, CompiledOutput, native_compile};
pub use debug::{CompileOptions, DebugLevel};
pub use error::{CompileError, Result};
