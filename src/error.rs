use std::fmt::{Display, Formatter};

use crate::ir::BackendType;

/// Every way a compilation can fail. Kept as a flat enum rather than a tree of error types
/// because every variant here is reported at the same boundary (the `native_compile` entry
/// point) and none of them are recovered from internally.
#[derive(Debug)]
pub enum CompileError {
	/// `func` was not a symbol where one was required.
	NotASymbol,
	/// `func` was not a byte-compiled function object.
	NotByteCompiled,
	/// `speed` was outside `0..=3`.
	InvalidOptimizationLevel(u8),
	/// The arity template (§4.4) could not be decoded into `(min_args, max_args)`.
	InvalidArity { reason: String },
	/// The mangled C function name exceeded 256 bytes.
	NameTooLong { name: String, len: usize },

	/// An opcode this translator refuses to compile, by design (§4.3 of the design doc).
	UnsupportedOpcode { opcode: u8, pc: usize },
	/// A branch operand pointed outside the byte string.
	MalformedBranch { pc: usize, target: isize },
	/// `gotoifnilelsepop`/`gotoifnonnilelsepop`'s fall-through PC was itself a branch target,
	/// which would make the conditional pop unsound (§4.7).
	UnsafeConditionalPop { pc: usize },

	/// The abstract operand stack ran dry.
	StackUnderflow { pc: usize },
	/// The abstract operand stack grew past `stack_depth`.
	StackOverflow { pc: usize },
	/// A variadic call site's argument count exceeded `MAX_ARGS` (§4.5).
	TooManyArguments { pc: usize, count: usize },
	/// `declare_fn` was asked to register a `reusable` name already present in the symbol table.
	DuplicateSymbol { name: String },
	/// `cast_union` was asked to reinterpret between two backend types it has no field pair for.
	UnsupportedCast { from: BackendType, to: BackendType },
	/// A basic block was left without a terminator after translation finished.
	UnterminatedBlock { pc: usize },

	/// Opaque failure reported by the code-generation backend.
	Backend(String),
}

impl Display for CompileError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			CompileError::NotASymbol => write!(f, "expected a symbol"),
			CompileError::NotByteCompiled => write!(f, "function is not byte-compiled"),
			CompileError::InvalidOptimizationLevel(speed) => {
				write!(f, "optimization level {speed} is out of range 0..=3")
			}
			CompileError::InvalidArity { reason } => write!(f, "invalid arity template: {reason}"),
			CompileError::NameTooLong { name, len } => {
				write!(f, "mangled name for `{name}` is {len} bytes, exceeding the 256 byte limit")
			}
			CompileError::UnsupportedOpcode { opcode, pc } => {
				write!(f, "unsupported opcode {opcode:#04x} at pc {pc}")
			}
			CompileError::MalformedBranch { pc, target } => {
				write!(f, "branch at pc {pc} targets out-of-range pc {target}")
			}
			CompileError::UnsafeConditionalPop { pc } => {
				write!(f, "fall-through of conditional pop at pc {pc} is itself a branch target")
			}
			CompileError::StackUnderflow { pc } => write!(f, "operand stack underflow at pc {pc}"),
			CompileError::StackOverflow { pc } => write!(f, "operand stack overflow at pc {pc}"),
			CompileError::TooManyArguments { pc, count } => {
				write!(f, "variadic call at pc {pc} has {count} arguments, exceeding MAX_ARGS")
			}
			CompileError::DuplicateSymbol { name } => {
				write!(f, "duplicate reusable symbol table entry for `{name}`")
			}
			CompileError::UnsupportedCast { from, to } => {
				write!(f, "cast_union has no field pair for {from:?} -> {to:?}")
			}
			CompileError::UnterminatedBlock { pc } => {
				write!(f, "basic block starting at pc {pc} was never terminated")
			}
			CompileError::Backend(msg) => write!(f, "backend failure: {msg}"),
		}
	}
}

impl std::error::Error for CompileError {}

pub type Result<T> = std::result::Result<T, CompileError>;
