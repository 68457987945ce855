//! `native_compile` (§6): the entry point orchestrating RTB, ST, CFGB and TR against a single
//! compiled-function input, plus C-level name mangling.

use crate::bytecode::arity::{ArityTemplate, decode_arity};
use crate::debug::CompileOptions;
use crate::error::{CompileError, Result};
use crate::ir::{Backend, BackendType, FnKind};
use crate::rtb::Rtb;
use crate::symtab::SymbolTable;
use crate::translator::Translator;

/// Longest mangled C name this loader will register (§6).
const MAX_NAME_LEN: usize = 256;

/// A compiled-function object's relevant fields (§3's "Compiled-function input"): the byte
/// string, its literal vector (given as raw host addresses — the runtime value system owning
/// their actual representation is out of scope, §1), the declared stack depth, and the arity
/// template.
#[derive(Debug, Clone)]
pub struct CompiledInput<'a> {
	pub symbol_name: &'a str,
	pub bytecode: &'a [u8],
	pub constants: &'a [usize],
	pub stack_depth: usize,
	pub arity: ArityTemplate,
}

/// What `native_compile` hands back to the loader (§6's "Output").
#[derive(Debug)]
pub struct CompiledOutput {
	pub mangled_name: String,
	pub entry_point: usize,
	pub min_args: u16,
	pub max_args: u16,
	pub disassembly: Option<String>,
}

/// `Fnative_comp_<sym>` with `-`/`+` folded to `_` (§6). Collisions from that folding are a known
/// limitation, not resolved here.
pub fn mangle_name(symbol_name: &str) -> Result<String> {
	let folded: String = symbol_name.chars().map(|c| if c == '-' || c == '+' { '_' } else { c }).collect();
	let mangled = format!("Fnative_comp_{folded}");
	if mangled.len() > MAX_NAME_LEN {
		return Err(CompileError::NameTooLong { name: symbol_name.to_string(), len: mangled.len() });
	}
	Ok(mangled)
}

/// Compiles one bytecode function against an already-initialized RTB/ST/backend context.
///
/// The backend context, RTB and ST are expected to be long-lived (one per process/session, §5);
/// only `input` and `options` vary per call.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(backend, rtb, st, input), fields(symbol = input.symbol_name)))]
pub fn native_compile(
	backend: &mut dyn Backend,
	rtb: &Rtb,
	st: &mut SymbolTable,
	input: CompiledInput<'_>,
	options: &CompileOptions,
) -> Result<CompiledOutput> {
	if options.speed > 3 {
		return Err(CompileError::InvalidOptimizationLevel(options.speed));
	}

	let arity = decode_arity(input.arity).map_err(|e| CompileError::InvalidArity { reason: format!("{e:?}") })?;
	let mangled = mangle_name(input.symbol_name)?;

	#[cfg(feature = "tracing")]
	tracing::debug!(mangled, min_args = arity.min_args, max_args = arity.max_args, "declaring entry point");

	let func = st.declare_fn(
		backend,
		&mangled,
		BackendType::VoidPtr,
		arity.max_args as usize,
		None,
		FnKind::Exported,
		true,
	)?;
	let prologue = backend.create_block(func, "prologue")?;

	let mut translator = Translator::new(
		backend,
		rtb,
		st,
		func,
		prologue,
		input.bytecode,
		input.stack_depth,
		arity.max_args as usize,
	)?;
	translator.run(input.bytecode, input.constants)?;

	let entry_point = backend.finalize(func)?;
	let disassembly = if options.disassemble {
		#[cfg(feature = "tracing")]
		tracing::debug!("disassembling finalized module");
		Some(backend.disassemble()?)
	} else {
		None
	};

	Ok(CompiledOutput { mangled_name: mangled, entry_point, min_args: arity.min_args, max_args: arity.max_args, disassembly })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bytecode::arity::ArityTemplate;
	use crate::rtb::HostConstants;
	use crate::tests_support::RecordingBackend;

	// S1 end-to-end through the public entry point.
	#[test]
	fn compiles_constant_return_function() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();

		let input = CompiledInput {
			symbol_name: "answer",
			bytecode: &[0o300, 0o207],
			constants: &[42],
			stack_depth: 1,
			arity: ArityTemplate::Nil,
		};
		let output = native_compile(&mut backend, &rtb, &mut st, input, &CompileOptions::default()).unwrap();

		assert_eq!(output.mangled_name, "Fnative_comp_answer");
		assert_eq!((output.min_args, output.max_args), (0, 0));
		let func = st.get("Fnative_comp_answer").unwrap();
		assert_eq!(backend.run(func, &[]), 42);
	}

	#[test]
	fn name_mangling_folds_dashes_and_pluses() {
		assert_eq!(mangle_name("foo-bar+baz").unwrap(), "Fnative_comp_foo_bar_baz");
	}

	#[test]
	fn overlong_name_is_rejected() {
		let long_name = "x".repeat(300);
		assert!(matches!(mangle_name(&long_name), Err(CompileError::NameTooLong { .. })));
	}

	// S6: an unsupported opcode anywhere aborts compilation with an error.
	#[test]
	fn unsupported_opcode_aborts_compilation() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();

		let input = CompiledInput {
			symbol_name: "bad",
			bytecode: &[0o60],
			constants: &[],
			stack_depth: 1,
			arity: ArityTemplate::Nil,
		};
		let err = native_compile(&mut backend, &rtb, &mut st, input, &CompileOptions::default());
		assert!(matches!(err, Err(CompileError::UnsupportedOpcode { opcode: 0o60, pc: 0 })));
	}

	// S5: arity decoding round-trips into the output's min/max_args.
	#[test]
	fn arity_template_reaches_output() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();

		let input = CompiledInput {
			symbol_name: "f",
			bytecode: &[0o300, 0o207],
			constants: &[0],
			stack_depth: 4,
			arity: ArityTemplate::SmallInt(2 | (3 << 8)),
		};
		let output = native_compile(&mut backend, &rtb, &mut st, input, &CompileOptions::default()).unwrap();
		assert_eq!((output.min_args, output.max_args), (2, 3));
	}
}
