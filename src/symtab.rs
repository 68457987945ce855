//! The symbol table (ST, §2/§4.2): a mapping from C-level function name to its declared backend
//! function handle, consulted by the translator before emitting any call.

use fxhash::FxHashMap;

use crate::error::{CompileError, Result};
use crate::ir::{Backend, BackendType, FnKind, FunctionId, Value};

/// Supported fixed arities before a call site must fall back to the variadic convention (§4.5).
pub const MAX_FIXED_ARITY: usize = 4;

#[derive(Debug, Default)]
pub struct SymbolTable {
	functions: FxHashMap<String, FunctionId>,
}

impl SymbolTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, name: &str) -> Option<FunctionId> {
		self.functions.get(name).copied()
	}

	/// `declare_fn` (§4.2). `arg_rvalues`, when given, only supplies the parameter *count*
	/// (its values aren't inspected here — the caller reads its own types from them, e.g. the
	/// variadic convention's `(nargs, args)` pair); absent, every parameter is `LispObj`.
	pub fn declare_fn(
		&mut self,
		backend: &mut dyn Backend,
		name: &str,
		ret_type: BackendType,
		nargs: usize,
		arg_types: Option<&[BackendType]>,
		kind: FnKind,
		reusable: bool,
	) -> Result<FunctionId> {
		if reusable && self.functions.contains_key(name) {
			return Err(CompileError::DuplicateSymbol { name: name.to_string() });
		}

		let owned_params;
		let params: &[BackendType] = match arg_types {
			Some(types) => types,
			None => {
				owned_params = vec![BackendType::VoidPtr /* LispObj placeholder */; nargs];
				&owned_params
			}
		};

		let handle = backend.declare_function(name, ret_type, params, kind)?;
		if reusable {
			self.functions.insert(name.to_string(), handle);
		}
		Ok(handle)
	}

	/// `emit_call` (§4.2): look the callee up, declaring it as an imported `LispObj(LispObj...)`
	/// function on miss, then emit `res = call(handle, args)` into the current block.
	pub fn emit_call(
		&mut self,
		backend: &mut dyn Backend,
		block: crate::ir::BlockId,
		name: &str,
		ret_type: BackendType,
		args: &[Value],
	) -> Result<Value> {
		let handle = match self.get(name) {
			Some(handle) => handle,
			None => self.declare_fn(backend, name, ret_type, args.len(), None, FnKind::Imported, true)?,
		};
		backend.emit_call(block, handle, args)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests_support::RecordingBackend;

	#[test]
	fn miss_declares_imported_function() {
		let mut backend = RecordingBackend::new();
		let mut st = SymbolTable::new();
		let func = st.declare_fn(&mut backend, "Fcar", BackendType::VoidPtr, 1, None, FnKind::Imported, true).unwrap();
		assert_eq!(st.get("Fcar"), Some(func));
	}

	#[test]
	fn duplicate_reusable_declaration_is_an_error() {
		let mut backend = RecordingBackend::new();
		let mut st = SymbolTable::new();
		st.declare_fn(&mut backend, "Fcar", BackendType::VoidPtr, 1, None, FnKind::Imported, true).unwrap();
		let err = st.declare_fn(&mut backend, "Fcar", BackendType::VoidPtr, 1, None, FnKind::Imported, true);
		assert!(matches!(err, Err(CompileError::DuplicateSymbol { .. })));
	}

	#[test]
	fn emit_call_reuses_existing_declaration() {
		let mut backend = RecordingBackend::new();
		let mut st = SymbolTable::new();
		let func = backend.declare_function("dummy_fn", BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		let block = backend.create_block(func, "entry").unwrap();

		let first = st.declare_fn(&mut backend, "Fcdr", BackendType::VoidPtr, 1, None, FnKind::Imported, true).unwrap();
		let arg = backend.const_int(BackendType::VoidPtr, 0).unwrap();
		st.emit_call(&mut backend, block, "Fcdr", BackendType::VoidPtr, &[arg]).unwrap();
		assert_eq!(st.get("Fcdr"), Some(first));
	}
}
