//! Runtime-type binding: the process-wide catalogue of backend types and numeric constants
//! described in §2/§4.1. Built once per [`crate::ir::Backend`] context and handed to the
//! translator by value; nothing here mutates after [`Rtb::new`] returns.

use crate::error::Result;
use crate::ir::{Backend, BackendType, FnKind, FunctionId, Value};

/// `MAX_ARGS`, the hard ceiling on the variadic calling convention's scratch area (§4.5).
pub const MAX_ARGS: usize = 16;

/// Host-derived numeric constants that live in the `long_long` backend type (§3).
#[derive(Debug, Copy, Clone)]
pub struct HostConstants {
	pub most_positive_fixnum: i64,
	pub most_negative_fixnum: i64,
	pub inttypebits: i64,
	pub lisp_int0: i64,
	pub fixnum_bits: i64,
	pub use_lsb_tag: bool,
	pub lisp_cons_tag: i64,
}

impl Default for HostConstants {
	/// Values matching a typical 64-bit little-endian host running with `USE_LSB_TAG` set, which
	/// is the configuration every reimplementation of this translator targets in practice.
	fn default() -> Self {
		HostConstants {
			most_positive_fixnum: (1i64 << 61) - 1,
			most_negative_fixnum: -(1i64 << 61),
			inttypebits: 3,
			lisp_int0: 0,
			fixnum_bits: 64 - 3,
			use_lsb_tag: true,
			lisp_cons_tag: 3,
		}
	}
}

/// Runtime-type binding (RTB, §2/§4.1): the backend types, the `LispObj`/`cast_union` local
/// factories, and the immutable RTB rvalues (`one`, `inttypebits`, `lisp_int0`,
/// `most_positive_fixnum`, `most_negative_fixnum`) materialized once as `long_long` constants.
#[derive(Debug)]
pub struct Rtb {
	pub constants: HostConstants,
	pub one: Value,
	pub inttypebits: Value,
	pub lisp_int0: Value,
	pub most_positive_fixnum: Value,
	pub most_negative_fixnum: Value,
	/// One imported zero-argument function per scratch slot (`scratch_call_area_0..15`), each
	/// returning that slot's lvalue. The opaque `Backend` trait has no pointer-arithmetic
	/// primitive, so `scratch_call_area[i]` is modeled as its own addressable global rather than
	/// base-pointer-plus-offset (§4.1/§4.5).
	pub scratch_slots: Vec<FunctionId>,
	/// `PT`/`ZV`/`BEGV`, the current buffer's point/end/beginning globals read by `point`/
	/// `point_max`/`point_min` (§4.3). Modeled the same way as `scratch_slots`: no base-pointer
	/// primitive exists to read a live host global, so each is its own zero-argument imported
	/// function, called for its current value.
	pub pt_fn: FunctionId,
	pub zv_fn: FunctionId,
	pub begv_fn: FunctionId,
	/// `eval_sub`, passed by address (not called) as `internal_catch`'s second argument (§4.3,
	/// §6's ABI contract).
	pub eval_sub: FunctionId,
}

impl Rtb {
	/// Acquires a fresh backend context's scalar constants. Mirrors the reference codebase's
	/// `Context::new` in that everything produced here outlives the compilation and is shared
	/// across every function the backend subsequently declares.
	pub fn new(backend: &mut dyn Backend, constants: HostConstants) -> Result<Self> {
		let one = backend.const_int(BackendType::LongLong, 1)?;
		let inttypebits = backend.const_int(BackendType::LongLong, constants.inttypebits)?;
		let lisp_int0 = backend.const_int(BackendType::LongLong, constants.lisp_int0)?;
		let most_positive_fixnum =
			backend.const_int(BackendType::LongLong, constants.most_positive_fixnum)?;
		let most_negative_fixnum =
			backend.const_int(BackendType::LongLong, constants.most_negative_fixnum)?;

		let mut scratch_slots = Vec::with_capacity(MAX_ARGS);
		for i in 0..MAX_ARGS {
			let name = format!("scratch_call_area_{i}");
			scratch_slots.push(backend.declare_function(&name, BackendType::VoidPtr, &[], FnKind::Imported)?);
		}

		let pt_fn = backend.declare_function("PT", BackendType::LongLong, &[], FnKind::Imported)?;
		let zv_fn = backend.declare_function("ZV", BackendType::LongLong, &[], FnKind::Imported)?;
		let begv_fn = backend.declare_function("BEGV", BackendType::LongLong, &[], FnKind::Imported)?;
		let eval_sub = backend.declare_function("eval_sub", BackendType::VoidPtr, &[BackendType::VoidPtr], FnKind::Imported)?;

		Ok(Rtb {
			constants,
			one,
			inttypebits,
			lisp_int0,
			most_positive_fixnum,
			most_negative_fixnum,
			scratch_slots,
			pt_fn,
			zv_fn,
			begv_fn,
			eval_sub,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests_support::RecordingBackend;

	#[test]
	fn rtb_constants_match_host_defaults() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, HostConstants::default()).unwrap();
		assert_eq!(backend.int_value(rtb.inttypebits), 3);
		assert_eq!(backend.int_value(rtb.lisp_int0), 0);
		assert_eq!(backend.int_value(rtb.one), 1);
	}
}
