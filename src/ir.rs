//! The seam between this crate and the code-generation backend.
//!
//! The backend itself — the thing that lowers typed IR to object code or assembly — is named
//! only by role in the design (§1: "an opaque IR builder"). This module defines that role as a
//! trait, the way the reference parsing library defines `AssemblyResolver` as a trait with a
//! single concrete implementation (`DefaultAssemblyResolver`) plugged into `Context` through a
//! `Box<dyn _>`. Production code plugs in a real JIT backend; `#[cfg(test)]` code in this crate
//! plugs in a recording backend that interprets the IR it is handed, which is what makes the
//! end-to-end scenarios in `tests/` assertable without linking a real code generator.

use std::fmt::Debug;

use crate::error::Result;

/// The backend's catalogue of scalar types (§4.1). `LispObj` and `cast_union` are not members of
/// this enum: they are two-field/four-field unions with no first-class scalar representation, and
/// are modeled separately via [`Backend::declare_lisp_obj_local`] /
/// [`Backend::declare_cast_union_local`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BackendType {
	Void,
	Int,
	UInt,
	LongLong,
	VoidPtr,
	PtrDiffT,
	Bool,
}

/// Which field of the `LispObj` union (`{as_ptr, as_num}`) an access targets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LispObjField {
	AsPtr,
	AsNum,
}

/// Which field of `cast_union` (`{ll, u, i, b}`) an access targets. Named to match §3/§9's
/// `cast_union` fields one-to-one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CastUnionField {
	LongLong,
	UInt,
	Int,
	Bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinOp {
	Add,
	Sub,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnOp {
	Neg,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
	Eq,
	Ne,
}

/// Exported primitives get a stable ABI name other Lisp code can call by symbol; imported
/// helpers are declarations of runtime routines this compiler never defines a body for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FnKind {
	Exported,
	Imported,
}

/// Opaque handle to a backend function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FunctionId(pub u32);

/// Opaque handle to a backend basic block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockId(pub u32);

/// Opaque handle to a backend rvalue/lvalue. The translator never inspects the bits behind this
/// handle; it only ever threads it back into further `Backend` calls.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Value(pub u32);

/// The collaborator named by role in §1 as "the code-generation backend": an opaque IR builder
/// accepting typed values, basic blocks, binary/unary/comparison ops, union field access,
/// function declarations and calls, and emitting object code or assembly.
///
/// Every method that can fail returns `Result` so a production implementation can surface a
/// backend-internal error without the translator having to know its shape (§7: "backend failure:
/// propagate opaquely").
pub trait Backend: Debug {
	fn declare_function(
		&mut self,
		name: &str,
		ret: BackendType,
		params: &[BackendType],
		kind: FnKind,
	) -> Result<FunctionId>;

	fn create_block(&mut self, func: FunctionId, name: &str) -> Result<BlockId>;

	/// A plain scalar local of one of the [`BackendType`] variants.
	fn declare_local(&mut self, func: FunctionId, ty: BackendType, name: &str) -> Result<Value>;

	/// A `LispObj`-typed local: a `{as_ptr, as_num}` union with no directly readable bit pattern.
	fn declare_lisp_obj_local(&mut self, func: FunctionId, name: &str) -> Result<Value>;

	/// A `cast_union`-typed local: a `{ll, u, i, b}` union used as the sole channel for
	/// reinterpreting bits between scalar types (§4.6, §9).
	fn declare_cast_union_local(&mut self, func: FunctionId, name: &str) -> Result<Value>;

	fn param_value(&self, func: FunctionId, index: usize) -> Result<Value>;

	fn const_int(&mut self, ty: BackendType, value: i64) -> Result<Value>;
	fn const_ptr(&mut self, addr: usize) -> Result<Value>;

	/// Materializes a declared function's own address as a `VoidPtr` rvalue, for the rare call
	/// sites that pass a callback *into* a helper rather than calling it directly (`eval_sub`
	/// passed to `internal_catch`, §4.3).
	fn emit_fn_addr(&mut self, block: BlockId, func: FunctionId) -> Result<Value>;

	fn emit_store(&mut self, block: BlockId, dst: Value, value: Value) -> Result<()>;
	fn emit_load(&mut self, block: BlockId, src: Value) -> Result<Value>;

	fn read_lisp_obj_field(&mut self, block: BlockId, local: Value, field: LispObjField) -> Result<Value>;
	fn write_lisp_obj_field(&mut self, block: BlockId, local: Value, field: LispObjField, value: Value) -> Result<()>;

	fn read_cast_union_field(&mut self, block: BlockId, local: Value, field: CastUnionField) -> Result<Value>;
	fn write_cast_union_field(&mut self, block: BlockId, local: Value, field: CastUnionField, value: Value) -> Result<()>;

	fn emit_binop(&mut self, block: BlockId, op: BinOp, ty: BackendType, lhs: Value, rhs: Value) -> Result<Value>;
	fn emit_unop(&mut self, block: BlockId, op: UnOp, ty: BackendType, value: Value) -> Result<Value>;
	fn emit_shift_right(&mut self, block: BlockId, value: Value, bits: Value) -> Result<Value>;
	fn emit_shift_left(&mut self, block: BlockId, value: Value, bits: Value) -> Result<Value>;
	fn emit_bitand(&mut self, block: BlockId, lhs: Value, rhs: Value) -> Result<Value>;
	fn emit_compare(&mut self, block: BlockId, op: CmpOp, lhs: Value, rhs: Value) -> Result<Value>;

	fn emit_call(&mut self, block: BlockId, callee: FunctionId, args: &[Value]) -> Result<Value>;

	/// Terminates `block` with an unconditional jump. Must only be called once per block.
	fn emit_jump(&mut self, block: BlockId, target: BlockId) -> Result<()>;
	/// Terminates `block` with a conditional jump. Must only be called once per block.
	fn emit_cond_jump(&mut self, block: BlockId, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<()>;
	/// Terminates `block` with a return. Must only be called once per block.
	fn emit_return(&mut self, block: BlockId, value: Value) -> Result<()>;

	/// Lowers everything declared so far and returns the entry point's identity. What a "code
	/// pointer" means is backend-specific; this crate only needs it to survive round-tripping
	/// through the loader (out of scope, §1).
	fn finalize(&mut self, func: FunctionId) -> Result<usize>;

	/// Produces an assembly-text dump of the finalized module, when requested via
	/// [`crate::debug::CompileOptions::disassemble`].
	fn disassemble(&mut self) -> Result<String>;
}
