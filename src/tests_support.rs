//! An in-memory recording/interpreting [`Backend`] standing in for the opaque third-party
//! code-generation backend named out of scope in §1. Real deployments link a real JIT backend;
//! this one records the IR operations it is handed per block and can interpret a finalized
//! function given argument words, which is what lets the end-to-end scenarios in `tests/` assert
//! on actual results without linking a real code generator.
//!
//! Gated behind `test-util` so this crate's own integration tests can use it without exposing it
//! as part of the public API surface consumed by real embedders.

use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::ir::{
	Backend, BackendType, BinOp, BlockId, CastUnionField, CmpOp, FnKind, FunctionId, LispObjField,
	UnOp, Value,
};

#[derive(Debug, Clone)]
enum Instr {
	ConstInt { dst: Value, val: i64 },
	ConstPtr { dst: Value, addr: usize },
	Store { dst: Value, src: Value },
	Load { dst: Value, src: Value },
	ReadLispObjField { dst: Value, local: Value },
	WriteLispObjField { local: Value, src: Value },
	ReadCastUnionField { dst: Value, local: Value },
	WriteCastUnionField { local: Value, src: Value },
	BinOp { dst: Value, op: BinOp, lhs: Value, rhs: Value },
	UnOp { dst: Value, op: UnOp, val: Value },
	ShiftRight { dst: Value, val: Value, bits: Value },
	ShiftLeft { dst: Value, val: Value, bits: Value },
	BitAnd { dst: Value, lhs: Value, rhs: Value },
	Compare { dst: Value, op: CmpOp, lhs: Value, rhs: Value },
	Call { dst: Value, callee: FunctionId, args: Vec<Value> },
	FnAddr { dst: Value, func: FunctionId },
}

#[derive(Debug, Clone)]
enum Terminator {
	Jump(BlockId),
	CondJump { cond: Value, then_block: BlockId, else_block: BlockId },
	Return(Value),
}

#[derive(Debug, Default, Clone)]
struct BlockRec {
	instrs: Vec<Instr>,
	terminator: Option<Terminator>,
}

#[derive(Debug, Clone)]
struct FunctionRec {
	name: String,
	params: Vec<Value>,
	entry: Option<BlockId>,
	blocks: Vec<BlockId>,
}

/// A stand-in for the opaque code-generation backend. Numeric local and temporary values are
/// stored as raw `i64` words, since `LispObj`'s `as_ptr`/`as_num` fields and `cast_union`'s four
/// fields all overlay the same storage in a real union — interpreting every [`Value`] as one
/// `i64` slot is a faithful enough model of that for the purposes of this test double.
#[derive(Debug, Default)]
pub struct RecordingBackend {
	next_value: u32,
	next_function: u32,
	next_block: u32,
	functions: HashMap<FunctionId, FunctionRec>,
	blocks: HashMap<BlockId, BlockRec>,
	/// What an imported function call should return, keyed by name. Defaults to `0` if absent.
	pub call_results: HashMap<String, i64>,
}

impl RecordingBackend {
	pub fn new() -> Self {
		Self::default()
	}

	fn fresh_value(&mut self) -> Value {
		let v = Value(self.next_value);
		self.next_value += 1;
		v
	}

	/// Reads back a previously recorded constant. Panics if `value` was never produced by
	/// [`Backend::const_int`] — intended for unit tests inspecting [`crate::rtb::Rtb`] output.
	pub fn int_value(&self, value: Value) -> i64 {
		for block in self.blocks.values() {
			for instr in &block.instrs {
				if let Instr::ConstInt { dst, val } = instr {
					if *dst == value {
						return *val;
					}
				}
			}
		}
		panic!("value {value:?} was never recorded as a constant");
	}

	pub fn function_name(&self, func: FunctionId) -> &str {
		&self.functions[&func].name
	}

	/// Interprets `func` with the given argument words and returns its single return value.
	pub fn run(&self, func: FunctionId, args: &[i64]) -> i64 {
		let rec = &self.functions[&func];
		let mut env: HashMap<Value, i64> = HashMap::default();
		for (param, arg) in rec.params.iter().zip(args) {
			env.insert(*param, *arg);
		}

		let mut current = rec.entry.expect("function has no entry block");
		loop {
			let block = &self.blocks[&current];
			for instr in &block.instrs {
				self.step(instr, &mut env);
			}
			match block.terminator.as_ref().expect("block has no terminator") {
				Terminator::Jump(target) => current = *target,
				Terminator::CondJump { cond, then_block, else_block } => {
					current = if env[cond] != 0 { *then_block } else { *else_block };
				}
				Terminator::Return(value) => return env[value],
			}
		}
	}

	fn step(&self, instr: &Instr, env: &mut HashMap<Value, i64>) {
		match *instr {
			Instr::ConstInt { dst, val } => {
				env.insert(dst, val);
			}
			Instr::ConstPtr { dst, addr } => {
				env.insert(dst, addr as i64);
			}
			Instr::Store { dst, src } => {
				let v = env[&src];
				env.insert(dst, v);
			}
			Instr::Load { dst, src } => {
				let v = env[&src];
				env.insert(dst, v);
			}
			Instr::ReadLispObjField { dst, local } | Instr::ReadCastUnionField { dst, local } => {
				let v = *env.get(&local).unwrap_or(&0);
				env.insert(dst, v);
			}
			Instr::WriteLispObjField { local, src } | Instr::WriteCastUnionField { local, src } => {
				let v = env[&src];
				env.insert(local, v);
			}
			Instr::BinOp { dst, op, lhs, rhs } => {
				let (a, b) = (env[&lhs], env[&rhs]);
				let r = match op {
					BinOp::Add => a.wrapping_add(b),
					BinOp::Sub => a.wrapping_sub(b),
				};
				env.insert(dst, r);
			}
			Instr::UnOp { dst, op, val } => {
				let a = env[&val];
				let r = match op {
					UnOp::Neg => a.wrapping_neg(),
				};
				env.insert(dst, r);
			}
			Instr::ShiftRight { dst, val, bits } => {
				let (a, b) = (env[&val], env[&bits]);
				env.insert(dst, a >> b);
			}
			Instr::ShiftLeft { dst, val, bits } => {
				let (a, b) = (env[&val], env[&bits]);
				env.insert(dst, a << b);
			}
			Instr::BitAnd { dst, lhs, rhs } => {
				let (a, b) = (env[&lhs], env[&rhs]);
				env.insert(dst, a & b);
			}
			Instr::Compare { dst, op, lhs, rhs } => {
				let (a, b) = (env[&lhs], env[&rhs]);
				let r = match op {
					CmpOp::Eq => a == b,
					CmpOp::Ne => a != b,
				};
				env.insert(dst, r as i64);
			}
			Instr::Call { dst, callee, ref args } => {
				let _ = args;
				let name = self.functions[&callee].name.clone();
				let result = *self.call_results.get(&name).unwrap_or(&0);
				env.insert(dst, result);
			}
			Instr::FnAddr { dst, func } => {
				env.insert(dst, func.0 as i64);
			}
		}
	}
}

impl Backend for RecordingBackend {
	fn declare_function(
		&mut self,
		name: &str,
		_ret: BackendType,
		params: &[BackendType],
		_kind: FnKind,
	) -> Result<FunctionId> {
		let id = FunctionId(self.next_function);
		self.next_function += 1;
		let param_values = params.iter().map(|_| self.fresh_value()).collect();
		self.functions.insert(
			id,
			FunctionRec { name: name.to_string(), params: param_values, entry: None, blocks: vec![] },
		);
		Ok(id)
	}

	fn create_block(&mut self, func: FunctionId, _name: &str) -> Result<BlockId> {
		let id = BlockId(self.next_block);
		self.next_block += 1;
		self.blocks.insert(id, BlockRec::default());
		let rec = self.functions.get_mut(&func).expect("unknown function");
		if rec.entry.is_none() {
			rec.entry = Some(id);
		}
		rec.blocks.push(id);
		Ok(id)
	}

	fn declare_local(&mut self, _func: FunctionId, _ty: BackendType, _name: &str) -> Result<Value> {
		Ok(self.fresh_value())
	}

	fn declare_lisp_obj_local(&mut self, _func: FunctionId, _name: &str) -> Result<Value> {
		Ok(self.fresh_value())
	}

	fn declare_cast_union_local(&mut self, _func: FunctionId, _name: &str) -> Result<Value> {
		Ok(self.fresh_value())
	}

	fn param_value(&self, func: FunctionId, index: usize) -> Result<Value> {
		Ok(self.functions[&func].params[index])
	}

	fn const_int(&mut self, _ty: BackendType, value: i64) -> Result<Value> {
		let dst = self.fresh_value();
		self.blocks.entry(BlockId(u32::MAX)).or_default();
		// Constants are not block-scoped in the real backend either (they're global rvalues);
		// record them against a sentinel block so they still show up for `int_value` lookups.
		self.blocks.get_mut(&BlockId(u32::MAX)).unwrap().instrs.push(Instr::ConstInt { dst, val: value });
		Ok(dst)
	}

	fn const_ptr(&mut self, addr: usize) -> Result<Value> {
		let dst = self.fresh_value();
		self.blocks.entry(BlockId(u32::MAX)).or_default();
		self.blocks.get_mut(&BlockId(u32::MAX)).unwrap().instrs.push(Instr::ConstPtr { dst, addr });
		Ok(dst)
	}

	fn emit_fn_addr(&mut self, block: BlockId, func: FunctionId) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::FnAddr { dst, func });
		Ok(dst)
	}

	fn emit_store(&mut self, block: BlockId, dst: Value, value: Value) -> Result<()> {
		self.block_mut(block)?.instrs.push(Instr::Store { dst, src: value });
		Ok(())
	}

	fn emit_load(&mut self, block: BlockId, src: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::Load { dst, src });
		Ok(dst)
	}

	fn read_lisp_obj_field(&mut self, block: BlockId, local: Value, _field: LispObjField) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::ReadLispObjField { dst, local });
		Ok(dst)
	}

	fn write_lisp_obj_field(&mut self, block: BlockId, local: Value, _field: LispObjField, value: Value) -> Result<()> {
		self.block_mut(block)?.instrs.push(Instr::WriteLispObjField { local, src: value });
		Ok(())
	}

	fn read_cast_union_field(&mut self, block: BlockId, local: Value, _field: CastUnionField) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::ReadCastUnionField { dst, local });
		Ok(dst)
	}

	fn write_cast_union_field(&mut self, block: BlockId, local: Value, _field: CastUnionField, value: Value) -> Result<()> {
		self.block_mut(block)?.instrs.push(Instr::WriteCastUnionField { local, src: value });
		Ok(())
	}

	fn emit_binop(&mut self, block: BlockId, op: BinOp, _ty: BackendType, lhs: Value, rhs: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::BinOp { dst, op, lhs, rhs });
		Ok(dst)
	}

	fn emit_unop(&mut self, block: BlockId, op: UnOp, _ty: BackendType, value: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::UnOp { dst, op, val: value });
		Ok(dst)
	}

	fn emit_shift_right(&mut self, block: BlockId, value: Value, bits: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::ShiftRight { dst, val: value, bits });
		Ok(dst)
	}

	fn emit_bitand(&mut self, block: BlockId, lhs: Value, rhs: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::BitAnd { dst, lhs, rhs });
		Ok(dst)
	}

	fn emit_shift_left(&mut self, block: BlockId, value: Value, bits: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::ShiftLeft { dst, val: value, bits });
		Ok(dst)
	}

	fn emit_compare(&mut self, block: BlockId, op: CmpOp, lhs: Value, rhs: Value) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::Compare { dst, op, lhs, rhs });
		Ok(dst)
	}

	fn emit_call(&mut self, block: BlockId, callee: FunctionId, args: &[Value]) -> Result<Value> {
		let dst = self.fresh_value();
		self.block_mut(block)?.instrs.push(Instr::Call { dst, callee, args: args.to_vec() });
		Ok(dst)
	}

	fn emit_jump(&mut self, block: BlockId, target: BlockId) -> Result<()> {
		let b = self.block_mut(block)?;
		if b.terminator.is_some() {
			return Err(CompileError::Backend(format!("block {block:?} terminated twice")));
		}
		b.terminator = Some(Terminator::Jump(target));
		Ok(())
	}

	fn emit_cond_jump(&mut self, block: BlockId, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
		let b = self.block_mut(block)?;
		if b.terminator.is_some() {
			return Err(CompileError::Backend(format!("block {block:?} terminated twice")));
		}
		b.terminator = Some(Terminator::CondJump { cond, then_block, else_block });
		Ok(())
	}

	fn emit_return(&mut self, block: BlockId, value: Value) -> Result<()> {
		let b = self.block_mut(block)?;
		if b.terminator.is_some() {
			return Err(CompileError::Backend(format!("block {block:?} terminated twice")));
		}
		b.terminator = Some(Terminator::Return(value));
		Ok(())
	}

	fn finalize(&mut self, func: FunctionId) -> Result<usize> {
		for block in &self.functions[&func].blocks {
			if self.blocks[block].terminator.is_none() {
				return Err(CompileError::Backend(format!("block {block:?} left unterminated")));
			}
		}
		Ok(func.0 as usize)
	}

	fn disassemble(&mut self) -> Result<String> {
		Ok(format!("{} blocks recorded", self.blocks.len()))
	}
}

impl RecordingBackend {
	fn block_mut(&mut self, block: BlockId) -> Result<&mut BlockRec> {
		self.blocks
			.get_mut(&block)
			.ok_or_else(|| CompileError::Backend(format!("unknown block {block:?}")))
	}

	/// Every block belonging to `func`, in creation order — used by CFG invariant tests.
	pub fn blocks_of(&self, func: FunctionId) -> &[BlockId] {
		&self.functions[&func].blocks
	}

	pub fn is_terminated(&self, block: BlockId) -> bool {
		self.blocks[&block].terminator.is_some()
	}
}
