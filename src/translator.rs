//! The bytecode-to-IR translator (TR, §4.3): the main pass. Walks bytecodes in PC order,
//! maintains an abstract compile-time operand stack, switches blocks as PCs cross leaders, and
//! emits IR per opcode, inlining the `sub1`/`add1`/`negate`/`consp` fast paths.
//!
//! Grounded in the same shape as cranelift-wasm's `FuncTranslator::translate_body`: a loop over
//! opcodes that threads a `FuncEnvironment`-like collaborator (here, [`Rtb`] + [`SymbolTable`] +
//! `dyn Backend`) and an explicit value stack rather than relying on the backend to be stack
//! shaped itself.

use std::collections::HashSet;

use crate::bytecode::{CompareCode, Op, decode_one};
use crate::cfg::{self, BlockMap};
use crate::error::{CompileError, Result};
use crate::ir::{
	Backend, BackendType, BinOp, BlockId, CastUnionField, CmpOp, FunctionId, LispObjField, UnOp,
	Value,
};
use crate::rtb::{Rtb, MAX_ARGS};
use crate::symtab::SymbolTable;

/// Placeholder backend type standing in for `LispObj` at call boundaries (§4.1: `as_ptr` is
/// pointer-typed on every host this translator targets).
const LISP_OBJ: BackendType = BackendType::VoidPtr;

/// Which numeric limit guards the `sub1`/`add1`/`negate` inline fast path (§4.6).
#[derive(Copy, Clone)]
enum InlineArith {
	Sub1,
	Add1,
	Negate,
}

pub struct Translator<'a> {
	backend: &'a mut dyn Backend,
	rtb: &'a Rtb,
	st: &'a mut SymbolTable,
	func: FunctionId,
	block_map: BlockMap,
	slots: Vec<Value>,
	depth: usize,
	stack_depth: usize,
	current: BlockId,
	terminated: HashSet<BlockId>,
	nil: Option<Value>,
	next_const_local: u32,
}

impl<'a> Translator<'a> {
	/// Builds the prologue (stack-slot locals + parameter copy-in, §4.4), reconstructs the body's
	/// CFG (§CFGB), and returns a translator positioned at `BlockMap[0]` ready to consume opcodes.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(backend, rtb, st, code)))]
	pub fn new(
		backend: &'a mut dyn Backend,
		rtb: &'a Rtb,
		st: &'a mut SymbolTable,
		func: FunctionId,
		prologue: BlockId,
		code: &[u8],
		stack_depth: usize,
		max_args: usize,
	) -> Result<Self> {
		#[cfg(feature = "tracing")]
		tracing::debug!(stack_depth, max_args, len = code.len(), "building prologue");

		let mut slots = Vec::with_capacity(stack_depth);
		for i in 0..stack_depth {
			slots.push(backend.declare_lisp_obj_local(func, &format!("local_{i}"))?);
		}
		for i in 0..max_args {
			let param = backend.param_value(func, i)?;
			backend.emit_store(prologue, slots[i], param)?;
		}

		let block_map = cfg::build(code, |_pc| backend.create_block(func, "bb"))?;
		let entry = block_map.block_of(0);
		backend.emit_jump(prologue, entry)?;

		let mut terminated = HashSet::new();
		terminated.insert(prologue);

		Ok(Translator {
			backend,
			rtb,
			st,
			func,
			block_map,
			slots,
			depth: max_args,
			stack_depth,
			current: entry,
			terminated,
			nil: None,
			next_const_local: 0,
		})
	}

	/// Runs the per-opcode dispatch loop over the whole byte string (§4.3's "Translation loop").
	/// `constants` is the function's literal vector, given as raw host addresses (the runtime
	/// value system that owns their actual representation is out of scope, §1).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self, code, constants)))]
	pub fn run(&mut self, code: &[u8], constants: &[usize]) -> Result<()> {
		self.materialize_nil()?;

		let mut pc = 0;
		while pc < code.len() {
			self.ensure_block(pc)?;
			let (op, next_pc) = decode_one(code, pc)?;
			#[cfg(feature = "tracing")]
			tracing::trace!(pc, ?op, "dispatch");
			self.translate_one(op, pc, next_pc, constants)?;
			pc = next_pc;
		}
		Ok(())
	}

	/// Before processing the opcode at `pc`: if the current block isn't the block owning `pc` and
	/// hasn't been terminated yet, synthesize the fall-through jump, then switch to it (§4.3).
	fn ensure_block(&mut self, pc: usize) -> Result<()> {
		let target = self.block_map.block_of(pc);
		if target != self.current && !self.terminated.contains(&self.current) {
			self.backend.emit_jump(self.current, target)?;
			self.terminated.insert(self.current);
		}
		self.current = target;
		Ok(())
	}

	fn terminate_jump(&mut self, target: BlockId) -> Result<()> {
		self.backend.emit_jump(self.current, target)?;
		self.terminated.insert(self.current);
		Ok(())
	}

	fn terminate_cond(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
		self.backend.emit_cond_jump(self.current, cond, then_block, else_block)?;
		self.terminated.insert(self.current);
		Ok(())
	}

	fn terminate_return(&mut self, value: Value) -> Result<()> {
		self.backend.emit_return(self.current, value)?;
		self.terminated.insert(self.current);
		Ok(())
	}

	fn push(&mut self, pc: usize, value: Value) -> Result<()> {
		if self.depth >= self.stack_depth {
			return Err(CompileError::StackOverflow { pc });
		}
		self.backend.emit_store(self.current, self.slots[self.depth], value)?;
		self.depth += 1;
		Ok(())
	}

	fn pop(&mut self, pc: usize) -> Result<Value> {
		if self.depth == 0 {
			return Err(CompileError::StackUnderflow { pc });
		}
		self.depth -= 1;
		self.backend.emit_load(self.current, self.slots[self.depth])
	}

	fn peek(&mut self, pc: usize) -> Result<Value> {
		if self.depth == 0 {
			return Err(CompileError::StackUnderflow { pc });
		}
		self.backend.emit_load(self.current, self.slots[self.depth - 1])
	}

	fn nth_from_top(&mut self, pc: usize, n: usize) -> Result<Value> {
		if n >= self.depth {
			return Err(CompileError::StackUnderflow { pc });
		}
		self.backend.emit_load(self.current, self.slots[self.depth - 1 - n])
	}

	fn overwrite_tos(&mut self, pc: usize, value: Value) -> Result<()> {
		if self.depth == 0 {
			return Err(CompileError::StackUnderflow { pc });
		}
		self.backend.emit_store(self.current, self.slots[self.depth - 1], value)
	}

	/// Embeds constant-vector entry `idx`'s raw address as a fresh `LispObj` rvalue (§4.8).
	fn materialize_constant(&mut self, constants: &[usize], idx: usize) -> Result<Value> {
		let addr = *constants.get(idx).unwrap_or(&0);
		let local = self.backend.declare_lisp_obj_local(self.func, &format!("k{}", self.next_const_local))?;
		self.next_const_local += 1;
		let ptr = self.backend.const_ptr(addr)?;
		self.backend.write_lisp_obj_field(self.current, local, LispObjField::AsPtr, ptr)?;
		Ok(local)
	}

	/// `nil` is materialized once, at the top of `BlockMap[0]`, and reused everywhere (§4.8).
	fn materialize_nil(&mut self) -> Result<Value> {
		if let Some(v) = self.nil {
			return Ok(v);
		}
		let local = self.backend.declare_lisp_obj_local(self.func, "nil")?;
		let ptr = self.backend.const_ptr(0)?;
		self.backend.write_lisp_obj_field(self.current, local, LispObjField::AsPtr, ptr)?;
		self.nil = Some(local);
		Ok(local)
	}

	/// Writes `from` into `to_field` via a `cast_union` local and reads it back: the only channel
	/// this backend exposes for reinterpreting bits between scalar representations (§9).
	fn reinterpret(&mut self, from: Value, from_field: CastUnionField, to_field: CastUnionField) -> Result<Value> {
		let local = self.backend.declare_cast_union_local(self.func, "cast")?;
		self.backend.write_cast_union_field(self.current, local, from_field, from)?;
		self.backend.read_cast_union_field(self.current, local, to_field)
	}

	/// `FIXNUMP(x)`/`CONSP(x)`'s shared tag test (§4.6): `!((XLI(x) >> shift) - (tag >> lsb)) &
	/// mask)`, returning a 0/1 boolean `Value`.
	fn tag_test(&mut self, value: Value, tag: Value) -> Result<Value> {
		let c = self.rtb.constants;
		let xli = self.backend.read_lisp_obj_field(self.current, value, LispObjField::AsNum)?;
		let shift_amount = if c.use_lsb_tag { 0 } else { c.fixnum_bits };
		let shift_const = self.backend.const_int(BackendType::LongLong, shift_amount)?;
		let shifted = self.backend.emit_shift_right(self.current, xli, shift_const)?;
		let shifted_u = self.reinterpret(shifted, CastUnionField::LongLong, CastUnionField::UInt)?;

		let tag_shift_amount = if c.use_lsb_tag { 0 } else { 1 };
		let tag_shift_const = self.backend.const_int(BackendType::LongLong, tag_shift_amount)?;
		let tag_shifted = self.backend.emit_shift_right(self.current, tag, tag_shift_const)?;
		let tag_shifted_u = self.reinterpret(tag_shifted, CastUnionField::LongLong, CastUnionField::UInt)?;

		let diff = self.backend.emit_binop(self.current, BinOp::Sub, BackendType::UInt, shifted_u, tag_shifted_u)?;
		let mask_val = (1i64 << c.inttypebits) - 1;
		let mask = self.backend.const_int(BackendType::UInt, mask_val)?;
		let masked = self.backend.emit_bitand(self.current, diff, mask)?;
		let zero = self.backend.const_int(BackendType::UInt, 0)?;
		self.backend.emit_compare(self.current, CmpOp::Eq, masked, zero)
	}

	fn xfixnum(&mut self, value: Value) -> Result<Value> {
		let xli = self.backend.read_lisp_obj_field(self.current, value, LispObjField::AsNum)?;
		let shift = self.backend.const_int(BackendType::LongLong, self.rtb.constants.inttypebits)?;
		self.backend.emit_shift_right(self.current, xli, shift)
	}

	/// `make_fixnum(n) = (n << INTTYPEBITS) + Lisp_Int0`, stored into a fresh `LispObj` local.
	fn make_fixnum(&mut self, n: Value) -> Result<Value> {
		let shift = self.backend.const_int(BackendType::LongLong, self.rtb.constants.inttypebits)?;
		let shifted = self.backend.emit_shift_left(self.current, n, shift)?;
		let num = self.backend.emit_binop(self.current, BinOp::Add, BackendType::LongLong, shifted, self.rtb.lisp_int0)?;
		let local = self.backend.declare_lisp_obj_local(self.func, "fixnum")?;
		self.backend.write_lisp_obj_field(self.current, local, LispObjField::AsNum, num)?;
		Ok(local)
	}

	/// `point`/`point_max`/`point_min` (§4.3): call the zero-arg host global accessor, then the
	/// imported `make_fixed_natnum` helper on the raw integer it returns, and push the result.
	fn push_host_global_natnum(&mut self, pc: usize, global: crate::ir::FunctionId) -> Result<()> {
		let raw = self.backend.emit_call(self.current, global, &[])?;
		let v = self.st.emit_call(self.backend, self.current, "make_fixed_natnum", LISP_OBJ, &[raw])?;
		self.push(pc, v)
	}

	/// Marshals `args` through the variadic calling convention's scratch area and calls `helper`
	/// as `helper(nargs, args)` (§4.5).
	fn emit_variadic_call(&mut self, pc: usize, helper: &str, args: &[Value]) -> Result<Value> {
		if args.len() > MAX_ARGS {
			return Err(CompileError::TooManyArguments { pc, count: args.len() });
		}
		for (i, &arg) in args.iter().enumerate() {
			let slot_fn = self.rtb.scratch_slots[i];
			let slot_lvalue = self.backend.emit_call(self.current, slot_fn, &[])?;
			self.backend.emit_store(self.current, slot_lvalue, arg)?;
		}
		let base_fn = self.rtb.scratch_slots[0];
		let args_ptr = self.backend.emit_call(self.current, base_fn, &[])?;
		let nargs = self.backend.const_int(BackendType::PtrDiffT, args.len() as i64)?;
		self.st.emit_call(self.backend, self.current, helper, LISP_OBJ, &[nargs, args_ptr])
	}

	fn translate_one(&mut self, op: Op, pc: usize, next_pc: usize, constants: &[usize]) -> Result<()> {
		match op {
			Op::StackRef(n) => {
				let v = self.nth_from_top(pc, n as usize)?;
				self.push(pc, v)
			}
			Op::StackSet(n) => {
				let v = self.pop(pc)?;
				let idx = n as usize;
				if idx >= self.stack_depth {
					return Err(CompileError::StackOverflow { pc });
				}
				self.backend.emit_store(self.current, self.slots[idx], v)
			}
			Op::Dup => {
				let v = self.peek(pc)?;
				self.push(pc, v)
			}
			Op::Discard => {
				self.pop(pc)?;
				Ok(())
			}

			Op::VarRef(idx) => {
				let sym = self.materialize_constant(constants, idx as usize)?;
				let v = self.st.emit_call(self.backend, self.current, "Fsymbol_value", LISP_OBJ, &[sym])?;
				self.push(pc, v)
			}
			Op::VarSet(idx) => {
				let sym = self.materialize_constant(constants, idx as usize)?;
				let val = self.pop(pc)?;
				let nil = self.materialize_nil()?;
				let set_flag = self.backend.const_int(BackendType::Int, 0)?; // SET_INTERNAL_SET
				self.st.emit_call(self.backend, self.current, "set_internal", BackendType::Void, &[sym, val, nil, set_flag])?;
				Ok(())
			}
			Op::VarBind(idx) => {
				let sym = self.materialize_constant(constants, idx as usize)?;
				let val = self.pop(pc)?;
				self.st.emit_call(self.backend, self.current, "specbind", BackendType::Void, &[sym, val])?;
				Ok(())
			}

			Op::Call(n) => {
				let nargs = n as usize + 1;
				let mut args = Vec::with_capacity(nargs);
				for _ in 0..nargs {
					args.push(self.pop(pc)?);
				}
				args.reverse();
				let v = self.emit_variadic_call(pc, "Ffuncall", &args)?;
				self.push(pc, v)
			}
			Op::Unbind(n) => {
				let count = self.backend.const_int(BackendType::PtrDiffT, n as i64)?;
				self.st.emit_call(self.backend, self.current, "helper_unbind_n", BackendType::Void, &[count])?;
				Ok(())
			}

			Op::ListN(n) => {
				let mut acc = self.materialize_nil()?;
				for _ in 0..n {
					let elem = self.pop(pc)?;
					acc = self.st.emit_call(self.backend, self.current, "Fcons", LISP_OBJ, &[elem, acc])?;
				}
				self.push(pc, acc)
			}

			Op::Sub1 => self.inline_arith(pc, next_pc, InlineArith::Sub1),
			Op::Add1 => self.inline_arith(pc, next_pc, InlineArith::Add1),
			Op::Negate => self.inline_arith(pc, next_pc, InlineArith::Negate),
			Op::Consp => self.inline_consp(pc),

			Op::Goto(target) => {
				let target_block = self.block_map.block_of(target);
				self.terminate_jump(target_block)
			}
			Op::GotoIfNil(target) => self.conditional_branch(pc, next_pc, target, CmpOp::Eq, true),
			Op::GotoIfNonNil(target) => self.conditional_branch(pc, next_pc, target, CmpOp::Ne, true),
			Op::GotoIfNilElsePop(target) => self.conditional_branch(pc, next_pc, target, CmpOp::Eq, false),
			Op::GotoIfNonNilElsePop(target) => self.conditional_branch(pc, next_pc, target, CmpOp::Ne, false),

			Op::Return => {
				let v = self.pop(pc)?;
				self.terminate_return(v)
			}

			Op::Constant(idx) => {
				let v = self.materialize_constant(constants, idx as usize)?;
				self.push(pc, v)
			}

			Op::RuntimeCall { helper, pops } => {
				let mut args = Vec::with_capacity(pops as usize);
				for _ in 0..pops {
					args.push(self.pop(pc)?);
				}
				args.reverse();
				let v = self.st.emit_call(self.backend, self.current, helper, LISP_OBJ, &args)?;
				self.push(pc, v)
			}

			Op::VariadicCall { helper, nargs } => {
				let mut args = Vec::with_capacity(nargs as usize);
				for _ in 0..nargs {
					args.push(self.pop(pc)?);
				}
				args.reverse();
				let v = self.emit_variadic_call(pc, helper, &args)?;
				self.push(pc, v)
			}

			Op::Compare(code) => {
				let b = self.pop(pc)?;
				let a = self.pop(pc)?;
				let code_const = self.backend.const_int(BackendType::Int, compare_code_value(code))?;
				let v = self.st.emit_call(self.backend, self.current, "arithcompare", LISP_OBJ, &[a, b, code_const])?;
				self.push(pc, v)
			}

			Op::Catch => {
				let body = self.pop(pc)?;
				let tag = self.pop(pc)?;
				let eval_sub = self.backend.emit_fn_addr(self.current, self.rtb.eval_sub)?;
				let v = self.st.emit_call(self.backend, self.current, "internal_catch", LISP_OBJ, &[tag, eval_sub, body])?;
				self.push(pc, v)
			}
			Op::UnwindProtect => {
				let func_arg = self.pop(pc)?;
				self.st.emit_call(self.backend, self.current, "helper_unwind_protect", BackendType::Void, &[func_arg])?;
				Ok(())
			}
			Op::ConditionCase => {
				let handlers = self.pop(pc)?;
				let body = self.pop(pc)?;
				let var = self.pop(pc)?;
				let v = self.st.emit_call(
					self.backend,
					self.current,
					"internal_lisp_condition_case",
					LISP_OBJ,
					&[var, body, handlers],
				)?;
				self.push(pc, v)
			}

			Op::Point => {
				let g = self.rtb.pt_fn;
				self.push_host_global_natnum(pc, g)
			}
			Op::PointMax => {
				let g = self.rtb.zv_fn;
				self.push_host_global_natnum(pc, g)
			}
			Op::PointMin => {
				let g = self.rtb.begv_fn;
				self.push_host_global_natnum(pc, g)
			}
			Op::TempOutputBufferShow => {
				let arg = self.pop(pc)?;
				let v = self.st.emit_call(self.backend, self.current, "Ftemp_output_buffer_show", LISP_OBJ, &[arg])?;
				let count = self.backend.const_int(BackendType::PtrDiffT, 1)?;
				self.st.emit_call(self.backend, self.current, "helper_unbind_n", BackendType::Void, &[count])?;
				self.push(pc, v)
			}

			Op::Unsupported(opcode) => Err(CompileError::UnsupportedOpcode { opcode, pc }),
		}
	}

	fn conditional_branch(
		&mut self,
		pc: usize,
		next_pc: usize,
		target: usize,
		cmp: CmpOp,
		pops: bool,
	) -> Result<()> {
		if !pops && self.block_map.is_branch_target(next_pc) {
			// The fall-through PC is also reachable from some other goto/gotoif*, which never
			// executes this instruction's implicit pop, so the two predecessors would disagree
			// on stack depth at the join (§4.7).
			return Err(CompileError::UnsafeConditionalPop { pc });
		}

		let val = if pops { self.pop(pc)? } else { self.peek(pc)? };
		let nil = self.materialize_nil()?;
		let cond = self.backend.emit_compare(self.current, cmp, val, nil)?;
		let then_block = self.block_map.block_of(target);
		let else_block = self.block_map.block_of(next_pc);
		self.terminate_cond(cond, then_block, else_block)?;
		if !pops {
			// gotoifnilelsepop/gotoifnonnilelsepop (§4.7): the "else" edge still owes a pop,
			// realized at the start of the fall-through block. Since the abstract stack pointer
			// is pure compile-time bookkeeping (§3), no IR needs to be emitted for it.
			self.depth -= 1;
		}
		Ok(())
	}

	fn inline_arith(&mut self, pc: usize, next_pc: usize, which: InlineArith) -> Result<()> {
		let tos = self.peek(pc)?;
		let lisp_int0 = self.rtb.lisp_int0;
		let is_fixnum = self.tag_test(tos, lisp_int0)?;
		let xf = self.xfixnum(tos)?;
		let limit = match which {
			InlineArith::Sub1 | InlineArith::Negate => self.rtb.most_negative_fixnum,
			InlineArith::Add1 => self.rtb.most_positive_fixnum,
		};
		let not_overflow = self.backend.emit_compare(self.current, CmpOp::Ne, xf, limit)?;
		let guard = self.backend.emit_bitand(self.current, is_fixnum, not_overflow)?;

		let inline_block = self.backend.create_block(self.func, "inline")?;
		let fcall_block = self.backend.create_block(self.func, "fcall")?;
		let join_block = self.block_map.block_of(next_pc);

		self.terminate_cond(guard, inline_block, fcall_block)?;

		self.current = inline_block;
		let result_num = match which {
			InlineArith::Sub1 => {
				let one = self.rtb.one;
				self.backend.emit_binop(self.current, BinOp::Sub, BackendType::LongLong, xf, one)?
			}
			InlineArith::Add1 => {
				let one = self.rtb.one;
				self.backend.emit_binop(self.current, BinOp::Add, BackendType::LongLong, xf, one)?
			}
			InlineArith::Negate => self.backend.emit_unop(self.current, UnOp::Neg, BackendType::LongLong, xf)?,
		};
		let inline_result = self.make_fixnum(result_num)?;
		self.overwrite_tos(pc, inline_result)?;
		self.terminate_jump(join_block)?;

		self.current = fcall_block;
		let arg = self.pop(pc)?;
		let helper = match which {
			InlineArith::Sub1 => "Fsub1",
			InlineArith::Add1 => "Fadd1",
			InlineArith::Negate => "Fminus",
		};
		let fcall_result = self.emit_variadic_call(pc, helper, &[arg])?;
		self.push(pc, fcall_result)?;
		self.terminate_jump(join_block)?;

		self.current = join_block;
		Ok(())
	}

	fn inline_consp(&mut self, pc: usize) -> Result<()> {
		let tos = self.peek(pc)?;
		let cons_tag = self.backend.const_int(BackendType::LongLong, self.rtb.constants.lisp_cons_tag)?;
		let is_cons = self.tag_test(tos, cons_tag)?;
		let widened = self.reinterpret(is_cons, CastUnionField::UInt, CastUnionField::LongLong)?;
		let boxed = self.make_fixnum(widened)?;
		self.overwrite_tos(pc, boxed)
	}
}

fn compare_code_value(code: CompareCode) -> i64 {
	match code {
		CompareCode::Equal => 0,
		CompareCode::Grtr => 1,
		CompareCode::Less => 2,
		CompareCode::LessOrEqual => 3,
		CompareCode::GrtrOrEqual => 4,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ir::FnKind;
	use crate::tests_support::RecordingBackend;

	fn new_fn(backend: &mut RecordingBackend, max_args: usize) -> (FunctionId, BlockId) {
		let params: Vec<BackendType> = (0..max_args).map(|_| BackendType::VoidPtr).collect();
		let func = backend.declare_function("f", BackendType::VoidPtr, &params, FnKind::Exported).unwrap();
		let prologue = backend.create_block(func, "prologue").unwrap();
		(func, prologue)
	}

	// S1: constant; return -> returns the constant's value.
	#[test]
	fn constant_then_return() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o207]; // constant 0; return
		let constants = [42usize];

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert_eq!(backend.run(func, &[]), 42);
	}

	// S4: push 7; dup; discard; return -> returns 7, single block.
	#[test]
	fn dup_discard_round_trips_tos() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o211, 0o210, 0o207]; // constant 0; dup; discard; return
		let constants = [7usize];

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 2, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert_eq!(backend.run(func, &[]), 7);
	}

	// S3: push nil; gotoifnil 6; push constant1; return; push constant1(else); return
	#[test]
	fn gotoifnil_takes_the_branch_on_nil() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o203, 6, 0, 0o301, 0o207, 0o301, 0o207];
		let constants = [0usize, 123usize];

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert!(backend.blocks_of(func).len() >= 3);
	}

	#[test]
	fn unsupported_opcode_is_a_hard_error() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o60u8]; // pophandler
		let constants: [usize; 0] = [];

		let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
		let err = tr.run(&code, &constants);
		assert!(matches!(err, Err(CompileError::UnsupportedOpcode { opcode: 0o60, pc: 0 })));
	}

	#[test]
	fn every_block_ends_up_terminated() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o203, 6, 0, 0o301, 0o207, 0o301, 0o207];
		let constants = [0usize, 123usize];

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		assert!(backend.finalize(func).is_ok());
	}

	// point; return -> calls the PT global accessor then make_fixed_natnum, pushes its result.
	#[test]
	fn point_calls_make_fixed_natnum_on_the_host_global() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o140u8, 0o207]; // point; return
		let constants: [usize; 0] = [];
		backend.call_results.insert("make_fixed_natnum".to_string(), 17);

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert_eq!(backend.run(func, &[]), 17);
	}

	// constant 0; temp_output_buffer_show; return -> the helper's result is pushed and the
	// cleanup unbind_n call is declared alongside it.
	#[test]
	fn temp_output_buffer_show_emits_its_unbind_cleanup() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o221, 0o207]; // constant 0; temp_output_buffer_show; return
		let constants = [0usize];
		backend.call_results.insert("Ftemp_output_buffer_show".to_string(), 5);

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert_eq!(backend.run(func, &[]), 5);
		assert!(st.get("helper_unbind_n").is_some());
	}

	// constant 0; dup; catch; return -> internal_catch's result is pushed, built against a real
	// declared eval_sub function address rather than a null pointer.
	#[test]
	fn catch_builds_against_a_declared_eval_sub() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o211, 0o215, 0o207]; // constant 0; dup; catch; return
		let constants = [0usize];
		backend.call_results.insert("internal_catch".to_string(), 9);

		{
			let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 2, 0).unwrap();
			tr.run(&code, &constants).unwrap();
		}
		backend.finalize(func).unwrap();
		assert_eq!(backend.run(func, &[]), 9);
	}

	// constant 0 (nil); gotoifnilelsepop 7; return (else/fallthrough at pc 4); constant 0;
	// return; discard (pc 7, the "then" target); goto 4 -- another edge into the fallthrough pc.
	#[test]
	fn gotoifnilelsepop_rejects_a_fallthrough_shared_with_another_edge() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);
		let code = [0o300u8, 0o205, 7, 0, 0o207, 0o300, 0o207, 0o210, 0o202, 4, 0];
		let constants = [0usize];

		let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 1, 0).unwrap();
		let err = tr.run(&code, &constants);
		assert!(matches!(err, Err(CompileError::UnsafeConditionalPop { pc: 1 })));
	}

	// 17 constant pushes then a call with n=16 (17 args: callee + 16 args), one past MAX_ARGS,
	// must surface a typed error rather than panic indexing scratch_slots.
	#[test]
	fn variadic_call_past_max_args_is_a_typed_error() {
		let mut backend = RecordingBackend::new();
		let rtb = Rtb::new(&mut backend, crate::rtb::HostConstants::default()).unwrap();
		let mut st = SymbolTable::new();
		let (func, prologue) = new_fn(&mut backend, 0);

		let mut code = vec![0o300u8; 17];
		code.extend_from_slice(&[0o47, 16, 0]); // call7 (2-byte operand form), n = 16
		code.push(0o207); // return
		let constants = [0usize];

		let mut tr = Translator::new(&mut backend, &rtb, &mut st, func, prologue, &code, 17, 0).unwrap();
		let err = tr.run(&code, &constants);
		assert!(matches!(err, Err(CompileError::TooManyArguments { pc: 17, count: 17 })));
	}
}
