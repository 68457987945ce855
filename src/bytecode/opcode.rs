//! Bytecode opcode identities and decoding (§4.3, §10.5).
//!
//! The numeric discriminants below reproduce the source VM's bytecode table exactly (octal
//! groups of eight: `stack_ref` at `0o00`, `varref` at `0o10`, `varset` at `0o20`, `varbind` at
//! `0o30`, `call` at `0o40`, `unbind` at `0o50`, ...), so a byte string produced by a real
//! compiler decodes correctly rather than against an invented numbering.

use crate::error::{CompileError, Result};

/// A comparison code for `arithcompare` (§4.3 "Arithmetic comparisons").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompareCode {
	Equal,
	Grtr,
	Less,
	LessOrEqual,
	GrtrOrEqual,
}

/// A decoded instruction, one step above the raw opcode byte: operand widths have already been
/// resolved (the `1..7` suffix families collapse into a single variant carrying the final
/// numeric operand), and PC-relative branch targets have already been converted to absolute PCs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Op {
	StackRef(u16),
	StackSet(u16),
	Dup,
	Discard,

	VarRef(u16),
	VarSet(u16),
	VarBind(u16),

	Call(u16),
	Unbind(u16),

	/// `list1..4`/`listN`: pop `n` elements, build a right-to-left `cons` chain (§4.3).
	ListN(u8),

	Sub1,
	Add1,
	Negate,
	Consp,

	Goto(usize),
	GotoIfNil(usize),
	GotoIfNonNil(usize),
	GotoIfNilElsePop(usize),
	GotoIfNonNilElsePop(usize),
	Return,

	Constant(u16),

	/// A fixed-arity direct call to a named runtime helper (§4.3's long list of predicates,
	/// accessors and buffer/point intrinsics): pop `pops` values, call `helper`, push the result.
	RuntimeCall { helper: &'static str, pops: u8 },

	/// A call routed through the variadic calling convention (§4.5): pop `nargs` values, marshal
	/// them through `scratch_call_area`, call `helper`.
	VariadicCall { helper: &'static str, nargs: u8 },

	Compare(CompareCode),

	/// `catch`: pop 2, `internal_catch(tag, eval_sub, body)`.
	Catch,
	/// `unwind_protect`: pop 1, `helper_unwind_protect`.
	UnwindProtect,
	/// `condition_case`: pop 3, `internal_lisp_condition_case`.
	ConditionCase,

	/// `point`: push `make_fixed_natnum(PT)` (§4.3).
	Point,
	/// `point_max`: push `make_fixed_natnum(ZV)` (§4.3).
	PointMax,
	/// `point_min`: push `make_fixed_natnum(BEGV)` (§4.3).
	PointMin,
	/// `temp_output_buffer_show`: pop 1, call the helper, then `helper_unbind_n(1)` to clean up
	/// the binding `temp_output_buffer_setup` pushed (§4.3).
	TempOutputBufferShow,

	/// An opcode this translator refuses to compile (§4.3's unsupported list).
	Unsupported(u8),
}

macro_rules! simple_calls {
	($byte:expr, $($mnemonic:literal => $helper:literal : $pops:literal),* $(,)?) => {
		match $byte {
			$($mnemonic => Some(Op::RuntimeCall { helper: $helper, pops: $pops }),)*
			_ => None,
		}
	};
}

fn decode_fixed_arity_call(op: u8) -> Option<Op> {
	simple_calls! { op,
		0o71  => "Fsymbolp": 1,
		0o73  => "Fstringp": 1,
		0o74  => "Flistp": 1,
		0o75  => "Feq": 2,
		0o76  => "Fmemq": 2,
		0o77  => "Fnot": 1,
		0o100 => "Fcar": 1,
		0o101 => "Fcdr": 1,
		0o102 => "Fcons": 2,
		0o107 => "Flength": 1,
		0o110 => "Faref": 2,
		0o111 => "Faset": 3,
		0o112 => "Fsymbol_value": 1,
		0o113 => "Fsymbol_function": 1,
		0o114 => "Fset": 2,
		0o115 => "Ffset": 2,
		0o116 => "Fget": 2,
		0o117 => "Fsubstring": 3,
		0o70  => "Fnth": 2,
		0o141 => "record_unwind_current_buffer": 0,
		0o142 => "Fgoto_char": 1,
		0o212 => "record_unwind_protect_excursion": 0,
		0o213 => "helper_save_window_excursion": 1,
		0o214 => "record_unwind_protect": 0,
		0o220 => "temp_output_buffer_setup": 1,
		0o146 => "Fchar_after": 1,
		0o147 => "Ffollowing_char": 0,
		0o150 => "Fprevious_char": 0,
		0o151 => "Fcurrent_column": 0,
		0o152 => "Findent_to": 2,
		0o154 => "Feolp": 0,
		0o155 => "Feobp": 0,
		0o156 => "Fbolp": 0,
		0o157 => "Fbobp": 0,
		0o160 => "Fcurrent_buffer": 0,
		0o161 => "Fset_buffer": 1,
		0o162 => "record_unwind_current_buffer": 0,
		0o164 => "Finteractive_p": 0,
		0o165 => "Fforward_char": 1,
		0o166 => "Fforward_word": 1,
		0o167 => "Fskip_chars_forward": 2,
		0o170 => "Fskip_chars_backward": 2,
		0o171 => "Fforward_line": 1,
		0o172 => "Fchar_syntax": 1,
		0o173 => "Fbuffer_substring": 2,
		0o174 => "Fdelete_region": 2,
		0o175 => "Fnarrow_to_region": 2,
		0o176 => "Fwiden": 0,
		0o177 => "Fend_of_line": 1,
		0o223 => "Fset_marker": 3,
		0o224 => "Fmatch_beginning": 1,
		0o225 => "Fmatch_end": 1,
		0o226 => "Fupcase": 1,
		0o227 => "Fdowncase": 1,
		0o230 => "Fstring_equal": 2,
		0o231 => "Fstring_lessp": 2,
		0o232 => "Fequal": 2,
		0o233 => "Fnthcdr": 2,
		0o234 => "Felt": 2,
		0o235 => "Fmember": 2,
		0o236 => "Fassq": 2,
		0o237 => "Fnreverse": 1,
		0o240 => "Fsetcar": 2,
		0o241 => "Fsetcdr": 2,
		0o246 => "Frem": 2,
	}
}

fn decode_variadic_call(op: u8) -> Option<Op> {
	match op {
		0o120 => Some(Op::VariadicCall { helper: "Fconcat", nargs: 2 }),
		0o121 => Some(Op::VariadicCall { helper: "Fconcat", nargs: 3 }),
		0o122 => Some(Op::VariadicCall { helper: "Fconcat", nargs: 4 }),
		0o132 => Some(Op::VariadicCall { helper: "Fminus", nargs: 2 }),
		0o134 => Some(Op::VariadicCall { helper: "Fplus", nargs: 2 }),
		0o135 => Some(Op::VariadicCall { helper: "Fmax", nargs: 2 }),
		0o136 => Some(Op::VariadicCall { helper: "Fmin", nargs: 2 }),
		0o137 => Some(Op::VariadicCall { helper: "Ftimes", nargs: 2 }),
		0o143 => Some(Op::VariadicCall { helper: "Finsert", nargs: 1 }),
		0o244 => Some(Op::VariadicCall { helper: "Fnconc", nargs: 2 }),
		0o245 => Some(Op::VariadicCall { helper: "Fquo", nargs: 2 }),
		_ => None,
	}
}

fn decode_compare(op: u8) -> Option<Op> {
	match op {
		0o125 => Some(Op::Compare(CompareCode::Equal)),
		0o126 => Some(Op::Compare(CompareCode::Grtr)),
		0o127 => Some(Op::Compare(CompareCode::Less)),
		0o130 => Some(Op::Compare(CompareCode::LessOrEqual)),
		0o131 => Some(Op::Compare(CompareCode::GrtrOrEqual)),
		_ => None,
	}
}

const UNSUPPORTED: &[u8] = &[
	0o60,  // pophandler
	0o61,  // pushconditioncase
	0o62,  // pushcatch
	0o247, // numberp
	0o250, // integerp
	0o261, // insertN
	0o263, // stack_set2
	0o266, // discardN
	0o267, // switch
	0o242, // car_safe
	0o243, // cdr_safe
	0o222, // unbind_all
];

/// Reads the 2-byte PC-relative offset used by the `R`-prefixed branch family: a single byte,
/// biased by 128 (§4.3's CFG table), so `raw - 128` is the signed displacement from the PC of
/// the byte *following* the opcode.
fn relative_target(pc_after_opcode: usize, raw_offset: u8) -> isize {
	pc_after_opcode as isize + (raw_offset as isize - 128)
}

/// Decodes one instruction at `pc`, returning it along with the PC of the next instruction.
pub fn decode_one(code: &[u8], pc: usize) -> Result<(Op, usize)> {
	let op = code[pc];

	if let Some(u) = UNSUPPORTED.iter().find(|&&u| u == op) {
		return Ok((Op::Unsupported(*u), pc + 1));
	}
	if let Some(call) = decode_fixed_arity_call(op) {
		return Ok((call, pc + 1));
	}
	if let Some(call) = decode_variadic_call(op) {
		return Ok((call, pc + 1));
	}
	if let Some(cmp) = decode_compare(op) {
		return Ok((cmp, pc + 1));
	}

	match op {
		// stack_ref family: 0o00..=0o07
		0o00..=0o05 => Ok((Op::StackRef(op as u16), pc + 1)),
		0o06 => Ok((Op::StackRef(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o07 => Ok((Op::StackRef(read_u16(code, pc + 1)?), pc + 3)),

		// varref family: 0o10..=0o17
		0o10..=0o15 => Ok((Op::VarRef((op - 0o10) as u16), pc + 1)),
		0o16 => Ok((Op::VarRef(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o17 => Ok((Op::VarRef(read_u16(code, pc + 1)?), pc + 3)),

		// varset family: 0o20..=0o27
		0o20..=0o25 => Ok((Op::VarSet((op - 0o20) as u16), pc + 1)),
		0o26 => Ok((Op::VarSet(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o27 => Ok((Op::VarSet(read_u16(code, pc + 1)?), pc + 3)),

		// varbind family: 0o30..=0o37
		0o30..=0o35 => Ok((Op::VarBind((op - 0o30) as u16), pc + 1)),
		0o36 => Ok((Op::VarBind(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o37 => Ok((Op::VarBind(read_u16(code, pc + 1)?), pc + 3)),

		// call family: 0o40..=0o47
		0o40..=0o45 => Ok((Op::Call((op - 0o40) as u16), pc + 1)),
		0o46 => Ok((Op::Call(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o47 => Ok((Op::Call(read_u16(code, pc + 1)?), pc + 3)),

		// unbind family: 0o50..=0o57
		0o50..=0o55 => Ok((Op::Unbind((op - 0o50) as u16), pc + 1)),
		0o56 => Ok((Op::Unbind(read_u8(code, pc + 1)? as u16), pc + 2)),
		0o57 => Ok((Op::Unbind(read_u16(code, pc + 1)?), pc + 3)),

		0o72 => Ok((Op::Consp, pc + 1)),

		0o103 => Ok((Op::ListN(1), pc + 1)),
		0o104 => Ok((Op::ListN(2), pc + 1)),
		0o105 => Ok((Op::ListN(3), pc + 1)),
		0o106 => Ok((Op::ListN(4), pc + 1)),
		0o257 => Ok((Op::ListN(read_u8(code, pc + 1)?), pc + 2)),
		0o260 => {
			let n = read_u8(code, pc + 1)?;
			Ok((Op::VariadicCall { helper: "Fconcat", nargs: n }, pc + 2))
		}

		0o123 => Ok((Op::Sub1, pc + 1)),
		0o124 => Ok((Op::Add1, pc + 1)),
		0o133 => Ok((Op::Negate, pc + 1)),

		0o201 => Ok((Op::Constant(read_u16(code, pc + 1)?), pc + 3)),
		0o202 => Ok((Op::Goto(read_u16(code, pc + 1)? as usize), pc + 3)),
		0o203 => Ok((Op::GotoIfNil(read_u16(code, pc + 1)? as usize), pc + 3)),
		0o204 => Ok((Op::GotoIfNonNil(read_u16(code, pc + 1)? as usize), pc + 3)),
		0o205 => Ok((Op::GotoIfNilElsePop(read_u16(code, pc + 1)? as usize), pc + 3)),
		0o206 => Ok((Op::GotoIfNonNilElsePop(read_u16(code, pc + 1)? as usize), pc + 3)),
		0o207 => Ok((Op::Return, pc + 1)),
		0o210 => Ok((Op::Discard, pc + 1)),
		0o211 => Ok((Op::Dup, pc + 1)),

		0o215 => Ok((Op::Catch, pc + 1)),
		0o216 => Ok((Op::UnwindProtect, pc + 1)),
		0o217 => Ok((Op::ConditionCase, pc + 1)),

		0o140 => Ok((Op::Point, pc + 1)),
		0o144 => Ok((Op::PointMax, pc + 1)),
		0o145 => Ok((Op::PointMin, pc + 1)),
		0o221 => Ok((Op::TempOutputBufferShow, pc + 1)),

		0o252 => {
			let raw = read_u8(code, pc + 1)?;
			Ok((Op::Goto(relative_target(pc + 2, raw) as usize), pc + 2))
		}
		0o253 => {
			let raw = read_u8(code, pc + 1)?;
			Ok((Op::GotoIfNil(relative_target(pc + 2, raw) as usize), pc + 2))
		}
		0o254 => {
			let raw = read_u8(code, pc + 1)?;
			Ok((Op::GotoIfNonNil(relative_target(pc + 2, raw) as usize), pc + 2))
		}
		0o255 => {
			let raw = read_u8(code, pc + 1)?;
			Ok((Op::GotoIfNilElsePop(relative_target(pc + 2, raw) as usize), pc + 2))
		}
		0o256 => {
			let raw = read_u8(code, pc + 1)?;
			Ok((Op::GotoIfNonNilElsePop(relative_target(pc + 2, raw) as usize), pc + 2))
		}

		0o262 => Ok((Op::StackSet(read_u8(code, pc + 1)? as u16), pc + 2)),

		// constant: 0o300..=0o377, index = op - 0o300
		0o300..=0o377 => Ok((Op::Constant((op - 0o300) as u16), pc + 1)),

		other => Err(CompileError::UnsupportedOpcode { opcode: other, pc }),
	}
}

fn read_u8(code: &[u8], at: usize) -> Result<u8> {
	code.get(at).copied().ok_or(CompileError::MalformedBranch { pc: at, target: -1 })
}

fn read_u16(code: &[u8], at: usize) -> Result<u16> {
	let low = read_u8(code, at)?;
	let high = read_u8(code, at + 1)?;
	// Bytecode operands are little-endian (low byte first), matching the source VM's
	// `FETCH2 = FETCH | (FETCH << 8)` macro.
	Ok((low as u16) | ((high as u16) << 8))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_single_byte_constant_push() {
		let code = [0o300u8, 0o207];
		let (op, next) = decode_one(&code, 0).unwrap();
		assert_eq!(op, Op::Constant(0));
		assert_eq!(next, 1);
		let (op, next) = decode_one(&code, 1).unwrap();
		assert_eq!(op, Op::Return);
		assert_eq!(next, 2);
	}

	#[test]
	fn decodes_two_byte_absolute_branch_little_endian() {
		let code = [0o203u8, 5, 0, 0];
		let (op, next) = decode_one(&code, 0).unwrap();
		assert_eq!(op, Op::GotoIfNil(5));
		assert_eq!(next, 3);
	}

	#[test]
	fn decodes_relative_branch_with_bias() {
		// offset byte 128 -> displacement 0 -> target == pc after the 2-byte instruction
		let code = [0o252u8, 128];
		let (op, next) = decode_one(&code, 0).unwrap();
		assert_eq!(op, Op::Goto(2));
		assert_eq!(next, 2);
	}

	#[test]
	fn stack_ref_short_forms_carry_their_own_depth() {
		let code = [0o03u8];
		let (op, _) = decode_one(&code, 0).unwrap();
		assert_eq!(op, Op::StackRef(3));
	}

	#[test]
	fn unsupported_opcode_is_flagged_not_silently_miscompiled() {
		let code = [0o60u8];
		let (op, _) = decode_one(&code, 0).unwrap();
		assert_eq!(op, Op::Unsupported(0o60));
	}
}
