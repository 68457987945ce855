//! Arity-template decoding (§4.4): the three shapes a function's argument list descriptor can
//! take, each collapsing down to a `(min_args, max_args)` pair.

/// A decoded `(min_args, max_args)` pair, named so call sites read as prose instead of a bare
/// tuple.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Arity {
	pub min_args: u16,
	pub max_args: u16,
}

/// One arity-template variant per §4.4. `SmallInt` is the common case: a function compiled with
/// a fixed, non-rest argument list encodes its counts packed into a host integer rather than
/// building a list.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArityTemplate {
	/// Packed integer: bit 7 is the "rest args present" flag, bits 0..6 the mandatory count,
	/// bits 8.. the total non-rest count.
	SmallInt(u32),
	/// A legacy lambda list: `min = max = length(list)`.
	LambdaList(usize),
	/// `nil`: no arguments at all.
	Nil,
}

/// Upper bound on `non_rest` a template may declare (mirrors the loader's `SUBR_MAX_ARGS`).
pub const SUBR_MAX_ARGS: u32 = 8;

#[derive(Debug)]
pub enum ArityError {
	/// Bit 7 ("rest args present") was set; variadic rest-arg prologues are out of scope.
	RestArgsUnsupported,
	/// The packed non-rest count exceeded `SUBR_MAX_ARGS`.
	NonRestTooLarge(u32),
}

/// Decodes an arity template into `(min_args, max_args)`, per §4.4.
pub fn decode_arity(template: ArityTemplate) -> Result<Arity, ArityError> {
	match template {
		ArityTemplate::SmallInt(at) => {
			if at & 0x80 != 0 {
				return Err(ArityError::RestArgsUnsupported);
			}
			let mandatory = at & 0x7f;
			let non_rest = at >> 8;
			if non_rest >= SUBR_MAX_ARGS {
				return Err(ArityError::NonRestTooLarge(non_rest));
			}
			Ok(Arity { min_args: mandatory as u16, max_args: non_rest as u16 })
		}
		ArityTemplate::LambdaList(len) => Ok(Arity { min_args: len as u16, max_args: len as u16 }),
		ArityTemplate::Nil => Ok(Arity { min_args: 0, max_args: 0 }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn small_int_splits_mandatory_and_non_rest_counts() {
		// mandatory = 2, non_rest = 3: bits 0..6 = 2, bits 8.. = 3
		let at = 2 | (3 << 8);
		let arity = decode_arity(ArityTemplate::SmallInt(at)).unwrap();
		assert_eq!(arity, Arity { min_args: 2, max_args: 3 });
	}

	#[test]
	fn rest_args_flag_is_rejected() {
		let at = 0x80 | 1;
		assert!(matches!(decode_arity(ArityTemplate::SmallInt(at)), Err(ArityError::RestArgsUnsupported)));
	}

	#[test]
	fn non_rest_at_or_past_ceiling_is_rejected() {
		let at = SUBR_MAX_ARGS << 8;
		assert!(matches!(
			decode_arity(ArityTemplate::SmallInt(at)),
			Err(ArityError::NonRestTooLarge(n)) if n == SUBR_MAX_ARGS
		));
	}

	#[test]
	fn lambda_list_arity_is_fixed_at_its_length() {
		let arity = decode_arity(ArityTemplate::LambdaList(3)).unwrap();
		assert_eq!(arity, Arity { min_args: 3, max_args: 3 });
	}

	#[test]
	fn nil_template_takes_no_arguments() {
		assert_eq!(decode_arity(ArityTemplate::Nil).unwrap(), Arity { min_args: 0, max_args: 0 });
	}
}
