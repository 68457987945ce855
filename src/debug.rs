use bitflags::bitflags;

use crate::error::{CompileError, Result};

bitflags! {
	/// Optional dumps toggled around a compilation, per §4.1.
	#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct DebugLevel: u8 {
		/// Emit `comp_reproducer.c` alongside the compilation.
		const REPRODUCER = 0x1;
		/// Emit `libgccjit.log` from the backend.
		const BACKEND_LOG = 0x2;
		/// Keep any intermediate files the backend would otherwise delete.
		const KEEP_INTERMEDIATES = 0x4;
		/// Dump every basic block as it is emitted, not just on failure.
		const DUMP_EVERYTHING = 0x8;
	}
}

impl DebugLevel {
	pub fn wants_reproducer(self) -> bool {
		self.contains(DebugLevel::REPRODUCER)
	}

	pub fn wants_backend_log(self) -> bool {
		self.contains(DebugLevel::BACKEND_LOG)
	}
}

/// Per-compilation configuration threaded through `native_compile`.
#[derive(Debug, Clone)]
pub struct CompileOptions {
	/// Backend optimization level, `0..=3`. Defaults to `2`.
	pub speed: u8,
	/// When set, emit an assembly dump after compilation and surface its contents.
	pub disassemble: bool,
	pub debug: DebugLevel,
}

impl Default for CompileOptions {
	fn default() -> Self {
		CompileOptions { speed: 2, disassemble: false, debug: DebugLevel::empty() }
	}
}

impl CompileOptions {
	pub fn with_speed(speed: u8) -> Result<Self> {
		if speed > 3 {
			return Err(CompileError::InvalidOptimizationLevel(speed));
		}
		Ok(CompileOptions { speed, ..Default::default() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_speed_is_two() {
		assert_eq!(CompileOptions::default().speed, 2);
	}

	#[test]
	fn out_of_range_speed_is_rejected() {
		assert!(matches!(
			CompileOptions::with_speed(4),
			Err(CompileError::InvalidOptimizationLevel(4))
		));
	}

	#[test]
	fn flags_compose() {
		let level = DebugLevel::REPRODUCER | DebugLevel::BACKEND_LOG;
		assert!(level.wants_reproducer());
		assert!(level.wants_backend_log());
		assert!(!level.contains(DebugLevel::DUMP_EVERYTHING));
	}
}
