//! The CFG builder (CFGB, §4.3's "CFG reconstruction"): a two-pass scan over the byte string that
//! turns scattered branch targets and fall-through joins into one leader set, then stripes every
//! PC to the block owning it.
//!
//! Grounded in the same shape as cranelift-wasm's `FuncTranslator`, which likewise performs an
//! up-front pass over the wasm function body to discover block boundaries before emitting any IR.

use nohash_hasher::IntMap;

use crate::bytecode::{Op, decode_one};
use crate::error::Result;
use crate::ir::BlockId;

/// Maps every PC in the byte string to the [`BlockId`] of the block it belongs to, plus the
/// sorted list of leader PCs in program order (used to iterate blocks for the prologue jump and
/// for the translator's per-block dispatch loop).
#[derive(Debug)]
pub struct BlockMap {
	/// PC -> leader PC, via binary search over `leaders`.
	leaders: Vec<usize>,
	/// leader PC -> backend block, keyed with a non-hashing integer map since PCs are dense.
	pub blocks: IntMap<usize, BlockId>,
	/// PCs that are a leader because some `goto`/`gotoif*` names them as its target, as opposed
	/// to merely following a branching or stack-affecting instruction in program order. Used by
	/// `gotoifnilelsepop`/`gotoifnonnilelsepop` (§4.7) to detect when their implicit fall-through
	/// pop would be unsound: if another edge also lands on that same PC, that edge never executed
	/// the pop, so the two predecessors would disagree on stack depth.
	branch_targets: std::collections::BTreeSet<usize>,
}

impl BlockMap {
	/// The block owning `pc`: the most recent leader at or before `pc`.
	pub fn block_of(&self, pc: usize) -> BlockId {
		let idx = match self.leaders.binary_search(&pc) {
			Ok(i) => i,
			Err(i) => i - 1,
		};
		self.blocks[&self.leaders[idx]]
	}

	pub fn leader_pcs(&self) -> &[usize] {
		&self.leaders
	}

	/// Whether `pc` is named as a target by some `goto`/`gotoif*` elsewhere in the byte string.
	pub fn is_branch_target(&self, pc: usize) -> bool {
		self.branch_targets.contains(&pc)
	}
}

/// Scans `code` once to collect leader PCs (§4.3's table), a second time to allocate one backend
/// block per leader via `alloc_block`, and returns the resulting [`BlockMap`].
pub fn build(code: &[u8], mut alloc_block: impl FnMut(usize) -> Result<BlockId>) -> Result<BlockMap> {
	let mut leader_set = std::collections::BTreeSet::new();
	let mut branch_targets = std::collections::BTreeSet::new();
	leader_set.insert(0);

	let mut pc = 0;
	let mut new_bb_next = false;
	while pc < code.len() {
		if new_bb_next {
			leader_set.insert(pc);
			new_bb_next = false;
		}
		let (op, next_pc) = decode_one(code, pc)?;
		match op {
			Op::Goto(target)
			| Op::GotoIfNil(target)
			| Op::GotoIfNonNil(target)
			| Op::GotoIfNilElsePop(target)
			| Op::GotoIfNonNilElsePop(target) => {
				leader_set.insert(target);
				branch_targets.insert(target);
				new_bb_next = true;
			}
			// Consp is inlined too but replaces TOS in place with no branch of its own, so
			// unlike these three it needs no join block.
			Op::Sub1 | Op::Add1 | Op::Negate | Op::Return => {
				new_bb_next = true;
			}
			_ => {}
		}
		pc = next_pc;
	}

	let leaders: Vec<usize> = leader_set.into_iter().collect();
	let mut blocks = IntMap::default();
	for &leader in &leaders {
		blocks.insert(leader, alloc_block(leader)?);
	}

	Ok(BlockMap { leaders, blocks, branch_targets })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ir::Backend;
	use crate::tests_support::RecordingBackend;

	fn alloc(backend: &mut RecordingBackend, func: crate::ir::FunctionId) -> impl FnMut(usize) -> Result<BlockId> + '_ {
		move |pc| backend.create_block(func, &format!("bb{pc}"))
	}

	#[test]
	fn straight_line_code_has_a_single_block() {
		let mut backend = RecordingBackend::new();
		let func = backend.declare_function("f", crate::ir::BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		let code = [0o300u8, 0o207]; // constant 0; return
		let map = build(&code, alloc(&mut backend, func)).unwrap();
		assert_eq!(map.leader_pcs(), &[0]);
		assert_eq!(map.block_of(0), map.block_of(1));
	}

	#[test]
	fn absolute_branch_target_becomes_a_leader() {
		let mut backend = RecordingBackend::new();
		let func = backend.declare_function("f", crate::ir::BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		// goto 5; constant 0 (at pc 3); return (at pc 5, also reachable by fallthrough)
		let code = [0o202u8, 5, 0, 0o300, 0, 0o207];
		let map = build(&code, alloc(&mut backend, func)).unwrap();
		assert!(map.leader_pcs().contains(&5));
		assert_ne!(map.block_of(0), map.block_of(3));
	}

	#[test]
	fn sub1_forces_a_join_point_after_it() {
		let mut backend = RecordingBackend::new();
		let func = backend.declare_function("f", crate::ir::BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		let code = [0o123u8, 0o207]; // sub1; return
		let map = build(&code, alloc(&mut backend, func)).unwrap();
		assert!(map.leader_pcs().contains(&1));
	}

	#[test]
	fn goto_target_is_a_branch_target() {
		let mut backend = RecordingBackend::new();
		let func = backend.declare_function("f", crate::ir::BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		let code = [0o202u8, 5, 0, 0o300, 0, 0o207];
		let map = build(&code, alloc(&mut backend, func)).unwrap();
		assert!(map.is_branch_target(5));
	}

	#[test]
	fn the_leader_forced_by_return_is_not_a_branch_target() {
		let mut backend = RecordingBackend::new();
		let func = backend.declare_function("f", crate::ir::BackendType::VoidPtr, &[], crate::ir::FnKind::Exported).unwrap();
		let code = [0o207u8, 0o207]; // return; return
		let map = build(&code, alloc(&mut backend, func)).unwrap();
		assert!(map.leader_pcs().contains(&1));
		assert!(!map.is_branch_target(1));
	}
}
