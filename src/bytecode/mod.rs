//! The byte string's own shape: opcode decoding (§4.3/§4.4) and arity-template decoding (§4.4).

pub mod arity;
pub mod opcode;

pub use arity::{Arity, decode_arity};
pub use opcode::{CompareCode, Op, decode_one};
