//! MathVM common types and bytecode encoding.
//!
//! This crate provides the bytecode module shared by the emitter and the
//! virtual machine:
//!
//! - [`Opcode`] — the instruction table: byte values, mnemonics, lengths
//! - [`VarType`] — the three primitive types plus `void`
//! - [`Slot`] — the untagged 8-byte stack cell
//! - [`Bytecode`] — instruction buffer with typed immediates and
//!   back-patched [`Label`]s
//! - [`Module`] — function table, string constant pool, native table
//! - [`disasm`] — instruction-stream walking and deterministic disassembly
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod bytecode;
pub mod disasm;
pub mod error;
pub mod function;
pub mod module;
pub mod opcode;
pub mod types;
pub mod value;

// Re-export commonly used types at the crate root.
pub use bytecode::{Bytecode, Label};
pub use error::{DecodeError, EmitError};
pub use function::{BytecodeFunction, Signature};
pub use module::{Module, NativeEntry, NativeFn};
pub use opcode::Opcode;
pub use types::VarType;
pub use value::Slot;
