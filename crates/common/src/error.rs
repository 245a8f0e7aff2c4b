//! Errors for building and decoding MathVM instruction streams.

use thiserror::Error;

/// Errors that occur while reading an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Byte value has no opcode assigned.
    #[error("unknown opcode {byte:#04x}")]
    UnknownOpcode { byte: u8 },

    /// The stream ends in the middle of an instruction's immediates.
    #[error("truncated instruction at offset {at}: {mnemonic} needs {needed} bytes, {available} remain")]
    TruncatedInstruction {
        at: usize,
        mnemonic: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Errors that occur while building bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// A branch displacement does not fit in a signed 16-bit offset.
    #[error("branch displacement {displacement} at offset {at} exceeds the i16 range")]
    BranchOutOfRange { at: usize, displacement: i64 },

    /// A label was bound twice.
    #[error("label {label} bound twice")]
    LabelRebound { label: usize },

    /// Bytecode was finalized while forward branches still await binding.
    #[error("{count} label(s) unbound at finalization")]
    UnboundLabels { count: usize },

    /// The function table is limited to 16-bit ids.
    #[error("function table full (65536 entries)")]
    TooManyFunctions,

    /// The string constant pool is limited to 16-bit ids.
    #[error("string constant pool full (65536 entries)")]
    TooManyStrings,

    /// The native-function table is limited to 16-bit ids.
    #[error("native function table full (65536 entries)")]
    TooManyNatives,

    /// A native function was re-declared with a different signature.
    #[error("native function '{name}' re-declared with a different signature")]
    NativeSignatureMismatch { name: String },
}
