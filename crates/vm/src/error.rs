//! Load-time and runtime errors for the MathVM interpreter.

use mathvm_common::DecodeError;
use thiserror::Error;

/// Errors found while checking a module before execution.
///
/// Streams produced by the emitter never trigger these; they guard against
/// hand-built or corrupted modules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The module has no functions, so there is no entry point.
    #[error("module has no entry function")]
    EmptyModule,

    /// A declared function was never given a body.
    #[error("function {function} has empty bytecode")]
    EmptyFunction { function: u16 },

    /// An instruction stream failed to decode.
    #[error("function {function}: {source}")]
    Decode {
        function: u16,
        #[source]
        source: DecodeError,
    },

    /// A branch lands outside the function or between instructions.
    #[error("function {function}: branch at offset {at} targets {target}, not an instruction boundary")]
    BranchTarget {
        function: u16,
        at: usize,
        target: i64,
    },

    /// A string id exceeds the constant pool.
    #[error("function {function}: string id {id} out of range at offset {at}")]
    StringIdOutOfRange { function: u16, at: usize, id: u16 },

    /// A call targets a function id outside the table.
    #[error("function {function}: function id {id} out of range at offset {at}")]
    FunctionIdOutOfRange { function: u16, at: usize, id: u16 },

    /// A native call targets an id outside the native table.
    #[error("function {function}: native id {id} out of range at offset {at}")]
    NativeIdOutOfRange { function: u16, at: usize, id: u16 },

    /// A cross-scope access names a scope no function owns.
    #[error("function {function}: scope {scope} unknown at offset {at}")]
    ScopeOutOfRange { function: u16, at: usize, scope: u16 },

    /// A local slot exceeds the frame it addresses.
    #[error("function {function}: local slot {slot} out of range (frame holds {locals}) at offset {at}")]
    LocalOutOfRange {
        function: u16,
        at: usize,
        slot: u16,
        locals: u16,
    },

    /// A declared native has no host function bound.
    #[error("native function '{name}' is unresolved")]
    UnboundNative { name: String },
}

/// Errors that terminate execution. Every variant carries the bytecode
/// offset (`at`) within the function that was executing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Integer division or modulo by zero.
    #[error("division by zero at offset {at}")]
    DivisionByZero { at: usize },

    /// S2I could not parse the constant as a base-10 integer.
    #[error("cannot parse '{value}' as an integer at offset {at}")]
    StringParse { at: usize, value: String },

    /// The INVALID trap opcode was reached.
    #[error("invalid instruction at offset {at}")]
    InvalidInstruction { at: usize },

    /// An undecodable opcode byte was reached. Validation makes this
    /// unreachable for loaded modules.
    #[error("unknown opcode {byte:#04x} at offset {at}")]
    UnknownOpcode { at: usize, byte: u8 },

    /// The instruction pointer ran off the end of the function.
    #[error("instruction pointer out of bounds at offset {at}")]
    CodeOutOfBounds { at: usize },

    /// Pop on an empty value stack. The emitter's verifier makes this
    /// unreachable for emitted modules; it is reported as a fatal bug.
    #[error("value stack underflow at offset {at}")]
    StackUnderflow { at: usize },

    /// The value stack exceeded its capacity.
    #[error("value stack overflow at offset {at}")]
    StackOverflow { at: usize },

    /// The call stack exceeded its capacity.
    #[error("call stack overflow at offset {at}")]
    CallStackOverflow { at: usize },

    /// A cross-scope access found no live frame for the scope.
    #[error("no live frame for scope {scope} at offset {at}")]
    DeadScope { at: usize, scope: u16 },

    /// A local slot exceeded the current frame.
    #[error("local slot {slot} out of range at offset {at}")]
    LocalOutOfRange { at: usize, slot: u16 },

    /// A string id exceeded the constant pool.
    #[error("string id {id} out of range at offset {at}")]
    ConstantOutOfRange { at: usize, id: u16 },

    /// A call targeted a function id outside the table.
    #[error("unknown function id {id} at offset {at}")]
    UnknownFunction { at: usize, id: u16 },

    /// A native call targeted an id outside the table or an unbound entry.
    #[error("unresolved native id {id} at offset {at}")]
    UnresolvedNative { at: usize, id: u16 },

    /// The output sink failed.
    #[error("output sink failed: {0}")]
    Output(String),
}

/// Either phase of taking a module to completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
