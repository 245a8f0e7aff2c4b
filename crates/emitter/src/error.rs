//! Compile-time errors reported by the emitter.
//!
//! Every error that stems from a construct in the input program carries
//! the source position supplied by the AST node; failures of the emitter's
//! own stack discipline carry the opcode context instead.

use mathvm_common::{EmitError, VarType};
use thiserror::Error;

use crate::ast::SourcePos;

/// Errors that abort the translation of a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// An operand's type cannot be reconciled with what the construct needs.
    #[error("type mismatch at {pos}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: VarType,
        found: VarType,
        pos: SourcePos,
    },

    /// No implicit conversion exists between the two types.
    #[error("cannot convert {from} to {to} at {pos}")]
    InvalidConversion {
        from: VarType,
        to: VarType,
        pos: SourcePos,
    },

    /// A value was required but the expression produces none.
    #[error("expression at {pos} has no value")]
    VoidValue { pos: SourcePos },

    /// `+=` / `-=` applied to a string variable.
    #[error("compound assignment on a string variable at {pos}")]
    StringCompound { pos: SourcePos },

    /// A `for` loop's iterable is not a range expression.
    #[error("for loop at {pos} requires a range expression")]
    ForRequiresRange { pos: SourcePos },

    /// The range operator appeared outside a `for` head.
    #[error("range expression at {pos} is only valid in a for loop")]
    RangeOutsideFor { pos: SourcePos },

    /// A `for` loop's induction variable is not an integer.
    #[error("for loop induction variable at {pos} must be int, found {found}")]
    ForInductionNotInt { found: VarType, pos: SourcePos },

    /// A call names a function the module does not contain.
    #[error("unknown function '{name}' at {pos}")]
    UnknownFunction { name: String, pos: SourcePos },

    /// A call supplies the wrong number of arguments.
    #[error("function '{name}' takes {expected} argument(s), {found} supplied at {pos}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        pos: SourcePos,
    },

    /// Two functions share one name.
    #[error("duplicate function '{name}' at {pos}")]
    DuplicateFunction { name: String, pos: SourcePos },

    /// `return expr` inside a void function.
    #[error("void function returns a value at {pos}")]
    ReturnValueInVoid { pos: SourcePos },

    /// Bare `return` inside a function that must produce a value.
    #[error("missing return value at {pos}")]
    MissingReturnValue { pos: SourcePos },

    /// Two variables share one name within a single scope.
    #[error("duplicate variable '{name}' in scope")]
    DuplicateVariable { name: String },

    /// Variables cannot have type void.
    #[error("variable '{name}' declared void")]
    VoidVariable { name: String },

    /// A scope id referenced a scope that was never created.
    #[error("unknown scope {scope}")]
    UnknownScope { scope: u16 },

    /// Scope ids are limited to 16 bits.
    #[error("too many scopes")]
    TooManyScopes,

    /// Frame slots are limited to 16 bits.
    #[error("too many locals in scope {scope}")]
    TooManyLocals { scope: u16 },

    /// The compile-time type stack ran dry. Indicates a malformed program
    /// or an emitter bug; either way translation cannot continue.
    #[error("type stack underflow in {context}")]
    StackUnderflow { context: &'static str },

    /// An opcode's static stack transition did not match the tracked types.
    #[error("{context} expects {expected} on the stack, found {found}")]
    StackMismatch {
        context: &'static str,
        expected: VarType,
        found: VarType,
    },

    /// The type stack was not empty when a function finalized.
    #[error("unbalanced stack at end of function '{function}'")]
    UnbalancedStack { function: String },

    /// Bytecode-level failure: unbound label, branch overflow, table full.
    #[error(transparent)]
    Emit(#[from] EmitError),
}
