//! MathVM virtual machine — executes bytecode modules.
//!
//! The VM is a stack machine with:
//! - A value stack of untagged 8-byte slots
//! - One activation frame per live invocation
//! - Per-scope context stacks resolving cross-scope variable access to the
//!   innermost live frame of the owning scope
//! - A call stack recording return addresses and stack bases
//!
//! Modules are validated before execution; see [`validate`](validate::validate).
//!
//! # Usage
//!
//! ```
//! use mathvm_common::{Bytecode, Module, Opcode, Signature, VarType};
//!
//! let mut module = Module::new();
//! module
//!     .add_function("main", Signature::new(VarType::Void, vec![]), 0)
//!     .unwrap();
//! let mut code = Bytecode::new();
//! code.add_insn(Opcode::Iload);
//! code.add_i64(42);
//! code.add_insn(Opcode::Iprint);
//! code.add_insn(Opcode::Stop);
//! module.define_function(0, 0, code);
//!
//! let mut out = Vec::new();
//! mathvm_vm::run(&module, &mut out).unwrap();
//! assert_eq!(out, b"42");
//! ```

pub mod error;
pub mod execute;
pub mod machine;
pub mod validate;

pub use error::{LoadError, RuntimeError, VmError};
pub use machine::Vm;

use std::io::Write;

use mathvm_common::{Module, Slot};

/// Validate `module` and execute it, writing program output to `out`.
///
/// Returns the entry function's return value when its signature is
/// non-void; `None` for a void entry or a `STOP`.
///
/// # Errors
///
/// [`VmError::Load`] if the module fails validation, [`VmError::Runtime`]
/// if execution faults (division by zero, string parse failure, the
/// INVALID trap, ...).
pub fn run<W: Write>(module: &Module, out: W) -> Result<Option<Slot>, VmError> {
    let mut vm = Vm::load(module, out)?;
    vm.run().map_err(Into::into)
}
