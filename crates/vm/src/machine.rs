//! VM state: value stack, activation frames, context stacks, call stack.

use std::io::Write;

use mathvm_common::{Bytecode, BytecodeFunction, Module, Slot};

use crate::error::{LoadError, RuntimeError};
use crate::validate::validate;

/// Maximum value-stack depth, in slots.
pub const MAX_STACK_DEPTH: usize = 1 << 16;

/// Maximum number of live invocations.
pub const MAX_CALL_DEPTH: usize = 4096;

/// One invocation's locals. Slot 0 doubles as the return-value slot.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub locals: Vec<Slot>,
}

impl Frame {
    pub fn new(locals_count: u16) -> Self {
        Frame {
            locals: vec![Slot::default(); locals_count as usize],
        }
    }
}

/// Bookkeeping for one `CALL`, popped by the matching `RETURN`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallRecord {
    /// Offset in the caller to resume at.
    pub return_ip: usize,
    /// The function this record belongs to (the callee).
    pub function: u16,
    /// Value-stack depth after the callee's arguments are consumed. The
    /// matching `RETURN` truncates back to this.
    pub stack_base: usize,
}

/// The MathVM interpreter.
///
/// Owns the value stack, the frame stack, and the per-scope context
/// stacks; context entries are indices into the frame stack, so
/// cross-scope access stays O(1) without aliasing frames.
pub struct Vm<'a, W: Write> {
    pub(crate) module: &'a Module,
    pub(crate) out: W,
    pub(crate) stack: Vec<Slot>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) contexts: Vec<Vec<usize>>,
    pub(crate) calls: Vec<CallRecord>,
    pub(crate) ip: usize,
    pub(crate) function: u16,
}

impl<'a, W: Write> Vm<'a, W> {
    /// Validate `module` and prepare an interpreter writing to `out`.
    pub fn load(module: &'a Module, out: W) -> Result<Self, LoadError> {
        validate(module)?;
        let scope_count = module
            .functions()
            .map(|f| f.scope_id() as usize + 1)
            .max()
            .unwrap_or(0);
        Ok(Vm {
            module,
            out,
            stack: Vec::with_capacity(1024),
            frames: Vec::new(),
            contexts: vec![Vec::new(); scope_count],
            calls: Vec::new(),
            ip: 0,
            function: 0,
        })
    }

    /// The function currently executing.
    pub(crate) fn current_function(&self) -> Result<&'a BytecodeFunction, RuntimeError> {
        self.module
            .function_by_id(self.function)
            .ok_or(RuntimeError::UnknownFunction {
                at: self.ip,
                id: self.function,
            })
    }

    pub(crate) fn bytecode(&self) -> Result<&'a Bytecode, RuntimeError> {
        self.current_function().map(|f| f.bytecode())
    }

    pub(crate) fn push(&mut self, value: Slot) -> Result<(), RuntimeError> {
        if self.stack.len() >= MAX_STACK_DEPTH {
            return Err(RuntimeError::StackOverflow { at: self.ip });
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Slot, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { at: self.ip })
    }

    /// Read a local of the current (topmost) frame.
    pub(crate) fn local(&self, slot: u16) -> Result<Slot, RuntimeError> {
        self.frames
            .last()
            .and_then(|f| f.locals.get(slot as usize))
            .copied()
            .ok_or(RuntimeError::LocalOutOfRange { at: self.ip, slot })
    }

    /// Write a local of the current (topmost) frame.
    pub(crate) fn set_local(&mut self, slot: u16, value: Slot) -> Result<(), RuntimeError> {
        let at = self.ip;
        let cell = self
            .frames
            .last_mut()
            .and_then(|f| f.locals.get_mut(slot as usize))
            .ok_or(RuntimeError::LocalOutOfRange { at, slot })?;
        *cell = value;
        Ok(())
    }

    /// Index of the innermost live frame of `scope`.
    pub(crate) fn context_frame(&self, scope: u16) -> Result<usize, RuntimeError> {
        self.contexts
            .get(scope as usize)
            .and_then(|stack| stack.last())
            .copied()
            .ok_or(RuntimeError::DeadScope { at: self.ip, scope })
    }

    /// Read a local of the innermost live frame of `scope`.
    pub(crate) fn ctx_local(&self, scope: u16, slot: u16) -> Result<Slot, RuntimeError> {
        let frame = self.context_frame(scope)?;
        self.frames[frame]
            .locals
            .get(slot as usize)
            .copied()
            .ok_or(RuntimeError::LocalOutOfRange { at: self.ip, slot })
    }

    /// Write a local of the innermost live frame of `scope`.
    pub(crate) fn set_ctx_local(
        &mut self,
        scope: u16,
        slot: u16,
        value: Slot,
    ) -> Result<(), RuntimeError> {
        let at = self.ip;
        let frame = self.context_frame(scope)?;
        let cell = self.frames[frame]
            .locals
            .get_mut(slot as usize)
            .ok_or(RuntimeError::LocalOutOfRange { at, slot })?;
        *cell = value;
        Ok(())
    }
}
