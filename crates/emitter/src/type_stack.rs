//! The compile-time mirror of the runtime value stack.
//!
//! Every opcode the emitter appends first applies its static stack
//! transition here: expected operand types are popped and the result type
//! is pushed, with any disagreement reported as a [`CompileError`] at
//! append time. This replaces runtime type checks with a compile-time
//! witness — the interpreter's untagged slots are safe because no
//! ill-typed stream is ever produced.
//!
//! `CALL`, `CALLNATIVE`, and `RETURN` have data-dependent effects and are
//! adjusted explicitly by the emitter; here they are no-ops.

use mathvm_common::{Opcode, VarType};

use crate::error::CompileError;

/// A stack of static types, one entry per runtime slot.
#[derive(Debug, Clone, Default)]
pub struct TypeStack {
    stack: Vec<VarType>,
}

impl TypeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The type `depth` slots below the top; `peek(0)` is the top.
    pub fn peek(&self, depth: usize) -> Option<VarType> {
        self.stack.len().checked_sub(depth + 1).map(|i| self.stack[i])
    }

    pub fn top(&self) -> Option<VarType> {
        self.peek(0)
    }

    pub fn push(&mut self, ty: VarType) {
        self.stack.push(ty);
    }

    /// Pop one entry of any type.
    pub fn pop(&mut self, context: &'static str) -> Result<VarType, CompileError> {
        self.stack
            .pop()
            .ok_or(CompileError::StackUnderflow { context })
    }

    /// Pop one entry, requiring an exact type.
    pub fn expect(&mut self, context: &'static str, expected: VarType) -> Result<(), CompileError> {
        let found = self.pop(context)?;
        if found != expected {
            return Err(CompileError::StackMismatch {
                context,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Apply `op`'s static stack transition.
    pub fn apply(&mut self, op: Opcode) -> Result<(), CompileError> {
        use Opcode::*;
        use VarType::{Double, Int, Str};

        let m = op.mnemonic();
        match op {
            Iload | Iload0 | Iload1 | IloadM1 => self.push(Int),
            Dload | Dload0 | Dload1 | DloadM1 => self.push(Double),
            Sload | Sload0 => self.push(Str),

            Iadd | Isub | Imul | Idiv | Imod | Iaor | Iaand | Iaxor | Icmp => {
                self.expect(m, Int)?;
                self.expect(m, Int)?;
                self.push(Int);
            }
            Dadd | Dsub | Dmul | Ddiv => {
                self.expect(m, Double)?;
                self.expect(m, Double)?;
                self.push(Double);
            }
            Dcmp => {
                self.expect(m, Double)?;
                self.expect(m, Double)?;
                self.push(Int);
            }
            Ineg => {
                self.expect(m, Int)?;
                self.push(Int);
            }
            Dneg => {
                self.expect(m, Double)?;
                self.push(Double);
            }

            Iprint => self.expect(m, Int)?,
            Dprint => self.expect(m, Double)?,
            Sprint => self.expect(m, Str)?,

            I2d => {
                self.expect(m, Int)?;
                self.push(Double);
            }
            D2i => {
                self.expect(m, Double)?;
                self.push(Int);
            }
            S2i => {
                self.expect(m, Str)?;
                self.push(Int);
            }

            Swap => {
                let a = self.pop(m)?;
                let b = self.pop(m)?;
                self.push(a);
                self.push(b);
            }
            Pop => {
                self.pop(m)?;
            }
            Dump => {
                let t = self.top().ok_or(CompileError::StackUnderflow { context: m })?;
                self.push(t);
            }

            LoadIvar0 | LoadIvar1 | LoadIvar2 | LoadIvar3 | LoadIvar | LoadCtxIvar => {
                self.push(Int)
            }
            LoadDvar0 | LoadDvar1 | LoadDvar2 | LoadDvar3 | LoadDvar | LoadCtxDvar => {
                self.push(Double)
            }
            LoadSvar0 | LoadSvar1 | LoadSvar2 | LoadSvar3 | LoadSvar | LoadCtxSvar => {
                self.push(Str)
            }
            StoreIvar0 | StoreIvar1 | StoreIvar2 | StoreIvar3 | StoreIvar | StoreCtxIvar => {
                self.expect(m, Int)?
            }
            StoreDvar0 | StoreDvar1 | StoreDvar2 | StoreDvar3 | StoreDvar | StoreCtxDvar => {
                self.expect(m, Double)?
            }
            StoreSvar0 | StoreSvar1 | StoreSvar2 | StoreSvar3 | StoreSvar | StoreCtxSvar => {
                self.expect(m, Str)?
            }

            IfIcmpNe | IfIcmpE | IfIcmpG | IfIcmpGe | IfIcmpL | IfIcmpLe => {
                self.expect(m, Int)?;
                self.expect(m, Int)?;
            }

            // No static effect: control transfer or handled by the emitter.
            Ja | Call | CallNative | Return | Stop | Break | Invalid => {}
        }
        Ok(())
    }
}
