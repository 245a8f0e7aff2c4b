//! The dispatch loop: fetch, execute, advance.
//!
//! The program counter advances by each opcode's table length unless the
//! opcode transfers control itself (branches, `CALL`, `RETURN`). Binary
//! operators pop the upper slot as the right operand and the lower slot as
//! the left operand; the comparison opcodes push `sign(left - right)` and
//! the conditional branches test `left <pred> right` under the same
//! pop order.

use std::io::Write;

use mathvm_common::{Bytecode, Opcode, Slot};

use crate::error::RuntimeError;
use crate::machine::{CallRecord, Frame, Vm, MAX_CALL_DEPTH};

impl<'a, W: Write> Vm<'a, W> {
    /// Execute from function id 0.
    ///
    /// Returns the entry function's return value when its signature is
    /// non-void, or `None` for a void entry or a `STOP`.
    pub fn run(&mut self) -> Result<Option<Slot>, RuntimeError> {
        self.stack.clear();
        self.frames.clear();
        self.calls.clear();
        for context in &mut self.contexts {
            context.clear();
        }
        self.function = 0;
        self.ip = 0;

        let entry = self.current_function()?;
        let locals = entry.locals_count();
        let scope = entry.scope_id() as usize;
        self.frames.push(Frame::new(locals));
        self.contexts[scope].push(0);
        self.calls.push(CallRecord {
            return_ip: 0,
            function: 0,
            stack_base: 0,
        });

        self.dispatch()
    }

    fn dispatch(&mut self) -> Result<Option<Slot>, RuntimeError> {
        use Opcode::*;

        loop {
            let at = self.ip;
            let code = self.bytecode()?;
            let byte = code
                .get_u8(at)
                .ok_or(RuntimeError::CodeOutOfBounds { at })?;
            let opcode =
                Opcode::try_from(byte).map_err(|_| RuntimeError::UnknownOpcode { at, byte })?;
            let mut next = at + opcode.length();

            match opcode {
                Invalid => return Err(RuntimeError::InvalidInstruction { at }),

                // ---- loads ----
                Dload => {
                    let v = code
                        .get_f64(at + 1)
                        .ok_or(RuntimeError::CodeOutOfBounds { at })?;
                    self.push(Slot::from_double(v))?;
                }
                Iload => {
                    let v = code
                        .get_i64(at + 1)
                        .ok_or(RuntimeError::CodeOutOfBounds { at })?;
                    self.push(Slot::from_int(v))?;
                }
                Sload => {
                    let id = self.operand_u16(code, at)?;
                    self.push(Slot::from_string_id(id))?;
                }
                Dload0 => self.push(Slot::from_double(0.0))?,
                Dload1 => self.push(Slot::from_double(1.0))?,
                DloadM1 => self.push(Slot::from_double(-1.0))?,
                Iload0 => self.push(Slot::from_int(0))?,
                Iload1 => self.push(Slot::from_int(1))?,
                IloadM1 => self.push(Slot::from_int(-1))?,
                Sload0 => self.push(Slot::from_string_id(0))?,

                // ---- arithmetic ----
                Iadd => self.int_binop(i64::wrapping_add)?,
                Isub => self.int_binop(i64::wrapping_sub)?,
                Imul => self.int_binop(i64::wrapping_mul)?,
                Idiv => {
                    let (left, right) = self.int_operands()?;
                    if right == 0 {
                        return Err(RuntimeError::DivisionByZero { at });
                    }
                    self.push(Slot::from_int(left.wrapping_div(right)))?;
                }
                Imod => {
                    let (left, right) = self.int_operands()?;
                    if right == 0 {
                        return Err(RuntimeError::DivisionByZero { at });
                    }
                    self.push(Slot::from_int(left.wrapping_rem(right)))?;
                }
                Ineg => {
                    let v = self.pop()?.as_int();
                    self.push(Slot::from_int(v.wrapping_neg()))?;
                }
                Iaor => self.int_binop(|a, b| a | b)?,
                Iaand => self.int_binop(|a, b| a & b)?,
                Iaxor => self.int_binop(|a, b| a ^ b)?,
                Dadd => self.double_binop(|a, b| a + b)?,
                Dsub => self.double_binop(|a, b| a - b)?,
                Dmul => self.double_binop(|a, b| a * b)?,
                Ddiv => self.double_binop(|a, b| a / b)?,
                Dneg => {
                    let v = self.pop()?.as_double();
                    self.push(Slot::from_double(-v))?;
                }

                // ---- comparison ----
                Icmp => {
                    let (left, right) = self.int_operands()?;
                    let sign = match left.cmp(&right) {
                        std::cmp::Ordering::Less => -1,
                        std::cmp::Ordering::Equal => 0,
                        std::cmp::Ordering::Greater => 1,
                    };
                    self.push(Slot::from_int(sign))?;
                }
                Dcmp => {
                    let right = self.pop()?.as_double();
                    let left = self.pop()?.as_double();
                    // NaN orders with neither operand and falls through to 0.
                    let sign = if left < right {
                        -1
                    } else if left > right {
                        1
                    } else {
                        0
                    };
                    self.push(Slot::from_int(sign))?;
                }

                // ---- print ----
                Iprint => {
                    let v = self.pop()?.as_int();
                    write!(self.out, "{v}").map_err(|e| RuntimeError::Output(e.to_string()))?;
                }
                Dprint => {
                    let v = self.pop()?.as_double();
                    write!(self.out, "{v}").map_err(|e| RuntimeError::Output(e.to_string()))?;
                }
                Sprint => {
                    let id = self.pop()?.as_string_id();
                    let s = self
                        .module
                        .string_by_id(id)
                        .ok_or(RuntimeError::ConstantOutOfRange { at, id })?;
                    self.out
                        .write_all(s.as_bytes())
                        .map_err(|e| RuntimeError::Output(e.to_string()))?;
                }

                // ---- conversion ----
                I2d => {
                    let v = self.pop()?.as_int();
                    self.push(Slot::from_double(v as f64))?;
                }
                D2i => {
                    // Truncation toward zero; NaN and out-of-range saturate.
                    let v = self.pop()?.as_double();
                    self.push(Slot::from_int(v as i64))?;
                }
                S2i => {
                    let id = self.pop()?.as_string_id();
                    let s = self
                        .module
                        .string_by_id(id)
                        .ok_or(RuntimeError::ConstantOutOfRange { at, id })?;
                    let v = s.trim().parse::<i64>().map_err(|_| RuntimeError::StringParse {
                        at,
                        value: s.to_string(),
                    })?;
                    self.push(Slot::from_int(v))?;
                }

                // ---- stack manipulation ----
                Swap => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.push(a)?;
                    self.push(b)?;
                }
                Pop => {
                    self.pop()?;
                }
                Dump => {
                    let v = *self
                        .stack
                        .last()
                        .ok_or(RuntimeError::StackUnderflow { at })?;
                    self.push(v)?;
                }

                // ---- current-frame locals ----
                LoadDvar0 | LoadIvar0 | LoadSvar0 => {
                    let v = self.local(0)?;
                    self.push(v)?;
                }
                LoadDvar1 | LoadIvar1 | LoadSvar1 => {
                    let v = self.local(1)?;
                    self.push(v)?;
                }
                LoadDvar2 | LoadIvar2 | LoadSvar2 => {
                    let v = self.local(2)?;
                    self.push(v)?;
                }
                LoadDvar3 | LoadIvar3 | LoadSvar3 => {
                    let v = self.local(3)?;
                    self.push(v)?;
                }
                StoreDvar0 | StoreIvar0 | StoreSvar0 => {
                    let v = self.pop()?;
                    self.set_local(0, v)?;
                }
                StoreDvar1 | StoreIvar1 | StoreSvar1 => {
                    let v = self.pop()?;
                    self.set_local(1, v)?;
                }
                StoreDvar2 | StoreIvar2 | StoreSvar2 => {
                    let v = self.pop()?;
                    self.set_local(2, v)?;
                }
                StoreDvar3 | StoreIvar3 | StoreSvar3 => {
                    let v = self.pop()?;
                    self.set_local(3, v)?;
                }
                LoadDvar | LoadIvar | LoadSvar => {
                    let slot = self.operand_u16(code, at)?;
                    let v = self.local(slot)?;
                    self.push(v)?;
                }
                StoreDvar | StoreIvar | StoreSvar => {
                    let slot = self.operand_u16(code, at)?;
                    let v = self.pop()?;
                    self.set_local(slot, v)?;
                }

                // ---- cross-scope access ----
                LoadCtxDvar | LoadCtxIvar | LoadCtxSvar => {
                    let scope = self.operand_u16(code, at)?;
                    let slot = code
                        .get_u16(at + 3)
                        .ok_or(RuntimeError::CodeOutOfBounds { at })?;
                    let v = self.ctx_local(scope, slot)?;
                    self.push(v)?;
                }
                StoreCtxDvar | StoreCtxIvar | StoreCtxSvar => {
                    let scope = self.operand_u16(code, at)?;
                    let slot = code
                        .get_u16(at + 3)
                        .ok_or(RuntimeError::CodeOutOfBounds { at })?;
                    let v = self.pop()?;
                    self.set_ctx_local(scope, slot, v)?;
                }

                // ---- control transfer ----
                Ja => {
                    let displacement = code
                        .get_i16(at + 1)
                        .ok_or(RuntimeError::CodeOutOfBounds { at })?;
                    next = Self::branch_target(at, displacement)?;
                }
                IfIcmpNe => self.cond_branch(code, at, &mut next, |l, u| l != u)?,
                IfIcmpE => self.cond_branch(code, at, &mut next, |l, u| l == u)?,
                IfIcmpG => self.cond_branch(code, at, &mut next, |l, u| l > u)?,
                IfIcmpGe => self.cond_branch(code, at, &mut next, |l, u| l >= u)?,
                IfIcmpL => self.cond_branch(code, at, &mut next, |l, u| l < u)?,
                IfIcmpLe => self.cond_branch(code, at, &mut next, |l, u| l <= u)?,

                // ---- calls ----
                Call => {
                    let id = self.operand_u16(code, at)?;
                    let callee = self
                        .module
                        .function_by_id(id)
                        .ok_or(RuntimeError::UnknownFunction { at, id })?;
                    if self.calls.len() >= MAX_CALL_DEPTH {
                        return Err(RuntimeError::CallStackOverflow { at });
                    }
                    let arity = callee.signature().arity();
                    if self.stack.len() < arity {
                        return Err(RuntimeError::StackUnderflow { at });
                    }
                    // The callee's parameter-store prologue consumes the
                    // arguments; the base records the depth after that.
                    let stack_base = self.stack.len() - arity;
                    let frame_index = self.frames.len();
                    self.frames.push(Frame::new(callee.locals_count()));
                    self.contexts[callee.scope_id() as usize].push(frame_index);
                    self.calls.push(CallRecord {
                        return_ip: at + Opcode::Call.length(),
                        function: id,
                        stack_base,
                    });
                    self.function = id;
                    next = 0;
                }
                CallNative => {
                    let id = self.operand_u16(code, at)?;
                    let native = self
                        .module
                        .native_by_id(id)
                        .ok_or(RuntimeError::UnresolvedNative { at, id })?;
                    let func = native
                        .func()
                        .ok_or(RuntimeError::UnresolvedNative { at, id })?;
                    let arity = native.signature().arity();
                    // Arguments were evaluated rightmost-first, so popping
                    // yields them in declaration order.
                    let mut args = Vec::with_capacity(arity);
                    for _ in 0..arity {
                        args.push(self.pop()?);
                    }
                    let result = func(&args);
                    if native.signature().return_type.is_value() {
                        self.push(result)?;
                    }
                }
                Return => {
                    let returning = self.current_function()?;
                    let returned = if returning.signature().return_type.is_value() {
                        Some(self.local(0)?)
                    } else {
                        None
                    };
                    if self.calls.len() <= 1 {
                        return Ok(returned);
                    }
                    let scope = returning.scope_id() as usize;
                    let record = self
                        .calls
                        .pop()
                        .ok_or(RuntimeError::StackUnderflow { at })?;
                    self.stack.truncate(record.stack_base);
                    if let Some(v) = returned {
                        self.push(v)?;
                    }
                    self.frames.pop();
                    self.contexts[scope].pop();
                    self.function = self
                        .calls
                        .last()
                        .map(|r| r.function)
                        .ok_or(RuntimeError::StackUnderflow { at })?;
                    next = record.return_ip;
                }

                // ---- VM control ----
                Break => {}
                Stop => return Ok(None),
            }

            self.ip = next;
        }
    }

    fn operand_u16(&self, code: &Bytecode, at: usize) -> Result<u16, RuntimeError> {
        code.get_u16(at + 1)
            .ok_or(RuntimeError::CodeOutOfBounds { at })
    }

    fn branch_target(at: usize, displacement: i16) -> Result<usize, RuntimeError> {
        usize::try_from(at as i64 + 1 + displacement as i64)
            .map_err(|_| RuntimeError::CodeOutOfBounds { at })
    }

    /// Pop the right then the left operand.
    fn int_operands(&mut self) -> Result<(i64, i64), RuntimeError> {
        let right = self.pop()?.as_int();
        let left = self.pop()?.as_int();
        Ok((left, right))
    }

    fn int_binop(&mut self, f: fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let (left, right) = self.int_operands()?;
        self.push(Slot::from_int(f(left, right)))
    }

    fn double_binop(&mut self, f: fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let right = self.pop()?.as_double();
        let left = self.pop()?.as_double();
        self.push(Slot::from_double(f(left, right)))
    }

    fn cond_branch(
        &mut self,
        code: &Bytecode,
        at: usize,
        next: &mut usize,
        pred: fn(i64, i64) -> bool,
    ) -> Result<(), RuntimeError> {
        let displacement = code
            .get_i16(at + 1)
            .ok_or(RuntimeError::CodeOutOfBounds { at })?;
        let (left, right) = self.int_operands()?;
        if pred(left, right) {
            *next = Self::branch_target(at, displacement)?;
        }
        Ok(())
    }
}
