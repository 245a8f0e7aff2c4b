//! Instruction-stream walking and deterministic disassembly.
//!
//! [`decode`] walks a byte stream using the opcode table's length column
//! and yields structured instructions; [`encode`] re-emits a decoded
//! stream, reproducing the input bytes exactly. The text rendering is a
//! stable, driver-facing convenience built on the same walk.

use std::fmt;

use crate::error::DecodeError;
use crate::module::Module;
use crate::opcode::Opcode;

/// A decoded immediate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// No immediate bytes.
    None,
    /// 64-bit integer immediate (`ILOAD`).
    Int(i64),
    /// Double immediate (`DLOAD`).
    Double(f64),
    /// A 16-bit id: string constant, local slot, function, or native.
    Id(u16),
    /// Branch displacement relative to the byte after the opcode.
    Offset(i16),
    /// Cross-scope variable address.
    ScopedVar { scope: u16, slot: u16 },
}

/// One instruction decoded from a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedInsn {
    /// Byte offset of the opcode within its function.
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: Operand,
}

fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([code[at], code[at + 1]])
}

/// Decode an entire instruction stream.
///
/// Fails on an unknown opcode byte or a stream that ends inside an
/// instruction's immediates.
pub fn decode(code: &[u8]) -> Result<Vec<DecodedInsn>, DecodeError> {
    let mut insns = Vec::new();
    let mut at = 0;

    while at < code.len() {
        let opcode = Opcode::try_from(code[at])?;
        let length = opcode.length();
        if at + length > code.len() {
            return Err(DecodeError::TruncatedInstruction {
                at,
                mnemonic: opcode.mnemonic(),
                needed: length,
                available: code.len() - at,
            });
        }

        let operand = match opcode {
            Opcode::Iload => {
                let bytes: [u8; 8] = code[at + 1..at + 9].try_into().expect("length checked");
                Operand::Int(i64::from_le_bytes(bytes))
            }
            Opcode::Dload => {
                let bytes: [u8; 8] = code[at + 1..at + 9].try_into().expect("length checked");
                Operand::Double(f64::from_bits(u64::from_le_bytes(bytes)))
            }
            Opcode::Sload
            | Opcode::LoadDvar
            | Opcode::LoadIvar
            | Opcode::LoadSvar
            | Opcode::StoreDvar
            | Opcode::StoreIvar
            | Opcode::StoreSvar
            | Opcode::Call
            | Opcode::CallNative => Operand::Id(read_u16(code, at + 1)),
            Opcode::Ja
            | Opcode::IfIcmpNe
            | Opcode::IfIcmpE
            | Opcode::IfIcmpG
            | Opcode::IfIcmpGe
            | Opcode::IfIcmpL
            | Opcode::IfIcmpLe => Operand::Offset(read_u16(code, at + 1) as i16),
            Opcode::LoadCtxDvar
            | Opcode::LoadCtxIvar
            | Opcode::LoadCtxSvar
            | Opcode::StoreCtxDvar
            | Opcode::StoreCtxIvar
            | Opcode::StoreCtxSvar => Operand::ScopedVar {
                scope: read_u16(code, at + 1),
                slot: read_u16(code, at + 3),
            },
            _ => Operand::None,
        };

        insns.push(DecodedInsn {
            offset: at,
            opcode,
            operand,
        });
        at += length;
    }

    Ok(insns)
}

/// Re-emit a decoded stream as bytes.
///
/// For input produced by [`decode`] the result is byte-identical to the
/// original stream.
pub fn encode(insns: &[DecodedInsn]) -> Vec<u8> {
    let mut code = Vec::new();
    for insn in insns {
        code.push(insn.opcode as u8);
        match insn.operand {
            Operand::None => {}
            Operand::Int(v) => code.extend_from_slice(&v.to_le_bytes()),
            Operand::Double(v) => code.extend_from_slice(&v.to_bits().to_le_bytes()),
            Operand::Id(v) => code.extend_from_slice(&v.to_le_bytes()),
            Operand::Offset(v) => code.extend_from_slice(&v.to_le_bytes()),
            Operand::ScopedVar { scope, slot } => {
                code.extend_from_slice(&scope.to_le_bytes());
                code.extend_from_slice(&slot.to_le_bytes());
            }
        }
    }
    code
}

impl fmt::Display for DecodedInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode.mnemonic();
        match self.operand {
            Operand::None => f.write_str(m),
            Operand::Int(v) => write!(f, "{m} {v}"),
            Operand::Double(v) => write!(f, "{m} {v}"),
            Operand::Id(v) => write!(f, "{m} {v}"),
            // Branches render the absolute target; the encoding keeps the
            // relative displacement.
            Operand::Offset(v) => {
                let target = self.offset as i64 + 1 + v as i64;
                write!(f, "{m} {target}")
            }
            Operand::ScopedVar { scope, slot } => write!(f, "{m} {scope} {slot}"),
        }
    }
}

/// Render one instruction stream as text, one instruction per line.
pub fn disassemble(code: &[u8]) -> Result<String, DecodeError> {
    let mut text = String::new();
    for insn in decode(code)? {
        text.push_str(&format!("{:5}: {}\n", insn.offset, insn));
    }
    Ok(text)
}

/// Render every function of a module, in id order.
pub fn disassemble_module(module: &Module) -> Result<String, DecodeError> {
    let mut text = String::new();
    for function in module.functions() {
        let sig = function.signature();
        let params: Vec<&str> = sig.params.iter().map(|t| t.name()).collect();
        text.push_str(&format!(
            "function {} {} {}({}) scope={} locals={}\n",
            function.id(),
            sig.return_type.name(),
            function.name(),
            params.join(", "),
            function.scope_id(),
            function.locals_count(),
        ));
        text.push_str(&disassemble(function.bytecode().as_bytes())?);
    }
    Ok(text)
}
