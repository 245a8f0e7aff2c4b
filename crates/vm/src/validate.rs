//! Load-time validation: everything that can be rejected before the first
//! instruction executes.
//!
//! A module produced by the emitter always passes; these checks guard the
//! interpreter against hand-assembled or corrupted input so the dispatch
//! loop can trust instruction boundaries and table ids.

use std::collections::{HashMap, HashSet};

use mathvm_common::{BytecodeFunction, DecodeError, Module, Opcode};

use crate::error::LoadError;

/// Check a whole module. Returns the first problem found.
pub fn validate(module: &Module) -> Result<(), LoadError> {
    if module.function_count() == 0 {
        return Err(LoadError::EmptyModule);
    }

    // Scope id -> frame size of the owning function, for cross-scope
    // operand checks.
    let mut scope_locals: HashMap<u16, u16> = HashMap::new();
    for function in module.functions() {
        scope_locals.insert(function.scope_id(), function.locals_count());
    }

    for function in module.functions() {
        validate_function(module, function, &scope_locals)?;
    }

    for native in module.natives() {
        if native.func().is_none() {
            return Err(LoadError::UnboundNative {
                name: native.name().to_string(),
            });
        }
    }

    Ok(())
}

/// Frame slot addressed by a fast-path local opcode, if any.
fn fast_slot(opcode: Opcode) -> Option<u16> {
    use Opcode::*;
    match opcode {
        LoadDvar0 | LoadIvar0 | LoadSvar0 | StoreDvar0 | StoreIvar0 | StoreSvar0 => Some(0),
        LoadDvar1 | LoadIvar1 | LoadSvar1 | StoreDvar1 | StoreIvar1 | StoreSvar1 => Some(1),
        LoadDvar2 | LoadIvar2 | LoadSvar2 | StoreDvar2 | StoreIvar2 | StoreSvar2 => Some(2),
        LoadDvar3 | LoadIvar3 | LoadSvar3 | StoreDvar3 | StoreIvar3 | StoreSvar3 => Some(3),
        _ => None,
    }
}

fn validate_function(
    module: &Module,
    function: &BytecodeFunction,
    scope_locals: &HashMap<u16, u16>,
) -> Result<(), LoadError> {
    use Opcode::*;

    let id = function.id();
    let code = function.bytecode().as_bytes();
    if code.is_empty() {
        return Err(LoadError::EmptyFunction { function: id });
    }

    let read_u16 = |at: usize| u16::from_le_bytes([code[at], code[at + 1]]);

    let mut boundaries: HashSet<usize> = HashSet::new();
    let mut branches: Vec<(usize, i64)> = Vec::new();
    let mut at = 0;

    while at < code.len() {
        boundaries.insert(at);
        let opcode = Opcode::try_from(code[at]).map_err(|source| LoadError::Decode {
            function: id,
            source,
        })?;
        let length = opcode.length();
        if at + length > code.len() {
            return Err(LoadError::Decode {
                function: id,
                source: DecodeError::TruncatedInstruction {
                    at,
                    mnemonic: opcode.mnemonic(),
                    needed: length,
                    available: code.len() - at,
                },
            });
        }

        match opcode {
            Sload => {
                let sid = read_u16(at + 1);
                if sid as usize >= module.string_count() {
                    return Err(LoadError::StringIdOutOfRange {
                        function: id,
                        at,
                        id: sid,
                    });
                }
            }
            Call => {
                let fid = read_u16(at + 1);
                if fid as usize >= module.function_count() {
                    return Err(LoadError::FunctionIdOutOfRange {
                        function: id,
                        at,
                        id: fid,
                    });
                }
            }
            CallNative => {
                let nid = read_u16(at + 1);
                if nid as usize >= module.native_count() {
                    return Err(LoadError::NativeIdOutOfRange {
                        function: id,
                        at,
                        id: nid,
                    });
                }
            }
            Ja | IfIcmpNe | IfIcmpE | IfIcmpG | IfIcmpGe | IfIcmpL | IfIcmpLe => {
                let displacement = read_u16(at + 1) as i16;
                branches.push((at, at as i64 + 1 + displacement as i64));
            }
            LoadCtxDvar | LoadCtxIvar | LoadCtxSvar | StoreCtxDvar | StoreCtxIvar
            | StoreCtxSvar => {
                let scope = read_u16(at + 1);
                let slot = read_u16(at + 3);
                match scope_locals.get(&scope) {
                    None => {
                        return Err(LoadError::ScopeOutOfRange {
                            function: id,
                            at,
                            scope,
                        })
                    }
                    Some(&locals) if slot >= locals => {
                        return Err(LoadError::LocalOutOfRange {
                            function: id,
                            at,
                            slot,
                            locals,
                        })
                    }
                    Some(_) => {}
                }
            }
            LoadDvar | LoadIvar | LoadSvar | StoreDvar | StoreIvar | StoreSvar => {
                let slot = read_u16(at + 1);
                if slot >= function.locals_count() {
                    return Err(LoadError::LocalOutOfRange {
                        function: id,
                        at,
                        slot,
                        locals: function.locals_count(),
                    });
                }
            }
            _ => {
                if let Some(slot) = fast_slot(opcode) {
                    if slot >= function.locals_count() {
                        return Err(LoadError::LocalOutOfRange {
                            function: id,
                            at,
                            slot,
                            locals: function.locals_count(),
                        });
                    }
                }
            }
        }

        at += length;
    }

    // A label bound at the very end of the stream is legal; it is only
    // reachable through instructions that never execute past a RETURN.
    boundaries.insert(code.len());

    for (at, target) in branches {
        let in_bounds = target >= 0 && (target as usize) <= code.len();
        if !in_bounds || !boundaries.contains(&(target as usize)) {
            return Err(LoadError::BranchTarget {
                function: id,
                at,
                target,
            });
        }
    }

    Ok(())
}
