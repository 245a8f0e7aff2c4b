//! Scope and variable numbering.
//!
//! The registry hands out stable numeric ids: scope ids in the pre-order
//! the front end opens scopes, and per-frame variable slots in declaration
//! order. Function scopes are frame roots; block scopes nest inside them
//! for name resolution and shadowing, but their variables are stored in the
//! enclosing function's frame. A variable reference is therefore always an
//! `(owning function scope, frame slot)` pair, which is what the
//! cross-scope load/store opcodes encode — inner functions reach outer
//! variables without capture lists.

use std::collections::HashMap;

use mathvm_common::VarType;

use crate::error::CompileError;

/// A resolved variable reference: the id of the function scope owning the
/// variable's frame, the slot within that frame, and the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    pub scope: u16,
    pub slot: u16,
    pub ty: VarType,
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<u16>,
    /// Nearest enclosing function scope; equals the scope's own id for
    /// function scopes.
    frame: u16,
    names: HashMap<String, VarRef>,
    /// Next free frame slot. Meaningful only on function scopes.
    next_slot: u16,
}

/// Assigns scope ids and frame slots; records ownership for resolution.
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    scopes: Vec<Scope>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, parent: Option<u16>, frame: Option<u16>) -> Result<u16, CompileError> {
        let id = u16::try_from(self.scopes.len()).map_err(|_| CompileError::TooManyScopes)?;
        self.scopes.push(Scope {
            parent,
            frame: frame.unwrap_or(id),
            names: HashMap::new(),
            next_slot: 0,
        });
        Ok(id)
    }

    fn get(&self, scope: u16) -> Result<&Scope, CompileError> {
        self.scopes
            .get(scope as usize)
            .ok_or(CompileError::UnknownScope { scope })
    }

    /// Open a function scope: a frame root whose variables get slots of
    /// their own. The entry function's scope has no parent.
    pub fn function_scope(&mut self, parent: Option<u16>) -> Result<u16, CompileError> {
        if let Some(p) = parent {
            self.get(p)?;
        }
        self.push(parent, None)
    }

    /// Open a block scope nested in `parent`. Its variables live in the
    /// enclosing function's frame.
    pub fn block_scope(&mut self, parent: u16) -> Result<u16, CompileError> {
        let frame = self.get(parent)?.frame;
        self.push(Some(parent), Some(frame))
    }

    /// Declare a variable in `scope` and assign it the next frame slot.
    pub fn declare(
        &mut self,
        scope: u16,
        name: &str,
        ty: VarType,
    ) -> Result<VarRef, CompileError> {
        if ty == VarType::Void {
            return Err(CompileError::VoidVariable {
                name: name.to_string(),
            });
        }
        let frame = self.get(scope)?.frame;
        if self.scopes[scope as usize].names.contains_key(name) {
            return Err(CompileError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        let slot = self.scopes[frame as usize].next_slot;
        let next = slot
            .checked_add(1)
            .ok_or(CompileError::TooManyLocals { scope: frame })?;
        self.scopes[frame as usize].next_slot = next;
        let var = VarRef {
            scope: frame,
            slot,
            ty,
        };
        self.scopes[scope as usize]
            .names
            .insert(name.to_string(), var);
        Ok(var)
    }

    /// Look a name up along the lexical chain; the innermost match wins.
    pub fn resolve(&self, scope: u16, name: &str) -> Option<VarRef> {
        let mut cursor = self.scopes.get(scope as usize);
        while let Some(s) = cursor {
            if let Some(&var) = s.names.get(name) {
                return Some(var);
            }
            cursor = s.parent.and_then(|p| self.scopes.get(p as usize));
        }
        None
    }

    /// Frame size, in slots, of the function scope enclosing `scope`.
    pub fn locals_count(&self, scope: u16) -> u16 {
        self.scopes
            .get(scope as usize)
            .map(|s| self.scopes[s.frame as usize].next_slot)
            .unwrap_or(0)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}
