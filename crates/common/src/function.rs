//! Function signatures and compiled function entries.

use crate::bytecode::Bytecode;
use crate::types::VarType;

/// Return type plus parameter types, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub return_type: VarType,
    pub params: Vec<VarType>,
}

impl Signature {
    pub fn new(return_type: VarType, params: Vec<VarType>) -> Self {
        Self {
            return_type,
            params,
        }
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A compiled function in the module's function table.
///
/// Locals include the parameters at slots `0..arity`. Slot 0 doubles as the
/// return-value slot: the return epilogue stores into it and the
/// interpreter republishes it to the value stack when the invocation ends.
#[derive(Debug, Clone)]
pub struct BytecodeFunction {
    id: u16,
    name: String,
    signature: Signature,
    scope_id: u16,
    locals_count: u16,
    code: Bytecode,
}

impl BytecodeFunction {
    pub(crate) fn new(id: u16, name: String, signature: Signature, scope_id: u16) -> Self {
        Self {
            id,
            name,
            signature,
            scope_id,
            locals_count: 0,
            code: Bytecode::new(),
        }
    }

    /// Position in the module's function table. Id 0 is the entry point.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Id of the scope whose variables live in this function's frame.
    pub fn scope_id(&self) -> u16 {
        self.scope_id
    }

    /// Size of this function's activation frame, in slots.
    pub fn locals_count(&self) -> u16 {
        self.locals_count
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.code
    }

    pub(crate) fn define(&mut self, locals_count: u16, code: Bytecode) {
        self.locals_count = locals_count;
        self.code = code;
    }
}
