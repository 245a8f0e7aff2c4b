//! AST to bytecode translation.
//!
//! Translation runs in two passes. The first collects every function
//! declaration in pre-order and enters it into the module's function table,
//! so calls can target functions declared later in the tree and the entry
//! function receives id 0. The second translates one body at a time,
//! threading the compile-time type stack through every appended opcode.
//!
//! Variable access always uses the cross-scope opcodes with the owner's
//! `(scope, slot)` pair; the innermost live frame of the owning scope is
//! found at run time through the context stacks. Fast-path slot opcodes are
//! reserved for the return-slot convention.

use mathvm_common::{Bytecode, Label, Module, Opcode, VarType};

use crate::ast::{
    AssignOp, BinOp, Block, Expr, ExprKind, FunctionNode, Program, SourcePos, Stmt, StmtKind, UnOp,
};
use crate::error::CompileError;
use crate::scopes::VarRef;
use crate::type_stack::TypeStack;

/// Translate a program into a self-contained bytecode module.
pub fn emit(program: &Program) -> Result<Module, CompileError> {
    let mut module = Module::new();
    let mut order = Vec::new();
    collect_function(&program.entry, &mut module, &mut order)?;

    for (id, &node) in order.iter().enumerate() {
        let code = FunctionEmitter::new(&mut module, node).translate()?;
        let mut locals = program.registry.locals_count(node.scope);
        // Slot 0 is the return slot; make sure it exists even for a
        // parameterless, variable-less function.
        if node.signature.return_type.is_value() && locals == 0 {
            locals = 1;
        }
        module.define_function(id as u16, locals, code);
    }

    Ok(module)
}

/// Pre-order registration: a function enters the table before any function
/// nested inside it.
fn collect_function<'a>(
    node: &'a FunctionNode,
    module: &mut Module,
    order: &mut Vec<&'a FunctionNode>,
) -> Result<(), CompileError> {
    if module.function_by_name(&node.name).is_some() {
        return Err(CompileError::DuplicateFunction {
            name: node.name.clone(),
            pos: node.pos,
        });
    }
    module.add_function(&node.name, node.signature.clone(), node.scope)?;
    order.push(node);
    collect_in_block(&node.body, module, order)
}

fn collect_in_block<'a>(
    block: &'a Block,
    module: &mut Module,
    order: &mut Vec<&'a FunctionNode>,
) -> Result<(), CompileError> {
    for function in &block.functions {
        collect_function(function, module, order)?;
    }
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::Block(b) => collect_in_block(b, module, order)?,
            StmtKind::If(_, then_block, else_block) => {
                collect_in_block(then_block, module, order)?;
                if let Some(b) = else_block {
                    collect_in_block(b, module, order)?;
                }
            }
            StmtKind::While(_, b) | StmtKind::For(_, _, b) => {
                collect_in_block(b, module, order)?;
            }
            _ => {}
        }
    }
    Ok(())
}

struct FunctionEmitter<'a> {
    module: &'a mut Module,
    node: &'a FunctionNode,
    code: Bytecode,
    types: TypeStack,
    last_insn: Option<Opcode>,
}

impl<'a> FunctionEmitter<'a> {
    fn new(module: &'a mut Module, node: &'a FunctionNode) -> Self {
        Self {
            module,
            node,
            code: Bytecode::new(),
            types: TypeStack::new(),
            last_insn: None,
        }
    }

    fn translate(mut self) -> Result<Bytecode, CompileError> {
        let node = self.node;

        // The caller evaluated arguments rightmost-first, so the first
        // parameter sits on top of the stack at entry.
        for &ty in node.signature.params.iter().rev() {
            self.types.push(ty);
        }

        match &node.native {
            Some(symbol) => self.native_body(symbol)?,
            None => {
                for var in &node.params {
                    self.store_var(var, node.pos)?;
                }
                self.visit_block(&node.body)?;
                if self.last_insn != Some(Opcode::Return) {
                    self.insn(Opcode::Return)?;
                }
            }
        }

        if !self.types.is_empty() {
            return Err(CompileError::UnbalancedStack {
                function: node.name.clone(),
            });
        }
        self.code.finalize()?;
        Ok(self.code)
    }

    /// A native declaration compiles to a thin wrapper: forward the
    /// arguments still sitting on the value stack, park the result in the
    /// return slot, return.
    fn native_body(&mut self, symbol: &str) -> Result<(), CompileError> {
        let node = self.node;
        let id = self.module.add_native(symbol, node.signature.clone())?;
        self.insn(Opcode::CallNative)?;
        self.code.add_u16(id);
        for _ in 0..node.signature.arity() {
            self.types.pop("CALLNATIVE")?;
        }
        if node.signature.return_type.is_value() {
            self.types.push(node.signature.return_type);
            self.store_return_slot(node.signature.return_type)?;
        }
        self.insn(Opcode::Return)
    }

    // ---- instruction plumbing ----

    fn insn(&mut self, op: Opcode) -> Result<(), CompileError> {
        self.types.apply(op)?;
        self.code.add_insn(op);
        self.last_insn = Some(op);
        Ok(())
    }

    fn branch(&mut self, op: Opcode, label: Label) -> Result<(), CompileError> {
        self.types.apply(op)?;
        self.code.add_branch(op, label)?;
        self.last_insn = Some(op);
        Ok(())
    }

    fn bind(&mut self, label: Label) -> Result<(), CompileError> {
        self.code.bind(label).map_err(Into::into)
    }

    /// Pop runtime and type stacks back down to `depth`.
    fn truncate_to(&mut self, depth: usize) -> Result<(), CompileError> {
        while self.types.len() > depth {
            self.insn(Opcode::Pop)?;
        }
        Ok(())
    }

    // ---- statements ----

    fn visit_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let depth = self.types.len();
        for stmt in &block.stmts {
            self.visit_stmt(stmt)?;
        }
        self.truncate_to(depth)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let depth = self.types.len();
        match &stmt.kind {
            StmtKind::Store(var, op, value) => self.store_stmt(var, *op, value, stmt.pos)?,
            StmtKind::Expr(e) => {
                self.visit_expr(e)?;
            }
            StmtKind::Block(b) => self.visit_block(b)?,
            StmtKind::If(cond, then_block, else_block) => {
                self.if_stmt(cond, then_block, else_block.as_ref())?
            }
            StmtKind::While(cond, body) => self.while_stmt(cond, body)?,
            StmtKind::For(var, range, body) => self.for_stmt(var, range, body, stmt.pos)?,
            StmtKind::Return(value) => self.return_stmt(value.as_ref(), stmt.pos)?,
            StmtKind::Print(operands) => {
                for operand in operands {
                    let ty = self.visit_value(operand)?;
                    match ty {
                        VarType::Int => self.insn(Opcode::Iprint)?,
                        VarType::Double => self.insn(Opcode::Dprint)?,
                        _ => self.insn(Opcode::Sprint)?,
                    }
                }
            }
        }
        // A statement expression leaves its unused value behind; drop it.
        self.truncate_to(depth)
    }

    fn store_stmt(
        &mut self,
        var: &VarRef,
        op: AssignOp,
        value: &Expr,
        pos: SourcePos,
    ) -> Result<(), CompileError> {
        if op != AssignOp::Assign {
            if var.ty == VarType::Str {
                return Err(CompileError::StringCompound { pos });
            }
            self.load_var(var, pos)?;
        }
        self.visit_value(value)?;
        self.convert_to(var.ty, value.pos)?;
        match op {
            AssignOp::Assign => {}
            AssignOp::AddAssign => self.insn(if var.ty == VarType::Int {
                Opcode::Iadd
            } else {
                Opcode::Dadd
            })?,
            AssignOp::SubAssign => self.insn(if var.ty == VarType::Int {
                Opcode::Isub
            } else {
                Opcode::Dsub
            })?,
        }
        self.store_var(var, pos)
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        let ty = self.visit_value(cond)?;
        self.coerce_condition(ty)?;
        self.insn(Opcode::Iload0)?;
        let l_else = self.code.new_label();
        self.branch(Opcode::IfIcmpE, l_else)?;
        self.visit_block(then_block)?;
        match else_block {
            Some(b) => {
                let l_end = self.code.new_label();
                self.branch(Opcode::Ja, l_end)?;
                self.bind(l_else)?;
                self.visit_block(b)?;
                self.bind(l_end)
            }
            None => self.bind(l_else),
        }
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Block) -> Result<(), CompileError> {
        let l_top = self.code.new_label();
        self.bind(l_top)?;
        let ty = self.visit_value(cond)?;
        self.coerce_condition(ty)?;
        self.insn(Opcode::Iload0)?;
        let l_done = self.code.new_label();
        self.branch(Opcode::IfIcmpE, l_done)?;
        self.visit_block(body)?;
        self.branch(Opcode::Ja, l_top)?;
        self.bind(l_done)
    }

    /// Range iteration. The upper bound stays on the value stack for the
    /// loop's whole lifetime so the range is evaluated exactly once; the
    /// guard re-materializes it with DUMP/SWAP each iteration.
    fn for_stmt(
        &mut self,
        var: &VarRef,
        range: &Expr,
        body: &Block,
        pos: SourcePos,
    ) -> Result<(), CompileError> {
        if var.ty != VarType::Int {
            return Err(CompileError::ForInductionNotInt { found: var.ty, pos });
        }
        let (lo, hi) = match &range.kind {
            ExprKind::Binary(BinOp::Range, lo, hi) => (lo.as_ref(), hi.as_ref()),
            _ => return Err(CompileError::ForRequiresRange { pos: range.pos }),
        };
        self.visit_value(lo)?;
        self.convert_to(VarType::Int, lo.pos)?;
        self.visit_value(hi)?;
        self.convert_to(VarType::Int, hi.pos)?;

        // [lo, hi] -> [hi, lo]: the next induction value rides on top.
        self.insn(Opcode::Swap)?;
        let l_top = self.code.new_label();
        self.bind(l_top)?;
        self.store_var(var, pos)?;
        self.insn(Opcode::Dump)?;
        self.load_var(var, pos)?;
        self.insn(Opcode::Swap)?; // [hi, i, hi]
        let l_done = self.code.new_label();
        self.branch(Opcode::IfIcmpG, l_done)?;
        self.visit_block(body)?;
        self.load_var(var, pos)?;
        self.insn(Opcode::Iload1)?;
        self.insn(Opcode::Iadd)?;
        self.branch(Opcode::Ja, l_top)?;
        self.bind(l_done)?;
        // The back edge carried [hi, i+1]; the exit path holds [hi] only.
        self.types.pop("for")?;
        self.insn(Opcode::Pop)
    }

    fn return_stmt(&mut self, value: Option<&Expr>, pos: SourcePos) -> Result<(), CompileError> {
        let ret = self.node.signature.return_type;
        match (ret, value) {
            (VarType::Void, None) => self.insn(Opcode::Return),
            (VarType::Void, Some(e)) => Err(CompileError::ReturnValueInVoid { pos: e.pos }),
            (_, Some(e)) => {
                self.visit_value(e)?;
                self.convert_to(ret, e.pos)?;
                self.store_return_slot(ret)?;
                self.insn(Opcode::Return)
            }
            (_, None) => Err(CompileError::MissingReturnValue { pos }),
        }
    }

    fn store_return_slot(&mut self, ty: VarType) -> Result<(), CompileError> {
        match ty {
            VarType::Int => self.insn(Opcode::StoreIvar0),
            VarType::Double => self.insn(Opcode::StoreDvar0),
            _ => self.insn(Opcode::StoreSvar0),
        }
    }

    // ---- expressions ----

    /// Emit `expr`, returning its static type. `Void` means the expression
    /// produced no value (a call to a void function).
    fn visit_expr(&mut self, expr: &Expr) -> Result<VarType, CompileError> {
        match &expr.kind {
            ExprKind::Int(v) => {
                self.int_literal(*v)?;
                Ok(VarType::Int)
            }
            ExprKind::Double(v) => {
                self.double_literal(*v)?;
                Ok(VarType::Double)
            }
            ExprKind::Str(s) => {
                self.string_literal(s)?;
                Ok(VarType::Str)
            }
            ExprKind::Load(var) => {
                self.load_var(var, expr.pos)?;
                Ok(var.ty)
            }
            ExprKind::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, expr.pos),
            ExprKind::Unary(op, operand) => self.unary(*op, operand),
            ExprKind::Call(name, args) => self.call(name, args, expr.pos),
        }
    }

    /// Emit `expr` where a value is required.
    fn visit_value(&mut self, expr: &Expr) -> Result<VarType, CompileError> {
        let ty = self.visit_expr(expr)?;
        if ty == VarType::Void {
            return Err(CompileError::VoidValue { pos: expr.pos });
        }
        Ok(ty)
    }

    fn int_literal(&mut self, value: i64) -> Result<(), CompileError> {
        match value {
            0 => self.insn(Opcode::Iload0),
            1 => self.insn(Opcode::Iload1),
            -1 => self.insn(Opcode::IloadM1),
            _ => {
                self.insn(Opcode::Iload)?;
                self.code.add_i64(value);
                Ok(())
            }
        }
    }

    fn double_literal(&mut self, value: f64) -> Result<(), CompileError> {
        // Bitwise matches so -0.0 keeps its sign through DLOAD.
        let bits = value.to_bits();
        if bits == 0.0f64.to_bits() {
            self.insn(Opcode::Dload0)
        } else if bits == 1.0f64.to_bits() {
            self.insn(Opcode::Dload1)
        } else if bits == (-1.0f64).to_bits() {
            self.insn(Opcode::DloadM1)
        } else {
            self.insn(Opcode::Dload)?;
            self.code.add_f64(value);
            Ok(())
        }
    }

    fn string_literal(&mut self, value: &str) -> Result<(), CompileError> {
        if value.is_empty() {
            return self.insn(Opcode::Sload0);
        }
        let id = self.module.add_string_constant(value)?;
        self.insn(Opcode::Sload)?;
        self.code.add_u16(id);
        Ok(())
    }

    fn load_var(&mut self, var: &VarRef, pos: SourcePos) -> Result<(), CompileError> {
        let op = match var.ty {
            VarType::Int => Opcode::LoadCtxIvar,
            VarType::Double => Opcode::LoadCtxDvar,
            VarType::Str => Opcode::LoadCtxSvar,
            VarType::Void => return Err(CompileError::VoidValue { pos }),
        };
        self.insn(op)?;
        self.code.add_u16(var.scope);
        self.code.add_u16(var.slot);
        Ok(())
    }

    fn store_var(&mut self, var: &VarRef, pos: SourcePos) -> Result<(), CompileError> {
        let op = match var.ty {
            VarType::Int => Opcode::StoreCtxIvar,
            VarType::Double => Opcode::StoreCtxDvar,
            VarType::Str => Opcode::StoreCtxSvar,
            VarType::Void => return Err(CompileError::VoidValue { pos }),
        };
        self.insn(op)?;
        self.code.add_u16(var.scope);
        self.code.add_u16(var.slot);
        Ok(())
    }

    /// Convert the value on top of the stack to `target`.
    fn convert_to(&mut self, target: VarType, pos: SourcePos) -> Result<(), CompileError> {
        let from = self
            .types
            .top()
            .ok_or(CompileError::StackUnderflow { context: "convert" })?;
        if from == target {
            return Ok(());
        }
        match (from, target) {
            (VarType::Int, VarType::Double) => self.insn(Opcode::I2d),
            (VarType::Double, VarType::Int) => self.insn(Opcode::D2i),
            (VarType::Str, VarType::Int) => self.insn(Opcode::S2i),
            (VarType::Str, VarType::Double) => {
                self.insn(Opcode::S2i)?;
                self.insn(Opcode::I2d)
            }
            _ => Err(CompileError::InvalidConversion {
                from,
                to: target,
                pos,
            }),
        }
    }

    /// Convert the top two stack values to `target`, swapping to reach the
    /// lower one.
    fn convert_pair(&mut self, target: VarType, pos: SourcePos) -> Result<(), CompileError> {
        if self.types.top() != Some(target) {
            self.convert_to(target, pos)?;
        }
        if self.types.peek(1) != Some(target) {
            self.insn(Opcode::Swap)?;
            self.convert_to(target, pos)?;
            self.insn(Opcode::Swap)?;
        }
        Ok(())
    }

    fn operand_pair(&self) -> Result<(VarType, VarType), CompileError> {
        let rhs = self
            .types
            .top()
            .ok_or(CompileError::StackUnderflow { context: "binary" })?;
        let lhs = self
            .types
            .peek(1)
            .ok_or(CompileError::StackUnderflow { context: "binary" })?;
        Ok((lhs, rhs))
    }

    /// Unify the top two operands for `+ - * /`: like numeric types stay,
    /// mixed numeric goes to double, anything involving a string goes
    /// through the integer reading of the string.
    fn unify_numeric(&mut self, pos: SourcePos) -> Result<VarType, CompileError> {
        let (lhs, rhs) = self.operand_pair()?;
        if lhs == rhs && matches!(lhs, VarType::Int | VarType::Double) {
            return Ok(lhs);
        }
        let target = if lhs == VarType::Str || rhs == VarType::Str {
            VarType::Int
        } else {
            VarType::Double
        };
        self.convert_pair(target, pos)?;
        Ok(target)
    }

    /// Unify for comparisons: like types stay (strings compare as their
    /// integer reading, materialized by the caller), mixed goes to double
    /// unless a string forces the integer path.
    fn unify_compare(&mut self, pos: SourcePos) -> Result<VarType, CompileError> {
        let (lhs, rhs) = self.operand_pair()?;
        if lhs == rhs {
            return Ok(lhs);
        }
        let target = if lhs == VarType::Str || rhs == VarType::Str {
            VarType::Int
        } else {
            VarType::Double
        };
        self.convert_pair(target, pos)?;
        Ok(target)
    }

    fn binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: SourcePos,
    ) -> Result<VarType, CompileError> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                self.visit_value(lhs)?;
                self.visit_value(rhs)?;
                let result = self.unify_numeric(pos)?;
                let opcode = if result == VarType::Int {
                    match op {
                        BinOp::Add => Opcode::Iadd,
                        BinOp::Sub => Opcode::Isub,
                        BinOp::Mul => Opcode::Imul,
                        _ => Opcode::Idiv,
                    }
                } else {
                    match op {
                        BinOp::Add => Opcode::Dadd,
                        BinOp::Sub => Opcode::Dsub,
                        BinOp::Mul => Opcode::Dmul,
                        _ => Opcode::Ddiv,
                    }
                };
                self.insn(opcode)?;
                Ok(result)
            }
            BinOp::Mod | BinOp::BitOr | BinOp::BitAnd | BinOp::BitXor => {
                self.visit_value(lhs)?;
                self.visit_value(rhs)?;
                self.convert_pair(VarType::Int, pos)?;
                let opcode = match op {
                    BinOp::Mod => Opcode::Imod,
                    BinOp::BitOr => Opcode::Iaor,
                    BinOp::BitAnd => Opcode::Iaand,
                    _ => Opcode::Iaxor,
                };
                self.insn(opcode)?;
                Ok(VarType::Int)
            }
            BinOp::Range => Err(CompileError::RangeOutsideFor { pos }),
            BinOp::Eq | BinOp::Ne | BinOp::Gt | BinOp::Ge | BinOp::Lt | BinOp::Le => {
                self.comparison(op, lhs, rhs, pos)
            }
            BinOp::And | BinOp::Or => self.logic(op, lhs, rhs),
        }
    }

    /// Lower a comparison to CMP plus a conditional branch yielding 0 or 1.
    fn comparison(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: SourcePos,
    ) -> Result<VarType, CompileError> {
        self.visit_value(lhs)?;
        self.visit_value(rhs)?;
        let mut ty = self.unify_compare(pos)?;
        if ty == VarType::Str {
            self.insn(Opcode::S2i)?;
            self.insn(Opcode::Swap)?;
            self.insn(Opcode::S2i)?;
            self.insn(Opcode::Swap)?;
            ty = VarType::Int;
        }
        self.insn(if ty == VarType::Int {
            Opcode::Icmp
        } else {
            Opcode::Dcmp
        })?;
        self.insn(Opcode::Iload0)?;

        let branch = match op {
            BinOp::Eq => Opcode::IfIcmpE,
            BinOp::Ne => Opcode::IfIcmpNe,
            BinOp::Gt => Opcode::IfIcmpG,
            BinOp::Ge => Opcode::IfIcmpGe,
            BinOp::Lt => Opcode::IfIcmpL,
            _ => Opcode::IfIcmpLe,
        };
        let l_true = self.code.new_label();
        let l_end = self.code.new_label();
        self.branch(branch, l_true)?;
        self.insn(Opcode::Iload0)?;
        self.branch(Opcode::Ja, l_end)?;
        self.bind(l_true)?;
        // The two pushes sit on alternative paths; only one materializes.
        self.types.pop("comparison")?;
        self.insn(Opcode::Iload1)?;
        self.bind(l_end)?;
        Ok(VarType::Int)
    }

    /// Short-circuit `&&` / `||`. Each operand is tested against zero and
    /// jumps straight to the short-circuit result on a decisive value.
    fn logic(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<VarType, CompileError> {
        let (test, fall_through, short_circuit) = if op == BinOp::Or {
            (Opcode::IfIcmpNe, Opcode::Iload0, Opcode::Iload1)
        } else {
            (Opcode::IfIcmpE, Opcode::Iload1, Opcode::Iload0)
        };

        let l_short = self.code.new_label();
        let l_end = self.code.new_label();
        for operand in [lhs, rhs] {
            let mut ty = self.visit_value(operand)?;
            if ty == VarType::Str {
                self.insn(Opcode::S2i)?;
                ty = VarType::Int;
            }
            if ty == VarType::Int {
                self.insn(Opcode::Iload0)?;
            } else {
                self.insn(Opcode::Dload0)?;
                self.insn(Opcode::Dcmp)?;
                self.insn(Opcode::Iload0)?;
            }
            self.branch(test, l_short)?;
        }
        self.insn(fall_through)?;
        self.branch(Opcode::Ja, l_end)?;
        self.bind(l_short)?;
        self.types.pop("logic")?;
        self.insn(short_circuit)?;
        self.bind(l_end)?;
        Ok(VarType::Int)
    }

    fn unary(&mut self, op: UnOp, operand: &Expr) -> Result<VarType, CompileError> {
        let mut ty = self.visit_value(operand)?;
        if ty == VarType::Str {
            self.insn(Opcode::S2i)?;
            ty = VarType::Int;
        }
        match op {
            UnOp::Plus => Ok(ty),
            UnOp::Neg => {
                self.insn(if ty == VarType::Int {
                    Opcode::Ineg
                } else {
                    Opcode::Dneg
                })?;
                Ok(ty)
            }
            UnOp::Not => {
                if ty == VarType::Int {
                    self.insn(Opcode::Iload0)?;
                    self.insn(Opcode::Icmp)?;
                } else {
                    self.insn(Opcode::Dload0)?;
                    self.insn(Opcode::Dcmp)?;
                }
                self.insn(Opcode::Iload0)?;
                let l_true = self.code.new_label();
                let l_end = self.code.new_label();
                self.branch(Opcode::IfIcmpE, l_true)?;
                self.insn(Opcode::Iload0)?;
                self.branch(Opcode::Ja, l_end)?;
                self.bind(l_true)?;
                self.types.pop("logic")?;
                self.insn(Opcode::Iload1)?;
                self.bind(l_end)?;
                Ok(VarType::Int)
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], pos: SourcePos) -> Result<VarType, CompileError> {
        let (id, signature) = match self.module.function_by_name(name) {
            Some(f) => (f.id(), f.signature().clone()),
            None => {
                return Err(CompileError::UnknownFunction {
                    name: name.to_string(),
                    pos,
                })
            }
        };
        if args.len() != signature.arity() {
            return Err(CompileError::ArityMismatch {
                name: name.to_string(),
                expected: signature.arity(),
                found: args.len(),
                pos,
            });
        }

        // Rightmost argument first, so the callee prologue pops parameters
        // in declaration order.
        for (arg, &ty) in args.iter().zip(signature.params.iter()).rev() {
            self.visit_value(arg)?;
            self.convert_to(ty, arg.pos)?;
        }

        self.insn(Opcode::Call)?;
        self.code.add_u16(id);
        for _ in 0..signature.arity() {
            self.types.pop("CALL")?;
        }
        if signature.return_type.is_value() {
            self.types.push(signature.return_type);
        }
        Ok(signature.return_type)
    }

    fn coerce_condition(&mut self, ty: VarType) -> Result<(), CompileError> {
        match ty {
            VarType::Double => self.insn(Opcode::D2i),
            VarType::Str => self.insn(Opcode::S2i),
            _ => Ok(()),
        }
    }
}
