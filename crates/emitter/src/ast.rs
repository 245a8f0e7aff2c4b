//! The typed AST the emitter consumes.
//!
//! The front end (lexer, parser, resolver) is an external collaborator: it
//! is expected to deliver trees whose variable references are already
//! resolved to [`VarRef`]s through the [`crate::scopes::ScopeRegistry`] and
//! whose functions carry full signatures. Nodes own their children; every
//! node records the source position used in diagnostics.

use std::fmt;

use mathvm_common::Signature;

use crate::scopes::VarRef;

/// A line/column pair, 1-based in front-end output. `0:0` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Binary operator token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
    BitXor,
    /// `lo..hi`; valid only as a `for` loop iterable.
    Range,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

/// Unary operator token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Neg,
    Not,
}

/// Assignment forms. Compound forms are forbidden on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Double(f64),
    Str(String),
    Load(VarRef),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, pos: SourcePos) -> Self {
        Self { kind, pos }
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), SourcePos::default())
    }

    pub fn double(value: f64) -> Self {
        Self::new(ExprKind::Double(value), SourcePos::default())
    }

    pub fn str(value: &str) -> Self {
        Self::new(ExprKind::Str(value.to_string()), SourcePos::default())
    }

    pub fn load(var: VarRef) -> Self {
        Self::new(ExprKind::Load(var), SourcePos::default())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), SourcePos::default())
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary(op, Box::new(operand)), SourcePos::default())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call(name.to_string(), args), SourcePos::default())
    }

    /// Attach a source position.
    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = pos;
        self
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `var = expr`, `var += expr`, `var -= expr`.
    Store(VarRef, AssignOp, Expr),
    /// An expression evaluated for effect; its value is discarded.
    Expr(Expr),
    Block(Block),
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    /// `for (var in range) body`.
    For(VarRef, Expr, Block),
    Return(Option<Expr>),
    /// `print(a, b, ...)` with 0..N operands of any primitive type.
    Print(Vec<Expr>),
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: SourcePos) -> Self {
        Self { kind, pos }
    }

    pub fn assign(var: VarRef, value: Expr) -> Self {
        Self::new(StmtKind::Store(var, AssignOp::Assign, value), SourcePos::default())
    }

    pub fn add_assign(var: VarRef, value: Expr) -> Self {
        Self::new(StmtKind::Store(var, AssignOp::AddAssign, value), SourcePos::default())
    }

    pub fn sub_assign(var: VarRef, value: Expr) -> Self {
        Self::new(StmtKind::Store(var, AssignOp::SubAssign, value), SourcePos::default())
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr), SourcePos::default())
    }

    pub fn block(block: Block) -> Self {
        Self::new(StmtKind::Block(block), SourcePos::default())
    }

    pub fn if_else(cond: Expr, then_block: Block, else_block: Option<Block>) -> Self {
        Self::new(StmtKind::If(cond, then_block, else_block), SourcePos::default())
    }

    pub fn while_loop(cond: Expr, body: Block) -> Self {
        Self::new(StmtKind::While(cond, body), SourcePos::default())
    }

    pub fn for_range(var: VarRef, range: Expr, body: Block) -> Self {
        Self::new(StmtKind::For(var, range, body), SourcePos::default())
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value), SourcePos::default())
    }

    pub fn print(operands: Vec<Expr>) -> Self {
        Self::new(StmtKind::Print(operands), SourcePos::default())
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = pos;
        self
    }
}

/// A braced statement sequence together with its lexical scope and the
/// functions declared directly in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub scope: u16,
    pub functions: Vec<FunctionNode>,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(scope: u16) -> Self {
        Self {
            scope,
            functions: Vec::new(),
            stmts: Vec::new(),
        }
    }
}

/// A function declaration.
///
/// `scope` is the function's own scope, which owns its frame; the
/// parameters are declared in it at slots `0..arity`. A function whose
/// source body is a native declaration carries the native symbol name in
/// `native` and an empty body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub name: String,
    pub signature: Signature,
    pub scope: u16,
    pub params: Vec<VarRef>,
    pub body: Block,
    pub native: Option<String>,
    pub pos: SourcePos,
}

/// A whole translation unit: the scope registry built by the front end and
/// the entry function (function id 0), with every other function declared
/// in some block of the tree.
#[derive(Debug)]
pub struct Program {
    pub registry: crate::scopes::ScopeRegistry,
    pub entry: FunctionNode,
}
