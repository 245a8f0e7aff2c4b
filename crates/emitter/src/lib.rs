//! MathVM bytecode emitter.
//!
//! Walks a type-annotated AST and produces a [`mathvm_common::Module`]:
//! a linear instruction stream per function plus the string constant pool
//! and the function and native tables.
//!
//! - [`ast`] — the typed AST the front end delivers
//! - [`scopes`] — stable scope ids and frame slots ([`ScopeRegistry`])
//! - [`type_stack`] — the compile-time mirror of the runtime stack
//! - [`emit`](fn@emit) — the translation itself
//!
//! # Usage
//!
//! ```
//! use mathvm_common::{Signature, VarType};
//! use mathvm_emitter::ast::{Block, Expr, FunctionNode, Program, SourcePos, Stmt};
//! use mathvm_emitter::emit;
//! use mathvm_emitter::scopes::ScopeRegistry;
//!
//! // function int main() { return 41 + 1; }
//! let mut registry = ScopeRegistry::new();
//! let scope = registry.function_scope(None).unwrap();
//! let body_scope = registry.block_scope(scope).unwrap();
//! let mut body = Block::new(body_scope);
//! body.stmts.push(Stmt::ret(Some(Expr::binary(
//!     mathvm_emitter::ast::BinOp::Add,
//!     Expr::int(41),
//!     Expr::int(1),
//! ))));
//!
//! let program = Program {
//!     registry,
//!     entry: FunctionNode {
//!         name: "main".to_string(),
//!         signature: Signature::new(VarType::Int, vec![]),
//!         scope,
//!         params: vec![],
//!         body,
//!         native: None,
//!         pos: SourcePos::default(),
//!     },
//! };
//!
//! let module = emit(&program).unwrap();
//! assert_eq!(module.function_count(), 1);
//! ```

pub mod ast;
pub mod emit;
pub mod error;
pub mod scopes;
pub mod type_stack;

pub use emit::emit;
pub use error::CompileError;
pub use scopes::{ScopeRegistry, VarRef};
pub use type_stack::TypeStack;
