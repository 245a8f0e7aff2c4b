//! End-to-end tests: build a typed AST, emit it, execute it, check stdout.
//!
//! Each scenario mirrors a small source program, with the AST spelled out
//! the way a front end would deliver it.

use mathvm_common::{Signature, Slot, VarType};
use mathvm_emitter::ast::{
    BinOp, Block, Expr, FunctionNode, Program, SourcePos, Stmt, UnOp,
};
use mathvm_emitter::emit;
use mathvm_emitter::scopes::{ScopeRegistry, VarRef};
use mathvm_vm::run;
use proptest::prelude::*;

// ============================================================
// AST building helpers
// ============================================================

/// Open a function scope, declare its parameters, and shape an empty body.
fn new_fn(
    registry: &mut ScopeRegistry,
    name: &str,
    return_type: VarType,
    params: &[(&str, VarType)],
    parent: Option<u16>,
) -> FunctionNode {
    let scope = registry.function_scope(parent).unwrap();
    let param_refs: Vec<VarRef> = params
        .iter()
        .map(|(n, t)| registry.declare(scope, n, *t).unwrap())
        .collect();
    let body_scope = registry.block_scope(scope).unwrap();
    FunctionNode {
        name: name.to_string(),
        signature: Signature::new(return_type, params.iter().map(|(_, t)| *t).collect()),
        scope,
        params: param_refs,
        body: Block::new(body_scope),
        native: None,
        pos: SourcePos::default(),
    }
}

/// Emit and execute, returning the entry's result and captured stdout.
fn run_program(program: &Program) -> (Option<Slot>, String) {
    let module = emit(program).unwrap();
    let mut out = Vec::new();
    let slot = run(&module, &mut out).unwrap();
    (slot, String::from_utf8(out).unwrap())
}

// ============================================================
// The pinned end-to-end scenarios
// ============================================================

/// function int main() { return 2 + 3 * 4; }
#[test]
fn precedence_and_int_arithmetic() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Int, &[], None);
    main.body.stmts.push(Stmt::ret(Some(Expr::binary(
        BinOp::Add,
        Expr::int(2),
        Expr::binary(BinOp::Mul, Expr::int(3), Expr::int(4)),
    ))));
    let program = Program {
        registry,
        entry: main,
    };
    let (slot, out) = run_program(&program);
    assert_eq!(slot.unwrap().as_int(), 14);
    assert_eq!(out, "");
}

/// function void main() { print(1.5 + 2); }
#[test]
fn int_to_double_promotion() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    main.body.stmts.push(Stmt::print(vec![Expr::binary(
        BinOp::Add,
        Expr::double(1.5),
        Expr::int(2),
    )]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "3.5");
}

/// function void main() { for (i in 1..3) print(i, ' '); }
#[test]
fn for_loop_over_a_range() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    let i = registry.declare(main.body.scope, "i", VarType::Int).unwrap();
    let body_scope = registry.block_scope(main.body.scope).unwrap();
    let mut body = Block::new(body_scope);
    body.stmts
        .push(Stmt::print(vec![Expr::load(i), Expr::str(" ")]));
    main.body.stmts.push(Stmt::for_range(
        i,
        Expr::binary(BinOp::Range, Expr::int(1), Expr::int(3)),
        body,
    ));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "1 2 3 ");
}

/// function int fib(int n) { if (n < 2) return n; return fib(n-1) + fib(n-2); }
/// function void main() { print(fib(10)); }
#[test]
fn recursion_through_the_context_stack() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);

    let mut fib = new_fn(
        &mut registry,
        "fib",
        VarType::Int,
        &[("n", VarType::Int)],
        Some(main.body.scope),
    );
    let n = fib.params[0];
    let then_scope = registry.block_scope(fib.body.scope).unwrap();
    let mut then_block = Block::new(then_scope);
    then_block.stmts.push(Stmt::ret(Some(Expr::load(n))));
    fib.body.stmts.push(Stmt::if_else(
        Expr::binary(BinOp::Lt, Expr::load(n), Expr::int(2)),
        then_block,
        None,
    ));
    fib.body.stmts.push(Stmt::ret(Some(Expr::binary(
        BinOp::Add,
        Expr::call(
            "fib",
            vec![Expr::binary(BinOp::Sub, Expr::load(n), Expr::int(1))],
        ),
        Expr::call(
            "fib",
            vec![Expr::binary(BinOp::Sub, Expr::load(n), Expr::int(2))],
        ),
    ))));

    main.body.functions.push(fib);
    main.body
        .stmts
        .push(Stmt::print(vec![Expr::call("fib", vec![Expr::int(10)])]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "55");
}

/// function void main() { int x; x = 0; while (x < 5) { x += 1; } print(x); }
#[test]
fn while_loop_with_compound_assignment() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    let x = registry.declare(main.body.scope, "x", VarType::Int).unwrap();
    main.body.stmts.push(Stmt::assign(x, Expr::int(0)));
    let body_scope = registry.block_scope(main.body.scope).unwrap();
    let mut body = Block::new(body_scope);
    body.stmts.push(Stmt::add_assign(x, Expr::int(1)));
    main.body.stmts.push(Stmt::while_loop(
        Expr::binary(BinOp::Lt, Expr::load(x), Expr::int(5)),
        body,
    ));
    main.body.stmts.push(Stmt::print(vec![Expr::load(x)]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "5");
}

/// function void main() { print('2' + 3); }
#[test]
fn string_to_int_coercion_in_mixed_arithmetic() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    main.body.stmts.push(Stmt::print(vec![Expr::binary(
        BinOp::Add,
        Expr::str("2"),
        Expr::int(3),
    )]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "5");
}

// ============================================================
// Conventions worth pinning
// ============================================================

/// Arguments are evaluated rightmost-first; a reordering emitter would
/// print "12" here instead.
#[test]
fn arguments_evaluate_rightmost_first() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);

    // int trace(int x) { print(x); return x; }
    let mut trace = new_fn(
        &mut registry,
        "trace",
        VarType::Int,
        &[("x", VarType::Int)],
        Some(main.body.scope),
    );
    let x = trace.params[0];
    trace.body.stmts.push(Stmt::print(vec![Expr::load(x)]));
    trace.body.stmts.push(Stmt::ret(Some(Expr::load(x))));

    // int pair(int a, int b) { return a * 10 + b; }
    let mut pair = new_fn(
        &mut registry,
        "pair",
        VarType::Int,
        &[("a", VarType::Int), ("b", VarType::Int)],
        Some(main.body.scope),
    );
    let a = pair.params[0];
    let b = pair.params[1];
    pair.body.stmts.push(Stmt::ret(Some(Expr::binary(
        BinOp::Add,
        Expr::binary(BinOp::Mul, Expr::load(a), Expr::int(10)),
        Expr::load(b),
    ))));

    main.body.functions.push(trace);
    main.body.functions.push(pair);
    main.body.stmts.push(Stmt::print(vec![Expr::call(
        "pair",
        vec![
            Expr::call("trace", vec![Expr::int(1)]),
            Expr::call("trace", vec![Expr::int(2)]),
        ],
    )]));

    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "2112");
}

/// A nested function reads and writes its ancestor's variable while the
/// ancestor's invocation is live.
#[test]
fn inner_function_accesses_outer_variables() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    let total = registry
        .declare(main.body.scope, "total", VarType::Int)
        .unwrap();

    // void add(int k) { total += k; }
    let mut add = new_fn(
        &mut registry,
        "add",
        VarType::Void,
        &[("k", VarType::Int)],
        Some(main.body.scope),
    );
    let k = add.params[0];
    add.body.stmts.push(Stmt::add_assign(total, Expr::load(k)));

    main.body.functions.push(add);
    main.body.stmts.push(Stmt::assign(total, Expr::int(1)));
    main.body
        .stmts
        .push(Stmt::expr(Expr::call("add", vec![Expr::int(2)])));
    main.body
        .stmts
        .push(Stmt::expr(Expr::call("add", vec![Expr::int(39)])));
    main.body.stmts.push(Stmt::print(vec![Expr::load(total)]));

    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "42");
}

#[test]
fn short_circuit_logic_and_not() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    main.body.stmts.push(Stmt::print(vec![
        Expr::binary(BinOp::And, Expr::int(1), Expr::int(0)),
        Expr::binary(BinOp::Or, Expr::int(1), Expr::int(0)),
        Expr::unary(UnOp::Not, Expr::int(0)),
    ]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "011");
}

/// `||` must not evaluate its right operand when the left decides; a
/// division by zero on the right would otherwise fault.
#[test]
fn or_short_circuits_before_the_right_operand_faults() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    main.body.stmts.push(Stmt::print(vec![Expr::binary(
        BinOp::Or,
        Expr::int(1),
        Expr::binary(BinOp::Div, Expr::int(1), Expr::int(0)),
    )]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "1");
}

#[test]
fn if_else_takes_the_right_branch() {
    for (value, expected) in [(7i64, "big"), (2, "small")] {
        let mut registry = ScopeRegistry::new();
        let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
        let then_scope = registry.block_scope(main.body.scope).unwrap();
        let mut then_block = Block::new(then_scope);
        then_block.stmts.push(Stmt::print(vec![Expr::str("big")]));
        let else_scope = registry.block_scope(main.body.scope).unwrap();
        let mut else_block = Block::new(else_scope);
        else_block.stmts.push(Stmt::print(vec![Expr::str("small")]));
        main.body.stmts.push(Stmt::if_else(
            Expr::binary(BinOp::Gt, Expr::int(value), Expr::int(4)),
            then_block,
            Some(else_block),
        ));
        let program = Program {
            registry,
            entry: main,
        };
        let (_, out) = run_program(&program);
        assert_eq!(out, expected, "value {value}");
    }
}

#[test]
fn double_comparison_drives_branches() {
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    main.body.stmts.push(Stmt::print(vec![
        Expr::binary(BinOp::Lt, Expr::double(1.5), Expr::int(2)),
        Expr::binary(BinOp::Ge, Expr::double(1.5), Expr::double(2.5)),
        Expr::binary(BinOp::Eq, Expr::str("7"), Expr::int(7)),
    ]));
    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "101");
}

/// A native declaration routes through CALLNATIVE with the host-bound
/// function; the wrapper preserves the ordinary call contract.
#[test]
fn native_function_call() {
    fn host_sqrt(args: &[Slot]) -> Slot {
        Slot::from_double(args[0].as_double().sqrt())
    }

    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    let mut sqrt = new_fn(
        &mut registry,
        "sqrt",
        VarType::Double,
        &[("x", VarType::Double)],
        Some(main.body.scope),
    );
    sqrt.native = Some("sqrt".to_string());
    main.body.functions.push(sqrt);
    main.body.stmts.push(Stmt::print(vec![Expr::call(
        "sqrt",
        vec![Expr::double(9.0)],
    )]));

    let program = Program {
        registry,
        entry: main,
    };
    let module = emit(&program).unwrap();

    // Unresolved natives are rejected at load time...
    assert!(run(&module, Vec::new()).is_err());

    // ...and run once the host binds them.
    let mut module = module;
    assert!(module.bind_native("sqrt", host_sqrt));
    let mut out = Vec::new();
    run(&module, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "3");
}

#[test]
fn nested_loops_reuse_the_retained_bound() {
    // for (i in 1..3) for (j in 1..2) print(i, j, ' ')
    let mut registry = ScopeRegistry::new();
    let mut main = new_fn(&mut registry, "main", VarType::Void, &[], None);
    let i = registry.declare(main.body.scope, "i", VarType::Int).unwrap();
    let j = registry.declare(main.body.scope, "j", VarType::Int).unwrap();

    let inner_scope = registry.block_scope(main.body.scope).unwrap();
    let mut inner = Block::new(inner_scope);
    inner.stmts.push(Stmt::print(vec![
        Expr::load(i),
        Expr::load(j),
        Expr::str(" "),
    ]));

    let outer_scope = registry.block_scope(main.body.scope).unwrap();
    let mut outer = Block::new(outer_scope);
    outer.stmts.push(Stmt::for_range(
        j,
        Expr::binary(BinOp::Range, Expr::int(1), Expr::int(2)),
        inner,
    ));

    main.body.stmts.push(Stmt::for_range(
        i,
        Expr::binary(BinOp::Range, Expr::int(1), Expr::int(3)),
        outer,
    ));

    let program = Program {
        registry,
        entry: main,
    };
    let (_, out) = run_program(&program);
    assert_eq!(out, "11 12 21 22 31 32 ");
}

// ============================================================
// Emitted programs agree with a reference evaluator
// ============================================================

#[derive(Debug, Clone)]
enum RefExpr {
    Lit(i64),
    Add(Box<RefExpr>, Box<RefExpr>),
    Sub(Box<RefExpr>, Box<RefExpr>),
    Mul(Box<RefExpr>, Box<RefExpr>),
}

fn ref_eval(e: &RefExpr) -> i64 {
    match e {
        RefExpr::Lit(v) => *v,
        RefExpr::Add(a, b) => ref_eval(a).wrapping_add(ref_eval(b)),
        RefExpr::Sub(a, b) => ref_eval(a).wrapping_sub(ref_eval(b)),
        RefExpr::Mul(a, b) => ref_eval(a).wrapping_mul(ref_eval(b)),
    }
}

fn ref_to_ast(e: &RefExpr) -> Expr {
    match e {
        RefExpr::Lit(v) => Expr::int(*v),
        RefExpr::Add(a, b) => Expr::binary(BinOp::Add, ref_to_ast(a), ref_to_ast(b)),
        RefExpr::Sub(a, b) => Expr::binary(BinOp::Sub, ref_to_ast(a), ref_to_ast(b)),
        RefExpr::Mul(a, b) => Expr::binary(BinOp::Mul, ref_to_ast(a), ref_to_ast(b)),
    }
}

fn arb_ref_expr() -> impl Strategy<Value = RefExpr> {
    let leaf = any::<i64>().prop_map(RefExpr::Lit);
    leaf.prop_recursive(6, 48, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| RefExpr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| RefExpr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| RefExpr::Mul(Box::new(a), Box::new(b))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For any integer expression tree, the emitted program computes the
    /// same wrapping result as direct evaluation.
    #[test]
    fn emitted_arithmetic_matches_reference(expr in arb_ref_expr()) {
        let mut registry = ScopeRegistry::new();
        let mut main = new_fn(&mut registry, "main", VarType::Int, &[], None);
        main.body.stmts.push(Stmt::ret(Some(ref_to_ast(&expr))));
        let program = Program { registry, entry: main };
        let module = emit(&program).unwrap();
        let slot = run(&module, Vec::new()).unwrap();
        prop_assert_eq!(slot.unwrap().as_int(), ref_eval(&expr));
    }
}
