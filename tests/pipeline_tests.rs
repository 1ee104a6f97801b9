use ccrs::ast::{
    BlockItem, Declaration, Declarator, Expr, ExprKind, ExternalDecl, FunctionDef, Parameter,
    Statement, TranslationUnit,
};
use ccrs::error::compile_error::CompileError;
use ccrs::ir::generator::generate_ir;
use ccrs::ir::optimizer::optimize;
use ccrs::ir::{Function, InstKind, Ir, RegKind};
use ccrs::ops::{ArithOp, BinaryOp};
use ccrs::types::{DataSize, Type};
use pretty_assertions::assert_eq;

fn int_ty() -> Type {
    Type::int(DataSize::Dword, true)
}

fn num(value: i64) -> Expr {
    Expr::num(value, int_ty())
}

fn var(name: &str) -> Expr {
    Expr::var(name, int_ty())
}

fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::binop(BinaryOp::Arith(op), lhs, rhs, int_ty())
}

fn decl(name: &str, initializer: Option<Expr>) -> BlockItem {
    BlockItem::Decl(Declaration {
        declarator: Declarator { name: name.into(), num_ptrs: 0 },
        ty: int_ty(),
        initializer,
    })
}

fn function(name: &str, params: &[&str], items: Vec<BlockItem>) -> TranslationUnit {
    vec![ExternalDecl::Func(FunctionDef {
        name: name.into(),
        ret_ty: int_ty(),
        params: params
            .iter()
            .map(|p| Parameter { declarator: Declarator { name: (*p).into(), num_ptrs: 0 }, ty: int_ty() })
            .collect(),
        items,
    })]
}

fn lower_and_optimize(unit: &TranslationUnit) -> Ir {
    let mut ir = generate_ir(unit).expect("lowering succeeds");
    optimize(&mut ir).expect("optimization succeeds");
    ir
}

fn non_label_kinds(f: &Function) -> Vec<InstKind> {
    f.sorted_inst_ids()
        .into_iter()
        .filter_map(|id| {
            let kind = f.inst(id).unwrap().kind.clone();
            (!matches!(kind, InstKind::Label { .. })).then_some(kind)
        })
        .collect()
}

#[test]
fn constant_expression_folds_to_a_single_immediate() {
    // return 1 + 2 * 3;
    let unit = function(
        "main",
        &[],
        vec![BlockItem::Stmt(Statement::Return(Some(arith(
            ArithOp::Add,
            num(1),
            arith(ArithOp::Mul, num(2), num(3)),
        ))))],
    );
    let ir = lower_and_optimize(&unit);
    let f = &ir.functions[0];

    assert_eq!(f.sorted_blocks.len(), 1);
    let kinds = non_label_kinds(f);
    assert_eq!(kinds.len(), 2);
    let InstKind::Imm { rd, imm } = &kinds[0] else { panic!("expected IMM, found {:?}", kinds[0]) };
    assert_eq!(*imm, 7);
    let InstKind::Ret { value: Some(v) } = &kinds[1] else { panic!("expected RET, found {:?}", kinds[1]) };
    assert_eq!(v.virt, rd.virt);
}

#[test]
fn local_variable_promotes_and_folds() {
    // int x = 5; return x + 1;
    let unit = function(
        "main",
        &[],
        vec![
            decl("x", Some(num(5))),
            BlockItem::Stmt(Statement::Return(Some(arith(ArithOp::Add, var("x"), num(1))))),
        ],
    );
    let ir = lower_and_optimize(&unit);
    let f = &ir.functions[0];

    // The stack slot disappeared.
    let kinds = non_label_kinds(f);
    assert!(!kinds.iter().any(|k| {
        matches!(k, InstKind::StackAddr { .. } | InstKind::Load { .. } | InstKind::Store { .. })
    }));

    assert_eq!(f.sorted_blocks.len(), 1);
    assert_eq!(kinds.len(), 2);
    assert!(matches!(&kinds[0], InstKind::Imm { imm: 6, .. }));
    assert!(matches!(&kinds[1], InstKind::Ret { value: Some(_) }));
}

#[test]
fn constant_branch_folds_and_the_diamond_collapses() {
    // int a; if (0) a = 1; else a = 2; return a;
    let unit = function(
        "main",
        &[],
        vec![
            decl("a", None),
            BlockItem::Stmt(Statement::If {
                cond: num(0),
                then_: Box::new(Statement::Expression(Expr::assign(var("a"), num(1)))),
                else_: Some(Box::new(Statement::Expression(Expr::assign(var("a"), num(2))))),
            }),
            BlockItem::Stmt(Statement::Return(Some(var("a")))),
        ],
    );
    let ir = lower_and_optimize(&unit);
    let f = &ir.functions[0];

    assert_eq!(f.sorted_blocks.len(), 1);
    let kinds = non_label_kinds(f);
    assert!(!kinds.iter().any(|k| {
        matches!(k, InstKind::Br { .. } | InstKind::BrCmp { .. } | InstKind::BrCmpImm { .. } | InstKind::Jump { .. })
    }));
    assert!(matches!(&kinds[0], InstKind::Imm { imm: 2, .. }));
    assert!(matches!(kinds.last(), Some(InstKind::Ret { value: Some(_) })));
}

#[test]
fn infinite_loop_with_break_survives_optimization() {
    // while (1) { if (x) break; } return 0;
    let unit = function(
        "f",
        &["x"],
        vec![
            BlockItem::Stmt(Statement::While {
                cond: num(1),
                body: Box::new(Statement::If {
                    cond: var("x"),
                    then_: Box::new(Statement::Break),
                    else_: None,
                }),
            }),
            BlockItem::Stmt(Statement::Return(Some(num(0)))),
        ],
    );
    let ir = lower_and_optimize(&unit);
    let f = &ir.functions[0];
    let param_virt = f.params[0].virt;

    // The loop is still there: some edge goes backward in sorted order.
    let mut has_back_edge = false;
    for &node in &f.sorted_blocks {
        for succ in f.succs(node) {
            if f.graph[succ].sorted_index <= f.graph[node].sorted_index {
                has_back_edge = true;
            }
        }
    }
    assert!(has_back_edge, "the loop was optimized away");

    // The inner branch tests the original operand.
    let mut branch_block = None;
    for &node in &f.sorted_blocks {
        let term = f.inst(*f.graph[node].insts.last().unwrap()).unwrap();
        match &term.kind {
            InstKind::Br { cond, .. } => {
                assert_eq!(cond.virt, param_virt);
                branch_block = Some(node);
            }
            InstKind::BrCmp { lhs, .. } | InstKind::BrCmpImm { lhs, .. } => {
                assert_eq!(lhs.virt, param_virt);
                branch_block = Some(node);
            }
            _ => {}
        }
    }
    let branch_block = branch_block.expect("the conditional branch survives");

    // The compare chain feeding the branch was fused and cleaned up.
    let kinds = non_label_kinds(f);
    assert!(!kinds.iter().any(|k| {
        matches!(k, InstKind::Cmp { .. } | InstKind::CmpImm { .. } | InstKind::Zext { .. })
    }));

    // x is live into the block holding the branch.
    assert!(f.graph[branch_block].live_in.as_ref().unwrap().get(param_virt as usize));
}

#[test]
fn identity_arithmetic_disappears_entirely() {
    // return x + 0;
    let unit = function(
        "f",
        &["x"],
        vec![BlockItem::Stmt(Statement::Return(Some(arith(ArithOp::Add, var("x"), num(0)))))],
    );
    let ir = lower_and_optimize(&unit);
    let f = &ir.functions[0];

    assert_eq!(f.sorted_blocks.len(), 1);
    let kinds = non_label_kinds(f);
    assert!(!kinds.iter().any(|k| matches!(k, InstKind::Bin { .. } | InstKind::BinImm { .. })));
    // All that remains: receive the parameter, return it.
    assert_eq!(kinds.len(), 2);
    assert!(matches!(&kinds[0], InstKind::Mov { ra, .. } if ra.kind == RegKind::Fixed));
    let InstKind::Ret { value: Some(v) } = &kinds[1] else { panic!("expected RET, found {:?}", kinds[1]) };
    assert_eq!(v.virt, f.params[0].virt);
}

#[test]
fn lowering_is_deterministic() {
    let unit = function(
        "main",
        &[],
        vec![
            decl("x", Some(num(5))),
            BlockItem::Stmt(Statement::Return(Some(arith(ArithOp::Add, var("x"), num(1))))),
        ],
    );
    let a = lower_and_optimize(&unit);
    let b = lower_and_optimize(&unit);
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn full_compilation_produces_machine_shaped_ir() {
    // int add(int a, int b) { return a + b; }
    // int main() { return add(40, 2); }
    let mut unit = function(
        "add",
        &["a", "b"],
        vec![BlockItem::Stmt(Statement::Return(Some(arith(ArithOp::Add, var("a"), var("b")))))],
    );
    unit.extend(function(
        "main",
        &[],
        vec![BlockItem::Stmt(Statement::Return(Some(Expr::new(
            ExprKind::Call { func: "add".into(), args: vec![num(40), num(2)] },
            int_ty(),
        ))))],
    ));

    let ir = ccrs::compile(&unit).expect("compilation succeeds");
    assert_eq!(ir.functions.len(), 2);

    for f in &ir.functions {
        for id in f.sorted_inst_ids() {
            let inst = f.inst(id).unwrap();
            // Emitter contract: every register is physical, pinned, or
            // spilled with a stack slot.
            let check = |reg: &ccrs::ir::Reg| match reg.kind {
                RegKind::Physical | RegKind::Fixed => assert!(reg.real.is_some()),
                RegKind::Virtual => assert!(reg.is_spilled()),
            };
            if let Some(rd) = inst.dest() {
                check(rd);
            }
            for ra in inst.args() {
                check(ra);
            }
            // Emitter contract: two-address form.
            match &inst.kind {
                InstKind::Bin { rd, lhs, .. } => assert_eq!(rd.virt, lhs.virt),
                InstKind::Una { rd, opr, .. } => assert_eq!(rd.virt, opr.virt),
                _ => {}
            }
        }
    }

    // main still carries the call, with its arguments in the fixed
    // argument registers.
    let main = ir.functions.iter().find(|f| f.name.as_ref() == "main").unwrap();
    let call = main
        .sorted_inst_ids()
        .into_iter()
        .find_map(|id| match &main.inst(id).unwrap().kind {
            InstKind::Call { func, args, .. } => Some((func.clone(), args.clone())),
            _ => None,
        })
        .expect("the call survives");
    assert_eq!(call.0.as_ref(), "add");
    assert_eq!(call.1.len(), 2);
    assert!(call.1.iter().all(|arg| arg.kind == RegKind::Fixed));
}

#[test]
fn break_outside_a_loop_is_a_lowering_error() {
    let unit = function("main", &[], vec![BlockItem::Stmt(Statement::Break)]);
    let result = generate_ir(&unit);
    assert!(matches!(result, Err(CompileError::LoweringError { .. })));
}

#[test]
fn undeclared_variables_are_a_lowering_error() {
    let unit = function("main", &[], vec![BlockItem::Stmt(Statement::Return(Some(var("ghost"))))]);
    let result = generate_ir(&unit);
    assert!(matches!(result, Err(CompileError::LoweringError { .. })));
}

#[test]
fn incomplete_types_cannot_be_lowered() {
    let incomplete = Type::Struct { tag: None, fields: Vec::new(), field_map: Default::default() };
    let unit = vec![ExternalDecl::Func(FunctionDef {
        name: "main".into(),
        ret_ty: int_ty(),
        params: Vec::new(),
        items: vec![BlockItem::Decl(Declaration {
            declarator: Declarator { name: "s".into(), num_ptrs: 0 },
            ty: incomplete,
            initializer: None,
        })],
    })];
    let result = generate_ir(&unit);
    assert!(matches!(result, Err(CompileError::IncompleteType)));
}
