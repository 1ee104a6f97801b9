// src/const_fold.rs
//! AST-level constant folding.
//!
//! Folds binary and unary expressions whose operands are literal, and
//! conditional expressions whose condition is literal, before lowering.
//! Later constant propagation over the IR catches what this pass cannot see
//! through memory; running both keeps the lowered IR small.

use crate::ast::{BlockItem, Expr, ExprKind, ExternalDecl, Statement, TranslationUnit};

pub fn const_fold_tree(unit: &mut TranslationUnit) {
    for decl in unit {
        if let ExternalDecl::Func(func) = decl {
            for item in &mut func.items {
                fold_block_item(item);
            }
        }
    }
}

fn get_constant(e: &Expr) -> Option<i64> {
    match e.kind {
        ExprKind::Num(value) => Some(value),
        _ => None,
    }
}

fn fold_expr(e: &mut Expr) {
    let folded = match &mut e.kind {
        ExprKind::Binop { op, lhs, rhs } => {
            let op = *op;
            fold_expr(lhs);
            fold_expr(rhs);
            match (get_constant(lhs), get_constant(rhs)) {
                (Some(lhs_c), Some(rhs_c)) => Some(ExprKind::Num(op.eval(lhs_c, rhs_c))),
                _ => None,
            }
        }
        ExprKind::Unaop { op, expr } => {
            let op = *op;
            fold_expr(expr);
            get_constant(expr).map(|constant| ExprKind::Num(op.eval(constant)))
        }
        ExprKind::Assign { lhs, rhs } => {
            fold_expr(lhs);
            fold_expr(rhs);
            None
        }
        ExprKind::Conditional { cond, then_, else_ } => {
            fold_expr(cond);
            fold_expr(then_);
            fold_expr(else_);
            get_constant(cond).map(|cond_c| {
                let selected = if cond_c != 0 { then_ } else { else_ };
                (**selected).kind.clone()
            })
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                fold_expr(arg);
            }
            None
        }
        ExprKind::Cast { expr, .. } => {
            fold_expr(expr);
            None
        }
        ExprKind::Var(_) | ExprKind::Num(_) => None,
    };
    if let Some(kind) = folded {
        e.kind = kind;
    }
}

fn fold_block_item(item: &mut BlockItem) {
    match item {
        BlockItem::Stmt(stmt) => fold_stmt(stmt),
        BlockItem::Decl(decl) => {
            if let Some(init) = &mut decl.initializer {
                fold_expr(init);
            }
        }
    }
}

fn fold_stmt(stmt: &mut Statement) {
    match stmt {
        Statement::Expression(e) => fold_expr(e),
        Statement::Return(Some(e)) => fold_expr(e),
        Statement::Return(None) | Statement::Break | Statement::Continue | Statement::Null => {}
        Statement::If { cond, then_, else_ } => {
            fold_expr(cond);
            fold_stmt(then_);
            if let Some(else_) = else_ {
                fold_stmt(else_);
            }
        }
        Statement::Compound(items) => {
            for item in items {
                fold_block_item(item);
            }
        }
        Statement::While { cond, body } | Statement::Do { body, cond } => {
            fold_expr(cond);
            fold_stmt(body);
        }
        Statement::For { init, before, after, body } => {
            for e in [init, before, after].into_iter().flatten() {
                fold_expr(e);
            }
            fold_stmt(body);
        }
    }
}
