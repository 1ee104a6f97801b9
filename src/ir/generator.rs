// src/ir/generator.rs
//! Lowering from the typed AST to the IR.
//!
//! One function per definition. Expressions become virtual-register
//! instructions; every local lives in a stack slot whose address is
//! materialized once by `STACK_ADDR` and accessed through whole-slot
//! `LOAD`/`STORE`, the shape mem2reg later promotes. Control statements
//! become the block graph; `return` moves the value into the per-function
//! return register and jumps to the function exit block, which is the only
//! block ending in `RET`.

use crate::asm::target::{ARG_REGS, RET_REG};
use crate::ast::{
    BlockItem, Declaration, Expr, ExprKind, ExternalDecl, FunctionDef, Statement, TranslationUnit,
};
use crate::error::compile_error::CompileError;
use crate::ir::function::{Function, Ir};
use crate::ir::instruction::{Inst, InstId, InstKind};
use crate::ir::reg::Reg;
use crate::ops::{BinaryOp, CompareOp};
use crate::types::{DataSize, Type};
use log::debug;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use std::sync::Arc;

pub fn generate_ir(unit: &TranslationUnit) -> Result<Ir, CompileError> {
    let mut ir = Ir::new();
    for decl in unit {
        match decl {
            ExternalDecl::Func(def) => {
                let function = generate_function(&mut ir, def)?;
                ir.add_function(function);
            }
            // Declarations without a body produce no IR.
            ExternalDecl::FuncDecl(_) => {}
        }
    }
    Ok(ir)
}

/// A local variable: the register holding its slot address and the width of
/// the stored value.
#[derive(Clone)]
struct LocalVar {
    addr: Reg,
    size: DataSize,
}

/// Jump targets of the innermost enclosing loop.
struct LoopCtx {
    continue_target: NodeIndex,
    break_target: NodeIndex,
}

struct GenCtx<'a> {
    f: Function,
    vars: HashMap<Arc<str>, LocalVar>,
    loops: Vec<LoopCtx>,
    current: NodeIndex,
    ret_reg: Option<Reg>,
    block_count: &'a mut u32,
    inst_count: &'a mut u32,
}

fn generate_function(ir: &mut Ir, def: &FunctionDef) -> Result<Function, CompileError> {
    debug!("generator: lowering function {}", def.name);
    let mut f = Function::new(def.name.clone());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let exit = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = exit;

    let ret_reg = match &def.ret_ty {
        Type::Void => None,
        ty => Some(f.new_reg(ty.data_size()?)),
    };

    let mut ctx = GenCtx {
        f,
        vars: HashMap::new(),
        loops: Vec::new(),
        current: entry,
        ret_reg,
        block_count: &mut ir.block_count,
        inst_count: &mut ir.inst_count,
    };

    ctx.gen_params(def)?;
    for item in &def.items {
        ctx.gen_block_item(item)?;
    }
    if !ctx.is_sealed(ctx.current) {
        ctx.seal_jump(exit);
    }

    // The exit block is the single `RET` of the function.
    let ret_value = ctx.ret_reg.clone();
    ctx.current = exit;
    ctx.emit(InstKind::Ret { value: ret_value });

    Ok(ctx.f)
}

impl GenCtx<'_> {
    fn emit(&mut self, kind: InstKind) -> InstId {
        self.f.emit(self.current, self.inst_count, kind)
    }

    fn new_block(&mut self) -> NodeIndex {
        self.f.add_block(self.block_count, self.inst_count)
    }

    fn is_sealed(&self, block: NodeIndex) -> bool {
        self.f.block(block).last_inst().and_then(|id| self.f.inst(id)).is_some_and(Inst::is_terminator)
    }

    fn seal_jump(&mut self, target: NodeIndex) {
        self.emit(InstKind::Jump { target });
        self.f.connect(self.current, target);
    }

    fn seal_br(&mut self, cond: Reg, then_: NodeIndex, else_: NodeIndex) {
        self.emit(InstKind::Br { cond, then_, else_ });
        self.f.connect(self.current, then_);
        self.f.connect(self.current, else_);
    }

    fn gen_params(&mut self, def: &FunctionDef) -> Result<(), CompileError> {
        if def.params.len() > ARG_REGS.len() {
            return Err(CompileError::lowering(format!(
                "too many parameters in function {}",
                def.name
            )));
        }
        for (i, param) in def.params.iter().enumerate() {
            let size = param.ty.data_size()?;
            let fixed = self.f.new_fixed_reg(size, ARG_REGS[i]);
            let value = self.f.new_reg(size);
            self.emit(InstKind::Mov { rd: value.clone(), ra: fixed });
            self.f.params.push(value.clone());
            let var = self.declare_local(param.declarator.name.clone(), size);
            self.emit(InstKind::Store { addr: var.addr, value, size });
        }
        Ok(())
    }

    /// Reserves a stack slot for a local, materializes its address once and
    /// registers the name.
    fn declare_local(&mut self, name: Arc<str>, size: DataSize) -> LocalVar {
        let slot = self.f.stack_count;
        self.f.stack_count += 1;
        let addr = self.f.new_reg(DataSize::Qword);
        self.emit(InstKind::StackAddr { rd: addr.clone(), slot });
        let var = LocalVar { addr, size };
        self.vars.insert(name, var.clone());
        var
    }

    fn gen_block_item(&mut self, item: &BlockItem) -> Result<(), CompileError> {
        match item {
            BlockItem::Stmt(stmt) => self.gen_stmt(stmt),
            BlockItem::Decl(decl) => self.gen_decl(decl),
        }
    }

    fn gen_decl(&mut self, decl: &Declaration) -> Result<(), CompileError> {
        let size = decl.ty.data_size()?;
        let var = self.declare_local(decl.declarator.name.clone(), size);
        if let Some(init) = &decl.initializer {
            let value = self.gen_expr(init)?;
            self.emit(InstKind::Store { addr: var.addr, value, size });
        }
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(e) => {
                self.gen_expr(e)?;
                Ok(())
            }
            Statement::Return(value) => self.gen_return(value.as_ref()),
            Statement::If { cond, then_, else_ } => self.gen_if(cond, then_, else_.as_deref()),
            Statement::Compound(items) => {
                // Locals declared inside the compound go out of scope with it.
                let saved = self.vars.clone();
                for item in items {
                    self.gen_block_item(item)?;
                }
                self.vars = saved;
                Ok(())
            }
            Statement::While { cond, body } => self.gen_while(cond, body),
            Statement::Do { body, cond } => self.gen_do(body, cond),
            Statement::For { init, before, after, body } => self.gen_for(init.as_ref(), before.as_ref(), after.as_ref(), body),
            Statement::Break => {
                let target = self
                    .loops
                    .last()
                    .map(|l| l.break_target)
                    .ok_or_else(|| CompileError::lowering("break statement outside of a loop"))?;
                self.seal_jump(target);
                self.current = self.new_block();
                Ok(())
            }
            Statement::Continue => {
                let target = self
                    .loops
                    .last()
                    .map(|l| l.continue_target)
                    .ok_or_else(|| CompileError::lowering("continue statement outside of a loop"))?;
                self.seal_jump(target);
                self.current = self.new_block();
                Ok(())
            }
            Statement::Null => Ok(()),
        }
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> Result<(), CompileError> {
        match (value, self.ret_reg.clone()) {
            (Some(e), Some(ret_reg)) => {
                let v = self.gen_expr(e)?;
                self.emit(InstKind::Mov { rd: ret_reg, ra: v });
            }
            (None, None) => {}
            _ => return Err(CompileError::lowering("return value does not match function return type")),
        }
        let exit = self.f.exit;
        self.seal_jump(exit);
        self.current = self.new_block();
        Ok(())
    }

    /// Lowers `cond` in branch context: the value is tested against zero and
    /// the test drives the branch. Propagation later fuses the chain into
    /// the branch itself.
    fn gen_branch_on(&mut self, cond: &Expr, then_: NodeIndex, else_: NodeIndex) -> Result<(), CompileError> {
        let value = self.gen_expr(cond)?;
        let test = self.f.new_reg(DataSize::Byte);
        self.emit(InstKind::CmpImm { pred: CompareOp::Ne, rd: test.clone(), lhs: value, imm: 0 });
        let wide = self.f.new_reg(DataSize::Dword);
        self.emit(InstKind::Zext { rd: wide.clone(), opr: test });
        self.seal_br(wide, then_, else_);
        Ok(())
    }

    fn gen_if(&mut self, cond: &Expr, then_: &Statement, else_: Option<&Statement>) -> Result<(), CompileError> {
        let then_b = self.new_block();
        let cont = self.new_block();
        let else_b = if else_.is_some() { self.new_block() } else { cont };

        self.gen_branch_on(cond, then_b, else_b)?;

        self.current = then_b;
        self.gen_stmt(then_)?;
        if !self.is_sealed(self.current) {
            self.seal_jump(cont);
        }

        if let Some(else_stmt) = else_ {
            self.current = else_b;
            self.gen_stmt(else_stmt)?;
            if !self.is_sealed(self.current) {
                self.seal_jump(cont);
            }
        }

        self.current = cont;
        Ok(())
    }

    fn gen_while(&mut self, cond: &Expr, body: &Statement) -> Result<(), CompileError> {
        let header = self.new_block();
        let body_b = self.new_block();
        let cont = self.new_block();

        self.seal_jump(header);
        self.current = header;
        self.gen_branch_on(cond, body_b, cont)?;

        self.loops.push(LoopCtx { continue_target: header, break_target: cont });
        self.current = body_b;
        self.gen_stmt(body)?;
        if !self.is_sealed(self.current) {
            self.seal_jump(header);
        }
        self.loops.pop();

        self.current = cont;
        Ok(())
    }

    fn gen_do(&mut self, body: &Statement, cond: &Expr) -> Result<(), CompileError> {
        let body_b = self.new_block();
        let header = self.new_block();
        let cont = self.new_block();

        self.seal_jump(body_b);
        self.loops.push(LoopCtx { continue_target: header, break_target: cont });
        self.current = body_b;
        self.gen_stmt(body)?;
        if !self.is_sealed(self.current) {
            self.seal_jump(header);
        }
        self.loops.pop();

        self.current = header;
        self.gen_branch_on(cond, body_b, cont)?;

        self.current = cont;
        Ok(())
    }

    fn gen_for(
        &mut self,
        init: Option<&Expr>,
        before: Option<&Expr>,
        after: Option<&Expr>,
        body: &Statement,
    ) -> Result<(), CompileError> {
        if let Some(init) = init {
            self.gen_expr(init)?;
        }
        let header = self.new_block();
        let body_b = self.new_block();
        let after_b = self.new_block();
        let cont = self.new_block();

        self.seal_jump(header);
        self.current = header;
        match before {
            Some(before) => self.gen_branch_on(before, body_b, cont)?,
            None => self.seal_jump(body_b),
        }

        self.loops.push(LoopCtx { continue_target: after_b, break_target: cont });
        self.current = body_b;
        self.gen_stmt(body)?;
        if !self.is_sealed(self.current) {
            self.seal_jump(after_b);
        }
        self.loops.pop();

        self.current = after_b;
        if let Some(after) = after {
            self.gen_expr(after)?;
        }
        self.seal_jump(header);

        self.current = cont;
        Ok(())
    }

    fn gen_expr(&mut self, e: &Expr) -> Result<Reg, CompileError> {
        match &e.kind {
            ExprKind::Num(value) => {
                let rd = self.f.new_reg(e.ty.data_size()?);
                self.emit(InstKind::Imm { rd: rd.clone(), imm: *value });
                Ok(rd)
            }
            ExprKind::Var(name) => {
                let var = self.lookup_var(name)?;
                let rd = self.f.new_reg(var.size);
                self.emit(InstKind::Load { rd: rd.clone(), addr: var.addr, size: var.size });
                Ok(rd)
            }
            ExprKind::Assign { lhs, rhs } => {
                let ExprKind::Var(name) = &lhs.kind else {
                    return Err(CompileError::lowering("expression is not assignable"));
                };
                let value = self.gen_expr(rhs)?;
                let var = self.lookup_var(name)?;
                self.emit(InstKind::Store { addr: var.addr, value: value.clone(), size: var.size });
                Ok(value)
            }
            ExprKind::Binop { op: BinaryOp::Arith(op), lhs, rhs } => {
                let lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;
                let rd = self.f.new_reg(e.ty.data_size()?);
                self.emit(InstKind::Bin { op: *op, rd: rd.clone(), lhs, rhs });
                Ok(rd)
            }
            ExprKind::Binop { op: BinaryOp::Compare(pred), lhs, rhs } => {
                let lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;
                // Comparisons produce a byte that is widened to the
                // expression type.
                let test = self.f.new_reg(DataSize::Byte);
                self.emit(InstKind::Cmp { pred: *pred, rd: test.clone(), lhs, rhs });
                let rd = self.f.new_reg(e.ty.data_size()?);
                self.emit(InstKind::Zext { rd: rd.clone(), opr: test });
                Ok(rd)
            }
            ExprKind::Unaop { op, expr } => {
                let opr = self.gen_expr(expr)?;
                let rd = self.f.new_reg(e.ty.data_size()?);
                self.emit(InstKind::Una { op: *op, rd: rd.clone(), opr });
                Ok(rd)
            }
            ExprKind::Conditional { cond, then_, else_ } => self.gen_conditional(e, cond, then_, else_),
            ExprKind::Call { func, args } => self.gen_call(e, func, args),
            ExprKind::Cast { to, expr } => {
                let opr = self.gen_expr(expr)?;
                let from_size = expr.ty.data_size()?;
                let to_size = to.data_size()?;
                let rd = self.f.new_reg(to_size);
                let kind = if to_size < from_size {
                    InstKind::Trunc { rd: rd.clone(), opr }
                } else if to_size > from_size {
                    InstKind::Zext { rd: rd.clone(), opr }
                } else {
                    InstKind::Mov { rd: rd.clone(), ra: opr }
                };
                self.emit(kind);
                Ok(rd)
            }
        }
    }

    /// A conditional expression evaluates one arm into a compiler temporary
    /// slot; both arms store, the join loads.
    fn gen_conditional(
        &mut self,
        e: &Expr,
        cond: &Expr,
        then_: &Expr,
        else_: &Expr,
    ) -> Result<Reg, CompileError> {
        let size = e.ty.data_size()?;
        let slot = self.f.stack_count;
        self.f.stack_count += 1;
        let addr = self.f.new_reg(DataSize::Qword);
        self.emit(InstKind::StackAddr { rd: addr.clone(), slot });

        let then_b = self.new_block();
        let else_b = self.new_block();
        let cont = self.new_block();
        self.gen_branch_on(cond, then_b, else_b)?;

        self.current = then_b;
        let tv = self.gen_expr(then_)?;
        self.emit(InstKind::Store { addr: addr.clone(), value: tv, size });
        self.seal_jump(cont);

        self.current = else_b;
        let ev = self.gen_expr(else_)?;
        self.emit(InstKind::Store { addr: addr.clone(), value: ev, size });
        self.seal_jump(cont);

        self.current = cont;
        let rd = self.f.new_reg(size);
        self.emit(InstKind::Load { rd: rd.clone(), addr, size });
        Ok(rd)
    }

    /// Arguments are fully evaluated into virtual registers first, then
    /// moved into the fixed argument registers of the calling convention.
    fn gen_call(&mut self, e: &Expr, func: &Arc<str>, args: &[Expr]) -> Result<Reg, CompileError> {
        if args.len() > ARG_REGS.len() {
            return Err(CompileError::lowering(format!("too many arguments in call to {func}")));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.gen_expr(arg)?);
        }
        let mut fixed_args = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            let fixed = self.f.new_fixed_reg(value.size, ARG_REGS[i]);
            self.emit(InstKind::Mov { rd: fixed.clone(), ra: value });
            fixed_args.push(fixed);
        }

        if matches!(e.ty, Type::Void) {
            self.emit(InstKind::Call { rd: None, func: func.clone(), args: fixed_args });
            // The value of a void call is never read.
            Ok(self.f.new_reg(DataSize::Byte))
        } else {
            let size = e.ty.data_size()?;
            let ret_fixed = self.f.new_fixed_reg(size, RET_REG);
            self.emit(InstKind::Call { rd: Some(ret_fixed.clone()), func: func.clone(), args: fixed_args });
            let rd = self.f.new_reg(size);
            self.emit(InstKind::Mov { rd: rd.clone(), ra: ret_fixed });
            Ok(rd)
        }
    }

    fn lookup_var(&self, name: &Arc<str>) -> Result<LocalVar, CompileError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::lowering(format!("reference to undeclared variable {name}")))
    }
}
