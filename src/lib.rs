// src/lib.rs
/// # ccrs Compiler Middle-End
///
/// The middle-end of a C-subset compiler: everything between the typed AST
/// produced by the front-end and the register-allocated, architecture-shaped
/// IR consumed by the assembly emitter.
///
/// ## Important modules:
/// * `ast` - Typed AST interface consumed from the front-end
/// * `types` - The C type model and data-size contracts
/// * `ops` - Operator taxonomy with constant evaluators
/// * `const_fold` - AST-level constant folding
/// * `ir` - IR data model, CFG, lowering, analyses and optimization passes
/// * `asm` - Target shaping (two-address form) and register allocation
/// * `error` - Error types and diagnostics reporting
pub mod asm;
pub mod ast;
pub mod const_fold;
pub mod error;
pub mod ir;
pub mod ops;
pub mod types;

use crate::error::compile_error::CompileError;
use crate::ir::Ir;

/// Runs the whole middle-end: lowering, optimization and target shaping.
///
/// The returned IR is register-allocated and in two-address form, ready for
/// the external assembly emitter.
pub fn compile(ast: &ast::TranslationUnit) -> Result<Ir, CompileError> {
    let mut ast = ast.clone();
    const_fold::const_fold_tree(&mut ast);
    let mut ir = ir::generator::generate_ir(&ast)?;
    ir::optimizer::optimize(&mut ir)?;
    asm::lower_to_machine(&mut ir)?;
    Ok(ir)
}
