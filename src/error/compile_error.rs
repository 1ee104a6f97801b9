// src/error/compile_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A pass observed an IR shape that the pipeline contract forbids.
    /// A malformed IR is a bug, not a user-facing condition.
    #[error("invariant violation in {pass}: {message}")]
    InvariantViolation { pass: &'static str, message: String, inst: Option<u32>, block: Option<u32> },

    #[error("unable to obtain the size of incomplete type")]
    IncompleteType,

    #[error("invalid data size {0}")]
    InvalidDataSize(u32),

    #[error("lowering error: {message}")]
    LoweringError { message: String },
}

impl CompileError {
    pub fn invariant(pass: &'static str, message: impl Into<String>) -> Self {
        CompileError::InvariantViolation { pass, message: message.into(), inst: None, block: None }
    }

    pub fn invariant_at_inst(pass: &'static str, message: impl Into<String>, inst: u32) -> Self {
        CompileError::InvariantViolation { pass, message: message.into(), inst: Some(inst), block: None }
    }

    pub fn invariant_at_block(pass: &'static str, message: impl Into<String>, block: u32) -> Self {
        CompileError::InvariantViolation { pass, message: message.into(), inst: None, block: Some(block) }
    }

    pub fn lowering(message: impl Into<String>) -> Self {
        CompileError::LoweringError { message: message.into() }
    }

    /// Name of the pass that produced this error, if it carries one.
    pub fn pass(&self) -> Option<&'static str> {
        match self {
            CompileError::InvariantViolation { pass, .. } => Some(pass),
            _ => None,
        }
    }
}
