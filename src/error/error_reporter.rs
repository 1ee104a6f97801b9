// src/error/error_reporter.rs
use crate::error::compile_error::CompileError;
use console::style;

/// Diagnostics reporter for middle-end failures.
///
/// Compilation is all-or-nothing: the driver reports the error that aborted
/// the pipeline and exits. Diagnostics carry the pass name and, when known,
/// the instruction or block id.
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report_error(error: &CompileError) {
        match error {
            CompileError::InvariantViolation { pass, message, inst, block } => {
                eprintln!(
                    "{} {}: {}",
                    style("ERROR").red().bold(),
                    style(pass).red(),
                    style(message).yellow()
                );
                if let Some(id) = inst {
                    eprintln!("{} instruction {}", style("at:").blue(), style(id).cyan());
                }
                if let Some(id) = block {
                    eprintln!("{} block {}", style("at:").blue(), style(id).cyan());
                }
            }
            other => {
                eprintln!("{} {}", style("ERROR:").red().bold(), style(other).yellow());
            }
        }
    }
}
