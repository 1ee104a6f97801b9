//! # Error Module
//!
//! Structured error types and reporting for the middle-end.
//!
//! ## Components
//!
//! * [`compile_error`]: Main error type enum for all middle-end failures
//! * [`error_reporter`]: Formatted error output on the standard error stream
//!
//! Every pass either completes or aborts with one of these errors; no pass
//! consumes a half-transformed IR from a failed predecessor.
pub mod compile_error;
pub mod error_reporter;
