// src/ops.rs
use std::fmt;

/// Arithmetic and bitwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Or,
    Xor,
    And,
    ShiftRight,
    ShiftLeft,
}

/// Comparison operators. Every comparison evaluates to 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Identity (`+e`).
    Positive,
    /// Integer negation (`-e`).
    IntegerNeg,
    /// Bitwise negation (`~e`).
    BitwiseNeg,
}

/// Either kind of binary operator, as it appears in the AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Arith(ArithOp),
    Compare(CompareOp),
}

impl ArithOp {
    /// Pure constant evaluator used by tree folding and propagation.
    ///
    /// Wrapping semantics; division or remainder by zero yields 0 so that
    /// folding a statically undefined expression cannot abort the compiler.
    pub fn eval(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            ArithOp::Add => lhs.wrapping_add(rhs),
            ArithOp::Sub => lhs.wrapping_sub(rhs),
            ArithOp::Mul => lhs.wrapping_mul(rhs),
            ArithOp::Div => lhs.checked_div(rhs).unwrap_or(0),
            ArithOp::Rem => lhs.checked_rem(rhs).unwrap_or(0),
            ArithOp::Or => lhs | rhs,
            ArithOp::Xor => lhs ^ rhs,
            ArithOp::And => lhs & rhs,
            ArithOp::ShiftRight => lhs.wrapping_shr(rhs as u32),
            ArithOp::ShiftLeft => lhs.wrapping_shl(rhs as u32),
        }
    }
}

impl CompareOp {
    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }
}

impl UnaryOp {
    pub fn eval(self, opr: i64) -> i64 {
        match self {
            UnaryOp::Positive => opr,
            UnaryOp::IntegerNeg => opr.wrapping_neg(),
            UnaryOp::BitwiseNeg => !opr,
        }
    }
}

impl BinaryOp {
    pub fn eval(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Arith(op) => op.eval(lhs, rhs),
            BinaryOp::Compare(op) => op.eval(lhs, rhs) as i64,
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => f.write_str("+"),
            ArithOp::Sub => f.write_str("-"),
            ArithOp::Mul => f.write_str("*"),
            ArithOp::Div => f.write_str("/"),
            ArithOp::Rem => f.write_str("%"),
            ArithOp::Or => f.write_str("|"),
            ArithOp::Xor => f.write_str("^"),
            ArithOp::And => f.write_str("&"),
            ArithOp::ShiftRight => f.write_str(">>"),
            ArithOp::ShiftLeft => f.write_str("<<"),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => f.write_str("=="),
            CompareOp::Ne => f.write_str("!="),
            CompareOp::Gt => f.write_str(">"),
            CompareOp::Ge => f.write_str(">="),
            CompareOp::Lt => f.write_str("<"),
            CompareOp::Le => f.write_str("<="),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Positive => f.write_str("+"),
            UnaryOp::IntegerNeg => f.write_str("-"),
            UnaryOp::BitwiseNeg => f.write_str("~"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Arith(op) => op.fmt(f),
            BinaryOp::Compare(op) => op.fmt(f),
        }
    }
}
