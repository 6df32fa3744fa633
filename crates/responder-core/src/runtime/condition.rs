// crates/responder-core/src/runtime/condition.rs
// ============================================================================
// Module: Responder Condition Evaluation
// Description: Restricted boolean grammar for step guards.
// Purpose: Convert resolved condition strings into go/no-go decisions.
// Dependencies: bigdecimal
// ============================================================================

//! ## Overview
//! Step conditions are evaluated after template substitution. The grammar is
//! deliberately restricted: literal `true`/`false`, one comparison between
//! two number-or-string operands, and non-empty-string truthiness for
//! everything else. Numeric ordering is decimal-aware so `0.30 > 0.3` is
//! false and no float drift leaks into guard decisions. Nothing here
//! evaluates arbitrary expressions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;

// ============================================================================
// SECTION: Comparison Operators
// ============================================================================

/// Comparison operators accepted by the guard grammar.
///
/// # Invariants
/// - Two-character operators are matched before their one-character prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardOperator {
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
}

impl GuardOperator {
    /// Operators in scan order (two-character tokens first).
    const SCAN_ORDER: [(Self, &'static str); 6] = [
        (Self::GreaterOrEqual, ">="),
        (Self::LessOrEqual, "<="),
        (Self::Equal, "=="),
        (Self::NotEqual, "!="),
        (Self::Greater, ">"),
        (Self::Less, "<"),
    ];

    /// Applies the operator to an ordering.
    const fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::GreaterOrEqual => matches!(ordering, Ordering::Greater | Ordering::Equal),
            Self::LessOrEqual => matches!(ordering, Ordering::Less | Ordering::Equal),
            Self::Equal => matches!(ordering, Ordering::Equal),
            Self::NotEqual => !matches!(ordering, Ordering::Equal),
            Self::Greater => matches!(ordering, Ordering::Greater),
            Self::Less => matches!(ordering, Ordering::Less),
        }
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a resolved condition string.
///
/// Literal `true`/`false` decide directly; a single comparison is evaluated
/// decimal-aware when both operands parse as numbers and lexicographically
/// otherwise; any other non-empty string is truthy; empty is falsy.
#[must_use]
pub fn evaluate_condition(resolved: &str) -> bool {
    let trimmed = resolved.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return true;
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return false;
    }
    if let Some((operator, lhs, rhs)) = split_comparison(trimmed) {
        return operator.holds(compare_operands(lhs, rhs));
    }
    true
}

/// Splits a condition into `(operator, lhs, rhs)` when it is a comparison.
fn split_comparison(condition: &str) -> Option<(GuardOperator, &str, &str)> {
    for (operator, token) in GuardOperator::SCAN_ORDER {
        if let Some(position) = condition.find(token) {
            let lhs = condition[.. position].trim();
            let rhs = condition[position + token.len() ..].trim();
            if lhs.is_empty() || rhs.is_empty() {
                return None;
            }
            return Some((operator, lhs, rhs));
        }
    }
    None
}

/// Orders two operands, decimal-aware when both are numeric.
fn compare_operands(lhs: &str, rhs: &str) -> Ordering {
    let lhs = unquote(lhs);
    let rhs = unquote(rhs);
    match (BigDecimal::from_str(lhs), BigDecimal::from_str(rhs)) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => lhs.cmp(rhs),
    }
}

/// Strips one layer of matching quotes from an operand.
fn unquote(operand: &str) -> &str {
    let bytes = operand.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            return &operand[1 .. operand.len() - 1];
        }
    }
    operand
}
