// SPDX-License-Identifier: MIT

//! Condition expressions for branch and filter nodes
//!
//! Conditions are simple boolean expressions over run state:
//! - `steps.review.approved == true`
//! - `input.amount > 1000 and not variables.vip`
//! - `tags contains 'urgent' || priority >= 3`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression};
pub use evaluator::{evaluate, is_truthy, Lookup};
pub use parser::{parse, ConditionError};

/// Parse and evaluate in one step
pub fn check<L: Lookup + ?Sized>(condition: &str, source: &L) -> Result<bool, ConditionError> {
    Ok(evaluate(&parse(condition)?, source))
}
