//! Functions the planner itself needs to reference when synthesizing
//! expressions and plan nodes.

use super::ResolvedFunction;
use crate::types::datatype::DataType;

pub const FAIL: &str = "fail";
pub const COUNT: &str = "count";
pub const ADD: &str = "add";
pub const SUBTRACT: &str = "subtract";

/// `fail(message)`, raises a query error with the given message when
/// evaluated.
///
/// Never returns so its return type is null. Callers cast the result to
/// whatever type the surrounding expression needs.
pub fn fail() -> ResolvedFunction {
    ResolvedFunction::scalar(FAIL, [DataType::Utf8], DataType::Null).with_deterministic(false)
}

/// `count(*)` used as a window function.
pub fn count_star_window() -> ResolvedFunction {
    ResolvedFunction::window(COUNT, [], DataType::Int64)
}

pub fn add(left: DataType, right: DataType, ret: DataType) -> ResolvedFunction {
    ResolvedFunction::scalar(ADD, [left, right], ret)
}

pub fn subtract(left: DataType, right: DataType, ret: DataType) -> ResolvedFunction {
    ResolvedFunction::scalar(SUBTRACT, [left, right], ret)
}
