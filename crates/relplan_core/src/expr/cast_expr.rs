use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;
use crate::types::datatype::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastExpr {
    pub to: DataType,
    pub expr: Box<Expression>,
    /// The cast only changes the declared type, the physical representation
    /// of the value stays the same.
    pub type_only: bool,
}

impl CastExpr {
    pub fn new(expr: impl Into<Expression>, to: DataType) -> Self {
        CastExpr {
            to,
            expr: Box::new(expr.into()),
            type_only: false,
        }
    }

    pub fn new_type_only(expr: impl Into<Expression>, to: DataType, type_only: bool) -> Self {
        CastExpr {
            to,
            expr: Box::new(expr.into()),
            type_only,
        }
    }
}

impl fmt::Display for CastExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAST({} AS {})", self.expr, self.to)
    }
}
