use std::fmt;

use relplan_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::Expression;
use super::literal_expr::LiteralExpr;
use crate::types::datatype::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhenThen {
    pub when: Expression,
    pub then: Expression,
}

impl fmt::Display for WhenThen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WHEN {} THEN {}", self.when, self.then)
    }
}

/// Searched case expression. The first `when` that evaluates to true picks
/// the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseExpr {
    pub cases: Vec<WhenThen>,
    pub else_expr: Box<Expression>,
    pub datatype: DataType,
}

impl CaseExpr {
    /// Create a new case expression.
    ///
    /// All non-null branches must produce the same type. When no else
    /// expression is given, a typed null is used.
    pub fn try_new(cases: Vec<WhenThen>, else_expr: Option<Expression>) -> Result<Self> {
        let mut datatype = DataType::Null;
        let branch_types = cases
            .iter()
            .map(|case| case.then.datatype())
            .chain(else_expr.iter().map(|e| e.datatype()));

        for branch_type in branch_types {
            let branch_type = branch_type?;
            if branch_type.is_null() {
                continue;
            }
            if datatype.is_null() {
                datatype = branch_type;
                continue;
            }
            if branch_type != datatype {
                return Err(DbError::new(format!(
                    "Case expression produces two different types: {} and {}",
                    datatype, branch_type
                )));
            }
        }

        let else_expr = match else_expr {
            Some(expr) => Box::new(expr),
            None => Box::new(Expression::Literal(LiteralExpr::typed_null(datatype.clone()))),
        };

        Ok(CaseExpr {
            cases,
            else_expr,
            datatype,
        })
    }
}

impl fmt::Display for CaseExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CASE ")?;
        for case in &self.cases {
            write!(f, "{} ", case)?;
        }
        write!(f, "ELSE {} END", self.else_expr)
    }
}
