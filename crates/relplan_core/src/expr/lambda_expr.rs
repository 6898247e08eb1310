use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expression;
use crate::types::datatype::DataType;

/// A lambda passed as a function argument.
///
/// Lambdas stay as syntax in the plan. The body references its own
/// parameters through `LambdaArgument` and may reference symbols of the
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub params: Vec<LambdaParam>,
    pub body: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LambdaParam {
    pub name: String,
    pub datatype: DataType,
}

impl fmt::Display for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.name)?;
        }
        write!(f, ") -> {}", self.body)
    }
}
