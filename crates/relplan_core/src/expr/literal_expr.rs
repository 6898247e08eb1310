use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::datatype::DataType;
use crate::types::scalar::ScalarValue;

/// A constant value with an explicit type.
///
/// A null literal carries the type it is null for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiteralExpr {
    pub value: ScalarValue,
    pub datatype: DataType,
}

impl LiteralExpr {
    pub fn new(value: ScalarValue) -> Self {
        let datatype = value.datatype();
        LiteralExpr { value, datatype }
    }

    pub fn typed_null(datatype: DataType) -> Self {
        LiteralExpr {
            value: ScalarValue::Null,
            datatype,
        }
    }
}

impl fmt::Display for LiteralExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ScalarValue::Utf8(s) => write!(f, "'{s}'"),
            ScalarValue::Null if !self.datatype.is_null() => write!(f, "NULL::{}", self.datatype),
            other => write!(f, "{other}"),
        }
    }
}
