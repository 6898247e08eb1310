pub mod builtin;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::datatype::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Window,
}

/// A function that has been resolved against concrete argument types.
///
/// Resolution happens during analysis, the planner only carries these
/// through to plan nodes and expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedFunction {
    pub name: String,
    pub kind: FunctionKind,
    /// Types the arguments are required to be. Arguments of a different type
    /// need a coercion before being passed to the function.
    pub argument_types: Vec<DataType>,
    pub return_type: DataType,
    pub deterministic: bool,
}

impl ResolvedFunction {
    pub fn scalar(
        name: impl Into<String>,
        argument_types: impl IntoIterator<Item = DataType>,
        return_type: DataType,
    ) -> Self {
        ResolvedFunction {
            name: name.into(),
            kind: FunctionKind::Scalar,
            argument_types: argument_types.into_iter().collect(),
            return_type,
            deterministic: true,
        }
    }

    pub fn aggregate(
        name: impl Into<String>,
        argument_types: impl IntoIterator<Item = DataType>,
        return_type: DataType,
    ) -> Self {
        ResolvedFunction {
            name: name.into(),
            kind: FunctionKind::Aggregate,
            argument_types: argument_types.into_iter().collect(),
            return_type,
            deterministic: true,
        }
    }

    pub fn window(
        name: impl Into<String>,
        argument_types: impl IntoIterator<Item = DataType>,
        return_type: DataType,
    ) -> Self {
        ResolvedFunction {
            name: name.into(),
            kind: FunctionKind::Window,
            argument_types: argument_types.into_iter().collect(),
            return_type,
            deterministic: true,
        }
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}

impl fmt::Display for ResolvedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, typ) in self.argument_types.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{typ}")?;
        }
        write!(f, "): {}", self.return_type)
    }
}
