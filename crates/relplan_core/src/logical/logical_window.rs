use std::fmt;

use indexmap::IndexMap;
use relplan_error::Result;
use serde::{Deserialize, Serialize};

use super::logical_order::OrderingScheme;
use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::functions::ResolvedFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Range,
    Rows,
    Groups,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range => write!(f, "RANGE"),
            Self::Rows => write!(f, "ROWS"),
            Self::Groups => write!(f, "GROUPS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameBoundType {
    UnboundedPreceding,
    Preceding,
    CurrentRow,
    Following,
    UnboundedFollowing,
}

impl fmt::Display for FrameBoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundedPreceding => write!(f, "UNBOUNDED PRECEDING"),
            Self::Preceding => write!(f, "PRECEDING"),
            Self::CurrentRow => write!(f, "CURRENT ROW"),
            Self::Following => write!(f, "FOLLOWING"),
            Self::UnboundedFollowing => write!(f, "UNBOUNDED FOLLOWING"),
        }
    }
}

/// Frame of a window function in the symbol space of the window's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFrame {
    pub frame_type: FrameType,
    pub start_type: FrameBoundType,
    /// For ROWS and GROUPS, the offset as a BIGINT. For RANGE, the computed
    /// bound value to compare the sort key against.
    pub start_value: Option<Symbol>,
    /// RANGE only, the sort key coerced to the type of `start_value`.
    pub sort_key_for_start_comparison: Option<Symbol>,
    pub end_type: FrameBoundType,
    pub end_value: Option<Symbol>,
    pub sort_key_for_end_comparison: Option<Symbol>,
}

impl WindowFrame {
    /// RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
    pub const DEFAULT: WindowFrame = WindowFrame {
        frame_type: FrameType::Range,
        start_type: FrameBoundType::UnboundedPreceding,
        start_value: None,
        sort_key_for_start_comparison: None,
        end_type: FrameBoundType::CurrentRow,
        end_value: None,
        sort_key_for_end_comparison: None,
    };
}

impl fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_bound = |typ: FrameBoundType, value: &Option<Symbol>| match value {
            Some(value) => format!("{value} {typ}"),
            None => typ.to_string(),
        };
        write!(
            f,
            "{} BETWEEN {} AND {}",
            self.frame_type,
            fmt_bound(self.start_type, &self.start_value),
            fmt_bound(self.end_type, &self.end_value)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunction {
    pub function: ResolvedFunction,
    pub arguments: Vec<Expression>,
    pub frame: WindowFrame,
    pub ignore_nulls: bool,
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name)?;
        for (idx, arg) in self.arguments.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")?;
        if self.ignore_nulls {
            write!(f, " IGNORE NULLS")?;
        }
        write!(f, " {}", self.frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowSpecification {
    pub partition_by: Vec<Symbol>,
    pub ordering: Option<OrderingScheme>,
}

/// Computes window functions over its input, appending one output per
/// function.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalWindow {
    pub specification: WindowSpecification,
    pub functions: IndexMap<Symbol, WindowFunction>,
}

impl Explainable for LogicalWindow {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let mut ent = ExplainEntry::new("Window")
            .with_map("functions", self.functions.iter());
        if !self.specification.partition_by.is_empty() {
            ent = ent.with_values("partition_by", &self.specification.partition_by);
        }
        if let Some(ordering) = &self.specification.ordering {
            ent = ent.with_value("order_by", ordering);
        }
        ent
    }
}

impl LogicalNode for Node<LogicalWindow> {
    fn name(&self) -> &'static str {
        "Window"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        let mut outputs = self.get_children_output_symbols();
        outputs.extend(self.node.functions.keys().cloned());
        outputs
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        for function in self.node.functions.values() {
            for arg in &function.arguments {
                func(arg)?;
            }
        }
        Ok(())
    }
}
