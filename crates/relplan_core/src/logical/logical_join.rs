use std::fmt;

use relplan_error::Result;
use serde::{Deserialize, Serialize};

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
            Self::Cross => write!(f, "CROSS"),
        }
    }
}

/// Join of two inputs. Outputs are the left outputs followed by the right
/// outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalJoin {
    pub join_type: JoinType,
    pub condition: Option<Expression>,
}

impl Explainable for LogicalJoin {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Join").with_value("join_type", self.join_type);
        match &self.condition {
            Some(condition) => ent.with_value("condition", condition),
            None => ent,
        }
    }
}

impl LogicalNode for Node<LogicalJoin> {
    fn name(&self) -> &'static str {
        "Join"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.get_children_output_symbols()
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        if let Some(condition) = &self.node.condition {
            func(condition)?;
        }
        Ok(())
    }
}
