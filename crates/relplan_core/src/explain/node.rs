use std::fmt;

use serde::{Deserialize, Serialize};

use super::explainable::{ExplainConfig, ExplainEntry};
use crate::logical::operator::LogicalOperator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainedPlan {
    /// The base plan.
    pub base: ExplainNode,
}

impl ExplainedPlan {
    pub fn new_from_logical(verbose: bool, root: &LogicalOperator) -> Self {
        let config = ExplainConfig { verbose };
        ExplainedPlan {
            base: ExplainNode::walk_logical(config, root),
        }
    }
}

impl fmt::Display for ExplainedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt_indented(f, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExplainNode {
    pub entry: ExplainEntry,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    fn walk_logical(config: ExplainConfig, plan: &LogicalOperator) -> Self {
        let entry = plan.explain_entry(config);
        let children = plan
            .children()
            .iter()
            .map(|c| Self::walk_logical(config, c))
            .collect();

        ExplainNode { entry, children }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(depth), self.entry)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}
