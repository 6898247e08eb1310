use relplan_error::Result;

use super::logical_order::OrderingScheme;
use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLimit {
    pub count: u64,
    /// Ordering used to include rows tied with the last row (`FETCH FIRST n
    /// ROWS WITH TIES`).
    pub ties: Option<OrderingScheme>,
}

impl Explainable for LogicalLimit {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Limit").with_value("count", self.count);
        match &self.ties {
            Some(ties) => ent.with_value("with_ties", ties),
            None => ent,
        }
    }
}

impl LogicalNode for Node<LogicalLimit> {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.get_children_output_symbols()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOffset {
    pub count: u64,
}

impl Explainable for LogicalOffset {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Offset").with_value("count", self.count)
    }
}

impl LogicalNode for Node<LogicalOffset> {
    fn name(&self) -> &'static str {
        "Offset"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.get_children_output_symbols()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}
