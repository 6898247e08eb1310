use relplan_error::Result;

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::catalog::{ColumnHandle, TableHandle};
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// Scan of a base table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalScan {
    pub table: TableHandle,
    /// Output symbols and the columns they read, in output order.
    pub columns: Vec<(Symbol, ColumnHandle)>,
    /// If this scan reads the rows a DELETE, UPDATE or MERGE modifies.
    pub update_target: bool,
}

impl Explainable for LogicalScan {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Scan")
            .with_value("table", &self.table)
            .with_map("columns", self.columns.iter().map(|(s, c)| (s, c)));
        if self.update_target {
            ent.with_value("update_target", true)
        } else {
            ent
        }
    }
}

impl LogicalNode for Node<LogicalScan> {
    fn name(&self) -> &'static str {
        "Scan"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.columns.iter().map(|(s, _)| s.clone()).collect()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}
