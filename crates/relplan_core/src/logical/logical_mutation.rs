use relplan_error::Result;

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::catalog::{ColumnHandle, TableHandle};
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub table: TableHandle,
}

/// Deletes the rows identified by the row id symbol.
///
/// Outputs a row count accumulator and an opaque fragment per partial
/// operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalDelete {
    pub target: DeleteTarget,
    pub row_id: Symbol,
    pub outputs: Vec<Symbol>,
}

impl Explainable for LogicalDelete {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Delete")
            .with_value("table", &self.target.table)
            .with_value("row_id", &self.row_id)
    }
}

impl LogicalNode for Node<LogicalDelete> {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.outputs.clone()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    pub table: TableHandle,
    /// Updated column names, in table column order.
    pub column_names: Vec<String>,
    pub column_handles: Vec<ColumnHandle>,
}

/// Updates rows identified by the row id symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalUpdate {
    pub target: UpdateTarget,
    pub row_id: Symbol,
    /// New value for each updated column followed by the row id.
    pub column_value_and_row_id_symbols: Vec<Symbol>,
    pub outputs: Vec<Symbol>,
}

impl Explainable for LogicalUpdate {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Update")
            .with_value("table", &self.target.table)
            .with_map(
                "assignments",
                self.target
                    .column_names
                    .iter()
                    .zip(&self.column_value_and_row_id_symbols),
            )
            .with_value("row_id", &self.row_id)
    }
}

impl LogicalNode for Node<LogicalUpdate> {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.outputs.clone()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}
