use relplan_error::Result;

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// Inline rows of values.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalValues {
    pub outputs: Vec<Symbol>,
    /// Each row has one expression per output symbol.
    pub rows: Vec<Vec<Expression>>,
}

impl LogicalValues {
    /// A single row with no columns.
    pub fn single_row() -> Self {
        LogicalValues {
            outputs: Vec::new(),
            rows: vec![Vec::new()],
        }
    }
}

impl Explainable for LogicalValues {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Values")
            .with_values("outputs", &self.outputs)
            .with_value("num_rows", self.rows.len());
        if conf.verbose {
            ent.with_values(
                "rows",
                self.rows.iter().map(|row| {
                    row.iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                }),
            )
        } else {
            ent
        }
    }
}

impl LogicalNode for Node<LogicalValues> {
    fn name(&self) -> &'static str {
        "Values"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.outputs.clone()
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        for row in &self.node.rows {
            for expr in row {
                func(expr)?;
            }
        }
        Ok(())
    }
}
