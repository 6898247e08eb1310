use relplan_error::{DbError, Result};

use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// UNION ALL of the children.
///
/// Distinct unions are planned as a deduplicating aggregate over this.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalUnion {
    pub outputs: Vec<Symbol>,
    /// For each child, the child symbols feeding each output, positionally.
    pub inputs: Vec<Vec<Symbol>>,
}

impl LogicalUnion {
    pub fn try_new(outputs: Vec<Symbol>, inputs: Vec<Vec<Symbol>>) -> Result<Self> {
        for input in &inputs {
            if input.len() != outputs.len() {
                return Err(DbError::new("Union input has the wrong number of symbols")
                    .with_field("expected", outputs.len())
                    .with_field("got", input.len()));
            }
        }
        Ok(LogicalUnion { outputs, inputs })
    }
}

impl Explainable for LogicalUnion {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Union")
            .with_values("outputs", &self.outputs)
            .with_value("num_inputs", self.inputs.len())
    }
}

impl LogicalNode for Node<LogicalUnion> {
    fn name(&self) -> &'static str {
        "Union"
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
