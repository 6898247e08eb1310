use std::fmt;

use relplan_error::Result;
use serde::{Deserialize, Serialize};

use super::context::PlanNodeId;
use super::merge_processor::RowChangeProcessor;
use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::catalog::{ColumnHandle, TableHandle};
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// Kind of a MERGE WHEN clause.
///
/// The discriminant is the operation code written into the merge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeCaseKind {
    Insert = 1,
    Delete = 2,
    Update = 3,
}

impl MergeCaseKind {
    /// Operation code used when no case matched a row.
    pub const NO_MATCH: i32 = -1;

    pub const fn operation_number(self) -> i32 {
        self as i32
    }

    pub fn from_operation_number(op: i32) -> Option<Self> {
        match op {
            1 => Some(Self::Insert),
            2 => Some(Self::Delete),
            3 => Some(Self::Update),
            _ => None,
        }
    }
}

impl fmt::Display for MergeCaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Update => write!(f, "UPDATE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCaseDetails {
    pub case_number: usize,
    pub kind: MergeCaseKind,
    /// Columns assigned by this case. Empty for DELETE.
    pub columns: Vec<ColumnHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeDetails {
    pub cases: Vec<MergeCaseDetails>,
}

impl MergeDetails {
    pub fn case(&self, case_number: usize) -> Option<&MergeCaseDetails> {
        self.cases.get(case_number)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeTarget {
    pub table: TableHandle,
    pub details: MergeDetails,
    pub processor: RowChangeProcessor,
}

/// How rows are redistributed before being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitioningScheme {
    /// Partitioning function of the table layout, None for hash
    /// partitioning.
    pub partitioning: Option<String>,
    /// Symbols the partitioning function is applied to.
    pub arguments: Vec<Symbol>,
    pub output_layout: Vec<Symbol>,
}

impl fmt::Display for PartitioningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.arguments.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "{}({})",
            self.partitioning.as_deref().unwrap_or("hash"),
            args.join(", ")
        )
    }
}

/// Turns merge rows into the column layout the row change processor
/// expects.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalDeleteAndInsert {
    pub target: MergeTarget,
    /// Data column symbols, then the operation symbol, then the row id.
    pub projected_symbols: Vec<Symbol>,
}

impl Explainable for LogicalDeleteAndInsert {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("DeleteAndInsert")
            .with_value("table", &self.target.table)
            .with_value("processor", self.target.processor.name())
            .with_values("projected", &self.projected_symbols)
    }
}

impl LogicalNode for Node<LogicalDeleteAndInsert> {
    fn name(&self) -> &'static str {
        "DeleteAndInsert"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node.projected_symbols.clone()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}

/// Writes the row changes of a MERGE to the target table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalMerge {
    pub target: MergeTarget,
    /// Id of the scan of the target table.
    pub table_scan_id: PlanNodeId,
    pub projected_symbols: Vec<Symbol>,
    pub partitioning: Option<PartitioningScheme>,
    pub outputs: Vec<Symbol>,
}

impl Explainable for LogicalMerge {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Merge")
            .with_value("table", &self.target.table)
            .with_value("table_scan", self.table_scan_id)
            .with_values(
                "cases",
                self.target
                    .details
                    .cases
                    .iter()
                    .map(|c| format!("{}: {}", c.case_number, c.kind)),
            );
        match &self.partitioning {
            Some(partitioning) => ent.with_value("partitioning", partitioning),
            None => ent,
        }
    }
}

impl LogicalNode for Node<LogicalMerge> {
    fn name(&self) -> &'static str {
        "Merge"
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
