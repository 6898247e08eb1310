use relplan_error::Result;

use super::context::PlanNodeId;
use super::logical_aggregate::{LogicalAggregate, LogicalGroupId};
use super::logical_filter::LogicalFilter;
use super::logical_join::LogicalJoin;
use super::logical_limit::{LogicalLimit, LogicalOffset};
use super::logical_merge::{LogicalDeleteAndInsert, LogicalMerge};
use super::logical_mutation::{LogicalDelete, LogicalUpdate};
use super::logical_order::LogicalSort;
use super::logical_project::LogicalProject;
use super::logical_scan::LogicalScan;
use super::logical_setop::LogicalUnion;
use super::logical_values::LogicalValues;
use super::logical_window::LogicalWindow;
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;

/// Common operations across all logical nodes in a plan.
///
/// For individual operators, this should be implemented on `Node<T>` and not
/// `T`.
///
/// This is implemented on `LogicalOperator` for convenience.
pub trait LogicalNode {
    /// Name of the operator.
    fn name(&self) -> &'static str;

    /// Symbols produced by this operator, in output order.
    ///
    /// Every symbol is either produced by this operator, or is passed
    /// through from one of its direct children.
    fn output_symbols(&self) -> Vec<Symbol>;

    fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>;
}

/// Wrapper around nodes in the logical plan to holds additional metadata for
/// the node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<N> {
    /// Identifier assigned when the node was created. Never reassigned.
    pub id: PlanNodeId,
    /// Node specific logic.
    pub node: N,
    /// Inputs to this node.
    pub children: Vec<LogicalOperator>,
}

impl<N> Node<N> {
    pub fn new(id: PlanNodeId, node: N, children: Vec<LogicalOperator>) -> Self {
        Node { id, node, children }
    }

    /// Output symbols of all children, concatenated.
    pub fn get_children_output_symbols(&self) -> Vec<Symbol> {
        self.children.iter().fold(Vec::new(), |mut symbols, child| {
            symbols.append(&mut child.output_symbols());
            symbols
        })
    }
}

impl<N> Explainable for Node<N>
where
    N: Explainable,
    Node<N>: LogicalNode,
{
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = self.node.explain_entry(conf);
        if conf.verbose {
            ent.with_value("id", self.id).with_values(
                "outputs",
                self.output_symbols()
                    .iter()
                    .map(|s| format!("{s}: {}", s.datatype())),
            )
        } else {
            ent
        }
    }
}

impl<N> AsRef<N> for Node<N> {
    fn as_ref(&self) -> &N {
        &self.node
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    Scan(Node<LogicalScan>),
    Values(Node<LogicalValues>),
    Filter(Node<LogicalFilter>),
    Project(Node<LogicalProject>),
    Aggregate(Node<LogicalAggregate>),
    GroupId(Node<LogicalGroupId>),
    Window(Node<LogicalWindow>),
    Sort(Node<LogicalSort>),
    Limit(Node<LogicalLimit>),
    Offset(Node<LogicalOffset>),
    Join(Node<LogicalJoin>),
    Union(Node<LogicalUnion>),
    Delete(Node<LogicalDelete>),
    Update(Node<LogicalUpdate>),
    DeleteAndInsert(Node<LogicalDeleteAndInsert>),
    Merge(Node<LogicalMerge>),
}

/// Dispatch an expression to the inner `Node<T>` of every variant.
macro_rules! dispatch {
    ($op:expr, $n:ident => $body:expr) => {
        match $op {
            LogicalOperator::Scan($n) => $body,
            LogicalOperator::Values($n) => $body,
            LogicalOperator::Filter($n) => $body,
            LogicalOperator::Project($n) => $body,
            LogicalOperator::Aggregate($n) => $body,
            LogicalOperator::GroupId($n) => $body,
            LogicalOperator::Window($n) => $body,
            LogicalOperator::Sort($n) => $body,
            LogicalOperator::Limit($n) => $body,
            LogicalOperator::Offset($n) => $body,
            LogicalOperator::Join($n) => $body,
            LogicalOperator::Union($n) => $body,
            LogicalOperator::Delete($n) => $body,
            LogicalOperator::Update($n) => $body,
            LogicalOperator::DeleteAndInsert($n) => $body,
            LogicalOperator::Merge($n) => $body,
        }
    };
}

impl LogicalOperator {
    pub fn id(&self) -> PlanNodeId {
        dispatch!(self, n => n.id)
    }

    pub fn children(&self) -> &[LogicalOperator] {
        dispatch!(self, n => &n.children)
    }

    pub fn children_mut(&mut self) -> &mut Vec<LogicalOperator> {
        dispatch!(self, n => &mut n.children)
    }

    pub fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        dispatch!(self, n => n.explain_entry(conf))
    }

    /// Get the id of the leftmost table scan reachable by following first
    /// children.
    pub fn leftmost_table_scan_id(&self) -> Option<PlanNodeId> {
        match self {
            LogicalOperator::Scan(n) => Some(n.id),
            other => other.children().first()?.leftmost_table_scan_id(),
        }
    }

    /// Count the nodes in the plan.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(|c| c.node_count())
            .sum::<usize>()
    }
}

impl LogicalNode for LogicalOperator {
    fn name(&self) -> &'static str {
        dispatch!(self, n => n.name())
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        dispatch!(self, n => n.output_symbols())
    }

    fn for_each_expr<'a, F>(&'a self, func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        dispatch!(self, n => n.for_each_expr(func))
    }
}
