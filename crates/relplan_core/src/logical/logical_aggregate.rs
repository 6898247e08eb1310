use std::fmt;

use indexmap::IndexMap;
use relplan_error::Result;

use super::logical_order::OrderingScheme;
use super::operator::{LogicalNode, Node};
use super::symbol::Symbol;
use crate::explain::explainable::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::Expression;
use crate::functions::ResolvedFunction;

/// A single aggregate function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub function: ResolvedFunction,
    /// Arguments are symbols of the input, except lambdas which are kept as
    /// expressions.
    pub arguments: Vec<Expression>,
    pub distinct: bool,
    /// Only rows where this symbol is true are aggregated.
    pub filter: Option<Symbol>,
    pub ordering: Option<OrderingScheme>,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        for (idx, arg) in self.arguments.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        if let Some(ordering) = &self.ordering {
            write!(f, " ORDER BY {ordering}")?;
        }
        write!(f, ")")?;
        if let Some(filter) = &self.filter {
            write!(f, " FILTER (WHERE {filter})")?;
        }
        Ok(())
    }
}

/// Describes the grouping sets an aggregate computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingSetDescriptor {
    /// Distinct symbols across all grouping sets, including the group id
    /// symbol if there is one.
    pub grouping_keys: Vec<Symbol>,
    pub grouping_set_count: usize,
    /// Indices of grouping sets that are empty. An empty grouping set
    /// produces a single row even when there's no input.
    pub global_grouping_sets: Vec<usize>,
}

impl GroupingSetDescriptor {
    /// A single grouping set over `keys`.
    pub fn single(keys: Vec<Symbol>) -> Self {
        let global_grouping_sets = if keys.is_empty() { vec![0] } else { Vec::new() };
        GroupingSetDescriptor {
            grouping_keys: keys,
            grouping_set_count: 1,
            global_grouping_sets,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalAggregate {
    pub aggregations: IndexMap<Symbol, Aggregation>,
    pub grouping_sets: GroupingSetDescriptor,
    pub group_id_symbol: Option<Symbol>,
}

impl LogicalAggregate {
    /// If this aggregate only deduplicates its grouping keys.
    pub fn is_distinct(&self) -> bool {
        self.aggregations.is_empty()
            && self.grouping_sets.grouping_set_count == 1
            && !self.grouping_sets.grouping_keys.is_empty()
    }
}

impl Explainable for LogicalAggregate {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        let mut ent = ExplainEntry::new("Aggregate")
            .with_values("keys", &self.grouping_sets.grouping_keys)
            .with_value("grouping_sets", self.grouping_sets.grouping_set_count)
            .with_map("aggregations", self.aggregations.iter());
        if !self.grouping_sets.global_grouping_sets.is_empty() {
            ent = ent.with_values("global_sets", &self.grouping_sets.global_grouping_sets);
        }
        if let Some(group_id) = &self.group_id_symbol {
            ent = ent.with_value("group_id", group_id);
        }
        ent
    }
}

impl LogicalNode for Node<LogicalAggregate> {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node
            .grouping_sets
            .grouping_keys
            .iter()
            .chain(self.node.aggregations.keys())
            .cloned()
            .collect()
    }

    fn for_each_expr<'a, F>(&'a self, mut func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        for agg in self.node.aggregations.values() {
            for arg in &agg.arguments {
                func(arg)?;
            }
        }
        Ok(())
    }
}

/// Replicates every input row once per grouping set, nulling out the
/// grouping columns not part of that set and tagging the row with the index
/// of the set.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalGroupId {
    /// Output symbols of each grouping set.
    pub grouping_sets: Vec<Vec<Symbol>>,
    /// Output grouping symbol to the input symbol it reads from.
    pub grouping_columns: IndexMap<Symbol, Symbol>,
    /// Input symbols passed through unchanged for the aggregate.
    pub aggregation_arguments: Vec<Symbol>,
    pub group_id_symbol: Symbol,
}

impl Explainable for LogicalGroupId {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("GroupId")
            .with_values(
                "grouping_sets",
                self.grouping_sets.iter().map(|set| {
                    let names: Vec<_> = set.iter().map(|s| s.to_string()).collect();
                    format!("{{{}}}", names.join(", "))
                }),
            )
            .with_map("grouping_columns", self.grouping_columns.iter())
            .with_values("aggregation_arguments", &self.aggregation_arguments)
            .with_value("group_id", &self.group_id_symbol)
    }
}

impl LogicalNode for Node<LogicalGroupId> {
    fn name(&self) -> &'static str {
        "GroupId"
    }

    fn output_symbols(&self) -> Vec<Symbol> {
        self.node
            .grouping_columns
            .keys()
            .chain(self.node.aggregation_arguments.iter())
            .chain(std::iter::once(&self.node.group_id_symbol))
            .cloned()
            .collect()
    }

    fn for_each_expr<'a, F>(&'a self, _func: F) -> Result<()>
    where
        F: FnMut(&'a Expression) -> Result<()>,
    {
        Ok(())
    }
}
