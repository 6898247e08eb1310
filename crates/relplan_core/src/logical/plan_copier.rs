use ahash::{HashMap, HashMapExt};
use indexmap::IndexMap;
use relplan_error::{OptionExt, Result};

use super::context::{PlanContext, PlanNodeId};
use super::logical_aggregate::{Aggregation, GroupingSetDescriptor, LogicalAggregate, LogicalGroupId};
use super::logical_filter::LogicalFilter;
use super::logical_join::LogicalJoin;
use super::logical_merge::{LogicalDeleteAndInsert, LogicalMerge, PartitioningScheme};
use super::logical_mutation::{LogicalDelete, LogicalUpdate};
use super::logical_order::{LogicalSort, OrderingScheme};
use super::logical_project::{Assignments, LogicalProject};
use super::logical_scan::LogicalScan;
use super::logical_setop::LogicalUnion;
use super::logical_values::LogicalValues;
use super::logical_window::{LogicalWindow, WindowFrame, WindowFunction, WindowSpecification};
use super::operator::{LogicalOperator, Node};
use super::symbol::Symbol;
use crate::expr::Expression;

/// A copied plan along with its fields in the order of the original's.
#[derive(Debug, Clone)]
pub struct CopiedPlan {
    pub root: LogicalOperator,
    pub fields: Vec<Symbol>,
    /// Original node id to the id of its copy.
    pub id_mapping: HashMap<PlanNodeId, PlanNodeId>,
}

/// Structurally copies a plan, assigning fresh ids to every node and fresh
/// symbols to every symbol produced inside the plan.
///
/// Symbols referenced but not produced within the plan (correlated
/// references) are left unchanged.
#[derive(Debug)]
pub struct PlanCopier<'a> {
    ctx: &'a mut PlanContext,
    symbols: HashMap<Symbol, Symbol>,
    ids: HashMap<PlanNodeId, PlanNodeId>,
}

impl<'a> PlanCopier<'a> {
    pub fn copy_plan(
        ctx: &'a mut PlanContext,
        plan: &LogicalOperator,
        fields: &[Symbol],
    ) -> Result<CopiedPlan> {
        let mut copier = PlanCopier {
            ctx,
            symbols: HashMap::new(),
            ids: HashMap::new(),
        };

        let root = copier.copy(plan)?;
        let fields = fields
            .iter()
            .map(|f| copier.symbols.get(f).cloned().required("copied field symbol"))
            .collect::<Result<Vec<_>>>()?;

        Ok(CopiedPlan {
            root,
            fields,
            id_mapping: copier.ids,
        })
    }

    fn copy(&mut self, plan: &LogicalOperator) -> Result<LogicalOperator> {
        let children = plan
            .children()
            .iter()
            .map(|c| self.copy(c))
            .collect::<Result<Vec<_>>>()?;

        let id = self.ctx.next_id();
        self.ids.insert(plan.id(), id);

        Ok(match plan {
            LogicalOperator::Scan(n) => {
                let node = LogicalScan {
                    table: n.node.table.clone(),
                    columns: n
                        .node
                        .columns
                        .iter()
                        .map(|(s, c)| (self.produce(s), c.clone()))
                        .collect(),
                    update_target: n.node.update_target,
                };
                LogicalOperator::Scan(Node::new(id, node, children))
            }
            LogicalOperator::Values(n) => {
                let node = LogicalValues {
                    outputs: n.node.outputs.iter().map(|s| self.produce(s)).collect(),
                    rows: n
                        .node
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>>>())
                        .collect::<Result<_>>()?,
                };
                LogicalOperator::Values(Node::new(id, node, children))
            }
            LogicalOperator::Filter(n) => {
                let node = LogicalFilter {
                    predicate: self.expr(&n.node.predicate)?,
                };
                LogicalOperator::Filter(Node::new(id, node, children))
            }
            LogicalOperator::Project(n) => {
                let mut assignments = Assignments::new();
                for (sym, expr) in n.node.assignments.iter() {
                    let expr = self.expr(expr)?;
                    // Pass through assignments keep the child's copy.
                    let out = match self.symbols.get(sym) {
                        Some(existing) => existing.clone(),
                        None => self.produce(sym),
                    };
                    assignments.put(out, expr);
                }
                LogicalOperator::Project(Node::new(id, LogicalProject { assignments }, children))
            }
            LogicalOperator::Aggregate(n) => {
                let grouping_keys = n
                    .node
                    .grouping_sets
                    .grouping_keys
                    .iter()
                    .map(|s| self.reference(s))
                    .collect();
                let mut aggregations = IndexMap::new();
                for (sym, agg) in &n.node.aggregations {
                    let agg = Aggregation {
                        function: agg.function.clone(),
                        arguments: agg
                            .arguments
                            .iter()
                            .map(|a| self.expr(a))
                            .collect::<Result<_>>()?,
                        distinct: agg.distinct,
                        filter: agg.filter.as_ref().map(|f| self.reference(f)),
                        ordering: agg.ordering.as_ref().map(|o| self.ordering(o)),
                    };
                    aggregations.insert(self.produce(sym), agg);
                }
                let node = LogicalAggregate {
                    aggregations,
                    grouping_sets: GroupingSetDescriptor {
                        grouping_keys,
                        grouping_set_count: n.node.grouping_sets.grouping_set_count,
                        global_grouping_sets: n.node.grouping_sets.global_grouping_sets.clone(),
                    },
                    group_id_symbol: n.node.group_id_symbol.as_ref().map(|s| self.reference(s)),
                };
                LogicalOperator::Aggregate(Node::new(id, node, children))
            }
            LogicalOperator::GroupId(n) => {
                let mut grouping_columns = IndexMap::new();
                for (out, input) in &n.node.grouping_columns {
                    let input = self.reference(input);
                    grouping_columns.insert(self.produce(out), input);
                }
                let node = LogicalGroupId {
                    grouping_sets: n
                        .node
                        .grouping_sets
                        .iter()
                        .map(|set| set.iter().map(|s| self.reference(s)).collect())
                        .collect(),
                    grouping_columns,
                    aggregation_arguments: n
                        .node
                        .aggregation_arguments
                        .iter()
                        .map(|s| self.reference(s))
                        .collect(),
                    group_id_symbol: self.produce(&n.node.group_id_symbol),
                };
                LogicalOperator::GroupId(Node::new(id, node, children))
            }
            LogicalOperator::Window(n) => {
                let specification = WindowSpecification {
                    partition_by: n
                        .node
                        .specification
                        .partition_by
                        .iter()
                        .map(|s| self.reference(s))
                        .collect(),
                    ordering: n.node.specification.ordering.as_ref().map(|o| self.ordering(o)),
                };
                let mut functions = IndexMap::new();
                for (sym, function) in &n.node.functions {
                    let function = WindowFunction {
                        function: function.function.clone(),
                        arguments: function
                            .arguments
                            .iter()
                            .map(|a| self.expr(a))
                            .collect::<Result<_>>()?,
                        frame: self.frame(&function.frame),
                        ignore_nulls: function.ignore_nulls,
                    };
                    functions.insert(self.produce(sym), function);
                }
                let node = LogicalWindow {
                    specification,
                    functions,
                };
                LogicalOperator::Window(Node::new(id, node, children))
            }
            LogicalOperator::Sort(n) => {
                let node = LogicalSort {
                    ordering: self.ordering(&n.node.ordering),
                };
                LogicalOperator::Sort(Node::new(id, node, children))
            }
            LogicalOperator::Limit(n) => {
                let mut node = n.node.clone();
                node.ties = n.node.ties.as_ref().map(|o| self.ordering(o));
                LogicalOperator::Limit(Node::new(id, node, children))
            }
            LogicalOperator::Offset(n) => {
                LogicalOperator::Offset(Node::new(id, n.node.clone(), children))
            }
            LogicalOperator::Join(n) => {
                let node = LogicalJoin {
                    join_type: n.node.join_type,
                    condition: n.node.condition.as_ref().map(|c| self.expr(c)).transpose()?,
                };
                LogicalOperator::Join(Node::new(id, node, children))
            }
            LogicalOperator::Union(n) => {
                let inputs = n
                    .node
                    .inputs
                    .iter()
                    .map(|input| input.iter().map(|s| self.reference(s)).collect())
                    .collect();
                let outputs = n.node.outputs.iter().map(|s| self.produce(s)).collect();
                LogicalOperator::Union(Node::new(id, LogicalUnion::try_new(outputs, inputs)?, children))
            }
            LogicalOperator::Delete(n) => {
                let node = LogicalDelete {
                    target: n.node.target.clone(),
                    row_id: self.reference(&n.node.row_id),
                    outputs: n.node.outputs.iter().map(|s| self.produce(s)).collect(),
                };
                LogicalOperator::Delete(Node::new(id, node, children))
            }
            LogicalOperator::Update(n) => {
                let node = LogicalUpdate {
                    target: n.node.target.clone(),
                    row_id: self.reference(&n.node.row_id),
                    column_value_and_row_id_symbols: n
                        .node
                        .column_value_and_row_id_symbols
                        .iter()
                        .map(|s| self.reference(s))
                        .collect(),
                    outputs: n.node.outputs.iter().map(|s| self.produce(s)).collect(),
                };
                LogicalOperator::Update(Node::new(id, node, children))
            }
            LogicalOperator::DeleteAndInsert(n) => {
                let node = LogicalDeleteAndInsert {
                    target: n.node.target.clone(),
                    projected_symbols: n
                        .node
                        .projected_symbols
                        .iter()
                        .map(|s| self.reference(s))
                        .collect(),
                };
                LogicalOperator::DeleteAndInsert(Node::new(id, node, children))
            }
            LogicalOperator::Merge(n) => {
                let node = LogicalMerge {
                    target: n.node.target.clone(),
                    table_scan_id: self
                        .ids
                        .get(&n.node.table_scan_id)
                        .copied()
                        .unwrap_or(n.node.table_scan_id),
                    projected_symbols: n
                        .node
                        .projected_symbols
                        .iter()
                        .map(|s| self.reference(s))
                        .collect(),
                    partitioning: n.node.partitioning.as_ref().map(|p| PartitioningScheme {
                        partitioning: p.partitioning.clone(),
                        arguments: p.arguments.iter().map(|s| self.reference(s)).collect(),
                        output_layout: p.output_layout.iter().map(|s| self.reference(s)).collect(),
                    }),
                    outputs: n.node.outputs.iter().map(|s| self.produce(s)).collect(),
                };
                LogicalOperator::Merge(Node::new(id, node, children))
            }
        })
    }

    /// Allocate the copy of a symbol produced by the node being copied.
    fn produce(&mut self, symbol: &Symbol) -> Symbol {
        let copy = self.ctx.symbols.new_symbol_like(symbol);
        self.symbols.insert(symbol.clone(), copy.clone());
        copy
    }

    fn reference(&self, symbol: &Symbol) -> Symbol {
        self.symbols
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.clone())
    }

    fn expr(&self, expr: &Expression) -> Result<Expression> {
        let mut expr = expr.clone();
        expr.replace_symbols(&mut |s| Ok(self.reference(s)))?;
        Ok(expr)
    }

    fn ordering(&self, ordering: &OrderingScheme) -> OrderingScheme {
        OrderingScheme::new(ordering.iter().map(|(s, o)| (self.reference(s), *o)))
    }

    fn frame(&self, frame: &WindowFrame) -> WindowFrame {
        let map = |s: &Option<Symbol>| s.as_ref().map(|s| self.reference(s));
        WindowFrame {
            frame_type: frame.frame_type,
            start_type: frame.start_type,
            start_value: map(&frame.start_value),
            sort_key_for_start_comparison: map(&frame.sort_key_for_start_comparison),
            end_type: frame.end_type,
            end_value: map(&frame.end_value),
            sort_key_for_end_comparison: map(&frame.sort_key_for_end_comparison),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnHandle, TableHandle};
    use crate::expr::comparison_expr::ComparisonOperator;
    use crate::expr::{self, lit};
    use crate::logical::operator::LogicalNode;
    use crate::types::datatype::DataType;

    fn scan_filter_project(ctx: &mut PlanContext) -> (LogicalOperator, Vec<Symbol>) {
        let a = ctx.new_symbol("a", DataType::Int64);
        let b = ctx.new_symbol("b", DataType::Utf8);
        let scan = LogicalOperator::Scan(Node::new(
            ctx.next_id(),
            LogicalScan {
                table: TableHandle::new("c", "s", "t"),
                columns: vec![
                    (a.clone(), ColumnHandle::new("a")),
                    (b.clone(), ColumnHandle::new("b")),
                ],
                update_target: false,
            },
            Vec::new(),
        ));
        let filter = LogicalOperator::Filter(Node::new(
            ctx.next_id(),
            LogicalFilter {
                predicate: expr::compare(ComparisonOperator::Gt, &a, lit(1_i64)),
            },
            vec![scan],
        ));
        let c = ctx.new_symbol("c", DataType::Int64);
        let mut assignments = Assignments::new();
        assignments.put(c.clone(), expr::sym(&a));
        assignments.put_identity(&b);
        let project = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![filter],
        ));
        (project, vec![c, b])
    }

    #[test]
    fn copy_has_fresh_ids_and_symbols() {
        let mut ctx = PlanContext::new();
        let (plan, fields) = scan_filter_project(&mut ctx);

        let copied = PlanCopier::copy_plan(&mut ctx, &plan, &fields).unwrap();

        assert_eq!(plan.node_count(), copied.root.node_count());
        assert_eq!(3, copied.id_mapping.len());
        for (orig, copy) in &copied.id_mapping {
            assert_ne!(orig, copy);
        }

        // Field order is kept, names are fresh.
        assert_eq!("c_1", copied.fields[0].name());
        assert_eq!("b_1", copied.fields[1].name());
        assert_eq!(copied.fields, copied.root.output_symbols());
        for (orig, copy) in fields.iter().zip(&copied.fields) {
            assert_ne!(orig, copy);
            assert_eq!(orig.datatype(), copy.datatype());
        }

        // Original plan untouched.
        assert_eq!(fields, plan.output_symbols());
    }

    #[test]
    fn copy_rewrites_expressions() {
        let mut ctx = PlanContext::new();
        let (plan, fields) = scan_filter_project(&mut ctx);
        let copied = PlanCopier::copy_plan(&mut ctx, &plan, &fields).unwrap();

        let filter = &copied.root.children()[0];
        let scan_outputs = filter.children()[0].output_symbols();
        let mut referenced = Vec::new();
        filter
            .for_each_expr(|e| {
                referenced.extend(e.referenced_symbols());
                Ok(())
            })
            .unwrap();

        assert_eq!(vec![scan_outputs[0].clone()], referenced);
    }
}
