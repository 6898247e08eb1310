use ahash::{HashMap, HashMapExt};
use indexmap::{IndexMap, IndexSet};
use relplan_error::{DbError, OptionExt, Result};
use tracing::trace;

use super::PlannerEnv;
use super::coerce::coerce;
use super::grouping_sets::enumerate_grouping_sets;
use super::plan_builder::PlanBuilder;
use super::subquery::handle_subqueries;
use super::translation::name_hint;
use crate::analysis::Analysis;
use crate::analysis::ast::{AstExpr, AstExprKind, FunctionCall, NodeId, QuerySpecification};
use crate::analysis::grouping::GroupingSetAnalysis;
use crate::analysis::scope::FieldId;
use crate::analysis::scope_aware::ScopeAwareKey;
use crate::expr::case_expr::{CaseExpr, WhenThen};
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::{self, Expression};
use crate::logical::context::PlanContext;
use crate::logical::logical_aggregate::{
    Aggregation,
    GroupingSetDescriptor,
    LogicalAggregate,
    LogicalGroupId,
};
use crate::logical::logical_order::{OrderingScheme, SortOrder};
use crate::logical::logical_project::{Assignments, LogicalProject};
use crate::logical::operator::{LogicalNode, LogicalOperator, Node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;

/// Result of planning the grouping sets of a query.
#[derive(Debug)]
struct GroupingSetsPlan<'a> {
    builder: PlanBuilder<'a>,
    /// Grouping sets over plain columns, before complex expressions are
    /// added. Used for GROUPING operations.
    column_only_sets: Vec<IndexSet<FieldId>>,
    /// Symbols of each grouping set, complex expressions included.
    grouping_sets: Vec<Vec<Symbol>>,
    group_id_symbol: Option<Symbol>,
}

/// Plans GROUP BY, aggregate functions and GROUPING operations.
#[derive(Debug)]
pub struct AggregatePlanner;

impl AggregatePlanner {
    pub fn plan_aggregate<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        spec: &QuerySpecification,
    ) -> Result<PlanBuilder<'a>> {
        let analysis = env.analysis;
        let aggregation = match analysis.aggregation(spec.id) {
            Some(aggregation) if analysis.is_aggregation(spec.id) => aggregation,
            _ => return Ok(builder),
        };
        trace!(
            spec = %spec.id,
            aggregates = aggregation.aggregates.len(),
            "planning aggregation"
        );

        let calls = aggregation
            .aggregates
            .iter()
            .map(function_call)
            .collect::<Result<Vec<_>>>()?;

        let mut inputs: Vec<&AstExpr> = Vec::new();
        // Lambdas are evaluated by the aggregate itself.
        inputs.extend(
            calls
                .iter()
                .flat_map(|(_, call)| call.args.iter())
                .filter(|arg| !arg.is_lambda()),
        );
        inputs.extend(
            calls
                .iter()
                .flat_map(|(_, call)| call.order_by.iter())
                .map(|item| &item.key),
        );
        inputs.extend(
            calls
                .iter()
                .filter_map(|(_, call)| call.filter.as_deref()),
        );
        inputs.extend(aggregation.grouping_sets.complex_expressions.iter());

        let builder = handle_subqueries(env, ctx, builder, inputs.iter().copied())?;
        let builder = builder.append_projections(ctx, inputs.iter().copied())?;

        // The same expression may be coerced differently depending on which
        // aggregate reads it, so coercions get their own symbols.
        let (builder, coerced) = coerce(builder, ctx, inputs.iter().copied())?.into_parts();

        let distinct = spec.group_by.as_ref().is_some_and(|g| g.distinct);
        let grouping = self.plan_grouping_sets(ctx, builder, &aggregation.grouping_sets, distinct)?;

        let builder = self.plan_aggregation(
            ctx,
            grouping.builder,
            &grouping.grouping_sets,
            grouping.group_id_symbol.clone(),
            &calls,
            &coerced,
        )?;

        self.plan_grouping_operations(
            ctx,
            builder,
            &aggregation.grouping_operations,
            grouping.group_id_symbol.as_ref(),
            &grouping.column_only_sets,
        )
    }

    fn plan_grouping_sets<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        analysis: &GroupingSetAnalysis,
        distinct: bool,
    ) -> Result<GroupingSetsPlan<'a>> {
        let input_fields = builder.translations().field_symbols();

        // New symbols for grouped columns. These hold null for rows of a
        // grouping set not containing the column, and become the fields
        // seen by anything planned after aggregation. Fields not grouped on
        // are no longer available.
        let mut fields: Vec<Option<Symbol>> = vec![None; input_fields.len()];
        let mut grouping_columns: IndexMap<Symbol, Symbol> = IndexMap::new();
        for field in analysis.all_fields() {
            let input = input_fields
                .get(field.index)
                .and_then(|s| s.clone())
                .required("symbol for grouping column")?;
            let output = ctx.symbols.new_symbol_like(&input);
            fields[field.index] = Some(output.clone());
            grouping_columns.insert(output, input);
        }

        let mut complex: IndexMap<ScopeAwareKey, Symbol> = IndexMap::new();
        for complex_expr in &analysis.complex_expressions {
            let key = builder.translations().key(complex_expr);
            if complex.contains_key(&key) {
                continue;
            }
            let input = builder.translate(complex_expr)?;
            let output = ctx.symbols.new_symbol_like(&input);
            complex.insert(key, output.clone());
            grouping_columns.insert(output, input);
        }

        // Enumerate on field identity so that `t.a` and `a` are the same
        // column, then add complex expressions to every set.
        let column_only_sets = enumerate_grouping_sets(analysis, distinct)?;
        let grouping_sets = column_only_sets
            .iter()
            .map(|set| {
                set.iter()
                    .map(|field| {
                        fields
                            .get(field.index)
                            .and_then(|s| s.clone())
                            .required("symbol for grouped field")
                    })
                    .chain(complex.values().cloned().map(Ok))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut mappings = HashMap::with_capacity(complex.len());
        mappings.extend(complex);
        let translations = builder.translations().with_new_mappings(mappings, fields);

        let input_symbols = builder.root().output_symbols();
        let id = ctx.next_id();
        let group_id_symbol = if grouping_sets.len() > 1 {
            Some(ctx.new_symbol("groupid", DataType::Int64))
        } else {
            None
        };

        let builder = builder
            .map_root(|root| match &group_id_symbol {
                Some(group_id) => LogicalOperator::GroupId(Node::new(
                    id,
                    LogicalGroupId {
                        grouping_sets: grouping_sets.clone(),
                        grouping_columns,
                        aggregation_arguments: input_symbols,
                        group_id_symbol: group_id.clone(),
                    },
                    vec![root],
                )),
                None => {
                    let mut assignments = Assignments::identity(&input_symbols);
                    for (output, input) in &grouping_columns {
                        assignments.put(output.clone(), expr::sym(input));
                    }
                    LogicalOperator::Project(Node::new(
                        id,
                        LogicalProject { assignments },
                        vec![root],
                    ))
                }
            })
            .with_translations(translations);

        Ok(GroupingSetsPlan {
            builder,
            column_only_sets,
            grouping_sets,
            group_id_symbol,
        })
    }

    fn plan_aggregation<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        grouping_sets: &[Vec<Symbol>],
        group_id_symbol: Option<Symbol>,
        calls: &[(&AstExpr, &FunctionCall)],
        coercions: &HashMap<NodeId, Symbol>,
    ) -> Result<PlanBuilder<'a>> {
        let analysis = builder.analysis();
        let mut aggregations = IndexMap::new();
        let mut mappings = Vec::new();

        for (function, call) in calls {
            // sum(x) twice is computed once.
            let key = builder.translations().key(function);
            if mappings.iter().any(|(existing, _)| existing == &key) {
                continue;
            }

            let symbol = ctx.new_symbol(name_hint(function), analysis.datatype(function.id)?.clone());

            let arguments = call
                .args
                .iter()
                .map(|arg| {
                    if arg.is_lambda() {
                        builder.rewrite(arg)
                    } else {
                        Ok(expr::sym(coerced(coercions, arg)?))
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            let filter = match &call.filter {
                Some(filter) => Some(coerced(coercions, filter)?.clone()),
                None => None,
            };

            let ordering = if call.order_by.is_empty() {
                None
            } else {
                let keys = call
                    .order_by
                    .iter()
                    .map(|item| {
                        Ok((
                            coerced(coercions, &item.key)?.clone(),
                            SortOrder::new(item.desc, item.nulls_first),
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(OrderingScheme::new(keys))
            };

            aggregations.insert(
                symbol.clone(),
                Aggregation {
                    function: analysis.resolved_function(function.id)?.clone(),
                    arguments,
                    distinct: call.distinct,
                    filter,
                    ordering,
                },
            );
            mappings.push((key, symbol));
        }

        let global_grouping_sets = grouping_sets
            .iter()
            .enumerate()
            .filter(|(_, set)| set.is_empty())
            .map(|(idx, _)| idx)
            .collect();

        let mut grouping_keys: IndexSet<Symbol> = grouping_sets.iter().flatten().cloned().collect();
        if let Some(group_id) = &group_id_symbol {
            grouping_keys.insert(group_id.clone());
        }

        let aggregate = LogicalAggregate {
            aggregations,
            grouping_sets: GroupingSetDescriptor {
                grouping_keys: grouping_keys.into_iter().collect(),
                grouping_set_count: grouping_sets.len(),
                global_grouping_sets,
            },
            group_id_symbol,
        };

        let id = ctx.next_id();
        let translations = builder.translations().with_additional_mappings(mappings);
        Ok(builder
            .map_root(|root| LogicalOperator::Aggregate(Node::new(id, aggregate, vec![root])))
            .with_translations(translations))
    }

    fn plan_grouping_operations<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        operations: &[AstExpr],
        group_id_symbol: Option<&Symbol>,
        grouping_sets: &[IndexSet<FieldId>],
    ) -> Result<PlanBuilder<'a>> {
        if operations.is_empty() {
            return Ok(builder);
        }

        let descriptor: Vec<IndexSet<usize>> = grouping_sets
            .iter()
            .map(|set| set.iter().map(|field| field.index).collect())
            .collect();

        builder.append_projections_with(
            ctx,
            operations,
            |translations, operation| {
                rewrite_grouping_operation(
                    translations.analysis(),
                    operation,
                    &descriptor,
                    group_id_symbol,
                )
            },
            |_, _| false,
        )
    }
}

fn coerced<'m>(coercions: &'m HashMap<NodeId, Symbol>, input: &AstExpr) -> Result<&'m Symbol> {
    coercions.get(&input.id).ok_or_else(|| {
        DbError::new("No coerced symbol for aggregate input").with_field("node", input.id)
    })
}

fn function_call(expr: &AstExpr) -> Result<(&AstExpr, &FunctionCall)> {
    match &expr.kind {
        AstExprKind::Function(call) => Ok((expr, call)),
        _ => Err(DbError::new("Aggregate is not a function call").with_field("node", expr.id)),
    }
}

/// Rewrite `GROUPING(c1, ..., cn)` into the bitmask for the grouping set
/// that produced each row.
///
/// Bit `n - 1 - i` is set when `ci` is not in the grouping set.
pub fn rewrite_grouping_operation(
    analysis: &Analysis,
    operation: &AstExpr,
    grouping_sets: &[IndexSet<usize>],
    group_id_symbol: Option<&Symbol>,
) -> Result<Expression> {
    let columns = match &operation.kind {
        AstExprKind::Grouping(columns) => columns,
        _ => {
            return Err(
                DbError::new("Expected GROUPING operation").with_field("node", operation.id)
            );
        }
    };

    let group_id = match group_id_symbol {
        Some(group_id) => group_id,
        None => return Ok(expr::lit(0_i64)),
    };

    let indices = columns
        .iter()
        .map(|column| {
            analysis
                .column_reference(column.id)
                .map(|field| field.field.index)
                .ok_or_else(|| {
                    DbError::new("GROUPING argument is not a column reference")
                        .with_field("node", column.id)
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let cases = grouping_sets
        .iter()
        .enumerate()
        .map(|(set_idx, set)| {
            Ok(WhenThen {
                when: expr::compare(
                    ComparisonOperator::Eq,
                    expr::sym(group_id),
                    expr::lit(set_idx as i64),
                ),
                then: expr::lit(grouping_bitmask(set, &indices)?),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Expression::Case(CaseExpr::try_new(
        cases,
        Some(expr::typed_null(DataType::Int64)),
    )?))
}

/// Maximum number of GROUPING arguments that fit the bitmask.
const MAX_GROUPING_ARGUMENTS: usize = 63;

fn grouping_bitmask(set: &IndexSet<usize>, columns: &[usize]) -> Result<i64> {
    let len = columns.len();
    if len > MAX_GROUPING_ARGUMENTS {
        return Err(DbError::query("Too many arguments to GROUPING")
            .with_field("arguments", len)
            .with_field("max", MAX_GROUPING_ARGUMENTS));
    }

    let mut grouping = i64::MAX >> (MAX_GROUPING_ARGUMENTS - len);
    for (idx, column) in columns.iter().enumerate() {
        if set.contains(column) {
            grouping &= !(1_i64 << (len - 1 - idx));
        }
    }
    Ok(grouping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(indices: &[usize]) -> IndexSet<usize> {
        indices.iter().copied().collect()
    }

    #[test]
    fn bitmask_most_significant_first() {
        // GROUPING(a, b) with columns a=0, b=1
        assert_eq!(0, grouping_bitmask(&set(&[0, 1]), &[0, 1]).unwrap());
        assert_eq!(1, grouping_bitmask(&set(&[0]), &[0, 1]).unwrap());
        assert_eq!(2, grouping_bitmask(&set(&[1]), &[0, 1]).unwrap());
        assert_eq!(3, grouping_bitmask(&set(&[]), &[0, 1]).unwrap());
    }

    #[test]
    fn bitmask_ignores_unrelated_columns() {
        assert_eq!(0, grouping_bitmask(&set(&[4, 2]), &[2]).unwrap());
        assert_eq!(1, grouping_bitmask(&set(&[4]), &[2]).unwrap());
    }

    #[test]
    fn bitmask_argument_limit() {
        let columns: Vec<usize> = (0..MAX_GROUPING_ARGUMENTS).collect();
        assert_eq!(i64::MAX, grouping_bitmask(&set(&[]), &columns).unwrap());

        let columns: Vec<usize> = (0..=MAX_GROUPING_ARGUMENTS).collect();
        let err = grouping_bitmask(&set(&[]), &columns).unwrap_err();
        assert_eq!(relplan_error::ErrorKind::Query, err.kind());
    }
}
