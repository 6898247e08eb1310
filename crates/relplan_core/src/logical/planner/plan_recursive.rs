use ahash::{HashMap, HashMapExt};
use indexmap::IndexMap;
use relplan_error::{DbError, Result};
use tracing::debug;

use super::PlannerEnv;
use super::plan_from::RelationPlanner;
use super::plan_query::distinct_node;
use super::relation_plan::{RelationPlan, disambiguate_outputs};
use crate::analysis::ast::{Query, Relation};
use crate::expr;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::functions::builtin;
use crate::logical::context::{PlanContext, PlanNodeId};
use crate::logical::logical_filter::LogicalFilter;
use crate::logical::logical_setop::LogicalUnion;
use crate::logical::logical_window::{
    LogicalWindow,
    WindowFrame,
    WindowFunction,
    WindowSpecification,
};
use crate::logical::operator::{LogicalOperator, Node};
use crate::logical::plan_copier::PlanCopier;
use crate::logical::rewrite::{NodeAndMappings, replace_node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;

/// Expands recursive WITH queries into a fixed number of unrolled steps.
///
/// The anchor and each unrolled step are unioned together. One extra step
/// after the last fails the query if it produces any rows, since that means
/// the recursion did not converge within the configured depth.
#[derive(Debug)]
pub struct RecursivePlanner;

impl RecursivePlanner {
    pub fn plan_expand<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        query: &Query,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;
        if !analysis.is_expandable_query(query.id) {
            return Err(
                DbError::new("Query is not registered as expandable").with_field("query", query.id)
            );
        }
        let union = match &query.body {
            Relation::Union(union) if union.relations.len() == 2 => union,
            _ => {
                return Err(DbError::new(
                    "Expandable query must be a union of an anchor and a recursion step",
                )
                .with_field("query", query.id));
            }
        };
        let (anchor_relation, step_relation) = (&union.relations[0], &union.relations[1]);

        // Anchor pruned to its visible fields, each a distinct symbol so it
        // can be referenced by the recursion step.
        let anchor = RelationPlanner.plan_relation(env, ctx, anchor_relation)?;
        let anchor_fields = anchor.visible_fields(analysis)?;
        let anchor_root = anchor.prune_invisible_fields(ctx, analysis)?;
        let (anchor_root, anchor_fields) = disambiguate_outputs(ctx, anchor_root, anchor_fields);
        let anchor = RelationPlan::new(
            anchor_root,
            analysis.scope_of(query.id)?,
            anchor_fields,
            env.outer_context.clone(),
        );

        let mut steps = vec![copy(ctx, &anchor.root, &anchor.fields)?];

        let mut substitutions = HashMap::with_capacity(1);
        substitutions.insert(analysis.recursive_reference(query.id)?, anchor.clone());
        let step_env = env.with_recursive_subqueries(substitutions);
        let step = RelationPlanner.plan_relation(&step_env, ctx, step_relation)?;
        let (mut step_root, step_fields) =
            step.coerce_or_prune(ctx, analysis, analysis.relation_coercion(step_relation.id()))?;

        // Each iteration nests a fresh copy of the step where the previous
        // copy (initially the anchor) was referenced.
        let depth = env.config.max_recursion_depth;
        let mut spot: (PlanNodeId, Vec<Symbol>) = (anchor.root.id(), anchor.fields.clone());
        for _ in 0..depth {
            steps.push(copy(ctx, &step_root, &step_fields)?);
            let replacement = copy(ctx, &step_root, &step_fields)?;
            step_root = replace_node(ctx, step_root, spot.0, &spot.1, &replacement)?;
            spot = (replacement.root.id(), replacement.fields);
        }

        let check = copy(ctx, &step_root, &step_fields)?;
        steps.push(convergence_check(ctx, check, depth)?);

        let outputs: Vec<Symbol> = anchor
            .fields
            .iter()
            .map(|field| {
                ctx.new_symbol(&format!("{}_expanded", field.name()), field.datatype().clone())
            })
            .collect();

        let (children, inputs): (Vec<_>, Vec<_>) =
            steps.into_iter().map(|step| (step.root, step.fields)).unzip();
        let mut root = LogicalOperator::Union(Node::new(
            ctx.next_id(),
            LogicalUnion::try_new(outputs.clone(), inputs)?,
            children,
        ));
        if union.distinct {
            root = distinct_node(ctx, root, outputs.clone());
        }

        debug!(
            query = %query.id,
            depth,
            nodes = root.node_count(),
            "expanded recursive query"
        );

        Ok(RelationPlan::new(
            root,
            anchor.scope,
            outputs,
            env.outer_context.clone(),
        ))
    }
}

fn copy(ctx: &mut PlanContext, root: &LogicalOperator, fields: &[Symbol]) -> Result<NodeAndMappings> {
    let copied = PlanCopier::copy_plan(ctx, root, fields)?;
    Ok(NodeAndMappings::new(copied.root, copied.fields))
}

/// Fail the query if the step after the last unrolled one produces any row.
fn convergence_check(
    ctx: &mut PlanContext,
    step: NodeAndMappings,
    depth: u64,
) -> Result<NodeAndMappings> {
    let count = ctx.new_symbol("count", DataType::Int64);
    let mut functions = IndexMap::with_capacity(1);
    functions.insert(
        count.clone(),
        WindowFunction {
            function: builtin::count_star_window(),
            arguments: Vec::new(),
            frame: WindowFrame::DEFAULT,
            ignore_nulls: false,
        },
    );
    let window = LogicalOperator::Window(Node::new(
        ctx.next_id(),
        LogicalWindow {
            specification: WindowSpecification::default(),
            functions,
        },
        vec![step.root],
    ));

    let message = format!(
        "Recursion depth limit exceeded ({depth}). Use 'max_recursion_depth' session property to modify the limit."
    );
    let predicate = expr::if_then_else(
        expr::compare(ComparisonOperator::GtEq, expr::sym(&count), expr::lit(0_i64)),
        expr::fail_as_boolean(message),
        expr::lit(true),
    )?;
    let filter = LogicalOperator::Filter(Node::new(
        ctx.next_id(),
        LogicalFilter { predicate },
        vec![window],
    ));

    Ok(NodeAndMappings::new(filter, step.fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::consteval::{RowBindings, eval};
    use crate::logical::logical_values::LogicalValues;
    use crate::types::scalar::ScalarValue;

    #[test]
    fn convergence_check_fails_on_any_row() {
        let mut ctx = PlanContext::new();
        let a = ctx.new_symbol("a", DataType::Int32);
        let values = LogicalOperator::Values(Node::new(
            ctx.next_id(),
            LogicalValues {
                outputs: vec![a.clone()],
                rows: Vec::new(),
            },
            Vec::new(),
        ));

        let checked = convergence_check(&mut ctx, NodeAndMappings::new(values, vec![a.clone()]), 4)
            .unwrap();
        assert_eq!(vec![a], checked.fields);

        let (predicate, count) = match &checked.root {
            LogicalOperator::Filter(filter) => {
                let window = match &filter.children[0] {
                    LogicalOperator::Window(window) => window,
                    other => panic!("unexpected child: {other:?}"),
                };
                let count = window.node.functions.keys().next().unwrap().clone();
                (filter.node.predicate.clone(), count)
            }
            other => panic!("unexpected root: {other:?}"),
        };

        let mut bindings = RowBindings::default();
        bindings.insert(count, ScalarValue::Int64(1));
        let err = eval(&predicate, &bindings).unwrap_err();
        assert!(err.is_query_error());
        assert!(err.get_msg().contains("Recursion depth limit exceeded (4)"));
        assert_eq!(3, checked.root.node_count());
    }
}
