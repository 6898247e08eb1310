use indexmap::{IndexMap, IndexSet};
use relplan_error::Result;
use tracing::trace;

use super::PlannerEnv;
use super::plan_aggregate::AggregatePlanner;
use super::plan_builder::PlanBuilder;
use super::plan_from::RelationPlanner;
use super::plan_window::WindowPlanner;
use super::relation_plan::RelationPlan;
use super::subquery::handle_subqueries;
use super::translation::TranslationMap;
use crate::analysis::ast::{AstExpr, Limit, Offset, OrderBy, Query, QuerySpecification};
use crate::logical::context::PlanContext;
use crate::logical::logical_aggregate::{GroupingSetDescriptor, LogicalAggregate};
use crate::logical::logical_filter::LogicalFilter;
use crate::logical::logical_limit::{LogicalLimit, LogicalOffset};
use crate::logical::logical_order::{LogicalSort, OrderingScheme, SortOrder};
use crate::logical::logical_values::LogicalValues;
use crate::logical::operator::{LogicalOperator, Node};
use crate::logical::symbol::Symbol;

/// Plans queries and query specifications.
#[derive(Debug)]
pub struct QueryPlanner;

impl QueryPlanner {
    /// Plan a query: its body followed by ORDER BY, OFFSET and LIMIT.
    pub fn plan_query<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        query: &Query,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;

        let body = RelationPlanner.plan_relation(env, ctx, &query.body)?;
        let outputs = body.visible_fields(analysis)?;
        let builder = PlanBuilder::from_relation_plan(analysis, body);

        let order_by = analysis.order_by_expressions(query.id);
        let builder = handle_subqueries(env, ctx, builder, order_by)?;
        let builder = builder.append_projections(ctx, order_by)?;

        let ordering = self.ordering_scheme(env, &builder, query.order_by.as_ref(), order_by)?;
        let builder = self.sort(ctx, builder, ordering.as_ref());
        let builder = self.offset(ctx, builder, query.offset);
        let builder = self.limit(ctx, builder, query.limit, ordering.as_ref());

        Ok(RelationPlan::new(
            builder.into_root(),
            analysis.scope_of(query.id)?,
            outputs,
            env.outer_context.clone(),
        ))
    }

    /// Plan a single SELECT block.
    pub fn plan_spec<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        spec: &QuerySpecification,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;
        trace!(spec = %spec.id, "planning query specification");

        let builder = self.plan_from(env, ctx, spec)?;
        let builder = self.filter(env, ctx, builder, spec.where_clause.as_ref())?;
        let builder = AggregatePlanner.plan_aggregate(env, ctx, builder, spec)?;
        let builder = self.filter(env, ctx, builder, spec.having.as_ref())?;
        let builder =
            WindowPlanner.plan_windows(env, ctx, builder, analysis.window_functions(spec.id))?;

        let select = analysis.select_expressions(spec.id)?;
        let select_exprs: Vec<&AstExpr> = select.iter().map(|s| &s.expr).collect();
        let mut builder = handle_subqueries(env, ctx, builder, select_exprs.iter().copied())?;

        // Values that unfold into several outputs are computed once.
        if select.iter().any(|s| s.unfolded.is_some()) {
            builder = builder.append_projections(ctx, select_exprs.iter().copied())?;
        }
        let outputs: Vec<&AstExpr> = select
            .iter()
            .flat_map(|s| match &s.unfolded {
                Some(unfolded) => unfolded.iter().collect(),
                None => vec![&s.expr],
            })
            .collect();

        if let Some(order_by) = &spec.order_by {
            if analysis.is_aggregation(spec.id) {
                builder = builder.append_projections(ctx, analysis.order_by_aggregates(order_by.id))?;
            }
            builder = builder.append_projections(ctx, outputs.iter().copied())?;

            // ORDER BY sees the fields of FROM followed by the select outputs.
            let mut fields = builder.translations().field_symbols().to_vec();
            for output in &outputs {
                fields.push(Some(builder.translate(output)?));
            }
            builder = builder.with_scope(analysis.scope_of(order_by.id)?, fields);

            builder = WindowPlanner.plan_windows(
                env,
                ctx,
                builder,
                analysis.order_by_window_functions(order_by.id),
            )?;
        }

        let order_by = analysis.order_by_expressions(spec.id);
        let builder = handle_subqueries(env, ctx, builder, order_by)?;
        let builder =
            builder.append_projections(ctx, order_by.iter().chain(outputs.iter().copied()))?;

        let builder = self.distinct(ctx, builder, spec.select.distinct, &outputs)?;
        let ordering = self.ordering_scheme(env, &builder, spec.order_by.as_ref(), order_by)?;
        let builder = self.sort(ctx, builder, ordering.as_ref());
        let builder = self.offset(ctx, builder, spec.offset);
        let builder = self.limit(ctx, builder, spec.limit, ordering.as_ref());
        let builder = builder.append_projections(ctx, outputs.iter().copied())?;

        let fields = outputs
            .iter()
            .map(|output| builder.translate(output))
            .collect::<Result<Vec<_>>>()?;

        Ok(RelationPlan::new(
            builder.into_root(),
            analysis.scope_of(spec.id)?,
            fields,
            env.outer_context.clone(),
        ))
    }

    fn plan_from<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        spec: &QuerySpecification,
    ) -> Result<PlanBuilder<'a>> {
        match &spec.from {
            Some(from) => {
                let plan = RelationPlanner.plan_relation(env, ctx, from)?;
                Ok(PlanBuilder::from_relation_plan(env.analysis, plan))
            }
            None => {
                let translations = TranslationMap::new(
                    env.analysis,
                    env.outer_context.clone(),
                    env.analysis.implicit_from_scope(spec.id)?,
                    Vec::new(),
                );
                let values = LogicalOperator::Values(Node::new(
                    ctx.next_id(),
                    LogicalValues::single_row(),
                    Vec::new(),
                ));
                Ok(PlanBuilder::new(translations, values))
            }
        }
    }

    /// Filter the plan on a WHERE or HAVING predicate.
    pub fn filter<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        predicate: Option<&AstExpr>,
    ) -> Result<PlanBuilder<'a>> {
        let predicate = match predicate {
            Some(predicate) => predicate,
            None => return Ok(builder),
        };

        let builder = handle_subqueries(env, ctx, builder, [predicate])?;
        let predicate = builder.rewrite(predicate)?;
        let id = ctx.next_id();
        Ok(builder.map_root(|root| {
            LogicalOperator::Filter(Node::new(id, LogicalFilter { predicate }, vec![root]))
        }))
    }

    fn distinct<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        distinct: bool,
        outputs: &[&AstExpr],
    ) -> Result<PlanBuilder<'a>> {
        if !distinct {
            return Ok(builder);
        }
        let symbols = outputs
            .iter()
            .map(|output| builder.translate(output))
            .collect::<Result<Vec<_>>>()?;
        Ok(builder.map_root(|root| distinct_node(ctx, root, symbols)))
    }

    /// Ordering for an ORDER BY clause.
    ///
    /// None if there's no ORDER BY, or it's known to be redundant and
    /// redundant sorts are skipped.
    fn ordering_scheme(
        &self,
        env: &PlannerEnv<'_>,
        builder: &PlanBuilder<'_>,
        order_by: Option<&OrderBy>,
        keys: &[AstExpr],
    ) -> Result<Option<OrderingScheme>> {
        let order_by = match order_by {
            Some(order_by) => order_by,
            None => return Ok(None),
        };
        if env.config.skip_redundant_sort && env.analysis.is_order_by_redundant(order_by.id) {
            trace!(order_by = %order_by.id, "skipping redundant ORDER BY");
            return Ok(None);
        }

        let mut orderings = Vec::with_capacity(keys.len());
        for (key, item) in keys.iter().zip(&order_by.items) {
            let symbol = builder.translate(key)?;
            orderings.push((symbol, SortOrder::new(item.desc, item.nulls_first)));
        }

        Ok(Some(OrderingScheme::new(orderings)))
    }

    fn sort<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        ordering: Option<&OrderingScheme>,
    ) -> PlanBuilder<'a> {
        match ordering {
            Some(ordering) => {
                let id = ctx.next_id();
                builder.map_root(|root| {
                    LogicalOperator::Sort(Node::new(
                        id,
                        LogicalSort {
                            ordering: ordering.clone(),
                        },
                        vec![root],
                    ))
                })
            }
            None => builder,
        }
    }

    fn offset<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        offset: Option<Offset>,
    ) -> PlanBuilder<'a> {
        match offset {
            Some(offset) => {
                let id = ctx.next_id();
                builder.map_root(|root| {
                    LogicalOperator::Offset(Node::new(
                        id,
                        LogicalOffset {
                            count: offset.count,
                        },
                        vec![root],
                    ))
                })
            }
            None => builder,
        }
    }

    fn limit<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        limit: Option<Limit>,
        ordering: Option<&OrderingScheme>,
    ) -> PlanBuilder<'a> {
        // LIMIT ALL
        let (limit, count) = match limit.and_then(|l| l.count().map(|count| (l, count))) {
            Some(limit) => limit,
            None => return builder,
        };

        let ties = if limit.with_ties() {
            ordering.cloned()
        } else {
            None
        };

        let id = ctx.next_id();
        builder.map_root(|root| {
            LogicalOperator::Limit(Node::new(id, LogicalLimit { count, ties }, vec![root]))
        })
    }
}

/// Remove duplicate rows by grouping on every symbol with no aggregates.
pub fn distinct_node(
    ctx: &mut PlanContext,
    root: LogicalOperator,
    symbols: Vec<Symbol>,
) -> LogicalOperator {
    let keys: IndexSet<Symbol> = symbols.into_iter().collect();
    LogicalOperator::Aggregate(Node::new(
        ctx.next_id(),
        LogicalAggregate {
            aggregations: IndexMap::new(),
            grouping_sets: GroupingSetDescriptor::single(keys.into_iter().collect()),
            group_id_symbol: None,
        },
        vec![root],
    ))
}
