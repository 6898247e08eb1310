use relplan_error::{DbError, OptionExt, Result, not_implemented};
use tracing::trace;

use super::PlannerEnv;
use super::plan_builder::PlanBuilder;
use super::plan_query::{QueryPlanner, distinct_node};
use super::plan_recursive::RecursivePlanner;
use super::relation_plan::RelationPlan;
use super::subquery::handle_subqueries;
use super::translation::{TranslationMap, coerce_if_necessary};
use crate::analysis::ast::{AstExpr, AstExprKind, Join, Relation, TableRef, Union, Values};
use crate::analysis::scope::ScopeId;
use crate::expr;
use crate::logical::context::PlanContext;
use crate::logical::logical_filter::LogicalFilter;
use crate::logical::logical_join::{JoinType, LogicalJoin};
use crate::logical::logical_scan::LogicalScan;
use crate::logical::logical_setop::LogicalUnion;
use crate::logical::logical_values::LogicalValues;
use crate::logical::operator::{LogicalOperator, Node};
use crate::types::datatype::DataType;

/// Plans relations appearing in FROM, set operations and row mutation
/// targets.
#[derive(Debug)]
pub struct RelationPlanner;

impl RelationPlanner {
    pub fn plan_relation<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        relation: &Relation,
    ) -> Result<RelationPlan<'a>> {
        match relation {
            Relation::Table(table) => self.plan_table(env, ctx, table),
            Relation::Aliased { id, relation, .. } => {
                let plan = self.plan_relation(env, ctx, relation)?;
                Ok(RelationPlan::new(
                    plan.root,
                    env.analysis.scope_of(*id)?,
                    plan.fields,
                    env.outer_context.clone(),
                ))
            }
            Relation::Subquery(query) => QueryPlanner.plan_query(env, ctx, query),
            Relation::Join(join) => self.plan_join(env, ctx, join),
            Relation::Values(values) => self.plan_values(env, ctx, values),
            Relation::Union(union) => self.plan_union(env, ctx, union),
            Relation::QuerySpecification(spec) => QueryPlanner.plan_spec(env, ctx, spec),
        }
    }

    pub fn plan_table<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        table: &TableRef,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;
        let scope = analysis.scope_of(table.id)?;

        // Reference back to a recursive query being expanded.
        if let Some(plan) = env.recursive_subqueries.get(&table.id) {
            trace!(table = %table.name, "substituting recursive reference");
            return Ok(RelationPlan::new(
                plan.root.clone(),
                scope,
                plan.fields.clone(),
                plan.outer_context.clone(),
            ));
        }

        if let Some(query) = analysis.named_query(table.id) {
            let plan = if analysis.is_expandable_query(query.id) {
                RecursivePlanner.plan_expand(env, ctx, query)?
            } else {
                QueryPlanner.plan_query(env, ctx, query)?
            };
            return Ok(RelationPlan::new(
                plan.root,
                scope,
                plan.fields,
                env.outer_context.clone(),
            ));
        }

        let handle = analysis.table(table.id)?;
        let relation_type = analysis.relation_type(scope)?;

        let mut columns = Vec::with_capacity(relation_type.all_field_count());
        for field in relation_type.all_fields() {
            let column = field.column.clone().required("column handle for table field")?;
            let symbol = ctx.new_symbol(
                field.name.as_deref().unwrap_or(&column.name),
                field.datatype.clone(),
            );
            columns.push((symbol, column));
        }
        let fields = columns.iter().map(|(symbol, _)| symbol.clone()).collect();

        let scan = LogicalOperator::Scan(Node::new(
            ctx.next_id(),
            LogicalScan {
                table: handle.clone(),
                columns,
                update_target: analysis.is_update_target(table.id),
            },
            Vec::new(),
        ));

        Ok(RelationPlan::new(
            scan,
            scope,
            fields,
            env.outer_context.clone(),
        ))
    }

    /// Plan a join between two already planned relations.
    ///
    /// Fields of the result are the left fields followed by the right
    /// fields.
    #[allow(clippy::too_many_arguments)]
    pub fn plan_join_relations<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        join_type: JoinType,
        condition: Option<&AstExpr>,
        scope: ScopeId,
        left: RelationPlan<'a>,
        right: RelationPlan<'a>,
    ) -> Result<RelationPlan<'a>> {
        let mut fields = left.fields;
        fields.extend(right.fields);

        let translations = TranslationMap::new(
            env.analysis,
            env.outer_context.clone(),
            scope,
            fields.iter().cloned().map(Some).collect(),
        );

        let condition = match condition {
            Some(condition) => condition,
            None => {
                let join = LogicalOperator::Join(Node::new(
                    ctx.next_id(),
                    LogicalJoin {
                        join_type,
                        condition: None,
                    },
                    vec![left.root, right.root],
                ));
                return Ok(RelationPlan::new(
                    join,
                    scope,
                    fields,
                    env.outer_context.clone(),
                ));
            }
        };

        let mut subqueries = Vec::new();
        condition.collect_subqueries(&mut subqueries);

        if subqueries.is_empty() {
            let join = LogicalOperator::Join(Node::new(
                ctx.next_id(),
                LogicalJoin {
                    join_type,
                    condition: Some(translations.rewrite(condition)?),
                },
                vec![left.root, right.root],
            ));
            return Ok(RelationPlan::new(
                join,
                scope,
                fields,
                env.outer_context.clone(),
            ));
        }

        // Subqueries in the condition are planned on top of a cross join,
        // which only preserves semantics for inner joins.
        if !matches!(join_type, JoinType::Inner | JoinType::Cross) {
            not_implemented!("subqueries in the condition of a {join_type} join");
        }

        let cross = LogicalOperator::Join(Node::new(
            ctx.next_id(),
            LogicalJoin {
                join_type: JoinType::Cross,
                condition: None,
            },
            vec![left.root, right.root],
        ));
        let builder = PlanBuilder::new(translations, cross);
        let builder = handle_subqueries(env, ctx, builder, [condition])?;
        let predicate = builder.rewrite(condition)?;
        let filter = LogicalOperator::Filter(Node::new(
            ctx.next_id(),
            LogicalFilter { predicate },
            vec![builder.into_root()],
        ));

        Ok(RelationPlan::new(
            filter,
            scope,
            fields,
            env.outer_context.clone(),
        ))
    }

    fn plan_join<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        join: &Join,
    ) -> Result<RelationPlan<'a>> {
        let left = self.plan_relation(env, ctx, &join.left)?;
        let right = self.plan_relation(env, ctx, &join.right)?;
        let scope = env.analysis.scope_of(join.id)?;
        self.plan_join_relations(
            env,
            ctx,
            join.join_type,
            join.condition.as_ref(),
            scope,
            left,
            right,
        )
    }

    fn plan_values<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        values: &Values,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;
        let scope = analysis.scope_of(values.id)?;
        let relation_type = analysis.relation_type(scope)?;

        let outputs: Vec<_> = relation_type
            .visible_field_indices()
            .filter_map(|idx| relation_type.field(idx))
            .map(|field| {
                ctx.new_symbol(
                    field.name.as_deref().unwrap_or("field"),
                    field.datatype.clone(),
                )
            })
            .collect();

        // Row expressions only see the enclosing query.
        let row_scope = analysis.implicit_from_scope(values.id).unwrap_or(scope);
        let translations = TranslationMap::new(
            analysis,
            env.outer_context.clone(),
            row_scope,
            Vec::new(),
        );

        let mut rows = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            let rewritten = match &row.kind {
                AstExprKind::Row(items) => items
                    .iter()
                    .map(|item| {
                        Ok(coerce_if_necessary(
                            analysis,
                            item,
                            translations.rewrite(item)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => {
                    let value =
                        coerce_if_necessary(analysis, row, translations.rewrite(row)?);
                    match analysis.datatype(row.id)? {
                        DataType::Struct(meta) if outputs.len() > 1 => (0..meta.fields.len())
                            .map(|idx| expr::field_access(value.clone(), idx))
                            .collect(),
                        _ => vec![value],
                    }
                }
            };
            if rewritten.len() != outputs.len() {
                return Err(DbError::new("VALUES row does not match relation arity")
                    .with_field("expected", outputs.len())
                    .with_field("got", rewritten.len()));
            }
            rows.push(rewritten);
        }

        let fields = outputs.clone();
        let root = LogicalOperator::Values(Node::new(
            ctx.next_id(),
            LogicalValues { outputs, rows },
            Vec::new(),
        ));

        Ok(RelationPlan::new(
            root,
            scope,
            fields,
            env.outer_context.clone(),
        ))
    }

    fn plan_union<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        union: &Union,
    ) -> Result<RelationPlan<'a>> {
        let analysis = env.analysis;
        let scope = analysis.scope_of(union.id)?;
        let relation_type = analysis.relation_type(scope)?;

        let outputs: Vec<_> = relation_type
            .visible_field_indices()
            .filter_map(|idx| relation_type.field(idx))
            .map(|field| {
                ctx.new_symbol(
                    field.name.as_deref().unwrap_or("field"),
                    field.datatype.clone(),
                )
            })
            .collect();

        let mut inputs = Vec::with_capacity(union.relations.len());
        let mut children = Vec::with_capacity(union.relations.len());
        for relation in &union.relations {
            let plan = self.plan_relation(env, ctx, relation)?;
            let (root, fields) =
                plan.coerce_or_prune(ctx, analysis, analysis.relation_coercion(relation.id()))?;
            inputs.push(fields);
            children.push(root);
        }

        let fields = outputs.clone();
        let mut root = LogicalOperator::Union(Node::new(
            ctx.next_id(),
            LogicalUnion::try_new(outputs, inputs)?,
            children,
        ));
        if union.distinct {
            root = distinct_node(ctx, root, fields.clone());
        }

        Ok(RelationPlan::new(
            root,
            scope,
            fields,
            env.outer_context.clone(),
        ))
    }
}
