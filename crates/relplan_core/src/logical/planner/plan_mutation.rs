use relplan_error::{DbError, OptionExt, Result};
use tracing::debug;

use super::PlannerEnv;
use super::coerce::coerce;
use super::plan_builder::PlanBuilder;
use super::plan_from::RelationPlanner;
use super::plan_query::QueryPlanner;
use crate::analysis::ast::{AstExpr, Delete, TableRef, Update};
use crate::logical::context::PlanContext;
use crate::logical::logical_mutation::{DeleteTarget, LogicalDelete, LogicalUpdate, UpdateTarget};
use crate::logical::operator::{LogicalOperator, Node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;

/// Plans DELETE and UPDATE statements.
#[derive(Debug)]
pub struct MutationPlanner;

impl MutationPlanner {
    pub fn plan_delete(
        &self,
        env: &PlannerEnv<'_>,
        ctx: &mut PlanContext,
        delete: &Delete,
    ) -> Result<LogicalOperator> {
        let builder = self.scan_target(env, ctx, &delete.table, delete.where_clause.as_ref())?;

        let handle = env.analysis.table(delete.table.id)?;
        let table = env.metadata.require_get_table_metadata(handle)?;
        let row_id = builder
            .field_symbol(env.analysis.row_id_field(delete.table.id)?)?
            .clone();

        debug!(table = %table.table, "planned delete");

        Ok(LogicalOperator::Delete(Node::new(
            ctx.next_id(),
            LogicalDelete {
                target: DeleteTarget { table: table.table },
                row_id,
                outputs: summary_outputs(ctx),
            },
            vec![builder.into_root()],
        )))
    }

    pub fn plan_update(
        &self,
        env: &PlannerEnv<'_>,
        ctx: &mut PlanContext,
        update: &Update,
    ) -> Result<LogicalOperator> {
        let handle = env.analysis.table(update.table.id)?;
        let table = env.metadata.require_get_table_metadata(handle)?;
        let column_handles = env.metadata.get_column_handles(handle)?;

        // Assignments in table column order.
        let mut column_names = Vec::with_capacity(update.assignments.len());
        let mut updated_handles = Vec::with_capacity(update.assignments.len());
        let mut values: Vec<&AstExpr> = Vec::with_capacity(update.assignments.len());
        for column in table.visible_columns() {
            let assignment = match update.assignments.iter().find(|a| a.column == column.name) {
                Some(assignment) => assignment,
                None => continue,
            };
            column_names.push(column.name.clone());
            updated_handles.push(
                column_handles
                    .get(&column.name)
                    .cloned()
                    .required("column handle for updated column")?,
            );
            values.push(&assignment.value);
        }
        if values.len() != update.assignments.len() {
            return Err(DbError::new("UPDATE assigns a column the table doesn't have")
                .with_field("table", &table.table)
                .with_field("assigned", update.assignments.len())
                .with_field("resolved", values.len()));
        }

        let builder = self.scan_target(env, ctx, &update.table, update.where_clause.as_ref())?;
        let builder = builder.append_projections(ctx, values.iter().copied())?;
        let (builder, mappings) = coerce(builder, ctx, values.iter().copied())?.into_parts();

        let row_id = builder
            .field_symbol(env.analysis.row_id_field(update.table.id)?)?
            .clone();
        let mut column_value_and_row_id_symbols = values
            .iter()
            .map(|value| {
                mappings
                    .get(&value.id)
                    .cloned()
                    .required("coerced symbol for assigned value")
            })
            .collect::<Result<Vec<_>>>()?;
        column_value_and_row_id_symbols.push(row_id.clone());

        let root = builder.into_root();
        if root.leftmost_table_scan_id().is_none() {
            return Err(DbError::new("UPDATE plan has no scan of the target table")
                .with_field("table", &table.table));
        }

        debug!(table = %table.table, columns = column_names.len(), "planned update");

        Ok(LogicalOperator::Update(Node::new(
            ctx.next_id(),
            LogicalUpdate {
                target: UpdateTarget {
                    table: table.table,
                    column_names,
                    column_handles: updated_handles,
                },
                row_id,
                column_value_and_row_id_symbols,
                outputs: summary_outputs(ctx),
            },
            vec![root],
        )))
    }

    /// Scan the target table and filter on the WHERE clause.
    fn scan_target<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        table: &TableRef,
        predicate: Option<&AstExpr>,
    ) -> Result<PlanBuilder<'a>> {
        let plan = RelationPlanner.plan_table(env, ctx, table)?;
        let builder = PlanBuilder::from_relation_plan(env.analysis, plan);
        QueryPlanner.filter(env, ctx, builder, predicate)
    }
}

/// Row count accumulator and opaque fragment produced by every row mutation.
pub(crate) fn summary_outputs(ctx: &mut PlanContext) -> Vec<Symbol> {
    vec![
        ctx.new_symbol("partialrows", DataType::Int64),
        ctx.new_symbol("fragment", DataType::Binary),
    ]
}
