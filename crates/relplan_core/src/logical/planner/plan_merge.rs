use indexmap::IndexMap;
use relplan_error::{DbError, OptionExt, Result};
use tracing::{debug, trace};

use super::PlannerEnv;
use super::plan_builder::PlanBuilder;
use super::plan_from::RelationPlanner;
use super::plan_mutation::summary_outputs;
use super::relation_plan::RelationPlan;
use super::subquery::handle_subqueries;
use super::translation::coerce_if_necessary;
use crate::analysis::ast::{Merge, MergeCase};
use crate::analysis::merge::MergeAnalysis;
use crate::catalog::ColumnHandle;
use crate::config::session::PlannerConfig;
use crate::expr::case_expr::{CaseExpr, WhenThen};
use crate::expr::{self, Expression};
use crate::logical::context::PlanContext;
use crate::logical::logical_join::JoinType;
use crate::logical::logical_merge::{
    LogicalDeleteAndInsert,
    LogicalMerge,
    MergeCaseDetails,
    MergeCaseKind,
    MergeDetails,
    MergeTarget,
    PartitioningScheme,
};
use crate::logical::logical_project::{Assignments, LogicalProject};
use crate::logical::merge_processor::{MergeRowLayout, RowChangeProcessor};
use crate::logical::operator::{LogicalNode, LogicalOperator, Node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;

/// Plans MERGE statements.
///
/// The target, marked with a `present` column, is right joined to the
/// source on the MERGE predicate. Every joined row is then encoded as a
/// single merge row holding the new values of every data column, the number
/// of the first case that matched and the operation of that case. Rows no
/// case matched carry -1 for both.
#[derive(Debug)]
pub struct MergePlanner;

impl MergePlanner {
    pub fn plan_merge(
        &self,
        env: &PlannerEnv<'_>,
        ctx: &mut PlanContext,
        merge: &Merge,
    ) -> Result<LogicalOperator> {
        let analysis = env.analysis;
        let merge_analysis = analysis.merge_analysis()?;
        let handle = analysis.table(merge_analysis.target_table)?;
        let table = env.metadata.require_get_table_metadata(handle)?;
        let column_handles = env.metadata.get_column_handles(handle)?;

        let case_columns = merge
            .cases
            .iter()
            .map(|case| resolve_case_columns(env.config, &column_handles, case))
            .collect::<Result<Vec<_>>>()?;
        let details = merge_details(merge, &case_columns);

        // Target rows are marked present so unmatched source rows can be
        // told apart after the join.
        let target = RelationPlanner.plan_relation(env, ctx, &merge.target)?;
        let present = ctx.new_symbol("present", DataType::Boolean);
        let mut assignments = Assignments::identity(&target.root.output_symbols());
        assignments.put(present.clone(), expr::lit(true));
        let marked = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![target.root],
        ));
        let table_scan_id = marked
            .leftmost_table_scan_id()
            .required("scan of the MERGE target table")?;
        let target_fields = target.fields.clone();
        let target = RelationPlan::new(
            marked,
            target.scope,
            target.fields,
            env.outer_context.clone(),
        );

        let source = RelationPlanner.plan_relation(env, ctx, &merge.source)?;
        let joined = RelationPlanner.plan_join_relations(
            env,
            ctx,
            JoinType::Right,
            Some(&merge.predicate),
            merge_analysis.join_scope,
            target,
            source,
        )?;
        let builder = PlanBuilder::from_relation_plan(analysis, joined);
        let builder = handle_subqueries(
            env,
            ctx,
            builder,
            merge
                .cases
                .iter()
                .flat_map(|case| case.condition().into_iter().chain(case.set_expressions())),
        )?;

        let row_type = merge_row_type(merge_analysis);
        let merge_row_expr = expr::cast(
            Expression::Case(self.merge_case(
                &builder,
                merge,
                merge_analysis,
                &case_columns,
                &target_fields,
                &present,
            )?),
            row_type.clone(),
        );

        // Redistribution columns and the row id keep their pre-join target
        // values.
        let mut assignments = Assignments::new();
        for column in &merge_analysis.redistribution_column_handles {
            let field = target_field(merge_analysis, &target_fields, column)?;
            let symbol = ctx.new_symbol(&column.name, field.datatype().clone());
            assignments.put(symbol, expr::sym(field));
        }
        let row_id_field = target_fields
            .get(analysis.row_id_field(merge_analysis.target_table)?)
            .required("row id field of the MERGE target")?;
        let row_id = ctx.new_symbol("row_id", row_id_field.datatype().clone());
        assignments.put(row_id.clone(), expr::sym(row_id_field));
        let merge_row = ctx.new_symbol("merge_row", row_type);
        assignments.put(merge_row.clone(), merge_row_expr);

        let expected = merge_analysis.redistribution_column_handles.len() + 2;
        if assignments.len() != expected {
            return Err(DbError::new("MERGE projection has an unexpected width")
                .with_field("expected", expected)
                .with_field("got", assignments.len()));
        }

        let project = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![builder.into_root()],
        ));

        // Pull the new data values and the operation out of the merge row.
        let mut assignments = Assignments::identity(&project.output_symbols());
        let mut data_symbols = Vec::with_capacity(merge_analysis.data_column_schemas.len());
        for (idx, schema) in merge_analysis.data_column_schemas.iter().enumerate() {
            let symbol = ctx.new_symbol(&schema.name, schema.datatype.clone());
            assignments.put(symbol.clone(), expr::field_access(expr::sym(&merge_row), idx));
            data_symbols.push(symbol);
        }
        let operation = ctx.new_symbol("operation", DataType::Int32);
        assignments.put(
            operation.clone(),
            expr::field_access(expr::sym(&merge_row), data_symbols.len() + 1),
        );
        let extract = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![project],
        ));

        let mut projected_symbols = data_symbols.clone();
        projected_symbols.push(operation);
        projected_symbols.push(row_id.clone());

        let partitioning = match &merge_analysis.new_table_layout {
            Some(layout) => {
                let arguments = layout
                    .partition_columns
                    .iter()
                    .map(|name| {
                        merge_analysis
                            .data_column_schemas
                            .iter()
                            .position(|schema| &schema.name == name)
                            .map(|idx| data_symbols[idx].clone())
                            .ok_or_else(|| {
                                DbError::new("Partition column is not a MERGE data column")
                                    .with_field("column", name)
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(PartitioningScheme {
                    partitioning: layout.partitioning.clone(),
                    arguments,
                    output_layout: projected_symbols.clone(),
                })
            }
            None => None,
        };

        let paradigm = env.metadata.get_row_change_paradigm(handle)?;
        let processor = RowChangeProcessor::new(
            paradigm,
            MergeRowLayout {
                data_columns: merge_analysis.data_column_handles.clone(),
                data_column_types: table
                    .visible_columns()
                    .map(|column| column.datatype.clone())
                    .collect(),
                redistribution_columns: merge_analysis.redistribution_column_handles.clone(),
                row_id_type: row_id.datatype().clone(),
            },
        );
        let target = MergeTarget {
            table: table.table,
            details,
            processor,
        };

        debug!(
            table = %target.table,
            cases = merge.cases.len(),
            %paradigm,
            partitioned = partitioning.is_some(),
            "planned merge"
        );

        let delete_and_insert = LogicalOperator::DeleteAndInsert(Node::new(
            ctx.next_id(),
            LogicalDeleteAndInsert {
                target: target.clone(),
                projected_symbols: projected_symbols.clone(),
            },
            vec![extract],
        ));

        Ok(LogicalOperator::Merge(Node::new(
            ctx.next_id(),
            LogicalMerge {
                target,
                table_scan_id,
                projected_symbols,
                partitioning,
                outputs: summary_outputs(ctx),
            },
            vec![delete_and_insert],
        )))
    }

    /// Build the searched case picking the merge row of the first matching
    /// case.
    fn merge_case(
        &self,
        builder: &PlanBuilder,
        merge: &Merge,
        merge_analysis: &MergeAnalysis,
        case_columns: &[Vec<ColumnHandle>],
        target_fields: &[Symbol],
        present: &Symbol,
    ) -> Result<CaseExpr> {
        let analysis = builder.analysis();
        let data_columns = merge_analysis
            .data_column_handles
            .iter()
            .zip(&merge_analysis.data_column_schemas);

        let mut whens = Vec::with_capacity(merge.cases.len());
        for (case_number, (case, columns)) in merge.cases.iter().zip(case_columns).enumerate() {
            let set_expressions = case.set_expressions();
            let mut fields = Vec::with_capacity(merge_analysis.data_column_handles.len() + 2);

            for (column, schema) in data_columns.clone() {
                let value = match columns.iter().position(|c| c == column) {
                    Some(idx) => {
                        let assigned = set_expressions
                            .get(idx)
                            .copied()
                            .required("value for assigned MERGE column")?;
                        let value = coerce_if_necessary(analysis, assigned, builder.rewrite(assigned)?);
                        if value.datatype()? == schema.datatype {
                            value
                        } else {
                            expr::cast(value, schema.datatype.clone())
                        }
                    }
                    None => expr::sym(target_field(merge_analysis, target_fields, column)?),
                };
                fields.push(value);
            }

            let kind = case_kind(case);
            fields.push(expr::lit(case_number as i32));
            fields.push(expr::lit(kind.operation_number()));

            let matched = match kind {
                MergeCaseKind::Insert => expr::is_null(expr::sym(present)),
                MergeCaseKind::Update | MergeCaseKind::Delete => expr::sym(present),
            };
            let when = match case.condition() {
                Some(condition) => expr::and([matched, builder.rewrite(condition)?])?,
                None => matched,
            };

            trace!(case_number, %kind, "planned merge case");
            whens.push(WhenThen {
                when,
                then: expr::row(fields),
            });
        }

        let mut unmatched: Vec<_> = merge_analysis
            .data_column_schemas
            .iter()
            .map(|schema| expr::typed_null(schema.datatype.clone()))
            .collect();
        unmatched.push(expr::lit(MergeCaseKind::NO_MATCH));
        unmatched.push(expr::lit(MergeCaseKind::NO_MATCH));

        CaseExpr::try_new(whens, Some(expr::row(unmatched)))
    }
}

/// Row type of the merge row: every data column, then the case number and
/// the operation.
fn merge_row_type(merge_analysis: &MergeAnalysis) -> DataType {
    DataType::struct_type(
        merge_analysis
            .data_column_schemas
            .iter()
            .map(|schema| (Some(schema.name.clone()), schema.datatype.clone()))
            .chain([(None, DataType::Int32), (None, DataType::Int32)]),
    )
}

fn target_field<'s>(
    merge_analysis: &MergeAnalysis,
    target_fields: &'s [Symbol],
    column: &ColumnHandle,
) -> Result<&'s Symbol> {
    merge_analysis
        .column_handle_field_numbers
        .get(column)
        .and_then(|&idx| target_fields.get(idx))
        .ok_or_else(|| {
            DbError::new("Missing target field for MERGE column").with_field("column", column)
        })
}

fn case_kind(case: &MergeCase) -> MergeCaseKind {
    match case {
        MergeCase::Insert { .. } => MergeCaseKind::Insert,
        MergeCase::Update { .. } => MergeCaseKind::Update,
        MergeCase::Delete { .. } => MergeCaseKind::Delete,
    }
}

/// Resolve the columns a case assigns against the target table.
fn resolve_case_columns(
    config: &PlannerConfig,
    column_handles: &IndexMap<String, ColumnHandle>,
    case: &MergeCase,
) -> Result<Vec<ColumnHandle>> {
    case.set_columns()
        .into_iter()
        .map(|name| {
            let name = if config.canonicalize_merge_identifiers {
                name.to_lowercase()
            } else {
                name.to_string()
            };
            column_handles.get(&name).cloned().ok_or_else(|| {
                DbError::new("MERGE assigns a column the target doesn't have")
                    .with_field("column", &name)
            })
        })
        .collect()
}

fn merge_details(merge: &Merge, case_columns: &[Vec<ColumnHandle>]) -> MergeDetails {
    MergeDetails {
        cases: merge
            .cases
            .iter()
            .zip(case_columns)
            .enumerate()
            .map(|(case_number, (case, columns))| MergeCaseDetails {
                case_number,
                kind: case_kind(case),
                columns: columns.clone(),
            })
            .collect(),
    }
}
