mod common;

use ahash::HashMap;
use common::{Fixture, ROW_ID, nodes};
use relplan_core::analysis::ast::{
    Delete,
    Merge,
    MergeCase,
    Relation,
    Statement,
    TableRef,
    Update,
    UpdateAssignment,
};
use relplan_core::analysis::merge::{ColumnSchema, MergeAnalysis};
use relplan_core::analysis::scope::ScopeId;
use relplan_core::catalog::{ColumnHandle, RowChangeParadigm, TableHandle, TableLayout};
use relplan_core::expr::Expression;
use relplan_core::expr::arith_expr::ArithOperator;
use relplan_core::expr::comparison_expr::ComparisonOperator;
use relplan_core::expr::consteval::{RowBindings, eval};
use relplan_core::logical::logical_merge::{LogicalDeleteAndInsert, LogicalMerge};
use relplan_core::logical::logical_scan::LogicalScan;
use relplan_core::logical::merge_processor::RowChange;
use relplan_core::logical::operator::{LogicalOperator, Node};
use relplan_core::logical::symbol::Symbol;
use relplan_core::types::datatype::DataType;
use relplan_core::types::scalar::ScalarValue;

fn orders(fixture: &mut Fixture, paradigm: RowChangeParadigm) -> TableHandle {
    fixture.create_table(
        "orders",
        &[("id", DataType::Int64), ("amount", DataType::Int64)],
        paradigm,
    )
}

fn target_ref(fixture: &mut Fixture, handle: &TableHandle) -> (TableRef, ScopeId) {
    let (table, scope) = fixture.table_ref(handle);
    fixture.analysis.set_update_target(table.id);
    (table, scope)
}

fn scans(root: &LogicalOperator) -> Vec<&Node<LogicalScan>> {
    nodes(root)
        .into_iter()
        .filter_map(|node| match node {
            LogicalOperator::Scan(scan) => Some(scan),
            _ => None,
        })
        .collect()
}

fn scan_symbol(scan: &Node<LogicalScan>, column: &str) -> Symbol {
    scan.node
        .columns
        .iter()
        .find(|(_, handle)| handle.name == column)
        .map(|(symbol, _)| symbol.clone())
        .unwrap()
}

#[test]
fn delete_by_row_id() {
    let mut fixture = Fixture::new();
    let handle = orders(&mut fixture, RowChangeParadigm::DeleteRowAndInsertRow);
    let (table, scope) = target_ref(&mut fixture, &handle);

    // DELETE FROM orders WHERE amount > 10
    let amount = fixture.column(scope, 1);
    let ten = fixture.literal(10_i64);
    let predicate = fixture.compare(ComparisonOperator::Gt, amount, ten);
    let delete = Delete {
        id: fixture.node(),
        table,
        where_clause: Some(predicate),
    };

    let planned = fixture.plan(&Statement::Delete(delete)).unwrap();
    assert_eq!(None, planned.descriptor);

    let delete = match &planned.root {
        LogicalOperator::Delete(delete) => delete,
        other => panic!("unexpected root: {other:?}"),
    };
    assert_eq!(handle, delete.node.target.table);
    assert!(matches!(delete.children[0], LogicalOperator::Filter(_)));

    let scans = scans(&planned.root);
    assert_eq!(1, scans.len());
    assert!(scans[0].node.update_target);
    assert_eq!(scan_symbol(scans[0], ROW_ID), delete.node.row_id);

    let types: Vec<_> = planned.fields.iter().map(|f| f.datatype().clone()).collect();
    assert_eq!(vec![DataType::Int64, DataType::Binary], types);
}

#[test]
fn update_assignments_in_table_column_order() {
    let mut fixture = Fixture::new();
    let handle = orders(&mut fixture, RowChangeParadigm::DeleteRowAndInsertRow);
    let (table, scope) = target_ref(&mut fixture, &handle);

    // UPDATE orders SET amount = 5, id = id + 1
    let five = fixture.literal(5_i32);
    fixture.analysis.set_coercion(five.id, DataType::Int64, false);
    let id = fixture.column(scope, 0);
    let one = fixture.literal(1_i64);
    let next_id = fixture.arith(ArithOperator::Add, id, one);
    let update = Update {
        id: fixture.node(),
        table,
        assignments: vec![
            UpdateAssignment {
                column: "amount".to_string(),
                value: five,
            },
            UpdateAssignment {
                column: "id".to_string(),
                value: next_id,
            },
        ],
        where_clause: None,
    };

    let planned = fixture.plan(&Statement::Update(update)).unwrap();
    let update = match &planned.root {
        LogicalOperator::Update(update) => update,
        other => panic!("unexpected root: {other:?}"),
    };

    assert_eq!(vec!["id", "amount"], update.node.target.column_names);
    assert_eq!(
        vec![ColumnHandle::new("id"), ColumnHandle::new("amount")],
        update.node.target.column_handles
    );

    let symbols = &update.node.column_value_and_row_id_symbols;
    assert_eq!(3, symbols.len());
    assert_eq!(&update.node.row_id, &symbols[2]);
    assert_eq!(&DataType::Int64, symbols[1].datatype());

    let scans = scans(&planned.root);
    assert_eq!(scan_symbol(scans[0], ROW_ID), update.node.row_id);

    // The literal is cast to the column type.
    let casts = nodes(&planned.root)
        .into_iter()
        .filter_map(|node| match node {
            LogicalOperator::Project(project) => Some(project),
            _ => None,
        })
        .flat_map(|project| project.node.assignments.iter())
        .filter(|(symbol, expr)| *symbol == &symbols[1] && matches!(expr, Expression::Cast(_)))
        .count();
    assert_eq!(1, casts);
}

#[test]
fn update_of_unknown_column_errors() {
    let mut fixture = Fixture::new();
    let handle = orders(&mut fixture, RowChangeParadigm::DeleteRowAndInsertRow);
    let (table, _) = target_ref(&mut fixture, &handle);

    let value = fixture.literal(1_i64);
    let update = Update {
        id: fixture.node(),
        table,
        assignments: vec![UpdateAssignment {
            column: "missing".to_string(),
            value,
        }],
        where_clause: None,
    };

    let err = fixture.plan(&Statement::Update(update)).unwrap_err();
    assert!(!err.is_query_error());
}

/// MERGE INTO orders USING src ON orders.id = src.id
///   WHEN MATCHED AND src.amount = 0 THEN DELETE
///   WHEN MATCHED THEN UPDATE SET amount = src.amount
///   [WHEN NOT MATCHED THEN INSERT (id, amount) VALUES (src.id, src.amount)]
fn merge_statement(
    fixture: &mut Fixture,
    paradigm: RowChangeParadigm,
    with_insert: bool,
    layout: Option<TableLayout>,
) -> Statement {
    let target_handle = orders(fixture, paradigm);
    let source_handle = fixture.create_table(
        "src",
        &[("id", DataType::Int64), ("amount", DataType::Int64)],
        RowChangeParadigm::DeleteRowAndInsertRow,
    );
    let (target, target_scope) = target_ref(fixture, &target_handle);
    let (source, source_scope) = fixture.table_ref(&source_handle);

    // Target fields followed by source fields.
    let mut fields = fixture
        .analysis
        .relation_type(target_scope)
        .unwrap()
        .all_fields()
        .to_vec();
    fields.extend_from_slice(
        fixture
            .analysis
            .relation_type(source_scope)
            .unwrap()
            .all_fields(),
    );
    let join_scope = fixture.scope(None, fields);
    let (target_id, target_amount) = (0, 1);
    let (source_id, source_amount) = (3, 4);

    let left = fixture.column(join_scope, target_id);
    let right = fixture.column(join_scope, source_id);
    let predicate = fixture.compare(ComparisonOperator::Eq, left, right);

    let amount = fixture.column(join_scope, source_amount);
    let zero = fixture.literal(0_i64);
    let delete_condition = fixture.compare(ComparisonOperator::Eq, amount, zero);
    let new_amount = fixture.column(join_scope, source_amount);
    let mut cases = vec![
        MergeCase::Delete {
            condition: Some(delete_condition),
        },
        MergeCase::Update {
            condition: None,
            assignments: vec![UpdateAssignment {
                column: "AMOUNT".to_string(),
                value: new_amount,
            }],
        },
    ];
    if with_insert {
        let id = fixture.column(join_scope, source_id);
        let amount = fixture.column(join_scope, source_amount);
        cases.push(MergeCase::Insert {
            condition: None,
            columns: vec!["id".to_string(), "amount".to_string()],
            values: vec![id, amount],
        });
    }

    let handles = [ColumnHandle::new("id"), ColumnHandle::new("amount")];
    fixture.analysis.set_merge_analysis(MergeAnalysis {
        target_table: target.id,
        data_column_schemas: vec![
            ColumnSchema::new("id", DataType::Int64),
            ColumnSchema::new("amount", DataType::Int64),
        ],
        data_column_handles: handles.to_vec(),
        redistribution_column_handles: Vec::new(),
        column_handle_field_numbers: HashMap::from_iter([
            (handles[0].clone(), target_id),
            (handles[1].clone(), target_amount),
        ]),
        join_scope,
        new_table_layout: layout,
    });

    Statement::Merge(Merge {
        id: fixture.node(),
        target: Relation::Table(target),
        source: Relation::Table(source),
        predicate,
        cases,
    })
}

/// Symbols of one planned MERGE, used to evaluate its merge row.
struct MergePlan<'a> {
    merge: &'a Node<LogicalMerge>,
    delete_and_insert: &'a Node<LogicalDeleteAndInsert>,
    merge_row: &'a Expression,
    present: Symbol,
    target: HashMap<&'static str, Symbol>,
    source: HashMap<&'static str, Symbol>,
}

impl<'a> MergePlan<'a> {
    fn new(root: &'a LogicalOperator) -> Self {
        let merge = match root {
            LogicalOperator::Merge(merge) => merge,
            other => panic!("unexpected root: {other:?}"),
        };
        let delete_and_insert = match &merge.children[0] {
            LogicalOperator::DeleteAndInsert(node) => node,
            other => panic!("unexpected merge input: {other:?}"),
        };

        let merge_row = nodes(root)
            .into_iter()
            .filter_map(|node| match node {
                LogicalOperator::Project(project) => Some(project),
                _ => None,
            })
            .flat_map(|project| project.node.assignments.iter())
            .find(|(symbol, expr)| {
                matches!(symbol.datatype(), DataType::Struct(_)) && !expr.is_symbol()
            })
            .map(|(_, expr)| expr)
            .unwrap();

        let present = nodes(root)
            .into_iter()
            .filter_map(|node| match node {
                LogicalOperator::Project(project) => Some(project),
                _ => None,
            })
            .flat_map(|project| project.node.assignments.iter())
            .find(|(_, expr)| matches!(expr, Expression::Literal(_)))
            .map(|(symbol, _)| symbol.clone())
            .unwrap();

        let scans = scans(root);
        let columns = |scan: &Node<LogicalScan>| -> HashMap<&'static str, Symbol> {
            ["id", "amount", ROW_ID]
                .into_iter()
                .map(|name| (name, scan_symbol(scan, name)))
                .collect()
        };
        let target = scans.iter().find(|s| s.node.update_target).unwrap();
        let source = scans.iter().find(|s| !s.node.update_target).unwrap();

        MergePlan {
            merge,
            delete_and_insert,
            merge_row,
            present,
            target: columns(target),
            source: columns(source),
        }
    }

    /// Evaluate the merge row for a joined row. A None target means the
    /// source row matched no target row.
    fn eval(&self, target: Option<(i64, i64)>, source: (i64, i64)) -> ScalarValue {
        let mut bindings = RowBindings::default();
        let (present, id, amount, row_id) = match target {
            Some((id, amount)) => (
                ScalarValue::Boolean(true),
                ScalarValue::Int64(id),
                ScalarValue::Int64(amount),
                ScalarValue::Int64(100 + id),
            ),
            None => (
                ScalarValue::Null,
                ScalarValue::Null,
                ScalarValue::Null,
                ScalarValue::Null,
            ),
        };
        bindings.insert(self.present.clone(), present);
        bindings.insert(self.target["id"].clone(), id);
        bindings.insert(self.target["amount"].clone(), amount);
        bindings.insert(self.target[ROW_ID].clone(), row_id);
        bindings.insert(self.source["id"].clone(), ScalarValue::Int64(source.0));
        bindings.insert(self.source["amount"].clone(), ScalarValue::Int64(source.1));
        bindings.insert(self.source[ROW_ID].clone(), ScalarValue::Int64(-1));
        eval(self.merge_row, &bindings).unwrap()
    }
}

fn row(id: ScalarValue, amount: ScalarValue, case: i32, operation: i32) -> ScalarValue {
    ScalarValue::Struct(vec![
        id,
        amount,
        ScalarValue::Int32(case),
        ScalarValue::Int32(operation),
    ])
}

#[test]
fn merge_row_takes_first_matching_case() {
    let mut fixture = Fixture::new();
    let statement = merge_statement(
        &mut fixture,
        RowChangeParadigm::DeleteRowAndInsertRow,
        true,
        None,
    );
    let planned = fixture.plan(&statement).unwrap();
    let plan = MergePlan::new(&planned.root);

    // Matched and the DELETE condition holds.
    assert_eq!(
        row(ScalarValue::Int64(1), ScalarValue::Int64(10), 0, 2),
        plan.eval(Some((1, 10)), (1, 0))
    );
    // Matched, falls through to the UPDATE.
    let updated = plan.eval(Some((1, 10)), (1, 7));
    assert_eq!(
        row(ScalarValue::Int64(1), ScalarValue::Int64(7), 1, 3),
        updated
    );
    // Not matched.
    assert_eq!(
        row(ScalarValue::Int64(2), ScalarValue::Int64(5), 2, 1),
        plan.eval(None, (2, 5))
    );

    let merge = &plan.merge.node;
    assert_eq!(
        nodes(&planned.root)
            .into_iter()
            .find(|node| matches!(node, LogicalOperator::Scan(s) if s.node.update_target))
            .unwrap()
            .id(),
        merge.table_scan_id
    );
    assert_eq!(4, merge.projected_symbols.len());
    assert_eq!(&DataType::Int32, merge.projected_symbols[2].datatype());
    assert_eq!(None, merge.partitioning);
    assert_eq!(3, merge.target.details.cases.len());
    assert_eq!(
        vec![ColumnHandle::new("amount")],
        merge.target.details.cases[1].columns
    );
    assert_eq!(
        merge.projected_symbols,
        plan.delete_and_insert.node.projected_symbols
    );

    let changes = merge
        .target
        .processor
        .process_row(&merge.target.details, &updated, &ScalarValue::Int64(101))
        .unwrap();
    assert_eq!(
        vec![
            RowChange::Delete {
                row_id: ScalarValue::Int64(101)
            },
            RowChange::Insert {
                values: vec![ScalarValue::Int64(1), ScalarValue::Int64(7)]
            },
        ],
        changes
    );
}

#[test]
fn merge_without_insert_ignores_unmatched_rows() {
    let mut fixture = Fixture::new();
    let layout = TableLayout {
        partitioning: Some("bucket".to_string()),
        partition_columns: vec!["id".to_string()],
    };
    let statement = merge_statement(
        &mut fixture,
        RowChangeParadigm::ChangeOnlyUpdatedColumns,
        false,
        Some(layout),
    );
    let planned = fixture.plan(&statement).unwrap();
    let plan = MergePlan::new(&planned.root);
    let merge = &plan.merge.node;

    let unmatched = plan.eval(None, (2, 5));
    assert_eq!(
        row(ScalarValue::Null, ScalarValue::Null, -1, -1),
        unmatched
    );
    let changes = merge
        .target
        .processor
        .process_row(&merge.target.details, &unmatched, &ScalarValue::Null)
        .unwrap();
    assert!(changes.is_empty());

    // In-place update of only the assigned column.
    let updated = plan.eval(Some((1, 10)), (1, 7));
    let changes = merge
        .target
        .processor
        .process_row(&merge.target.details, &updated, &ScalarValue::Int64(101))
        .unwrap();
    assert_eq!(
        vec![RowChange::Update {
            row_id: ScalarValue::Int64(101),
            values: vec![(ColumnHandle::new("amount"), ScalarValue::Int64(7))],
        }],
        changes
    );

    let partitioning = merge.partitioning.as_ref().unwrap();
    assert_eq!(Some("bucket"), partitioning.partitioning.as_deref());
    assert_eq!(vec![merge.projected_symbols[0].clone()], partitioning.arguments);
    assert_eq!(merge.projected_symbols, partitioning.output_layout);
}
