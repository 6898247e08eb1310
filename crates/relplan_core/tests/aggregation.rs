mod common;

use common::{Fixture, nodes};
use relplan_core::analysis::ast::{
    AstExpr,
    AstExprKind,
    FunctionCall,
    GroupBy,
    OrderBy,
    Relation,
    SortItem,
    Statement,
};
use relplan_core::analysis::grouping::{
    AggregationAnalysis,
    GroupingElement,
    GroupingSetAnalysis,
};
use relplan_core::analysis::scope::{FieldId, ScopeId};
use relplan_core::catalog::RowChangeParadigm;
use relplan_core::expr::Expression;
use relplan_core::expr::consteval::{RowBindings, eval};
use relplan_core::functions::ResolvedFunction;
use relplan_core::logical::operator::LogicalOperator;
use relplan_core::types::datatype::DataType;
use relplan_core::types::scalar::ScalarValue;

fn orders(fixture: &mut Fixture) -> (Relation, ScopeId) {
    let handle = fixture.create_table(
        "orders",
        &[("id", DataType::Int64), ("amount", DataType::Int64)],
        RowChangeParadigm::DeleteRowAndInsertRow,
    );
    let (table, scope) = fixture.table_ref(&handle);
    (Relation::Table(table), scope)
}

/// `sum(amount)`
fn sum_amount(fixture: &mut Fixture, scope: ScopeId) -> AstExpr {
    let amount = fixture.column(scope, 1);
    let sum = fixture.typed(
        AstExprKind::Function(FunctionCall {
            name: "sum".to_string(),
            args: vec![amount],
            distinct: false,
            filter: None,
            order_by: Vec::new(),
            null_treatment: None,
        }),
        DataType::Int64,
    );
    fixture.analysis.set_resolved_function(
        sum.id,
        ResolvedFunction::aggregate("sum", [DataType::Int64], DataType::Int64),
    );
    sum
}

#[test]
fn rollup_plans_group_id_and_grouping_bitmask() {
    let mut fixture = Fixture::new();
    let (from, scope) = orders(&mut fixture);
    let relation = fixture.analysis.scope(scope).unwrap().relation_id;

    // SELECT id, sum(amount), GROUPING(id) FROM orders GROUP BY ROLLUP (id)
    let id = fixture.column(scope, 0);
    let sum = sum_amount(&mut fixture, scope);
    let grouping_arg = fixture.column(scope, 0);
    let grouping = fixture.typed(AstExprKind::Grouping(vec![grouping_arg]), DataType::Int64);

    let mut spec = fixture.select(
        Some(from),
        vec![id, sum.clone(), grouping.clone()],
        None,
        false,
    );
    spec.group_by = Some(GroupBy { distinct: false });
    fixture.analysis.set_aggregation(
        spec.id,
        AggregationAnalysis {
            aggregates: vec![sum],
            grouping_sets: GroupingSetAnalysis {
                elements: vec![GroupingElement::Rollup(vec![FieldId::new(relation, 0)])],
                complex_expressions: Vec::new(),
            },
            grouping_operations: vec![grouping],
        },
    );
    let statement = Statement::Query(fixture.query(spec));

    let planned = fixture.plan(&statement).unwrap();
    assert_eq!(3, planned.fields.len());

    let all = nodes(&planned.root);
    let group_id = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::GroupId(group_id) => Some(group_id),
            _ => None,
        })
        .unwrap();
    // ROLLUP (id) is the global set followed by (id).
    assert_eq!(2, group_id.node.grouping_sets.len());
    assert!(group_id.node.grouping_sets[0].is_empty());
    assert_eq!(vec![planned.fields[0].clone()], group_id.node.grouping_sets[1]);

    let aggregate = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::Aggregate(agg) => Some(agg),
            _ => None,
        })
        .unwrap();
    assert_eq!(2, aggregate.node.grouping_sets.grouping_set_count);
    assert_eq!(vec![0], aggregate.node.grouping_sets.global_grouping_sets);
    assert_eq!(
        Some(&group_id.node.group_id_symbol),
        aggregate.node.group_id_symbol.as_ref()
    );
    assert!(aggregate.node.aggregations.contains_key(&planned.fields[1]));

    // GROUPING(id) is 1 for the global set and 0 when grouped on id.
    let bitmask = all
        .iter()
        .filter_map(|node| match node {
            LogicalOperator::Project(project) => project.node.assignments.get(&planned.fields[2]),
            _ => None,
        })
        .find(|expr| matches!(expr, Expression::Case(_)))
        .unwrap();
    for (set, expected) in [(0_i64, 1_i64), (1, 0)] {
        let mut bindings = RowBindings::default();
        bindings.insert(group_id.node.group_id_symbol.clone(), ScalarValue::Int64(set));
        assert_eq!(ScalarValue::Int64(expected), eval(bitmask, &bindings).unwrap());
    }
}

#[test]
fn plain_group_by_projects_without_group_id() {
    let mut fixture = Fixture::new();
    let (from, scope) = orders(&mut fixture);
    let relation = fixture.analysis.scope(scope).unwrap().relation_id;

    // SELECT id, sum(amount), sum(amount) FROM orders GROUP BY id
    let id = fixture.column(scope, 0);
    let first = sum_amount(&mut fixture, scope);
    let second = sum_amount(&mut fixture, scope);
    let mut spec = fixture.select(
        Some(from),
        vec![id, first.clone(), second.clone()],
        None,
        false,
    );
    spec.group_by = Some(GroupBy { distinct: false });
    fixture.analysis.set_aggregation(
        spec.id,
        AggregationAnalysis {
            aggregates: vec![first, second],
            grouping_sets: GroupingSetAnalysis {
                elements: vec![GroupingElement::Sets(vec![vec![FieldId::new(relation, 0)]])],
                complex_expressions: Vec::new(),
            },
            grouping_operations: Vec::new(),
        },
    );
    let statement = Statement::Query(fixture.query(spec));

    let planned = fixture.plan(&statement).unwrap();
    let all = nodes(&planned.root);
    assert!(
        !all.iter()
            .any(|node| matches!(node, LogicalOperator::GroupId(_)))
    );

    let aggregate = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::Aggregate(agg) => Some(agg),
            _ => None,
        })
        .unwrap();
    assert_eq!(1, aggregate.node.aggregations.len());
    assert_eq!(None, aggregate.node.group_id_symbol);
    assert_eq!(
        vec![planned.fields[0].clone()],
        aggregate.node.grouping_sets.grouping_keys
    );
    assert_eq!(planned.fields[1], planned.fields[2]);
}

#[test]
fn order_by_aggregate_sorts_on_aggregation_output() {
    let mut fixture = Fixture::new();
    let (from, scope) = orders(&mut fixture);
    let relation = fixture.analysis.scope(scope).unwrap().relation_id;

    // SELECT id FROM orders GROUP BY id ORDER BY sum(amount) DESC
    let id = fixture.column(scope, 0);
    let mut spec = fixture.select(Some(from), vec![id], None, false);
    spec.group_by = Some(GroupBy { distinct: false });

    let sum = sum_amount(&mut fixture, scope);
    let order_scope = fixture.scope(Some(scope), Vec::new());
    let order_by = OrderBy {
        id: fixture.node(),
        items: vec![SortItem {
            key: sum.clone(),
            desc: true,
            nulls_first: None,
        }],
    };
    fixture.analysis.set_scope(order_by.id, order_scope);
    fixture
        .analysis
        .set_order_by_aggregates(order_by.id, vec![sum.clone()]);
    fixture
        .analysis
        .set_order_by_expressions(spec.id, vec![sum.clone()]);
    fixture.analysis.set_aggregation(
        spec.id,
        AggregationAnalysis {
            aggregates: vec![sum],
            grouping_sets: GroupingSetAnalysis {
                elements: vec![GroupingElement::Sets(vec![vec![FieldId::new(relation, 0)]])],
                complex_expressions: Vec::new(),
            },
            grouping_operations: Vec::new(),
        },
    );
    spec.order_by = Some(order_by);
    let statement = Statement::Query(fixture.query(spec));

    let planned = fixture.plan(&statement).unwrap();
    let all = nodes(&planned.root);
    let aggregate = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::Aggregate(agg) => Some(agg),
            _ => None,
        })
        .unwrap();
    let (sum_symbol, _) = aggregate.node.aggregations.first().unwrap();

    let sort = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::Sort(sort) => Some(sort),
            _ => None,
        })
        .unwrap();
    let keys: Vec<_> = sort.node.ordering.iter().collect();
    assert_eq!(1, keys.len());
    assert_eq!(sum_symbol, keys[0].0);
    assert!(keys[0].1.desc);

    assert_eq!(1, planned.fields.len());
}
