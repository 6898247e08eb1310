mod common;

use ahash::HashSet;
use common::{Fixture, nodes};
use relplan_core::analysis::ast::{Query, Relation, Statement, TableRef, Union};
use relplan_core::analysis::scope::Field;
use relplan_core::expr::arith_expr::ArithOperator;
use relplan_core::expr::comparison_expr::ComparisonOperator;
use relplan_core::expr::consteval::{RowBindings, eval};
use relplan_core::logical::operator::LogicalOperator;
use relplan_core::types::datatype::DataType;
use relplan_core::types::scalar::ScalarValue;

/// WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 3)
/// SELECT n FROM t
fn counting_query(fixture: &mut Fixture, distinct: bool) -> Statement {
    let cte_fields = || vec![Field::new("n", DataType::Int32).with_alias("t")];

    // Anchor.
    let one = fixture.literal(1_i32);
    let anchor = fixture.select(None, vec![one], None, false);

    // Recursion step reading the recursive reference.
    let step_scope = fixture.scope(None, cte_fields());
    let inner_ref = TableRef {
        id: fixture.node(),
        name: "t".to_string(),
    };
    fixture.analysis.set_scope(inner_ref.id, step_scope);
    let n = fixture.column(step_scope, 0);
    let three = fixture.literal(3_i32);
    let predicate = fixture.compare(ComparisonOperator::Lt, n, three);
    let n = fixture.column(step_scope, 0);
    let one = fixture.literal(1_i32);
    let next = fixture.arith(ArithOperator::Add, n, one);
    let step = fixture.select(
        Some(Relation::Table(inner_ref.clone())),
        vec![next],
        Some(predicate),
        false,
    );

    let union_id = fixture.node();
    let cte_scope = fixture.scope(None, cte_fields());
    let cte = Query {
        id: fixture.node(),
        body: Relation::Union(Union {
            id: union_id,
            distinct,
            relations: vec![
                Relation::QuerySpecification(Box::new(anchor)),
                Relation::QuerySpecification(Box::new(step)),
            ],
        }),
        order_by: None,
        offset: None,
        limit: None,
    };
    fixture.analysis.set_scope(cte.id, cte_scope);
    fixture.analysis.set_expandable_query(cte.id, inner_ref.id);

    // Outer query reading the named query.
    let outer_scope = fixture.scope(None, cte_fields());
    let outer_ref = TableRef {
        id: fixture.node(),
        name: "t".to_string(),
    };
    fixture.analysis.set_scope(outer_ref.id, outer_scope);
    fixture.analysis.set_named_query(outer_ref.id, cte);

    let n = fixture.column(outer_scope, 0);
    let spec = fixture.select(Some(Relation::Table(outer_ref)), vec![n], None, false);
    Statement::Query(fixture.query(spec))
}

#[test]
fn recursion_unrolled_to_configured_depth() {
    let mut fixture = Fixture::new();
    fixture.config.max_recursion_depth = 2;
    let statement = counting_query(&mut fixture, false);

    let planned = fixture.plan(&statement).unwrap();
    assert_eq!(1, planned.fields.len());
    assert_eq!(&DataType::Int32, planned.fields[0].datatype());

    // Anchor, one branch per unrolled step, and the convergence check.
    let union = nodes(&planned.root)
        .into_iter()
        .find_map(|node| match node {
            LogicalOperator::Union(union) => Some(union),
            _ => None,
        })
        .unwrap();
    assert_eq!(4, union.children.len());

    // Every branch reads a copy of the anchor.
    for child in &union.children {
        let values = nodes(child)
            .into_iter()
            .filter(|node| matches!(node, LogicalOperator::Values(_)))
            .count();
        assert_eq!(1, values);
    }

    let check = match &union.children[3] {
        LogicalOperator::Filter(filter) => filter,
        other => panic!("unexpected convergence check: {other:?}"),
    };
    assert!(matches!(check.children[0], LogicalOperator::Window(_)));

    let count = check.node.predicate.referenced_symbols();
    assert_eq!(1, count.len());
    let mut bindings = RowBindings::default();
    bindings.insert(count[0].clone(), ScalarValue::Int64(1));
    let err = eval(&check.node.predicate, &bindings).unwrap_err();
    assert!(err.is_query_error());
    assert!(
        err.get_msg().contains("Recursion depth limit exceeded (2)"),
        "{err}"
    );
}

#[test]
fn deeper_recursion_copies_more_steps() {
    let mut shallow = Fixture::new();
    shallow.config.max_recursion_depth = 1;
    let statement = counting_query(&mut shallow, false);
    let shallow_nodes = shallow.plan(&statement).unwrap().root.node_count();

    let mut deep = Fixture::new();
    deep.config.max_recursion_depth = 3;
    let statement = counting_query(&mut deep, false);
    let deep_nodes = deep.plan(&statement).unwrap().root.node_count();

    assert!(deep_nodes > shallow_nodes, "{deep_nodes} <= {shallow_nodes}");
}

#[test]
fn union_distinct_recursion_deduplicates() {
    let mut fixture = Fixture::new();
    fixture.config.max_recursion_depth = 1;
    let statement = counting_query(&mut fixture, true);

    let planned = fixture.plan(&statement).unwrap();
    let distinct = nodes(&planned.root)
        .into_iter()
        .find_map(|node| match node {
            LogicalOperator::Aggregate(agg) => Some(agg),
            _ => None,
        })
        .unwrap();
    assert!(distinct.node.is_distinct());
    assert!(matches!(distinct.children[0], LogicalOperator::Union(_)));
}

#[test]
fn unrolled_branches_nest_fresh_step_copies() {
    let mut fixture = Fixture::new();
    fixture.config.max_recursion_depth = 3;
    let statement = counting_query(&mut fixture, false);

    let planned = fixture.plan(&statement).unwrap();
    let all = nodes(&planned.root);
    let ids: HashSet<_> = all.iter().map(|node| node.id()).collect();
    assert_eq!(all.len(), ids.len());

    let union = all
        .iter()
        .find_map(|node| match node {
            LogicalOperator::Union(union) => Some(union),
            _ => None,
        })
        .unwrap();

    // Branch i applies the step i times over its own anchor copy. The last
    // branch is the convergence check over one more step application.
    let steps: Vec<_> = union
        .children
        .iter()
        .map(|child| {
            nodes(child)
                .into_iter()
                .filter(|node| matches!(node, LogicalOperator::Filter(_)))
                .count()
        })
        .collect();
    assert_eq!(vec![0, 1, 2, 3, 5], steps);
}
