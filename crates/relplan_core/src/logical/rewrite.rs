use relplan_error::{DbError, Result};

use super::context::{PlanContext, PlanNodeId};
use super::logical_project::{Assignments, LogicalProject};
use super::operator::{LogicalOperator, Node};
use super::symbol::Symbol;
use crate::expr;

/// A plan along with the symbols for each of its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAndMappings {
    pub root: LogicalOperator,
    pub fields: Vec<Symbol>,
}

impl NodeAndMappings {
    pub fn new(root: LogicalOperator, fields: Vec<Symbol>) -> Self {
        NodeAndMappings { root, fields }
    }
}

/// Replace every node in `plan` with the id `spot` by `replacement`.
///
/// The replacement is wrapped in a projection exposing the replacement's
/// fields under the spot's field symbols so that the rest of the plan keeps
/// referencing the same symbols.
pub fn replace_node(
    ctx: &mut PlanContext,
    mut plan: LogicalOperator,
    spot: PlanNodeId,
    spot_fields: &[Symbol],
    replacement: &NodeAndMappings,
) -> Result<LogicalOperator> {
    if spot_fields.len() != replacement.fields.len() {
        return Err(DbError::new("Mismatching outputs in replacement")
            .with_field("expected", spot_fields.len())
            .with_field("got", replacement.fields.len()));
    }

    let mut assignments = Assignments::new();
    for (spot_field, field) in spot_fields.iter().zip(&replacement.fields) {
        if spot_field.datatype() != field.datatype() {
            return Err(DbError::new("Mismatching types in replacement")
                .with_field("expected", spot_field.datatype())
                .with_field("got", field.datatype()));
        }
        assignments.put(spot_field.clone(), expr::sym(field));
    }

    let project = LogicalOperator::Project(Node::new(
        ctx.next_id(),
        LogicalProject { assignments },
        vec![replacement.root.clone()],
    ));

    let replaced = replace_in(&mut plan, spot, &project);
    if replaced == 0 {
        return Err(DbError::new("Replacement spot not found in plan").with_field("spot", spot));
    }

    Ok(plan)
}

fn replace_in(plan: &mut LogicalOperator, spot: PlanNodeId, with: &LogicalOperator) -> usize {
    if plan.id() == spot {
        *plan = with.clone();
        return 1;
    }
    plan.children_mut()
        .iter_mut()
        .map(|child| replace_in(child, spot, with))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::logical_filter::LogicalFilter;
    use crate::logical::logical_values::LogicalValues;
    use crate::logical::operator::LogicalNode;
    use crate::types::datatype::DataType;

    fn values(ctx: &mut PlanContext, name: &str) -> NodeAndMappings {
        let s = ctx.new_symbol(name, DataType::Int32);
        let root = LogicalOperator::Values(Node::new(
            ctx.next_id(),
            LogicalValues {
                outputs: vec![s.clone()],
                rows: vec![vec![expr::lit(1_i32)]],
            },
            Vec::new(),
        ));
        NodeAndMappings::new(root, vec![s])
    }

    #[test]
    fn replace_by_id() {
        let mut ctx = PlanContext::new();
        let spot = values(&mut ctx, "x");
        let filter = LogicalOperator::Filter(Node::new(
            ctx.next_id(),
            LogicalFilter {
                predicate: expr::lit(true),
            },
            vec![spot.root.clone()],
        ));

        let replacement = values(&mut ctx, "y");
        let out = replace_node(&mut ctx, filter, spot.root.id(), &spot.fields, &replacement).unwrap();

        // Filter -> Project -> Values(y)
        assert_eq!(3, out.node_count());
        assert_eq!(spot.fields, out.output_symbols());
        let project = &out.children()[0];
        assert_eq!("Project", project.name());
        assert_eq!(replacement.root.id(), project.children()[0].id());
    }

    #[test]
    fn replace_arity_mismatch() {
        let mut ctx = PlanContext::new();
        let spot = values(&mut ctx, "x");
        let replacement = NodeAndMappings::new(values(&mut ctx, "y").root, Vec::new());

        let err = replace_node(
            &mut ctx,
            spot.root.clone(),
            spot.root.id(),
            &spot.fields,
            &replacement,
        )
        .unwrap_err();
        assert_eq!(Some("1"), err.get_field("expected"));
    }

    #[test]
    fn replace_missing_spot() {
        let mut ctx = PlanContext::new();
        let plan = values(&mut ctx, "x");
        let replacement = values(&mut ctx, "y");
        replace_node(
            &mut ctx,
            plan.root.clone(),
            PlanNodeId(999),
            &plan.fields,
            &replacement,
        )
        .unwrap_err();
    }
}
