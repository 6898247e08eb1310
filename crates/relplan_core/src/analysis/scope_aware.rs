//! Expression identity that considers what identifiers resolve to.
//!
//! Two expressions have equal keys when they have the same shape and every
//! column reference resolves to the same field of a local scope. Column
//! references to enclosing queries and subqueries only ever equal
//! themselves.

use super::Analysis;
use super::ast::{AstExpr, AstExprKind, NodeId, NullTreatment, SortItem};
use super::scope::{FieldId, ScopeId};
use crate::expr::arith_expr::ArithOperator;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::conjunction_expr::ConjunctionOperator;
use crate::logical::logical_window::{FrameBoundType, FrameType};
use crate::types::datatype::DataType;
use crate::types::scalar::ScalarValue;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeAwareKey {
    node: KeyNode,
    children: Vec<ScopeAwareKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyNode {
    Literal(ScalarValue),
    Field(FieldId),
    FieldReference(usize),
    /// Compared by syntax node identity.
    Identity(NodeId),
    Cast(DataType),
    Comparison(ComparisonOperator),
    Arith(ArithOperator),
    Conjunction(ConjunctionOperator),
    Not,
    IsNull(bool),
    Case { has_else: bool },
    Function(FunctionShape),
    Lambda(Vec<String>),
    LambdaArgument(String),
    Row,
    FieldAccess(usize),
    Grouping,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionShape {
    name: String,
    distinct: bool,
    has_filter: bool,
    order_by: Vec<(bool, Option<bool>)>,
    null_treatment: Option<NullTreatment>,
    window: Option<WindowShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowShape {
    partition_count: usize,
    order_by: Vec<(bool, Option<bool>)>,
    frame: Option<(FrameType, FrameBoundType, Option<FrameBoundType>)>,
}

fn sort_shape(items: &[SortItem]) -> Vec<(bool, Option<bool>)> {
    items.iter().map(|i| (i.desc, i.nulls_first)).collect()
}

/// Compute the key for `expr` as seen from `scope`.
pub fn scope_aware_key(analysis: &Analysis, scope: ScopeId, expr: &AstExpr) -> ScopeAwareKey {
    let node = match &expr.kind {
        AstExprKind::Literal(v) => KeyNode::Literal(v.clone()),
        AstExprKind::Column(_) => match analysis.column_reference(expr.id) {
            Some(field) if analysis.is_local_scope(scope, field.scope) => {
                KeyNode::Field(field.field)
            }
            _ => KeyNode::Identity(expr.id),
        },
        AstExprKind::FieldReference(idx) => KeyNode::FieldReference(*idx),
        AstExprKind::Subquery(_) => KeyNode::Identity(expr.id),
        AstExprKind::Cast { to, .. } => KeyNode::Cast(to.clone()),
        AstExprKind::Comparison { op, .. } => KeyNode::Comparison(*op),
        AstExprKind::Arith { op, .. } => KeyNode::Arith(*op),
        AstExprKind::Conjunction { op, .. } => KeyNode::Conjunction(*op),
        AstExprKind::Not(_) => KeyNode::Not,
        AstExprKind::IsNull { negated, .. } => KeyNode::IsNull(*negated),
        AstExprKind::Case { else_expr, .. } => KeyNode::Case {
            has_else: else_expr.is_some(),
        },
        AstExprKind::Function(call) => {
            let window = analysis.window(expr.id).map(|w| WindowShape {
                partition_count: w.partition_by.len(),
                order_by: sort_shape(&w.order_by),
                frame: w.frame.as_ref().map(|f| {
                    (
                        f.frame_type,
                        f.start.bound_type,
                        f.end.as_ref().map(|e| e.bound_type),
                    )
                }),
            });
            KeyNode::Function(FunctionShape {
                name: call.name.clone(),
                distinct: call.distinct,
                has_filter: call.filter.is_some(),
                order_by: sort_shape(&call.order_by),
                null_treatment: call.null_treatment,
                window,
            })
        }
        AstExprKind::Lambda { params, .. } => {
            KeyNode::Lambda(params.iter().map(|p| p.name.clone()).collect())
        }
        AstExprKind::LambdaArgument(name) => KeyNode::LambdaArgument(name.clone()),
        AstExprKind::Row(_) => KeyNode::Row,
        AstExprKind::FieldAccess { index, .. } => KeyNode::FieldAccess(*index),
        AstExprKind::Grouping(_) => KeyNode::Grouping,
    };

    let mut children = Vec::new();
    expr.for_each_child(&mut |child| children.push(scope_aware_key(analysis, scope, child)));

    if let Some(window) = analysis.window(expr.id) {
        for partition in &window.partition_by {
            children.push(scope_aware_key(analysis, scope, partition));
        }
        for item in &window.order_by {
            children.push(scope_aware_key(analysis, scope, &item.key));
        }
        if let Some(frame) = &window.frame {
            // Offsets are positional, a missing offset still takes a slot.
            for value in [frame.start_value(), frame.end_value()] {
                match value {
                    Some(value) => children.push(scope_aware_key(analysis, scope, value)),
                    None => children.push(ScopeAwareKey {
                        node: KeyNode::Literal(ScalarValue::Null),
                        children: Vec::new(),
                    }),
                }
            }
        }
    }

    ScopeAwareKey { node, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scope::{Field, RelationId, RelationType, ResolvedField, Scope};

    struct Fixture {
        analysis: Analysis,
        scope: ScopeId,
        next: u32,
    }

    impl Fixture {
        fn new() -> Self {
            let mut analysis = Analysis::new();
            let scope = analysis.add_scope(Scope {
                parent: None,
                query_boundary: false,
                relation_id: RelationId(0),
                relation_type: RelationType::new([
                    Field::new("x", DataType::Int32),
                    Field::new("y", DataType::Int32),
                ]),
            });
            Fixture {
                analysis,
                scope,
                next: 0,
            }
        }

        fn id(&mut self) -> NodeId {
            self.next += 1;
            NodeId(self.next)
        }

        fn column(&mut self, name: &str, index: usize, scope: ScopeId) -> AstExpr {
            let id = self.id();
            self.analysis.set_column_reference(
                id,
                ResolvedField {
                    scope,
                    field: FieldId::new(RelationId(0), index),
                    hierarchy_field_index: index,
                },
            );
            AstExpr::new(id, AstExprKind::Column(vec![name.to_string()]))
        }

        fn plus_one(&mut self, left: AstExpr) -> AstExpr {
            let one = AstExpr::new(self.id(), AstExprKind::Literal(ScalarValue::Int32(1)));
            AstExpr::new(
                self.id(),
                AstExprKind::Arith {
                    op: ArithOperator::Add,
                    left: Box::new(left),
                    right: Box::new(one),
                },
            )
        }
    }

    #[test]
    fn same_field_different_syntax() {
        let mut f = Fixture::new();
        let scope = f.scope;
        let a = f.column("x", 0, scope);
        let a = f.plus_one(a);
        let b = f.column("t.x", 0, scope);
        let b = f.plus_one(b);

        assert_eq!(
            scope_aware_key(&f.analysis, scope, &a),
            scope_aware_key(&f.analysis, scope, &b)
        );

        let c = f.column("y", 1, scope);
        let c = f.plus_one(c);
        assert_ne!(
            scope_aware_key(&f.analysis, scope, &a),
            scope_aware_key(&f.analysis, scope, &c)
        );
    }

    #[test]
    fn outer_references_compare_by_identity() {
        let mut f = Fixture::new();
        let outer = f.scope;
        let inner = f.analysis.add_scope(Scope {
            parent: Some(outer),
            query_boundary: true,
            relation_id: RelationId(1),
            relation_type: RelationType::default(),
        });

        let a = f.column("x", 0, outer);
        let b = f.column("x", 0, outer);

        assert_ne!(
            scope_aware_key(&f.analysis, inner, &a),
            scope_aware_key(&f.analysis, inner, &b)
        );
        assert_eq!(
            scope_aware_key(&f.analysis, outer, &a),
            scope_aware_key(&f.analysis, outer, &b)
        );
    }
}
