use std::sync::Arc;

use ahash::{HashSet, HashSetExt};
use relplan_error::{DbError, Result};

use super::translation::TranslationMap;
use crate::analysis::Analysis;
use crate::analysis::scope::{RelationType, ScopeId};
use crate::expr::cast_expr::CastExpr;
use crate::expr::{self, Expression};
use crate::logical::context::PlanContext;
use crate::logical::logical_project::{Assignments, LogicalProject};
use crate::logical::operator::{LogicalOperator, Node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;

/// A planned relation: the plan producing it and the symbol for each of its
/// fields, hidden fields included.
#[derive(Debug, Clone)]
pub struct RelationPlan<'a> {
    pub root: LogicalOperator,
    pub scope: ScopeId,
    pub fields: Vec<Symbol>,
    pub outer_context: Option<Arc<TranslationMap<'a>>>,
}

impl<'a> RelationPlan<'a> {
    pub fn new(
        root: LogicalOperator,
        scope: ScopeId,
        fields: Vec<Symbol>,
        outer_context: Option<Arc<TranslationMap<'a>>>,
    ) -> Self {
        RelationPlan {
            root,
            scope,
            fields,
            outer_context,
        }
    }

    pub fn descriptor<'b>(&self, analysis: &'b Analysis) -> Result<&'b RelationType> {
        analysis.relation_type(self.scope)
    }

    pub fn field_symbol(&self, index: usize) -> Result<&Symbol> {
        self.fields.get(index).ok_or_else(|| {
            DbError::new("Field index out of bounds")
                .with_field("index", index)
                .with_field("fields", self.fields.len())
        })
    }

    /// Symbols of the fields not marked hidden.
    pub fn visible_fields(&self, analysis: &Analysis) -> Result<Vec<Symbol>> {
        let descriptor = self.descriptor(analysis)?;
        descriptor
            .visible_field_indices()
            .map(|idx| self.field_symbol(idx).cloned())
            .collect()
    }

    /// Project only the visible fields.
    pub fn prune_invisible_fields(
        self,
        ctx: &mut PlanContext,
        analysis: &Analysis,
    ) -> Result<LogicalOperator> {
        let visible = self.visible_fields(analysis)?;
        Ok(LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject {
                assignments: Assignments::identity(&visible),
            },
            vec![self.root],
        )))
    }

    /// Project the visible fields cast to `types`, returning the new plan
    /// and the symbol for each visible field.
    ///
    /// Fields already of the right type pass through.
    pub fn coerce_relation(
        self,
        ctx: &mut PlanContext,
        analysis: &Analysis,
        types: &[DataType],
    ) -> Result<(LogicalOperator, Vec<Symbol>)> {
        let visible = self.visible_fields(analysis)?;
        if visible.len() != types.len() {
            return Err(DbError::new("Coercion arity does not match relation")
                .with_field("fields", visible.len())
                .with_field("types", types.len()));
        }

        let mut assignments = Assignments::new();
        let mut fields = Vec::with_capacity(visible.len());
        for (symbol, datatype) in visible.iter().zip(types) {
            if symbol.datatype() == datatype {
                assignments.put_identity(symbol);
                fields.push(symbol.clone());
            } else {
                let coerced = ctx.symbols.new_symbol(symbol.name(), datatype.clone());
                assignments.put(
                    coerced.clone(),
                    Expression::Cast(CastExpr::new(expr::sym(symbol), datatype.clone())),
                );
                fields.push(coerced);
            }
        }

        let root = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![self.root],
        ));
        Ok((root, fields))
    }

    /// Coerce to `types` if given, otherwise prune to the visible fields.
    pub fn coerce_or_prune(
        self,
        ctx: &mut PlanContext,
        analysis: &Analysis,
        types: Option<&[DataType]>,
    ) -> Result<(LogicalOperator, Vec<Symbol>)> {
        match types {
            Some(types) => self.coerce_relation(ctx, analysis, types),
            None => {
                let fields = self.visible_fields(analysis)?;
                Ok((self.prune_invisible_fields(ctx, analysis)?, fields))
            }
        }
    }
}

/// Make every output of a plan a distinct symbol.
///
/// A relation may expose the same symbol as several fields. Substituting
/// such a relation into another plan needs a symbol per field, so repeats
/// get projected into new symbols.
pub fn disambiguate_outputs(
    ctx: &mut PlanContext,
    root: LogicalOperator,
    fields: Vec<Symbol>,
) -> (LogicalOperator, Vec<Symbol>) {
    let mut seen = HashSet::new();
    if fields.iter().all(|f| seen.insert(f.clone())) {
        return (root, fields);
    }

    let mut seen = HashSet::new();
    let mut assignments = Assignments::new();
    let mut new_fields = Vec::with_capacity(fields.len());
    for field in fields {
        if seen.insert(field.clone()) {
            assignments.put_identity(&field);
            new_fields.push(field);
        } else {
            let copy = ctx.symbols.new_symbol_like(&field);
            assignments.put(copy.clone(), expr::sym(&field));
            new_fields.push(copy);
        }
    }

    let root = LogicalOperator::Project(Node::new(
        ctx.next_id(),
        LogicalProject { assignments },
        vec![root],
    ));
    (root, new_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::logical_values::LogicalValues;
    use crate::logical::operator::LogicalNode;

    fn values(ctx: &mut PlanContext, outputs: Vec<Symbol>) -> LogicalOperator {
        LogicalOperator::Values(Node::new(
            ctx.next_id(),
            LogicalValues {
                outputs,
                rows: Vec::new(),
            },
            Vec::new(),
        ))
    }

    #[test]
    fn disambiguate_repeated_fields() {
        let mut ctx = PlanContext::new();
        let a = ctx.new_symbol("a", DataType::Int32);
        let root = values(&mut ctx, vec![a.clone()]);

        let (root, fields) = disambiguate_outputs(&mut ctx, root, vec![a.clone(), a.clone()]);
        assert_eq!(2, fields.len());
        assert_eq!(a, fields[0]);
        assert_ne!(a, fields[1]);
        assert_eq!(fields, root.output_symbols());
    }

    #[test]
    fn distinct_fields_untouched() {
        let mut ctx = PlanContext::new();
        let a = ctx.new_symbol("a", DataType::Int32);
        let b = ctx.new_symbol("b", DataType::Int32);
        let root = values(&mut ctx, vec![a.clone(), b.clone()]);

        let (root, fields) = disambiguate_outputs(&mut ctx, root, vec![a, b]);
        assert!(matches!(root, LogicalOperator::Values(_)));
        assert_eq!(2, fields.len());
    }
}
