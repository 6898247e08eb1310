use ahash::{HashMap, HashMapExt};
use relplan_error::Result;

use super::plan_builder::PlanBuilder;
use super::translation::name_hint;
use crate::analysis::ast::{AstExpr, NodeId};
use crate::expr::Expression;
use crate::expr::cast_expr::CastExpr;
use crate::logical::context::PlanContext;
use crate::logical::symbol::Symbol;

/// A plan along with the symbol holding the coerced value of each
/// expression passed to `coerce`.
#[derive(Debug, Clone)]
pub struct PlanAndMappings<'a> {
    pub builder: PlanBuilder<'a>,
    mappings: HashMap<NodeId, Symbol>,
}

impl<'a> PlanAndMappings<'a> {
    pub fn into_parts(self) -> (PlanBuilder<'a>, HashMap<NodeId, Symbol>) {
        (self.builder, self.mappings)
    }
}

/// Apply the coercions analysis recorded for each expression.
///
/// Every expression must already be computed by the plan. Expressions with
/// a coercion get cast into a new symbol, the rest map to their existing
/// symbol.
pub fn coerce<'a, 'e>(
    builder: PlanBuilder<'a>,
    ctx: &mut PlanContext,
    exprs: impl IntoIterator<Item = &'e AstExpr>,
) -> Result<PlanAndMappings<'a>> {
    let analysis = builder.analysis();
    let mut mappings = HashMap::new();
    let mut casts = Vec::new();

    for expr in exprs {
        // The same node can be passed more than once, eg. an ordinal
        // reference in GROUP BY.
        if mappings.contains_key(&expr.id) {
            continue;
        }
        match analysis.coercion(expr.id) {
            Some(coercion) => {
                let symbol = ctx.new_symbol(name_hint(expr), coercion.to.clone());
                let cast = CastExpr::new_type_only(
                    builder.rewrite(expr)?,
                    coercion.to.clone(),
                    coercion.type_only,
                );
                casts.push((symbol.clone(), Expression::Cast(cast)));
                mappings.insert(expr.id, symbol);
            }
            None => {
                mappings.insert(expr.id, builder.translate(expr)?);
            }
        }
    }

    let builder = if casts.is_empty() {
        builder
    } else {
        builder.project_with_identities(ctx, casts)
    };

    Ok(PlanAndMappings { builder, mappings })
}
