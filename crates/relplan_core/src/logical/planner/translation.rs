use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use relplan_error::{DbError, Result};

use crate::analysis::Analysis;
use crate::analysis::ast::{AstExpr, AstExprKind, NodeId};
use crate::analysis::scope::ScopeId;
use crate::analysis::scope_aware::{ScopeAwareKey, scope_aware_key};
use crate::expr::arith_expr::ArithExpr;
use crate::expr::case_expr::{CaseExpr, WhenThen};
use crate::expr::cast_expr::CastExpr;
use crate::expr::comparison_expr::IsNullExpr;
use crate::expr::conjunction_expr::ConjunctionExpr;
use crate::expr::lambda_expr::LambdaExpr;
use crate::expr::{self, Expression};
use crate::functions::FunctionKind;
use crate::logical::symbol::Symbol;

/// Maps syntax expressions onto the symbols of the plan being built.
///
/// Fields of the current relation are looked up positionally. Anything
/// else that has already been computed by the plan is found through its
/// scope aware key, or by node id for substitutions introduced by
/// coercions. Column references that don't resolve locally are handed to
/// the outer context.
#[derive(Debug, Clone)]
pub struct TranslationMap<'a> {
    analysis: &'a Analysis,
    outer_context: Option<Arc<TranslationMap<'a>>>,
    scope: ScopeId,
    /// Symbol for each field of the scope's relation. None for fields not
    /// available in the current plan, such as columns not grouped on.
    field_symbols: Vec<Option<Symbol>>,
    ast_to_symbols: HashMap<ScopeAwareKey, Symbol>,
    substitutions: HashMap<NodeId, Symbol>,
}

impl<'a> TranslationMap<'a> {
    pub fn new(
        analysis: &'a Analysis,
        outer_context: Option<Arc<TranslationMap<'a>>>,
        scope: ScopeId,
        field_symbols: Vec<Option<Symbol>>,
    ) -> Self {
        TranslationMap {
            analysis,
            outer_context,
            scope,
            field_symbols,
            ast_to_symbols: HashMap::new(),
            substitutions: HashMap::new(),
        }
    }

    pub fn analysis(&self) -> &'a Analysis {
        self.analysis
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn outer_context(&self) -> Option<&Arc<TranslationMap<'a>>> {
        self.outer_context.as_ref()
    }

    pub fn field_symbols(&self) -> &[Option<Symbol>] {
        &self.field_symbols
    }

    /// Symbol for a field of the current relation.
    pub fn field_symbol(&self, index: usize) -> Result<&Symbol> {
        self.field_symbols
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| {
                DbError::new("No symbol for field")
                    .with_field("index", index)
                    .with_field("scope", self.scope)
            })
    }

    /// Move to a new scope with new field symbols. Expressions already
    /// computed stay mapped.
    pub fn with_scope(&self, scope: ScopeId, field_symbols: Vec<Option<Symbol>>) -> Self {
        TranslationMap {
            analysis: self.analysis,
            outer_context: self.outer_context.clone(),
            scope,
            field_symbols,
            ast_to_symbols: self.ast_to_symbols.clone(),
            substitutions: self.substitutions.clone(),
        }
    }

    /// Replace the field symbols and every scope aware mapping.
    pub fn with_new_mappings(
        &self,
        mappings: HashMap<ScopeAwareKey, Symbol>,
        field_symbols: Vec<Option<Symbol>>,
    ) -> Self {
        TranslationMap {
            analysis: self.analysis,
            outer_context: self.outer_context.clone(),
            scope: self.scope,
            field_symbols,
            ast_to_symbols: mappings,
            substitutions: self.substitutions.clone(),
        }
    }

    pub fn with_additional_mappings(
        &self,
        mappings: impl IntoIterator<Item = (ScopeAwareKey, Symbol)>,
    ) -> Self {
        let mut map = self.clone();
        map.ast_to_symbols.extend(mappings);
        map
    }

    /// Map specific syntax nodes to symbols regardless of their scope aware
    /// identity.
    pub fn with_additional_identity_mappings(
        &self,
        mappings: impl IntoIterator<Item = (NodeId, Symbol)>,
    ) -> Self {
        let mut map = self.clone();
        map.substitutions.extend(mappings);
        map
    }

    pub fn key(&self, expr: &AstExpr) -> ScopeAwareKey {
        scope_aware_key(self.analysis, self.scope, expr)
    }

    /// If `expr` is already computed by the current plan.
    pub fn can_translate(&self, expr: &AstExpr) -> bool {
        if self.substitutions.contains_key(&expr.id)
            || matches!(expr.kind, AstExprKind::FieldReference(_))
            || self.ast_to_symbols.contains_key(&self.key(expr))
        {
            return true;
        }

        if let AstExprKind::Column(_) = expr.kind {
            if let Some(field) = self.analysis.column_reference(expr.id) {
                return self.analysis.is_local_scope(self.scope, field.scope);
            }
        }

        false
    }

    /// Get the symbol holding the value of `expr`.
    pub fn translate(&self, expr: &AstExpr) -> Result<Symbol> {
        match self.rewrite(expr)? {
            Expression::Symbol(symbol) => Ok(symbol),
            other => Err(DbError::new("Expression does not translate to a symbol")
                .with_field("node", expr.id)
                .with_field("rewritten", other)),
        }
    }

    /// Rewrite `expr` into the symbol space of the current plan.
    ///
    /// Coercions recorded by analysis are applied to every subexpression,
    /// but not to `expr` itself.
    pub fn rewrite(&self, expr: &AstExpr) -> Result<Expression> {
        self.rewrite_inner(expr, expr.id)
    }

    fn try_get_mapping(&self, expr: &AstExpr) -> Option<Symbol> {
        if let Some(symbol) = self.substitutions.get(&expr.id) {
            return Some(symbol.clone());
        }
        if self.ast_to_symbols.is_empty() {
            return None;
        }
        self.ast_to_symbols.get(&self.key(expr)).cloned()
    }

    fn rewrite_inner(&self, expr: &AstExpr, root: NodeId) -> Result<Expression> {
        let rewritten = match self.try_get_mapping(expr) {
            Some(symbol) => Expression::Symbol(symbol),
            None => self.rewrite_kind(expr, root)?,
        };

        if expr.id == root {
            return Ok(rewritten);
        }
        Ok(coerce_if_necessary(self.analysis, expr, rewritten))
    }

    fn rewrite_kind(&self, node: &AstExpr, root: NodeId) -> Result<Expression> {
        let child = |e: &AstExpr| self.rewrite_inner(e, root);

        Ok(match &node.kind {
            AstExprKind::Literal(value) => {
                if value.is_null() {
                    expr::typed_null(self.analysis.datatype(node.id)?.clone())
                } else {
                    expr::lit(value.clone())
                }
            }
            AstExprKind::Column(_) => return self.rewrite_column(node),
            AstExprKind::FieldReference(index) => {
                Expression::Symbol(self.field_symbol(*index)?.clone())
            }
            AstExprKind::Cast { expr: input, to } => {
                Expression::Cast(CastExpr::new(child(input)?, to.clone()))
            }
            AstExprKind::Comparison { op, left, right } => {
                expr::compare(*op, child(left)?, child(right)?)
            }
            AstExprKind::Arith { op, left, right } => Expression::Arith(ArithExpr {
                left: Box::new(child(left)?),
                right: Box::new(child(right)?),
                op: *op,
                datatype: self.analysis.datatype(node.id)?.clone(),
            }),
            AstExprKind::Conjunction { op, exprs } => Expression::Conjunction(ConjunctionExpr {
                op: *op,
                expressions: exprs.iter().map(child).collect::<Result<_>>()?,
            }),
            AstExprKind::Not(input) => expr::not(child(input)?),
            AstExprKind::IsNull {
                expr: input,
                negated,
            } => Expression::IsNull(IsNullExpr {
                input: Box::new(child(input)?),
                negated: *negated,
            }),
            AstExprKind::Case { cases, else_expr } => {
                let cases = cases
                    .iter()
                    .map(|(when, then)| {
                        Ok(WhenThen {
                            when: child(when)?,
                            then: child(then)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let else_expr = match else_expr {
                    Some(e) => Some(child(e)?),
                    None => None,
                };
                Expression::Case(CaseExpr::try_new(cases, else_expr)?)
            }
            AstExprKind::Function(call) => {
                let function = self.analysis.resolved_function(node.id)?;
                if function.kind != FunctionKind::Scalar || self.analysis.window(node.id).is_some()
                {
                    return Err(DbError::new("No mapping for aggregate or window function")
                        .with_field("function", &function.name)
                        .with_field("node", node.id));
                }
                expr::scalar_function(
                    function.clone(),
                    call.args.iter().map(child).collect::<Result<_>>()?,
                )
            }
            AstExprKind::Lambda { params, body } => Expression::Lambda(LambdaExpr {
                params: params.clone(),
                body: Box::new(child(body)?),
            }),
            AstExprKind::LambdaArgument(name) => Expression::LambdaArgument {
                name: name.clone(),
                datatype: self.analysis.datatype(node.id)?.clone(),
            },
            AstExprKind::Row(fields) => {
                expr::row(fields.iter().map(child).collect::<Result<_>>()?)
            }
            AstExprKind::FieldAccess { expr: input, index } => {
                expr::field_access(child(input)?, *index)
            }
            AstExprKind::Grouping(_) => {
                return Err(
                    DbError::new("No mapping for GROUPING operation").with_field("node", node.id)
                );
            }
            AstExprKind::Subquery(_) => {
                return Err(DbError::new("No mapping for subquery").with_field("node", node.id));
            }
        })
    }

    fn rewrite_column(&self, expr: &AstExpr) -> Result<Expression> {
        let field = self.analysis.column_reference(expr.id).ok_or_else(|| {
            DbError::new("Column reference not resolved").with_field("node", expr.id)
        })?;

        if self.analysis.is_local_scope(self.scope, field.scope) {
            let symbol = self
                .field_symbols
                .get(field.hierarchy_field_index)
                .and_then(|s| s.as_ref())
                .ok_or_else(|| {
                    DbError::new("No symbol mapping for column reference")
                        .with_field("node", expr.id)
                        .with_field("field", field.field)
                })?;
            return Ok(Expression::Symbol(symbol.clone()));
        }

        match &self.outer_context {
            Some(outer) => outer.rewrite(expr),
            None => Err(DbError::new("No mapping for correlated column reference")
                .with_field("node", expr.id)
                .with_field("scope", field.scope)),
        }
    }
}

/// Wrap an already rewritten expression in the coercion analysis recorded
/// for `expr`, if any.
pub fn coerce_if_necessary(
    analysis: &Analysis,
    expr: &AstExpr,
    rewritten: Expression,
) -> Expression {
    match analysis.coercion(expr.id) {
        Some(coercion) => Expression::Cast(CastExpr::new_type_only(
            rewritten,
            coercion.to.clone(),
            coercion.type_only,
        )),
        None => rewritten,
    }
}

/// Name hint for the symbol computing `expr`.
pub fn name_hint(expr: &AstExpr) -> &str {
    match &expr.kind {
        AstExprKind::Column(parts) => parts.last().map(|p| p.as_str()).unwrap_or("expr"),
        AstExprKind::Function(call) => &call.name,
        AstExprKind::Grouping(_) => "grouping",
        _ => "expr",
    }
}
