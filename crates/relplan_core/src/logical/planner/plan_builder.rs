use ahash::{HashMap, HashMapExt};
use relplan_error::Result;

use super::relation_plan::RelationPlan;
use super::translation::{TranslationMap, name_hint};
use crate::analysis::Analysis;
use crate::analysis::ast::AstExpr;
use crate::analysis::scope::ScopeId;
use crate::analysis::scope_aware::ScopeAwareKey;
use crate::expr::Expression;
use crate::logical::context::PlanContext;
use crate::logical::logical_project::{Assignments, LogicalProject};
use crate::logical::operator::{LogicalNode, LogicalOperator, Node};
use crate::logical::symbol::Symbol;

/// A plan under construction along with how to translate expressions into
/// it.
///
/// Every step consumes the builder and returns a new one, the root of the
/// previous builder becomes a child of whatever was appended.
#[derive(Debug, Clone)]
pub struct PlanBuilder<'a> {
    translations: TranslationMap<'a>,
    root: LogicalOperator,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(translations: TranslationMap<'a>, root: LogicalOperator) -> Self {
        PlanBuilder { translations, root }
    }

    pub fn from_relation_plan(analysis: &'a Analysis, plan: RelationPlan<'a>) -> Self {
        let translations = TranslationMap::new(
            analysis,
            plan.outer_context,
            plan.scope,
            plan.fields.into_iter().map(Some).collect(),
        );
        PlanBuilder::new(translations, plan.root)
    }

    pub fn root(&self) -> &LogicalOperator {
        &self.root
    }

    pub fn into_root(self) -> LogicalOperator {
        self.root
    }

    pub fn translations(&self) -> &TranslationMap<'a> {
        &self.translations
    }

    pub fn analysis(&self) -> &'a Analysis {
        self.translations.analysis()
    }

    pub fn scope(&self) -> ScopeId {
        self.translations.scope()
    }

    /// Replace the root with a node built on top of it.
    pub fn map_root(self, f: impl FnOnce(LogicalOperator) -> LogicalOperator) -> Self {
        PlanBuilder {
            translations: self.translations,
            root: f(self.root),
        }
    }

    pub fn with_translations(self, translations: TranslationMap<'a>) -> Self {
        PlanBuilder {
            translations,
            root: self.root,
        }
    }

    pub fn with_scope(self, scope: ScopeId, fields: Vec<Option<Symbol>>) -> Self {
        let translations = self.translations.with_scope(scope, fields);
        self.with_translations(translations)
    }

    pub fn can_translate(&self, expr: &AstExpr) -> bool {
        self.translations.can_translate(expr)
    }

    pub fn translate(&self, expr: &AstExpr) -> Result<Symbol> {
        self.translations.translate(expr)
    }

    pub fn rewrite(&self, expr: &AstExpr) -> Result<Expression> {
        self.translations.rewrite(expr)
    }

    pub fn field_symbol(&self, index: usize) -> Result<&Symbol> {
        self.translations.field_symbol(index)
    }

    /// Wrap the root in a projection passing through every current output
    /// and computing `assignments` on top.
    pub fn project_with_identities(
        self,
        ctx: &mut PlanContext,
        extra: impl IntoIterator<Item = (Symbol, Expression)>,
    ) -> Self {
        let mut assignments = Assignments::identity(&self.root.output_symbols());
        for (symbol, expr) in extra {
            assignments.put(symbol, expr);
        }
        let project = LogicalOperator::Project(Node::new(
            ctx.next_id(),
            LogicalProject { assignments },
            vec![self.root],
        ));
        PlanBuilder {
            translations: self.translations,
            root: project,
        }
    }

    /// Project each expression not yet computed by the plan into a new
    /// symbol.
    ///
    /// Expressions equal under scope aware equality share one symbol.
    pub fn append_projections<'e>(
        self,
        ctx: &mut PlanContext,
        exprs: impl IntoIterator<Item = &'e AstExpr>,
    ) -> Result<Self> {
        self.append_projections_with(
            ctx,
            exprs,
            |translations, expr| translations.rewrite(expr),
            |translations, expr| translations.can_translate(expr),
        )
    }

    /// Like `append_projections` with a custom rewrite, and a custom check
    /// for whether an expression is already available.
    pub fn append_projections_with<'e, R, P>(
        self,
        ctx: &mut PlanContext,
        exprs: impl IntoIterator<Item = &'e AstExpr>,
        mut rewriter: R,
        already_translated: P,
    ) -> Result<Self>
    where
        R: FnMut(&TranslationMap<'a>, &AstExpr) -> Result<Expression>,
        P: Fn(&TranslationMap<'a>, &AstExpr) -> bool,
    {
        let analysis = self.analysis();
        let mut projections = Vec::new();
        let mut mappings: HashMap<ScopeAwareKey, Symbol> = HashMap::new();

        for expr in exprs {
            let key = self.translations.key(expr);
            if mappings.contains_key(&key) || already_translated(&self.translations, expr) {
                continue;
            }
            let symbol = ctx.new_symbol(name_hint(expr), analysis.datatype(expr.id)?.clone());
            projections.push((symbol.clone(), rewriter(&self.translations, expr)?));
            mappings.insert(key, symbol);
        }

        if projections.is_empty() {
            return Ok(self);
        }

        let translations = self.translations.with_additional_mappings(mappings);
        Ok(self
            .project_with_identities(ctx, projections)
            .with_translations(translations))
    }
}
