use std::fmt::Debug;

use relplan_error::{Result, not_implemented};

use super::PlannerEnv;
use super::plan_builder::PlanBuilder;
use crate::analysis::ast::AstExpr;
use crate::logical::context::PlanContext;

/// Plans subquery expressions into the current plan.
///
/// After handling, every subquery passed in must be translatable by the
/// returned builder.
pub trait SubqueryPlanner: Debug + Sync + Send {
    fn handle_subqueries<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        subqueries: &[&AstExpr],
    ) -> Result<PlanBuilder<'a>>;
}

/// Subquery planner for environments without decorrelation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedSubqueryPlanner;

impl SubqueryPlanner for UnsupportedSubqueryPlanner {
    fn handle_subqueries<'a>(
        &self,
        _env: &PlannerEnv<'a>,
        _ctx: &mut PlanContext,
        _builder: PlanBuilder<'a>,
        subqueries: &[&AstExpr],
    ) -> Result<PlanBuilder<'a>> {
        not_implemented!("subquery expressions ({} found)", subqueries.len())
    }
}

/// Plan the subqueries in `exprs` that the builder can't translate yet.
pub fn handle_subqueries<'a, 'e>(
    env: &PlannerEnv<'a>,
    ctx: &mut PlanContext,
    builder: PlanBuilder<'a>,
    exprs: impl IntoIterator<Item = &'e AstExpr>,
) -> Result<PlanBuilder<'a>> {
    let mut subqueries = Vec::new();
    for expr in exprs {
        expr.collect_subqueries(&mut subqueries);
    }
    subqueries.retain(|subquery| !builder.can_translate(subquery));

    if subqueries.is_empty() {
        return Ok(builder);
    }
    env.subqueries
        .handle_subqueries(env, ctx, builder, &subqueries)
}
