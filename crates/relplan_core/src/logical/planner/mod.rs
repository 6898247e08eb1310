//! Turns an analyzed statement into a logical plan.
//!
//! Planning reads everything it needs from the `Analysis` and the catalog
//! `Metadata`. Node ids and symbols are allocated from the `PlanContext`
//! passed in, which is scoped to planning one statement.

pub mod coerce;
pub mod grouping_sets;
pub mod plan_aggregate;
pub mod plan_builder;
pub mod plan_from;
pub mod plan_merge;
pub mod plan_mutation;
pub mod plan_query;
pub mod plan_recursive;
pub mod plan_window;
pub mod relation_plan;
pub mod subquery;
pub mod translation;

use std::sync::Arc;

use ahash::HashMap;
use indexmap::IndexSet;
use plan_merge::MergePlanner;
use plan_mutation::MutationPlanner;
use plan_query::QueryPlanner;
use relation_plan::RelationPlan;
use relplan_error::Result;
use subquery::{SubqueryPlanner, UnsupportedSubqueryPlanner};
use tracing::debug;
use translation::TranslationMap;

use super::context::PlanContext;
use super::logical_project::{Assignments, LogicalProject};
use super::operator::{LogicalNode, LogicalOperator, Node};
use super::symbol::Symbol;
use crate::analysis::Analysis;
use crate::analysis::ast::{NodeId, Statement};
use crate::analysis::scope::RelationType;
use crate::catalog::Metadata;
use crate::config::session::PlannerConfig;
use crate::explain::node::ExplainedPlan;

/// Everything planning steps read but never modify.
#[derive(Debug, Clone)]
pub struct PlannerEnv<'a> {
    pub analysis: &'a Analysis,
    pub metadata: &'a dyn Metadata,
    pub config: &'a PlannerConfig,
    pub subqueries: &'a dyn SubqueryPlanner,
    /// Translations of the enclosing query when planning a correlated
    /// subquery.
    pub outer_context: Option<Arc<TranslationMap<'a>>>,
    /// Plans to substitute for references to a recursive query, keyed by
    /// the referencing table node.
    pub recursive_subqueries: Arc<HashMap<NodeId, RelationPlan<'a>>>,
}

impl<'a> PlannerEnv<'a> {
    pub fn new(
        analysis: &'a Analysis,
        metadata: &'a dyn Metadata,
        config: &'a PlannerConfig,
        subqueries: &'a dyn SubqueryPlanner,
    ) -> Self {
        PlannerEnv {
            analysis,
            metadata,
            config,
            subqueries,
            outer_context: None,
            recursive_subqueries: Arc::new(HashMap::default()),
        }
    }

    pub fn with_outer_context(&self, outer_context: Arc<TranslationMap<'a>>) -> Self {
        PlannerEnv {
            outer_context: Some(outer_context),
            ..self.clone()
        }
    }

    pub fn with_recursive_subqueries(
        &self,
        recursive_subqueries: HashMap<NodeId, RelationPlan<'a>>,
    ) -> Self {
        PlannerEnv {
            recursive_subqueries: Arc::new(recursive_subqueries),
            ..self.clone()
        }
    }
}

/// Result of planning a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub root: LogicalOperator,
    /// Output symbols in output order.
    pub fields: Vec<Symbol>,
    /// Fields of the query result. None for row mutations.
    pub descriptor: Option<RelationType>,
}

impl PlannedStatement {
    pub fn explain(&self, verbose: bool) -> ExplainedPlan {
        ExplainedPlan::new_from_logical(verbose, &self.root)
    }
}

/// Entry point for planning analyzed statements.
#[derive(Debug)]
pub struct LogicalPlanner<'a> {
    analysis: &'a Analysis,
    metadata: &'a dyn Metadata,
    config: &'a PlannerConfig,
    subqueries: &'a dyn SubqueryPlanner,
}

impl<'a> LogicalPlanner<'a> {
    pub fn new(
        analysis: &'a Analysis,
        metadata: &'a dyn Metadata,
        config: &'a PlannerConfig,
    ) -> Self {
        LogicalPlanner {
            analysis,
            metadata,
            config,
            subqueries: &UnsupportedSubqueryPlanner,
        }
    }

    pub fn with_subquery_planner(mut self, subqueries: &'a dyn SubqueryPlanner) -> Self {
        self.subqueries = subqueries;
        self
    }

    pub fn plan_statement(
        &self,
        ctx: &mut PlanContext,
        statement: &Statement,
    ) -> Result<PlannedStatement> {
        let env = PlannerEnv::new(self.analysis, self.metadata, self.config, self.subqueries);

        let planned = match statement {
            Statement::Query(query) => {
                let plan = QueryPlanner.plan_query(&env, ctx, query)?;
                let descriptor = plan.descriptor(self.analysis)?.clone();
                let fields = plan.visible_fields(self.analysis)?;

                // Only the result columns leave the plan, each once.
                let outputs: IndexSet<&Symbol> = fields.iter().collect();
                let root = LogicalOperator::Project(Node::new(
                    ctx.next_id(),
                    LogicalProject {
                        assignments: Assignments::identity(outputs),
                    },
                    vec![plan.root],
                ));
                PlannedStatement {
                    root,
                    fields,
                    descriptor: Some(descriptor),
                }
            }
            Statement::Delete(delete) => {
                let root = MutationPlanner.plan_delete(&env, ctx, delete)?;
                Self::mutation(root)
            }
            Statement::Update(update) => {
                let root = MutationPlanner.plan_update(&env, ctx, update)?;
                Self::mutation(root)
            }
            Statement::Merge(merge) => {
                let root = MergePlanner.plan_merge(&env, ctx, merge)?;
                Self::mutation(root)
            }
        };

        debug!(
            nodes = planned.root.node_count(),
            symbols = ctx.symbols.len(),
            "planned statement"
        );

        Ok(planned)
    }

    fn mutation(root: LogicalOperator) -> PlannedStatement {
        PlannedStatement {
            fields: root.output_symbols(),
            root,
            descriptor: None,
        }
    }
}
