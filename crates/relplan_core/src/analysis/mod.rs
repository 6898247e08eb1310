//! The contract between semantic analysis and planning.
//!
//! Analysis resolves names, types, functions and coercions for a statement
//! and records the results keyed by syntax node id. The planner never
//! resolves anything itself, it only reads what's recorded here. A missing
//! entry the planner needs is a bug in analysis and surfaces as an internal
//! error.

pub mod ast;
pub mod grouping;
pub mod merge;
pub mod scope;
pub mod scope_aware;
pub mod window;

use ahash::{HashMap, HashSet};
use ast::{AstExpr, NodeId, Query};
use grouping::AggregationAnalysis;
use merge::MergeAnalysis;
use relplan_error::{DbError, OptionExt, Result};
use scope::{RelationType, ResolvedField, Scope, ScopeId};
use window::ResolvedWindow;

use crate::catalog::TableHandle;
use crate::functions::ResolvedFunction;
use crate::types::datatype::DataType;

/// Implicit conversion analysis decided an expression needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coercion {
    pub to: DataType,
    /// The conversion doesn't change the physical representation.
    pub type_only: bool,
}

/// One item of a select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    pub expr: AstExpr,
    /// Expressions the item unfolds into (`row_value.*`).
    pub unfolded: Option<Vec<AstExpr>>,
}

impl SelectExpression {
    pub fn new(expr: AstExpr) -> Self {
        SelectExpression {
            expr,
            unfolded: None,
        }
    }

    pub fn unfolded(expr: AstExpr, unfolded: Vec<AstExpr>) -> Self {
        SelectExpression {
            expr,
            unfolded: Some(unfolded),
        }
    }
}

#[derive(Debug, Default)]
pub struct Analysis {
    scopes: Vec<Scope>,
    node_scopes: HashMap<NodeId, ScopeId>,
    implicit_from_scopes: HashMap<NodeId, ScopeId>,
    types: HashMap<NodeId, DataType>,
    coercions: HashMap<NodeId, Coercion>,
    column_references: HashMap<NodeId, ResolvedField>,
    resolved_functions: HashMap<NodeId, ResolvedFunction>,
    windows: HashMap<NodeId, ResolvedWindow>,
    frame_bound_calculations: HashMap<NodeId, ResolvedFunction>,
    sort_key_coercions_for_calculation: HashMap<NodeId, DataType>,
    sort_key_coercions_for_comparison: HashMap<NodeId, DataType>,
    tables: HashMap<NodeId, TableHandle>,
    update_targets: HashSet<NodeId>,
    named_queries: HashMap<NodeId, Query>,
    /// Expandable (recursive) query id to the table reference that refers
    /// back to the query.
    expandable_queries: HashMap<NodeId, NodeId>,
    relation_coercions: HashMap<NodeId, Vec<DataType>>,
    row_id_fields: HashMap<NodeId, usize>,
    select_expressions: HashMap<NodeId, Vec<SelectExpression>>,
    aggregations: HashMap<NodeId, AggregationAnalysis>,
    window_functions: HashMap<NodeId, Vec<AstExpr>>,
    order_by_expressions: HashMap<NodeId, Vec<AstExpr>>,
    order_by_aggregates: HashMap<NodeId, Vec<AstExpr>>,
    order_by_window_functions: HashMap<NodeId, Vec<AstExpr>>,
    redundant_order_by: HashSet<NodeId>,
    merge_analysis: Option<MergeAnalysis>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn scope(&self, id: ScopeId) -> Result<&Scope> {
        self.scopes
            .get(id.0 as usize)
            .ok_or_else(|| DbError::new("Missing scope").with_field("scope", id))
    }

    pub fn relation_type(&self, id: ScopeId) -> Result<&RelationType> {
        Ok(&self.scope(id)?.relation_type)
    }

    /// If `other` is `scope` or one of its parents within the same query.
    pub fn is_local_scope(&self, scope: ScopeId, other: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == other {
                return true;
            }
            current = self.scopes.get(id.0 as usize).and_then(|s| s.local_parent());
        }
        false
    }

    /// Record the output scope of a relation, query, or ORDER BY clause.
    pub fn set_scope(&mut self, node: NodeId, scope: ScopeId) {
        self.node_scopes.insert(node, scope);
    }

    pub fn scope_of(&self, node: NodeId) -> Result<ScopeId> {
        self.node_scopes
            .get(&node)
            .copied()
            .ok_or_else(|| DbError::new("Missing scope for node").with_field("node", node))
    }

    /// Record the scope of a query specification without a FROM clause.
    pub fn set_implicit_from_scope(&mut self, spec: NodeId, scope: ScopeId) {
        self.implicit_from_scopes.insert(spec, scope);
    }

    pub fn implicit_from_scope(&self, spec: NodeId) -> Result<ScopeId> {
        self.implicit_from_scopes
            .get(&spec)
            .copied()
            .ok_or_else(|| DbError::new("Missing implicit FROM scope").with_field("node", spec))
    }

    pub fn set_type(&mut self, node: NodeId, datatype: DataType) {
        self.types.insert(node, datatype);
    }

    pub fn datatype(&self, node: NodeId) -> Result<&DataType> {
        self.types
            .get(&node)
            .ok_or_else(|| DbError::new("Missing type for expression").with_field("node", node))
    }

    pub fn set_coercion(&mut self, node: NodeId, to: DataType, type_only: bool) {
        self.coercions.insert(node, Coercion { to, type_only });
    }

    pub fn coercion(&self, node: NodeId) -> Option<&Coercion> {
        self.coercions.get(&node)
    }

    pub fn set_column_reference(&mut self, node: NodeId, field: ResolvedField) {
        self.column_references.insert(node, field);
    }

    pub fn column_reference(&self, node: NodeId) -> Option<&ResolvedField> {
        self.column_references.get(&node)
    }

    pub fn set_resolved_function(&mut self, node: NodeId, function: ResolvedFunction) {
        self.resolved_functions.insert(node, function);
    }

    pub fn resolved_function(&self, node: NodeId) -> Result<&ResolvedFunction> {
        self.resolved_functions
            .get(&node)
            .ok_or_else(|| DbError::new("Missing resolved function").with_field("node", node))
    }

    pub fn set_window(&mut self, function: NodeId, window: ResolvedWindow) {
        self.windows.insert(function, window);
    }

    pub fn window(&self, function: NodeId) -> Option<&ResolvedWindow> {
        self.windows.get(&function)
    }

    pub fn require_window(&self, function: NodeId) -> Result<&ResolvedWindow> {
        self.window(function).required("resolved window")
    }

    /// Record the function computing a RANGE frame bound from a sort key and
    /// the frame offset expression.
    pub fn set_frame_bound_calculation(&mut self, offset: NodeId, function: ResolvedFunction) {
        self.frame_bound_calculations.insert(offset, function);
    }

    pub fn frame_bound_calculation(&self, offset: NodeId) -> Option<&ResolvedFunction> {
        self.frame_bound_calculations.get(&offset)
    }

    pub fn set_sort_key_coercion_for_frame_bound_calculation(
        &mut self,
        offset: NodeId,
        datatype: DataType,
    ) {
        self.sort_key_coercions_for_calculation
            .insert(offset, datatype);
    }

    pub fn sort_key_coercion_for_frame_bound_calculation(&self, offset: NodeId) -> Option<&DataType> {
        self.sort_key_coercions_for_calculation.get(&offset)
    }

    pub fn set_sort_key_coercion_for_frame_bound_comparison(
        &mut self,
        offset: NodeId,
        datatype: DataType,
    ) {
        self.sort_key_coercions_for_comparison.insert(offset, datatype);
    }

    pub fn sort_key_coercion_for_frame_bound_comparison(&self, offset: NodeId) -> Option<&DataType> {
        self.sort_key_coercions_for_comparison.get(&offset)
    }

    pub fn set_table(&mut self, table: NodeId, handle: TableHandle) {
        self.tables.insert(table, handle);
    }

    pub fn table(&self, table: NodeId) -> Result<&TableHandle> {
        self.tables
            .get(&table)
            .ok_or_else(|| DbError::new("Missing table handle").with_field("node", table))
    }

    pub fn set_update_target(&mut self, table: NodeId) {
        self.update_targets.insert(table);
    }

    pub fn is_update_target(&self, table: NodeId) -> bool {
        self.update_targets.contains(&table)
    }

    /// Record the WITH query a table reference refers to.
    pub fn set_named_query(&mut self, table: NodeId, query: Query) {
        self.named_queries.insert(table, query);
    }

    pub fn named_query(&self, table: NodeId) -> Option<&Query> {
        self.named_queries.get(&table)
    }

    pub fn set_expandable_query(&mut self, query: NodeId, recursive_reference: NodeId) {
        self.expandable_queries.insert(query, recursive_reference);
    }

    pub fn is_expandable_query(&self, query: NodeId) -> bool {
        self.expandable_queries.contains_key(&query)
    }

    /// The table reference inside an expandable query that refers back to
    /// the query.
    pub fn recursive_reference(&self, query: NodeId) -> Result<NodeId> {
        self.expandable_queries
            .get(&query)
            .copied()
            .ok_or_else(|| DbError::new("Query is not expandable").with_field("node", query))
    }

    /// Record the types a relation's visible fields need to be coerced to
    /// (set operation branches, recursive steps).
    pub fn set_relation_coercion(&mut self, relation: NodeId, types: Vec<DataType>) {
        self.relation_coercions.insert(relation, types);
    }

    pub fn relation_coercion(&self, relation: NodeId) -> Option<&[DataType]> {
        self.relation_coercions.get(&relation).map(|t| t.as_slice())
    }

    pub fn set_row_id_field(&mut self, table: NodeId, field_index: usize) {
        self.row_id_fields.insert(table, field_index);
    }

    /// Position of the row id field in the relation of a table reference.
    pub fn row_id_field(&self, table: NodeId) -> Result<usize> {
        self.row_id_fields
            .get(&table)
            .copied()
            .ok_or_else(|| DbError::new("Missing row id field").with_field("node", table))
    }

    pub fn set_select_expressions(&mut self, node: NodeId, exprs: Vec<SelectExpression>) {
        self.select_expressions.insert(node, exprs);
    }

    pub fn select_expressions(&self, node: NodeId) -> Result<&[SelectExpression]> {
        self.select_expressions
            .get(&node)
            .map(|e| e.as_slice())
            .ok_or_else(|| DbError::new("Missing select expressions").with_field("node", node))
    }

    pub fn set_aggregation(&mut self, spec: NodeId, aggregation: AggregationAnalysis) {
        self.aggregations.insert(spec, aggregation);
    }

    pub fn aggregation(&self, spec: NodeId) -> Option<&AggregationAnalysis> {
        self.aggregations.get(&spec)
    }

    pub fn is_aggregation(&self, spec: NodeId) -> bool {
        self.aggregations.contains_key(&spec)
    }

    pub fn set_window_functions(&mut self, spec: NodeId, functions: Vec<AstExpr>) {
        self.window_functions.insert(spec, functions);
    }

    pub fn window_functions(&self, spec: NodeId) -> &[AstExpr] {
        slice_or_empty(self.window_functions.get(&spec))
    }

    /// Record the ORDER BY sort keys of a query or query specification.
    pub fn set_order_by_expressions(&mut self, node: NodeId, exprs: Vec<AstExpr>) {
        self.order_by_expressions.insert(node, exprs);
    }

    pub fn order_by_expressions(&self, node: NodeId) -> &[AstExpr] {
        slice_or_empty(self.order_by_expressions.get(&node))
    }

    pub fn set_order_by_aggregates(&mut self, order_by: NodeId, exprs: Vec<AstExpr>) {
        self.order_by_aggregates.insert(order_by, exprs);
    }

    pub fn order_by_aggregates(&self, order_by: NodeId) -> &[AstExpr] {
        slice_or_empty(self.order_by_aggregates.get(&order_by))
    }

    pub fn set_order_by_window_functions(&mut self, order_by: NodeId, exprs: Vec<AstExpr>) {
        self.order_by_window_functions.insert(order_by, exprs);
    }

    pub fn order_by_window_functions(&self, order_by: NodeId) -> &[AstExpr] {
        slice_or_empty(self.order_by_window_functions.get(&order_by))
    }

    pub fn set_order_by_redundant(&mut self, order_by: NodeId) {
        self.redundant_order_by.insert(order_by);
    }

    pub fn is_order_by_redundant(&self, order_by: NodeId) -> bool {
        self.redundant_order_by.contains(&order_by)
    }

    pub fn set_merge_analysis(&mut self, analysis: MergeAnalysis) {
        self.merge_analysis = Some(analysis);
    }

    pub fn merge_analysis(&self) -> Result<&MergeAnalysis> {
        self.merge_analysis.as_ref().required("merge analysis")
    }
}

fn slice_or_empty(v: Option<&Vec<AstExpr>>) -> &[AstExpr] {
    match v {
        Some(v) => v.as_slice(),
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scope::{Field, RelationId};

    fn scope(parent: Option<ScopeId>, query_boundary: bool) -> Scope {
        Scope {
            parent,
            query_boundary,
            relation_id: RelationId(0),
            relation_type: RelationType::new([Field::new("a", DataType::Int32)]),
        }
    }

    #[test]
    fn local_scope_stops_at_query_boundary() {
        let mut analysis = Analysis::new();
        let outer = analysis.add_scope(scope(None, false));
        let inner = analysis.add_scope(scope(Some(outer), true));
        let nested = analysis.add_scope(scope(Some(inner), false));

        assert!(analysis.is_local_scope(nested, nested));
        assert!(analysis.is_local_scope(nested, inner));
        assert!(!analysis.is_local_scope(nested, outer));
        assert!(!analysis.is_local_scope(outer, inner));
    }

    #[test]
    fn missing_entries_are_internal_errors() {
        let analysis = Analysis::new();
        let err = analysis.datatype(NodeId(4)).unwrap_err();
        assert!(!err.is_query_error());
        assert_eq!(Some("@4"), err.get_field("node"));

        analysis.merge_analysis().unwrap_err();
        assert!(analysis.window_functions(NodeId(1)).is_empty());
    }
}
