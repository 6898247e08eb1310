//! Shared fixture for building analyzed statements by hand.
#![allow(dead_code)]

use relplan_core::analysis::ast::{
    AstExpr,
    AstExprKind,
    NodeId,
    Query,
    QuerySpecification,
    Relation,
    Select,
    Statement,
    TableRef,
};
use relplan_core::analysis::scope::{
    Field,
    FieldId,
    RelationId,
    RelationType,
    ResolvedField,
    Scope,
    ScopeId,
};
use relplan_core::analysis::{Analysis, SelectExpression};
use relplan_core::catalog::memory::MemoryMetadata;
use relplan_core::catalog::{
    ColumnHandle,
    ColumnMetadata,
    Metadata,
    RowChangeParadigm,
    TableHandle,
    TableMetadata,
};
use relplan_core::config::session::PlannerConfig;
use relplan_core::expr::arith_expr::ArithOperator;
use relplan_core::expr::comparison_expr::ComparisonOperator;
use relplan_core::logical::context::PlanContext;
use relplan_core::logical::operator::LogicalOperator;
use relplan_core::logical::planner::{LogicalPlanner, PlannedStatement};
use relplan_core::types::datatype::DataType;
use relplan_core::types::scalar::ScalarValue;
use relplan_error::Result;

/// Name of the hidden row id column every fixture table carries.
pub const ROW_ID: &str = "$row_id";

#[derive(Debug)]
pub struct Fixture {
    pub analysis: Analysis,
    pub metadata: MemoryMetadata,
    pub config: PlannerConfig,
    next_node: u32,
    next_relation: u32,
}

impl Fixture {
    pub fn new() -> Self {
        logutil::init_test();
        Fixture {
            analysis: Analysis::new(),
            metadata: MemoryMetadata::empty(),
            config: PlannerConfig::default(),
            next_node: 0,
            next_relation: 0,
        }
    }

    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn scope(&mut self, parent: Option<ScopeId>, fields: Vec<Field>) -> ScopeId {
        let relation_id = RelationId(self.next_relation);
        self.next_relation += 1;
        self.analysis.add_scope(Scope {
            parent,
            query_boundary: false,
            relation_id,
            relation_type: RelationType::new(fields),
        })
    }

    /// Register `memory.main.<name>` with the given columns followed by a
    /// hidden row id.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: &[(&str, DataType)],
        paradigm: RowChangeParadigm,
    ) -> TableHandle {
        let handle = TableHandle::new("memory", "main", name);
        let mut metadata: Vec<_> = columns
            .iter()
            .map(|(name, datatype)| ColumnMetadata::new(*name, datatype.clone()))
            .collect();
        metadata.push(ColumnMetadata::new_hidden(ROW_ID, DataType::Int64));
        self.metadata
            .create_table(
                TableMetadata {
                    table: handle.clone(),
                    columns: metadata,
                },
                paradigm,
            )
            .unwrap();
        handle
    }

    /// Reference a table, analyzed in a new scope holding all its columns.
    pub fn table_ref(&mut self, handle: &TableHandle) -> (TableRef, ScopeId) {
        let table = self.metadata.require_get_table_metadata(handle).unwrap();
        let fields = table
            .columns
            .iter()
            .map(|c| {
                Field::new(&c.name, c.datatype.clone())
                    .with_alias(&handle.table)
                    .with_hidden(c.hidden)
                    .with_column(ColumnHandle::new(&c.name))
            })
            .collect();
        let scope = self.scope(None, fields);

        let table_ref = TableRef {
            id: self.node(),
            name: handle.table.clone(),
        };
        self.analysis.set_scope(table_ref.id, scope);
        self.analysis.set_table(table_ref.id, handle.clone());
        if let Some(idx) = table.columns.iter().position(|c| c.hidden) {
            self.analysis.set_row_id_field(table_ref.id, idx);
        }
        (table_ref, scope)
    }

    /// Reference the field at `index` of a scope.
    pub fn column(&mut self, scope: ScopeId, index: usize) -> AstExpr {
        let resolved = self.analysis.scope(scope).unwrap();
        let relation = resolved.relation_id;
        let field = resolved.relation_type.field(index).unwrap().clone();

        let id = self.node();
        self.analysis.set_column_reference(
            id,
            ResolvedField {
                scope,
                field: FieldId::new(relation, index),
                hierarchy_field_index: index,
            },
        );
        self.analysis.set_type(id, field.datatype);
        AstExpr::new(id, AstExprKind::Column(vec![field.name.unwrap_or_default()]))
    }

    pub fn literal(&mut self, value: impl Into<ScalarValue>) -> AstExpr {
        let value = value.into();
        let id = self.node();
        self.analysis.set_type(id, value.datatype());
        AstExpr::new(id, AstExprKind::Literal(value))
    }

    pub fn arith(&mut self, op: ArithOperator, left: AstExpr, right: AstExpr) -> AstExpr {
        let datatype = self.analysis.datatype(left.id).unwrap().clone();
        self.typed(
            AstExprKind::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            datatype,
        )
    }

    pub fn compare(&mut self, op: ComparisonOperator, left: AstExpr, right: AstExpr) -> AstExpr {
        self.typed(
            AstExprKind::Comparison {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            DataType::Boolean,
        )
    }

    pub fn typed(&mut self, kind: AstExprKind, datatype: DataType) -> AstExpr {
        let id = self.node();
        self.analysis.set_type(id, datatype);
        AstExpr::new(id, kind)
    }

    /// Build `SELECT <select> [FROM <from>] [WHERE <where_clause>]`.
    ///
    /// A missing FROM reads from a single empty row.
    pub fn select(
        &mut self,
        from: Option<Relation>,
        select: Vec<AstExpr>,
        where_clause: Option<AstExpr>,
        distinct: bool,
    ) -> QuerySpecification {
        let fields = select
            .iter()
            .map(|expr| {
                let datatype = self.analysis.datatype(expr.id).unwrap().clone();
                match &expr.kind {
                    AstExprKind::Column(parts) => Field::new(parts.join("."), datatype),
                    _ => Field::anonymous(datatype),
                }
            })
            .collect();
        let output = self.scope(None, fields);

        let spec = QuerySpecification {
            id: self.node(),
            select: Select { distinct },
            from,
            where_clause,
            group_by: None,
            having: None,
            order_by: None,
            offset: None,
            limit: None,
        };
        if spec.from.is_none() {
            let empty = self.scope(None, Vec::new());
            self.analysis.set_implicit_from_scope(spec.id, empty);
        }
        self.analysis.set_scope(spec.id, output);
        self.analysis.set_select_expressions(
            spec.id,
            select.into_iter().map(SelectExpression::new).collect(),
        );
        spec
    }

    /// Wrap a query specification in a query sharing its output scope.
    pub fn query(&mut self, spec: QuerySpecification) -> Query {
        let scope = self.analysis.scope_of(spec.id).unwrap();
        let query = Query {
            id: self.node(),
            body: Relation::QuerySpecification(Box::new(spec)),
            order_by: None,
            offset: None,
            limit: None,
        };
        self.analysis.set_scope(query.id, scope);
        query
    }

    pub fn plan(&self, statement: &Statement) -> Result<PlannedStatement> {
        let mut ctx = PlanContext::new();
        LogicalPlanner::new(&self.analysis, &self.metadata, &self.config)
            .plan_statement(&mut ctx, statement)
    }
}

/// All nodes of a plan in pre-order.
pub fn nodes(root: &LogicalOperator) -> Vec<&LogicalOperator> {
    fn collect<'a>(node: &'a LogicalOperator, out: &mut Vec<&'a LogicalOperator>) {
        out.push(node);
        for child in node.children() {
            collect(child, out);
        }
    }
    let mut out = Vec::new();
    collect(root, &mut out);
    out
}
