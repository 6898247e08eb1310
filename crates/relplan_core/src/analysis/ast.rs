//! Syntax tree of analyzed statements.
//!
//! Every node the planner needs to look up analysis results for carries a
//! `NodeId`. Ids are assigned by the analyzer and are unique within a
//! statement.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::arith_expr::ArithOperator;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::conjunction_expr::ConjunctionOperator;
use crate::expr::lambda_expr::LambdaParam;
use crate::logical::logical_join::JoinType;
use crate::types::datatype::DataType;
use crate::types::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstExpr {
    pub id: NodeId,
    pub kind: AstExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstExprKind {
    Literal(ScalarValue),
    /// Possibly qualified column reference.
    Column(Vec<String>),
    /// Reference to a field of the current relation by position.
    FieldReference(usize),
    Cast {
        expr: Box<AstExpr>,
        to: DataType,
    },
    Comparison {
        op: ComparisonOperator,
        left: Box<AstExpr>,
        right: Box<AstExpr>,
    },
    Arith {
        op: ArithOperator,
        left: Box<AstExpr>,
        right: Box<AstExpr>,
    },
    Conjunction {
        op: ConjunctionOperator,
        exprs: Vec<AstExpr>,
    },
    Not(Box<AstExpr>),
    IsNull {
        expr: Box<AstExpr>,
        negated: bool,
    },
    Case {
        cases: Vec<(AstExpr, AstExpr)>,
        else_expr: Option<Box<AstExpr>>,
    },
    /// Scalar, aggregate or window function call. Which one is determined
    /// by the resolved function. The window of a window function is
    /// resolved during analysis.
    Function(FunctionCall),
    Lambda {
        params: Vec<LambdaParam>,
        body: Box<AstExpr>,
    },
    LambdaArgument(String),
    Row(Vec<AstExpr>),
    /// Zero-based access into a row value.
    FieldAccess {
        expr: Box<AstExpr>,
        index: usize,
    },
    /// `GROUPING(c1, ..., cn)`
    Grouping(Vec<AstExpr>),
    Subquery(Box<Query>),
}

impl AstExpr {
    pub fn new(id: NodeId, kind: AstExprKind) -> Self {
        AstExpr { id, kind }
    }

    /// Call `func` on every direct child expression.
    ///
    /// Subqueries are opaque and have no child expressions.
    pub fn for_each_child<'a, F>(&'a self, func: &mut F)
    where
        F: FnMut(&'a AstExpr),
    {
        match &self.kind {
            AstExprKind::Literal(_)
            | AstExprKind::Column(_)
            | AstExprKind::FieldReference(_)
            | AstExprKind::LambdaArgument(_)
            | AstExprKind::Subquery(_) => (),
            AstExprKind::Cast { expr, .. } => func(expr),
            AstExprKind::Comparison { left, right, .. } | AstExprKind::Arith { left, right, .. } => {
                func(left);
                func(right);
            }
            AstExprKind::Conjunction { exprs, .. } => exprs.iter().for_each(func),
            AstExprKind::Not(expr) => func(expr),
            AstExprKind::IsNull { expr, .. } => func(expr),
            AstExprKind::Case { cases, else_expr } => {
                for (when, then) in cases {
                    func(when);
                    func(then);
                }
                if let Some(else_expr) = else_expr {
                    func(else_expr);
                }
            }
            AstExprKind::Function(call) => {
                call.args.iter().for_each(&mut *func);
                if let Some(filter) = &call.filter {
                    func(filter);
                }
                for item in &call.order_by {
                    func(&item.key);
                }
            }
            AstExprKind::Lambda { body, .. } => func(body),
            AstExprKind::Row(fields) => fields.iter().for_each(func),
            AstExprKind::FieldAccess { expr, .. } => func(expr),
            AstExprKind::Grouping(columns) => columns.iter().for_each(func),
        }
    }

    /// Collect the subquery expressions contained in this expression.
    pub fn collect_subqueries<'a>(&'a self, out: &mut Vec<&'a AstExpr>) {
        if matches!(self.kind, AstExprKind::Subquery(_)) {
            out.push(self);
            return;
        }
        self.for_each_child(&mut |child| child.collect_subqueries(out));
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.kind, AstExprKind::Lambda { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullTreatment {
    Respect,
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<AstExpr>,
    pub distinct: bool,
    /// `FILTER (WHERE ...)` of an aggregate.
    pub filter: Option<Box<AstExpr>>,
    /// `ORDER BY` inside an aggregate call.
    pub order_by: Vec<SortItem>,
    pub null_treatment: Option<NullTreatment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub key: AstExpr,
    pub desc: bool,
    /// Explicit NULLS FIRST/LAST.
    pub nulls_first: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub id: NodeId,
    pub items: Vec<SortItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub id: NodeId,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// `LIMIT n`, None for `LIMIT ALL`.
    Limit { id: NodeId, count: Option<u64> },
    /// `FETCH FIRST n ROWS [ONLY | WITH TIES]`
    FetchFirst {
        id: NodeId,
        count: Option<u64>,
        with_ties: bool,
    },
}

impl Limit {
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Limit { count, .. } | Self::FetchFirst { count, .. } => *count,
        }
    }

    pub fn with_ties(&self) -> bool {
        matches!(self, Self::FetchFirst { with_ties: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: NodeId,
    pub body: Relation,
    pub order_by: Option<OrderBy>,
    pub offset: Option<Offset>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpecification {
    pub id: NodeId,
    pub select: Select,
    pub from: Option<Relation>,
    pub where_clause: Option<AstExpr>,
    pub group_by: Option<GroupBy>,
    pub having: Option<AstExpr>,
    pub order_by: Option<OrderBy>,
    pub offset: Option<Offset>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub id: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub id: NodeId,
    pub join_type: JoinType,
    pub left: Box<Relation>,
    pub right: Box<Relation>,
    pub condition: Option<AstExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Values {
    pub id: NodeId,
    pub rows: Vec<AstExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub id: NodeId,
    pub distinct: bool,
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Base table, named query, or reference to the enclosing recursive
    /// query.
    Table(TableRef),
    Aliased {
        id: NodeId,
        relation: Box<Relation>,
        alias: String,
    },
    Subquery(Box<Query>),
    Join(Join),
    /// Each row is a `Row` expression, or a single expression for single
    /// column values.
    Values(Values),
    Union(Union),
    QuerySpecification(Box<QuerySpecification>),
}

impl Relation {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Table(t) => t.id,
            Self::Aliased { id, .. } => *id,
            Self::Subquery(q) => q.id,
            Self::Join(j) => j.id,
            Self::Values(v) => v.id,
            Self::Union(u) => u.id,
            Self::QuerySpecification(s) => s.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub id: NodeId,
    pub table: TableRef,
    pub where_clause: Option<AstExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAssignment {
    pub column: String,
    pub value: AstExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: NodeId,
    pub table: TableRef,
    pub assignments: Vec<UpdateAssignment>,
    pub where_clause: Option<AstExpr>,
}

/// One WHEN clause of a MERGE.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeCase {
    /// `WHEN NOT MATCHED [AND cond] THEN INSERT (cols) VALUES (exprs)`
    Insert {
        condition: Option<AstExpr>,
        columns: Vec<String>,
        values: Vec<AstExpr>,
    },
    /// `WHEN MATCHED [AND cond] THEN UPDATE SET col = expr, ...`
    Update {
        condition: Option<AstExpr>,
        assignments: Vec<UpdateAssignment>,
    },
    /// `WHEN MATCHED [AND cond] THEN DELETE`
    Delete { condition: Option<AstExpr> },
}

impl MergeCase {
    pub fn condition(&self) -> Option<&AstExpr> {
        match self {
            Self::Insert { condition, .. }
            | Self::Update { condition, .. }
            | Self::Delete { condition } => condition.as_ref(),
        }
    }

    /// Columns assigned by this case, as written.
    pub fn set_columns(&self) -> Vec<&str> {
        match self {
            Self::Insert { columns, .. } => columns.iter().map(|c| c.as_str()).collect(),
            Self::Update { assignments, .. } => {
                assignments.iter().map(|a| a.column.as_str()).collect()
            }
            Self::Delete { .. } => Vec::new(),
        }
    }

    /// Expressions assigned by this case, positionally matching
    /// `set_columns`.
    pub fn set_expressions(&self) -> Vec<&AstExpr> {
        match self {
            Self::Insert { values, .. } => values.iter().collect(),
            Self::Update { assignments, .. } => assignments.iter().map(|a| &a.value).collect(),
            Self::Delete { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub id: NodeId,
    /// The target, a table optionally aliased.
    pub target: Relation,
    pub source: Relation,
    pub predicate: AstExpr,
    pub cases: Vec<MergeCase>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    Delete(Delete),
    Update(Update),
    Merge(Merge),
}
