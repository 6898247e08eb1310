pub mod arith_expr;
pub mod case_expr;
pub mod cast_expr;
pub mod comparison_expr;
pub mod conjunction_expr;
pub mod consteval;
pub mod lambda_expr;
pub mod literal_expr;
pub mod row_expr;
pub mod scalar_function_expr;

use std::fmt;

use arith_expr::ArithExpr;
use case_expr::{CaseExpr, WhenThen};
use cast_expr::CastExpr;
use comparison_expr::{ComparisonExpr, ComparisonOperator, IsNullExpr};
use conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use lambda_expr::LambdaExpr;
use literal_expr::LiteralExpr;
use relplan_error::{DbError, Result};
use row_expr::{FieldAccessExpr, RowExpr};
use scalar_function_expr::ScalarFunctionExpr;
use serde::{Deserialize, Serialize};

use crate::functions::{ResolvedFunction, builtin};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;
use crate::types::scalar::ScalarValue;

/// An expression in the symbol space of a plan.
///
/// Column references are always symbols produced by a child of the node
/// holding the expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    Symbol(Symbol),
    Literal(LiteralExpr),
    Cast(CastExpr),
    Case(CaseExpr),
    Comparison(ComparisonExpr),
    Conjunction(ConjunctionExpr),
    Not(Box<Expression>),
    IsNull(IsNullExpr),
    Arith(ArithExpr),
    ScalarFunction(ScalarFunctionExpr),
    Lambda(LambdaExpr),
    /// Reference to a parameter of an enclosing lambda.
    LambdaArgument { name: String, datatype: DataType },
    Row(RowExpr),
    FieldAccess(FieldAccessExpr),
}

impl Expression {
    pub fn datatype(&self) -> Result<DataType> {
        Ok(match self {
            Self::Symbol(sym) => sym.datatype().clone(),
            Self::Literal(lit) => lit.datatype.clone(),
            Self::Cast(cast) => cast.to.clone(),
            Self::Case(case) => case.datatype.clone(),
            Self::Comparison(_) | Self::Conjunction(_) | Self::Not(_) | Self::IsNull(_) => {
                DataType::Boolean
            }
            Self::Arith(arith) => arith.datatype.clone(),
            Self::ScalarFunction(func) => func.function.return_type.clone(),
            Self::Lambda(lambda) => lambda.body.datatype()?,
            Self::LambdaArgument { datatype, .. } => datatype.clone(),
            Self::Row(row) => DataType::struct_type(
                row.fields
                    .iter()
                    .map(|f| Ok((None, f.datatype()?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::FieldAccess(access) => {
                let input = access.input.datatype()?;
                let meta = input.try_get_struct_type_meta()?;
                meta.fields
                    .get(access.index)
                    .map(|f| f.datatype.clone())
                    .ok_or_else(|| {
                        DbError::new("Field index out of bounds")
                            .with_field("index", access.index)
                            .with_field("datatype", &input)
                    })?
            }
        })
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    pub fn try_as_symbol(&self) -> Result<&Symbol> {
        match self {
            Self::Symbol(sym) => Ok(sym),
            other => Err(DbError::new(format!("Expected a symbol, got {other}"))),
        }
    }

    /// If this expression can be evaluated more than once without changing
    /// its result.
    pub fn is_deterministic(&self) -> bool {
        if let Self::ScalarFunction(func) = self {
            if !func.function.deterministic {
                return false;
            }
        }
        let mut deterministic = true;
        self.for_each_child(&mut |child| {
            deterministic &= child.is_deterministic();
        });
        deterministic
    }

    pub fn for_each_child<F>(&self, func: &mut F)
    where
        F: FnMut(&Expression),
    {
        match self {
            Self::Symbol(_) | Self::Literal(_) | Self::LambdaArgument { .. } => (),
            Self::Cast(cast) => func(&cast.expr),
            Self::Case(case) => {
                for when_then in &case.cases {
                    func(&when_then.when);
                    func(&when_then.then);
                }
                func(&case.else_expr);
            }
            Self::Comparison(cmp) => {
                func(&cmp.left);
                func(&cmp.right);
            }
            Self::Conjunction(conj) => conj.expressions.iter().for_each(func),
            Self::Not(expr) => func(expr),
            Self::IsNull(is_null) => func(&is_null.input),
            Self::Arith(arith) => {
                func(&arith.left);
                func(&arith.right);
            }
            Self::ScalarFunction(scalar) => scalar.inputs.iter().for_each(func),
            Self::Lambda(lambda) => func(&lambda.body),
            Self::Row(row) => row.fields.iter().for_each(func),
            Self::FieldAccess(access) => func(&access.input),
        }
    }

    pub fn for_each_child_mut<F>(&mut self, func: &mut F)
    where
        F: FnMut(&mut Expression),
    {
        match self {
            Self::Symbol(_) | Self::Literal(_) | Self::LambdaArgument { .. } => (),
            Self::Cast(cast) => func(&mut cast.expr),
            Self::Case(case) => {
                for when_then in &mut case.cases {
                    func(&mut when_then.when);
                    func(&mut when_then.then);
                }
                func(&mut case.else_expr);
            }
            Self::Comparison(cmp) => {
                func(&mut cmp.left);
                func(&mut cmp.right);
            }
            Self::Conjunction(conj) => conj.expressions.iter_mut().for_each(func),
            Self::Not(expr) => func(expr),
            Self::IsNull(is_null) => func(&mut is_null.input),
            Self::Arith(arith) => {
                func(&mut arith.left);
                func(&mut arith.right);
            }
            Self::ScalarFunction(scalar) => scalar.inputs.iter_mut().for_each(func),
            Self::Lambda(lambda) => func(&mut lambda.body),
            Self::Row(row) => row.fields.iter_mut().for_each(func),
            Self::FieldAccess(access) => func(&mut access.input),
        }
    }

    /// Collect every symbol referenced by this expression, in the order
    /// they're first encountered.
    pub fn referenced_symbols(&self) -> Vec<Symbol> {
        fn inner(expr: &Expression, out: &mut Vec<Symbol>) {
            if let Expression::Symbol(sym) = expr {
                if !out.contains(sym) {
                    out.push(sym.clone());
                }
                return;
            }
            expr.for_each_child(&mut |child| inner(child, out));
        }

        let mut out = Vec::new();
        inner(self, &mut out);
        out
    }

    /// Replace every symbol reference using `replace`.
    pub fn replace_symbols<F>(&mut self, replace: &mut F) -> Result<()>
    where
        F: FnMut(&Symbol) -> Result<Symbol>,
    {
        if let Expression::Symbol(sym) = self {
            *sym = replace(sym)?;
            return Ok(());
        }
        let mut result = Ok(());
        self.for_each_child_mut(&mut |child| {
            if result.is_ok() {
                result = child.replace_symbols(&mut *replace);
            }
        });
        result
    }
}

impl From<Symbol> for Expression {
    fn from(value: Symbol) -> Self {
        Expression::Symbol(value)
    }
}

impl From<&Symbol> for Expression {
    fn from(value: &Symbol) -> Self {
        Expression::Symbol(value.clone())
    }
}

impl From<CastExpr> for Expression {
    fn from(value: CastExpr) -> Self {
        Expression::Cast(value)
    }
}

impl From<CaseExpr> for Expression {
    fn from(value: CaseExpr) -> Self {
        Expression::Case(value)
    }
}

impl From<LiteralExpr> for Expression {
    fn from(value: LiteralExpr) -> Self {
        Expression::Literal(value)
    }
}

impl From<ComparisonExpr> for Expression {
    fn from(value: ComparisonExpr) -> Self {
        Expression::Comparison(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(sym) => write!(f, "{sym}"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Cast(cast) => write!(f, "{cast}"),
            Self::Case(case) => write!(f, "{case}"),
            Self::Comparison(cmp) => write!(f, "{cmp}"),
            Self::Conjunction(conj) => write!(f, "{conj}"),
            Self::Not(expr) => write!(f, "NOT {expr}"),
            Self::IsNull(is_null) => write!(f, "{is_null}"),
            Self::Arith(arith) => write!(f, "{arith}"),
            Self::ScalarFunction(func) => write!(f, "{func}"),
            Self::Lambda(lambda) => write!(f, "{lambda}"),
            Self::LambdaArgument { name, .. } => write!(f, "{name}"),
            Self::Row(row) => write!(f, "{row}"),
            Self::FieldAccess(access) => write!(f, "{access}"),
        }
    }
}

pub fn lit(value: impl Into<ScalarValue>) -> Expression {
    Expression::Literal(LiteralExpr::new(value.into()))
}

pub fn typed_null(datatype: DataType) -> Expression {
    Expression::Literal(LiteralExpr::typed_null(datatype))
}

pub fn sym(symbol: &Symbol) -> Expression {
    Expression::Symbol(symbol.clone())
}

pub fn cast(expr: impl Into<Expression>, to: DataType) -> Expression {
    Expression::Cast(CastExpr::new(expr, to))
}

pub fn compare(
    op: ComparisonOperator,
    left: impl Into<Expression>,
    right: impl Into<Expression>,
) -> Expression {
    Expression::Comparison(ComparisonExpr {
        left: Box::new(left.into()),
        right: Box::new(right.into()),
        op,
    })
}

/// AND together expressions, flattening when there's only one.
pub fn and(exprs: impl IntoIterator<Item = Expression>) -> Result<Expression> {
    conjunction(ConjunctionOperator::And, exprs)
}

pub fn or(exprs: impl IntoIterator<Item = Expression>) -> Result<Expression> {
    conjunction(ConjunctionOperator::Or, exprs)
}

fn conjunction(
    op: ConjunctionOperator,
    exprs: impl IntoIterator<Item = Expression>,
) -> Result<Expression> {
    let mut expressions: Vec<_> = exprs.into_iter().collect();
    match expressions.len() {
        0 => Err(DbError::new(format!("Cannot create {op} with no expressions"))),
        1 => Ok(expressions.swap_remove(0)),
        _ => Ok(Expression::Conjunction(ConjunctionExpr { op, expressions })),
    }
}

pub fn not(expr: impl Into<Expression>) -> Expression {
    Expression::Not(Box::new(expr.into()))
}

pub fn is_null(expr: impl Into<Expression>) -> Expression {
    Expression::IsNull(IsNullExpr {
        input: Box::new(expr.into()),
        negated: false,
    })
}

pub fn scalar_function(function: ResolvedFunction, inputs: Vec<Expression>) -> Expression {
    Expression::ScalarFunction(ScalarFunctionExpr { function, inputs })
}

pub fn row(fields: Vec<Expression>) -> Expression {
    Expression::Row(RowExpr { fields })
}

pub fn field_access(input: impl Into<Expression>, index: usize) -> Expression {
    Expression::FieldAccess(FieldAccessExpr {
        input: Box::new(input.into()),
        index,
    })
}

/// `IF(condition, then, else)` as a single branch case.
pub fn if_then_else(
    condition: Expression,
    then: Expression,
    else_expr: Expression,
) -> Result<Expression> {
    Ok(Expression::Case(CaseExpr::try_new(
        vec![WhenThen {
            when: condition,
            then,
        }],
        Some(else_expr),
    )?))
}

/// `CAST(fail(message) AS boolean)`, raises a query error when evaluated.
pub fn fail_as_boolean(message: impl Into<String>) -> Expression {
    cast(
        scalar_function(builtin::fail(), vec![lit(message.into())]),
        DataType::Boolean,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::symbol::SymbolAllocator;

    #[test]
    fn display_nested() {
        let mut symbols = SymbolAllocator::new();
        let a = symbols.new_symbol("a", DataType::Int64);

        let expr = if_then_else(
            compare(ComparisonOperator::GtEq, &a, lit(0_i64)),
            lit(true),
            fail_as_boolean("bad"),
        )
        .unwrap();

        assert_eq!(
            "CASE WHEN a >= 0 THEN true ELSE CAST(fail('bad') AS Boolean) END",
            expr.to_string()
        );
        assert_eq!(DataType::Boolean, expr.datatype().unwrap());
    }

    #[test]
    fn referenced_symbols_ordered_unique() {
        let mut symbols = SymbolAllocator::new();
        let a = symbols.new_symbol("a", DataType::Int64);
        let b = symbols.new_symbol("b", DataType::Int64);

        let expr = and([
            compare(ComparisonOperator::Eq, &b, &a),
            compare(ComparisonOperator::Eq, &a, lit(1_i64)),
        ])
        .unwrap();

        assert_eq!(vec![b, a], expr.referenced_symbols());
    }

    #[test]
    fn field_access_type() {
        let expr = field_access(row(vec![lit(1_i32), lit("x")]), 1);
        assert_eq!(DataType::Utf8, expr.datatype().unwrap());

        field_access(row(vec![lit(1_i32)]), 4)
            .datatype()
            .unwrap_err();
    }

    #[test]
    fn fail_is_not_deterministic() {
        assert!(!fail_as_boolean("x").is_deterministic());
        assert!(lit(1_i32).is_deterministic());
    }
}
