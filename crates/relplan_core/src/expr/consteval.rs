//! Evaluation of plan expressions against a single row of bound symbol
//! values.
//!
//! Used to fold and check the guard expressions the planner synthesizes
//! (window frame offset checks, recursion depth checks, merge row
//! construction) without an execution engine.

use std::cmp::Ordering;

use ahash::HashMap;
use relplan_error::{DbError, Result, not_implemented};

use super::Expression;
use super::arith_expr::ArithOperator;
use super::comparison_expr::ComparisonOperator;
use super::conjunction_expr::ConjunctionOperator;
use crate::functions::builtin;
use crate::logical::symbol::Symbol;
use crate::types::datatype::{DataType, DecimalTypeMeta};
use crate::types::scalar::ScalarValue;

/// Values for symbols referenced by an expression.
pub type RowBindings = HashMap<Symbol, ScalarValue>;

#[derive(Debug)]
pub struct ConstEvaluator<'a> {
    bindings: &'a RowBindings,
}

impl<'a> ConstEvaluator<'a> {
    pub fn new(bindings: &'a RowBindings) -> Self {
        ConstEvaluator { bindings }
    }

    pub fn eval(&self, expr: &Expression) -> Result<ScalarValue> {
        match expr {
            Expression::Symbol(sym) => self.bindings.get(sym).cloned().ok_or_else(|| {
                DbError::new("Missing binding for symbol").with_field("symbol", sym)
            }),
            Expression::Literal(lit) => Ok(lit.value.clone()),
            Expression::Cast(cast) => self.eval(&cast.expr)?.try_cast(&cast.to),
            Expression::Case(case) => {
                for when_then in &case.cases {
                    if self.eval(&when_then.when)? == ScalarValue::Boolean(true) {
                        return self.eval(&when_then.then);
                    }
                }
                self.eval(&case.else_expr)
            }
            Expression::Comparison(cmp) => {
                let left = self.eval(&cmp.left)?;
                let right = self.eval(&cmp.right)?;
                if left.is_null() || right.is_null() {
                    return Ok(ScalarValue::Null);
                }
                let ord = compare_scalars(&left, &right)?;
                let result = match cmp.op {
                    ComparisonOperator::Eq => ord == Ordering::Equal,
                    ComparisonOperator::NotEq => ord != Ordering::Equal,
                    ComparisonOperator::Lt => ord == Ordering::Less,
                    ComparisonOperator::LtEq => ord != Ordering::Greater,
                    ComparisonOperator::Gt => ord == Ordering::Greater,
                    ComparisonOperator::GtEq => ord != Ordering::Less,
                };
                Ok(ScalarValue::Boolean(result))
            }
            Expression::Conjunction(conj) => {
                // Three valued logic. The short circuit value wins over null.
                let short_circuit = matches!(conj.op, ConjunctionOperator::Or);
                let mut saw_null = false;
                for child in &conj.expressions {
                    match self.eval(child)? {
                        ScalarValue::Null => saw_null = true,
                        ScalarValue::Boolean(b) if b == short_circuit => {
                            return Ok(ScalarValue::Boolean(b));
                        }
                        ScalarValue::Boolean(_) => (),
                        other => {
                            return Err(DbError::new(format!(
                                "Expected boolean in {}, got {other}",
                                conj.op
                            )));
                        }
                    }
                }
                if saw_null {
                    Ok(ScalarValue::Null)
                } else {
                    Ok(ScalarValue::Boolean(!short_circuit))
                }
            }
            Expression::Not(child) => match self.eval(child)? {
                ScalarValue::Null => Ok(ScalarValue::Null),
                other => Ok(ScalarValue::Boolean(!other.try_as_bool()?)),
            },
            Expression::IsNull(is_null) => {
                let v = self.eval(&is_null.input)?;
                Ok(ScalarValue::Boolean(v.is_null() != is_null.negated))
            }
            Expression::Arith(arith) => {
                let left = self.eval(&arith.left)?;
                let right = self.eval(&arith.right)?;
                eval_arith(arith.op, &left, &right, &arith.datatype)
            }
            Expression::ScalarFunction(func) => {
                let inputs = func
                    .inputs
                    .iter()
                    .map(|input| self.eval(input))
                    .collect::<Result<Vec<_>>>()?;

                match (func.function.name.as_str(), inputs.as_slice()) {
                    (builtin::FAIL, [msg]) => Err(DbError::query(msg.to_string())),
                    (builtin::ADD, [l, r]) => {
                        eval_arith(ArithOperator::Add, l, r, &func.function.return_type)
                    }
                    (builtin::SUBTRACT, [l, r]) => {
                        eval_arith(ArithOperator::Sub, l, r, &func.function.return_type)
                    }
                    (name, _) => not_implemented!("Constant evaluation of function '{name}'"),
                }
            }
            Expression::Row(row) => Ok(ScalarValue::Struct(
                row.fields
                    .iter()
                    .map(|f| self.eval(f))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Expression::FieldAccess(access) => match self.eval(&access.input)? {
                ScalarValue::Null => Ok(ScalarValue::Null),
                ScalarValue::Struct(mut vals) => {
                    if access.index >= vals.len() {
                        return Err(DbError::new("Field index out of bounds")
                            .with_field("index", access.index)
                            .with_field("fields", vals.len()));
                    }
                    Ok(vals.swap_remove(access.index))
                }
                other => Err(DbError::new(format!("Cannot access field of {other}"))),
            },
            Expression::Lambda(_) | Expression::LambdaArgument { .. } => {
                not_implemented!("Constant evaluation of lambdas")
            }
        }
    }
}

/// Evaluate an expression against a row of bindings.
pub fn eval(expr: &Expression, bindings: &RowBindings) -> Result<ScalarValue> {
    ConstEvaluator::new(bindings).eval(expr)
}

fn eval_arith(
    op: ArithOperator,
    left: &ScalarValue,
    right: &ScalarValue,
    datatype: &DataType,
) -> Result<ScalarValue> {
    if left.is_null() || right.is_null() {
        return Ok(ScalarValue::Null);
    }

    let overflow = || DbError::query(format!("Arithmetic overflow: {left} {op} {right}"));

    match (left, right) {
        (ScalarValue::IntervalDayTime(a), ScalarValue::IntervalDayTime(b)) => {
            let v = match op {
                ArithOperator::Add => a.checked_add(*b),
                ArithOperator::Sub => a.checked_sub(*b),
                _ => not_implemented!("Interval arithmetic for {op}"),
            };
            return Ok(ScalarValue::IntervalDayTime(v.ok_or_else(overflow)?));
        }
        (ScalarValue::Date32(d), ScalarValue::IntervalDayTime(ms)) => {
            let days = (*ms / 86_400_000) as i32;
            let v = match op {
                ArithOperator::Add => d.checked_add(days),
                ArithOperator::Sub => d.checked_sub(days),
                _ => not_implemented!("Date arithmetic for {op}"),
            };
            return Ok(ScalarValue::Date32(v.ok_or_else(overflow)?));
        }
        _ => (),
    }

    if datatype.is_float() {
        let l = float_value(left)?;
        let r = float_value(right)?;
        let v = match op {
            ArithOperator::Add => l + r,
            ArithOperator::Sub => l - r,
            ArithOperator::Mul => l * r,
            ArithOperator::Div => l / r,
            ArithOperator::Mod => l % r,
        };
        return ScalarValue::Float64(v).try_cast(datatype);
    }

    // Integers and decimals. Decimals are computed at the output scale.
    let scale = match datatype {
        DataType::Decimal64(m) | DataType::Decimal128(m) => m.scale,
        _ => 0,
    };
    let wide = DataType::Decimal128(DecimalTypeMeta::new(
        DataType::DECIMAL128_MAX_PRECISION,
        scale,
    ));
    let l = unscaled(&left.try_cast(&wide)?)?;
    let r = unscaled(&right.try_cast(&wide)?)?;
    let factor = 10i128.pow(scale as u32);

    let v = match op {
        ArithOperator::Add => l.checked_add(r),
        ArithOperator::Sub => l.checked_sub(r),
        ArithOperator::Mul => l.checked_mul(r).map(|v| v / factor),
        ArithOperator::Div => {
            if r == 0 {
                return Err(DbError::query("Division by zero"));
            }
            l.checked_mul(factor).map(|v| v / r)
        }
        ArithOperator::Mod => {
            if r == 0 {
                return Err(DbError::query("Division by zero"));
            }
            Some(l % r)
        }
    }
    .ok_or_else(overflow)?;

    let out = ScalarValue::Decimal128(crate::types::scalar::DecimalScalar {
        precision: DataType::DECIMAL128_MAX_PRECISION,
        scale,
        value: v,
    });
    out.try_cast(datatype)
}

fn unscaled(v: &ScalarValue) -> Result<i128> {
    match v {
        ScalarValue::Decimal128(d) => Ok(d.value),
        other => Err(DbError::new(format!("Expected decimal, got {other}"))),
    }
}

fn float_value(v: &ScalarValue) -> Result<f64> {
    match v.try_cast(&DataType::Float64)? {
        ScalarValue::Float64(f) => Ok(f),
        other => Err(DbError::new(format!("Expected float, got {other}"))),
    }
}

/// Compare two non-null values.
///
/// Numeric values of different types are compared by value.
pub fn compare_scalars(left: &ScalarValue, right: &ScalarValue) -> Result<Ordering> {
    let left_type = left.datatype();
    let right_type = right.datatype();

    if left_type.is_numeric() && right_type.is_numeric() {
        if left_type.is_float() || right_type.is_float() {
            let l = float_value(left)?;
            let r = float_value(right)?;
            return l
                .partial_cmp(&r)
                .ok_or_else(|| DbError::new("Cannot compare NaN"));
        }

        let scale = |dt: &DataType| dt.try_get_decimal_type_meta().map(|m| m.scale).unwrap_or(0);
        let scale = scale(&left_type).max(scale(&right_type));
        let wide = DataType::Decimal128(DecimalTypeMeta::new(
            DataType::DECIMAL128_MAX_PRECISION,
            scale,
        ));
        let l = unscaled(&left.try_cast(&wide)?)?;
        let r = unscaled(&right.try_cast(&wide)?)?;
        return Ok(l.cmp(&r));
    }

    Ok(match (left, right) {
        (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.cmp(b),
        (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a.cmp(b),
        (ScalarValue::Binary(a), ScalarValue::Binary(b)) => a.cmp(b),
        (ScalarValue::Date32(a), ScalarValue::Date32(b)) => a.cmp(b),
        (ScalarValue::Timestamp(a), ScalarValue::Timestamp(b)) => a.cmp(b),
        (ScalarValue::IntervalDayTime(a), ScalarValue::IntervalDayTime(b)) => a.cmp(b),
        (ScalarValue::IntervalYearMonth(a), ScalarValue::IntervalYearMonth(b)) => a.cmp(b),
        (a, b) => {
            return Err(DbError::new(format!(
                "Cannot compare values of types {} and {}",
                a.datatype(),
                b.datatype()
            )));
        }
    })
}
