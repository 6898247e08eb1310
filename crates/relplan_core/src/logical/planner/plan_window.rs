use ahash::{HashMap, HashMapExt};
use indexmap::IndexMap;
use relplan_error::{DbError, Result};
use tracing::trace;

use super::PlannerEnv;
use super::coerce::coerce;
use super::plan_builder::PlanBuilder;
use super::subquery::handle_subqueries;
use super::translation::name_hint;
use crate::analysis::ast::{AstExpr, AstExprKind, FunctionCall, NodeId, NullTreatment};
use crate::analysis::window::{FrameBoundSpec, ResolvedWindow};
use crate::expr::cast_expr::CastExpr;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::{self, Expression};
use crate::logical::context::PlanContext;
use crate::logical::logical_filter::LogicalFilter;
use crate::logical::logical_order::{OrderingScheme, SortOrder};
use crate::logical::logical_window::{
    FrameBoundType,
    FrameType,
    LogicalWindow,
    WindowFrame,
    WindowFunction,
    WindowSpecification,
};
use crate::logical::operator::{LogicalOperator, Node};
use crate::logical::symbol::Symbol;
use crate::types::datatype::DataType;
use crate::types::scalar::{DecimalScalar, ScalarValue};

const NEGATIVE_OFFSET_MESSAGE: &str = "Window frame offset value must not be negative or null";

/// Symbols computed for one RANGE frame bound.
#[derive(Debug, Default)]
struct FrameBoundSymbols {
    /// Sort key plus or minus the offset.
    bound: Option<Symbol>,
    /// Sort key coerced to the type of `bound`.
    sort_key_for_comparison: Option<Symbol>,
}

/// Plans window functions, one window node per distinct function.
#[derive(Debug)]
pub struct WindowPlanner;

impl WindowPlanner {
    pub fn plan_windows<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        mut builder: PlanBuilder<'a>,
        functions: &[AstExpr],
    ) -> Result<PlanBuilder<'a>> {
        let mut planned = Vec::with_capacity(functions.len());

        for function in functions {
            let key = builder.translations().key(function);
            if planned.contains(&key) || builder.can_translate(function) {
                continue;
            }
            builder = self.plan_window(env, ctx, builder, function)?;
            planned.push(key);
        }

        Ok(builder)
    }

    fn plan_window<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        function: &AstExpr,
    ) -> Result<PlanBuilder<'a>> {
        let analysis = env.analysis;
        let call = match &function.kind {
            AstExprKind::Function(call) => call,
            _ => {
                return Err(
                    DbError::new("Window function is not a function call")
                        .with_field("node", function.id)
                );
            }
        };
        if call.filter.is_some() {
            return Err(DbError::new("Window functions cannot have a filter")
                .with_field("function", &call.name));
        }
        let window = analysis.require_window(function.id)?;
        trace!(function = %call.name, node = %function.id, "planning window function");

        // Parts of a named window are analyzed in the scope the window was
        // declared in, so they resolve against source symbols even when
        // planned from ORDER BY.
        let mut inputs: Vec<&AstExpr> = call.args.iter().filter(|arg| !arg.is_lambda()).collect();
        inputs.extend(window.partition_by.iter());
        inputs.extend(window.order_by.iter().map(|item| &item.key));
        if let Some(frame) = &window.frame {
            inputs.extend(frame.start_value());
            inputs.extend(frame.end_value());
        }

        let builder = handle_subqueries(env, ctx, builder, inputs.iter().copied())?;
        let builder = builder.append_projections(ctx, inputs.iter().copied())?;
        let (mut builder, coerced) = coerce(builder, ctx, inputs.iter().copied())?.into_parts();

        let mut frame = WindowFrame::DEFAULT;
        if let Some(spec) = &window.frame {
            frame.frame_type = spec.frame_type;
            frame.start_type = spec.start.bound_type;
            frame.end_type = spec
                .end
                .as_ref()
                .map(|end| end.bound_type)
                .unwrap_or(FrameBoundType::CurrentRow);

            match spec.frame_type {
                FrameType::Range => {
                    // Sort key casts shared between start and end.
                    let mut sort_key_casts = HashMap::new();

                    let (next, start) = self.plan_frame_bound(
                        env,
                        ctx,
                        builder,
                        &coerced,
                        Some(&spec.start),
                        window,
                        &mut sort_key_casts,
                    )?;
                    let (next, end) = self.plan_frame_bound(
                        env,
                        ctx,
                        next,
                        &coerced,
                        spec.end.as_ref(),
                        window,
                        &mut sort_key_casts,
                    )?;
                    builder = next;

                    frame.start_value = start.bound;
                    frame.sort_key_for_start_comparison = start.sort_key_for_comparison;
                    frame.end_value = end.bound;
                    frame.sort_key_for_end_comparison = end.sort_key_for_comparison;
                }
                FrameType::Rows | FrameType::Groups => {
                    let start = match spec.start_value() {
                        Some(value) => Some(coerced_symbol(&coerced, value)?.clone()),
                        None => None,
                    };
                    let end = match spec.end_value() {
                        Some(value) => Some(coerced_symbol(&coerced, value)?.clone()),
                        None => None,
                    };

                    (builder, frame.start_value) = self.plan_frame_offset(ctx, builder, start)?;
                    (builder, frame.end_value) = self.plan_frame_offset(ctx, builder, end)?;
                }
            }
        }

        self.append_window(ctx, builder, function, call, window, &coerced, frame)
    }

    /// Plan the value a RANGE frame bound is compared against.
    ///
    /// For `<offset> PRECEDING` and `<offset> FOLLOWING`, this validates the
    /// offset, computes the sort key plus or minus the offset, and coerces the
    /// sort key for comparing against that bound. Other bounds need nothing.
    #[allow(clippy::too_many_arguments)]
    fn plan_frame_bound<'a>(
        &self,
        env: &PlannerEnv<'a>,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        coerced: &HashMap<NodeId, Symbol>,
        bound: Option<&FrameBoundSpec>,
        window: &ResolvedWindow,
        sort_key_casts: &mut HashMap<DataType, Symbol>,
    ) -> Result<(PlanBuilder<'a>, FrameBoundSymbols)> {
        let analysis = env.analysis;
        let offset = match bound.and_then(|b| b.value.as_ref()) {
            Some(offset) => offset,
            None => return Ok((builder, FrameBoundSymbols::default())),
        };
        let calculation = analysis.frame_bound_calculation(offset.id).ok_or_else(|| {
            DbError::new("Missing frame bound calculation for offset").with_field("node", offset.id)
        })?;

        let offset_symbol = coerced_symbol(coerced, offset)?.clone();
        let builder = filter_negative_offset(ctx, builder, &offset_symbol)?;

        let sort_key = match window.order_by.as_slice() {
            [item] => &item.key,
            items => {
                return Err(DbError::new(
                    "RANGE frame with an offset requires exactly one sort key",
                )
                .with_field("sort_keys", items.len()));
            }
        };
        let sort_key_symbol = coerced_symbol(coerced, sort_key)?.clone();
        let sort_key_type = analysis.datatype(sort_key.id)?;

        // Sort key in the type the bound calculation operates on.
        let (builder, sort_key_for_calculation) =
            match analysis.sort_key_coercion_for_frame_bound_calculation(offset.id) {
                Some(to) => cast_sort_key(
                    ctx,
                    builder,
                    &sort_key_symbol,
                    sort_key_type,
                    to,
                    sort_key_casts,
                ),
                None => (builder, sort_key_symbol.clone()),
            };

        let bound_symbol = ctx.new_symbol(&calculation.name, calculation.return_type.clone());
        let calculate = expr::scalar_function(
            calculation.clone(),
            vec![expr::sym(&sort_key_for_calculation), expr::sym(&offset_symbol)],
        );
        let builder = builder.project_with_identities(ctx, [(bound_symbol.clone(), calculate)]);

        // Sort key in the type of the computed bound.
        let (builder, sort_key_for_comparison) =
            match analysis.sort_key_coercion_for_frame_bound_comparison(offset.id) {
                Some(to) => cast_sort_key(
                    ctx,
                    builder,
                    &sort_key_symbol,
                    sort_key_type,
                    to,
                    sort_key_casts,
                ),
                None => (builder, sort_key_symbol),
            };

        Ok((
            builder,
            FrameBoundSymbols {
                bound: Some(bound_symbol),
                sort_key_for_comparison: Some(sort_key_for_comparison),
            },
        ))
    }

    /// Plan a ROWS or GROUPS offset: validate it and normalize it to Int64.
    fn plan_frame_offset<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        offset: Option<Symbol>,
    ) -> Result<(PlanBuilder<'a>, Option<Symbol>)> {
        let offset = match offset {
            Some(offset) => offset,
            None => return Ok((builder, None)),
        };

        let builder = filter_negative_offset(ctx, builder, &offset)?;
        let offset_type = offset.datatype().clone();
        if offset_type == DataType::Int64 {
            return Ok((builder, Some(offset)));
        }

        let normalized = offset_to_int64(&offset, &offset_type)?;
        let symbol = ctx.new_symbol(offset.name(), DataType::Int64);
        let builder = builder.project_with_identities(ctx, [(symbol.clone(), normalized)]);

        Ok((builder, Some(symbol)))
    }

    #[allow(clippy::too_many_arguments)]
    fn append_window<'a>(
        &self,
        ctx: &mut PlanContext,
        builder: PlanBuilder<'a>,
        function: &AstExpr,
        call: &FunctionCall,
        window: &ResolvedWindow,
        coerced: &HashMap<NodeId, Symbol>,
        frame: WindowFrame,
    ) -> Result<PlanBuilder<'a>> {
        let analysis = builder.analysis();

        let partition_by = window
            .partition_by
            .iter()
            .map(|part| coerced_symbol(coerced, part).cloned())
            .collect::<Result<Vec<_>>>()?;

        // ORDER BY a ASC, a DESC keeps the first.
        let orderings = window
            .order_by
            .iter()
            .map(|item| {
                Ok((
                    coerced_symbol(coerced, &item.key)?.clone(),
                    SortOrder::new(item.desc, item.nulls_first),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let ordering = if orderings.is_empty() {
            None
        } else {
            Some(OrderingScheme::new(orderings))
        };

        let arguments = call
            .args
            .iter()
            .map(|arg| {
                if arg.is_lambda() {
                    builder.rewrite(arg)
                } else {
                    Ok(expr::sym(coerced_symbol(coerced, arg)?))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let symbol = ctx.new_symbol(name_hint(function), analysis.datatype(function.id)?.clone());
        let mut functions = IndexMap::with_capacity(1);
        functions.insert(
            symbol.clone(),
            WindowFunction {
                function: analysis.resolved_function(function.id)?.clone(),
                arguments,
                frame,
                ignore_nulls: call.null_treatment == Some(NullTreatment::Ignore),
            },
        );

        let key = builder.translations().key(function);
        let translations = builder
            .translations()
            .with_additional_mappings([(key, symbol)]);

        let id = ctx.next_id();
        Ok(builder
            .map_root(|root| {
                LogicalOperator::Window(Node::new(
                    id,
                    LogicalWindow {
                        specification: WindowSpecification {
                            partition_by,
                            ordering,
                        },
                        functions,
                    },
                    vec![root],
                ))
            })
            .with_translations(translations))
    }
}

fn coerced_symbol<'m>(coerced: &'m HashMap<NodeId, Symbol>, input: &AstExpr) -> Result<&'m Symbol> {
    coerced.get(&input.id).ok_or_else(|| {
        DbError::new("No coerced symbol for window input").with_field("node", input.id)
    })
}

/// Fail the query for rows where `offset` is negative or null.
fn filter_negative_offset<'a>(
    ctx: &mut PlanContext,
    builder: PlanBuilder<'a>,
    offset: &Symbol,
) -> Result<PlanBuilder<'a>> {
    let zero = ScalarValue::zero_of_type(offset.datatype())?;
    let predicate = expr::if_then_else(
        expr::compare(ComparisonOperator::GtEq, expr::sym(offset), expr::lit(zero)),
        expr::lit(true),
        expr::fail_as_boolean(NEGATIVE_OFFSET_MESSAGE),
    )?;
    let id = ctx.next_id();
    Ok(builder.map_root(|root| {
        LogicalOperator::Filter(Node::new(id, LogicalFilter { predicate }, vec![root]))
    }))
}

/// Cast the sort key to `to`, reusing an existing cast to the same type.
fn cast_sort_key<'a>(
    ctx: &mut PlanContext,
    builder: PlanBuilder<'a>,
    sort_key: &Symbol,
    sort_key_type: &DataType,
    to: &DataType,
    casts: &mut HashMap<DataType, Symbol>,
) -> (PlanBuilder<'a>, Symbol) {
    if let Some(existing) = casts.get(to) {
        return (builder, existing.clone());
    }

    let symbol = ctx.new_symbol(sort_key.name(), to.clone());
    let cast = Expression::Cast(CastExpr::new_type_only(
        expr::sym(sort_key),
        to.clone(),
        sort_key_type.is_type_only_coercion(to),
    ));
    casts.insert(to.clone(), symbol.clone());
    (
        builder.project_with_identities(ctx, [(symbol.clone(), cast)]),
        symbol,
    )
}

/// Convert a validated, non-negative frame offset to Int64.
///
/// Decimals too wide for Int64 are clamped to `i64::MAX`. An offset that
/// large reaches past the partition edge, same as `i64::MAX` would.
fn offset_to_int64(offset: &Symbol, offset_type: &DataType) -> Result<Expression> {
    let to_int64 = Expression::Cast(CastExpr::new_type_only(
        expr::sym(offset),
        DataType::Int64,
        offset_type.is_type_only_coercion(&DataType::Int64),
    ));

    let meta = match offset_type {
        DataType::Decimal64(meta) | DataType::Decimal128(meta) => *meta,
        _ => return Ok(to_int64),
    };

    // Digits left of the decimal point, i64::MAX has 19.
    let integer_digits = meta.precision as i16 - meta.scale as i16;
    if integer_digits < 19 {
        return Ok(to_int64);
    }

    let max = (i64::MAX as i128)
        .checked_mul(10_i128.pow(meta.scale.max(0) as u32))
        .ok_or_else(|| {
            DbError::new("Frame offset decimal out of range")
                .with_field("datatype", offset_type)
        })?;
    let max_literal = expr::lit(ScalarValue::Decimal128(DecimalScalar {
        precision: meta.precision,
        scale: meta.scale,
        value: max,
    }));
    expr::if_then_else(
        expr::compare(ComparisonOperator::LtEq, expr::sym(offset), max_literal),
        to_int64,
        expr::lit(i64::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::consteval::{self, RowBindings};
    use crate::logical::symbol::SymbolAllocator;
    use crate::types::datatype::DecimalTypeMeta;

    #[test]
    fn int64_offset_unchanged_type() {
        let mut symbols = SymbolAllocator::new();
        let offset = symbols.new_symbol("offset", DataType::Int32);
        let expr = offset_to_int64(&offset, &DataType::Int32).unwrap();
        assert!(matches!(expr, Expression::Cast(ref cast) if cast.to == DataType::Int64));
    }

    #[test]
    fn narrow_decimal_offset_casts() {
        let mut symbols = SymbolAllocator::new();
        let datatype = DataType::decimal(10, 0).unwrap();
        let offset = symbols.new_symbol("offset", datatype.clone());
        let expr = offset_to_int64(&offset, &datatype).unwrap();
        assert!(matches!(expr, Expression::Cast(_)));
    }

    #[test]
    fn wide_decimal_offset_clamps() {
        let mut symbols = SymbolAllocator::new();
        let datatype = DataType::Decimal128(DecimalTypeMeta::new(25, 0));
        let offset = symbols.new_symbol("offset", datatype.clone());
        let expr = offset_to_int64(&offset, &datatype).unwrap();

        let mut bindings = RowBindings::default();
        bindings.insert(
            offset.clone(),
            ScalarValue::Decimal128(DecimalScalar {
                precision: 25,
                scale: 0,
                value: i64::MAX as i128 * 100,
            }),
        );
        assert_eq!(
            ScalarValue::Int64(i64::MAX),
            consteval::eval(&expr, &bindings).unwrap()
        );
    }
}
