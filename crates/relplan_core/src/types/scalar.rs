use std::fmt;
use std::hash::{Hash, Hasher};

use relplan_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::datatype::{DataType, DecimalTypeMeta, ListTypeMeta, StructTypeMeta};

/// A single typed value.
///
/// Literals in expressions, default values, and values produced when
/// evaluating constant expressions all use this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// An untyped null. Typed nulls are expressed as a cast of this value.
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal64(DecimalScalar<i64>),
    Decimal128(DecimalScalar<i128>),
    Date32(i32),
    Timestamp(i64),
    IntervalDayTime(i64),
    IntervalYearMonth(i32),
    Utf8(String),
    Binary(Vec<u8>),
    Struct(Vec<ScalarValue>),
    List(Vec<ScalarValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecimalScalar<T> {
    pub precision: u8,
    pub scale: i8,
    pub value: T,
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Get the data type of this value.
    ///
    /// Struct and list values report the types of their elements, an empty
    /// list reports a list of nulls.
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Decimal64(d) => DataType::Decimal64(DecimalTypeMeta::new(d.precision, d.scale)),
            Self::Decimal128(d) => {
                DataType::Decimal128(DecimalTypeMeta::new(d.precision, d.scale))
            }
            Self::Date32(_) => DataType::Date32,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::IntervalDayTime(_) => DataType::IntervalDayTime,
            Self::IntervalYearMonth(_) => DataType::IntervalYearMonth,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::Struct(vals) => {
                DataType::struct_type(vals.iter().map(|v| (None, v.datatype())))
            }
            Self::List(vals) => DataType::List(ListTypeMeta {
                datatype: Box::new(
                    vals.first()
                        .map(|v| v.datatype())
                        .unwrap_or(DataType::Null),
                ),
            }),
        }
    }

    /// Zero value for a numeric or interval type.
    pub fn zero_of_type(datatype: &DataType) -> Result<Self> {
        Ok(match datatype {
            DataType::Int8 => Self::Int8(0),
            DataType::Int16 => Self::Int16(0),
            DataType::Int32 => Self::Int32(0),
            DataType::Int64 => Self::Int64(0),
            DataType::Float32 => Self::Float32(0.0),
            DataType::Float64 => Self::Float64(0.0),
            DataType::Decimal64(m) => Self::Decimal64(DecimalScalar {
                precision: m.precision,
                scale: m.scale,
                value: 0,
            }),
            DataType::Decimal128(m) => Self::Decimal128(DecimalScalar {
                precision: m.precision,
                scale: m.scale,
                value: 0,
            }),
            DataType::IntervalDayTime => Self::IntervalDayTime(0),
            DataType::IntervalYearMonth => Self::IntervalYearMonth(0),
            other => {
                return Err(DbError::new(format!("No zero value for type {other}")));
            }
        })
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(DbError::new(format!("Not a bool: {other}"))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int8(v) => Ok(*v as i64),
            Self::Int16(v) => Ok(*v as i64),
            Self::Int32(v) => Ok(*v as i64),
            Self::Int64(v) => Ok(*v),
            other => Err(DbError::new(format!("Not an integer: {other}"))),
        }
    }

    /// Cast this value to `to`.
    ///
    /// Out of range numeric casts are query errors since they depend on
    /// user data.
    pub fn try_cast(&self, to: &DataType) -> Result<ScalarValue> {
        if self.is_null() {
            return Ok(ScalarValue::Null);
        }
        if &self.datatype() == to {
            return Ok(self.clone());
        }

        match to {
            DataType::Boolean => match self {
                Self::Utf8(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "t" => Ok(Self::Boolean(true)),
                    "false" | "f" => Ok(Self::Boolean(false)),
                    _ => Err(cast_error(self, to)),
                },
                other => Ok(Self::Boolean(other.as_i128().map_err(|_| cast_error(self, to))? != 0)),
            },
            DataType::Int8 => Ok(Self::Int8(self.to_integer(to)?.try_into().map_err(|_| out_of_range(self, to))?)),
            DataType::Int16 => Ok(Self::Int16(self.to_integer(to)?.try_into().map_err(|_| out_of_range(self, to))?)),
            DataType::Int32 => Ok(Self::Int32(self.to_integer(to)?.try_into().map_err(|_| out_of_range(self, to))?)),
            DataType::Int64 => Ok(Self::Int64(self.to_integer(to)?.try_into().map_err(|_| out_of_range(self, to))?)),
            DataType::Float32 => Ok(Self::Float32(self.to_f64(to)? as f32)),
            DataType::Float64 => Ok(Self::Float64(self.to_f64(to)?)),
            DataType::Decimal64(m) => {
                let value = self.to_decimal_value(to, *m)?;
                let value = i64::try_from(value).map_err(|_| out_of_range(self, to))?;
                Ok(Self::Decimal64(DecimalScalar {
                    precision: m.precision,
                    scale: m.scale,
                    value,
                }))
            }
            DataType::Decimal128(m) => Ok(Self::Decimal128(DecimalScalar {
                precision: m.precision,
                scale: m.scale,
                value: self.to_decimal_value(to, *m)?,
            })),
            DataType::Utf8 => Ok(Self::Utf8(self.to_string())),
            DataType::IntervalDayTime => match self {
                Self::IntervalDayTime(_) => Ok(self.clone()),
                _ => Err(cast_error(self, to)),
            },
            DataType::IntervalYearMonth => match self {
                Self::IntervalYearMonth(_) => Ok(self.clone()),
                _ => Err(cast_error(self, to)),
            },
            DataType::Struct(StructTypeMeta { fields }) => match self {
                Self::Struct(vals) if vals.len() == fields.len() => {
                    let vals = vals
                        .iter()
                        .zip(fields)
                        .map(|(v, f)| v.try_cast(&f.datatype))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Self::Struct(vals))
                }
                _ => Err(cast_error(self, to)),
            },
            DataType::List(meta) => match self {
                Self::List(vals) => {
                    let vals = vals
                        .iter()
                        .map(|v| v.try_cast(&meta.datatype))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Self::List(vals))
                }
                _ => Err(cast_error(self, to)),
            },
            _ => Err(cast_error(self, to)),
        }
    }

    /// Get an exact integer representation of an integer or decimal value,
    /// without applying any scale.
    fn as_i128(&self) -> Result<i128> {
        match self {
            Self::Boolean(b) => Ok(*b as i128),
            Self::Int8(v) => Ok(*v as i128),
            Self::Int16(v) => Ok(*v as i128),
            Self::Int32(v) => Ok(*v as i128),
            Self::Int64(v) => Ok(*v as i128),
            Self::Decimal64(d) => Ok(d.value as i128),
            Self::Decimal128(d) => Ok(d.value),
            other => Err(DbError::new(format!("Not an integer: {other}"))),
        }
    }

    fn to_integer(&self, to: &DataType) -> Result<i128> {
        match self {
            Self::Boolean(b) => Ok(*b as i128),
            Self::Int8(_) | Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => self.as_i128(),
            Self::Decimal64(DecimalScalar { scale, value, .. }) => {
                Ok(rescale_round(*value as i128, *scale, 0))
            }
            Self::Decimal128(DecimalScalar { scale, value, .. }) => {
                Ok(rescale_round(*value, *scale, 0))
            }
            Self::Float32(v) => float_to_integer(*v as f64, self, to),
            Self::Float64(v) => float_to_integer(*v, self, to),
            Self::Utf8(s) => s.trim().parse::<i128>().map_err(|_| cast_error(self, to)),
            _ => Err(cast_error(self, to)),
        }
    }

    fn to_f64(&self, to: &DataType) -> Result<f64> {
        match self {
            Self::Int8(_) | Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => {
                Ok(self.as_i128()? as f64)
            }
            Self::Float32(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Decimal64(d) => Ok(d.value as f64 / 10f64.powi(d.scale as i32)),
            Self::Decimal128(d) => Ok(d.value as f64 / 10f64.powi(d.scale as i32)),
            Self::Utf8(s) => s.trim().parse::<f64>().map_err(|_| cast_error(self, to)),
            _ => Err(cast_error(self, to)),
        }
    }

    fn to_decimal_value(&self, to: &DataType, meta: DecimalTypeMeta) -> Result<i128> {
        let value = match self {
            Self::Int8(_) | Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => {
                rescale_round(self.as_i128()?, 0, meta.scale)
            }
            Self::Decimal64(d) => rescale_round(d.value as i128, d.scale, meta.scale),
            Self::Decimal128(d) => rescale_round(d.value, d.scale, meta.scale),
            Self::Float32(_) | Self::Float64(_) => {
                let v = self.to_f64(to)? * 10f64.powi(meta.scale as i32);
                float_to_integer(v.round(), self, to)?
            }
            _ => return Err(cast_error(self, to)),
        };

        let max = 10i128.pow(meta.precision as u32);
        if value <= -max || value >= max {
            return Err(out_of_range(self, to));
        }
        Ok(value)
    }
}

/// Move a decimal's unscaled value from one scale to another, rounding half
/// away from zero when reducing the scale.
fn rescale_round(value: i128, from_scale: i8, to_scale: i8) -> i128 {
    if to_scale >= from_scale {
        value * 10i128.pow((to_scale - from_scale) as u32)
    } else {
        let div = 10i128.pow((from_scale - to_scale) as u32);
        let q = value / div;
        let r = value % div;
        if r.abs() * 2 >= div {
            q + value.signum()
        } else {
            q
        }
    }
}

fn float_to_integer(v: f64, from: &ScalarValue, to: &DataType) -> Result<i128> {
    if !v.is_finite() {
        return Err(out_of_range(from, to));
    }
    let rounded = v.round();
    if rounded < i128::MIN as f64 || rounded > i128::MAX as f64 {
        return Err(out_of_range(from, to));
    }
    Ok(rounded as i128)
}

fn cast_error(from: &ScalarValue, to: &DataType) -> DbError {
    DbError::query(format!("Cannot cast '{from}' to {to}"))
}

fn out_of_range(from: &ScalarValue, to: &DataType) -> DbError {
    DbError::query(format!("Value '{from}' is out of range for {to}"))
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int8(a), Self::Int8(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            // Bitwise so that literals can be used as keys.
            (Self::Float32(a), Self::Float32(b)) => a.to_bits() == b.to_bits(),
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Decimal64(a), Self::Decimal64(b)) => a == b,
            (Self::Decimal128(a), Self::Decimal128(b)) => a == b,
            (Self::Date32(a), Self::Date32(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::IntervalDayTime(a), Self::IntervalDayTime(b)) => a == b,
            (Self::IntervalYearMonth(a), Self::IntervalYearMonth(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Int8(v) => v.hash(state),
            Self::Int16(v) => v.hash(state),
            Self::Int32(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float32(v) => v.to_bits().hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Decimal64(v) => v.hash(state),
            Self::Decimal128(v) => v.hash(state),
            Self::Date32(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::IntervalDayTime(v) => v.hash(state),
            Self::IntervalYearMonth(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
            Self::Struct(v) => v.hash(state),
            Self::List(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal64(d) => fmt_decimal(d.value as i128, d.scale, f),
            Self::Decimal128(d) => fmt_decimal(d.value, d.scale, f),
            Self::Date32(v) => write!(f, "date({v})"),
            Self::Timestamp(v) => write!(f, "timestamp({v})"),
            Self::IntervalDayTime(v) => write!(f, "interval {v} ms"),
            Self::IntervalYearMonth(v) => write!(f, "interval {v} months"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "{v:?}"),
            Self::Struct(vals) | Self::List(vals) => {
                let open = if matches!(self, Self::Struct(_)) { "{" } else { "[" };
                let close = if matches!(self, Self::Struct(_)) { "}" } else { "]" };
                write!(f, "{open}")?;
                for (idx, v) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

fn fmt_decimal(value: i128, scale: i8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if scale <= 0 {
        return write!(f, "{value}");
    }
    let div = 10i128.pow(scale as u32);
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.abs();
    write!(
        f,
        "{sign}{}.{:0width$}",
        abs / div,
        abs % div,
        width = scale as usize
    )
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widen_and_narrow_round_trip() {
        for v in [i32::MIN, -1, 0, 1, 42, i32::MAX] {
            let wide = ScalarValue::Int32(v).try_cast(&DataType::Int64).unwrap();
            assert_eq!(ScalarValue::Int64(v as i64), wide);
            let back = wide.try_cast(&DataType::Int32).unwrap();
            assert_eq!(ScalarValue::Int32(v), back);
        }
    }

    #[test]
    fn integer_through_decimal_round_trip() {
        let dec = DataType::decimal(12, 2).unwrap();
        for v in [i32::MIN, -7, 0, 9, i32::MAX] {
            let out = ScalarValue::Int32(v)
                .try_cast(&dec)
                .unwrap()
                .try_cast(&DataType::Int32)
                .unwrap();
            assert_eq!(ScalarValue::Int32(v), out);
        }
    }

    #[test]
    fn narrowing_out_of_range_is_query_error() {
        let err = ScalarValue::Int64(i64::MAX)
            .try_cast(&DataType::Int32)
            .unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn decimal_display() {
        let v = ScalarValue::Int32(-1234)
            .try_cast(&DataType::decimal(10, 2).unwrap())
            .unwrap();
        assert_eq!("-1234.00", v.to_string());
    }

    #[test]
    fn decimal_to_integer_rounds() {
        let v = ScalarValue::Decimal64(DecimalScalar {
            precision: 4,
            scale: 1,
            value: 25,
        });
        assert_eq!(ScalarValue::Int64(3), v.try_cast(&DataType::Int64).unwrap());
    }

    #[test]
    fn null_casts_to_anything() {
        assert_eq!(
            ScalarValue::Null,
            ScalarValue::Null.try_cast(&DataType::Int64).unwrap()
        );
    }
}
