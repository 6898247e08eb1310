use std::fmt;

use relplan_error::{DbError, Result};
use serde::{Deserialize, Serialize};

/// Metadata associated with decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecimalTypeMeta {
    pub precision: u8,
    pub scale: i8,
}

impl DecimalTypeMeta {
    pub const fn new(precision: u8, scale: i8) -> Self {
        DecimalTypeMeta { precision, scale }
    }
}

/// A single named (or positional) field in a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: Option<String>,
    pub datatype: DataType,
}

/// Metadata associated with structs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructTypeMeta {
    pub fields: Vec<StructField>,
}

/// Metadata associated with lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListTypeMeta {
    pub datatype: Box<DataType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of an untyped null, also the return type of functions that never
    /// return (`fail`).
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Decimal with precision up to 18, fits in an i64.
    Decimal64(DecimalTypeMeta),
    /// Decimal with precision up to 38, fits in an i128.
    Decimal128(DecimalTypeMeta),
    /// Days since epoch.
    Date32,
    /// Microseconds since epoch.
    Timestamp,
    /// Day to second interval in milliseconds.
    IntervalDayTime,
    /// Year to month interval in months.
    IntervalYearMonth,
    Utf8,
    Binary,
    /// A struct of different types. Used for row values, including the merge
    /// row.
    Struct(StructTypeMeta),
    /// A list of values all of the same type.
    List(ListTypeMeta),
}

impl DataType {
    /// Max precision for a decimal stored in 64 bits.
    pub const DECIMAL64_MAX_PRECISION: u8 = 18;
    /// Max precision for a decimal stored in 128 bits.
    pub const DECIMAL128_MAX_PRECISION: u8 = 38;

    /// Create a decimal type, picking the physical width from the precision.
    pub fn decimal(precision: u8, scale: i8) -> Result<Self> {
        if precision == 0 || precision > Self::DECIMAL128_MAX_PRECISION {
            return Err(DbError::new("Invalid decimal precision").with_field("precision", precision));
        }
        if scale < 0 || scale as u8 > precision {
            return Err(DbError::new("Invalid decimal scale")
                .with_field("precision", precision)
                .with_field("scale", scale));
        }
        let meta = DecimalTypeMeta::new(precision, scale);
        if precision <= Self::DECIMAL64_MAX_PRECISION {
            Ok(DataType::Decimal64(meta))
        } else {
            Ok(DataType::Decimal128(meta))
        }
    }

    /// Create a struct type from an iterator of (optional name, type) pairs.
    pub fn struct_type(fields: impl IntoIterator<Item = (Option<String>, DataType)>) -> Self {
        DataType::Struct(StructTypeMeta {
            fields: fields
                .into_iter()
                .map(|(name, datatype)| StructField { name, datatype })
                .collect(),
        })
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub const fn is_decimal(&self) -> bool {
        matches!(self, DataType::Decimal64(_) | DataType::Decimal128(_))
    }

    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float() || self.is_decimal()
    }

    pub fn try_get_decimal_type_meta(&self) -> Result<DecimalTypeMeta> {
        match self {
            DataType::Decimal64(m) | DataType::Decimal128(m) => Ok(*m),
            other => Err(DbError::new(format!(
                "Cannot get decimal meta from {other}"
            ))),
        }
    }

    pub fn try_get_struct_type_meta(&self) -> Result<&StructTypeMeta> {
        match self {
            DataType::Struct(m) => Ok(m),
            other => Err(DbError::new(format!("Cannot get struct meta from {other}"))),
        }
    }

    /// Number of decimal digits needed to represent every value of an integer
    /// type. None for non-integer types.
    pub const fn integer_digits(&self) -> Option<u8> {
        match self {
            DataType::Int8 => Some(3),
            DataType::Int16 => Some(5),
            DataType::Int32 => Some(10),
            DataType::Int64 => Some(19),
            _ => None,
        }
    }

    /// If casting from `self` to `other` leaves the physical representation
    /// of every value unchanged.
    pub fn is_type_only_coercion(&self, other: &DataType) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (DataType::Decimal64(a), DataType::Decimal64(b))
            | (DataType::Decimal128(a), DataType::Decimal128(b)) => {
                a.scale == b.scale && a.precision <= b.precision
            }
            _ => false,
        }
    }

    /// If every value of `self` can be represented in `other` without loss.
    ///
    /// Casting a value to a type that represents it, then back to the
    /// original type, reproduces the original value.
    pub fn is_represented_by(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (DataType::Null, _) => true,
            (a, b) if a.is_integer() && b.is_integer() => {
                a.integer_digits() <= b.integer_digits()
            }
            (DataType::Int8 | DataType::Int16, DataType::Float32) => true,
            (DataType::Int8 | DataType::Int16 | DataType::Int32, DataType::Float64) => true,
            (DataType::Float32, DataType::Float64) => true,
            (a, DataType::Decimal64(m) | DataType::Decimal128(m)) if a.is_integer() => {
                let digits = a.integer_digits().unwrap_or(u8::MAX) as i16;
                digits <= m.precision as i16 - m.scale as i16
            }
            (
                DataType::Decimal64(a) | DataType::Decimal128(a),
                DataType::Decimal64(b) | DataType::Decimal128(b),
            ) => {
                b.scale >= a.scale
                    && (b.precision as i16 - b.scale as i16)
                        >= (a.precision as i16 - a.scale as i16)
            }
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Int8 => write!(f, "Int8"),
            Self::Int16 => write!(f, "Int16"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float32 => write!(f, "Float32"),
            Self::Float64 => write!(f, "Float64"),
            Self::Decimal64(m) => write!(f, "Decimal64({},{})", m.precision, m.scale),
            Self::Decimal128(m) => write!(f, "Decimal128({},{})", m.precision, m.scale),
            Self::Date32 => write!(f, "Date32"),
            Self::Timestamp => write!(f, "Timestamp"),
            Self::IntervalDayTime => write!(f, "Interval(day to second)"),
            Self::IntervalYearMonth => write!(f, "Interval(year to month)"),
            Self::Utf8 => write!(f, "Utf8"),
            Self::Binary => write!(f, "Binary"),
            Self::Struct(meta) => {
                write!(f, "Struct {{")?;
                for (idx, field) in meta.fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    match &field.name {
                        Some(name) => write!(f, "{name}: {}", field.datatype)?,
                        None => write!(f, "{}", field.datatype)?,
                    }
                }
                write!(f, "}}")
            }
            Self::List(meta) => write!(f, "List[{}]", meta.datatype),
        }
    }
}
