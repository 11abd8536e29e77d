//! SQL value types carried between the stores and the reconciler.
//!
//! Every value travels with the semantic [`DataType`] of its column, so
//! statement parameters are typed from metadata rather than guessed from
//! the runtime value.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::DataType;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlValue {
    /// NULL with the column type, so the driver can bind a typed NULL.
    Null(DataType),

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (tinyint, smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// Decimal value (decimal, numeric, money).
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Semantic type implied by the value.
    pub fn data_type(&self) -> DataType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => DataType::Boolean,
            SqlValue::I16(_) => DataType::Short,
            SqlValue::I32(_) => DataType::Int,
            SqlValue::I64(_) => DataType::Long,
            SqlValue::Decimal(_) => DataType::Decimal,
            SqlValue::DateTime(_) => DataType::DateTime,
            SqlValue::Text(_) => DataType::String,
            SqlValue::Bytes(_) => DataType::Binary,
            SqlValue::Uuid(_) => DataType::Guid,
        }
    }

    /// Widen any integer variant to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as a decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Decimal(d) => Some(*d),
            other => other.as_i64().map(Decimal::from),
        }
    }

    /// UUID value, accepting the textual form as well.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SqlValue::Uuid(u) => Some(*u),
            SqlValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Build an integer value of the given integer type.
    ///
    /// Returns `None` if `value` does not fit the column width.
    pub fn integer(data_type: DataType, value: i64) -> Option<SqlValue> {
        match data_type {
            DataType::Short => i16::try_from(value).ok().map(SqlValue::I16),
            DataType::Int => i32::try_from(value).ok().map(SqlValue::I32),
            DataType::Long => Some(SqlValue::I64(value)),
            _ => None,
        }
    }

    /// Total order used for window numbering and value comparison.
    ///
    /// NULL sorts first. Integers and decimals compare numerically across
    /// widths; values of unrelated types order by type.
    pub fn sort_cmp(&self, other: &SqlValue) -> Ordering {
        match (self, other) {
            (SqlValue::Null(_), SqlValue::Null(_)) => Ordering::Equal,
            (SqlValue::Null(_), _) => Ordering::Less,
            (_, SqlValue::Null(_)) => Ordering::Greater,
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a.cmp(b),
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => a.cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a.cmp(b),
            (SqlValue::Uuid(a), SqlValue::Uuid(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.as_decimal(), b.as_decimal()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => a.rank().cmp(&b.rank()),
                },
            },
        }
    }

    /// Value equality that ignores integer width and decimal scale.
    pub fn equivalent(&self, other: &SqlValue) -> bool {
        self.sort_cmp(other) == Ordering::Equal
    }

    fn rank(&self) -> u8 {
        match self {
            SqlValue::Null(_) => 0,
            SqlValue::Bool(_) => 1,
            SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) | SqlValue::Decimal(_) => 2,
            SqlValue::DateTime(_) => 3,
            SqlValue::Text(_) => 4,
            SqlValue::Bytes(_) => 5,
            SqlValue::Uuid(_) => 6,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => write!(f, "0x{}", hex_upper(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
        }
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}
