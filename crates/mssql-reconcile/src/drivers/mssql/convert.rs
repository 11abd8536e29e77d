//! Conversions between tiberius rows/parameters and [`SqlValue`].
//!
//! Columns are read by their declared [`DataType`]. The only fallbacks are
//! driver-level width differences inside one semantic type (tinyint comes
//! back as `u8`, money as `f64`, date as `NaiveDate`).

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tiberius::{Row, ToSql};
use uuid::Uuid;

use crate::core::schema::DataType;
use crate::core::value::SqlValue;
use crate::error::Result;

/// Read column `idx` of a tiberius row as a value of `data_type`.
pub fn read_value(row: &Row, idx: usize, data_type: DataType) -> Result<SqlValue> {
    let value = match data_type {
        DataType::Boolean => row.try_get::<bool, _>(idx)?.map(SqlValue::Bool),
        DataType::Short => match row.try_get::<i16, _>(idx) {
            Ok(v) => v.map(SqlValue::I16),
            Err(_) => row
                .try_get::<u8, _>(idx)?
                .map(|v| SqlValue::I16(i16::from(v))),
        },
        DataType::Int => row.try_get::<i32, _>(idx)?.map(SqlValue::I32),
        DataType::Long => row.try_get::<i64, _>(idx)?.map(SqlValue::I64),
        DataType::Decimal => match row.try_get::<Decimal, _>(idx) {
            Ok(v) => v.map(SqlValue::Decimal),
            // money and smallmoney
            Err(_) => row
                .try_get::<f64, _>(idx)?
                .and_then(Decimal::from_f64_retain)
                .map(SqlValue::Decimal),
        },
        DataType::DateTime => match row.try_get::<NaiveDateTime, _>(idx) {
            Ok(v) => v.map(SqlValue::DateTime),
            Err(_) => row
                .try_get::<NaiveDate, _>(idx)?
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(SqlValue::DateTime),
        },
        DataType::String => row
            .try_get::<&str, _>(idx)?
            .map(|s| SqlValue::Text(s.to_string())),
        DataType::Binary => row
            .try_get::<&[u8], _>(idx)?
            .map(|b| SqlValue::Bytes(b.to_vec())),
        DataType::Guid => row.try_get::<Uuid, _>(idx)?.map(SqlValue::Uuid),
    };

    Ok(value.unwrap_or(SqlValue::Null(data_type)))
}

/// Convert a value into a boxed statement parameter.
///
/// NULLs are bound with the type of their column.
pub fn to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(data_type) => null_param(*data_type),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
    }
}

fn null_param(data_type: DataType) -> Box<dyn ToSql> {
    match data_type {
        DataType::Boolean => Box::new(Option::<bool>::None),
        DataType::Short => Box::new(Option::<i16>::None),
        DataType::Int => Box::new(Option::<i32>::None),
        DataType::Long => Box::new(Option::<i64>::None),
        DataType::Decimal => Box::new(Option::<Decimal>::None),
        DataType::DateTime => Box::new(Option::<NaiveDateTime>::None),
        DataType::String => Box::new(Option::<String>::None),
        DataType::Binary => Box::new(Option::<Vec<u8>>::None),
        DataType::Guid => Box::new(Option::<Uuid>::None),
    }
}

/// Box every value of a statement as a parameter.
pub fn bind_params(values: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    values.iter().map(to_sql_param).collect()
}
