use std::borrow::Cow;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tiberius::numeric::Numeric;
use tiberius::time::{DateTime as SqlDateTime, SmallDateTime};
use tiberius::xml::XmlData;
use tiberius::{ColumnData, IntoSql, Query, TokenRow, Uuid};

use crate::bulk::{BulkPayload, ProgressTracker};
use crate::error::SqlCoordinatorError;
use crate::types::DbValue;

use super::client::MssqlClient;
use super::database_error;
use super::params::quote_object_name;

// Same column set and order tiberius sends for `INSERT BULK`.
const DESTINATION_COLUMNS_SQL: &str = "SELECT c.name, TYPE_NAME(c.system_type_id), c.precision, c.scale
FROM sys.columns AS c
WHERE c.object_id = OBJECT_ID(@P1)
  AND c.is_identity = 0
  AND c.is_computed = 0
  AND TYPE_NAME(c.system_type_id) <> 'timestamp'
ORDER BY c.column_id";

/// Days from 0001-01-01 (day 1) to 1900-01-01, the epoch of `datetime` and `smalldatetime`.
const DAYS_TO_1900: i32 = 693_596;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DestinationColumn {
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) precision: u8,
    pub(crate) scale: u8,
}

/// Copy the payload with the native bulk-load protocol, one `INSERT BULK` per batch.
///
/// Every value is converted to its destination column's wire type before the first batch
/// is sent, so conversion problems never leave a partial load behind.
///
/// # Errors
/// `InvalidArgument` for unknown input columns or unconvertible values, `DatabaseError` for
/// anything the server rejects.
pub async fn bulk_insert(
    client: &mut MssqlClient,
    payload: &BulkPayload,
    tracker: &mut ProgressTracker,
) -> Result<u64, SqlCoordinatorError> {
    let table = quote_object_name(&payload.table)?;
    let columns = destination_columns(client, &table).await?;
    if columns.is_empty() {
        return Err(SqlCoordinatorError::database_message(format!(
            "table {table} does not exist or has no insertable columns"
        )));
    }
    let mapping = map_columns(&payload.columns, &columns)?;
    let converted = payload
        .rows
        .iter()
        .map(|row| convert_row(row, &mapping, &columns))
        .collect::<Result<Vec<_>, _>>()?;

    let mut copied: u64 = 0;
    let mut pending = converted.into_iter().peekable();
    while pending.peek().is_some() {
        let mut request = client
            .bulk_insert(&table)
            .await
            .map_err(|e| database_error("bulk insert", e))?;
        for values in pending.by_ref().take(payload.batch_size) {
            let mut row = TokenRow::new();
            for value in values {
                row.push(value);
            }
            request
                .send(row)
                .await
                .map_err(|e| database_error("bulk insert row", e))?;
            copied += 1;
            tracker.row_copied(copied);
        }
        request
            .finalize()
            .await
            .map_err(|e| database_error("bulk insert batch", e))?;
    }

    tracker.finish(copied);
    Ok(copied)
}

async fn destination_columns(
    client: &mut MssqlClient,
    table: &str,
) -> Result<Vec<DestinationColumn>, SqlCoordinatorError> {
    let mut query = Query::new(DESTINATION_COLUMNS_SQL);
    query.bind(table.to_owned());
    let rows = query
        .query(client)
        .await
        .map_err(|e| database_error("read destination columns", e))?
        .into_first_result()
        .await
        .map_err(|e| database_error("read destination columns", e))?;

    rows.iter()
        .map(|row| {
            let name: Option<&str> = row
                .try_get(0)
                .map_err(|e| database_error("read column name", e))?;
            let type_name: Option<&str> = row
                .try_get(1)
                .map_err(|e| database_error("read column type", e))?;
            let precision: Option<u8> = row
                .try_get(2)
                .map_err(|e| database_error("read column precision", e))?;
            let scale: Option<u8> = row
                .try_get(3)
                .map_err(|e| database_error("read column scale", e))?;
            Ok(DestinationColumn {
                name: name.unwrap_or_default().to_owned(),
                type_name: type_name.unwrap_or_default().to_ascii_lowercase(),
                precision: precision.unwrap_or_default(),
                scale: scale.unwrap_or_default(),
            })
        })
        .collect()
}

/// For each destination column, the index of the input column feeding it.
pub(crate) fn map_columns(
    input: &[String],
    destination: &[DestinationColumn],
) -> Result<Vec<Option<usize>>, SqlCoordinatorError> {
    if let Some(unknown) = input
        .iter()
        .find(|name| !destination.iter().any(|d| d.name.eq_ignore_ascii_case(name)))
    {
        return Err(SqlCoordinatorError::InvalidArgument(format!(
            "input column '{unknown}' does not exist in the destination table"
        )));
    }
    Ok(destination
        .iter()
        .map(|d| input.iter().position(|name| d.name.eq_ignore_ascii_case(name)))
        .collect())
}

fn convert_row(
    row: &[DbValue],
    mapping: &[Option<usize>],
    columns: &[DestinationColumn],
) -> Result<Vec<ColumnData<'static>>, SqlCoordinatorError> {
    mapping
        .iter()
        .zip(columns)
        .map(|(source, column)| {
            let value = source.and_then(|i| row.get(i)).unwrap_or(&DbValue::Null);
            to_column_data(value, column)
        })
        .collect()
}

/// Convert a value to the exact wire type of `column`.
///
/// Decimal text is scaled without going through floating point; digits past the column
/// scale are truncated.
///
/// # Errors
/// Returns `SqlCoordinatorError::InvalidArgument` if the value does not fit the column type.
pub(crate) fn to_column_data(
    value: &DbValue,
    column: &DestinationColumn,
) -> Result<ColumnData<'static>, SqlCoordinatorError> {
    let mismatch = || {
        SqlCoordinatorError::InvalidArgument(format!(
            "{} value cannot be loaded into column '{}' ({})",
            value.type_name(),
            column.name,
            column.type_name
        ))
    };
    let data = match column.type_name.as_str() {
        "bit" => ColumnData::Bit(convert(value, bool_of).ok_or_else(mismatch)?),
        "tinyint" => ColumnData::U8(
            convert(value, |v| int_of(v).and_then(|i| u8::try_from(i).ok()))
                .ok_or_else(mismatch)?,
        ),
        "smallint" => ColumnData::I16(
            convert(value, |v| int_of(v).and_then(|i| i16::try_from(i).ok()))
                .ok_or_else(mismatch)?,
        ),
        "int" => ColumnData::I32(
            convert(value, |v| int_of(v).and_then(|i| i32::try_from(i).ok()))
                .ok_or_else(mismatch)?,
        ),
        "bigint" => ColumnData::I64(convert(value, int_of).ok_or_else(mismatch)?),
        #[allow(clippy::cast_possible_truncation)]
        "real" => ColumnData::F32(
            convert(value, |v| float_of(v).map(|f| f as f32))
                .ok_or_else(mismatch)?,
        ),
        "float" => ColumnData::F64(convert(value, float_of).ok_or_else(mismatch)?),
        "decimal" | "numeric" => ColumnData::Numeric(
            convert(value, |v| to_numeric(v, column.precision, column.scale))
                .ok_or_else(mismatch)?,
        ),
        "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "sysname" => {
            ColumnData::String(
                convert(value, |v| text_of(v).map(Cow::Owned)).ok_or_else(mismatch)?,
            )
        }
        "binary" | "varbinary" | "image" => ColumnData::Binary(match value {
            DbValue::Null => None,
            DbValue::Blob(bytes) => Some(Cow::Owned(bytes.clone())),
            DbValue::Text(s) => Some(Cow::Owned(s.as_bytes().to_vec())),
            _ => return Err(mismatch()),
        }),
        "uniqueidentifier" => ColumnData::Guid(match value {
            DbValue::Null => None,
            DbValue::Text(s) => Some(Uuid::parse_str(s.trim()).map_err(|_| mismatch())?),
            DbValue::Blob(b) => Some(Uuid::from_slice(b).map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        }),
        "xml" => ColumnData::Xml(
            convert(value, |v| text_of(v).map(|t| Cow::Owned(XmlData::new(t))))
                .ok_or_else(mismatch)?,
        ),
        "date" => match value {
            DbValue::Null => ColumnData::Date(None),
            _ => timestamp_of(value).ok_or_else(mismatch)?.date().into_sql(),
        },
        "time" => match value {
            DbValue::Null => ColumnData::Time(None),
            DbValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map_err(|_| mismatch())?
                .into_sql(),
            _ => timestamp_of(value).ok_or_else(mismatch)?.time().into_sql(),
        },
        "datetime2" => match value {
            DbValue::Null => ColumnData::DateTime2(None),
            _ => timestamp_of(value).ok_or_else(mismatch)?.into_sql(),
        },
        "datetime" => ColumnData::DateTime(
            convert(value, |v| timestamp_of(v).and_then(legacy_datetime))
                .ok_or_else(mismatch)?,
        ),
        "smalldatetime" => ColumnData::SmallDateTime(
            convert(value, |v| timestamp_of(v).and_then(small_datetime))
                .ok_or_else(mismatch)?,
        ),
        "datetimeoffset" => match value {
            DbValue::Null => ColumnData::DateTimeOffset(None),
            DbValue::Text(s) => match DateTime::parse_from_rfc3339(s.trim()) {
                Ok(dt) => dt.into_sql(),
                Err(_) => utc_offset(value).ok_or_else(mismatch)?.into_sql(),
            },
            _ => utc_offset(value).ok_or_else(mismatch)?.into_sql(),
        },
        other => {
            return Err(SqlCoordinatorError::InvalidArgument(format!(
                "column '{}' has type {other}, which bulk load does not support",
                column.name
            )));
        }
    };
    Ok(data)
}

/// `Some(None)` for NULL, `Some(Some(_))` when `f` converts, `None` when it cannot.
fn convert<T>(value: &DbValue, f: impl FnOnce(&DbValue) -> Option<T>) -> Option<Option<T>> {
    if value.is_null() {
        Some(None)
    } else {
        f(value).map(Some)
    }
}

fn utc_offset(value: &DbValue) -> Option<DateTime<FixedOffset>> {
    timestamp_of(value).map(|dt| dt.and_utc().fixed_offset())
}

fn bool_of(value: &DbValue) -> Option<bool> {
    match value {
        DbValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => value.as_bool(),
    }
}

fn int_of(value: &DbValue) -> Option<i64> {
    match value {
        DbValue::Int(i) => Some(*i),
        DbValue::Bool(b) => Some(i64::from(*b)),
        DbValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_of(value: &DbValue) -> Option<f64> {
    match value {
        DbValue::Text(s) => s.trim().parse().ok(),
        _ => value.as_float(),
    }
}

fn text_of(value: &DbValue) -> Option<String> {
    match value {
        DbValue::Text(s) => Some(s.clone()),
        DbValue::Int(i) => Some(i.to_string()),
        DbValue::Float(f) => Some(f.to_string()),
        DbValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_owned()),
        DbValue::Timestamp(dt) => Some(dt.format("%F %T%.f").to_string()),
        DbValue::Json(json) => Some(json.to_string()),
        DbValue::Null | DbValue::Blob(_) => None,
    }
}

fn timestamp_of(value: &DbValue) -> Option<NaiveDateTime> {
    value.as_timestamp().or_else(|| {
        value
            .as_text()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(|d| d.and_time(NaiveTime::MIN))
    })
}

fn to_numeric(value: &DbValue, precision: u8, scale: u8) -> Option<Numeric> {
    let factor = 10_i128.checked_pow(u32::from(scale))?;
    let scaled = match value {
        DbValue::Int(i) => i128::from(*i).checked_mul(factor)?,
        DbValue::Bool(b) => i128::from(*b) * factor,
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        DbValue::Float(f) => {
            let scaled = (f * factor as f64).round();
            if !scaled.is_finite() || scaled.abs() >= 1e38 {
                return None;
            }
            scaled as i128
        }
        DbValue::Text(s) => parse_decimal(s, scale)?,
        _ => return None,
    };
    if precision > 0 && scaled.unsigned_abs() >= 10_u128.checked_pow(u32::from(precision))? {
        return None;
    }
    Some(Numeric::new_with_scale(scaled, scale))
}

/// Parse decimal text into an integer scaled by `10^scale`.
pub(crate) fn parse_decimal(text: &str, scale: u8) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return None;
    }
    let scale = usize::from(scale);
    let mut combined: String = int_part.to_owned();
    combined.extend(frac_part.chars().take(scale));
    combined.extend(std::iter::repeat_n('0', scale.saturating_sub(frac_part.len())));
    let magnitude: i128 = if combined.is_empty() { 0 } else { combined.parse().ok()? };
    Some(if negative { -magnitude } else { magnitude })
}

/// `datetime`: days since 1900-01-01 and 1/300 s ticks since midnight.
fn legacy_datetime(dt: NaiveDateTime) -> Option<SqlDateTime> {
    let days = dt.date().num_days_from_ce() - DAYS_TO_1900;
    let nanos = u64::from(dt.time().num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(dt.time().nanosecond() % 1_000_000_000);
    let ticks = (nanos * 3 + 5_000_000) / 10_000_000;
    let ticks = u32::try_from(ticks.min(300 * 86_400 - 1)).ok()?;
    Some(SqlDateTime::new(days, ticks))
}

/// `smalldatetime`: days since 1900-01-01 and minutes since midnight.
fn small_datetime(dt: NaiveDateTime) -> Option<SmallDateTime> {
    let days = u16::try_from(dt.date().num_days_from_ce() - DAYS_TO_1900).ok()?;
    let minutes = ((dt.time().num_seconds_from_midnight() + 30) / 60).min(24 * 60 - 1);
    Some(SmallDateTime::new(days, u16::try_from(minutes).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, type_name: &str, scale: u8) -> DestinationColumn {
        DestinationColumn {
            name: name.into(),
            type_name: type_name.into(),
            precision: 18,
            scale,
        }
    }

    #[test]
    fn columns_map_case_insensitively_and_missing_ones_stay_null() {
        let destination = [column("Id", "int", 0), column("Title", "nvarchar", 0)];
        let mapping = map_columns(&["title".into()], &destination).unwrap();
        assert_eq!(mapping, vec![None, Some(0)]);

        let row = convert_row(&[DbValue::Text("a".into())], &mapping, &destination).unwrap();
        assert!(matches!(row[0], ColumnData::I32(None)));
        assert!(matches!(&row[1], ColumnData::String(Some(s)) if s == "a"));
    }

    #[test]
    fn unknown_input_column_is_rejected() {
        let destination = [column("Id", "int", 0)];
        let err = map_columns(&["Nope".into()], &destination).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn decimal_text_is_scaled_exactly() {
        assert_eq!(parse_decimal("12.345", 2), Some(1234));
        assert_eq!(parse_decimal("-0.5", 3), Some(-500));
        assert_eq!(parse_decimal("7", 2), Some(700));
        assert_eq!(parse_decimal("1e5", 2), None);
        let data =
            to_column_data(&DbValue::Text("19.99".into()), &column("Price", "decimal", 2)).unwrap();
        assert!(
            matches!(data, ColumnData::Numeric(Some(n)) if n.value() == 1999 && n.scale() == 2)
        );
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        let err = to_column_data(&DbValue::Int(300), &column("Flag", "tinyint", 0)).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn legacy_datetime_counts_from_1900() {
        let dt = NaiveDate::from_ymd_opt(1900, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        let encoded = legacy_datetime(dt).unwrap();
        assert_eq!(encoded.days(), 1);
        assert_eq!(encoded.seconds_fragments(), 300);
    }
}
