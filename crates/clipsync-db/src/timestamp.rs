//! Conversions between `DateTime<Utc>` and the INTEGER microsecond columns.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Read a microsecond column as a timestamp, failing the row on out-of-range values.
pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    from_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}
