//! 📦 Common data structures: the building blocks of logc.
//!
//! 🎬 A datagram lands on port 914. It has no idea what it is yet. By the time
//! it leaves this module's types it has become a `ParsedRecord`: a neat row of
//! typed values, one per schema column, ready to be shipped to ClickHouse.
//!
//! 🦆 The duck reviewed these structs and found them adequately boring.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// 🕒 ClickHouse `DateTime` text format. Seconds, no zone, no drama.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 📅 ClickHouse `Date` text format.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// 📡 One datagram, exactly as the network delivered it.
///
/// Immutable once received. The byte length is the accounting unit for the
/// per-channel byte totals that show up in every flush summary.
#[derive(Debug, Clone)]
pub struct RawMessage {
    bytes: Vec<u8>,
    source: Option<SocketAddr>,
}

impl RawMessage {
    pub fn new(bytes: Vec<u8>, source: Option<SocketAddr>) -> Self {
        Self { bytes, source }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 📏 Byte length of the datagram payload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn source(&self) -> Option<SocketAddr> {
        self.source
    }

    /// 🔤 UTF-8 view for the parsers. Invalid sequences become U+FFFD instead
    /// of an error: a mangled byte should make a regex miss, not crash the loop.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl From<&str> for RawMessage {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec(), None)
    }
}

/// 🧱 One typed cell of a parsed record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    /// 🔄 JSON rendering used by the `JSONEachRow` insert format.
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            // -- NaN/inf have no JSON spelling, ClickHouse gets a null instead
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Timestamp(ts) => {
                serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            FieldValue::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

/// 🎯 A parsed record: ordered, fixed arity, born from exactly one parser call.
///
/// The arity and the order come from the owning channel's schema. Nobody
/// mutates a record after the parser hands it over; the buffer only moves it
/// around until the writer ships it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParsedRecord {
    values: Vec<FieldValue>,
}

impl ParsedRecord {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// 📦 One `JSONEachRow` line, keyed by the schema's field names.
    ///
    /// `fields` and the record must have the same arity; the registry checks
    /// that at startup so the zip below never silently truncates.
    pub(crate) fn to_json_row(&self, fields: &[&str]) -> serde_json::Value {
        let row: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| ((*name).to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_record_becomes_a_json_each_row_line() {
        let ts = NaiveDate::from_ymd_opt(2019, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 5))
            .expect("💀 hardcoded timestamp should be valid");
        let record = ParsedRecord::new(vec![
            FieldValue::Timestamp(ts),
            FieldValue::Int(200),
            FieldValue::Float(0.25),
            FieldValue::Null,
            FieldValue::Str("/index.html".into()),
        ]);

        let row = record.to_json_row(&["time", "status", "request_time", "referer", "uri"]);

        assert_eq!(row["time"], "2019-05-01 12:30:05");
        assert_eq!(row["status"], 200);
        assert_eq!(row["request_time"], 0.25);
        assert!(row["referer"].is_null());
        assert_eq!(row["uri"], "/index.html");
    }

    #[test]
    fn the_one_where_nan_refuses_to_be_json_and_becomes_null() {
        assert!(FieldValue::Float(f64::NAN).to_json().is_null());
    }

    #[test]
    fn the_one_where_invalid_utf8_is_survivable() {
        let raw = RawMessage::new(vec![b'n', b'g', 0xff, b'x'], None);
        assert_eq!(raw.len(), 4);
        assert!(raw.text().contains('\u{FFFD}'));
    }
}
