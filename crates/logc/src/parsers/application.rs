//! 📡 Application log: a syslog prefix and then one Monolog-style JSON document.
//!
//! ```text
//! <42> cm2_application {"message":"order placed","context":{"custom":true,"type":3,
//!   "stringProperties":{"sku":"A-1"},"floatProperties":{"total":9.5}},"level":200,
//!   "channel":"shop","datetime":{"date":"2019-05-01 12:00:00.000000","timezone":"Europe/Riga"}}
//! ```
//!
//! Output columns, in order: datetime, date, channel, message, level, type,
//! six string property slots, six float property slots. Property slots are
//! filled in key order and padded with nulls. Messages without
//! `context.custom == true` get `type = -1` and twelve nulls.
//!
//! The datetime keeps its wall-clock value; the `timezone` member is not applied.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use super::{ParseError, Parser, ParserSettings};
use crate::common::{FieldValue, ParsedRecord, RawMessage};

/// 📏 Slots per property kind.
pub(crate) const MAX_PROPERTIES: usize = 6;

/// 🔢 `type` value for messages that carry no custom context.
const NO_TYPE: i64 = -1;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug)]
pub(crate) struct ApplicationParser {
    settings: ParserSettings,
}

impl ApplicationParser {
    pub(crate) const ARITY: usize = 6 + 2 * MAX_PROPERTIES;

    pub(crate) fn new(settings: ParserSettings) -> Self {
        Self { settings }
    }
}

impl Parser for ApplicationParser {
    fn parse(&self, raw: &RawMessage) -> Result<ParsedRecord, ParseError> {
        let text = raw.text();
        let payload = text
            .find('{')
            .map(|start| &text[start..])
            .ok_or_else(|| ParseError::Payload("no JSON object found".to_string()))?;
        let doc: Value =
            serde_json::from_str(payload.trim_end()).map_err(|e| ParseError::Payload(e.to_string()))?;
        let doc = doc
            .as_object()
            .ok_or_else(|| ParseError::Payload("top-level value is not an object".to_string()))?;

        let datetime = parse_datetime(doc)?;
        let mut values = Vec::with_capacity(Self::ARITY);
        values.push(FieldValue::Timestamp(datetime));
        values.push(FieldValue::Date(datetime.date()));
        values.push(json_to_field(doc.get("channel")));
        values.push(json_to_field(doc.get("message")));
        values.push(json_to_field(doc.get("level")));

        let context = doc.get("context").and_then(Value::as_object);
        match context {
            Some(ctx) if ctx.get("custom") == Some(&Value::Bool(true)) => {
                values.push(json_to_field(ctx.get("type")));
                push_properties(&mut values, ctx.get("stringProperties"), "string", |v| match v {
                    Value::String(s) => FieldValue::Str(s.clone()),
                    other => json_to_field(Some(other)),
                })?;
                push_properties(&mut values, ctx.get("floatProperties"), "float", |v| {
                    v.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null)
                })?;
            }
            _ => {
                values.push(FieldValue::Int(NO_TYPE));
                values.extend(std::iter::repeat_n(FieldValue::Null, 2 * MAX_PROPERTIES));
            }
        }

        Ok(ParsedRecord::new(values))
    }

    fn settings(&self) -> &ParserSettings {
        &self.settings
    }
}

fn parse_datetime(doc: &Map<String, Value>) -> Result<NaiveDateTime, ParseError> {
    let date = doc
        .get("datetime")
        .and_then(|dt| dt.get("date"))
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::Payload("missing datetime.date".to_string()))?;
    NaiveDateTime::parse_from_str(date, DATETIME_FORMAT).map_err(|e| ParseError::InvalidField {
        field: "datetime",
        value: date.to_string(),
        reason: e.to_string(),
    })
}

/// 🗂️ Sort by key, convert, pad to `MAX_PROPERTIES`. A list is taken in its own order.
fn push_properties(
    values: &mut Vec<FieldValue>,
    properties: Option<&Value>,
    kind: &'static str,
    convert: impl Fn(&Value) -> FieldValue,
) -> Result<(), ParseError> {
    let mut converted: Vec<FieldValue> = match properties {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.into_iter().map(|(_, v)| convert(v)).collect()
        }
        Some(Value::Array(list)) => list.iter().map(&convert).collect(),
        Some(other) => {
            return Err(ParseError::Payload(format!(
                "{kind}Properties must be an object, got {other}"
            )));
        }
    };
    if converted.len() > MAX_PROPERTIES {
        return Err(ParseError::TooManyProperties {
            kind,
            count: converted.len(),
            max: MAX_PROPERTIES,
        });
    }
    converted.resize(MAX_PROPERTIES, FieldValue::Null);
    values.extend(converted);
    Ok(())
}

fn json_to_field(value: Option<&Value>) -> FieldValue {
    match value {
        None | Some(Value::Null) => FieldValue::Null,
        Some(Value::String(s)) => FieldValue::Str(s.clone()),
        Some(Value::Bool(b)) => FieldValue::Int(i64::from(*b)),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(FieldValue::Int)
            .or_else(|| n.as_f64().map(FieldValue::Float))
            .unwrap_or(FieldValue::Null),
        Some(other) => FieldValue::Str(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::test_support::settings_with_arity;
    use chrono::NaiveDate;

    fn parser() -> ApplicationParser {
        ApplicationParser::new(settings_with_arity("cm2_application", ApplicationParser::ARITY))
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("💀 hardcoded timestamp should be valid")
    }

    const CUSTOM: &str = r#"<42> cm2_application {"message":"order placed","context":{"custom":true,"type":3,"stringProperties":{"sku":"A-1","country":"LV"},"floatProperties":{"total":9.5,"discount":0.5}},"level":200,"level_name":"INFO","channel":"shop","datetime":{"date":"2019-05-01 12:00:00.000000","timezone_type":3,"timezone":"Europe/Riga"},"extra":[]}"#;

    const PLAIN: &str = r#"<42> cm2_application {"message":"cache warmed","context":{},"level":100,"channel":"app","datetime":{"date":"2019-05-01 12:00:00.123456","timezone":"UTC"}}"#;

    #[test]
    fn the_one_where_custom_context_fills_the_property_slots_in_key_order() -> Result<(), ParseError> {
        let record = parser().parse(&RawMessage::from(CUSTOM))?;
        assert_eq!(record.len(), ApplicationParser::ARITY);

        let mut expected = vec![
            FieldValue::Timestamp(noon()),
            FieldValue::Date(noon().date()),
            FieldValue::Str("shop".into()),
            FieldValue::Str("order placed".into()),
            FieldValue::Int(200),
            FieldValue::Int(3),
            FieldValue::Str("LV".into()),
            FieldValue::Str("A-1".into()),
        ];
        expected.extend(std::iter::repeat_n(FieldValue::Null, 4));
        expected.push(FieldValue::Float(0.5));
        expected.push(FieldValue::Float(9.5));
        expected.extend(std::iter::repeat_n(FieldValue::Null, 4));
        assert_eq!(record.values(), expected.as_slice());
        Ok(())
    }

    #[test]
    fn the_one_where_plain_messages_get_minus_one_and_a_dozen_nulls() -> Result<(), ParseError> {
        let record = parser().parse(&RawMessage::from(PLAIN))?;
        assert_eq!(record.len(), ApplicationParser::ARITY);
        // -- microseconds survive parsing, the ClickHouse text format drops them
        assert_eq!(record.get(0).map(ToString::to_string).as_deref(), Some("2019-05-01 12:00:00"));
        assert_eq!(record.get(5), Some(&FieldValue::Int(-1)));
        assert!(record.values()[6..].iter().all(|v| *v == FieldValue::Null));
        Ok(())
    }

    #[test]
    fn the_one_where_seven_properties_is_one_too_many() {
        let greedy = CUSTOM.replace(
            r#""sku":"A-1","country":"LV""#,
            r#""a":"1","b":"2","c":"3","d":"4","e":"5","f":"6","g":"7""#,
        );
        assert_eq!(
            parser().parse(&RawMessage::from(greedy.as_str())),
            Err(ParseError::TooManyProperties {
                kind: "string",
                count: 7,
                max: MAX_PROPERTIES
            })
        );
    }

    #[test]
    fn the_one_where_broken_json_is_a_payload_error() {
        for broken in ["<42> cm2_application", "<42> cm2_application {\"message\":", "<42> cm2_application {}"] {
            assert!(
                matches!(parser().parse(&RawMessage::from(broken)), Err(ParseError::Payload(_))),
                "input: {broken:?}"
            );
        }
    }

    #[test]
    fn the_one_where_the_date_is_not_a_date() {
        let line = PLAIN.replace("2019-05-01 12:00:00.123456", "soon");
        assert!(matches!(
            parser().parse(&RawMessage::from(line.as_str())),
            Err(ParseError::InvalidField { field: "datetime", .. })
        ));
    }
}
