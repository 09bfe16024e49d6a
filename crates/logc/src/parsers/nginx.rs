//! 📡 nginx access log, combined-ish format, delivered over syslog.
//!
//! ```text
//! <190>Oct 10 13:55:36 web01 nginx: 10.0.0.7 - - [10/Oct/2000:13:55:36 -0700] "GET /a.gif HTTP/1.1" 200 2326 "http://ref/" "Mozilla/5.0"
//! ```
//!
//! Output columns, in order: ip, time, date, uri, method, protocol, status,
//! bytes, referer, user_agent. The time is normalized to UTC.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use super::{ParseError, Parser, ParserSettings, parse_int};
use crate::common::{FieldValue, ParsedRecord, RawMessage};

const GRAMMAR: &str = "nginx";

/// 🧩 `<pri>` header, anything up to `nginx:`, then the access log line.
/// The `- -` ident/user pair of the combined format is optional.
const LINE_PATTERN: &str = r#"^<(\d+)>(.*?)nginx:\s(\S+)(?:\s\S+\s\S+)?\s\[([^\]]+)\]\s"(GET|POST|PUT|HEAD|PATCH|DELETE|UPDATE|OPTIONS|TRACE)\s(\S+)\s([^"]+)"\s(\d+)\s(\d+)\s"(.*?)"\s"(.*?)"$"#;

/// ⏰ nginx `$time_local`: `10/Oct/2000:13:55:36 -0700`
pub(crate) const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

#[derive(Debug)]
pub(crate) struct NginxParser {
    settings: ParserSettings,
    line: Regex,
}

impl NginxParser {
    pub(crate) const ARITY: usize = 10;

    pub(crate) fn new(settings: ParserSettings) -> Result<Self> {
        let line = Regex::new(LINE_PATTERN).context("💀 nginx line pattern failed to compile")?;
        Ok(Self { settings, line })
    }
}

impl Parser for NginxParser {
    fn parse(&self, raw: &RawMessage) -> Result<ParsedRecord, ParseError> {
        let text = raw.text();
        let caps = self
            .line
            .captures(text.trim_end())
            .ok_or(ParseError::NoMatch { grammar: GRAMMAR })?;
        // -- every group is mandatory, a match means all 11 are present
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

        let time = parse_time_local(group(4))?;
        let ip = group(3)
            .parse::<Ipv4Addr>()
            .map(|addr| i64::from(u32::from(addr)))
            .unwrap_or(0);

        Ok(ParsedRecord::new(vec![
            FieldValue::Int(ip),
            FieldValue::Timestamp(time),
            FieldValue::Date(time.date()),
            FieldValue::Str(group(6).to_string()),
            FieldValue::Str(group(5).to_string()),
            FieldValue::Str(group(7).to_string()),
            FieldValue::Int(parse_int("status", group(8))?),
            FieldValue::Int(parse_int("bytes", group(9))?),
            FieldValue::Str(group(10).to_string()),
            FieldValue::Str(group(11).to_string()),
        ]))
    }

    fn settings(&self) -> &ParserSettings {
        &self.settings
    }
}

/// ⏰ `$time_local` → naive UTC timestamp.
pub(crate) fn parse_time_local(value: &str) -> Result<NaiveDateTime, ParseError> {
    DateTime::parse_from_str(value, TIME_LOCAL_FORMAT)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .map_err(|e| ParseError::InvalidField {
            field: "time",
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::test_support::settings_with_arity;
    use chrono::NaiveDate;

    const THE_CLASSIC: &str = r#"<190>Oct 10 13:55:36 web01 nginx: 10.0.0.7 - - [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.1" 200 2326 "http://www.example.com/start.html" "Mozilla/4.08 [en] (Win98; I ;Nav)""#;

    fn parser() -> NginxParser {
        NginxParser::new(settings_with_arity("nginx", NginxParser::ARITY))
            .expect("💀 parser should build")
    }

    #[test]
    fn the_one_where_a_well_formed_access_line_becomes_typed_columns() -> Result<()> {
        let record = parser().parse(&RawMessage::from(THE_CLASSIC))?;

        let expected_time = NaiveDate::from_ymd_opt(2000, 10, 10)
            .and_then(|d| d.and_hms_opt(20, 55, 36))
            .expect("💀 hardcoded timestamp should be valid");
        assert_eq!(record.len(), NginxParser::ARITY);
        assert_eq!(record.values(), &[
            FieldValue::Int(i64::from(u32::from(Ipv4Addr::new(10, 0, 0, 7)))),
            FieldValue::Timestamp(expected_time),
            FieldValue::Date(expected_time.date()),
            FieldValue::Str("/apache_pb.gif".into()),
            FieldValue::Str("GET".into()),
            FieldValue::Str("HTTP/1.1".into()),
            FieldValue::Int(200),
            FieldValue::Int(2326),
            FieldValue::Str("http://www.example.com/start.html".into()),
            FieldValue::Str("Mozilla/4.08 [en] (Win98; I ;Nav)".into()),
        ]);
        Ok(())
    }

    #[test]
    fn the_one_where_the_trailing_newline_is_forgiven() -> Result<()> {
        let with_newline = format!("{THE_CLASSIC}\n");
        let record = parser().parse(&RawMessage::from(with_newline.as_str()))?;
        assert_eq!(record.get(6), Some(&FieldValue::Int(200)));
        Ok(())
    }

    #[test]
    fn the_one_where_ipv6_clients_get_a_zero_ip() -> Result<()> {
        let line = THE_CLASSIC.replace("10.0.0.7", "2001:db8::1");
        let record = parser().parse(&RawMessage::from(line.as_str()))?;
        assert_eq!(record.get(0), Some(&FieldValue::Int(0)));
        Ok(())
    }

    #[test]
    fn the_one_where_garbage_is_a_no_match_not_a_panic() {
        let p = parser();
        for garbage in ["", "nginx", "<13>nginx: hello", "\u{0}\u{1}nginx: [", THE_CLASSIC.split_at(60).0] {
            assert_eq!(
                p.parse(&RawMessage::from(garbage)),
                Err(ParseError::NoMatch { grammar: GRAMMAR }),
                "input: {garbage:?}"
            );
        }
    }

    #[test]
    fn the_one_where_a_nonsense_date_is_an_invalid_field() {
        let line = THE_CLASSIC.replace("10/Oct/2000:13:55:36 -0700", "yesterday-ish");
        assert!(matches!(
            parser().parse(&RawMessage::from(line.as_str())),
            Err(ParseError::InvalidField { field: "time", .. })
        ));
    }
}
