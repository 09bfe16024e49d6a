//! 📡 nginx access log in the pipe-delimited `key=value` flavour.
//!
//! ```text
//! <190>web01 nginx: <time=2019-05-01T12:00:00+03:00|url=/api|status=200|referer=-|bytes=512|cache=HIT|method=GET|body=-|request_time=0.004>
//! ```
//!
//! Output columns, in order: time, uri, status, referer, bytes, cache,
//! method, body, request_time.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use super::nginx::parse_time_local;
use super::{ParseError, Parser, ParserSettings, parse_int};
use crate::common::{FieldValue, ParsedRecord, RawMessage};

const GRAMMAR: &str = "cm2_nginx";

const LINE_PATTERN: &str = r"^<(\d+)>(.*)nginx:\s<time=(.*)\|url=(.*)\|status=(\d+)\|referer=(.*)\|bytes=(\d+)\|cache=(.*)\|method=(GET|POST|PUT|HEAD|PATCH|DELETE|UPDATE|OPTIONS|TRACE)\|body=(.*)\|request_time=(.*)>$";

#[derive(Debug)]
pub(crate) struct Cm2NginxParser {
    settings: ParserSettings,
    line: Regex,
}

impl Cm2NginxParser {
    pub(crate) const ARITY: usize = 9;

    pub(crate) fn new(settings: ParserSettings) -> Result<Self> {
        let line = Regex::new(LINE_PATTERN).context("💀 cm2 nginx line pattern failed to compile")?;
        Ok(Self { settings, line })
    }
}

impl Parser for Cm2NginxParser {
    fn parse(&self, raw: &RawMessage) -> Result<ParsedRecord, ParseError> {
        let text = raw.text();
        let caps = self
            .line
            .captures(text.trim_end())
            .ok_or(ParseError::NoMatch { grammar: GRAMMAR })?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

        let request_time = group(11);
        let request_time = request_time
            .trim()
            .parse::<f64>()
            .map_err(|e| ParseError::InvalidField {
                field: "request_time",
                value: request_time.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ParsedRecord::new(vec![
            FieldValue::Timestamp(parse_time(group(3))?),
            FieldValue::Str(group(4).to_string()),
            FieldValue::Int(parse_int("status", group(5))?),
            FieldValue::Str(group(6).to_string()),
            FieldValue::Int(parse_int("bytes", group(7))?),
            FieldValue::Str(group(8).to_string()),
            FieldValue::Str(group(9).to_string()),
            FieldValue::Str(group(10).to_string()),
            FieldValue::Float(request_time),
        ]))
    }

    fn settings(&self) -> &ParserSettings {
        &self.settings
    }
}

/// ⏰ `$time_iso8601` first, `$time_local` as the fallback. Both land in UTC.
fn parse_time(value: &str) -> Result<NaiveDateTime, ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc).naive_utc()),
        Err(_) => parse_time_local(value),
    }
}
