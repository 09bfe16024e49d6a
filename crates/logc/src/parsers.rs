//! 🔄 Parsers: where a raw datagram either becomes a typed record or gets told "no".
//!
//! 🎬 Every log source speaks its own dialect. nginx mumbles in regex-shaped
//! lines, the application layer shouts JSON. They all share one lifecycle
//! though: parse, coerce into typed fields, land in exactly one channel
//! buffer. So one trait, a closed set of implementations, and an enum that
//! dispatches between them without a vtable in sight.
//!
//! ## Knowledge Graph 🧠
//! - Depends on: `common::{RawMessage, ParsedRecord}`, `schema::Schema`
//! - Used by: `registry` (one parser per output channel), `dispatcher`
//! - Pattern: trait → concrete parsers → `ParserBackend` enum, selected at
//!   startup by the `parser = "..."` key of an output (`ParserKind`)
//!
//! ⚠️ A parser never panics on garbage input. Garbage is a `ParseError`,
//! the caller logs it, and the loop moves on. 🦆

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::common::{ParsedRecord, RawMessage};
use crate::schema::Schema;

pub(crate) mod application;
pub(crate) mod cm2_nginx;
pub(crate) mod nginx;

pub(crate) use application::ApplicationParser;
pub(crate) use cm2_nginx::Cm2NginxParser;
pub(crate) use nginx::NginxParser;

/// 🚫 Why a parser said no. Always recoverable, always per-message.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("message does not match the {grammar} grammar")]
    NoMatch { grammar: &'static str },

    #[error("field '{field}' has unusable value '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("payload is not a usable JSON document: {0}")]
    Payload(String),

    #[error("too many {kind} properties: {count} (at most {max})")]
    TooManyProperties {
        kind: &'static str,
        count: usize,
        max: usize,
    },
}

/// 🧾 What every parser is constructed from: the output's name, its column
/// list and the engine spec used when the table has to be created.
#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub name: String,
    pub schema: Schema,
    pub engine: Option<String>,
}

/// 📥 The capability contract shared by every log grammar.
///
/// # Contract 📜
/// - `parse` is deterministic and pure with respect to its input.
/// - Every accepted record has exactly `schema_fields().len()` values.
/// - `channel_name` is the routing key: the dispatcher looks for it as a
///   substring of the raw datagram.
/// - `table_ddl` is byte-identical for identical inputs.
pub trait Parser: std::fmt::Debug + Send + Sync {
    /// 🔄 Turn one raw datagram into one typed record, or explain why not.
    fn parse(&self, raw: &RawMessage) -> Result<ParsedRecord, ParseError>;

    fn settings(&self) -> &ParserSettings;

    fn channel_name(&self) -> &str {
        &self.settings().name
    }

    fn schema_fields(&self) -> Vec<&str> {
        self.settings().schema.field_names()
    }

    /// 🏗️ Sink-native `CREATE TABLE` for this channel's schema and engine.
    fn table_ddl(&self, database: &str, table: &str) -> Result<String> {
        let settings = self.settings();
        settings
            .schema
            .create_table_ddl(database, table, settings.engine.as_deref())
    }
}

/// 🎛️ The configuration key that picks a grammar. Closed set, resolved once at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Nginx,
    Cm2Nginx,
    Application,
}

impl ParserKind {
    /// 📏 How many values this grammar emits per record. The configured
    /// schema has to name every one of them.
    pub fn arity(self) -> usize {
        match self {
            ParserKind::Nginx => NginxParser::ARITY,
            ParserKind::Cm2Nginx => Cm2NginxParser::ARITY,
            ParserKind::Application => ApplicationParser::ARITY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParserKind::Nginx => "nginx",
            ParserKind::Cm2Nginx => "cm2_nginx",
            ParserKind::Application => "application",
        }
    }
}

/// 🎭 The many faces of a Parser, dispatched statically.
#[derive(Debug)]
pub(crate) enum ParserBackend {
    Nginx(NginxParser),
    Cm2Nginx(Cm2NginxParser),
    Application(ApplicationParser),
}

impl ParserBackend {
    /// 🏭 Factory: configuration key in, ready parser out.
    ///
    /// Bails when the configured schema does not have exactly as many columns
    /// as the grammar produces values. Better a refusal at startup than a
    /// misaligned insert at 3am.
    pub(crate) fn build(kind: ParserKind, settings: ParserSettings) -> Result<Self> {
        if settings.schema.len() != kind.arity() {
            bail!(
                "💀 Output '{}' uses the {} parser which produces {} fields, but its schema declares {}",
                settings.name,
                kind.as_str(),
                kind.arity(),
                settings.schema.len()
            );
        }
        Ok(match kind {
            ParserKind::Nginx => ParserBackend::Nginx(NginxParser::new(settings)?),
            ParserKind::Cm2Nginx => ParserBackend::Cm2Nginx(Cm2NginxParser::new(settings)?),
            ParserKind::Application => ParserBackend::Application(ApplicationParser::new(settings)),
        })
    }
}

impl Parser for ParserBackend {
    fn parse(&self, raw: &RawMessage) -> Result<ParsedRecord, ParseError> {
        match self {
            ParserBackend::Nginx(p) => p.parse(raw),
            ParserBackend::Cm2Nginx(p) => p.parse(raw),
            ParserBackend::Application(p) => p.parse(raw),
        }
    }

    fn settings(&self) -> &ParserSettings {
        match self {
            ParserBackend::Nginx(p) => p.settings(),
            ParserBackend::Cm2Nginx(p) => p.settings(),
            ParserBackend::Application(p) => p.settings(),
        }
    }
}

/// 🔢 Shared integer coercion with a useful rejection.
pub(crate) fn parse_int(field: &'static str, value: &str) -> Result<i64, ParseError> {
    value.parse::<i64>().map_err(|e| ParseError::InvalidField {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::schema::FieldSpec;

    /// 🧪 Settings with `arity` throwaway columns, for tests that only care about values.
    pub(crate) fn settings_with_arity(name: &str, arity: usize) -> ParserSettings {
        ParserSettings {
            name: name.to_string(),
            schema: Schema::new(
                (0..arity)
                    .map(|i| FieldSpec::new(format!("f{i}"), "String"))
                    .collect(),
            ),
            engine: Some("Log".to_string()),
        }
    }
}
