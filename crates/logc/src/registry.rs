//! 📇 The registry: every configured output channel, built once at startup.
//!
//! Registry order is configuration order, and it is load-bearing: the
//! dispatcher routes in it, the buffer set drains in it, the writer inserts
//! in it. Nothing in here changes after `from_config` returns.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};

use crate::app_config::OutputConfig;
use crate::parsers::{Parser, ParserBackend, ParserSettings};
use crate::sinks::SinkBackend;

/// 🎯 One output channel: a routing name, the parser that owns it, the table
/// it ends up in and the sink that gets it there.
#[derive(Debug)]
pub(crate) struct OutputChannel {
    pub(crate) parser: ParserBackend,
    pub(crate) database: String,
    pub(crate) table: String,
    pub(crate) sink: SinkBackend,
}

impl OutputChannel {
    /// 🏗️ Build the parser from config and pair it with an already built sink.
    pub(crate) fn new(config: &OutputConfig, sink: SinkBackend) -> Result<Self> {
        if config.name.is_empty() {
            bail!("💀 An output has an empty name. An empty routing key would match every datagram.");
        }
        if config.database.trim().is_empty() || config.table.trim().is_empty() {
            bail!("💀 Output '{}' needs both a database and a table", config.name);
        }
        let settings = ParserSettings {
            name: config.name.clone(),
            schema: config.schema.clone(),
            engine: config.engine.clone(),
        };
        let parser = ParserBackend::build(config.parser, settings)?;
        Ok(Self {
            parser,
            database: config.database.clone(),
            table: config.table.clone(),
            sink,
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.parser.channel_name()
    }

    pub(crate) fn fields(&self) -> Vec<&str> {
        self.parser.schema_fields()
    }
}

/// 📇 All channels, in configuration order.
#[derive(Debug)]
pub(crate) struct Registry {
    channels: Vec<OutputChannel>,
}

impl Registry {
    /// 🔒 Channel names are unique. Two channels with the same name would
    /// share a buffer slot and one would silently eat the other's records.
    pub(crate) fn new(channels: Vec<OutputChannel>) -> Result<Self> {
        let mut seen = HashSet::new();
        for channel in &channels {
            if !seen.insert(channel.name()) {
                bail!("💀 Output name '{}' is configured twice", channel.name());
            }
        }
        Ok(Self { channels })
    }

    /// 🏭 One channel per configured output, each with its own sink.
    pub(crate) fn from_config(outputs: &[OutputConfig]) -> Result<Self> {
        let channels = outputs
            .iter()
            .map(|output| {
                let sink = SinkBackend::from_config(&output.sink)
                    .with_context(|| format!("💀 Could not build the sink for output '{}'", output.name))?;
                OutputChannel::new(output, sink)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(channels)
    }

    pub(crate) fn channels(&self) -> &[OutputChannel] {
        &self.channels
    }

    pub(crate) fn get(&self, name: &str) -> Option<&OutputChannel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}
