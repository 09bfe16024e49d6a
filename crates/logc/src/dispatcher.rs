//! 🧭 Routing: which channels does a datagram belong to?
//!
//! Every channel whose name shows up anywhere in the datagram gets it, in
//! registry order. Usually that is one channel; sometimes a log line
//! mentions two names and both parsers get a go. Each parser judges the
//! datagram on its own, and a rejection in one channel never touches
//! another. Every rejection is a warning, whatever the verbosity: a line
//! that names a channel and still fails its grammar is worth a look.

use memchr::memmem::Finder;
use tracing::warn;

use crate::buffer::BufferSet;
use crate::common::RawMessage;
use crate::parsers::Parser;
use crate::registry::{OutputChannel, Registry};

/// 📋 What happened to one datagram.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub matched: Vec<String>,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

impl DispatchOutcome {
    pub fn is_unrouted(&self) -> bool {
        self.matched.is_empty()
    }
}

/// 🧭 Owns the registry and one substring finder per channel name.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    registry: Registry,
    finders: Vec<Finder<'static>>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Registry) -> Self {
        let finders = registry
            .channels()
            .iter()
            .map(|c| Finder::new(c.name().as_bytes()).into_owned())
            .collect();
        Self { registry, finders }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 🎯 Every channel whose name is a substring of the datagram, registry
    /// order, each with its registry index (which is also its buffer slot).
    pub(crate) fn route(&self, raw: &RawMessage) -> Vec<(usize, &OutputChannel)> {
        self.registry
            .channels()
            .iter()
            .zip(&self.finders)
            .enumerate()
            .filter(|(_, (_, finder))| finder.find(raw.as_bytes()).is_some())
            .map(|(index, (channel, _))| (index, channel))
            .collect()
    }

    /// 📥 Route, parse once per matched channel, buffer what was accepted.
    pub(crate) fn dispatch(&self, raw: &RawMessage, buffers: &mut BufferSet) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for (index, channel) in self.route(raw) {
            let name = channel.name();
            outcome.matched.push(name.to_string());
            match channel.parser.parse(raw) {
                Ok(record) => {
                    buffers.append(index, record, raw.len());
                    outcome.accepted.push(name.to_string());
                }
                Err(err) => {
                    warn!("🚫 channel '{name}' rejected a datagram: {err}");
                    outcome.rejected.push(name.to_string());
                }
            }
        }
        outcome
    }
}
