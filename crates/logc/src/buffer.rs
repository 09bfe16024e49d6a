//! 🪣 Per-channel buffers between a parse and a flush.
//!
//! Owned by the listener loop and nobody else, so no locks. Slots are laid
//! out in registry order once and never reshuffled, so a channel's registry
//! index is its slot. `drain` hands back the non-empty ones in that order.

use crate::common::ParsedRecord;
use crate::registry::Registry;

#[derive(Debug)]
struct ChannelBuffer {
    name: String,
    records: Vec<ParsedRecord>,
    bytes: usize,
}

/// 📦 Everything one channel accumulated since the last flush.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChannelBatch {
    pub(crate) name: String,
    pub(crate) records: Vec<ParsedRecord>,
    /// 📏 Raw datagram bytes behind these records.
    pub(crate) bytes: usize,
}

#[derive(Debug)]
pub(crate) struct BufferSet {
    buffers: Vec<ChannelBuffer>,
}

impl BufferSet {
    pub(crate) fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buffers: names
                .into_iter()
                .map(|name| ChannelBuffer {
                    name: name.into(),
                    records: Vec::new(),
                    bytes: 0,
                })
                .collect(),
        }
    }

    pub(crate) fn for_registry(registry: &Registry) -> Self {
        Self::new(registry.channels().iter().map(|c| c.name().to_string()))
    }

    /// ➕ `index` is the channel's position in the registry. Returns `false`
    /// when no such slot exists; the record is dropped.
    pub(crate) fn append(&mut self, index: usize, record: ParsedRecord, bytes: usize) -> bool {
        match self.buffers.get_mut(index) {
            Some(buffer) => {
                buffer.records.push(record);
                buffer.bytes += bytes;
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffers.iter().all(|b| b.records.is_empty())
    }

    /// 🔢 Channels holding at least one record. This, not the record count,
    /// is what the size trigger compares against `max_flush_size`.
    pub(crate) fn channel_count(&self) -> usize {
        self.buffers.iter().filter(|b| !b.records.is_empty()).count()
    }

    pub(crate) fn total_bytes(&self) -> usize {
        self.buffers.iter().map(|b| b.bytes).sum()
    }

    pub(crate) fn total_records(&self) -> usize {
        self.buffers.iter().map(|b| b.records.len()).sum()
    }

    /// 🚰 Take every non-empty buffer, leave empty ones behind. Registry order.
    pub(crate) fn drain(&mut self) -> Vec<ChannelBatch> {
        self.buffers
            .iter_mut()
            .filter(|b| !b.records.is_empty())
            .map(|b| ChannelBatch {
                name: b.name.clone(),
                records: std::mem::take(&mut b.records),
                bytes: std::mem::take(&mut b.bytes),
            })
            .collect()
    }
}
