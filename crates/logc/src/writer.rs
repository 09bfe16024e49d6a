//! 🔄 Flush with retry: every drained channel batch goes to its sink, and if
//! anything fails the whole round starts over from the first channel.
//!
//! ⚠️ Starting over means a channel that succeeded before the failure is
//! inserted again on the next attempt. Duplicates over loss; the tables are
//! analytical, not a ledger.

use std::time::Duration;

use tracing::{debug, warn};

use crate::app_config::WriterConfig;
use crate::buffer::ChannelBatch;
use crate::registry::Registry;
use crate::sinks::Sink;

/// 💀 Every attempt failed. The listener treats this as fatal.
#[derive(Debug, thiserror::Error)]
#[error("writing channel '{channel}' failed {attempts} times in a row, last error: {error}")]
pub struct WriteExhausted {
    pub channel: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Writer {
    max_attempts: u32,
    backoff: Duration,
}

impl Writer {
    pub(crate) fn new(config: &WriterConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }

    /// 📦 Insert every batch, registry order, up to `max_attempts` rounds
    /// with a fixed `backoff` in between. No batches, no I/O.
    pub(crate) async fn write(&self, registry: &Registry, batches: &[ChannelBatch]) -> Result<(), WriteExhausted> {
        if batches.is_empty() {
            return Ok(());
        }

        let mut attempt = 1;
        loop {
            match self.write_once(registry, batches).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!("✅ flush went through on attempt {attempt}");
                    }
                    return Ok(());
                }
                Err((channel, error)) if attempt >= self.max_attempts => {
                    return Err(WriteExhausted {
                        channel,
                        attempts: attempt,
                        error: format!("{error:#}"),
                    });
                }
                Err((channel, error)) => {
                    warn!(
                        "⚠️ attempt {attempt}/{} to write channel '{channel}' failed: {error:#}. Retrying in {:?}",
                        self.max_attempts, self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// 🎯 One round over all batches. Stops at the first failing channel.
    async fn write_once(&self, registry: &Registry, batches: &[ChannelBatch]) -> Result<(), (String, anyhow::Error)> {
        for batch in batches {
            let Some(channel) = registry.get(&batch.name) else {
                warn!("⚠️ dropping {} records for unknown channel '{}'", batch.records.len(), batch.name);
                continue;
            };
            let fields = channel.fields();
            channel
                .sink
                .batch_insert(&channel.database, &channel.table, &fields, &batch.records)
                .await
                .map_err(|e| (batch.name.clone(), e))?;
        }
        Ok(())
    }
}
