//! 🕳️ Sinks: where buffered records finally leave the building.
//!
//! 🎭 This module is the casting agency for storage. Need ClickHouse over
//! HTTP? Got it. Need a sink that lives in RAM and can be told to fail on
//! cue for a test? Got that too. Everyone else in the crate talks to the
//! `Sink` trait and never learns which one answered.
//!
//! ## Knowledge Graph 🧠
//! - Used by: `registry` (one sink per output channel), `listener::ping_sink`,
//!   `writer` (the only caller of `batch_insert`)
//! - Pattern: trait → concrete sinks → `SinkBackend` enum, built from the
//!   per-output `SinkConfig`
//!
//! ⚠️ Sinks never retry. Retrying is the writer's job, and the writer has
//! a bounded attempt budget. A sink that retried on its own would quietly
//! multiply it. 🦆

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::ParsedRecord;

pub(crate) mod clickhouse;
pub(crate) mod in_mem;

pub use clickhouse::ClickHouseConfig;
pub(crate) use clickhouse::ClickHouseSink;
pub use in_mem::{InMemorySink, InsertedBatch};

/// 📥 The storage boundary every channel writes through.
///
/// # Contract 📜
/// - `table_exists` answers `Some(total_bytes)` for an existing table and
///   `None` when it does not exist yet. Unknown sizes count as `Some(0)`.
/// - `execute_ddl` runs one statement verbatim.
/// - `batch_insert` writes every record in one request, columns named by
///   `fields` in record order. All or nothing from the caller's view.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send + Sync {
    async fn table_exists(&self, database: &str, table: &str) -> Result<Option<u64>>;

    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// 📦 One insert per call. No retries here, see the module docs.
    async fn batch_insert(
        &self,
        database: &str,
        table: &str,
        fields: &[&str],
        records: &[ParsedRecord],
    ) -> Result<()>;
}

/// 🎛️ Which sink an output writes to. ClickHouse unless told otherwise.
///
/// ```toml
/// [outputs.sink.ClickHouse]
/// host = "127.0.0.1"
/// port = 8123
/// ```
/// or `sink = "InMemory"` for a dry run that keeps everything in RAM.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    ClickHouse(ClickHouseConfig),
    InMemory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::ClickHouse(ClickHouseConfig::default())
    }
}

/// 🎭 The many faces of a Sink, dispatched statically.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    ClickHouse(ClickHouseSink),
    InMemory(InMemorySink),
}

impl SinkBackend {
    /// 🏭 Factory: sink config in, ready sink out. Builds the HTTP client but
    /// does not talk to the server yet; that is `listener::ping_sink`'s job.
    pub(crate) fn from_config(config: &SinkConfig) -> Result<Self> {
        Ok(match config {
            SinkConfig::ClickHouse(cfg) => SinkBackend::ClickHouse(ClickHouseSink::new(cfg.clone())?),
            SinkConfig::InMemory => SinkBackend::InMemory(InMemorySink::new()),
        })
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn table_exists(&self, database: &str, table: &str) -> Result<Option<u64>> {
        match self {
            SinkBackend::ClickHouse(sink) => sink.table_exists(database, table).await,
            SinkBackend::InMemory(sink) => sink.table_exists(database, table).await,
        }
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        match self {
            SinkBackend::ClickHouse(sink) => sink.execute_ddl(statement).await,
            SinkBackend::InMemory(sink) => sink.execute_ddl(statement).await,
        }
    }

    async fn batch_insert(
        &self,
        database: &str,
        table: &str,
        fields: &[&str],
        records: &[ParsedRecord],
    ) -> Result<()> {
        match self {
            SinkBackend::ClickHouse(sink) => sink.batch_insert(database, table, fields, records).await,
            SinkBackend::InMemory(sink) => sink.batch_insert(database, table, fields, records).await,
        }
    }
}
