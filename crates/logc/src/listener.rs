//! 📡 The listener: one socket, one loop, one owner of every buffer.
//!
//! 🎬 Each tick: try to read one datagram without blocking, hand it to the
//! dispatcher, then ask the scheduler whether it is time to flush. If it is,
//! the flush happens right there, inline. While ClickHouse is slow or the
//! writer is backing off, nothing is read; the kernel's socket buffer is the
//! only queue, and when that overflows the datagrams are gone. A sink outage
//! pauses ingestion instead of growing memory without bound.
//!
//! ## Knowledge Graph 🧠
//! - Owns: `Dispatcher` (and through it the `Registry`), `BufferSet`,
//!   `FlushScheduler`, `Writer`
//! - Stops on: the cancellation token (SIGINT/SIGTERM in the CLI), after
//!   one last flush of whatever is still buffered
//! - Dies on: `WriteExhausted`, surfaced as `Fatal::WriteExhausted`
//!
//! 🦆 The duck asked why there is no channel between receive and flush.
//! The duck was told that is the point.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app_config::AppConfig;
use crate::buffer::BufferSet;
use crate::common::RawMessage;
use crate::dispatcher::Dispatcher;
use crate::fatal::Fatal;
use crate::parsers::Parser;
use crate::registry::{OutputChannel, Registry};
use crate::scheduler::{FlushScheduler, FlushTrigger};
use crate::sinks::Sink;
use crate::status::{self, FlushReport};
use crate::writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerState {
    Running,
    Terminated,
}

#[derive(Debug)]
pub(crate) struct Listener {
    socket: UdpSocket,
    dispatcher: Dispatcher,
    buffers: BufferSet,
    scheduler: FlushScheduler,
    writer: Writer,
    recv_buf: Vec<u8>,
    idle_sleep: Duration,
    state: ListenerState,
}

impl Listener {
    /// 🔌 Bind the UDP socket. Nothing is read until `run`.
    pub(crate) async fn bind(config: &AppConfig, registry: Registry) -> Result<Self> {
        let addr = config.listen_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("💀 Could not bind UDP {addr}. Is another collector already running, or is the port privileged?"))
            .context(Fatal::Bind)?;
        info!("📡 listening on udp://{}", socket.local_addr().unwrap_or(addr));

        let buffers = BufferSet::for_registry(&registry);
        Ok(Self {
            socket,
            dispatcher: Dispatcher::new(registry),
            buffers,
            scheduler: FlushScheduler::new(&config.buffer, Instant::now()),
            writer: Writer::new(&config.writer),
            recv_buf: vec![0; config.max_datagram_size],
            idle_sleep: config.idle_sleep(),
            state: ListenerState::Terminated,
        })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("💀 The socket forgot its own address")
    }

    pub(crate) fn state(&self) -> ListenerState {
        self.state
    }

    /// 🏓 Make sure every channel's table exists before the first datagram.
    ///
    /// Missing tables are created from the channel's schema and engine, then
    /// looked up again to prove it worked. Any failure is fatal: better to
    /// refuse to start than to buffer records that can never be written.
    pub(crate) async fn ping_sink(&self) -> Result<()> {
        for channel in self.dispatcher.registry().channels() {
            ensure_table(channel)
                .await
                .context(Fatal::SinkStartup)?;
        }
        Ok(())
    }

    /// 🔁 The loop. Returns `Ok` after a clean shutdown, `Err` on a fatal flush.
    pub(crate) async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.state = ListenerState::Running;
        info!("🚀 collecting for {} channels", self.dispatcher.registry().len());

        let mut outcome = Ok(());
        while !cancel.is_cancelled() {
            if let Err(err) = self.tick().await {
                outcome = Err(err);
                break;
            }
        }

        if outcome.is_ok() && !self.buffers.is_empty() {
            info!("🛑 shutting down, flushing {} buffered records", self.buffers.total_records());
            outcome = self.flush(FlushTrigger::Shutdown).await.map(|_| ());
        }
        self.state = ListenerState::Terminated;
        outcome
    }

    /// ⏱️ One receive attempt, then one scheduler check.
    async fn tick(&mut self) -> Result<()> {
        match self.socket.try_recv_from(&mut self.recv_buf) {
            Ok((len, source)) => {
                let raw = RawMessage::new(self.recv_buf[..len].to_vec(), Some(source));
                self.receive(&raw);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tokio::time::sleep(self.idle_sleep).await;
            }
            Err(e) => warn!("⚠️ receive failed, treating it as no data: {e}"),
        }

        if let Some(trigger) = self.scheduler.evaluate(&self.buffers, Instant::now()) {
            self.flush(trigger).await?;
        }
        Ok(())
    }

    fn receive(&mut self, raw: &RawMessage) {
        let outcome = self.dispatcher.dispatch(raw, &mut self.buffers);
        let source = raw
            .source()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        if outcome.is_unrouted() {
            debug!("📥 {} bytes from {source}: no channel matched", raw.len());
        }
        for name in &outcome.accepted {
            debug!("📥 {} bytes from {source} buffered for channel '{name}'", raw.len());
        }
    }

    /// 🚰 Drain, write with retry, report. The buffers are empty afterwards
    /// whatever the outcome; a failed flush is fatal anyway.
    async fn flush(&mut self, trigger: FlushTrigger) -> Result<FlushReport> {
        debug!(
            "🚰 {trigger} flush starting, the previous one took {:?}",
            self.scheduler.last_flush_duration()
        );
        let started = Instant::now();
        let records = self.buffers.total_records();
        let channels = self.buffers.channel_count();
        let bytes = self.buffers.total_bytes();
        let batches = self.buffers.drain();

        self.writer
            .write(self.dispatcher.registry(), &batches)
            .await
            .map_err(anyhow::Error::new)
            .context(Fatal::WriteExhausted)?;

        let finished = Instant::now();
        let duration = finished.duration_since(started);
        self.scheduler.complete(finished, duration);

        let report = FlushReport {
            trigger,
            records,
            channels,
            bytes,
            duration,
            resident_memory: status::resident_memory(),
        };
        info!("📊 {report}");
        Ok(report)
    }
}

async fn ensure_table(channel: &OutputChannel) -> Result<()> {
    let (name, database, table) = (channel.name(), channel.database.as_str(), channel.table.as_str());
    let existing = channel
        .sink
        .table_exists(database, table)
        .await
        .with_context(|| format!("💀 Channel '{name}' could not reach its sink"))?;
    if existing.is_none() {
        info!("🏗️ table {database}.{table} for channel '{name}' does not exist, creating it");
        let ddl = channel
            .parser
            .table_ddl(database, table)
            .with_context(|| format!("💀 Channel '{name}' has no table and cannot describe one"))?;
        channel
            .sink
            .execute_ddl(&ddl)
            .await
            .with_context(|| format!("💀 Creating {database}.{table} for channel '{name}' failed"))?;
    }
    let bytes = channel
        .sink
        .table_exists(database, table)
        .await?
        .ok_or_else(|| anyhow!("💀 Table {database}.{table} is still missing after CREATE TABLE"))?;
    info!("✅ channel '{name}' writes to {database}.{table} ({bytes} bytes on disk)");
    Ok(())
}
