//! 🔧 App Configuration: the TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. `LOGC_*` environment variables form the base layer,
//! an optional TOML file is merged on top. Nested keys use a double
//! underscore: `LOGC_BUFFER__MAX_FLUSH_PERIOD=5`.
//!
//! Outputs are a TOML array of tables on purpose. An array keeps the order
//! they were written in, and that order is the routing order, the flush
//! order and the order of every status line. A map would sort them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::parsers::ParserKind;
use crate::schema::Schema;
use crate::sinks::SinkConfig;

/// 📏 Smallest receive buffer we accept. Anything tighter truncates real access log lines.
pub const MIN_DATAGRAM_SIZE: usize = 10 * 1024;

/// 📦 Everything the daemon needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// 📡 Listen address. Every interface unless told otherwise.
    pub address: IpAddr,
    /// 📡 UDP port. 914, the one the log shippers already point at.
    pub port: u16,
    pub verbosity: Verbosity,
    /// 📏 Receive buffer size. Longer datagrams are truncated by the OS.
    pub max_datagram_size: usize,
    /// 💤 How long the loop naps when the socket has nothing for it.
    pub idle_sleep_ms: u64,
    pub buffer: BufferConfig,
    pub writer: WriterConfig,
    pub outputs: Vec<OutputConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 914,
            verbosity: Verbosity::default(),
            max_datagram_size: 65_535,
            idle_sleep_ms: 1,
            buffer: BufferConfig::default(),
            writer: WriterConfig::default(),
            outputs: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    /// 🔒 Reject settings that would parse fine and then misbehave at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.outputs.is_empty() {
            bail!("💀 No outputs configured. A collector with nowhere to put logs is just a very slow /dev/null.");
        }
        if self.max_datagram_size < MIN_DATAGRAM_SIZE {
            bail!(
                "💀 max_datagram_size is {}, it must be at least {MIN_DATAGRAM_SIZE} bytes",
                self.max_datagram_size
            );
        }
        if self.buffer.max_flush_size == 0 {
            bail!("💀 buffer.max_flush_size must be at least 1");
        }
        if self.buffer.max_flush_period == 0 {
            bail!("💀 buffer.max_flush_period must be at least 1 second, zero would flush on every tick");
        }
        if self.writer.max_attempts == 0 {
            bail!("💀 writer.max_attempts must be at least 1, zero attempts is a very fast way to lose logs");
        }
        Ok(())
    }
}

/// 🔊 How chatty the daemon is. `RUST_LOG`, when set, beats this.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Startup, flush summaries and errors.
    #[default]
    None,
    /// All of the above plus one line per datagram.
    Debug,
}

impl Verbosity {
    /// 🎛️ The `EnvFilter` directive this verbosity maps to.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::None => "info",
            Verbosity::Debug => "info,logc=debug",
        }
    }
}

/// 🪣 When the buffers get flushed.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    /// 📏 Flush once this many channels hold at least one record.
    pub max_flush_size: usize,
    /// ⏰ Flush at least this often, in seconds, even when nothing arrived.
    pub max_flush_period: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_flush_size: 10_000,
            max_flush_period: 10,
        }
    }
}

impl BufferConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.max_flush_period)
    }
}

/// 🔄 How stubborn a flush is before it gives up.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WriterConfig {
    pub max_attempts: u32,
    /// ⏳ Fixed pause between attempts, seconds.
    pub backoff_secs: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 2,
        }
    }
}

impl WriterConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// 🎯 One output channel: routing name, grammar, destination table and columns.
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// 🔑 Routing key. A datagram containing this text goes to this channel.
    pub name: String,
    pub parser: ParserKind,
    pub database: String,
    pub table: String,
    /// 🏗️ ENGINE clause used when the table has to be created. Without it
    /// the table must already exist.
    #[serde(default)]
    pub engine: Option<String>,
    pub schema: Schema,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// 🚀 Load the config: env vars, then the TOML file on top when one is given.
///
/// 📐 `None` means env vars only. No file, no assumptions, no surprise
/// fallback to some default path; the CLI decides that.
///
/// 💀 Returns an error if the config is unparseable or fails `validate`.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LOGC_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LOGC_*).",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LOGC_*). \
                 No file was provided, this one's all on the environment."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}
