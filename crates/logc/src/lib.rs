//! 📡 logc: a UDP log collector that files every datagram into ClickHouse.
//!
//! 🎬 Datagrams arrive on one UDP socket. Each is matched against the
//! configured output channels by name, parsed by the channel's grammar into
//! a typed row, buffered, and flushed in batches when enough channels have
//! something to say or when the clock runs out. Flushes retry a bounded
//! number of times; after that the daemon gives up loudly.
//!
//! The CLI is a thin wrapper: it builds an [`app_config::AppConfig`], hands
//! it to [`run`] together with a cancellation token, and turns whatever
//! comes back into an exit code via [`fatal::Fatal`]. 🦆

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod app_config;
pub mod common;
pub mod fatal;
pub mod parsers;
pub mod scheduler;
pub mod schema;
pub mod sinks;
pub mod status;
pub mod writer;

mod buffer;
mod dispatcher;
mod listener;
mod registry;

pub use dispatcher::DispatchOutcome;

use crate::app_config::AppConfig;
use crate::fatal::Fatal;
use crate::listener::Listener;
use crate::registry::Registry;

/// 🚀 Build the channels, bind the socket, check the tables, then collect
/// until `cancel` fires or a flush runs out of retries.
pub async fn run(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let registry = Registry::from_config(&config.outputs)
        .context("💀 The outputs section does not describe a usable set of channels")
        .context(Fatal::Config)?;

    let mut listener = Listener::bind(&config, registry).await?;
    listener.ping_sink().await?;
    let outcome = listener.run(cancel).await;
    debug!("📡 listener is {:?}", listener.state());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParserKind;
    use crate::registry::test_support::output;

    #[tokio::test]
    async fn the_one_where_duplicate_outputs_are_a_configuration_error() {
        let config = AppConfig {
            address: "127.0.0.1".parse().expect("💀 valid ip"),
            port: 0,
            outputs: vec![output("nginx", ParserKind::Nginx), output("nginx", ParserKind::Nginx)],
            ..AppConfig::default()
        };
        let err = run(config, CancellationToken::new())
            .await
            .expect_err("💀 two channels with one name cannot start");
        assert_eq!(Fatal::exit_code_for(&err), 1);
    }

    #[tokio::test]
    async fn the_one_where_a_cancelled_token_means_a_quick_clean_exit() -> Result<()> {
        let config = AppConfig {
            address: "127.0.0.1".parse().expect("💀 valid ip"),
            port: 0,
            outputs: vec![output("nginx", ParserKind::Nginx)],
            ..AppConfig::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        run(config, cancel).await
    }
}
