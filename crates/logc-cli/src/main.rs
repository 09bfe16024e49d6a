//! 🚀 logc: the front door, the bouncer, the maitre d' of the collector.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up
//! logging, wires Ctrl-C to a cancellation token, and then lets the library
//! do the heavy lifting. Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use logc::app_config::{AppConfig, Verbosity, load_config};
use logc::fatal::Fatal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 🔧 Used when `--configuration` is not given. Missing is fine; env vars only then.
const DEFAULT_CONFIGURATION: &str = "logc.toml";

/// 📡 UDP log collector: datagrams in, ClickHouse rows out.
#[derive(Debug, Parser)]
#[command(name = "logc", version, about)]
struct Args {
    /// Path to the TOML configuration file [default: logc.toml]
    #[arg(short, long)]
    configuration: Option<PathBuf>,

    /// Overrides the configured verbosity. RUST_LOG overrides both.
    #[arg(short, long, value_enum)]
    verbosity: Option<VerbosityArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerbosityArg {
    None,
    Debug,
}

impl From<VerbosityArg> for Verbosity {
    fn from(value: VerbosityArg) -> Self {
        match value {
            VerbosityArg::None => Verbosity::None,
            VerbosityArg::Debug => Verbosity::Debug,
        }
    }
}

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. Parse args
/// 2. Load config (the moment of truth)
/// 3. Init tracing, now that we know how loud to be
/// 4. Run until a signal or a fatal error
/// 5. Map whatever went wrong onto an exit code
#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loaded = resolve_configuration(args.configuration.as_deref()).and_then(load_config);
    let verbosity = args
        .verbosity
        .map(Verbosity::from)
        .or_else(|| loaded.as_ref().ok().map(|config| config.verbosity))
        .unwrap_or_default();
    init_tracing(verbosity);

    let result = match loaded {
        Ok(config) => run(config).await,
        Err(err) => Err(err
            .context("💀 In logc, main, we couldn't load the configuration. Take a look at the file and the LOGC_* variables.")
            .context(Fatal::Config)),
    };

    if let Err(err) = result {
        report(&err);
        std::process::exit(Fatal::exit_code_for(&err));
    }
    // ✅ Clean shutdown. Pop the champagne. 🍾
}

/// 🔍 `Some(path)` for a file to merge, `None` for env-only configuration.
///
/// An explicitly named file has to exist; the default one is optional.
fn resolve_configuration(explicit: Option<&Path>) -> Result<Option<&Path>> {
    let (path, is_explicit) = match explicit {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIGURATION), false),
    };
    let exists = path.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
            path.display()
        )
    })?;
    match (exists, is_explicit) {
        (true, _) => Ok(Some(path)),
        (false, false) => Ok(None),
        (false, true) => anyhow::bail!(
            "💀 Configuration file '{}' does not exist. If it's a relative path, it's relative to the working directory.",
            path.display()
        ),
    }
}

/// 📡 `RUST_LOG` when set, the configured verbosity otherwise.
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 🛑 Run the collector with a token that SIGINT and SIGTERM both cancel.
async fn run(config: AppConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    logc::run(config, cancel).await
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("🛑 SIGINT received, shutting down"),
                    _ = sigterm.recv() => info!("🛑 SIGTERM received, shutting down"),
                }
            }
            Err(e) => {
                warn!("⚠️ could not install the SIGTERM handler ({e}), only Ctrl-C will stop logc");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("🛑 SIGINT received, shutting down");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, shutting down");
        }
    }
    cancel.cancel();
}

/// 🧅 Peel the error onion one layer at a time, and hint at the usual suspect.
fn report(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("Connection refused")
            || cause_str.contains("connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like ClickHouse isn't reachable. Double-check that it is running \
            and that the HTTP interface (port 8123 by default) is open. If you're using Docker, \
            `docker ps` is a good first stop. ☕"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_default_file_may_be_missing_but_an_explicit_one_may_not() {
        let dir = tempfile::tempdir().expect("💀 temp dir");
        let missing = dir.path().join("nope.toml");

        assert!(resolve_configuration(Some(missing.as_path())).is_err());

        let present = dir.path().join("logc.toml");
        std::fs::write(&present, "").expect("💀 temp file");
        assert_eq!(
            resolve_configuration(Some(present.as_path())).expect("💀 exists"),
            Some(present.as_path())
        );
    }

    #[test]
    fn the_one_where_the_flags_parse() {
        let args = Args::try_parse_from(["logc", "--configuration", "/etc/logc.toml", "-v", "debug"])
            .expect("💀 flags should parse");
        assert_eq!(args.configuration, Some(PathBuf::from("/etc/logc.toml")));
        assert!(matches!(args.verbosity, Some(VerbosityArg::Debug)));

        let bare = Args::try_parse_from(["logc"]).expect("💀 no flags is fine");
        assert!(bare.configuration.is_none());
    }
}
