//! 💀 The ways the daemon is allowed to die, each with its own exit code so
//! a supervisor can tell a typo in the config from a ClickHouse outage.

/// 💀 A fatal condition. Wrapped in `anyhow::Error` on the way up; the CLI
/// downcasts to pick the exit code.
#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    #[error("configuration error")]
    Config,
    #[error("could not bind the UDP socket")]
    Bind,
    #[error("sink startup check failed")]
    SinkStartup,
    #[error("flush retries exhausted")]
    WriteExhausted,
}

impl Fatal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::Config => 1,
            Fatal::Bind => 2,
            Fatal::SinkStartup => 3,
            Fatal::WriteExhausted => 4,
        }
    }

    /// 🔍 The exit code for any error chain: the outermost `Fatal` wins,
    /// anything unclassified exits with 1.
    ///
    /// `Fatal` usually rides along as `.context(...)`, which only
    /// `anyhow::Error::downcast_ref` can see through; `chain()` catches the
    /// rarer case of a `Fatal` sitting as a plain source.
    pub fn exit_code_for(err: &anyhow::Error) -> i32 {
        err.downcast_ref::<Fatal>()
            .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<Fatal>()))
            .map_or(1, Fatal::exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn the_one_where_the_exit_code_survives_layers_of_context() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context(Fatal::SinkStartup)
            .context("💀 startup failed")
            .expect_err("💀 it is an error");
        assert_eq!(Fatal::exit_code_for(&err), 3);
    }

    #[test]
    fn the_one_where_unclassified_errors_exit_with_one() {
        assert_eq!(Fatal::exit_code_for(&anyhow::anyhow!("who knows")), 1);
        assert_eq!(Fatal::exit_code_for(&anyhow::Error::new(Fatal::Bind)), 2);
        assert_eq!(Fatal::exit_code_for(&anyhow::Error::new(Fatal::WriteExhausted)), 4);
    }
}
