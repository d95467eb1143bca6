//! Turns a `Future`-returning CLI command into a process.
//!
//! Installs a ctrl-c / SIGTERM handler and hands the running command a
//! [`CliContext`] it can poll to learn whether a shutdown has been
//! requested. Workers are expected to finish their current unit of work and
//! persist state before honoring the request (see the "soft cancel" note in
//! the orchestrator docs) rather than being killed outright.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::runtime::Runtime;

/// Shared cancellation flag handed to a running command.
#[derive(Clone, Debug, Default)]
pub struct CliContext {
    cancelled: Arc<AtomicBool>,
}

impl CliContext {
    fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// True once a shutdown signal has been received. Long-running loops
    /// should check this between units of work, not mid-batch.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Builds a current-process tokio runtime and drives a single command to
/// completion, translating its result into the process exit codes used
/// throughout the CLI: 0 on success, 1 on an unrecoverable error, 2 on a
/// configuration error (see [`vaultscan::error::ScanError`]).
pub struct CliRunner {
    runtime: Runtime,
}

impl Default for CliRunner {
    fn default() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build the tokio runtime");
        Self { runtime }
    }
}

impl CliRunner {
    /// Runs `f(ctx)` to completion, installing a ctrl-c handler that flips
    /// the context's cancellation flag rather than aborting the process.
    pub fn run_command_until_exit<F, Fut>(self, f: F) -> eyre::Result<()>
    where
        F: FnOnce(CliContext) -> Fut,
        Fut: Future<Output = eyre::Result<()>>,
    {
        let ctx = CliContext::new();
        let signal_ctx = ctx.clone();

        self.runtime.block_on(async move {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("shutdown requested, finishing in-flight batches");
                    signal_ctx.cancel();
                }
            });

            f(ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_starts_uncancelled() {
        let ctx = CliContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn runs_command_to_completion() {
        let runner = CliRunner::default();
        let result = runner.run_command_until_exit(|ctx| async move {
            assert!(!ctx.is_cancelled());
            Ok(())
        });
        assert!(result.is_ok());
    }
}
