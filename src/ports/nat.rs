//! Firewall/NAT rule lifecycle for decoy ports.
//!
//! # States
//! ```text
//! Absent ──init──▶ DropInstalled ──init──▶ ChainLinked
//!    ▲                                          │
//!    └───────────────── cleanup ────────────────┘
//! ```
//!
//! # Responsibilities
//! - Drop direct inbound traffic to the whole decoy range
//! - Maintain a dedicated NAT chain linked from PREROUTING
//! - Add/remove one REDIRECT rule per active decoy port
//!
//! # Design Decisions
//! - Only exit status is checked; rule content is never read back
//! - Teardown is best-effort except the final chain deletion
//! - Requires a privileged execution context

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;

const NAT_TABLE: &str = "nat";
const INPUT_CHAIN: &str = "INPUT";
const PREROUTING_CHAIN: &str = "PREROUTING";

/// Errors raised by firewall rule commands.
#[derive(Debug, Error)]
pub enum NatError {
    /// The rule command could not be launched.
    #[error("failed to run firewall command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The rule command exited unsuccessfully.
    #[error("firewall command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },
}

/// Executes one firewall rule command.
pub trait RuleRunner: Send + Sync {
    fn run(&self, args: Vec<String>) -> BoxFuture<'_, Result<(), NatError>>;
}

/// Runs rule commands through the `iptables` binary.
#[derive(Debug, Clone, Default)]
pub struct Iptables;

impl RuleRunner for Iptables {
    fn run(&self, args: Vec<String>) -> BoxFuture<'_, Result<(), NatError>> {
        Box::pin(async move {
            let status = tokio::process::Command::new("iptables")
                .args(&args)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await?;
            if status.success() {
                Ok(())
            } else {
                Err(NatError::CommandFailed {
                    command: format!("iptables {}", args.join(" ")),
                    status: status.to_string(),
                })
            }
        })
    }
}

/// Progress of the rule setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatState {
    Absent,
    DropInstalled,
    ChainLinked,
}

/// Whether a redirect rule is being installed or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAction {
    Add,
    Delete,
}

impl RedirectAction {
    fn flag(self) -> &'static str {
        match self {
            RedirectAction::Add => "-A",
            RedirectAction::Delete => "-D",
        }
    }
}

/// Owns the NAT rules tied to the decoy port range.
pub struct NatLifecycle {
    runner: Arc<dyn RuleRunner>,
    chain: String,
    port_range: String,
    state: Mutex<NatState>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl NatLifecycle {
    /// Create a lifecycle for ports `min..=max` using the dedicated `chain`.
    pub fn new(runner: Arc<dyn RuleRunner>, chain: impl Into<String>, min: u16, max: u16) -> Self {
        Self {
            runner,
            chain: chain.into(),
            port_range: format!("{}:{}", min, max),
            state: Mutex::new(NatState::Absent),
        }
    }

    pub fn state(&self) -> NatState {
        *self.state.lock()
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    fn drop_rule(&self, flag: &str) -> Vec<String> {
        args(&[
            flag,
            INPUT_CHAIN,
            "-p",
            "tcp",
            "--dport",
            &self.port_range,
            "-j",
            "DROP",
        ])
    }

    fn nat(&self, parts: &[&str]) -> Vec<String> {
        let mut full = args(&["-t", NAT_TABLE]);
        full.extend(parts.iter().map(|s| s.to_string()));
        full
    }

    /// Install the range-wide DROP rule and link the dedicated chain.
    pub async fn init(&self) -> Result<(), NatError> {
        tracing::info!(range = %self.port_range, chain = %self.chain, "Initializing NAT rules for dynamic ports");

        // Remove first so repeated init never stacks duplicate DROP rules.
        let _ = self.runner.run(self.drop_rule("-D")).await;
        self.runner.run(self.drop_rule("-A")).await?;
        *self.state.lock() = NatState::DropInstalled;

        self.ensure_chain().await?;
        *self.state.lock() = NatState::ChainLinked;
        Ok(())
    }

    async fn ensure_chain(&self) -> Result<(), NatError> {
        // An existing chain is already linked; flushing it is enough.
        if self.runner.run(self.nat(&["-F", &self.chain])).await.is_ok() {
            return Ok(());
        }
        tracing::debug!(chain = %self.chain, "Creating NAT chain");
        self.runner.run(self.nat(&["-N", &self.chain])).await?;
        self.runner
            .run(self.nat(&["-A", PREROUTING_CHAIN, "-j", &self.chain]))
            .await
    }

    /// Install or remove the REDIRECT rule `src → dst` inside the chain.
    pub async fn modify_redirect(
        &self,
        action: RedirectAction,
        src: u16,
        dst: u16,
    ) -> Result<(), NatError> {
        let src = src.to_string();
        let dst = dst.to_string();
        self.runner
            .run(self.nat(&[
                action.flag(),
                &self.chain,
                "-p",
                "tcp",
                "--dport",
                &src,
                "-j",
                "REDIRECT",
                "--to-port",
                &dst,
            ]))
            .await
    }

    /// Undo everything `init` installed, in reverse order.
    ///
    /// Only the final chain deletion is reported.
    pub async fn cleanup(&self) -> Result<(), NatError> {
        tracing::info!(range = %self.port_range, chain = %self.chain, "Cleaning up NAT rules for dynamic ports");

        let steps = [
            self.drop_rule("-D"),
            self.nat(&["-D", PREROUTING_CHAIN, "-j", &self.chain]),
            self.nat(&["-F", &self.chain]),
        ];
        for step in steps {
            if let Err(e) = self.runner.run(step).await {
                tracing::warn!(error = %e, "NAT cleanup step failed");
            }
        }

        self.runner.run(self.nat(&["-X", &self.chain])).await?;
        *self.state.lock() = NatState::Absent;
        Ok(())
    }
}

/// Test double recording every rule command.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Default)]
    pub struct RecordingRunner {
        pub commands: Mutex<Vec<String>>,
        pub failing: Mutex<Vec<String>>,
    }

    impl RecordingRunner {
        /// Make every command starting with `prefix` fail.
        pub fn fail_on(&self, prefix: &str) {
            self.failing.lock().push(prefix.to_string());
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    impl RuleRunner for RecordingRunner {
        fn run(&self, args: Vec<String>) -> BoxFuture<'_, Result<(), NatError>> {
            let command = args.join(" ");
            self.commands.lock().push(command.clone());
            let fails = self.failing.lock().iter().any(|p| command.starts_with(p));
            Box::pin(async move {
                if fails {
                    Err(NatError::CommandFailed {
                        command,
                        status: "exit status: 1".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }
}
