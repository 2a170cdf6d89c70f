use tracing::{info, instrument, warn};

use crate::config::ShellTimings;
use crate::decoder::clean;
use crate::error::ShellError;
use crate::registry::DeviceRegistry;
use crate::shell::{CommandOutcome, ControlProcess, ShellCommand, ShellLauncher};

/// Prompt marker of the top-level control shell.
pub const PAIRING_PROMPT_MARKER: &str = "bluetooth";

/// Lifecycle of the pairing shell.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum PairingState {
    #[display("new")]
    New,
    #[display("agent ready")]
    AgentReady,
    #[display("discoverable")]
    Discoverable,
    #[display("scanning")]
    Scanning,
    #[display("connected")]
    Connected,
    #[display("disconnected")]
    Disconnected,
    #[display("failed")]
    Failed,
}

/// Agent, discovery and bonding operations over the top-level control shell.
///
/// Setup operations return `false` on any failure and targeted operations return
/// a [`CommandOutcome`]; neither propagates transport faults. Callers decide
/// whether to retry or abandon.
#[derive(Debug)]
pub struct PairingController {
    shell: ControlProcess,
    state: PairingState,
}

impl PairingController {
    /// Unblocks the radio and spawns the pairing shell.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be unblocked or the shell cannot start.
    #[instrument(skip(launcher, timings), level = "debug")]
    pub async fn spawn(
        launcher: &dyn ShellLauncher,
        program: &str,
        timings: ShellTimings,
    ) -> Result<Self, ShellError> {
        launcher.unblock_radio().await?;
        let shell =
            ControlProcess::spawn(launcher, "pairing", program, PAIRING_PROMPT_MARKER, timings)
                .await?;
        Ok(Self {
            shell,
            state: PairingState::New,
        })
    }

    #[must_use]
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Registers the pairing agent.
    pub async fn enable_agent(&mut self) -> bool {
        self.setup(ShellCommand::AgentOn, PairingState::AgentReady)
            .await
    }

    /// Makes the registered agent the default one.
    pub async fn set_default_agent(&mut self) -> bool {
        self.setup(ShellCommand::DefaultAgent, PairingState::AgentReady)
            .await
    }

    pub async fn make_discoverable(&mut self) -> bool {
        self.setup(ShellCommand::DiscoverableOn, PairingState::Discoverable)
            .await
    }

    pub async fn start_scan(&mut self) -> bool {
        self.setup(ShellCommand::ScanOn, PairingState::Scanning)
            .await
    }

    /// Device listings over this shell.
    pub fn registry(&mut self) -> DeviceRegistry<'_> {
        DeviceRegistry::new(&mut self.shell)
    }

    /// Raw `info` lines for one address, cleaned of styling.
    ///
    /// Returns `None` when the command fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn device_info(&mut self, address: &str) -> Option<Vec<String>> {
        if let Err(error) = self.shell.send(&ShellCommand::Info(address.to_string())).await {
            warn!(%error, "device info failed");
            return None;
        }
        let lines = self
            .shell
            .read_buffered_output()
            .iter()
            .map(|line| clean(line))
            .filter(|line| line.chars().any(char::is_alphanumeric))
            .collect();
        Some(lines)
    }

    pub async fn pair(&mut self, address: &str) -> CommandOutcome {
        self.shell
            .run_targeted(&ShellCommand::Pair(address.to_string()))
            .await
    }

    pub async fn trust(&mut self, address: &str) -> CommandOutcome {
        self.shell
            .run_targeted(&ShellCommand::Trust(address.to_string()))
            .await
    }

    /// Connects to `address`; the state becomes `Connected` or `Failed`.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(&mut self, address: &str) -> CommandOutcome {
        let outcome = self
            .shell
            .run_targeted(&ShellCommand::Connect(address.to_string()))
            .await;
        self.state = if outcome.succeeded() {
            PairingState::Connected
        } else {
            PairingState::Failed
        };
        info!(%outcome, state = %self.state, "connect finished");
        outcome
    }

    /// Waits for `device_name` as the prompt from now on.
    ///
    /// Once a device is connected every control shell shows its name as the
    /// prompt, so the idle marker no longer confirms responses.
    pub fn follow_device_prompt(&mut self, device_name: &str) {
        self.shell.set_prompt_marker(device_name);
    }

    /// Disconnects `address`; on success the idle prompt marker is restored.
    #[instrument(skip(self), level = "debug")]
    pub async fn disconnect(&mut self, address: &str) -> CommandOutcome {
        let outcome = self
            .shell
            .run_targeted(&ShellCommand::Disconnect(address.to_string()))
            .await;
        if outcome.succeeded() {
            self.shell.set_prompt_marker(PAIRING_PROMPT_MARKER);
            self.state = PairingState::Disconnected;
        }
        info!(%outcome, prompt = self.shell.prompt_marker(), "disconnect finished");
        outcome
    }

    /// Drops the bond with `address`.
    pub async fn remove(&mut self, address: &str) -> CommandOutcome {
        self.shell
            .run_targeted(&ShellCommand::Remove(address.to_string()))
            .await
    }

    pub async fn terminate(self) {
        self.shell.terminate().await;
    }

    async fn setup(&mut self, command: ShellCommand, next: PairingState) -> bool {
        match self.shell.send(&command).await {
            Ok(()) => {
                self.state = next;
                true
            }
            Err(error) => {
                warn!(%error, command = command.name(), "setup command failed");
                false
            }
        }
    }
}
