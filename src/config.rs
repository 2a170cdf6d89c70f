use std::time::Duration;

use bon::Builder;

use crate::shell::ShellCommand;

/// Advertised name of the WaWiCo FFT transmitter.
pub const DEFAULT_DEVICE_NAME: &str = "WaWiCo";
/// Interactive control shell driven by both sessions.
pub const DEFAULT_SHELL_PROGRAM: &str = "bluetoothctl";
/// Hex digits kept from each notification payload line.
pub const DEFAULT_PAYLOAD_WIDTH: usize = 16;

/// Response bounds for control-shell commands.
///
/// The settle values extend the response deadline of the matching command. They
/// are upper bounds on how long the shell may take to echo an outcome, never a
/// mandatory sleep.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder)]
pub struct ShellTimings {
    /// Base deadline for any command's prompt confirmation.
    #[builder(default = Duration::from_secs(5))]
    command_timeout: Duration,
    /// How long to wait for the startup prompt before issuing the first command.
    #[builder(default = Duration::from_secs(2))]
    startup_timeout: Duration,
    #[builder(default = Duration::from_secs(4))]
    pair_settle: Duration,
    #[builder(default = Duration::from_secs(4))]
    trust_settle: Duration,
    #[builder(default = Duration::from_secs(3))]
    remove_settle: Duration,
    #[builder(default = Duration::from_secs(2))]
    connect_settle: Duration,
    #[builder(default = Duration::from_secs(2))]
    disconnect_settle: Duration,
}

impl Default for ShellTimings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ShellTimings {
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Returns the extra response allowance for a command.
    #[must_use]
    pub fn settle_for(&self, command: &ShellCommand) -> Duration {
        match command {
            ShellCommand::Pair(_) => self.pair_settle,
            ShellCommand::Trust(_) => self.trust_settle,
            ShellCommand::Remove(_) => self.remove_settle,
            ShellCommand::Connect(_) => self.connect_settle,
            ShellCommand::Disconnect(_) | ShellCommand::DisconnectCurrent => {
                self.disconnect_settle
            }
            _ => Duration::ZERO,
        }
    }

    /// Returns the full response deadline for a command.
    #[must_use]
    pub fn deadline_for(&self, command: &ShellCommand) -> Duration {
        self.command_timeout.saturating_add(self.settle_for(command))
    }
}

/// Settings for one discovery-to-stream run.
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    /// Advertised name of the peripheral to stream from.
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    device_name: String,
    /// Control shell binary spawned for both sessions.
    #[builder(into, default = DEFAULT_SHELL_PROGRAM.to_string())]
    shell_program: String,
    #[builder(default)]
    timings: ShellTimings,
    /// How long to keep re-listing devices while looking for the target.
    #[builder(default = Duration::from_secs(10))]
    discovery_timeout: Duration,
    #[builder(default = Duration::from_millis(500))]
    discovery_interval: Duration,
    #[builder(default = DEFAULT_PAYLOAD_WIDTH)]
    payload_width: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConfig {
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn shell_program(&self) -> &str {
        &self.shell_program
    }

    #[must_use]
    pub fn timings(&self) -> ShellTimings {
        self.timings
    }

    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    #[must_use]
    pub fn payload_width(&self) -> usize {
        self.payload_width
    }
}
