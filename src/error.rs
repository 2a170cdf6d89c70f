use std::time::Duration;

use thiserror::Error;

use crate::shell::CommandOutcome;

/// Transport faults raised by a control-shell session.
///
/// Every variant is fatal to the session that produced it.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to start control shell `{program}` on a pseudo-terminal")]
    Pty {
        program: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to write `{command}` to the control shell")]
    Write {
        command: String,
        source: std::io::Error,
    },
    #[error("failed to read control shell output")]
    Read(#[source] std::io::Error),
    #[error("control shell closed its output stream")]
    EndOfStream,
    #[error("timed out after {} waiting for {expected}", humantime::format_duration(*timeout))]
    Timeout { expected: String, timeout: Duration },
    #[error("failed to run the radio unblock command")]
    RadioUnblock(#[source] std::io::Error),
    #[error("radio unblock command exited unsuccessfully ({status})")]
    RadioUnblockStatus { status: String },
}

/// Errors returned by the discovery-to-stream pipeline.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("control shell fault")]
    Shell(#[from] ShellError),
    #[error(
        "no device named `{name}` was discovered within {}",
        humantime::format_duration(*window)
    )]
    TargetNotFound { name: String, window: Duration },
    #[error("failed to connect to `{name}` ({address}): {outcome}")]
    ConnectFailed {
        name: String,
        address: String,
        outcome: CommandOutcome,
    },
    #[error("the connected device did not list any GATT characteristic")]
    NoCharacteristic,
    #[error("failed to subscribe to characteristic `{uuid}`")]
    Subscribe { uuid: String },
    #[error("cancelled before streaming started")]
    Cancelled,
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
}

/// Errors returned when parsing fake control-shell fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake device fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain two pipe-delimited fields: `{record}`")]
    InvalidRecordFieldCount { record: String },
    #[error("fixture records cannot contain empty fields")]
    EmptyRecordField,
    #[error("`{value}` is not a colon-separated six-octet address")]
    InvalidAddress { value: String },
    #[error("frame payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake device fixture while fake mode is enabled")]
    MissingFakeDevices,
    #[error("payload width must be greater than zero")]
    ZeroPayloadWidth,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
