mod app;
mod cli;
mod config;
mod decoder;
mod error;
mod gatt;
mod orchestrator;
mod pairing;
mod registry;
mod shell;
mod telemetry;
mod terminal;

pub use app::{
    fake_shell_launcher, real_shell_launcher, run, run_with_clients,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use cli::{Args, Command, FakeArgs, InfoArgs, LogLevel, OutputFormat, StreamArgs};
pub use config::{
    DEFAULT_DEVICE_NAME, DEFAULT_PAYLOAD_WIDTH, DEFAULT_SHELL_PROGRAM, SessionConfig,
    ShellTimings,
};
pub use decoder::{DataFrame, PollOutcome, StreamDecoder, clean};
pub use error::{FixtureError, InteractionError, ShellError};
pub use gatt::{Characteristic, CharacteristicTable, GattSession, resolve_characteristics};
pub use orchestrator::{Orchestrator, Stage, StreamEvent, StreamStopReason, StreamSummary};
pub use pairing::{PAIRING_PROMPT_MARKER, PairingController, PairingState};
pub use registry::{Device, DeviceRegistry, DeviceSet, is_mac_address, parse_device_line};
pub use shell::{
    CommandOutcome, ControlProcess, Expectation, FakeShellLauncher, OutcomeMarkers,
    SUCCESS_INDEX, ShellCommand, ShellLauncher, ShellTransport, UnknownCommand,
};
pub use terminal::TerminalClient;
