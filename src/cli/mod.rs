use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::config::{
    DEFAULT_DEVICE_NAME, DEFAULT_PAYLOAD_WIDTH, DEFAULT_SHELL_PROGRAM, SessionConfig, ShellTimings,
};
use crate::error::{CliConfigError, FixtureError};
use crate::shell::{DeviceFixture, FakeShellConfig, FramePayloads};

pub(crate) mod devices;
pub(crate) mod info;
pub(crate) mod stream;
pub(crate) mod ui;

pub use self::info::InfoArgs;
pub use self::stream::StreamArgs;

/// Command-line options for the WaWiCo stream tool.
#[derive(Debug, Parser)]
#[command(
    name = "wawico",
    about = "Stream FFT frames from a WaWiCo BLE transmitter through bluetoothctl."
)]
pub struct Args {
    /// Advertised name of the transmitter to connect to.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME)]
    device_name: String,
    /// Control shell binary used for both the pairing and GATT sessions.
    #[arg(long = "shell", global = true, default_value = DEFAULT_SHELL_PROGRAM)]
    shell_program: String,
    /// Overrides `RUST_LOG` for this run.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,
    /// Base deadline for each control command (e.g. `5s`, `750ms`).
    #[arg(long, global = true, value_parser = parse_duration)]
    command_timeout: Option<Duration>,
    /// How long to keep looking for the transmitter (e.g. `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    discovery_timeout: Option<Duration>,
    /// Hex digits kept from the end of each notification line.
    #[arg(long, global = true, default_value_t = DEFAULT_PAYLOAD_WIDTH)]
    payload_width: usize,
    /// Uses a simulated control shell driven by fixtures.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake devices in the form `address|name;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_devices: Option<DeviceFixture>,
    /// Fake bonded devices in the form `address|name;...`.
    #[arg(long, global = true, requires = "fake")]
    fake_paired: Option<DeviceFixture>,
    /// Fake notification payloads as comma-separated hex.
    #[arg(long, global = true, requires = "fake")]
    fake_frames: Option<FramePayloads>,
    /// Makes the fake shell refuse every connect.
    #[arg(long, global = true, requires = "fake")]
    fake_connect_fails: bool,
    /// Makes the fake shell answer every other poll with a non-frame response.
    #[arg(long, global = true, requires = "fake")]
    fake_noisy_polls: bool,
    /// Delays each fake poll response (e.g. `200ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_poll_delay: Option<Duration>,
    /// Makes the fake radio unblock fail.
    #[arg(long, global = true, requires = "fake")]
    fake_radio_blocked: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use wawico::{Args, Command, StreamArgs};
    ///
    /// let stream = Args::new(Command::Stream(StreamArgs::new(Some(3))));
    /// let devices = Args::new(Command::Devices);
    /// let _ = (stream, devices);
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            shell_program: DEFAULT_SHELL_PROGRAM.to_string(),
            log_level: None,
            format: None,
            command_timeout: None,
            discovery_timeout: None,
            payload_width: DEFAULT_PAYLOAD_WIDTH,
            fake: false,
            fake_devices: None,
            fake_paired: None,
            fake_frames: None,
            fake_connect_fails: false,
            fake_noisy_polls: false,
            fake_poll_delay: None,
            fake_radio_blocked: false,
            command,
        }
    }

    /// Enables fake mode with pre-parsed fixtures.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            devices,
            paired,
            frames,
            connect_fails,
            noisy_polls,
            poll_delay,
            radio_blocked,
        } = fake;

        self.fake = true;
        self.fake_devices = Some(devices);
        self.fake_paired = paired;
        self.fake_frames = frames;
        self.fake_connect_fails = connect_fails;
        self.fake_noisy_polls = noisy_polls;
        self.fake_poll_delay = poll_delay;
        self.fake_radio_blocked = radio_blocked;
        self
    }

    #[must_use]
    pub fn with_discovery_timeout(mut self, discovery_timeout: Duration) -> Self {
        self.discovery_timeout = Some(discovery_timeout);
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.format
    }

    /// Session settings derived from the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload width is zero.
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        if self.payload_width == 0 {
            return Err(CliConfigError::ZeroPayloadWidth.into());
        }
        let timings = ShellTimings::builder()
            .maybe_command_timeout(self.command_timeout)
            .build();
        Ok(SessionConfig::builder()
            .device_name(self.device_name.as_str())
            .shell_program(self.shell_program.as_str())
            .timings(timings)
            .maybe_discovery_timeout(self.discovery_timeout)
            .payload_width(self.payload_width)
            .build())
    }

    /// Splits parsed arguments into the command and optional fake-shell settings.
    ///
    /// # Errors
    ///
    /// Returns an error if fake mode is enabled without a device fixture.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_devices,
            fake_paired,
            fake_frames,
            fake_connect_fails,
            fake_noisy_polls,
            fake_poll_delay,
            fake_radio_blocked,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(devices) = fake_devices else {
                return Err(CliConfigError::MissingFakeDevices.into());
            };
            Some(FakeArgs {
                devices,
                paired: fake_paired,
                frames: fake_frames,
                connect_fails: fake_connect_fails,
                noisy_polls: fake_noisy_polls,
                poll_delay: fake_poll_delay,
                radio_blocked: fake_radio_blocked,
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake control-shell fixtures for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    devices: DeviceFixture,
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    paired: Option<DeviceFixture>,
    #[builder(with = |value: &str| -> Result<_, FixtureError> { value.parse() })]
    frames: Option<FramePayloads>,
    #[builder(default)]
    connect_fails: bool,
    #[builder(default)]
    noisy_polls: bool,
    poll_delay: Option<Duration>,
    #[builder(default)]
    radio_blocked: bool,
}

impl FakeArgs {
    pub(crate) fn into_shell_config(self) -> FakeShellConfig {
        let Self {
            devices,
            paired,
            frames,
            connect_fails,
            noisy_polls,
            poll_delay,
            radio_blocked,
        } = self;

        FakeShellConfig::builder()
            .devices(devices)
            .maybe_paired(paired)
            .maybe_frames(frames)
            .connect_fails(connect_fails)
            .noisy_polls(noisy_polls)
            .maybe_poll_delay(poll_delay)
            .radio_blocked(radio_blocked)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find the transmitter, connect, subscribe and print frames until it disconnects.
    Stream(StreamArgs),
    /// Scan once and list available, paired and discoverable devices.
    Devices,
    /// Print what the control shell knows about one address.
    Info(InfoArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Stream(_args) => "stream",
            Self::Devices => "devices",
            Self::Info(_args) => "info",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Styled text and tables.
    Pretty,
    /// One JSON document per line.
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn fake_mode_requires_device_fixture() {
        let result = Args::try_parse_from(["wawico", "--fake", "devices"]);

        let error = result.expect_err("missing --fake-devices should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[rstest]
    #[case::devices(&["wawico", "--fake-devices", "AA:BB:CC:DD:EE:FF|WaWiCo", "devices"])]
    #[case::frames(&["wawico", "--fake-frames", "0a1b", "devices"])]
    #[case::connect_fails(&["wawico", "--fake-connect-fails", "devices"])]
    #[case::noisy_polls(&["wawico", "--fake-noisy-polls", "devices"])]
    #[case::poll_delay(&["wawico", "--fake-poll-delay", "1s", "devices"])]
    fn fixture_flags_require_fake_mode(#[case] argv: &[&str]) {
        let error = Args::try_parse_from(argv).expect_err("fixture flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn global_flags_build_session_config() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "wawico",
            "stream",
            "--max-frames",
            "4",
            "--device-name",
            "Bench Rig",
            "--command-timeout",
            "750ms",
            "--discovery-timeout",
            "3s",
            "--payload-width",
            "8",
        ])?;

        let config = args.session_config()?;

        assert_eq!("Bench Rig", config.device_name());
        assert_eq!("bluetoothctl", config.shell_program());
        assert_eq!(Duration::from_millis(750), config.timings().command_timeout());
        assert_eq!(Duration::from_secs(3), config.discovery_timeout());
        assert_eq!(8, config.payload_width());
        assert_matches!(args.into_command_and_fake_args()?, (Command::Stream(stream), None) if stream.max_frames() == Some(4));
        Ok(())
    }

    #[test]
    fn zero_payload_width_is_rejected() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["wawico", "--payload-width", "0", "devices"])?;

        assert!(args.session_config().is_err());
        Ok(())
    }

    #[test]
    fn fake_mode_builds_fake_settings() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "wawico",
            "--fake",
            "--fake-devices",
            "AA:BB:CC:DD:EE:FF|WaWiCo",
            "--format",
            "json",
            "info",
            "AA:BB:CC:DD:EE:FF",
        ])?;

        assert_eq!(Some(OutputFormat::Json), args.output_format());
        let (command, fake_args) = args.into_command_and_fake_args()?;
        assert_matches!(command, Command::Info(_));
        assert_matches!(fake_args, Some(_));
        Ok(())
    }

    #[rstest]
    #[case(LogLevel::Off, LevelFilter::OFF)]
    #[case(LogLevel::Debug, LevelFilter::DEBUG)]
    fn log_level_maps_to_filter(#[case] level: LogLevel, #[case] expected: LevelFilter) {
        assert_eq!(expected, level.as_level_filter());
    }
}
