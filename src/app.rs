use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::config::SessionConfig;
use crate::shell::{FakeShellLauncher, ShellLauncher, SystemShellLauncher};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

const SERVICE_NAME: &str = "wawico";

/// Creates a launcher that runs the real control shell and `rfkill`.
#[must_use]
pub fn real_shell_launcher() -> Arc<dyn ShellLauncher> {
    Arc::new(SystemShellLauncher)
}

/// Creates a launcher whose shells are simulated from fixtures.
///
/// The returned handle is cheap to clone; clones observe the same simulated
/// adapter and transcript.
#[must_use]
pub fn fake_shell_launcher(fake_args: FakeArgs) -> FakeShellLauncher {
    FakeShellLauncher::new(fake_args.into_shell_config())
}

/// Runs a CLI command with pretty output and the default log filter.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use std::sync::Arc;
///
/// use clap::Parser;
///
/// let args = wawico::Args::try_parse_from([
///     "wawico",
///     "--fake",
///     "--fake-devices",
///     "AA:BB:CC:DD:EE:FF|WaWiCo",
///     "stream",
///     "--max-frames",
///     "2",
/// ])?;
/// let config = args.session_config()?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let launcher: Arc<dyn wawico::ShellLauncher> = match maybe_fake_args {
///     Some(fake_args) => Arc::new(wawico::fake_shell_launcher(fake_args)),
///     None => wawico::real_shell_launcher(),
/// };
/// let mut out = Vec::new();
/// wawico::run(command, config, &mut out, launcher).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the control shells fail,
/// or output writing fails.
pub async fn run<W>(
    command: Command,
    config: SessionConfig,
    out: &mut W,
    launcher: Arc<dyn ShellLauncher>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, config, out, launcher, None, OutputFormat::Pretty).await
}

/// Runs a CLI command with an explicit log-level override and output format.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the control shells fail,
/// or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    config: SessionConfig,
    out: &mut W,
    launcher: Arc<dyn ShellLauncher>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        config,
        out,
        &SystemTerminalClient,
        launcher,
        log_level,
        output_format,
    )
    .await
}

/// Runs a CLI command with an injected terminal client.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the control shells fail,
/// or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    config: SessionConfig,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    launcher: Arc<dyn ShellLauncher>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        config,
        out,
        terminal_client,
        launcher,
        None,
        output_format,
    )
    .await
}

/// Runs a CLI command with injected clients and explicit telemetry settings.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the control shells fail,
/// or output writing fails.
#[instrument(
    skip(config, out, terminal_client, launcher),
    level = "info",
    fields(command = command.name(), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    config: SessionConfig,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    launcher: Arc<dyn ShellLauncher>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        SERVICE_NAME,
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Stream(args) => {
            crate::cli::stream::run(launcher, config, &args, out, terminal_client, output_format)
                .await
        }
        Command::Devices => {
            crate::cli::devices::run(launcher, config, out, terminal_client, output_format).await
        }
        Command::Info(args) => {
            crate::cli::info::run(launcher, config, &args, out, terminal_client, output_format)
                .await
        }
    }
}
