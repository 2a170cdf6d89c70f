use std::io;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::config::SessionConfig;
use crate::error::FixtureError;
use crate::orchestrator::Orchestrator;
use crate::registry::is_mac_address;
use crate::shell::ShellLauncher;
use crate::terminal::TerminalClient;

use super::ui::{DeviceInfoView, Painter};

/// Arguments for the `info` command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Colon-separated device address.
    #[arg(value_parser = parse_address)]
    address: String,
}

impl InfoArgs {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    #[must_use]
    pub(crate) fn address(&self) -> &str {
        &self.address
    }
}

/// Executes the `info` command.
#[instrument(skip_all, level = "debug", fields(address = args.address()))]
pub(crate) async fn run<W>(
    launcher: Arc<dyn ShellLauncher>,
    config: SessionConfig,
    args: &InfoArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let orchestrator = Orchestrator::new(launcher, config);
    let Some(lines) = orchestrator.device_info(args.address()).await? else {
        bail!("the control shell returned no info for {}", args.address());
    };

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{}",
                DeviceInfoView::new(args.address(), &lines, &painter)
            )?;
        }
        OutputFormat::Json => {
            let document = serde_json::json!({
                "address": args.address(),
                "lines": lines,
            });
            serde_json::to_writer(&mut *out, &document)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn parse_address(value: &str) -> Result<String, FixtureError> {
    if is_mac_address(value) {
        Ok(value.to_string())
    } else {
        Err(FixtureError::InvalidAddress {
            value: value.to_string(),
        })
    }
}
