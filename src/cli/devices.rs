use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::config::SessionConfig;
use crate::orchestrator::Orchestrator;
use crate::registry::{Device, DeviceSet};
use crate::shell::ShellLauncher;
use crate::terminal::TerminalClient;

use super::ui::{DeviceSetView, Painter};

#[derive(Debug, Serialize)]
struct DeviceListing<'a> {
    available: &'a [Device],
    paired: &'a [Device],
    discoverable: Vec<Device>,
}

impl<'a> DeviceListing<'a> {
    fn new(devices: &'a DeviceSet) -> Self {
        Self {
            available: devices.available(),
            paired: devices.paired(),
            discoverable: devices.discoverable(),
        }
    }
}

/// Executes the `devices` command.
#[instrument(skip_all, level = "debug", fields(?output_format))]
pub(crate) async fn run<W>(
    launcher: Arc<dyn ShellLauncher>,
    config: SessionConfig,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let devices = Orchestrator::new(launcher, config).survey().await?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DeviceSetView::new(&devices, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &DeviceListing::new(&devices))?;
            writeln!(out)?;
        }
    }
    Ok(())
}
