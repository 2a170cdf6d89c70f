use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::config::SessionConfig;
use crate::error::InteractionError;
use crate::orchestrator::{Orchestrator, StreamEvent};
use crate::shell::ShellLauncher;
use crate::terminal::TerminalClient;

use super::ui::{Painter, StreamEventView, StreamSummaryView};

/// Arguments for the `stream` command.
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Stop after this many frames. If omitted, stream until the device
    /// disconnects or Ctrl+C.
    #[arg(long)]
    max_frames: Option<usize>,
}

impl StreamArgs {
    #[must_use]
    pub fn new(max_frames: Option<usize>) -> Self {
        Self { max_frames }
    }

    #[must_use]
    pub(crate) fn max_frames(&self) -> Option<usize> {
        self.max_frames
    }
}

/// Executes the `stream` command.
#[instrument(skip_all, level = "debug", fields(?output_format))]
pub(crate) async fn run<W>(
    launcher: Arc<dyn ShellLauncher>,
    config: SessionConfig,
    args: &StreamArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let orchestrator = Orchestrator::new(launcher, config);
    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(cancel.clone());

    let mut write_error: Option<io::Error> = None;
    let run_result = orchestrator
        .run(args.max_frames(), &cancel, &mut |event: StreamEvent| {
            if write_error.is_some() {
                return;
            }
            if let Err(error) = write_event(out, &event, output_format, &painter) {
                write_error = Some(error);
            }
        })
        .await;

    cancel.cancel();
    ctrl_c.await??;
    if let Some(error) = write_error {
        return Err(error.into());
    }

    let summary = run_result?;
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", StreamSummaryView::new(&summary, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &summary)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn write_event<W>(
    out: &mut W,
    event: &StreamEvent,
    output_format: OutputFormat,
    painter: &Painter,
) -> io::Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", StreamEventView::new(event, painter)),
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)
        }
    }
}

/// Cancels `cancel` on Ctrl+C; the task ends quietly once `cancel` fires.
fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<Result<(), InteractionError>> {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => Ok(()),
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|source| InteractionError::CtrlC { source })?;
                cancel.cancel();
                Ok(())
            }
        }
    })
}
