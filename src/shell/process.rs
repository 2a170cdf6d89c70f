use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, trace, warn};

use super::command::{SUCCESS_INDEX, ShellCommand};
use super::transport::{ShellLauncher, ShellTransport};
use crate::config::ShellTimings;
use crate::error::ShellError;

/// Result of racing a set of markers against the shell's output.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Expectation {
    /// Index into the awaited marker list of the earliest match.
    Matched(usize),
    /// The shell closed its output before any marker appeared.
    EndOfStream,
}

/// Typed result of a targeted command such as `pair` or `connect`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    #[display("succeeded")]
    Succeeded,
    /// The shell answered with the command's failure phrase.
    #[display("rejected by the peer")]
    Rejected,
    #[display("control shell closed")]
    TransportClosed,
    #[display("no outcome before the deadline")]
    TimedOut,
}

impl CommandOutcome {
    /// Boolean view: only an explicit success phrase counts.
    #[must_use]
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn from_fault(error: &ShellError) -> Self {
        match error {
            ShellError::Timeout { .. } => Self::TimedOut,
            _ => Self::TransportClosed,
        }
    }
}

/// A long-lived interactive control shell driven line by line.
///
/// Commands are strictly FIFO: every [`send`](Self::send) is paired with an await
/// on the shell's prompt marker, so a response is always attributed to the command
/// that preceded it.
pub struct ControlProcess {
    label: &'static str,
    prompt_marker: String,
    transport: Box<dyn ShellTransport>,
    timings: ShellTimings,
    buffer: String,
    before: String,
    closed: bool,
}

impl std::fmt::Debug for ControlProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlProcess")
            .field("label", &self.label)
            .field("prompt_marker", &self.prompt_marker)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ControlProcess {
    /// Spawns a shell and consumes its startup banner.
    ///
    /// A missing startup prompt is tolerated; a shell that exits immediately is not.
    #[instrument(skip(launcher, prompt_marker, timings), level = "debug")]
    pub async fn spawn(
        launcher: &dyn ShellLauncher,
        label: &'static str,
        program: &str,
        prompt_marker: impl Into<String>,
        timings: ShellTimings,
    ) -> Result<Self, ShellError> {
        let transport = launcher.spawn(program).await?;
        let mut process = Self::from_transport(label, transport, prompt_marker, timings);

        let marker = process.prompt_marker.clone();
        match process
            .await_one_of(&[marker.as_str()], timings.startup_timeout())
            .await
        {
            Ok(Expectation::Matched(_)) => {}
            Ok(Expectation::EndOfStream) => return Err(ShellError::EndOfStream),
            Err(ShellError::Timeout { .. }) => {
                debug!(label, "no startup prompt observed; continuing");
            }
            Err(error) => return Err(error),
        }
        Ok(process)
    }

    pub(crate) fn from_transport(
        label: &'static str,
        transport: Box<dyn ShellTransport>,
        prompt_marker: impl Into<String>,
        timings: ShellTimings,
    ) -> Self {
        Self {
            label,
            prompt_marker: prompt_marker.into(),
            transport,
            timings,
            buffer: String::new(),
            before: String::new(),
            closed: false,
        }
    }

    /// Marker that confirms the shell has answered a command.
    #[must_use]
    pub fn prompt_marker(&self) -> &str {
        &self.prompt_marker
    }

    /// Replaces the prompt marker, for shells whose prompt follows the
    /// connected device.
    pub fn set_prompt_marker(&mut self, marker: impl Into<String>) {
        self.prompt_marker = marker.into();
        debug!(shell = self.label, marker = %self.prompt_marker, "prompt marker changed");
    }

    /// Sends a command and waits for the prompt marker that closes its response.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::EndOfStream`] if the shell closes before answering, or
    /// a timeout/IO error. All of them are fatal to this session.
    #[instrument(skip(self), level = "debug", fields(shell = self.label, command = command.name()))]
    pub async fn send(&mut self, command: &ShellCommand) -> Result<(), ShellError> {
        self.write(command).await?;
        let marker = self.prompt_marker.clone();
        let deadline = self.timings.deadline_for(command);
        match self.await_one_of(&[marker.as_str()], deadline).await? {
            Expectation::Matched(_) => Ok(()),
            Expectation::EndOfStream => Err(ShellError::EndOfStream),
        }
    }

    /// Sends a targeted command and classifies the phrase that follows its prompt.
    ///
    /// Faults are logged and folded into the outcome, never returned.
    #[instrument(skip(self), level = "debug", fields(shell = self.label, command = command.name()))]
    pub async fn run_targeted(&mut self, command: &ShellCommand) -> CommandOutcome {
        let Some(markers) = command.outcome_markers() else {
            return match self.send(command).await {
                Ok(()) => CommandOutcome::Succeeded,
                Err(error) => {
                    warn!(%error, "control command failed");
                    CommandOutcome::from_fault(&error)
                }
            };
        };

        if let Err(error) = self.send(command).await {
            warn!(%error, "control command failed");
            return CommandOutcome::from_fault(&error);
        }

        let deadline = self.timings.deadline_for(command);
        let outcome = match self.await_one_of(&markers.ordered(), deadline).await {
            Ok(Expectation::Matched(SUCCESS_INDEX)) => CommandOutcome::Succeeded,
            Ok(Expectation::Matched(_)) => CommandOutcome::Rejected,
            Ok(Expectation::EndOfStream) => CommandOutcome::TransportClosed,
            Err(error) => {
                warn!(%error, "no outcome for control command");
                CommandOutcome::from_fault(&error)
            }
        };
        debug!(%outcome, "control command finished");
        outcome
    }

    /// Waits until one of `markers` appears in the output or the stream ends.
    ///
    /// On a match, everything before it becomes the buffered output and the match
    /// itself is consumed. The earliest match in the stream wins; ties go to the
    /// marker listed first.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Timeout`] when nothing matches within `timeout`, or
    /// [`ShellError::Read`] when the channel fails.
    pub async fn await_one_of(
        &mut self,
        markers: &[&str],
        timeout: Duration,
    ) -> Result<Expectation, ShellError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((index, start, end)) = earliest_match(&self.buffer, markers) {
                self.before = self.buffer[..start].to_string();
                self.buffer.drain(..end);
                trace!(shell = self.label, index, "marker matched");
                return Ok(Expectation::Matched(index));
            }
            if self.closed {
                self.before = std::mem::take(&mut self.buffer);
                return Ok(Expectation::EndOfStream);
            }

            match timeout_at(deadline, self.transport.read_chunk()).await {
                Err(_elapsed) => {
                    return Err(ShellError::Timeout {
                        expected: markers.join(" | "),
                        timeout,
                    });
                }
                Ok(Err(source)) => return Err(ShellError::Read(source)),
                Ok(Ok(None)) => {
                    debug!(shell = self.label, "control shell reached end of stream");
                    self.closed = true;
                }
                Ok(Ok(Some(chunk))) => {
                    trace!(shell = self.label, bytes = chunk.len(), "read shell output");
                    self.buffer.push_str(&chunk);
                }
            }
        }
    }

    /// Output that preceded the last matched marker, split into lines.
    #[must_use]
    pub fn read_buffered_output(&self) -> Vec<String> {
        split_lines(&self.before)
    }

    /// Kills the shell and waits for it to exit.
    #[instrument(skip(self), level = "debug", fields(shell = self.label))]
    pub async fn terminate(mut self) {
        if let Err(error) = self.transport.terminate().await {
            warn!(%error, "failed to terminate control shell cleanly");
        }
    }

    async fn write(&mut self, command: &ShellCommand) -> Result<(), ShellError> {
        let line = command.to_string();
        self.transport
            .write_line(&line)
            .await
            .map_err(|source| ShellError::Write {
                command: command.name().to_string(),
                source,
            })
    }
}

/// Splits shell output on its line terminator, accepting bare `\n` too.
fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

fn earliest_match(buffer: &str, markers: &[&str]) -> Option<(usize, usize, usize)> {
    markers
        .iter()
        .enumerate()
        .filter(|(_index, marker)| !marker.is_empty())
        .filter_map(|(index, marker)| {
            buffer
                .find(marker)
                .map(|start| (index, start, start + marker.len()))
        })
        .min_by_key(|(index, start, _end)| (*start, *index))
}
