use std::io::{self, Read, Write};
use std::process::Stdio;

use async_trait::async_trait;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::error::ShellError;

const READ_CHUNK_SIZE: usize = 4096;
const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 200;
const EIO: i32 = 5;

/// Byte-level channel to one running control shell.
#[async_trait]
pub trait ShellTransport: Send {
    /// Writes one command line, appending the line terminator.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Reads the next available chunk of output; `None` at end of stream.
    async fn read_chunk(&mut self) -> io::Result<Option<String>>;

    /// Stops the shell and releases its resources.
    async fn terminate(&mut self) -> io::Result<()>;
}

/// Starts control shells and satisfies their host preconditions.
#[async_trait]
pub trait ShellLauncher: Send + Sync {
    /// Ensures the host radio is unblocked. Safe to call any number of times.
    async fn unblock_radio(&self) -> Result<(), ShellError>;

    /// Spawns a fresh interactive shell.
    async fn spawn(&self, program: &str) -> Result<Box<dyn ShellTransport>, ShellError>;
}

/// Launcher backed by real child processes: `rfkill` for the radio and the
/// control shell on its own pseudo-terminal.
#[derive(Debug, Default)]
pub(crate) struct SystemShellLauncher;

#[async_trait]
impl ShellLauncher for SystemShellLauncher {
    #[instrument(skip(self), level = "debug")]
    async fn unblock_radio(&self) -> Result<(), ShellError> {
        let status = Command::new("rfkill")
            .args(["unblock", "bluetooth"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(ShellError::RadioUnblock)?;
        if !status.success() {
            return Err(ShellError::RadioUnblockStatus {
                status: status.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn spawn(&self, program: &str) -> Result<Box<dyn ShellTransport>, ShellError> {
        let pty_error = |source: anyhow::Error| ShellError::Pty {
            program: program.to_string(),
            source,
        };
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let mut command = CommandBuilder::new(program);
        for (key, value) in std::env::vars() {
            command.env(key, value);
        }
        let child = pair.slave.spawn_command(command).map_err(pty_error)?;
        drop(pair.slave);
        let writer = pair.master.take_writer().map_err(pty_error)?;
        let reader = pair.master.try_clone_reader().map_err(pty_error)?;
        debug!(pid = ?child.process_id(), "spawned control shell on a pty");

        let (sender, output) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || pump_output(reader, &sender));

        Ok(Box::new(PtyShellTransport {
            child: Some(child),
            _master: pair.master,
            writer,
            output,
            pending: Vec::new(),
        }))
    }
}

/// Transport over a pseudo-terminal, so line-editing shells keep their
/// interactive prompt.
struct PtyShellTransport {
    child: Option<Box<dyn Child + Send + Sync>>,
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    output: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
}

impl std::fmt::Debug for PtyShellTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyShellTransport")
            .field("running", &self.child.is_some())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ShellTransport for PtyShellTransport {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        // Command lines are short enough for the pty buffer to absorb.
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.output.recv().await {
                Some(Ok(bytes)) => {
                    self.pending.extend_from_slice(&bytes);
                    let decoded = take_utf8_prefix(&mut self.pending);
                    if !decoded.is_empty() {
                        return Ok(Some(decoded));
                    }
                }
                Some(Err(error)) => return Err(error),
                None => {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    let tail = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    return Ok(Some(tail));
                }
            }
        }
    }

    async fn terminate(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(io::Error::other)??;
        debug!(?status, "control shell exited");
        Ok(())
    }
}

impl Drop for PtyShellTransport {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut()
            && let Err(error) = child.kill()
        {
            debug!(%error, "control shell was already gone");
        }
    }
}

/// Forwards pty output until the shell side closes.
fn pump_output(
    mut reader: Box<dyn Read + Send>,
    sender: &mpsc::UnboundedSender<io::Result<Vec<u8>>>,
) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let forwarded = match reader.read(&mut chunk) {
            Ok(0) => return,
            Ok(read) => sender.send(Ok(chunk[..read].to_vec())),
            // Linux reports EIO on the master once the last slave handle closes.
            Err(error) if error.raw_os_error() == Some(EIO) => return,
            Err(error) => {
                let _ = sender.send(Err(error));
                return;
            }
        };
        if forwarded.is_err() {
            return;
        }
    }
}

/// Drains the longest decodable prefix, leaving a split code point buffered.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(error) if error.error_len().is_none() => {
            let valid = error.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_error) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}
