use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::config::ShellTimings;
use crate::decoder::{PollOutcome, StreamDecoder, clean};
use crate::error::ShellError;
use crate::shell::{CommandOutcome, ControlProcess, ShellCommand, ShellLauncher};

const CHARACTERISTIC_MARKER: &str = "Characteristic";

/// A characteristic as listed by `list-attributes`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Characteristic {
    name: String,
    uuid: String,
}

impl Characteristic {
    #[must_use]
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
        }
    }

    /// Object path or descriptive name from the line after the marker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

/// Characteristics in listing order.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CharacteristicTable {
    entries: Vec<Characteristic>,
    truncated: bool,
}

impl CharacteristicTable {
    #[must_use]
    pub fn entries(&self) -> &[Characteristic] {
        &self.entries
    }

    #[must_use]
    pub fn first(&self) -> Option<&Characteristic> {
        self.entries.first()
    }

    /// Whether the listing ended inside a marker/name/uuid triple.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the characteristic table from cleaned attribute lines.
///
/// Each `Characteristic` line contributes the two lines that follow it as name and
/// UUID. A marker too close to the end of the listing is dropped and flags the
/// table as truncated.
#[must_use]
pub fn resolve_characteristics(lines: &[String]) -> CharacteristicTable {
    let mut table = CharacteristicTable::default();
    for (index, line) in lines.iter().enumerate() {
        if line.trim() != CHARACTERISTIC_MARKER {
            continue;
        }
        match (lines.get(index + 1), lines.get(index + 2)) {
            (Some(name), Some(uuid)) => table
                .entries
                .push(Characteristic::new(name.trim(), uuid.trim())),
            _ => table.truncated = true,
        }
    }
    table
}

/// The second control shell, driven inside its GATT sub-menu.
///
/// Its prompt carries the connected device's name, so that name is the marker
/// confirming every response.
#[derive(Debug)]
pub struct GattSession {
    shell: ControlProcess,
    decoder: StreamDecoder,
    in_menu: bool,
}

impl GattSession {
    /// Unblocks the radio and spawns a shell bound to the connected device.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be unblocked or the shell cannot start.
    #[instrument(skip(launcher, timings, decoder), level = "debug")]
    pub async fn spawn(
        launcher: &dyn ShellLauncher,
        program: &str,
        device_name: &str,
        timings: ShellTimings,
        decoder: StreamDecoder,
    ) -> Result<Self, ShellError> {
        launcher.unblock_radio().await?;
        let shell = ControlProcess::spawn(launcher, "gatt", program, device_name, timings).await?;
        Ok(Self {
            shell,
            decoder,
            in_menu: false,
        })
    }

    /// Enters the GATT sub-menu.
    pub async fn enter_menu(&mut self) -> bool {
        let entered = self.send_logged(ShellCommand::MenuGatt).await;
        self.in_menu |= entered;
        entered
    }

    /// Raw attribute listing, cleaned of styling.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_attributes(&mut self) -> Vec<String> {
        if !self.send_logged(ShellCommand::ListAttributes).await {
            return Vec::new();
        }
        self.cleaned_output()
    }

    pub async fn select_attribute(&mut self, uuid: &str) -> bool {
        self.send_logged(ShellCommand::SelectAttribute(uuid.to_string()))
            .await
    }

    pub async fn enable_notify(&mut self) -> bool {
        self.send_logged(ShellCommand::NotifyOn).await
    }

    /// Flushes the next buffered notification and decodes it.
    ///
    /// # Errors
    ///
    /// Any error is a transport fault and ends the stream.
    pub async fn poll(&mut self) -> Result<PollOutcome, ShellError> {
        self.shell.send(&ShellCommand::Poll).await?;
        let lines = self.cleaned_output();
        let outcome = self.decoder.decode(&lines);
        if outcome == PollOutcome::Invalid {
            trace!(lines = lines.len(), "skipping non-frame response");
        }
        Ok(outcome)
    }

    /// Leaves the GATT sub-menu.
    pub async fn exit_menu(&mut self) -> bool {
        let left = self.send_logged(ShellCommand::Back).await;
        if left {
            self.in_menu = false;
        }
        left
    }

    #[must_use]
    pub fn in_menu(&self) -> bool {
        self.in_menu
    }

    /// Disconnects whichever device this shell is attached to.
    pub async fn disconnect_current(&mut self) -> CommandOutcome {
        self.shell
            .run_targeted(&ShellCommand::DisconnectCurrent)
            .await
    }

    pub async fn terminate(self) {
        self.shell.terminate().await;
    }

    fn cleaned_output(&self) -> Vec<String> {
        self.shell
            .read_buffered_output()
            .iter()
            .map(|line| clean(line))
            .collect()
    }

    async fn send_logged(&mut self, command: ShellCommand) -> bool {
        match self.shell.send(&command).await {
            Ok(()) => {
                debug!(command = command.name(), "gatt command confirmed");
                true
            }
            Err(error) => {
                warn!(%error, command = command.name(), "gatt command failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::shell::fake::FAKE_CHARACTERISTIC_UUID;
    use crate::shell::{FakeShellConfig, FakeShellLauncher};

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|line| (*line).to_string()).collect()
    }

    #[test]
    fn resolves_characteristic_triples_in_order() {
        let listing = lines(&[
            "Primary Service",
            "/org/bluez/hci0/dev_AA/service000c",
            "0000ffe0-0000-1000-8000-00805f9b34fb",
            "Characteristic",
            "/org/bluez/hci0/dev_AA/service000c/char000d",
            "0000ffe1-0000-1000-8000-00805f9b34fb",
            " Characteristic ",
            "/org/bluez/hci0/dev_AA/service000c/char0010",
            "0000ffe2-0000-1000-8000-00805f9b34fb",
        ]);

        let table = resolve_characteristics(&listing);

        assert_eq!(2, table.entries().len());
        assert_eq!(
            Some("0000ffe1-0000-1000-8000-00805f9b34fb"),
            table.first().map(Characteristic::uuid)
        );
        assert!(!table.is_truncated());
    }

    #[rstest]
    #[case::marker_last(&["Characteristic"])]
    #[case::missing_uuid(&["Characteristic", "/org/bluez/hci0/dev_AA/service000c/char000d"])]
    fn truncated_tail_is_flagged_not_fatal(#[case] listing: &[&str]) {
        let table = resolve_characteristics(&lines(listing));

        assert!(table.is_empty());
        assert!(table.is_truncated());
    }

    #[tokio::test]
    async fn subscribed_session_decodes_frames_until_shell_closes() -> anyhow::Result<()> {
        let launcher = FakeShellLauncher::new(
            FakeShellConfig::builder()
                .devices("AA:BB:CC:DD:EE:FF|WaWiCo".parse()?)
                .frames("0a1b2c3d4e5f6071".parse()?)
                .build(),
        );
        let mut pairing = launcher.spawn("bluetoothctl").await?;
        pairing.write_line("connect AA:BB:CC:DD:EE:FF").await?;

        let mut session = GattSession::spawn(
            &launcher,
            "bluetoothctl",
            "WaWiCo",
            ShellTimings::default(),
            StreamDecoder::default(),
        )
        .await?;
        assert!(session.enter_menu().await);
        let table = resolve_characteristics(&session.list_attributes().await);
        let uuid = table
            .first()
            .map(|characteristic| characteristic.uuid().to_string())
            .expect("fake listing should carry one characteristic");
        assert_eq!(FAKE_CHARACTERISTIC_UUID, uuid);
        assert!(session.select_attribute(&uuid).await);
        assert!(session.enable_notify().await);

        assert_matches!(session.poll().await?, PollOutcome::Frame(frame) => {
            assert_eq!("0a1b2c3d4e5f6071", frame.payload());
        });
        assert_matches!(session.poll().await, Err(ShellError::EndOfStream));
        session.terminate().await;
        Ok(())
    }

    #[tokio::test]
    async fn poll_before_notify_is_invalid() -> anyhow::Result<()> {
        let launcher = FakeShellLauncher::new(
            FakeShellConfig::builder()
                .devices("AA:BB:CC:DD:EE:FF|WaWiCo".parse()?)
                .build(),
        );
        let mut session = GattSession::spawn(
            &launcher,
            "bluetoothctl",
            "bluetooth",
            ShellTimings::default(),
            StreamDecoder::default(),
        )
        .await?;

        assert_eq!(PollOutcome::Invalid, session.poll().await?);
        assert_eq!(1, launcher.radio_unblocks());
        session.terminate().await;
        Ok(())
    }
}
