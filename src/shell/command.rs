use std::str::FromStr;

/// A line-oriented command understood by the control shell.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display)]
pub enum ShellCommand {
    #[display("default-agent")]
    DefaultAgent,
    #[display("agent on")]
    AgentOn,
    #[display("discoverable on")]
    DiscoverableOn,
    #[display("scan on")]
    ScanOn,
    #[display("devices")]
    Devices,
    #[display("paired-devices")]
    PairedDevices,
    #[display("info {_0}")]
    Info(String),
    #[display("pair {_0}")]
    Pair(String),
    #[display("trust {_0}")]
    Trust(String),
    #[display("remove {_0}")]
    Remove(String),
    #[display("connect {_0}")]
    Connect(String),
    #[display("disconnect {_0}")]
    Disconnect(String),
    /// Disconnects whichever device the shell is currently attached to.
    #[display("disconnect")]
    DisconnectCurrent,
    #[display("menu gatt")]
    MenuGatt,
    #[display("list-attributes")]
    ListAttributes,
    #[display("select-attribute {_0}")]
    SelectAttribute(String),
    #[display("notify on")]
    NotifyOn,
    /// Empty line; flushes the next buffered notification.
    #[display("")]
    Poll,
    #[display("back")]
    Back,
}

impl ShellCommand {
    /// Short label used in logs and spans.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefaultAgent => "default-agent",
            Self::AgentOn => "agent",
            Self::DiscoverableOn => "discoverable",
            Self::ScanOn => "scan",
            Self::Devices => "devices",
            Self::PairedDevices => "paired-devices",
            Self::Info(_) => "info",
            Self::Pair(_) => "pair",
            Self::Trust(_) => "trust",
            Self::Remove(_) => "remove",
            Self::Connect(_) => "connect",
            Self::Disconnect(_) | Self::DisconnectCurrent => "disconnect",
            Self::MenuGatt => "menu",
            Self::ListAttributes => "list-attributes",
            Self::SelectAttribute(_) => "select-attribute",
            Self::NotifyOn => "notify",
            Self::Poll => "poll",
            Self::Back => "back",
        }
    }

    /// Outcome phrases for commands whose result arrives after the prompt.
    #[must_use]
    pub fn outcome_markers(&self) -> Option<OutcomeMarkers> {
        let markers = match self {
            Self::Pair(_) => OutcomeMarkers::new("Failed to pair", "Pairing successful"),
            Self::Trust(_) => OutcomeMarkers::new("Failed to trust", "trust succeeded"),
            Self::Remove(_) => OutcomeMarkers::new("not available", "Device has been removed"),
            Self::Connect(_) => OutcomeMarkers::new("Failed to connect", "Connection successful"),
            Self::Disconnect(_) | Self::DisconnectCurrent => {
                OutcomeMarkers::new("Failed to disconnect", "Successful disconnected")
            }
            _ => return None,
        };
        Some(markers)
    }
}

/// Unrecognised command text.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unrecognised control command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for ShellCommand {
    type Err = UnknownCommand;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, argument)) => (verb, Some(argument.trim().to_string())),
            None => (line, None),
        };

        let command = match (verb, argument) {
            ("", None) => Self::Poll,
            ("default-agent", None) => Self::DefaultAgent,
            ("agent", Some(arg)) if arg == "on" => Self::AgentOn,
            ("discoverable", Some(arg)) if arg == "on" => Self::DiscoverableOn,
            ("scan", Some(arg)) if arg == "on" => Self::ScanOn,
            ("devices", None) => Self::Devices,
            ("paired-devices", None) => Self::PairedDevices,
            ("info", Some(address)) => Self::Info(address),
            ("pair", Some(address)) => Self::Pair(address),
            ("trust", Some(address)) => Self::Trust(address),
            ("remove", Some(address)) => Self::Remove(address),
            ("connect", Some(address)) => Self::Connect(address),
            ("disconnect", Some(address)) => Self::Disconnect(address),
            ("disconnect", None) => Self::DisconnectCurrent,
            ("menu", Some(arg)) if arg == "gatt" => Self::MenuGatt,
            ("list-attributes", None) => Self::ListAttributes,
            ("select-attribute", Some(uuid)) => Self::SelectAttribute(uuid),
            ("notify", Some(arg)) if arg == "on" => Self::NotifyOn,
            ("back", None) => Self::Back,
            _ => return Err(UnknownCommand(line.to_string())),
        };
        Ok(command)
    }
}

/// Failure and success phrases awaited after a targeted command.
///
/// Awaited in `[failure, success]` order, so a match at [`SUCCESS_INDEX`] is the
/// only successful outcome.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OutcomeMarkers {
    failure: &'static str,
    success: &'static str,
}

/// Position of the success phrase in [`OutcomeMarkers::ordered`].
pub const SUCCESS_INDEX: usize = 1;

impl OutcomeMarkers {
    const fn new(failure: &'static str, success: &'static str) -> Self {
        Self { failure, success }
    }

    #[must_use]
    pub fn ordered(&self) -> [&'static str; 2] {
        [self.failure, self.success]
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ShellCommand::AgentOn, "agent on")]
    #[case(ShellCommand::Pair("AA:BB:CC:DD:EE:FF".into()), "pair AA:BB:CC:DD:EE:FF")]
    #[case(ShellCommand::DisconnectCurrent, "disconnect")]
    #[case(ShellCommand::SelectAttribute("0000ffe1-0000-1000-8000-00805f9b34fb".into()), "select-attribute 0000ffe1-0000-1000-8000-00805f9b34fb")]
    #[case(ShellCommand::Poll, "")]
    fn command_text_round_trips_through_parse(#[case] command: ShellCommand, #[case] text: &str) {
        assert_eq!(text, command.to_string());
        assert_eq!(Ok(command), text.parse::<ShellCommand>());
    }

    #[test]
    fn parse_rejects_unknown_verbs() {
        assert_matches!("power on".parse::<ShellCommand>(), Err(UnknownCommand(text)) if text == "power on");
    }

    #[test]
    fn only_targeted_commands_carry_outcome_markers() {
        assert_eq!(None, ShellCommand::Devices.outcome_markers());
        let markers = ShellCommand::Connect("AA:BB:CC:DD:EE:FF".into())
            .outcome_markers()
            .expect("connect should await an outcome");
        assert_eq!("Connection successful", markers.ordered()[SUCCESS_INDEX]);
    }
}
