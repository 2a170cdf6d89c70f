use std::fmt::{self, Display, Formatter};

use crate::registry::DeviceSet;

use super::painter::{Painter, Tone};
use super::table::Table;

/// Renders every known device with its bond state.
pub(crate) struct DeviceSetView<'a> {
    devices: &'a DeviceSet,
    painter: &'a Painter,
}

impl<'a> DeviceSetView<'a> {
    pub(crate) fn new(devices: &'a DeviceSet, painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for DeviceSetView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = Table::with_header(["name", "address", "state"]);
        for device in self.devices.available() {
            let state = if self.devices.is_paired(device) {
                self.painter.paint("paired", Tone::Good)
            } else {
                self.painter.dim("discoverable")
            };
            table.push_row(vec![
                self.painter.emphasis(device.name()),
                device.mac_address().to_string(),
                state,
            ]);
        }
        for device in self
            .devices
            .paired()
            .iter()
            .filter(|device| !self.devices.available().contains(device))
        {
            table.push_row(vec![
                self.painter.emphasis(device.name()),
                device.mac_address().to_string(),
                self.painter.paint("paired, not seen", Tone::Bad),
            ]);
        }

        write!(f, "{}", self.painter.heading("Devices:"))?;
        if table.is_empty() {
            return write!(f, " {}", self.painter.dim("none found"));
        }
        write!(f, "\n{table}")
    }
}

/// Renders the raw `info` lines for one address.
pub(crate) struct DeviceInfoView<'a> {
    address: &'a str,
    lines: &'a [String],
    painter: &'a Painter,
}

impl<'a> DeviceInfoView<'a> {
    pub(crate) fn new(address: &'a str, lines: &'a [String], painter: &'a Painter) -> Self {
        Self {
            address,
            lines,
            painter,
        }
    }
}

impl Display for DeviceInfoView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.painter.heading("Device info:"),
            self.painter.emphasis(self.address)
        )?;
        for line in self.lines {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}
