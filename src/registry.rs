use serde::Serialize;
use tracing::{error, instrument, trace};

use crate::shell::{ControlProcess, ShellCommand};

/// Substrings that mark a listing line as a notification rather than a record.
const NOISE_MARKERS: [&str; 2] = ["[\x1b[0;", "removed"];
const DEVICE_TOKEN: &str = "Device";

/// A peripheral as reported by the control shell's device listings.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct Device {
    name: String,
    mac_address: String,
}

impl Device {
    /// Creates a device record.
    #[must_use]
    pub fn new(name: impl Into<String>, mac_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac_address: mac_address.into(),
        }
    }

    /// Returns the advertised name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the colon-separated address.
    #[must_use]
    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }
}

/// Devices seen by a scan alongside those already bonded.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct DeviceSet {
    available: Vec<Device>,
    paired: Vec<Device>,
}

impl DeviceSet {
    #[must_use]
    pub fn new(available: Vec<Device>, paired: Vec<Device>) -> Self {
        Self { available, paired }
    }

    #[must_use]
    pub fn available(&self) -> &[Device] {
        &self.available
    }

    #[must_use]
    pub fn paired(&self) -> &[Device] {
        &self.paired
    }

    /// Available devices that are not paired, in scan order.
    #[must_use]
    pub fn discoverable(&self) -> Vec<Device> {
        self.available
            .iter()
            .filter(|device| !self.paired.contains(device))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_paired(&self, device: &Device) -> bool {
        self.paired.contains(device)
    }
}

/// Parses one listing line of the form `... Device <address> <name>`.
///
/// Returns `None` for notification noise, lines without a device record, and
/// records whose address is not six colon-separated octets.
#[must_use]
pub fn parse_device_line(line: &str) -> Option<Device> {
    if NOISE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return None;
    }

    let position = line.find(DEVICE_TOKEN)?;
    let mut fields = line[position..].splitn(3, ' ');
    let _marker = fields.next()?;
    let address = fields.next()?;
    let name = fields.next()?.trim_end();
    if !is_mac_address(address) || name.is_empty() {
        return None;
    }

    Some(Device::new(name, address))
}

/// Returns whether `value` is six colon-separated hexadecimal octets.
#[must_use]
pub fn is_mac_address(value: &str) -> bool {
    let octets: Vec<&str> = value.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_device_listing(lines: &[String]) -> Vec<Device> {
    lines
        .iter()
        .filter_map(|line| parse_device_line(line))
        .collect()
}

/// Device listings issued against a pairing shell.
///
/// Listing failures are logged and yield an empty list so that one bad command
/// never aborts discovery.
#[derive(Debug)]
pub struct DeviceRegistry<'a> {
    shell: &'a mut ControlProcess,
}

impl<'a> DeviceRegistry<'a> {
    pub(crate) fn new(shell: &'a mut ControlProcess) -> Self {
        Self { shell }
    }

    /// Devices seen by the scan, paired or not.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_available(&mut self) -> Vec<Device> {
        self.list(ShellCommand::Devices).await
    }

    /// Devices with an existing bond.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_paired(&mut self) -> Vec<Device> {
        self.list(ShellCommand::PairedDevices).await
    }

    /// Available devices minus paired devices.
    pub async fn list_discoverable(&mut self) -> Vec<Device> {
        self.snapshot().await.discoverable()
    }

    /// Lists both sets in one pass.
    pub async fn snapshot(&mut self) -> DeviceSet {
        let available = self.list_available().await;
        let paired = self.list_paired().await;
        DeviceSet::new(available, paired)
    }

    async fn list(&mut self, command: ShellCommand) -> Vec<Device> {
        if let Err(error) = self.shell.send(&command).await {
            error!(%error, command = command.name(), "device listing failed");
            return Vec::new();
        }
        let devices = parse_device_listing(&self.shell.read_buffered_output());
        trace!(count = devices.len(), "parsed device listing");
        devices
    }
}
