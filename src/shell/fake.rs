use std::collections::VecDeque;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::command::ShellCommand;
use super::transport::{ShellLauncher, ShellTransport};
use crate::error::{FixtureError, ShellError};
use crate::registry::{Device, is_mac_address};

pub(crate) const FAKE_SERVICE_UUID: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";
pub(crate) const FAKE_CHARACTERISTIC_UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";
const IDLE_PROMPT_NAME: &str = "bluetooth";
const DEFAULT_FRAMES: [[u8; 8]; 3] = [
    [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71],
    [0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70],
    [0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88],
];

/// Parsed fake device records (`address|name;...`).
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct DeviceFixture {
    devices: Vec<Device>,
}

impl FromStr for DeviceFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }
        let devices = value
            .split(';')
            .map(parse_device_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { devices })
    }
}

/// Parsed fake notification payloads (comma-separated hex).
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct FramePayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for FramePayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self {
                payloads: Vec::new(),
            });
        }
        let payloads = value
            .split(',')
            .map(|payload| {
                let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                hex::decode(compact)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { payloads })
    }
}

/// Settings for a simulated control shell.
#[derive(Debug, Builder)]
pub(crate) struct FakeShellConfig {
    devices: DeviceFixture,
    paired: Option<DeviceFixture>,
    frames: Option<FramePayloads>,
    #[builder(default)]
    connect_fails: bool,
    /// Answers every other poll with a non-frame response.
    #[builder(default)]
    noisy_polls: bool,
    poll_delay: Option<Duration>,
    #[builder(default)]
    radio_blocked: bool,
}

/// Launcher whose shells answer like `bluetoothctl`, backed by fixtures.
///
/// All shells spawned from one launcher share a simulated adapter, so a
/// connection made in the pairing shell is visible to the GATT shell.
#[derive(Debug, Clone)]
pub struct FakeShellLauncher {
    world: Arc<Mutex<FakeWorld>>,
}

impl FakeShellLauncher {
    pub(crate) fn new(config: FakeShellConfig) -> Self {
        let FakeShellConfig {
            devices,
            paired,
            frames,
            connect_fails,
            noisy_polls,
            poll_delay,
            radio_blocked,
        } = config;
        let frames: Vec<Vec<u8>> = frames.map_or_else(
            || DEFAULT_FRAMES.iter().map(|frame| frame.to_vec()).collect(),
            Into::into,
        );

        Self {
            world: Arc::new(Mutex::new(FakeWorld {
                available: devices.into(),
                paired: paired.map(Into::into).unwrap_or_default(),
                frames: frames.into(),
                connect_fails,
                noisy_polls,
                poll_delay,
                radio_blocked,
                connected: None,
                radio_unblocks: 0,
                transcript: Vec::new(),
                spawned: 0,
            })),
        }
    }

    /// Lines written to the `index`-th spawned shell, in order.
    #[must_use]
    pub fn commands(&self, index: usize) -> Vec<String> {
        lock(&self.world)
            .transcript
            .iter()
            .filter(|(shell, _line)| *shell == index)
            .map(|(_shell, line)| line.clone())
            .collect()
    }

    /// Number of shells spawned so far.
    #[must_use]
    pub fn spawned(&self) -> usize {
        lock(&self.world).spawned
    }

    /// Number of radio-unblock requests received.
    #[must_use]
    pub fn radio_unblocks(&self) -> usize {
        lock(&self.world).radio_unblocks
    }

    /// Device the simulated adapter is connected to.
    #[must_use]
    pub fn connected(&self) -> Option<Device> {
        lock(&self.world).connected.clone()
    }
}

#[async_trait]
impl ShellLauncher for FakeShellLauncher {
    async fn unblock_radio(&self) -> Result<(), ShellError> {
        let mut world = lock(&self.world);
        world.radio_unblocks += 1;
        if world.radio_blocked {
            return Err(ShellError::RadioUnblockStatus {
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    async fn spawn(&self, program: &str) -> Result<Box<dyn ShellTransport>, ShellError> {
        let mut world = lock(&self.world);
        let index = world.spawned;
        world.spawned += 1;
        info!(program, index, "spawning fake control shell");

        let banner = format!("Agent registered\r\n{}", world.prompt());
        Ok(Box::new(FakeShellTransport {
            index,
            world: Arc::clone(&self.world),
            pending: VecDeque::from([FakeChunk::now(banner)]),
            closed: false,
            selected: None,
            notifying: false,
            polls: 0,
        }))
    }
}

#[derive(Debug)]
struct FakeWorld {
    available: Vec<Device>,
    paired: Vec<Device>,
    frames: VecDeque<Vec<u8>>,
    connect_fails: bool,
    noisy_polls: bool,
    poll_delay: Option<Duration>,
    radio_blocked: bool,
    connected: Option<Device>,
    radio_unblocks: usize,
    transcript: Vec<(usize, String)>,
    spawned: usize,
}

impl FakeWorld {
    fn prompt(&self) -> String {
        let name = self
            .connected
            .as_ref()
            .map_or(IDLE_PROMPT_NAME, Device::name);
        format!("[{name}]# ")
    }

    fn known(&self, address: &str) -> Option<Device> {
        self.available
            .iter()
            .find(|device| device.mac_address() == address)
            .cloned()
    }
}

/// Output the fake shell releases no earlier than `ready_at`.
#[derive(Debug)]
struct FakeChunk {
    text: String,
    ready_at: Option<Instant>,
}

impl FakeChunk {
    fn now(text: String) -> Self {
        Self {
            text,
            ready_at: None,
        }
    }
}

#[derive(Debug)]
struct FakeShellTransport {
    index: usize,
    world: Arc<Mutex<FakeWorld>>,
    pending: VecDeque<FakeChunk>,
    closed: bool,
    selected: Option<String>,
    notifying: bool,
    polls: usize,
}

#[async_trait]
impl ShellTransport for FakeShellTransport {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let world = Arc::clone(&self.world);
        let mut world = lock(&world);
        world.transcript.push((self.index, line.to_string()));
        if self.closed {
            return Ok(());
        }

        let command = line.parse::<ShellCommand>();
        let ready_at = match (&command, world.poll_delay) {
            (Ok(ShellCommand::Poll), Some(delay)) => Some(Instant::now() + delay),
            _ => None,
        };
        let response = match command {
            Ok(command) => self.respond(&mut world, command),
            Err(error) => {
                debug!(%error, "fake shell received unknown command");
                Some(format!("\r\nInvalid command\r\n{}", world.prompt()))
            }
        };
        match response {
            Some(text) => self.pending.push_back(FakeChunk { text, ready_at }),
            None => self.closed = true,
        }
        Ok(())
    }

    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        if let Some(ready_at) = self.pending.front().and_then(|chunk| chunk.ready_at) {
            sleep_until(ready_at).await;
        }
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk.text));
        }
        if self.closed {
            return Ok(None);
        }
        // A silent shell; callers bound this with their own deadline.
        std::future::pending().await
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}

impl FakeShellTransport {
    /// Renders the shell's answer; `None` closes the stream.
    fn respond(&mut self, world: &mut FakeWorld, command: ShellCommand) -> Option<String> {
        let prompt = world.prompt();
        let text = match command {
            ShellCommand::AgentOn => format!("\r\nAgent is already registered\r\n{prompt}"),
            ShellCommand::DefaultAgent => {
                format!("\r\nDefault agent request successful\r\n{prompt}")
            }
            ShellCommand::DiscoverableOn => {
                format!("\r\nChanging discoverable on succeeded\r\n{prompt}")
            }
            ShellCommand::ScanOn => {
                let mut text = String::from("\r\nDiscovery started");
                for device in &world.available {
                    text.push_str(&format!(
                        "\r\n[\x1b[0;92mNEW\x1b[0m] Device {} {}",
                        device.mac_address(),
                        device.name()
                    ));
                }
                format!("{text}\r\n{prompt}")
            }
            ShellCommand::Devices => {
                let mut text = listing(&world.available);
                if let Some(device) = world.available.first() {
                    text.push_str(&format!(
                        "\r\n[\x1b[0;93mCHG\x1b[0m] Device {} RSSI: -58",
                        device.mac_address()
                    ));
                }
                format!("{text}\r\n{prompt}")
            }
            ShellCommand::PairedDevices => format!("{}\r\n{prompt}", listing(&world.paired)),
            ShellCommand::Info(address) => match world.known(&address) {
                Some(device) => format!(
                    "\r\nDevice {address} (public)\r\n\tName: {name}\r\n\tAlias: {name}\r\n\tPaired: {paired}\r\n\tConnected: {connected}\r\n{prompt}",
                    name = device.name(),
                    paired = yes_no(world.paired.contains(&device)),
                    connected = yes_no(world.connected.as_ref() == Some(&device)),
                ),
                None => format!("\r\nDevice {address} not available\r\n{prompt}"),
            },
            ShellCommand::Pair(address) => match world.known(&address) {
                Some(device) => {
                    if !world.paired.contains(&device) {
                        world.paired.push(device);
                    }
                    targeted(
                        &format!("Attempting to pair with {address}"),
                        &prompt,
                        &format!("[CHG] Device {address} Paired: yes\r\nPairing successful"),
                    )
                }
                None => targeted(
                    &format!("Device {address} not available"),
                    &prompt,
                    "Failed to pair: org.bluez.Error.DoesNotExist",
                ),
            },
            ShellCommand::Trust(address) => match world.known(&address) {
                Some(_device) => targeted(
                    &format!("[CHG] Device {address} Trusted: yes"),
                    &prompt,
                    &format!("Changing {address} trust succeeded"),
                ),
                None => targeted(
                    &format!("Device {address} not available"),
                    &prompt,
                    "Failed to trust",
                ),
            },
            ShellCommand::Remove(address) => {
                let before = world.paired.len();
                world
                    .paired
                    .retain(|device| device.mac_address() != address);
                if world.paired.len() < before {
                    targeted(
                        &format!("[DEL] Device {address}"),
                        &prompt,
                        "Device has been removed",
                    )
                } else {
                    targeted(
                        &format!("Attempting to remove {address}"),
                        &prompt,
                        &format!("Device {address} not available"),
                    )
                }
            }
            ShellCommand::Connect(address) => match world.known(&address) {
                Some(device) if !world.connect_fails => {
                    world.connected = Some(device);
                    targeted(
                        &format!("Attempting to connect to {address}"),
                        &prompt,
                        &format!("[CHG] Device {address} Connected: yes\r\nConnection successful"),
                    )
                }
                _ => targeted(
                    &format!("Attempting to connect to {address}"),
                    &prompt,
                    "Failed to connect: org.bluez.Error.Failed",
                ),
            },
            ShellCommand::Disconnect(_) | ShellCommand::DisconnectCurrent => {
                match world.connected.take() {
                    Some(device) => targeted(
                        &format!("Attempting to disconnect from {}", device.mac_address()),
                        &prompt,
                        &format!(
                            "[CHG] Device {} Connected: no\r\nSuccessful disconnected",
                            device.mac_address()
                        ),
                    ),
                    None => targeted("Device not connected", &prompt, "Failed to disconnect"),
                }
            }
            ShellCommand::MenuGatt => format!(
                "\r\nMenu gatt:\r\nAvailable commands:\r\n-------------------\r\nlist-attributes [dev/local]  List attributes\r\nselect-attribute <attribute/UUID>  Select attribute\r\nnotify <on/off>  Notify attribute value\r\nback  Return to main menu\r\n{prompt}"
            ),
            ShellCommand::ListAttributes => match &world.connected {
                Some(device) => {
                    let service = service_path(device);
                    format!(
                        "\r\nPrimary Service\r\n\t{service}\r\n\t{FAKE_SERVICE_UUID}\r\n\tUnknown\r\nCharacteristic\r\n\t{service}/char000d\r\n\t{FAKE_CHARACTERISTIC_UUID}\r\n\tUnknown\r\n{prompt}"
                    )
                }
                None => format!("\r\n{prompt}"),
            },
            ShellCommand::SelectAttribute(uuid) => {
                if uuid == FAKE_CHARACTERISTIC_UUID && world.connected.is_some() {
                    self.selected = Some(uuid);
                    format!("\r\n{prompt}")
                } else {
                    format!("\r\nNo attribute found for {uuid}\r\n{prompt}")
                }
            }
            ShellCommand::NotifyOn => match (&self.selected, &world.connected) {
                (Some(_uuid), Some(device)) => {
                    self.notifying = true;
                    format!(
                        "\r\n[CHG] Attribute {}/char000d Notifying: yes\r\nNotify started\r\n{prompt}",
                        service_path(device)
                    )
                }
                _ => format!("\r\nNo attribute selected\r\n{prompt}"),
            },
            ShellCommand::Poll => {
                if !self.notifying {
                    return Some(format!("\r\n{prompt}"));
                }
                self.polls += 1;
                if world.noisy_polls && self.polls % 2 == 1 {
                    return Some(noise(world, self.polls, &prompt));
                }
                let frame = world.frames.pop_front()?;
                let device = world.connected.as_ref()?;
                format!(
                    "[CHG] Attribute {}/char000d Value:\r\n  {}\r\n{prompt}",
                    service_path(device),
                    spaced_hex(&frame)
                )
            }
            ShellCommand::Back => format!("\r\n{prompt}"),
        };
        Some(text)
    }
}

/// A poll answer that is not a notification: an RSSI update or a bare prompt.
fn noise(world: &FakeWorld, poll: usize, prompt: &str) -> String {
    match world.connected.as_ref() {
        Some(device) if poll % 4 == 1 => format!(
            "[\x1b[0;93mCHG\x1b[0m] Device {} RSSI: -61\r\n{prompt}",
            device.mac_address()
        ),
        _ => format!("\r\n{prompt}"),
    }
}

fn targeted(lead: &str, prompt: &str, outcome: &str) -> String {
    format!("\r\n{lead}\r\n{prompt}{outcome}\r\n")
}

fn listing(devices: &[Device]) -> String {
    devices
        .iter()
        .map(|device| format!("\r\nDevice {} {}", device.mac_address(), device.name()))
        .collect()
}

fn service_path(device: &Device) -> String {
    format!(
        "/org/bluez/hci0/dev_{}/service000c",
        device.mac_address().replace(':', "_")
    )
}

fn spaced_hex(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn parse_device_record(record: &str) -> Result<Device, FixtureError> {
    let fields: Vec<&str> = record.split('|').map(str::trim).collect();
    let [address, name] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount {
            record: record.to_string(),
        });
    };
    if address.is_empty() || name.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }
    if !is_mac_address(address) {
        return Err(FixtureError::InvalidAddress {
            value: (*address).to_string(),
        });
    }
    Ok(Device::new(*name, *address))
}

fn lock(world: &Mutex<FakeWorld>) -> MutexGuard<'_, FakeWorld> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}
