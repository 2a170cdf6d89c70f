use std::sync::Arc;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Span, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::SessionConfig;
use crate::decoder::{DataFrame, PollOutcome, StreamDecoder};
use crate::error::InteractionError;
use crate::gatt::{GattSession, resolve_characteristics};
use crate::pairing::PairingController;
use crate::registry::{Device, DeviceSet};
use crate::shell::ShellLauncher;

/// Stages of one discovery-to-stream run, in order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum Stage {
    #[display("discover")]
    Discover,
    #[display("select target")]
    SelectTarget,
    #[display("evict stale bonds")]
    EvictStaleBonds,
    #[display("connect")]
    Connect,
    #[display("enter gatt")]
    EnterGatt,
    #[display("subscribe")]
    Subscribe,
    #[display("stream")]
    StreamLoop,
    #[display("disconnected")]
    Disconnected,
}

/// Progress reported to the caller while a run advances.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    DeviceFound(Device),
    Connecting(Device),
    Connected(Device),
    /// A decoded frame; `index` counts from 1.
    Frame { index: usize, frame: DataFrame },
    Disconnected(Device),
}

/// Why the stream loop ended.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStopReason {
    /// The GATT shell faulted or closed.
    #[display("device disconnected")]
    Disconnected,
    #[display("interrupted by user")]
    Interrupted,
    #[display("reached max frames ({_0})")]
    ReachedLimit(usize),
}

/// Summary returned once a run has disconnected.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StreamSummary {
    device: Device,
    frames: usize,
    stop_reason: StreamStopReason,
}

impl StreamSummary {
    pub(crate) fn new(device: Device, frames: usize, stop_reason: StreamStopReason) -> Self {
        Self {
            device,
            frames,
            stop_reason,
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of frames decoded.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub fn stop_reason(&self) -> &StreamStopReason {
        &self.stop_reason
    }
}

/// Sequences both control shells from discovery to disconnect.
///
/// The pairing shell lives for the whole run. The GATT shell is spawned only after
/// a successful connect. Both are terminated on every exit path.
pub struct Orchestrator {
    launcher: Arc<dyn ShellLauncher>,
    config: SessionConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(launcher: Arc<dyn ShellLauncher>, config: SessionConfig) -> Self {
        Self { launcher, config }
    }

    /// Scans once and lists both device sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the pairing shell cannot be started.
    #[instrument(skip(self), level = "info")]
    pub async fn survey(&self) -> Result<DeviceSet, InteractionError> {
        Span::current().pb_set_message("Scanning for devices");
        let mut pairing = self.spawn_pairing().await?;
        pairing.start_scan().await;
        sleep(self.config.discovery_interval()).await;
        let devices = pairing.registry().snapshot().await;
        pairing.terminate().await;
        Ok(devices)
    }

    /// Returns the raw `info` lines for one address.
    ///
    /// # Errors
    ///
    /// Returns an error if the pairing shell cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub async fn device_info(&self, address: &str) -> Result<Option<Vec<String>>, InteractionError> {
        let mut pairing = self.spawn_pairing().await?;
        let lines = pairing.device_info(address).await;
        pairing.terminate().await;
        Ok(lines)
    }

    /// Runs discovery, connection, subscription and streaming until the stream
    /// stops, then disconnects.
    ///
    /// Cancellation is observed between polls, so a poll already sent is always
    /// answered before the disconnect sequence starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is never discovered, the connect is refused,
    /// or the GATT shell cannot be subscribed. Faults after streaming has begun
    /// end the stream instead.
    #[instrument(
        skip(self, cancel, on_event),
        level = "info",
        fields(device_name = %self.config.device_name(), ?max_frames)
    )]
    pub async fn run(
        &self,
        max_frames: Option<usize>,
        cancel: &CancellationToken,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<StreamSummary, InteractionError> {
        Span::current().pb_set_message(&format!(
            "Scanning for {} and connecting",
            self.config.device_name()
        ));
        let mut pairing = self.spawn_pairing().await?;
        let result = self
            .drive(&mut pairing, max_frames, cancel, on_event)
            .await;
        pairing.terminate().await;
        result
    }

    async fn drive(
        &self,
        pairing: &mut PairingController,
        max_frames: Option<usize>,
        cancel: &CancellationToken,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<StreamSummary, InteractionError> {
        enter(Stage::Discover);
        let agent_ready = pairing.enable_agent().await && pairing.set_default_agent().await;
        if !agent_ready {
            warn!("agent setup failed; continuing with discovery");
        }
        if !pairing.make_discoverable().await || !pairing.start_scan().await {
            warn!("discovery setup incomplete; continuing with device listing");
        }

        enter(Stage::SelectTarget);
        let device = self.find_target(pairing, cancel).await?;
        on_event(StreamEvent::DeviceFound(device.clone()));

        enter(Stage::EvictStaleBonds);
        let paired = pairing.registry().list_paired().await;
        if !paired.is_empty() {
            let outcome = pairing.remove(device.mac_address()).await;
            info!(%outcome, bonds = paired.len(), "evicted stale bond");
        }

        enter(Stage::Connect);
        on_event(StreamEvent::Connecting(device.clone()));
        let outcome = pairing.connect(device.mac_address()).await;
        if !outcome.succeeded() {
            return Err(InteractionError::ConnectFailed {
                name: device.name().to_string(),
                address: device.mac_address().to_string(),
                outcome,
            });
        }
        pairing.follow_device_prompt(device.name());
        on_event(StreamEvent::Connected(device.clone()));
        Span::current().pb_set_message(&format!("Streaming from {}", device.name()));

        enter(Stage::EnterGatt);
        let mut gatt = GattSession::spawn(
            self.launcher.as_ref(),
            self.config.shell_program(),
            device.name(),
            self.config.timings(),
            StreamDecoder::new(self.config.payload_width()),
        )
        .await?;

        let streamed = match subscribe(&mut gatt).await {
            Ok(()) => Ok(stream(&mut gatt, max_frames, cancel, on_event).await),
            Err(error) => Err(error),
        };

        enter(Stage::Disconnected);
        disconnect(&mut gatt, pairing, &device).await;
        gatt.terminate().await;
        on_event(StreamEvent::Disconnected(device.clone()));
        info!(
            name = device.name(),
            address = device.mac_address(),
            "disconnected"
        );

        let (frames, stop_reason) = streamed?;
        Ok(StreamSummary::new(device, frames, stop_reason))
    }

    /// Re-lists devices until one carries the configured name or the discovery
    /// window closes.
    async fn find_target(
        &self,
        pairing: &mut PairingController,
        cancel: &CancellationToken,
    ) -> Result<Device, InteractionError> {
        let name = self.config.device_name();
        let deadline = Instant::now() + self.config.discovery_timeout();
        loop {
            let available = pairing.registry().list_available().await;
            if let Some(device) = available.into_iter().find(|device| device.name() == name) {
                info!(name, address = device.mac_address(), "found target device");
                return Ok(device);
            }
            if Instant::now() + self.config.discovery_interval() > deadline {
                return Err(InteractionError::TargetNotFound {
                    name: name.to_string(),
                    window: self.config.discovery_timeout(),
                });
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InteractionError::Cancelled),
                () = sleep(self.config.discovery_interval()) => {}
            }
        }
    }

    async fn spawn_pairing(&self) -> Result<PairingController, InteractionError> {
        let pairing = PairingController::spawn(
            self.launcher.as_ref(),
            self.config.shell_program(),
            self.config.timings(),
        )
        .await?;
        Ok(pairing)
    }
}

fn enter(stage: Stage) {
    info!(%stage, "entering stage");
}

async fn subscribe(gatt: &mut GattSession) -> Result<(), InteractionError> {
    enter(Stage::Subscribe);
    if !gatt.enter_menu().await {
        warn!("gatt menu was not confirmed");
    }
    let table = resolve_characteristics(&gatt.list_attributes().await);
    if table.is_truncated() {
        warn!("attribute listing ended inside a characteristic entry");
    }
    let uuid = table
        .first()
        .map(|characteristic| characteristic.uuid().to_string())
        .ok_or(InteractionError::NoCharacteristic)?;

    if !gatt.select_attribute(&uuid).await || !gatt.enable_notify().await {
        return Err(InteractionError::Subscribe { uuid });
    }
    info!(%uuid, "subscribed to notifications");
    Ok(())
}

async fn stream(
    gatt: &mut GattSession,
    max_frames: Option<usize>,
    cancel: &CancellationToken,
    on_event: &mut dyn FnMut(StreamEvent),
) -> (usize, StreamStopReason) {
    enter(Stage::StreamLoop);
    let mut frames = 0usize;
    if max_frames == Some(0) {
        return (frames, StreamStopReason::ReachedLimit(0));
    }

    let stop_reason = loop {
        if cancel.is_cancelled() {
            break StreamStopReason::Interrupted;
        }
        match gatt.poll().await {
            Ok(PollOutcome::Frame(frame)) => {
                frames += 1;
                on_event(StreamEvent::Frame {
                    index: frames,
                    frame,
                });
                if let Some(limit) = max_frames
                    && frames >= limit
                {
                    break StreamStopReason::ReachedLimit(limit);
                }
            }
            Ok(PollOutcome::Invalid) => {}
            Err(error) => {
                warn!(%error, "gatt shell faulted; leaving stream");
                break StreamStopReason::Disconnected;
            }
        }
    };
    (frames, stop_reason)
}

/// Best-effort exit from the sub-menu followed by a top-level disconnect.
///
/// A GATT shell that can no longer confirm the disconnect hands it to the
/// pairing shell, which is still attached to the adapter.
async fn disconnect(gatt: &mut GattSession, pairing: &mut PairingController, device: &Device) {
    if gatt.in_menu() && !gatt.exit_menu().await {
        warn!("could not leave the gatt menu");
    }
    let outcome = gatt.disconnect_current().await;
    if outcome.succeeded() {
        return;
    }
    warn!(%outcome, "gatt shell did not confirm the disconnect; retrying from the pairing shell");
    let outcome = pairing.disconnect(device.mac_address()).await;
    if !outcome.succeeded() {
        warn!(%outcome, address = device.mac_address(), "disconnect was not confirmed");
    }
}
