use std::fmt::{self, Display, Formatter};

use crate::orchestrator::{StreamEvent, StreamStopReason, StreamSummary};
use crate::registry::Device;

use super::painter::{Painter, Tone};

/// Renders one progress line of a stream run.
pub(crate) struct StreamEventView<'a> {
    event: &'a StreamEvent,
    painter: &'a Painter,
}

impl<'a> StreamEventView<'a> {
    pub(crate) fn new(event: &'a StreamEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }

    fn device(&self, device: &Device) -> String {
        format!(
            "{} {}",
            self.painter.emphasis(device.name()),
            self.painter.dim(format!("({})", device.mac_address()))
        )
    }
}

impl Display for StreamEventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.event {
            StreamEvent::DeviceFound(device) => {
                write!(f, "{} {}", self.painter.heading("Found"), self.device(device))
            }
            StreamEvent::Connecting(device) => {
                write!(f, "{} {}", self.painter.heading("Connecting to"), self.device(device))
            }
            StreamEvent::Connected(device) => write!(
                f,
                "{} {}, listening for data",
                self.painter.paint("Connected to", Tone::Good),
                self.device(device)
            ),
            StreamEvent::Frame { index, frame } => write!(
                f,
                "{} {}",
                self.painter.dim(format!("[{index:04}]")),
                self.painter.emphasis(frame.payload())
            ),
            StreamEvent::Disconnected(device) => write!(
                f,
                "{} {}",
                self.painter.paint("Disconnected from", Tone::Bad),
                self.device(device)
            ),
        }
    }
}

/// Renders the closing summary of a stream run.
pub(crate) struct StreamSummaryView<'a> {
    summary: &'a StreamSummary,
    painter: &'a Painter,
}

impl<'a> StreamSummaryView<'a> {
    pub(crate) fn new(summary: &'a StreamSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for StreamSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tone = match self.summary.stop_reason() {
            StreamStopReason::ReachedLimit(_) => Tone::Good,
            StreamStopReason::Interrupted | StreamStopReason::Disconnected => Tone::Bad,
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            self.painter.paint(self.summary.stop_reason().to_string(), tone),
            self.painter.emphasis(format!(
                "- decoded {} frame(s) from {}",
                self.summary.frames(),
                self.summary.device().name()
            ))
        )
    }
}
