mod device_view;
mod painter;
mod stream_view;
mod table;

pub(crate) use self::device_view::{DeviceInfoView, DeviceSetView};
pub(crate) use self::painter::Painter;
pub(crate) use self::stream_view::{StreamEventView, StreamSummaryView};
