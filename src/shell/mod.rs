mod command;
pub(crate) mod fake;
mod process;
mod transport;

pub use self::command::{OutcomeMarkers, SUCCESS_INDEX, ShellCommand, UnknownCommand};
pub use self::fake::FakeShellLauncher;
pub(crate) use self::fake::{DeviceFixture, FakeShellConfig, FramePayloads};
pub use self::process::{CommandOutcome, ControlProcess, Expectation};
pub(crate) use self::transport::SystemShellLauncher;
pub use self::transport::{ShellLauncher, ShellTransport};
