//! virtuino: software emulation of a serial-connected microcontroller.
//!
//! A loopback byte transport stands in for a physical UART, and a background
//! firmware runtime behaves the way an embedded cooperative scheduler does:
//! run setup once, then loop until told to stop. The core guarantees byte
//! delivery and lifecycle semantics; protocol interpretation belongs to the
//! firmware object plugged in at construction.

pub mod board;
pub mod config;
pub mod controller;
pub mod firmware;
pub mod runtime;
pub mod transport;

pub use board::{BoardKind, PinDefinition};
pub use config::{Config, ConfigError, load_config};
pub use controller::{ControllerError, DeviceEvent, VirtualDeviceController};
pub use firmware::{EchoFirmware, Firmware};
pub use runtime::{FirmwareRuntime, RuntimeState};
pub use transport::port::{ConnectStatus, SerialListener, VirtualUartPort};
pub use transport::{TransportError, UartEndpoint, connect_loopback};
