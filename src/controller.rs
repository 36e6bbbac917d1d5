//! Top-level orchestrator for one emulated device: owns the virtual UART
//! port, the pin table for the selected board, and the firmware runtime
//! thread; bridges inbound bytes to the firmware object and publishes
//! lifecycle events to subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use crate::board::{self, BoardKind, PinDefinition};
use crate::firmware::{self, Firmware};
use crate::runtime::FirmwareRuntime;
use crate::transport::port::{ConnectStatus, SerialListener, VirtualUartPort};
use crate::transport::{TransportError, UartEndpoint};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Lifecycle events published to external observers. Not consumed
/// internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(String),
    Disconnected(String),
    BoardChanged(BoardKind),
}

type SharedFirmware = Arc<Mutex<Box<dyn Firmware>>>;

/// Forwards inbound port bytes to the firmware's byte-input handler, in
/// order. Buffering across a mid-reset window is the firmware's concern.
struct FirmwareBridge {
    firmware: SharedFirmware,
}

impl SerialListener for FirmwareBridge {
    fn on_bytes(&self, bytes: &[u8]) {
        let mut fw = self
            .firmware
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        fw.on_bytes(bytes);
    }
}

pub struct VirtualDeviceController {
    uart: VirtualUartPort,
    firmware: SharedFirmware,
    runtime: FirmwareRuntime,
    board: Mutex<BoardKind>,
    pin_table: Mutex<Option<Vec<PinDefinition>>>,
    subscribers: Mutex<Vec<Sender<DeviceEvent>>>,
}

impl VirtualDeviceController {
    /// Build a controller around the given firmware object. The board
    /// profile starts as uno-class until [`set_board`](Self::set_board) says
    /// otherwise.
    pub fn new(firmware: Box<dyn Firmware>) -> Self {
        let firmware: SharedFirmware = Arc::new(Mutex::new(firmware));
        let uart = VirtualUartPort::new();
        uart.set_listener(Arc::new(FirmwareBridge {
            firmware: Arc::clone(&firmware),
        }));
        let runtime = FirmwareRuntime::new(Arc::clone(&firmware));
        Self {
            uart,
            firmware,
            runtime,
            board: Mutex::new(BoardKind::Uno),
            pin_table: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to connect/disconnect/board-changed events.
    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn publish(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn with_firmware<R>(&self, f: impl FnOnce(&mut Box<dyn Firmware>) -> R) -> R {
        let mut fw = self
            .firmware
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut fw)
    }

    /// Update the board profile, invalidating the cached pin table. Unknown
    /// kinds resolve to uno-class. Returns the resolved kind string; does
    /// not by itself reset the firmware.
    pub fn set_board(&self, kind: &str) -> String {
        let resolved = BoardKind::resolve(kind);
        tracing::info!("setting board to type {}", resolved);
        {
            let mut board = self.board.lock().unwrap();
            if *board != resolved {
                *self.pin_table.lock().unwrap() = None;
            }
            *board = resolved;
        }
        self.publish(DeviceEvent::BoardChanged(resolved));
        resolved.as_str().to_string()
    }

    /// Connect the virtual UART on `port_name` and run the reconnect
    /// handshake: stop the runtime if running, reset the firmware, emit the
    /// begin frame, notify the firmware, restart the runtime, publish the
    /// connect event. The firmware never observes a reconnect while
    /// mid-execution. Idempotent for the already-connected port name.
    pub fn connect(&self, port_name: &str) -> Result<(), ControllerError> {
        let previous = self.uart.connected_port();
        match self.uart.connect(port_name)? {
            ConnectStatus::AlreadyConnected | ConnectStatus::Ignored => return Ok(()),
            ConnectStatus::Connected => {}
        }

        // switching ports implicitly dropped the old pair
        if let Some(old) = previous.filter(|old| old.as_str() != port_name) {
            self.with_firmware(|fw| fw.on_disconnect(&old));
            self.publish(DeviceEvent::Disconnected(old));
        }

        if self.runtime.is_running() {
            tracing::info!("stopping firmware runtime for reconnect");
            self.runtime.stop();
        }
        self.with_firmware(|fw| fw.reset());
        let device = self
            .uart
            .device_endpoint()
            .ok_or_else(|| TransportError::NotConnected(port_name.to_string()))?;
        device.write_all(&firmware::begin_frame());
        self.with_firmware(|fw| {
            fw.attach_transport(device);
            fw.on_connect(port_name);
        });
        self.runtime.start();
        self.publish(DeviceEvent::Connected(port_name.to_string()));
        Ok(())
    }

    /// Drop the transport and notify the firmware. The runtime thread keeps
    /// executing the firmware's idle loop; only the transport changes state.
    pub fn disconnect(&self) {
        let Some(name) = self.uart.connected_port() else {
            return;
        };
        self.uart.disconnect();
        self.with_firmware(|fw| fw.on_disconnect(&name));
        self.publish(DeviceEvent::Disconnected(name));
    }

    pub fn start(&self) {
        self.runtime.start();
    }

    pub fn stop(&self) {
        self.runtime.stop();
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.uart.is_connected()
    }

    /// Device-side endpoint name ("COM5.UART"), if connected.
    pub fn port_name(&self) -> Option<String> {
        self.uart.port_name()
    }

    /// Host side of the live pair, for whatever plays the host role on the
    /// other end of the virtual wire.
    pub fn host_endpoint(&self) -> Option<UartEndpoint> {
        self.uart.host_endpoint()
    }

    /// The pin table for the current board profile. Rebuilt only when the
    /// profile (or its pin count) changed since the last call.
    pub fn pin_table(&self) -> Vec<PinDefinition> {
        let kind = *self.board.lock().unwrap();
        let mut cache = self.pin_table.lock().unwrap();
        if let Some(table) = cache.as_ref() {
            if table.len() == kind.pin_count() {
                return table.clone();
            }
        }
        let table = board::pin_table(kind);
        *cache = Some(table.clone());
        table
    }

    pub fn board(&self) -> BoardKind {
        *self.board.lock().unwrap()
    }
}

impl Drop for VirtualDeviceController {
    fn drop(&mut self) {
        self.uart.disconnect();
        self.runtime.stop();
    }
}
