//! The firmware collaborator boundary. The controller drives a `Firmware`
//! object the way an embedded board drives its sketch: reset, one-time
//! setup, then a repeating loop step. Protocol interpretation of the bytes
//! is the firmware's business, not this crate's.

use std::collections::VecDeque;

use crate::transport::UartEndpoint;

/// First byte of every handshake frame.
pub const HANDSHAKE_MAGIC: u8 = 170;

/// Version reported in the begin handshake after a (re)connect.
pub const FIRMWARE_VERSION: u8 = 68;

/// The begin message emitted on the transport before the firmware runtime
/// resumes: magic, payload length, version.
pub fn begin_frame() -> [u8; 3] {
    [HANDSHAKE_MAGIC, 1, FIRMWARE_VERSION]
}

/// The simulated embedded program driven by the runtime thread.
///
/// `setup` runs once per runtime start, `run_loop` repeats until the runtime
/// is stopped. `on_bytes` receives the inbound stream in write order;
/// outbound bytes go through the endpoint handed to `attach_transport`.
pub trait Firmware: Send {
    /// Return to power-on state, as if the reset button had been pressed.
    fn reset(&mut self);

    fn setup(&mut self);

    fn run_loop(&mut self);

    fn on_bytes(&mut self, bytes: &[u8]);

    fn on_connect(&mut self, port_name: &str);

    fn on_disconnect(&mut self, port_name: &str);

    /// Wiring hook: the controller hands over the device-side endpoint when
    /// a pair is established. Firmware that never writes back can keep the
    /// default.
    fn attach_transport(&mut self, _endpoint: UartEndpoint) {}
}

/// Minimal in-tree firmware: buffers inbound bytes and echoes them back on
/// the next loop step. Used by the demo harness and the integration tests.
#[derive(Debug, Default)]
pub struct EchoFirmware {
    endpoint: Option<UartEndpoint>,
    inbox: VecDeque<u8>,
}

impl EchoFirmware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Firmware for EchoFirmware {
    fn reset(&mut self) {
        tracing::debug!("echo firmware reset");
        self.inbox.clear();
    }

    fn setup(&mut self) {
        tracing::debug!("echo firmware setup");
    }

    fn run_loop(&mut self) {
        if self.inbox.is_empty() {
            return;
        }
        let batch: Vec<u8> = self.inbox.drain(..).collect();
        if let Some(endpoint) = &self.endpoint {
            endpoint.write_all(&batch);
        }
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes.iter().copied());
    }

    fn on_connect(&mut self, port_name: &str) {
        tracing::info!("echo firmware connected on {}", port_name);
    }

    fn on_disconnect(&mut self, port_name: &str) {
        tracing::info!("echo firmware disconnected from {}", port_name);
    }

    fn attach_transport(&mut self, endpoint: UartEndpoint) {
        self.endpoint = Some(endpoint);
    }
}
