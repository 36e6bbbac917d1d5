//! Named virtual UART port: connection state for one device-side endpoint
//! plus the byte-arrival notification that bridges inbound traffic to an
//! observer.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded, select};

use super::{TransportError, UartEndpoint, connect_loopback};

/// Observer for bytes arriving on the device side of the port. This is the
/// only asynchronous signal in the transport layer.
pub trait SerialListener: Send + Sync {
    fn on_bytes(&self, bytes: &[u8]);
}

/// Outcome of a [`VirtualUartPort::connect`] call, so the owner can tell a
/// newly established pair from an idempotent re-invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// A fresh pair was created.
    Connected,
    /// Same port name as the live pair; nothing changed.
    AlreadyConnected,
    /// Empty port name; logged and ignored.
    Ignored,
}

struct Connection {
    /// Host-facing port name ("COM5"); the device endpoint is "COM5.UART".
    base_name: String,
    device: UartEndpoint,
    host: UartEndpoint,
    stop_tx: Sender<()>,
    pump: Option<JoinHandle<()>>,
}

type ListenerSlot = Arc<Mutex<Option<Arc<dyn SerialListener>>>>;

/// Wraps the loopback transport with named-endpoint semantics: a port name,
/// a connected flag, and byte-arrival notification via a pump thread.
pub struct VirtualUartPort {
    listener: ListenerSlot,
    conn: Mutex<Option<Connection>>,
}

impl Default for VirtualUartPort {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualUartPort {
    pub fn new() -> Self {
        Self {
            listener: Arc::new(Mutex::new(None)),
            conn: Mutex::new(None),
        }
    }

    /// Register the observer for inbound bytes. Bytes that arrive while no
    /// listener is registered are held back and delivered with the next
    /// batch.
    pub fn set_listener(&self, listener: Arc<dyn SerialListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Establish a virtual pair for `port_name`. Idempotent for the same
    /// name; a different name tears the old pair down first. An empty name
    /// is a no-op with a logged warning, not an error.
    pub fn connect(&self, port_name: &str) -> Result<ConnectStatus, TransportError> {
        if port_name.trim().is_empty() {
            tracing::warn!("connect with empty port name is not valid, ignoring");
            return Ok(ConnectStatus::Ignored);
        }
        let mut conn = self.conn.lock().unwrap();
        if let Some(existing) = conn.as_ref() {
            if existing.base_name == port_name {
                tracing::info!("already connected to {}", port_name);
                return Ok(ConnectStatus::AlreadyConnected);
            }
            Self::teardown(&mut conn);
        }

        let uart_name = format!("{}.UART", port_name);
        let (host, device) = connect_loopback(port_name, &uart_name);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let data_rx = device.receiver();
        let listener = Arc::clone(&self.listener);
        let pump = thread::spawn(move || {
            // Bytes received before a listener is registered are not dropped;
            // they ride along with the next delivered batch.
            let mut pending: Vec<u8> = Vec::new();
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(data_rx) -> msg => match msg {
                        Ok(first) => {
                            pending.push(first);
                            while let Ok(byte) = data_rx.try_recv() {
                                pending.push(byte);
                            }
                            let cb = listener.lock().unwrap().clone();
                            if let Some(cb) = cb {
                                cb.on_bytes(&pending);
                                pending.clear();
                            }
                        }
                        Err(_) => break,
                    },
                }
            }
            tracing::debug!("uart pump thread exiting");
        });

        tracing::info!("connected virtual uart {} <-> {}", port_name, uart_name);
        *conn = Some(Connection {
            base_name: port_name.to_string(),
            device,
            host,
            stop_tx,
            pump: Some(pump),
        });
        Ok(ConnectStatus::Connected)
    }

    /// Release the pair and mark the endpoint not-connected. Safe to call
    /// when already disconnected.
    pub fn disconnect(&self) {
        let mut conn = self.conn.lock().unwrap();
        Self::teardown(&mut conn);
    }

    fn teardown(conn: &mut Option<Connection>) {
        if let Some(mut existing) = conn.take() {
            let _ = existing.stop_tx.send(());
            if let Some(pump) = existing.pump.take() {
                if pump.join().is_err() {
                    tracing::error!("uart pump thread terminated abnormally");
                }
            }
            tracing::info!("disconnected virtual uart {}", existing.base_name);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().unwrap().is_some()
    }

    /// Host-facing name of the live pair ("COM5"), if any.
    pub fn connected_port(&self) -> Option<String> {
        self.conn.lock().unwrap().as_ref().map(|c| c.base_name.clone())
    }

    /// Device-side endpoint name ("COM5.UART"), if connected.
    pub fn port_name(&self) -> Option<String> {
        self.conn
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| c.device.name().to_string())
    }

    /// Handle for the host side of the pair, used by whatever is plugged
    /// into the other end of the virtual wire.
    pub fn host_endpoint(&self) -> Option<UartEndpoint> {
        self.conn.lock().unwrap().as_ref().map(|c| c.host.clone())
    }

    /// Handle the firmware side writes its outbound byte stream through.
    pub(crate) fn device_endpoint(&self) -> Option<UartEndpoint> {
        self.conn.lock().unwrap().as_ref().map(|c| c.device.clone())
    }
}

impl Drop for VirtualUartPort {
    fn drop(&mut self) {
        self.disconnect();
    }
}
