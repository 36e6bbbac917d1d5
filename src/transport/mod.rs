//! Loopback byte transport: a pair of unbounded FIFO byte channels forming
//! one duplex virtual UART. No physical hardware is involved; both ends live
//! in the same process.

pub mod port;

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("port '{0}' is not connected")]
    NotConnected(String),
}

/// One bound end of a virtual UART pair.
///
/// Writes go out on one channel, reads come in on the other. Bytes written on
/// one endpoint arrive at the peer in write order; the two directions are
/// independent streams with no cross-direction ordering guarantee.
#[derive(Debug, Clone)]
pub struct UartEndpoint {
    name: String,
    tx: Sender<u8>,
    rx: Receiver<u8>,
}

/// Allocate a fresh duplex pair and return the two bound endpoints.
pub fn connect_loopback(name_a: &str, name_b: &str) -> (UartEndpoint, UartEndpoint) {
    let (a_to_b_tx, a_to_b_rx) = unbounded();
    let (b_to_a_tx, b_to_a_rx) = unbounded();
    let a = UartEndpoint {
        name: name_a.to_string(),
        tx: a_to_b_tx,
        rx: b_to_a_rx,
    };
    let b = UartEndpoint {
        name: name_b.to_string(),
        tx: b_to_a_tx,
        rx: a_to_b_rx,
    };
    tracing::debug!("created virtual uart pair {} <-> {}", name_a, name_b);
    (a, b)
}

impl UartEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue one byte for the peer. Never blocks; the channel is unbounded.
    /// A write after the peer end is gone is dropped, not an error.
    pub fn write(&self, byte: u8) {
        if self.tx.send(byte).is_err() {
            tracing::trace!("write on '{}' after peer closed, dropping byte", self.name);
        }
    }

    pub fn write_all(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.write(byte);
        }
    }

    /// Block until one byte is available. Returns `None` when the pair has
    /// been torn down; callers treat "no data" and "interrupted" identically.
    pub fn read(&self) -> Option<u8> {
        self.rx.recv().ok()
    }

    /// Like [`read`](Self::read) with a bounded wait. `None` on timeout or
    /// teardown.
    pub fn read_timeout(&self, timeout: Duration) -> Option<u8> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Number of bytes queued for this endpoint, without consuming them.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn receiver(&self) -> Receiver<u8> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip_in_order() {
        let (host, device) = connect_loopback("COM7", "COM7.UART");
        let payload: Vec<u8> = (0u8..=255).collect();
        host.write_all(&payload);
        let mut got = Vec::new();
        while let Some(b) = device.read_timeout(Duration::from_millis(100)) {
            got.push(b);
            if got.len() == payload.len() {
                break;
            }
        }
        assert_eq!(got, payload);
    }

    #[test]
    fn directions_are_independent() {
        let (a, b) = connect_loopback("left", "right");
        a.write_all(&[1, 2, 3]);
        b.write_all(&[9, 8]);
        assert_eq!(b.read(), Some(1));
        assert_eq!(a.read(), Some(9));
        assert_eq!(b.read(), Some(2));
        assert_eq!(a.read(), Some(8));
        assert_eq!(b.read(), Some(3));
    }

    #[test]
    fn available_reports_queued_count() {
        let (a, b) = connect_loopback("a", "b");
        assert_eq!(b.available(), 0);
        a.write_all(&[0x10, 0x20, 0x30]);
        assert_eq!(b.available(), 3);
        assert_eq!(b.read(), Some(0x10));
        assert_eq!(b.available(), 2);
    }

    #[test]
    fn read_after_teardown_is_none_not_error() {
        let (a, b) = connect_loopback("a", "b");
        a.write(42);
        drop(a);
        assert_eq!(b.read(), Some(42));
        assert_eq!(b.read(), None);
        assert_eq!(b.read_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn write_after_teardown_is_dropped() {
        let (a, b) = connect_loopback("a", "b");
        drop(b);
        // must not panic or block
        a.write_all(&[1, 2, 3]);
    }
}
