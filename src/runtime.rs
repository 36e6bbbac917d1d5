//! Cancellable background worker that runs a firmware object the way the
//! board's scheduler would: setup once, then loop forever until told to
//! stop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::firmware::Firmware;

/// Interruptible pause between loop iterations. Keeps the worker from
/// busy-spinning while still observing a stop request promptly.
const LOOP_PAUSE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl RuntimeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RuntimeState::Starting,
            2 => RuntimeState::Running,
            3 => RuntimeState::Stopping,
            _ => RuntimeState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RuntimeState::Stopped => 0,
            RuntimeState::Starting => 1,
            RuntimeState::Running => 2,
            RuntimeState::Stopping => 3,
        }
    }
}

struct Inner {
    worker: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

/// Drives one firmware object on one dedicated thread. `start` and `stop`
/// are idempotent and safe to call concurrently with the running worker.
pub struct FirmwareRuntime {
    firmware: Arc<Mutex<Box<dyn Firmware>>>,
    state: Arc<AtomicU8>,
    inner: Mutex<Inner>,
}

impl FirmwareRuntime {
    pub fn new(firmware: Arc<Mutex<Box<dyn Firmware>>>) -> Self {
        Self {
            firmware,
            state: Arc::new(AtomicU8::new(RuntimeState::Stopped.as_u8())),
            inner: Mutex::new(Inner {
                worker: None,
                stop_tx: None,
            }),
        }
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RuntimeState::Running
    }

    /// Spawn the worker if none is active. Calling `start` on a running
    /// runtime is a no-op; there is never more than one worker.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.worker.take() {
            if self.state() != RuntimeState::Stopped {
                inner.worker = Some(handle);
                tracing::debug!("firmware runtime already active, ignoring start");
                return;
            }
            // worker exited on its own (panic path), reap it before respawn
            if handle.join().is_err() {
                tracing::error!("previous firmware worker terminated abnormally");
            }
        }

        self.state
            .store(RuntimeState::Starting.as_u8(), Ordering::SeqCst);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let firmware = Arc::clone(&self.firmware);
        let state = Arc::clone(&self.state);
        tracing::info!("starting firmware runtime thread");
        self.state
            .store(RuntimeState::Running.as_u8(), Ordering::SeqCst);
        let worker = thread::spawn(move || {
            let init = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut fw = firmware
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                fw.setup();
            }));
            if init.is_err() {
                tracing::error!("firmware setup panicked, stopping runtime");
                state.store(RuntimeState::Stopped.as_u8(), Ordering::SeqCst);
                return;
            }
            tracing::debug!("firmware setup complete, entering loop");
            loop {
                let step = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut fw = firmware
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    fw.run_loop();
                }));
                if step.is_err() {
                    // do not keep iterating a corrupted loop
                    tracing::error!("firmware loop step panicked, stopping runtime");
                    break;
                }
                match stop_rx.recv_timeout(LOOP_PAUSE) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
            state.store(RuntimeState::Stopped.as_u8(), Ordering::SeqCst);
            tracing::info!("firmware runtime thread exiting");
        });
        inner.worker = Some(worker);
        inner.stop_tx = Some(stop_tx);
    }

    /// Signal cancellation and wait for the worker to exit. The wait is
    /// bounded to roughly one pause interval. Idempotent when stopped.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Some(worker) = inner.worker.take() else {
            tracing::debug!("stop called on stopped firmware runtime");
            return;
        };
        self.state
            .store(RuntimeState::Stopping.as_u8(), Ordering::SeqCst);
        if let Some(stop_tx) = inner.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if worker.join().is_err() {
            tracing::error!("firmware runtime worker terminated abnormally");
        }
        self.state
            .store(RuntimeState::Stopped.as_u8(), Ordering::SeqCst);
    }
}

impl Drop for FirmwareRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::UartEndpoint;
    use std::sync::atomic::AtomicUsize;

    struct CountingFirmware {
        setups: Arc<AtomicUsize>,
        loops: Arc<AtomicUsize>,
        panic_on_loop: bool,
    }

    impl Firmware for CountingFirmware {
        fn reset(&mut self) {}
        fn setup(&mut self) {
            self.setups.fetch_add(1, Ordering::SeqCst);
        }
        fn run_loop(&mut self) {
            self.loops.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_loop {
                panic!("boom");
            }
        }
        fn on_bytes(&mut self, _bytes: &[u8]) {}
        fn on_connect(&mut self, _port_name: &str) {}
        fn on_disconnect(&mut self, _port_name: &str) {}
        fn attach_transport(&mut self, _endpoint: UartEndpoint) {}
    }

    fn runtime_with_counters(
        panic_on_loop: bool,
    ) -> (FirmwareRuntime, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let setups = Arc::new(AtomicUsize::new(0));
        let loops = Arc::new(AtomicUsize::new(0));
        let fw: Box<dyn Firmware> = Box::new(CountingFirmware {
            setups: Arc::clone(&setups),
            loops: Arc::clone(&loops),
            panic_on_loop,
        });
        (
            FirmwareRuntime::new(Arc::new(Mutex::new(fw))),
            setups,
            loops,
        )
    }

    #[test]
    fn start_runs_setup_once_then_loops() {
        let (runtime, setups, loops) = runtime_with_counters(false);
        runtime.start();
        assert!(runtime.is_running());
        thread::sleep(Duration::from_millis(30));
        runtime.stop();
        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert!(loops.load(Ordering::SeqCst) > 1);
        assert!(!runtime.is_running());
    }

    #[test]
    fn start_is_idempotent() {
        let (runtime, setups, _loops) = runtime_with_counters(false);
        runtime.start();
        runtime.start();
        runtime.start();
        thread::sleep(Duration::from_millis(20));
        runtime.stop();
        assert_eq!(setups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent_and_state_not_stale() {
        let (runtime, _setups, loops) = runtime_with_counters(false);
        runtime.stop();
        assert!(!runtime.is_running());
        runtime.start();
        thread::sleep(Duration::from_millis(10));
        runtime.stop();
        runtime.stop();
        assert!(!runtime.is_running());
        let count = loops.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        // no worker left behind after stop
        assert_eq!(loops.load(Ordering::SeqCst), count);
    }

    #[test]
    fn restart_after_stop_runs_setup_again() {
        let (runtime, setups, _loops) = runtime_with_counters(false);
        runtime.start();
        thread::sleep(Duration::from_millis(10));
        runtime.stop();
        runtime.start();
        thread::sleep(Duration::from_millis(10));
        runtime.stop();
        assert_eq!(setups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_loop_step_lands_in_stopped() {
        let (runtime, _setups, loops) = runtime_with_counters(true);
        runtime.start();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(loops.load(Ordering::SeqCst), 1);
        assert!(!runtime.is_running());
        // a later start must be able to respawn
        runtime.start();
        thread::sleep(Duration::from_millis(30));
        assert!(!runtime.is_running());
        runtime.stop();
    }
}
