//! Background health monitor for live EVDI displays.
//!
//! # How it works
//!
//! A named OS thread wakes up every `interval`, takes the driver lock, and
//! asks the driver for the event readiness of every active real-driver
//! display.  A negative answer means the device vanished (module unloaded,
//! GPU reset, ...).  The first such display is reported once as a
//! [`DisplayLost`] event on an unbounded tokio channel and the loop exits.
//!
//! The event is sent after the lock is released, so the receiver may call
//! straight back into the manager (for example to remove the display).
//!
//! Stopping is cooperative: [`HealthMonitor::stop`] raises a flag and wakes
//! the sleeping thread through a channel, then joins it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::manage_displays::{lock_state, DriverState};

/// A live display stopped answering the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLost {
    pub display_name: String,
    /// Identity key of the client the display belonged to.
    pub identity: String,
    /// The negative readiness value the driver returned.
    pub readiness: i32,
}

/// Handle to the running monitor thread.
pub struct HealthMonitor {
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    wake_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Spawns the monitor thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the OS refuses to create the thread.
    pub(crate) fn start(
        state: Arc<Mutex<DriverState>>,
        interval: Duration,
        events: mpsc::UnboundedSender<DisplayLost>,
    ) -> std::io::Result<Self> {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (wake_tx, wake_rx) = std_mpsc::channel();

        let thread = {
            let stop_requested = Arc::clone(&stop_requested);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("vdisplay-health".to_string())
                .spawn(move || {
                    monitor_loop(&state, interval, &wake_rx, &stop_requested, &events);
                    running.store(false, Ordering::Release);
                })?
        };

        debug!(interval_ms = interval.as_millis() as u64, "health monitor started");
        Ok(Self {
            stop_requested,
            running,
            wake_tx,
            thread: Some(thread),
        })
    }

    /// `false` once the thread has exited, either after a loss or a stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.wake_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("health monitor thread panicked");
            }
            debug!("health monitor stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn monitor_loop(
    state: &Mutex<DriverState>,
    interval: Duration,
    wake_rx: &std_mpsc::Receiver<()>,
    stop_requested: &AtomicBool,
    events: &mpsc::UnboundedSender<DisplayLost>,
) {
    loop {
        if stop_requested.load(Ordering::Acquire) {
            return;
        }
        match wake_rx.recv_timeout(interval) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => return,
        }
        if stop_requested.load(Ordering::Acquire) {
            return;
        }

        if let Some(lost) = poll_displays(state) {
            error!(
                display = %lost.display_name,
                readiness = lost.readiness,
                "EVDI device lost; virtual display no longer answering"
            );
            if events.send(lost).is_err() {
                debug!("display loss receiver dropped");
            }
            return;
        }
    }
}

/// Returns the first active real-driver display whose readiness is negative.
fn poll_displays(state: &Mutex<DriverState>) -> Option<DisplayLost> {
    let state = lock_state(state);
    let driver = state.capability.driver()?;

    let lost = state
        .displays
        .iter()
        .filter(|record| record.is_active())
        .find_map(|record| {
            let handle = record.handle()?;
            let readiness = driver.event_ready(handle);
            (readiness < 0).then(|| DisplayLost {
                display_name: record.name().to_string(),
                identity: record.identity().to_string(),
                readiness,
            })
        });
    lost
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bind_driver::{
        BindError, Capability, CapabilityBinder, DisplayDriver, DriverHandle, DriverLoader,
        MockDisplayDriver, UnavailableReason,
    };
    use crate::application::registry::{DisplayBacking, DisplayRegistry, VirtualDisplayRecord};
    use std::ffi::c_void;
    use std::sync::atomic::AtomicI32;
    use vdisplay_core::{DisplayMode, DriverStatus, RefreshRate};

    struct NoLoader;

    impl DriverLoader for NoLoader {
        fn load(&self) -> Result<Arc<dyn DisplayDriver>, BindError> {
            Err(BindError::LibraryNotFound {
                tried: Vec::new(),
                last_error: String::new(),
            })
        }
    }

    fn state_with(capability: Capability, records: Vec<VirtualDisplayRecord>) -> Arc<Mutex<DriverState>> {
        let mut displays = DisplayRegistry::new();
        for record in records {
            displays.insert(record);
        }
        Arc::new(Mutex::new(DriverState {
            status: DriverStatus::Ok,
            binder: CapabilityBinder::new(Box::new(NoLoader)),
            capability,
            displays,
            adapter_hint: None,
        }))
    }

    fn real_record(identity: &str) -> VirtualDisplayRecord {
        VirtualDisplayRecord::new(
            format!("VIRTUAL-{identity}"),
            identity.to_string(),
            DisplayMode::new(1920, 1080, RefreshRate::from_hz(60)),
            DisplayBacking::RealDriver {
                slot: 0,
                handle: DriverHandle::from_raw(0x40 as *mut c_void).expect("non-null"),
                device_node: None,
            },
        )
    }

    fn driver_with_readiness(value: Arc<AtomicI32>) -> Capability {
        let mut driver = MockDisplayDriver::new();
        driver
            .expect_event_ready()
            .returning(move |_| value.load(Ordering::SeqCst));
        Capability::Available(Arc::new(driver))
    }

    #[test]
    fn test_poll_displays_healthy_device_reports_nothing() {
        let state = state_with(
            driver_with_readiness(Arc::new(AtomicI32::new(5))),
            vec![real_record("aaaaaaaa")],
        );
        assert_eq!(poll_displays(&state), None);
    }

    #[test]
    fn test_poll_displays_negative_readiness_reports_loss() {
        // Arrange
        let state = state_with(
            driver_with_readiness(Arc::new(AtomicI32::new(-1))),
            vec![real_record("aaaaaaaa")],
        );

        // Act
        let lost = poll_displays(&state).expect("loss");

        // Assert
        assert_eq!(lost.display_name, "VIRTUAL-aaaaaaaa");
        assert_eq!(lost.identity, "aaaaaaaa");
        assert_eq!(lost.readiness, -1);
    }

    #[test]
    fn test_poll_displays_without_driver_reports_nothing() {
        let state = state_with(
            Capability::Unavailable(UnavailableReason::NotInitialized),
            vec![real_record("aaaaaaaa")],
        );
        assert_eq!(poll_displays(&state), None);
    }

    #[test]
    fn test_monitor_reports_loss_once_and_exits() {
        // Arrange
        let readiness = Arc::new(AtomicI32::new(-19));
        let state = state_with(
            driver_with_readiness(Arc::clone(&readiness)),
            vec![real_record("bbbbbbbb")],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let monitor = HealthMonitor::start(state, Duration::from_millis(10), tx).expect("spawn");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while monitor.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        // Assert
        assert!(!monitor.is_running(), "monitor must exit after a loss");
        let event = rx.try_recv().expect("one loss event");
        assert_eq!(event.readiness, -19);
        assert!(rx.try_recv().is_err(), "loss is reported only once");
        monitor.stop();
    }

    #[test]
    fn test_stop_interrupts_long_interval_promptly() {
        // Arrange
        let state = state_with(Capability::Unavailable(UnavailableReason::NotInitialized), Vec::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let monitor = HealthMonitor::start(state, Duration::from_secs(3600), tx).expect("spawn");
        let started = std::time::Instant::now();

        // Act
        monitor.stop();

        // Assert
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
