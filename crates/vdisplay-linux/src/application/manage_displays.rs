//! DisplayManager: the virtual display lifecycle for one host session.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!   new() ──► initialize() ──► create_display() ──► change_display_settings()
//!                 │                   │                       │
//!                 │                   └──────► remove_display() ◄──┘
//!                 ▼
//!            shutdown()  (removes whatever is left, unloads the driver)
//! ```
//!
//! `initialize` decides once whether real EVDI outputs are possible.  When
//! they are not, `create_display` still succeeds: the record is kept in
//! *passthrough* mode and the host captures an existing output instead.
//!
//! # Locking
//!
//! All mutable state lives in one [`DriverState`] behind one mutex.  Every
//! public operation takes that lock for its whole duration, including the
//! driver calls it makes, so a display can never be half-created from the
//! point of view of another thread.  The health monitor takes the same lock
//! for each poll but sends its events only after releasing it.
//!
//! The monitor's join handle lives in a separate slot so that `shutdown` can
//! join the monitor thread *before* taking the state lock.

use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vdisplay_core::{
    display_name_for, identity_key, synthesize_for, DisplayId, DisplayMode, DriverStatus,
    RefreshRate,
};

use super::bind_driver::{
    Capability, CapabilityBinder, DeviceStatus, DisplayDriver, DriverLoader, ModuleProbe,
    UnavailableReason,
};
use super::health_monitor::{DisplayLost, HealthMonitor};
use super::registry::{DisplayBacking, DisplayInfo, DisplayRegistry, VirtualDisplayRecord};
use super::report_outputs::{primary_output_name, OutputEnumerator};

/// Number of EVDI device slots scanned by default.
pub const DEFAULT_MAX_DEVICE_SLOTS: u32 = 16;

/// Default health monitor poll interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Opens the DRM device node that belongs to an EVDI slot.
pub trait DeviceNodes: Send + Sync {
    /// Opens the node for `slot` read-write.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from opening the node.
    fn open_card(&self, slot: u32) -> std::io::Result<File>;
}

// ── Settings and results ──────────────────────────────────────────────────────

/// Tunables for a [`DisplayManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Slots `0..max_device_slots` are scanned for a free EVDI device.
    pub max_device_slots: u32,
    /// Health monitor poll interval.
    pub monitor_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_device_slots: DEFAULT_MAX_DEVICE_SLOTS,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

/// Outcome of a reconfigure request.
///
/// Both variants are successes: asking to reconfigure a display that does not
/// exist is benign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    /// The stored geometry was updated.  `reconnected` is `true` when the
    /// driver was handed a fresh EDID.
    Applied { reconnected: bool },
    /// No display with that name; nothing changed.
    DisplayNotFound,
}

impl SettingsChange {
    /// The status code reported to the host; always `0` (success).
    pub fn code(self) -> i32 {
        0
    }
}

/// Why the real-driver path could not produce a display.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateError {
    #[error("no free EVDI device among {scanned} slots")]
    NoFreeSlot { scanned: u32 },
    #[error("failed to open EVDI device {slot}")]
    OpenFailed { slot: u32 },
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// Everything guarded by the driver lock.
pub(crate) struct DriverState {
    pub(crate) status: DriverStatus,
    pub(crate) binder: CapabilityBinder,
    pub(crate) capability: Capability,
    pub(crate) displays: DisplayRegistry,
    pub(crate) adapter_hint: Option<String>,
}

pub(crate) fn lock_state(state: &Mutex<DriverState>) -> MutexGuard<'_, DriverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── DisplayManager ────────────────────────────────────────────────────────────

/// Owns the driver capability, the display registry and the health monitor.
///
/// Several managers can coexist; each has its own lock and registry.
pub struct DisplayManager {
    state: Arc<Mutex<DriverState>>,
    probe: Box<dyn ModuleProbe>,
    nodes: Box<dyn DeviceNodes>,
    outputs: Box<dyn OutputEnumerator>,
    settings: ManagerSettings,
    monitor: Mutex<Option<HealthMonitor>>,
    loss_tx: mpsc::UnboundedSender<DisplayLost>,
    loss_rx: Mutex<Option<mpsc::UnboundedReceiver<DisplayLost>>>,
}

impl DisplayManager {
    /// Creates an uninitialized manager from its ports.
    pub fn new(
        loader: Box<dyn DriverLoader>,
        probe: Box<dyn ModuleProbe>,
        nodes: Box<dyn DeviceNodes>,
        outputs: Box<dyn OutputEnumerator>,
        settings: ManagerSettings,
    ) -> Self {
        let (loss_tx, loss_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(DriverState {
                status: DriverStatus::Unknown,
                binder: CapabilityBinder::new(loader),
                capability: Capability::Unavailable(UnavailableReason::NotInitialized),
                displays: DisplayRegistry::new(),
                adapter_hint: None,
            })),
            probe,
            nodes,
            outputs,
            settings,
            monitor: Mutex::new(None),
            loss_tx,
            loss_rx: Mutex::new(Some(loss_rx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        lock_state(&self.state)
    }

    // ── Driver lifecycle ──────────────────────────────────────────────────────

    /// Binds the driver library and decides whether real outputs are
    /// available.  Always returns [`DriverStatus::Ok`]; a missing driver only
    /// means passthrough mode.
    pub fn initialize(&self) -> DriverStatus {
        let mut state = self.lock();
        if state.status.is_ok() {
            return state.status;
        }

        info!("initializing Linux virtual display driver");
        let capability = state.binder.negotiate(self.probe.as_ref());
        match &capability {
            Capability::Available(driver) => {
                info!(version = %driver.version(), "EVDI available; virtual displays will be real outputs");
            }
            Capability::Unavailable(reason) => {
                warn!("EVDI unavailable ({reason}); virtual displays will use passthrough mode");
            }
        }
        state.capability = capability;
        state.status = DriverStatus::Ok;
        state.status
    }

    /// Stops the monitor, releases every display, and unloads the driver.
    pub fn shutdown(&self) {
        // Held to the end so no monitor can start mid-shutdown.
        let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = monitor.take() {
            running.stop();
        }

        let mut state = self.lock();
        info!("shutting down Linux virtual display driver");

        let driver = state.binder.driver();
        let records = state.displays.drain();
        let released = records.len();
        for record in records {
            record.release(driver.as_deref());
        }
        drop(driver);

        state.capability = Capability::Unavailable(UnavailableReason::NotInitialized);
        state.binder.unbind();
        state.adapter_hint = None;
        state.status = DriverStatus::Unknown;
        debug!(released, "virtual display driver shut down");
    }

    pub fn driver_status(&self) -> DriverStatus {
        self.lock().status
    }

    /// Returns `true` when displays are created as real EVDI outputs.
    pub fn is_real_driver_available(&self) -> bool {
        self.lock().capability.is_available()
    }

    /// Records a preferred render adapter.  Adapter selection is not
    /// implemented; the hint is kept for diagnostics.
    pub fn set_render_adapter(&self, adapter_name: &str) -> bool {
        let mut state = self.lock();
        if adapter_name.is_empty() {
            debug!("no render adapter specified; using default GPU");
            state.adapter_hint = None;
        } else {
            info!(adapter = adapter_name, "render adapter hint recorded");
            state.adapter_hint = Some(adapter_name.to_string());
        }
        true
    }

    pub fn render_adapter(&self) -> Option<String> {
        self.lock().adapter_hint.clone()
    }

    // ── Display lifecycle ─────────────────────────────────────────────────────

    /// Creates a virtual display for client `id` and returns its name.
    ///
    /// Returns `None` only when the manager is not initialized.  When the real
    /// driver path fails the display is created in passthrough mode.
    pub fn create_display(
        &self,
        client_id: &str,
        client_label: &str,
        width: u32,
        height: u32,
        refresh_milli_hz: u32,
        id: &DisplayId,
    ) -> Option<String> {
        let mut state = self.lock();
        if !state.status.is_ok() {
            error!("cannot create virtual display: driver not initialized");
            return None;
        }

        let name = display_name_for(id);
        let mode = DisplayMode::new(width, height, RefreshRate::from_milli_hz(refresh_milli_hz));
        info!(
            client_id,
            client_label,
            display = %name,
            "creating virtual display {}x{}@{}mHz",
            width,
            height,
            refresh_milli_hz
        );

        let backing = match state.capability.driver() {
            Some(driver) => {
                match self.attach_real_display(driver.as_ref(), &state.displays, &mode) {
                    Ok(backing) => backing,
                    Err(e) => {
                        warn!(display = %name, "{e}; falling back to passthrough");
                        DisplayBacking::Passthrough
                    }
                }
            }
            None => DisplayBacking::Passthrough,
        };

        if let DisplayBacking::RealDriver { slot, .. } = &backing {
            info!(display = %name, slot, "virtual display created on EVDI device");
        } else {
            info!(display = %name, "virtual display in passthrough mode; capture uses an existing output");
        }

        let record = VirtualDisplayRecord::new(name.clone(), identity_key(id), mode, backing);
        if let Some(previous) = state.displays.insert(record) {
            warn!(display = %previous.name(), "replacing existing display for the same identity");
            let driver = state.binder.driver();
            previous.release(driver.as_deref());
        }

        Some(name)
    }

    /// Finds a slot, opens it, and plugs in a monitor with a fresh EDID.
    fn attach_real_display(
        &self,
        driver: &dyn DisplayDriver,
        displays: &DisplayRegistry,
        mode: &DisplayMode,
    ) -> Result<DisplayBacking, CreateError> {
        let slot = self
            .find_free_slot(driver, displays)
            .ok_or(CreateError::NoFreeSlot {
                scanned: self.settings.max_device_slots,
            })?;
        let handle = driver.open(slot).ok_or(CreateError::OpenFailed { slot })?;

        let edid = synthesize_for(mode);
        debug!(slot, edid_len = edid.len(), "connecting virtual monitor");
        driver.connect(handle, &edid, 0);

        let device_node = match self.nodes.open_card(slot) {
            Ok(file) => Some(file),
            Err(e) => {
                debug!(slot, "could not open DRM node: {e}");
                None
            }
        };

        Ok(DisplayBacking::RealDriver {
            slot,
            handle,
            device_node,
        })
    }

    /// Returns the first slot that is available, adding a device to an empty
    /// slot when needed.  Slots held by live displays are skipped.
    fn find_free_slot(&self, driver: &dyn DisplayDriver, displays: &DisplayRegistry) -> Option<u32> {
        for slot in 0..self.settings.max_device_slots {
            if displays.slot_in_use(slot) {
                continue;
            }
            match driver.check_device(slot) {
                DeviceStatus::Available => return Some(slot),
                DeviceStatus::NotPresent => {
                    if driver.add_device() && driver.check_device(slot) == DeviceStatus::Available {
                        info!(slot, "added EVDI device");
                        return Some(slot);
                    }
                }
                DeviceStatus::Unrecognized => {}
            }
        }
        None
    }

    /// Removes the display created for `id`.  Returns `false` if there is none.
    pub fn remove_display(&self, id: &DisplayId) -> bool {
        let mut state = self.lock();
        let Some(record) = state.displays.remove(&identity_key(id)) else {
            warn!(identity = %id, "cannot remove virtual display: no display for identity");
            return false;
        };

        info!(display = %record.name(), "removing virtual display");
        let driver = state.binder.driver();
        record.release(driver.as_deref());
        true
    }

    /// Changes the mode of display `name`, reconnecting it with a new EDID
    /// when it is a real output.  Never fails.
    pub fn change_display_settings(
        &self,
        name: &str,
        width: u32,
        height: u32,
        refresh_milli_hz: u32,
    ) -> SettingsChange {
        let mut state = self.lock();
        let driver = state.capability.driver();

        let Some(record) = state.displays.find_by_name_mut(name) else {
            debug!(display = name, "display not found for reconfiguration");
            return SettingsChange::DisplayNotFound;
        };

        info!(
            display = name,
            "reconfiguring to {}x{}@{}mHz", width, height, refresh_milli_hz
        );
        record.set_mode(width, height, RefreshRate::from_milli_hz(refresh_milli_hz));

        let reconnected = match (driver, record.handle()) {
            (Some(driver), Some(handle)) => {
                driver.disconnect(handle);
                let edid = synthesize_for(&record.mode());
                driver.connect(handle, &edid, 0);
                debug!(display = name, edid_len = edid.len(), "reconnected with new EDID");
                true
            }
            _ => false,
        };

        SettingsChange::Applied { reconnected }
    }

    /// Same as [`change_display_settings`](Self::change_display_settings);
    /// each virtual display is already its own output, so the change never
    /// touches other outputs.
    pub fn change_display_settings_isolated(
        &self,
        name: &str,
        width: u32,
        height: u32,
        refresh_milli_hz: u32,
    ) -> SettingsChange {
        debug!(display = name, "isolated reconfiguration is implicit for EVDI outputs");
        self.change_display_settings(name, width, height, refresh_milli_hz)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Names of active displays whose name contains `fragment`.
    pub fn match_displays(&self, fragment: &str) -> Vec<String> {
        self.lock().displays.matching(fragment)
    }

    pub fn is_real_driver_backed(&self, name: &str) -> bool {
        self.lock()
            .displays
            .find_by_name(name)
            .is_some_and(|r| r.using_real_driver())
    }

    /// The EVDI slot of display `name`, if it is a real output.
    pub fn real_driver_slot(&self, name: &str) -> Option<u32> {
        self.lock().displays.find_by_name(name).and_then(|r| r.slot())
    }

    pub fn display_info(&self, name: &str) -> Option<DisplayInfo> {
        self.lock().displays.find_by_name(name).map(|r| r.info())
    }

    pub fn displays(&self) -> Vec<DisplayInfo> {
        self.lock().displays.iter().map(|r| r.info()).collect()
    }

    pub fn display_count(&self) -> usize {
        self.lock().displays.len()
    }

    /// The first connected physical output, or `None`.
    pub fn primary_display_name(&self) -> Option<String> {
        primary_output_name(self.outputs.as_ref())
    }

    /// Changing the primary output is not supported; always reports success.
    pub fn set_primary_display(&self, name: &str) -> bool {
        debug!(display = name, "set primary display is a no-op on Linux");
        true
    }

    /// HDR is not supported on virtual outputs.
    pub fn display_hdr(&self, _name: &str) -> bool {
        false
    }

    /// HDR is not supported on virtual outputs; always `false`.
    pub fn set_display_hdr(&self, name: &str, enable: bool) -> bool {
        debug!(display = name, enable, "HDR not supported on virtual outputs");
        false
    }

    // ── Health monitor ────────────────────────────────────────────────────────

    /// Starts the health monitor.  Returns `true` if it is running afterwards.
    ///
    /// Refuses to start before [`initialize`](Self::initialize) or after
    /// [`shutdown`](Self::shutdown).
    pub fn start_monitor(&self) -> bool {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(HealthMonitor::is_running) {
            return true;
        }
        if !self.lock().status.is_ok() {
            warn!("cannot start health monitor: driver not initialized");
            return false;
        }
        // A monitor that already reported a loss has exited; reap it.
        if let Some(finished) = slot.take() {
            finished.stop();
        }

        match HealthMonitor::start(
            Arc::clone(&self.state),
            self.settings.monitor_interval,
            self.loss_tx.clone(),
        ) {
            Ok(monitor) => {
                *slot = Some(monitor);
                true
            }
            Err(e) => {
                error!("failed to spawn health monitor thread: {e}");
                false
            }
        }
    }

    /// Stops the health monitor and waits for it to exit.  Safe to call when
    /// it is not running.
    pub fn stop_monitor(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(HealthMonitor::is_running)
    }

    /// Takes the receiving end of the display-loss channel.
    ///
    /// Returns `None` after the first call.
    pub fn take_loss_events(&self) -> Option<mpsc::UnboundedReceiver<DisplayLost>> {
        self.loss_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for DisplayManager {
    /// Runs [`shutdown`](DisplayManager::shutdown) if the owner did not, so
    /// driver handles are never left connected.
    fn drop(&mut self) {
        if self.lock().status.is_ok() {
            self.shutdown();
        } else {
            self.stop_monitor();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
