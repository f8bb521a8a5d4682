//! In-memory driver doubles, always compiled so integration tests and
//! machines without EVDI can exercise the real-driver code paths.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::application::bind_driver::{
    BindError, DeviceStatus, DirtyRect, DisplayDriver, DriverHandle, DriverLoader, LibVersion,
    ModuleProbe, PixelBuffer,
};

/// A fake EVDI library that records every call.
///
/// Slots start as configured; `add_device` turns the first `NotPresent` slot
/// into an `Available` one.  Handles are derived from the slot number so tests
/// can predict them with [`MockDriver::handle_for`].
#[derive(Debug)]
pub struct MockDriver {
    slots: Mutex<Vec<DeviceStatus>>,
    event_ready: AtomicI32,
    fail_open: AtomicBool,
    adds: AtomicUsize,
    /// Slots passed to `open`, in call order.
    pub opened: Mutex<Vec<u32>>,
    /// Handles passed to `close`, in call order.
    pub closed: Mutex<Vec<DriverHandle>>,
    /// `(handle, edid)` for every `connect` call.
    pub connects: Mutex<Vec<(DriverHandle, Vec<u8>)>>,
    /// Handles passed to `disconnect`, in call order.
    pub disconnects: Mutex<Vec<DriverHandle>>,
    buffers: Mutex<HashMap<(DriverHandle, i32), PixelBuffer>>,
}

impl MockDriver {
    /// A driver with the given per-slot statuses.
    pub fn with_slots(slots: Vec<DeviceStatus>) -> Self {
        Self {
            slots: Mutex::new(slots),
            event_ready: AtomicI32::new(3),
            fail_open: AtomicBool::new(false),
            adds: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// A driver with `count` available slots.
    pub fn available(count: usize) -> Self {
        Self::with_slots(vec![DeviceStatus::Available; count])
    }

    /// The handle `open(slot)` returns.
    pub fn handle_for(slot: u32) -> DriverHandle {
        let raw = (slot as usize + 1) * 0x100;
        DriverHandle::from_raw(raw as *mut c_void).unwrap_or_else(|| unreachable!("non-zero"))
    }

    /// Sets the value every `event_ready` call returns.
    pub fn set_event_ready(&self, value: i32) {
        self.event_ready.store(value, Ordering::SeqCst);
    }

    /// Makes every subsequent `open` fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `add_device` calls.
    pub fn added_devices(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    /// Number of buffers currently registered.
    pub fn registered_buffers(&self) -> usize {
        self.buffers.lock().expect("lock poisoned").len()
    }
}

impl DisplayDriver for MockDriver {
    fn check_device(&self, slot: u32) -> DeviceStatus {
        self.slots
            .lock()
            .expect("lock poisoned")
            .get(slot as usize)
            .copied()
            .unwrap_or(DeviceStatus::NotPresent)
    }

    fn add_device(&self) -> bool {
        let mut slots = self.slots.lock().expect("lock poisoned");
        match slots.iter_mut().find(|s| **s == DeviceStatus::NotPresent) {
            Some(slot) => {
                *slot = DeviceStatus::Available;
                self.adds.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn open(&self, slot: u32) -> Option<DriverHandle> {
        if self.fail_open.load(Ordering::SeqCst) {
            return None;
        }
        self.opened.lock().expect("lock poisoned").push(slot);
        Some(Self::handle_for(slot))
    }

    fn close(&self, handle: DriverHandle) {
        self.closed.lock().expect("lock poisoned").push(handle);
    }

    fn connect(&self, handle: DriverHandle, edid: &[u8], _sku_area_limit: u32) {
        self.connects
            .lock()
            .expect("lock poisoned")
            .push((handle, edid.to_vec()));
    }

    fn disconnect(&self, handle: DriverHandle) {
        self.disconnects.lock().expect("lock poisoned").push(handle);
    }

    fn register_buffer(&self, handle: DriverHandle, buffer: PixelBuffer) -> Option<PixelBuffer> {
        self.buffers
            .lock()
            .expect("lock poisoned")
            .insert((handle, buffer.id), buffer)
    }

    fn unregister_buffer(&self, handle: DriverHandle, buffer_id: i32) -> Option<PixelBuffer> {
        self.buffers
            .lock()
            .expect("lock poisoned")
            .remove(&(handle, buffer_id))
    }

    fn request_update(&self, handle: DriverHandle, buffer_id: i32) -> bool {
        self.buffers
            .lock()
            .expect("lock poisoned")
            .contains_key(&(handle, buffer_id))
    }

    fn grab_pixels(&self, _handle: DriverHandle) -> Vec<DirtyRect> {
        vec![DirtyRect {
            x1: 0,
            y1: 0,
            x2: 16,
            y2: 16,
        }]
    }

    fn handle_events(&self, _handle: DriverHandle) {}

    fn event_ready(&self, _handle: DriverHandle) -> i32 {
        self.event_ready.load(Ordering::SeqCst)
    }

    fn version(&self) -> LibVersion {
        LibVersion {
            major: 1,
            minor: 14,
            patch: 1,
        }
    }
}

/// A loader that hands out a fixed driver or a fixed error.
pub struct MockDriverLoader {
    outcome: Result<Arc<dyn DisplayDriver>, BindError>,
    loads: Arc<AtomicUsize>,
}

impl MockDriverLoader {
    /// Loads succeed and return `driver`.
    pub fn available(driver: Arc<dyn DisplayDriver>) -> Self {
        Self {
            outcome: Ok(driver),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loads fail as if no library were installed.
    pub fn not_installed() -> Self {
        Self {
            outcome: Err(BindError::LibraryNotFound {
                tried: vec!["libevdi.so.1".to_string()],
                last_error: "libevdi.so.1: cannot open shared object file".to_string(),
            }),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loads fail as if `symbol` were missing from the library.
    pub fn missing_symbol(symbol: &str) -> Self {
        Self {
            outcome: Err(BindError::MissingSymbol {
                library: "libevdi.so.1".to_string(),
                symbol: symbol.to_string(),
                reason: "undefined symbol".to_string(),
            }),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `load` calls, usable after the loader is boxed.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl DriverLoader for MockDriverLoader {
    fn load(&self) -> Result<Arc<dyn DisplayDriver>, BindError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// A kernel module probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticModuleProbe(pub bool);

impl ModuleProbe for StaticModuleProbe {
    fn is_loaded(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_device_fills_first_empty_slot() {
        // Arrange
        let driver = MockDriver::with_slots(vec![DeviceStatus::Unrecognized, DeviceStatus::NotPresent]);

        // Act
        let added = driver.add_device();

        // Assert
        assert!(added);
        assert_eq!(driver.check_device(1), DeviceStatus::Available);
        assert_eq!(driver.added_devices(), 1);
    }

    #[test]
    fn test_slots_past_configured_range_are_not_present() {
        let driver = MockDriver::available(1);
        assert_eq!(driver.check_device(5), DeviceStatus::NotPresent);
    }

    #[test]
    fn test_buffer_ownership_returns_on_unregister() {
        // Arrange
        let driver = MockDriver::available(1);
        let handle = MockDriver::handle_for(0);
        driver.register_buffer(handle, PixelBuffer::new_xrgb(4, 8, 8));

        // Act
        let ready = driver.request_update(handle, 4);
        let buffer = driver.unregister_buffer(handle, 4);

        // Assert
        assert!(ready);
        assert_eq!(buffer.map(|b| b.data.len()), Some(8 * 8 * 4));
        assert_eq!(driver.registered_buffers(), 0);
    }

    #[test]
    fn test_failing_open_returns_none() {
        let driver = MockDriver::available(1);
        driver.set_fail_open(true);
        assert!(driver.open(0).is_none());
    }

    #[test]
    fn test_loader_counts_loads() {
        let loader = MockDriverLoader::not_installed();
        let counter = loader.load_counter();
        assert!(loader.load().is_err());
        assert!(loader.load().is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
