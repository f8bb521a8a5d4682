//! Runtime bindings for `libevdi`.
//!
//! The library is opened with `dlopen` (through `libloading`) rather than
//! linked, so the binary still runs on machines without EVDI installed.
//!
//! # Why dynamic loading? (for beginners)
//!
//! If we linked against `libevdi.so` at build time, the dynamic loader would
//! refuse to start `vdisplayd` on any machine that lacks the library.  By
//! opening it ourselves we can fall back to passthrough mode instead.
//!
//! All thirteen entry points are resolved up front.  If any one is missing
//! the [`Library`] is dropped before returning, so a half-resolved table is
//! never visible to callers.

use std::collections::HashMap;
use std::ffi::{c_int, c_uchar, c_uint, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use libloading::{Library, Symbol};
use tracing::{debug, info};

use crate::application::bind_driver::{
    BindError, DeviceStatus, DirtyRect, DisplayDriver, DriverHandle, DriverLoader, LibVersion,
    PixelBuffer,
};

/// Library names tried in order; the first that opens wins.
pub const DEFAULT_LIBRARY_CANDIDATES: [&str; 6] = [
    "libevdi.so.1",
    "libevdi.so",
    "/usr/lib/libevdi.so.1",
    "/usr/lib/libevdi.so",
    "/usr/local/lib/libevdi.so.1",
    "/usr/local/lib/libevdi.so",
];

/// Upper bound on dirty rectangles per `evdi_grab_pixels` call.
const MAX_DIRTY_RECTS: usize = 16;

// ── C ABI types (evdi_lib.h) ──────────────────────────────────────────────────

const EVDI_AVAILABLE: c_int = 0;
const EVDI_UNRECOGNIZED: c_int = 1;
const EVDI_NOT_PRESENT: c_int = 2;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct EvdiLibVersion {
    version_major: c_int,
    version_minor: c_int,
    version_patchlevel: c_int,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct EvdiRect {
    x1: c_int,
    y1: c_int,
    x2: c_int,
    y2: c_int,
}

#[repr(C)]
struct EvdiBuffer {
    id: c_int,
    buffer: *mut c_void,
    width: c_int,
    height: c_int,
    stride: c_int,
    rects: *mut EvdiRect,
    rect_count: c_int,
}

/// `evdi_event_context`: seven handler slots plus user data.  Null handlers
/// tell the library to discard that event type.
#[repr(C)]
struct EvdiEventContext {
    dpms_handler: *const c_void,
    mode_changed_handler: *const c_void,
    update_ready_handler: *const c_void,
    crtc_state_handler: *const c_void,
    cursor_set_handler: *const c_void,
    cursor_move_handler: *const c_void,
    ddcci_data_handler: *const c_void,
    user_data: *mut c_void,
}

impl EvdiEventContext {
    fn discard_all() -> Self {
        Self {
            dpms_handler: ptr::null(),
            mode_changed_handler: ptr::null(),
            update_ready_handler: ptr::null(),
            crtc_state_handler: ptr::null(),
            cursor_set_handler: ptr::null(),
            cursor_move_handler: ptr::null(),
            ddcci_data_handler: ptr::null(),
            user_data: ptr::null_mut(),
        }
    }
}

type EvdiHandle = *mut c_void;

type EvdiCheckDevice = unsafe extern "C" fn(device: c_int) -> c_int;
type EvdiOpen = unsafe extern "C" fn(device: c_int) -> EvdiHandle;
type EvdiAddDevice = unsafe extern "C" fn() -> c_int;
type EvdiClose = unsafe extern "C" fn(handle: EvdiHandle);
type EvdiConnect = unsafe extern "C" fn(
    handle: EvdiHandle,
    edid: *const c_uchar,
    edid_length: c_uint,
    sku_area_limit: u32,
);
type EvdiDisconnect = unsafe extern "C" fn(handle: EvdiHandle);
type EvdiGrabPixels =
    unsafe extern "C" fn(handle: EvdiHandle, rects: *mut EvdiRect, num_rects: *mut c_int);
type EvdiRegisterBuffer = unsafe extern "C" fn(handle: EvdiHandle, buffer: EvdiBuffer);
type EvdiUnregisterBuffer = unsafe extern "C" fn(handle: EvdiHandle, buffer_id: c_int);
type EvdiRequestUpdate = unsafe extern "C" fn(handle: EvdiHandle, buffer_id: c_int) -> bool;
type EvdiHandleEvents = unsafe extern "C" fn(handle: EvdiHandle, ctx: *mut EvdiEventContext);
type EvdiGetEventReady = unsafe extern "C" fn(handle: EvdiHandle) -> c_int;
type EvdiGetLibVersion = unsafe extern "C" fn(version: *mut EvdiLibVersion);

// ── EvdiLibrary ───────────────────────────────────────────────────────────────

/// A loaded `libevdi` with every entry point resolved.
///
/// The function pointers stay valid for as long as `_library` is alive, which
/// is as long as this struct.
pub struct EvdiLibrary {
    _library: Library,
    path: String,
    check_device: EvdiCheckDevice,
    open: EvdiOpen,
    add_device: EvdiAddDevice,
    close: EvdiClose,
    connect: EvdiConnect,
    disconnect: EvdiDisconnect,
    grab_pixels: EvdiGrabPixels,
    register_buffer: EvdiRegisterBuffer,
    unregister_buffer: EvdiUnregisterBuffer,
    request_update: EvdiRequestUpdate,
    handle_events: EvdiHandleEvents,
    get_event_ready: EvdiGetEventReady,
    get_lib_version: EvdiGetLibVersion,
    /// Buffers currently registered, keyed by (handle address, buffer id).
    registered: Mutex<HashMap<(usize, i32), PixelBuffer>>,
}

impl EvdiLibrary {
    /// Resolves every entry point from an already opened library.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MissingSymbol`] for the first entry point that
    /// cannot be found.  The library is dropped (unloaded) in that case.
    pub fn from_library(library: Library, path: &str) -> Result<Self, BindError> {
        // SAFETY: every type alias above matches the prototype in evdi_lib.h.
        unsafe {
            let check_device = resolve::<EvdiCheckDevice>(&library, path, "evdi_check_device")?;
            let open = resolve::<EvdiOpen>(&library, path, "evdi_open")?;
            let add_device = resolve::<EvdiAddDevice>(&library, path, "evdi_add_device")?;
            let close = resolve::<EvdiClose>(&library, path, "evdi_close")?;
            let connect = resolve::<EvdiConnect>(&library, path, "evdi_connect")?;
            let disconnect = resolve::<EvdiDisconnect>(&library, path, "evdi_disconnect")?;
            let grab_pixels = resolve::<EvdiGrabPixels>(&library, path, "evdi_grab_pixels")?;
            let register_buffer =
                resolve::<EvdiRegisterBuffer>(&library, path, "evdi_register_buffer")?;
            let unregister_buffer =
                resolve::<EvdiUnregisterBuffer>(&library, path, "evdi_unregister_buffer")?;
            let request_update =
                resolve::<EvdiRequestUpdate>(&library, path, "evdi_request_update")?;
            let handle_events = resolve::<EvdiHandleEvents>(&library, path, "evdi_handle_events")?;
            let get_event_ready =
                resolve::<EvdiGetEventReady>(&library, path, "evdi_get_event_ready")?;
            let get_lib_version =
                resolve::<EvdiGetLibVersion>(&library, path, "evdi_get_lib_version")?;

            Ok(Self {
                _library: library,
                path: path.to_string(),
                check_device,
                open,
                add_device,
                close,
                connect,
                disconnect,
                grab_pixels,
                register_buffer,
                unregister_buffer,
                request_update,
                handle_events,
                get_event_ready,
                get_lib_version,
                registered: Mutex::new(HashMap::new()),
            })
        }
    }

    /// The path or soname the library was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Looks up `symbol` and copies the function pointer out of the `Symbol`.
///
/// # Safety
///
/// `T` must be the exact function pointer type of `symbol`.
unsafe fn resolve<T: Copy>(library: &Library, path: &str, symbol: &str) -> Result<T, BindError> {
    let sym: Symbol<T> = library
        .get(symbol.as_bytes())
        .map_err(|e| BindError::MissingSymbol {
            library: path.to_string(),
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;
    Ok(*sym)
}

fn device_index(slot: u32) -> c_int {
    c_int::try_from(slot).unwrap_or(c_int::MAX)
}

impl DisplayDriver for EvdiLibrary {
    fn check_device(&self, slot: u32) -> DeviceStatus {
        // SAFETY: plain integer call.
        match unsafe { (self.check_device)(device_index(slot)) } {
            EVDI_AVAILABLE => DeviceStatus::Available,
            EVDI_NOT_PRESENT => DeviceStatus::NotPresent,
            EVDI_UNRECOGNIZED => DeviceStatus::Unrecognized,
            other => {
                debug!(slot, status = other, "unknown EVDI device status");
                DeviceStatus::Unrecognized
            }
        }
    }

    fn add_device(&self) -> bool {
        // SAFETY: no arguments.
        unsafe { (self.add_device)() > 0 }
    }

    fn open(&self, slot: u32) -> Option<DriverHandle> {
        // SAFETY: plain integer call; a null result is mapped to `None`.
        DriverHandle::from_raw(unsafe { (self.open)(device_index(slot)) })
    }

    fn close(&self, handle: DriverHandle) {
        let key = handle.as_ptr() as usize;
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(owner, _), _| *owner != key);
        // SAFETY: `handle` came from `evdi_open` and is closed exactly once
        // by the record that owns it.
        unsafe { (self.close)(handle.as_ptr()) }
    }

    fn connect(&self, handle: DriverHandle, edid: &[u8], sku_area_limit: u32) {
        let Ok(len) = c_uint::try_from(edid.len()) else {
            return;
        };
        // SAFETY: the library copies the EDID before returning.
        unsafe { (self.connect)(handle.as_ptr(), edid.as_ptr(), len, sku_area_limit) }
    }

    fn disconnect(&self, handle: DriverHandle) {
        // SAFETY: `handle` is a live handle from `evdi_open`.
        unsafe { (self.disconnect)(handle.as_ptr()) }
    }

    fn register_buffer(&self, handle: DriverHandle, buffer: PixelBuffer) -> Option<PixelBuffer> {
        let key = (handle.as_ptr() as usize, buffer.id);
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);

        // The library keeps the old pixel pointer until it is unregistered.
        let replaced = registered.remove(&key);
        if replaced.is_some() {
            debug!(buffer_id = buffer.id, "replacing registered buffer");
            // SAFETY: `handle` is live and the old memory is still owned by
            // `replaced` while the library drops its reference.
            unsafe { (self.unregister_buffer)(handle.as_ptr(), buffer.id) }
        }

        let stored = registered.entry(key).or_insert(buffer);

        let raw = EvdiBuffer {
            id: stored.id,
            buffer: stored.data.as_mut_ptr().cast(),
            width: stored.width,
            height: stored.height,
            stride: stored.stride,
            rects: ptr::null_mut(),
            rect_count: 0,
        };
        // SAFETY: the pixel memory is owned by `registered` until the buffer
        // is unregistered, and a Vec's heap allocation does not move when the
        // map rehashes.
        unsafe { (self.register_buffer)(handle.as_ptr(), raw) }
        replaced
    }

    fn unregister_buffer(&self, handle: DriverHandle, buffer_id: i32) -> Option<PixelBuffer> {
        // SAFETY: unregistering an unknown id is ignored by the library.
        unsafe { (self.unregister_buffer)(handle.as_ptr(), buffer_id) }
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(handle.as_ptr() as usize, buffer_id))
    }

    fn request_update(&self, handle: DriverHandle, buffer_id: i32) -> bool {
        // SAFETY: `handle` is live.
        unsafe { (self.request_update)(handle.as_ptr(), buffer_id) }
    }

    fn grab_pixels(&self, handle: DriverHandle) -> Vec<DirtyRect> {
        let mut rects = [EvdiRect::default(); MAX_DIRTY_RECTS];
        let mut count: c_int = 0;
        // SAFETY: `rects` has room for MAX_DIRTY_RECTS entries, the maximum
        // the library writes.
        unsafe { (self.grab_pixels)(handle.as_ptr(), rects.as_mut_ptr(), &mut count) };

        let count = usize::try_from(count).unwrap_or(0).min(MAX_DIRTY_RECTS);
        rects[..count]
            .iter()
            .map(|r| DirtyRect {
                x1: r.x1,
                y1: r.y1,
                x2: r.x2,
                y2: r.y2,
            })
            .collect()
    }

    fn handle_events(&self, handle: DriverHandle) {
        let mut ctx = EvdiEventContext::discard_all();
        // SAFETY: `ctx` outlives the call and every handler slot is null.
        unsafe { (self.handle_events)(handle.as_ptr(), &mut ctx) }
    }

    fn event_ready(&self, handle: DriverHandle) -> i32 {
        // SAFETY: `handle` is live.
        unsafe { (self.get_event_ready)(handle.as_ptr()) }
    }

    fn version(&self) -> LibVersion {
        let mut v = EvdiLibVersion::default();
        // SAFETY: `v` is a valid out-pointer.
        unsafe { (self.get_lib_version)(&mut v) };
        LibVersion {
            major: v.version_major,
            minor: v.version_minor,
            patch: v.version_patchlevel,
        }
    }
}

// ── EvdiLoader ────────────────────────────────────────────────────────────────

/// Opens the first loadable library from a candidate list.
#[derive(Debug, Clone)]
pub struct EvdiLoader {
    candidates: Vec<String>,
}

impl EvdiLoader {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

impl Default for EvdiLoader {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_CANDIDATES.iter().map(|s| s.to_string()).collect())
    }
}

impl DriverLoader for EvdiLoader {
    fn load(&self) -> Result<Arc<dyn DisplayDriver>, BindError> {
        let mut last_error = String::from("no candidates configured");

        for candidate in &self.candidates {
            // SAFETY: libevdi has no library constructors with side effects
            // beyond its own initialization.
            match unsafe { Library::new(candidate) } {
                Ok(library) => {
                    info!(library = %candidate, "loaded EVDI library");
                    let evdi = EvdiLibrary::from_library(library, candidate)?;
                    return Ok(Arc::new(evdi));
                }
                Err(e) => {
                    debug!(library = %candidate, "could not open: {e}");
                    last_error = e.to_string();
                }
            }
        }

        Err(BindError::LibraryNotFound {
            tried: self.candidates.clone(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_loader_tries_sonames_before_absolute_paths() {
        let loader = EvdiLoader::default();
        assert_eq!(loader.candidates()[0], "libevdi.so.1");
        assert_eq!(loader.candidates()[1], "libevdi.so");
        assert_eq!(loader.candidates().len(), 6);
    }

    #[test]
    fn test_loader_with_unloadable_paths_reports_every_candidate() {
        // Arrange
        let loader = EvdiLoader::new(vec![
            "/nonexistent/libevdi-test-a.so".to_string(),
            "/nonexistent/libevdi-test-b.so".to_string(),
        ]);

        // Act
        let result = loader.load();

        // Assert
        match result {
            Err(BindError::LibraryNotFound { tried, last_error }) => {
                assert_eq!(tried.len(), 2);
                assert!(!last_error.is_empty());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("nonexistent library must not load"),
        }
    }

    #[test]
    fn test_loader_with_no_candidates_fails() {
        let loader = EvdiLoader::new(Vec::new());
        assert!(matches!(
            loader.load(),
            Err(BindError::LibraryNotFound { .. })
        ));
    }

    #[test]
    fn test_event_context_discards_every_event() {
        let ctx = EvdiEventContext::discard_all();
        assert!(ctx.dpms_handler.is_null());
        assert!(ctx.ddcci_data_handler.is_null());
        assert!(ctx.user_data.is_null());
    }
}
