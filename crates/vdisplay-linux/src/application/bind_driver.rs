//! Driver capability binding: the EVDI port and the binder that negotiates it.
//!
//! # What is a "capability"? (for beginners)
//!
//! The EVDI user-space library is optional.  A machine may have it installed,
//! may have it installed without the matching kernel module, or may have
//! neither.  Instead of scattering `if library_loaded && module_loaded` checks
//! through the code, the manager asks the [`CapabilityBinder`] once during
//! initialization and stores the answer as a [`Capability`] value:
//!
//! - `Capability::Available(driver)` – real virtual outputs can be created
//!   through `driver`.
//! - `Capability::Unavailable(reason)` – every display is created in
//!   passthrough mode and `reason` says why.
//!
//! # Ports
//!
//! Three traits are defined here and implemented in the infrastructure layer:
//!
//! | Trait           | Real implementation         | Test implementation |
//! |-----------------|-----------------------------|---------------------|
//! | `DisplayDriver` | `EvdiLibrary` (libloading)  | `MockDriver`        |
//! | `DriverLoader`  | `EvdiLoader`                | `MockDriverLoader`  |
//! | `ModuleProbe`   | `KernelModuleProbe`         | `StaticModuleProbe` |

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

// ── Driver value types ────────────────────────────────────────────────────────

/// Result of asking the driver about one device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// The slot is an EVDI device and can be opened.
    Available,
    /// The slot exists but belongs to another DRM driver.
    Unrecognized,
    /// No device exists at this slot yet; one can be added.
    NotPresent,
}

/// Opaque handle to an opened EVDI device.
///
/// The pointer is owned by the driver library; this crate only passes it back
/// to driver calls and closes it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token.  libevdi serializes access to the
// underlying device internally and this crate never dereferences the pointer.
unsafe impl Send for DriverHandle {}
// SAFETY: see above.
unsafe impl Sync for DriverHandle {}

impl DriverHandle {
    /// Wraps a raw handle returned by the driver; `None` for a null pointer.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Returns the raw pointer for passing back into the driver.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Version triple reported by the driver library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LibVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl fmt::Display for LibVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A region of a registered buffer that the compositor changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// A caller-owned pixel buffer that the driver copies frames into.
///
/// Registering a buffer moves it into the driver wrapper so its memory stays
/// alive while the kernel may write to it; unregistering hands it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub id: i32,
    pub width: i32,
    pub height: i32,
    /// Bytes per row.
    pub stride: i32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocates a zeroed 32-bit-per-pixel buffer for a `width`×`height` frame.
    pub fn new_xrgb(id: i32, width: i32, height: i32) -> Self {
        let stride = width.max(0) * 4;
        let len = usize::try_from(stride).unwrap_or(0) * usize::try_from(height).unwrap_or(0);
        Self {
            id,
            width,
            height,
            stride,
            data: vec![0; len],
        }
    }
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// The EVDI entry-point table as seen by the application layer.
///
/// Methods mirror the C library one-to-one.  None of them return `Result`
/// because the library itself reports nothing beyond the values shown here.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayDriver: Send + Sync {
    /// Reports whether device slot `slot` is usable.
    fn check_device(&self, slot: u32) -> DeviceStatus;

    /// Asks the kernel module to instantiate one more EVDI device.
    ///
    /// Returns `true` if the request was accepted.
    fn add_device(&self) -> bool;

    /// Opens device slot `slot`; `None` if the driver refused.
    fn open(&self, slot: u32) -> Option<DriverHandle>;

    /// Closes a handle previously returned by [`open`](Self::open).
    fn close(&self, handle: DriverHandle);

    /// Plugs a virtual monitor described by `edid` into the device.
    ///
    /// `sku_area_limit` caps the pixel area the driver will accept; `0`
    /// means unlimited.
    fn connect(&self, handle: DriverHandle, edid: &[u8], sku_area_limit: u32);

    /// Unplugs the virtual monitor.
    fn disconnect(&self, handle: DriverHandle);

    /// Registers a frame buffer with the device.
    ///
    /// A buffer already registered under the same id is unregistered first
    /// and returned.
    fn register_buffer(&self, handle: DriverHandle, buffer: PixelBuffer) -> Option<PixelBuffer>;

    /// Unregisters a frame buffer and returns it to the caller.
    fn unregister_buffer(&self, handle: DriverHandle, buffer_id: i32) -> Option<PixelBuffer>;

    /// Asks the driver to copy the next frame into buffer `buffer_id`.
    ///
    /// Returns `true` if the frame is already available.
    fn request_update(&self, handle: DriverHandle, buffer_id: i32) -> bool;

    /// Copies pending pixels and returns the dirty rectangles.
    fn grab_pixels(&self, handle: DriverHandle) -> Vec<DirtyRect>;

    /// Drains pending driver events.
    fn handle_events(&self, handle: DriverHandle);

    /// Returns the event readiness descriptor; negative means the device is
    /// gone.
    fn event_ready(&self, handle: DriverHandle) -> i32;

    /// Returns the library version.
    fn version(&self) -> LibVersion;
}

/// Error type for binding the driver library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// None of the candidate library paths could be opened.
    #[error("EVDI library not found (tried {}): {last_error}", .tried.join(", "))]
    LibraryNotFound {
        tried: Vec<String>,
        last_error: String,
    },

    /// The library opened but lacks a required entry point.
    #[error("EVDI library at {library} is missing symbol {symbol}: {reason}")]
    MissingSymbol {
        library: String,
        symbol: String,
        reason: String,
    },
}

/// Locates and loads the driver library.
pub trait DriverLoader: Send {
    /// Loads the library and resolves every entry point.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when no library opens or an entry point is
    /// missing.  On error nothing stays loaded.
    fn load(&self) -> Result<Arc<dyn DisplayDriver>, BindError>;
}

/// Checks whether the driver's kernel module is loaded.
pub trait ModuleProbe: Send + Sync {
    fn is_loaded(&self) -> bool;
}

// ── Capability ────────────────────────────────────────────────────────────────

/// Why real virtual outputs cannot be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// `initialize` has not run yet, or the manager was shut down.
    NotInitialized,
    /// The user-space library could not be bound.
    LibraryUnavailable(BindError),
    /// The library is bound but the kernel module is not loaded.
    KernelModuleMissing,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "driver not initialized"),
            Self::LibraryUnavailable(e) => write!(f, "{e}"),
            Self::KernelModuleMissing => write!(f, "EVDI kernel module not loaded"),
        }
    }
}

/// Whether this session can create real virtual outputs.
#[derive(Clone)]
pub enum Capability {
    Available(Arc<dyn DisplayDriver>),
    Unavailable(UnavailableReason),
}

impl Capability {
    /// Returns the driver when real outputs are available.
    pub fn driver(&self) -> Option<Arc<dyn DisplayDriver>> {
        match self {
            Self::Available(driver) => Some(Arc::clone(driver)),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(driver) => f
                .debug_tuple("Available")
                .field(&driver.version())
                .finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

// ── Binder ────────────────────────────────────────────────────────────────────

/// Owns the loaded driver library for one manager.
///
/// `bind` is idempotent while the library is loaded and `unbind` may be
/// called any number of times.  After `unbind` the binder can bind again.
pub struct CapabilityBinder {
    loader: Box<dyn DriverLoader>,
    driver: Option<Arc<dyn DisplayDriver>>,
    last_error: Option<BindError>,
}

impl CapabilityBinder {
    pub fn new(loader: Box<dyn DriverLoader>) -> Self {
        Self {
            loader,
            driver: None,
            last_error: None,
        }
    }

    /// Loads the driver library if it is not loaded yet.
    ///
    /// Returns `true` when a driver is bound.  A missing library is logged as
    /// a warning with installation guidance, not treated as an error.
    pub fn bind(&mut self) -> bool {
        if self.driver.is_some() {
            return true;
        }

        match self.loader.load() {
            Ok(driver) => {
                info!(version = %driver.version(), "EVDI library bound");
                self.driver = Some(driver);
                self.last_error = None;
                true
            }
            Err(e) => {
                match &e {
                    BindError::LibraryNotFound { .. } => {
                        warn!("{e}");
                        warn!("install the evdi package (e.g. evdi-dkms) for real virtual outputs; continuing in passthrough mode");
                    }
                    BindError::MissingSymbol { .. } => warn!("{e}; library released"),
                }
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Releases the driver library.  Safe to call when nothing is bound.
    pub fn unbind(&mut self) {
        if self.driver.take().is_some() {
            debug!("EVDI library released");
        }
    }

    /// Returns the bound driver, if any.
    pub fn driver(&self) -> Option<Arc<dyn DisplayDriver>> {
        self.driver.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.driver.is_some()
    }

    /// The error from the most recent failed `bind`, cleared on success.
    pub fn last_error(&self) -> Option<&BindError> {
        self.last_error.as_ref()
    }

    /// Binds the library and checks the kernel module, producing the session
    /// capability.
    ///
    /// A bound library without the kernel module downgrades the capability but
    /// keeps the library loaded.
    pub fn negotiate(&mut self, probe: &dyn ModuleProbe) -> Capability {
        if !self.bind() {
            let error = self.last_error.clone().unwrap_or(BindError::LibraryNotFound {
                tried: Vec::new(),
                last_error: String::new(),
            });
            return Capability::Unavailable(UnavailableReason::LibraryUnavailable(error));
        }

        if !probe.is_loaded() {
            warn!("EVDI library present but kernel module not loaded; run `sudo modprobe evdi` for real virtual outputs");
            return Capability::Unavailable(UnavailableReason::KernelModuleMissing);
        }

        match self.driver() {
            Some(driver) => Capability::Available(driver),
            None => Capability::Unavailable(UnavailableReason::NotInitialized),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
