//! # vdisplay-core
//!
//! Shared library for the Linux virtual display manager containing the display
//! domain types and the EDID synthesizer.
//!
//! This crate has zero dependencies on OS APIs, driver libraries, or device
//! nodes.  Everything here can be compiled and tested on any machine.
//!
//! # Architecture overview (for beginners)
//!
//! A streaming host needs somewhere to render frames for a remote client even
//! when no monitor is plugged in.  The `vdisplay-linux` crate creates such
//! "virtual" outputs through the optional EVDI kernel driver.  Before the
//! driver will light up an output it must be handed an EDID blob describing
//! the fake monitor, and that blob has to advertise exactly the resolution and
//! refresh rate the client asked for.
//!
//! This crate (`vdisplay-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – The vocabulary of the system: driver status codes, display
//!   modes with milli-Hz refresh rates, and how a display name is derived from
//!   its identity.
//!
//! - **`edid`** – A pure function that turns `(width, height, refresh)` into a
//!   byte-exact 128- or 256-byte EDID, including the CEA-861 extension block
//!   and the per-block checksums.

pub mod domain;
pub mod edid;

pub use domain::display::{
    display_name_for, identity_key, needs_extension_block, DisplayId, DisplayMode, RefreshRate,
    DISPLAY_NAME_PREFIX,
};
pub use domain::status::DriverStatus;
pub use edid::{synthesize, synthesize_for, verify, EdidError, EDID_BLOCK_SIZE};
pub use edid::timing::DetailedTiming;
