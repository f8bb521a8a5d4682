//! vdisplay-linux library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does vdisplay-linux do? (for beginners)
//!
//! A streaming host wants to render a desktop for a remote client at the
//! client's own resolution, even when no monitor is plugged into the host.
//! On Linux the usual trick is EVDI: a kernel module that creates fake DRM
//! connectors, plus a user-space library (`libevdi`) used to plug a fake
//! monitor into one of them.
//!
//! This crate:
//!
//! 1. Loads `libevdi` at runtime if it is installed and checks that the
//!    `evdi` kernel module is present.  Neither is required: without them
//!    every display is created in *passthrough* mode and the host falls back
//!    to capturing an existing output.
//! 2. Keeps a registry of the virtual displays it created, keyed by the
//!    client identity.
//! 3. Hands each real display a synthesized EDID (from `vdisplay-core`) so
//!    the compositor offers exactly the requested mode.
//! 4. Watches the live displays in a background thread and reports a
//!    [`DisplayLost`](application::health_monitor::DisplayLost) event when the
//!    driver stops answering.
//! 5. Answers "which physical output is primary?" by walking `/dev/dri`.

/// Application layer: ports, the display registry, and the manager use case.
pub mod application;

/// Infrastructure layer: EVDI FFI, DRM enumeration, device nodes, config.
pub mod infrastructure;
