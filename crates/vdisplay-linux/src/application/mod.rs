//! Application layer use cases for the virtual display manager.
//!
//! # What lives here?
//!
//! - **`bind_driver`** – The [`DisplayDriver`](bind_driver::DisplayDriver)
//!   port that mirrors the EVDI entry-point table, the loader and kernel
//!   module ports, and the `CapabilityBinder` that turns "is the library
//!   installed?" into a [`Capability`](bind_driver::Capability) value.
//!
//! - **`report_outputs`** – The port for enumerating physical DRM outputs
//!   and the helper that picks the primary one.
//!
//! - **`registry`** – The virtual display records and the map that owns them.
//!
//! - **`manage_displays`** – `DisplayManager`, the context object that the
//!   host service drives: initialize, create, reconfigure, remove, shutdown.
//!
//! - **`health_monitor`** – The background thread that polls live displays
//!   and publishes `DisplayLost` events.
//!
//! Nothing in this layer touches the OS directly; every OS call goes through
//! a trait implemented in `infrastructure`.

pub mod bind_driver;
pub mod health_monitor;
pub mod manage_displays;
pub mod registry;
pub mod report_outputs;
