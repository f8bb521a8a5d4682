//! Domain entities for the virtual display manager.
//!
//! Domain code holds the core rules of the system and never imports OS APIs,
//! driver bindings or device-node helpers.  The infrastructure and
//! application layers in `vdisplay-linux` depend on these types; the reverse
//! is never true.

/// Display identities, modes and naming.
pub mod display;

/// Driver lifecycle status codes.
pub mod status;
