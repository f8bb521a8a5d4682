//! Driver lifecycle status.

use serde::{Deserialize, Serialize};

/// Status of the virtual display driver for one manager instance.
///
/// The numeric values are stable and are what the host service reports to
/// its own callers.
///
/// Only `Unknown → Ok` (initialize) and `Ok → Unknown` (shutdown) are ever
/// produced by the manager; the failure variants are reserved for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DriverStatus {
    /// Not initialized yet, or shut down.
    Unknown = 1,
    /// Initialized; displays can be created.
    Ok = 0,
    /// Initialization failed.
    Failed = -1,
    /// Driver version incompatible with this manager.
    VersionIncompatible = -2,
    /// The health monitor observed a failure.
    WatchdogFailed = -3,
    /// Virtual displays are not supported on this system.
    NotSupported = -4,
}

impl DriverStatus {
    /// Returns `true` once the manager has been initialized.
    pub fn is_ok(self) -> bool {
        self == DriverStatus::Ok
    }

    /// Returns the stable numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl Default for DriverStatus {
    fn default() -> Self {
        DriverStatus::Unknown
    }
}

impl TryFrom<i32> for DriverStatus {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            1 => Ok(DriverStatus::Unknown),
            0 => Ok(DriverStatus::Ok),
            -1 => Ok(DriverStatus::Failed),
            -2 => Ok(DriverStatus::VersionIncompatible),
            -3 => Ok(DriverStatus::WatchdogFailed),
            -4 => Ok(DriverStatus::NotSupported),
            _ => Err(()),
        }
    }
}
