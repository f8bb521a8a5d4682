//! Kernel module presence check.
//!
//! The EVDI library can be installed while the `evdi` kernel module is not
//! loaded (for example right after installing the DKMS package without a
//! reboot).  Opening a device in that state fails, so the manager checks the
//! module first.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::application::bind_driver::ModuleProbe;

/// Checks `/proc/modules` and the module's sysfs directory.
#[derive(Debug, Clone)]
pub struct KernelModuleProbe {
    module_name: String,
    proc_modules: PathBuf,
    sysfs_marker: PathBuf,
}

impl KernelModuleProbe {
    pub fn new(
        module_name: impl Into<String>,
        proc_modules: impl Into<PathBuf>,
        sysfs_marker: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            proc_modules: proc_modules.into(),
            sysfs_marker: sysfs_marker.into(),
        }
    }

    /// Probe for the `evdi` module at the standard locations.
    pub fn evdi() -> Self {
        Self::new("evdi", "/proc/modules", "/sys/module/evdi")
    }

    fn listed_in_proc_modules(&self) -> bool {
        match std::fs::read_to_string(&self.proc_modules) {
            Ok(content) => content
                .lines()
                .any(|line| line.split_whitespace().next() == Some(self.module_name.as_str())),
            Err(e) => {
                debug!(path = %self.proc_modules.display(), "cannot read module list: {e}");
                false
            }
        }
    }
}

impl ModuleProbe for KernelModuleProbe {
    fn is_loaded(&self) -> bool {
        let loaded = self.listed_in_proc_modules() || self.sysfs_marker.exists();
        if loaded {
            info!(module = %self.module_name, "kernel module loaded");
        } else {
            warn!(module = %self.module_name, "kernel module not loaded");
        }
        loaded
    }
}
