//! Infrastructure layer for the virtual display manager.
//!
//! Contains the OS-facing adapters that implement the application ports.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `vdisplay_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`driver`** – `libevdi` bindings loaded with `libloading`, the kernel
//!   module probe, and in-memory driver doubles.
//! - **`outputs`** – DRM connector enumeration for the primary-display query.
//! - **`device_node`** – Opens `/dev/dri/card<N>` for an EVDI slot.
//! - **`storage`** – TOML configuration file.

pub mod device_node;
pub mod driver;
pub mod outputs;
pub mod storage;

/// Builds a `DisplayManager` wired to the real EVDI library, kernel module
/// probe, DRM device nodes, and DRM output enumerator described by `config`.
#[cfg(target_os = "linux")]
pub fn native_display_manager(
    config: &storage::config::AppConfig,
) -> crate::application::manage_displays::DisplayManager {
    let driver_cfg = &config.driver;
    crate::application::manage_displays::DisplayManager::new(
        Box::new(driver::EvdiLoader::new(driver_cfg.library_paths.clone())),
        Box::new(driver::KernelModuleProbe::new(
            driver_cfg.kernel_module.clone(),
            driver_cfg.proc_modules_path.clone(),
            driver_cfg.sysfs_module_path.clone(),
        )),
        Box::new(device_node::DriCardNodes::new(
            driver_cfg.device_node_prefix.clone(),
        )),
        Box::new(outputs::NativeOutputEnumerator::new()),
        config.manager_settings(),
    )
}
