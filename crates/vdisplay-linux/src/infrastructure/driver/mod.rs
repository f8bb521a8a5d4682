//! EVDI driver adapters.
//!
//! | Module          | Implements     | Notes                                   |
//! |-----------------|----------------|-----------------------------------------|
//! | `evdi`          | `DisplayDriver`, `DriverLoader` | `dlopen`s `libevdi` via `libloading` |
//! | `kernel_module` | `ModuleProbe`  | `/proc/modules` + `/sys/module/evdi`    |
//! | `mock`          | all three      | In-memory doubles, always compiled      |

pub mod evdi;
pub mod kernel_module;
pub mod mock;

pub use evdi::{EvdiLibrary, EvdiLoader, DEFAULT_LIBRARY_CANDIDATES};
pub use kernel_module::KernelModuleProbe;
pub use mock::{MockDriver, MockDriverLoader, StaticModuleProbe};
