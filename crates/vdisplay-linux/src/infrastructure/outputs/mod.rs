//! Physical output enumeration.
//!
//! Finds the real monitors attached to the host so the manager can answer
//! "which output is primary?".  Virtual EVDI outputs show up as DRM cards
//! too, but only once connected, and they are created after the host asks
//! this question.
//!
//! # Platform implementations
//!
//! | Module  | OS    | API used                                          |
//! |---------|-------|---------------------------------------------------|
//! | `linux` | Linux | DRM mode-setting ioctls via the `drm` crate       |
//!
//! The Linux implementation is re-exported as `NativeOutputEnumerator`.  A
//! [`MockOutputEnumerator`] is always compiled so tests can run without any
//! GPU.

use std::path::PathBuf;

use crate::application::report_outputs::{OutputEnumerator, OutputError, PhysicalOutput};

// ── Linux implementation ──────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
pub mod linux;

/// Re-export the DRM enumerator as `NativeOutputEnumerator` on Linux.
#[cfg(target_os = "linux")]
pub use linux::DrmOutputEnumerator as NativeOutputEnumerator;

// ── Mock implementation (always compiled for tests) ───────────────────────────

/// An output enumerator with a fixed answer.
pub struct MockOutputEnumerator {
    /// The outputs returned by every call.
    pub outputs: Vec<PhysicalOutput>,
    /// When `true`, every call fails instead.
    pub fail: bool,
}

impl MockOutputEnumerator {
    /// A single connected `HDMI-A-1` at 1920×1080 on `card0`.
    pub fn single_hdmi() -> Self {
        Self {
            outputs: vec![PhysicalOutput {
                name: "HDMI-A-1".to_string(),
                card: PathBuf::from("/dev/dri/card0"),
                preferred_size: Some((1920, 1080)),
            }],
            fail: false,
        }
    }

    /// A headless machine.
    pub fn headless() -> Self {
        Self {
            outputs: Vec::new(),
            fail: false,
        }
    }

    /// Enumeration fails outright.
    pub fn failing() -> Self {
        Self {
            outputs: Vec::new(),
            fail: true,
        }
    }
}

impl OutputEnumerator for MockOutputEnumerator {
    fn connected_outputs(&self) -> Result<Vec<PhysicalOutput>, OutputError> {
        if self.fail {
            return Err(OutputError::Platform("mock enumeration failure".to_string()));
        }
        Ok(self.outputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report_outputs::primary_output_name;

    #[test]
    fn test_mock_single_hdmi_is_primary() {
        let enumerator = MockOutputEnumerator::single_hdmi();
        assert_eq!(primary_output_name(&enumerator).as_deref(), Some("HDMI-A-1"));
    }

    #[test]
    fn test_mock_headless_has_no_primary() {
        assert_eq!(primary_output_name(&MockOutputEnumerator::headless()), None);
    }

    #[test]
    fn test_mock_failing_returns_error() {
        assert!(MockOutputEnumerator::failing().connected_outputs().is_err());
    }
}
