//! Display identities, modes and naming.
//!
//! A virtual display is identified by an opaque UUID supplied by the host
//! service.  Everything human-facing (log lines, compositor output names,
//! substring matching) uses a shorter derived name instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a virtual display, supplied by the caller.
pub type DisplayId = Uuid;

/// Prefix of every derived display name.
pub const DISPLAY_NAME_PREFIX: &str = "VIRTUAL-";

/// Number of identity characters appended to [`DISPLAY_NAME_PREFIX`].
const NAME_ID_CHARS: usize = 8;

/// Largest width or height that still fits in a single base EDID block
/// without the CEA extension.
const BASE_BLOCK_MAX_WIDTH: u32 = 1920;
const BASE_BLOCK_MAX_HEIGHT: u32 = 1080;

/// Derives the human-readable display name for `id`.
///
/// The name is the fixed prefix followed by the first eight characters of the
/// canonical (lowercase, hyphenated) UUID string, e.g. `VIRTUAL-67e55044`.
pub fn display_name_for(id: &DisplayId) -> String {
    let canonical = id.hyphenated().to_string();
    format!("{DISPLAY_NAME_PREFIX}{}", &canonical[..NAME_ID_CHARS])
}

/// Returns the registry key for `id` (the canonical UUID string).
pub fn identity_key(id: &DisplayId) -> String {
    id.hyphenated().to_string()
}

/// Returns `true` when a `width`×`height` mode needs the CEA extension
/// block, i.e. when either dimension exceeds 1920×1080.
pub const fn needs_extension_block(width: u32, height: u32) -> bool {
    width > BASE_BLOCK_MAX_WIDTH || height > BASE_BLOCK_MAX_HEIGHT
}

/// A refresh rate stored in milli-Hz so fractional rates such as 59.94 Hz
/// survive the trip through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefreshRate {
    milli_hz: u32,
}

impl RefreshRate {
    /// Creates a rate from milli-Hz (e.g. `59940` for 59.94 Hz).
    pub const fn from_milli_hz(milli_hz: u32) -> Self {
        Self { milli_hz }
    }

    /// Creates a rate from whole Hz.
    pub const fn from_hz(hz: u32) -> Self {
        Self {
            milli_hz: hz.saturating_mul(1000),
        }
    }

    /// Returns the stored rate in milli-Hz.
    pub const fn milli_hz(self) -> u32 {
        self.milli_hz
    }

    /// Returns the rate in whole Hz, truncating any fractional part.
    ///
    /// This is the value handed to the EDID synthesizer.
    pub const fn whole_hz(self) -> u32 {
        self.milli_hz / 1000
    }
}

/// A requested display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh: RefreshRate,
}

impl DisplayMode {
    pub const fn new(width: u32, height: u32, refresh: RefreshRate) -> Self {
        Self {
            width,
            height,
            refresh,
        }
    }

    /// See [`needs_extension_block`].
    pub const fn needs_extension_block(&self) -> bool {
        needs_extension_block(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_uses_prefix_and_first_eight_id_chars() {
        // Arrange
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();

        // Act
        let name = display_name_for(&id);

        // Assert
        assert_eq!(name, "VIRTUAL-67e55044");
    }

    #[test]
    fn test_identity_key_is_canonical_hyphenated_lowercase() {
        let id = Uuid::parse_str("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        assert_eq!(identity_key(&id), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn test_refresh_rate_truncates_fractional_hz() {
        assert_eq!(RefreshRate::from_milli_hz(59_940).whole_hz(), 59);
        assert_eq!(RefreshRate::from_milli_hz(60_000).whole_hz(), 60);
    }

    #[test]
    fn test_refresh_rate_from_hz_round_trips_to_milli_hz() {
        assert_eq!(RefreshRate::from_hz(144).milli_hz(), 144_000);
    }

    #[test]
    fn test_extension_block_needed_only_above_1080p() {
        let hz = RefreshRate::from_hz(60);
        assert!(!DisplayMode::new(1920, 1080, hz).needs_extension_block());
        assert!(!DisplayMode::new(1280, 720, hz).needs_extension_block());
        assert!(DisplayMode::new(1921, 1080, hz).needs_extension_block());
        assert!(DisplayMode::new(1920, 1081, hz).needs_extension_block());
        assert!(DisplayMode::new(3840, 2160, hz).needs_extension_block());
    }
}
