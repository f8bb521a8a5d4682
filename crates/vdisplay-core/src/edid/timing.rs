//! Detailed Timing Descriptor (DTD) computation and encoding.
//!
//! A DTD is the 18-byte EDID structure that tells the consumer exactly how to
//! drive one video mode: the pixel clock plus the active, blanking, porch and
//! sync lengths in both directions.
//!
//! # Split-nibble packing (for beginners)
//!
//! EDID 1.x squeezes 12-bit fields into 8-bit slots.  The low eight bits of a
//! field live in their own byte and the high four bits are parked in a shared
//! byte that follows, e.g. horizontal active and horizontal blanking:
//!
//! ```text
//! byte 2: h_active[7:0]
//! byte 3: h_blank[7:0]
//! byte 4: h_active[11:8] << 4 | h_blank[11:8]
//! ```
//!
//! Porch and sync fields are narrower (10 and 6 bits) and use the same idea
//! with two-bit groups in byte 11.

/// Size of one encoded descriptor in bytes.
pub const DTD_SIZE: usize = 18;

/// Reference width of the 27" 4K panel used to scale the physical size.
const REFERENCE_WIDTH_PX: u32 = 3840;
const REFERENCE_HEIGHT_PX: u32 = 2160;
const REFERENCE_WIDTH_MM: u32 = 600;
const REFERENCE_HEIGHT_MM: u32 = 340;

/// Largest value a 12-bit descriptor field can hold.
const DTD_FIELD_MAX: u32 = 0xFFF;

/// Refresh rates outside this range are clamped before the pixel-clock
/// approximation.  At 0 Hz the frame period is infinite, and above ~1800 Hz
/// the frame is shorter than the fixed vertical blanking allowance.
pub const APPROXIMATION_REFRESH_RANGE: std::ops::RangeInclusive<u32> = 1..=480;

/// Minimum vertical blanking time assumed by the reduced-blanking formula.
const MIN_VBLANK_US: f64 = 550.0;

/// Digital separate sync, positive horizontal and vertical polarity.
const SYNC_FLAGS: u8 = 0x1E;

/// Timing parameters for a single video mode.
///
/// All lengths are in pixels (horizontal) or lines (vertical).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailedTiming {
    pub pixel_clock_khz: u32,
    pub h_active: u32,
    pub h_blank: u32,
    pub h_front_porch: u32,
    pub h_sync: u32,
    pub v_active: u32,
    pub v_blank: u32,
    pub v_front_porch: u32,
    pub v_sync: u32,
}

impl DetailedTiming {
    /// Returns the timing for `width`×`height`@`refresh_hz`.
    ///
    /// Four common 60 Hz modes use validated CTA-861 constants; every other
    /// request is approximated, see [`DetailedTiming::approximate`].
    pub fn for_mode(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self::canonical(width, height, refresh_hz)
            .unwrap_or_else(|| Self::approximate(width, height, refresh_hz))
    }

    /// Looks up the exact timing for the well-known 60 Hz modes.
    pub fn canonical(width: u32, height: u32, refresh_hz: u32) -> Option<Self> {
        let (h_blank, v_blank, h_front_porch, h_sync, v_front_porch, v_sync, pixel_clock_khz) =
            match (width, height, refresh_hz) {
                (3840, 2160, 60) => (560, 90, 176, 88, 8, 10, 533_250),
                (2560, 1440, 60) => (160, 44, 48, 32, 3, 5, 241_500),
                (1920, 1080, 60) => (280, 45, 88, 44, 4, 5, 148_500),
                (1280, 720, 60) => (370, 30, 110, 40, 5, 5, 74_250),
                _ => return None,
            };

        Some(Self {
            pixel_clock_khz,
            h_active: width,
            h_blank,
            h_front_porch,
            h_sync,
            v_active: height,
            v_blank,
            v_front_porch,
            v_sync,
        })
    }

    /// Approximates a timing with a simplified reduced-blanking formula.
    ///
    /// Horizontal blanking is 15% of the active width split evenly between
    /// front porch and sync; vertical blanking is a fixed 45 lines.  The line
    /// period is derived from the frame period minus a 550 µs vertical
    /// blanking allowance.  `refresh_hz` is clamped to
    /// [`APPROXIMATION_REFRESH_RANGE`] first.
    pub fn approximate(width: u32, height: u32, refresh_hz: u32) -> Self {
        let refresh = refresh_hz.clamp(
            *APPROXIMATION_REFRESH_RANGE.start(),
            *APPROXIMATION_REFRESH_RANGE.end(),
        );

        let h_period_us =
            (1_000_000.0 / f64::from(refresh) - MIN_VBLANK_US) / (f64::from(height) + 3.0);
        let h_total = f64::from(width) * 1.15;
        let pixel_clock_khz = (h_total / h_period_us * 1000.0) as u32;

        let h_blank = scale(width, 15, 100);

        Self {
            pixel_clock_khz,
            h_active: width,
            h_blank,
            h_front_porch: h_blank / 4,
            h_sync: h_blank / 4,
            v_active: height,
            v_blank: 45,
            v_front_porch: 3,
            v_sync: 5,
        }
    }

    /// Pixel clock in the 10 kHz units EDID stores, saturating at the 16-bit
    /// field maximum (655.35 MHz).
    pub fn pixel_clock_10khz(&self) -> u16 {
        u16::try_from(self.pixel_clock_khz / 10).unwrap_or(u16::MAX)
    }

    /// Encodes this timing into the 18-byte descriptor layout.
    pub fn encode(&self) -> [u8; DTD_SIZE] {
        let mut dtd = [0u8; DTD_SIZE];

        dtd[0..2].copy_from_slice(&self.pixel_clock_10khz().to_le_bytes());

        dtd[2] = low_byte(self.h_active);
        dtd[3] = low_byte(self.h_blank);
        dtd[4] = high_nibbles(self.h_active, self.h_blank);

        dtd[5] = low_byte(self.v_active);
        dtd[6] = low_byte(self.v_blank);
        dtd[7] = high_nibbles(self.v_active, self.v_blank);

        dtd[8] = low_byte(self.h_front_porch);
        dtd[9] = low_byte(self.h_sync);
        dtd[10] = ((self.v_front_porch & 0x0F) << 4 | (self.v_sync & 0x0F)) as u8;
        dtd[11] = (((self.h_front_porch >> 8) & 0x03) << 6
            | ((self.h_sync >> 8) & 0x03) << 4
            | ((self.v_front_porch >> 4) & 0x03) << 2
            | ((self.v_sync >> 4) & 0x03)) as u8;

        let (h_mm, v_mm) = image_size_mm(self.h_active, self.v_active);
        dtd[12] = low_byte(h_mm);
        dtd[13] = low_byte(v_mm);
        dtd[14] = high_nibbles(h_mm, v_mm);

        // bytes 15 and 16: no border
        dtd[17] = SYNC_FLAGS;
        dtd
    }
}

/// Estimates the physical image size in millimetres by scaling linearly
/// against a 27" 3840×2160 panel (600×340 mm), capped at the 12-bit field.
pub fn image_size_mm(width: u32, height: u32) -> (u32, u32) {
    (
        scale(width, REFERENCE_WIDTH_MM, REFERENCE_WIDTH_PX).min(DTD_FIELD_MAX),
        scale(height, REFERENCE_HEIGHT_MM, REFERENCE_HEIGHT_PX).min(DTD_FIELD_MAX),
    )
}

/// `value * num / den` computed in 64 bits; the result never exceeds `value`
/// for `num <= den` and saturates otherwise.
fn scale(value: u32, num: u32, den: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(num) / u64::from(den);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

fn low_byte(value: u32) -> u8 {
    (value & 0xFF) as u8
}

/// Packs bits 8..12 of `hi` into the upper nibble and bits 8..12 of `lo` into
/// the lower nibble.
fn high_nibbles(hi: u32, lo: u32) -> u8 {
    ((((hi >> 8) & 0x0F) << 4) | ((lo >> 8) & 0x0F)) as u8
}
