//! Integration tests for the EDID synthesizer.
//!
//! These exercise the public API the way the display manager does: synthesize
//! for a requested mode, then check the properties the driver and compositor
//! rely on.

use vdisplay_core::{
    edid::{block_sum, synthesize, synthesize_for, verify, EDID_BLOCK_SIZE},
    DisplayMode, RefreshRate,
};

/// A spread of modes covering canonical, approximated, extension and
/// non-extension cases.
const MODES: &[(u32, u32, u32)] = &[
    (1280, 720, 60),
    (1920, 1080, 60),
    (1920, 1080, 144),
    (1600, 900, 75),
    (1920, 1200, 60),
    (2560, 1440, 60),
    (2560, 1080, 100),
    (3440, 1440, 120),
    (3840, 2160, 60),
    (3840, 2160, 120),
    (800, 600, 30),
];

#[test]
fn test_synthesis_is_deterministic() {
    for &(w, h, r) in MODES {
        assert_eq!(synthesize(w, h, r), synthesize(w, h, r), "{w}x{h}@{r}");
    }
}

#[test]
fn test_every_block_sums_to_zero() {
    for &(w, h, r) in MODES {
        let edid = synthesize(w, h, r);
        for (i, block) in edid.chunks_exact(EDID_BLOCK_SIZE).enumerate() {
            assert_eq!(block_sum(block), 0, "block {i} of {w}x{h}@{r}");
        }
    }
}

#[test]
fn test_extension_flag_and_length_follow_1080p_threshold() {
    for &(w, h, r) in MODES {
        let edid = synthesize(w, h, r);
        let expect_extension = w > 1920 || h > 1080;

        assert_eq!(edid[126] == 1, expect_extension, "{w}x{h}@{r}");
        assert_eq!(edid[126] == 0, !expect_extension, "{w}x{h}@{r}");
        let expected_len = if expect_extension { 256 } else { 128 };
        assert_eq!(edid.len(), expected_len, "{w}x{h}@{r}");
    }
}

#[test]
fn test_all_synthesized_edids_pass_structural_verification() {
    for &(w, h, r) in MODES {
        assert_eq!(verify(&synthesize(w, h, r)), Ok(()), "{w}x{h}@{r}");
    }
}

#[test]
fn test_canonical_modes_encode_documented_timings() {
    // (w, h, clock LE, h_active/h_blank bytes, v_active/v_blank bytes, porch/sync bytes)
    let cases: [(u32, u32, [u8; 2], [u8; 3], [u8; 3], [u8; 4]); 4] = [
        (3840, 2160, [0x4D, 0xD0], [0x00, 0x30, 0xF2], [0x70, 0x5A, 0x80], [0xB0, 0x58, 0x8A, 0x00]),
        (2560, 1440, [0x56, 0x5E], [0x00, 0xA0, 0xA0], [0xA0, 0x2C, 0x50], [0x30, 0x20, 0x35, 0x00]),
        (1920, 1080, [0x02, 0x3A], [0x80, 0x18, 0x71], [0x38, 0x2D, 0x40], [0x58, 0x2C, 0x45, 0x00]),
        (1280, 720, [0x01, 0x1D], [0x00, 0x72, 0x51], [0xD0, 0x1E, 0x20], [0x6E, 0x28, 0x55, 0x00]),
    ];

    for (w, h, clock, horiz, vert, porch) in cases {
        let edid = synthesize(w, h, 60);
        let dtd = &edid[54..72];

        assert_eq!(&dtd[0..2], &clock, "clock {w}x{h}");
        assert_eq!(&dtd[2..5], &horiz, "horizontal {w}x{h}");
        assert_eq!(&dtd[5..8], &vert, "vertical {w}x{h}");
        assert_eq!(&dtd[8..12], &porch, "porch/sync {w}x{h}");
        assert_eq!(dtd[17], 0x1E);
    }
}

#[test]
fn test_4k_requests_carry_second_timing_in_extension() {
    let edid = synthesize(3840, 2160, 120);

    // Preferred timing is approximated for 120 Hz, the extension DTD is the
    // canonical 2160p60 mode.
    assert_ne!(&edid[54..56], &[0x4D, 0xD0]);
    assert_eq!(&edid[152..154], &[0x4D, 0xD0]);
}

#[test]
fn test_zero_refresh_still_yields_valid_edid() {
    let edid = synthesize(1600, 900, 0);
    assert_eq!(verify(&edid), Ok(()));
    assert_ne!(&edid[54..56], &[0x00, 0x00], "pixel clock must not collapse to zero");
}

#[test]
fn test_synthesize_for_uses_whole_hz_of_fractional_rate() {
    let mode = DisplayMode::new(1920, 1080, RefreshRate::from_milli_hz(60_000));
    assert_eq!(synthesize_for(&mode), synthesize(1920, 1080, 60));

    let ntsc = DisplayMode::new(1600, 900, RefreshRate::from_milli_hz(59_940));
    assert_eq!(synthesize_for(&ntsc), synthesize(1600, 900, 59));
}

#[test]
fn test_extreme_sizes_still_yield_valid_edid() {
    // Arrange
    let sizes = [
        (8_000_000, 1080),
        (1920, 13_000_000),
        (u32::MAX, u32::MAX),
    ];

    for (w, h) in sizes {
        // Act
        let edid = synthesize(w, h, 60);

        // Assert
        assert_eq!(edid.len(), 2 * EDID_BLOCK_SIZE, "{w}x{h} needs an extension");
        assert_eq!(verify(&edid), Ok(()), "{w}x{h}");
        for (i, block) in edid.chunks_exact(EDID_BLOCK_SIZE).enumerate() {
            assert_eq!(block_sum(block), 0, "block {i} of {w}x{h}");
        }
    }
}
