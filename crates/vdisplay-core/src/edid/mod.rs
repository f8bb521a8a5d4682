//! EDID synthesis.
//!
//! Produces the Extended Display Identification Data blob the virtual display
//! driver advertises to the compositor.  The output is a byte-exact EDID 1.4
//! base block, optionally followed by a CEA-861 extension block:
//!
//! ```text
//! offset  size  field
//!      0     8  header magic 00 FF FF FF FF FF FF 00
//!      8    10  vendor / product / serial / week / year
//!     18     2  EDID version 1.4
//!     20     5  video input, size (cm), gamma, feature bits
//!     25    10  chromaticity (sRGB)
//!     35     3  established timings
//!     38    16  standard timings
//!     54    18  descriptor 1: preferred detailed timing
//!     72    18  descriptor 2: display name
//!     90    18  descriptor 3: display range limits
//!    108    18  descriptor 4: dummy
//!    126     1  extension block count
//!    127     1  checksum
//! ```
//!
//! Every call returns a freshly allocated buffer, so the synthesizer is safe to
//! call from any thread.

pub mod extension;
pub mod timing;

use thiserror::Error;

use crate::domain::display::{needs_extension_block, DisplayMode};
use timing::{DetailedTiming, DTD_SIZE};

/// Size of one EDID block.
pub const EDID_BLOCK_SIZE: usize = 128;

/// Fixed 8-byte EDID header.
pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Three-letter PnP manufacturer code.
const MANUFACTURER: [u8; 3] = *b"VDM";
const PRODUCT_CODE: u16 = 0x0001;
const SERIAL_NUMBER: u32 = 0x0000_0001;
/// Week 1 of 2024 (year is stored as an offset from 1990).
const MANUFACTURE_WEEK: u8 = 1;
const MANUFACTURE_YEAR: u8 = (2024 - 1990) as u8;

/// Digital input, 8 bits per colour, DisplayPort.
const VIDEO_INPUT: u8 = 0xB5;
/// Approximate 27" panel, in centimetres.
const SCREEN_SIZE_CM: [u8; 2] = [60, 34];
/// Gamma 2.2, stored as (gamma * 100) - 100.
const GAMMA: u8 = 0x78;
/// RGB 4:4:4, sRGB default, preferred timing in descriptor 1, continuous frequency.
const FEATURES: u8 = 0x3A;
/// sRGB primaries and D65 white point.
const CHROMATICITY: [u8; 10] = [0xFC, 0x81, 0xA4, 0x55, 0x4D, 0x9D, 0x25, 0x12, 0x50, 0x54];
/// 640x480@60, 800x600@60, 1024x768@60.
const ESTABLISHED_TIMINGS: [u8; 3] = [0x21, 0x08, 0x00];
/// 1920x1080, 1680x1050, 1600x900, 1280x1024, 1280x720 (all 60 Hz), rest unused.
const STANDARD_TIMINGS: [u8; 16] = [
    0xD1, 0xC0, 0xB3, 0x00, 0xA9, 0xC0, 0x81, 0x80, 0x81, 0xC0, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01,
];

const MONITOR_NAME: &[u8] = b"VDISPLAY";

/// Vertical 24–120 Hz, horizontal 15–160 kHz, pixel clock up to 1200 MHz.
const RANGE_LIMITS: [u8; 5] = [24, 120, 15, 160, 120];

const DESCRIPTOR_TAG_NAME: u8 = 0xFC;
const DESCRIPTOR_TAG_RANGE: u8 = 0xFD;
const DESCRIPTOR_TAG_DUMMY: u8 = 0x10;

const DTD1_OFFSET: usize = 54;
const NAME_OFFSET: usize = 72;
const RANGE_OFFSET: usize = 90;
const DUMMY_OFFSET: usize = 108;
const EXTENSION_COUNT_OFFSET: usize = 126;

/// Errors reported by [`verify`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdidError {
    /// The blob is not a whole number of 128-byte blocks.
    #[error("invalid EDID length: {0} bytes")]
    InvalidLength(usize),

    /// The fixed 8-byte header is wrong.
    #[error("EDID header magic mismatch")]
    BadHeader,

    /// The extension count byte disagrees with the number of blocks present.
    #[error("extension count {declared} does not match {present} trailing block(s)")]
    ExtensionCountMismatch { declared: u8, present: usize },

    /// A block's bytes do not sum to zero modulo 256.
    #[error("checksum mismatch in block {block}")]
    ChecksumMismatch { block: usize },
}

/// Synthesizes an EDID advertising `width`×`height`@`refresh_hz` as the
/// preferred mode.
///
/// Returns 128 bytes, or 256 bytes when the mode exceeds 1920×1080 and the
/// CEA extension block is appended.  The function is pure and deterministic.
///
/// `refresh_hz` is not validated here; out-of-range values only affect the
/// approximated pixel clock, see [`DetailedTiming::approximate`].
///
/// # Examples
///
/// ```rust
/// use vdisplay_core::edid::{synthesize, EDID_BLOCK_SIZE};
///
/// let edid = synthesize(1920, 1080, 60);
/// assert_eq!(edid.len(), EDID_BLOCK_SIZE);
///
/// let uhd = synthesize(3840, 2160, 60);
/// assert_eq!(uhd.len(), 2 * EDID_BLOCK_SIZE);
/// ```
pub fn synthesize(width: u32, height: u32, refresh_hz: u32) -> Vec<u8> {
    let needs_extension = needs_extension_block(width, height);

    let mut edid = Vec::with_capacity(2 * EDID_BLOCK_SIZE);
    edid.extend_from_slice(&base_block(width, height, refresh_hz, needs_extension));
    if needs_extension {
        edid.extend_from_slice(&extension::cea_extension(width));
    }
    edid
}

/// Synthesizes an EDID for `mode`, using its whole-Hz refresh rate.
pub fn synthesize_for(mode: &DisplayMode) -> Vec<u8> {
    synthesize(mode.width, mode.height, mode.refresh.whole_hz())
}

/// Returns the size [`synthesize`] produces for a mode, without building it.
pub fn synthesized_len(width: u32, height: u32) -> usize {
    if needs_extension_block(width, height) {
        2 * EDID_BLOCK_SIZE
    } else {
        EDID_BLOCK_SIZE
    }
}

/// Checks the structural invariants of an EDID blob: whole blocks, header
/// magic, extension count and per-block checksums.
///
/// # Errors
///
/// Returns the first [`EdidError`] found.
pub fn verify(edid: &[u8]) -> Result<(), EdidError> {
    if edid.is_empty() || edid.len() % EDID_BLOCK_SIZE != 0 {
        return Err(EdidError::InvalidLength(edid.len()));
    }
    if edid[..EDID_HEADER.len()] != EDID_HEADER {
        return Err(EdidError::BadHeader);
    }

    let declared = edid[EXTENSION_COUNT_OFFSET];
    let present = edid.len() / EDID_BLOCK_SIZE - 1;
    if usize::from(declared) != present {
        return Err(EdidError::ExtensionCountMismatch { declared, present });
    }

    for (block, bytes) in edid.chunks_exact(EDID_BLOCK_SIZE).enumerate() {
        if block_sum(bytes) != 0 {
            return Err(EdidError::ChecksumMismatch { block });
        }
    }
    Ok(())
}

/// Sum of all bytes in `block`, modulo 256.
pub fn block_sum(block: &[u8]) -> u8 {
    block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Writes the checksum into the last byte so the whole block sums to zero.
pub(crate) fn seal_block(block: &mut [u8; EDID_BLOCK_SIZE]) {
    let sum = block_sum(&block[..EDID_BLOCK_SIZE - 1]);
    block[EDID_BLOCK_SIZE - 1] = 0u8.wrapping_sub(sum);
}

fn base_block(
    width: u32,
    height: u32,
    refresh_hz: u32,
    needs_extension: bool,
) -> [u8; EDID_BLOCK_SIZE] {
    let mut block = [0u8; EDID_BLOCK_SIZE];

    block[0..8].copy_from_slice(&EDID_HEADER);
    block[8..10].copy_from_slice(&pnp_manufacturer_id(MANUFACTURER));
    block[10..12].copy_from_slice(&PRODUCT_CODE.to_le_bytes());
    block[12..16].copy_from_slice(&SERIAL_NUMBER.to_le_bytes());
    block[16] = MANUFACTURE_WEEK;
    block[17] = MANUFACTURE_YEAR;
    block[18] = 1;
    block[19] = 4;

    block[20] = VIDEO_INPUT;
    block[21..23].copy_from_slice(&SCREEN_SIZE_CM);
    block[23] = GAMMA;
    block[24] = FEATURES;
    block[25..35].copy_from_slice(&CHROMATICITY);
    block[35..38].copy_from_slice(&ESTABLISHED_TIMINGS);
    block[38..54].copy_from_slice(&STANDARD_TIMINGS);

    let dtd = DetailedTiming::for_mode(width, height, refresh_hz).encode();
    block[DTD1_OFFSET..DTD1_OFFSET + DTD_SIZE].copy_from_slice(&dtd);

    write_name_descriptor(&mut block[NAME_OFFSET..NAME_OFFSET + DTD_SIZE]);
    write_range_descriptor(&mut block[RANGE_OFFSET..RANGE_OFFSET + DTD_SIZE]);
    write_display_descriptor_header(
        &mut block[DUMMY_OFFSET..DUMMY_OFFSET + DTD_SIZE],
        DESCRIPTOR_TAG_DUMMY,
    );

    block[EXTENSION_COUNT_OFFSET] = u8::from(needs_extension);
    seal_block(&mut block);
    block
}

/// Display descriptors start with `00 00 00 <tag> 00`.
fn write_display_descriptor_header(slot: &mut [u8], tag: u8) {
    slot[..5].copy_from_slice(&[0x00, 0x00, 0x00, tag, 0x00]);
}

/// Text descriptors hold 13 bytes: the text, a line feed, then space padding.
fn write_name_descriptor(slot: &mut [u8]) {
    write_display_descriptor_header(slot, DESCRIPTOR_TAG_NAME);
    let text = &mut slot[5..];
    text.fill(0x20);
    text[..MONITOR_NAME.len()].copy_from_slice(MONITOR_NAME);
    text[MONITOR_NAME.len()] = 0x0A;
}

fn write_range_descriptor(slot: &mut [u8]) {
    write_display_descriptor_header(slot, DESCRIPTOR_TAG_RANGE);
    slot[5..10].copy_from_slice(&RANGE_LIMITS);
    // byte 10: default GTF, then line feed and space padding
    slot[10] = 0x00;
    slot[11] = 0x0A;
    slot[12..].fill(0x20);
}

/// Packs a three-letter PnP ID into the big-endian 5-bit-per-letter form.
const fn pnp_manufacturer_id(code: [u8; 3]) -> [u8; 2] {
    let packed: u16 = (((code[0] - b'A' + 1) as u16) << 10)
        | (((code[1] - b'A' + 1) as u16) << 5)
        | ((code[2] - b'A' + 1) as u16);
    packed.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_block_starts_with_header_magic() {
        let edid = synthesize(1920, 1080, 60);
        assert_eq!(&edid[0..8], &EDID_HEADER);
    }

    #[test]
    fn test_base_block_declares_version_1_4() {
        let edid = synthesize(1280, 720, 60);
        assert_eq!(&edid[18..20], &[0x01, 0x04]);
    }

    #[test]
    fn test_manufacturer_id_encodes_three_letters() {
        // V=22, D=4, M=13 -> 0b0_10110_00100_01101
        assert_eq!(pnp_manufacturer_id(*b"VDM"), [0x58, 0x8D]);
    }

    #[test]
    fn test_name_descriptor_is_line_feed_terminated_and_space_padded() {
        let edid = synthesize(1920, 1080, 60);
        let name = &edid[NAME_OFFSET..NAME_OFFSET + DTD_SIZE];

        assert_eq!(&name[..5], &[0x00, 0x00, 0x00, 0xFC, 0x00]);
        assert_eq!(&name[5..13], b"VDISPLAY");
        assert_eq!(name[13], 0x0A);
        assert!(name[14..].iter().all(|&b| b == 0x20));
    }

    #[test]
    fn test_range_limits_accept_24_to_120_hz() {
        let edid = synthesize(1920, 1080, 60);
        let range = &edid[RANGE_OFFSET..RANGE_OFFSET + DTD_SIZE];

        assert_eq!(range[3], 0xFD);
        assert_eq!(range[5], 24);
        assert_eq!(range[6], 120);
        assert_eq!(range[7], 15);
        assert_eq!(range[8], 160);
    }

    #[test]
    fn test_seal_block_makes_sum_zero() {
        let mut block = [0xABu8; EDID_BLOCK_SIZE];
        seal_block(&mut block);
        assert_eq!(block_sum(&block), 0);
    }

    #[test]
    fn test_verify_accepts_synthesized_edids() {
        assert_eq!(verify(&synthesize(1920, 1080, 60)), Ok(()));
        assert_eq!(verify(&synthesize(3840, 2160, 60)), Ok(()));
    }

    #[test]
    fn test_verify_rejects_corrupted_extension_checksum() {
        let mut edid = synthesize(2560, 1440, 60);
        edid[200] ^= 0xFF;
        assert_eq!(verify(&edid), Err(EdidError::ChecksumMismatch { block: 1 }));
    }

    #[test]
    fn test_verify_rejects_truncated_blob() {
        let edid = synthesize(2560, 1440, 60);
        assert_eq!(
            verify(&edid[..EDID_BLOCK_SIZE]),
            Err(EdidError::ExtensionCountMismatch {
                declared: 1,
                present: 0
            })
        );
        assert_eq!(verify(&edid[..100]), Err(EdidError::InvalidLength(100)));
    }

    #[test]
    fn test_synthesized_len_matches_output() {
        for (w, h) in [(1280, 720), (1920, 1080), (2560, 1440), (3840, 2160)] {
            assert_eq!(synthesized_len(w, h), synthesize(w, h, 60).len());
        }
    }
}
