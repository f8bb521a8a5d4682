//! CEA-861 extension block.
//!
//! Appended as the second 128-byte block whenever the requested mode exceeds
//! 1920×1080.  Consumers use it to learn about the HDMI 2.0 capabilities and
//! the 4K video identification codes the base block cannot express.

use super::timing::{DetailedTiming, DTD_SIZE};
use super::EDID_BLOCK_SIZE;

/// CEA extension tag.
const CEA_TAG: u8 = 0x02;
/// CEA-861 revision 3.
const CEA_REVISION: u8 = 0x03;
/// Offset of the first DTD inside the block (after the data block collection).
const DTD_OFFSET: usize = 0x18;
/// Native DTD count 2, basic audio off, YCbCr 4:4:4 and 4:2:2 supported, underscan.
const CEA_FLAGS: u8 = 0x72;

/// Video Data Block: tag 2 (0x40), seven Short Video Descriptors.
const VIDEO_DATA_BLOCK: [u8; 8] = [
    0x47, // tag 0x40 | length 7
    0x90, // VIC 16: 1080p60, native
    0x04, // VIC 4: 720p60
    0x03, // VIC 3: 480p60
    0x5F, // VIC 95: 2160p30
    0x60, // VIC 96: 2160p50
    0x61, // VIC 97: 2160p60
    0x65, // VIC 101: 4096x2160p50
];

/// HDMI Vendor-Specific Data Block with the HDMI Licensing OUI (00-0C-03).
const HDMI_VSDB: [u8; 8] = [
    0x67, // tag 0x60 | length 7
    0x03, 0x0C, 0x00, // OUI, little-endian
    0x10, 0x00, // source physical address 1.0.0.0
    0x00, // no deep colour flags
    0x78, // max TMDS clock 600 MHz (x5 MHz)
];

/// Width from which the extension carries a second, 4K preferred timing.
const UHD_WIDTH: u32 = 3840;

/// Builds the CEA extension block for a mode of the given width.
///
/// The returned block already carries its checksum in the last byte.
pub fn cea_extension(width: u32) -> [u8; EDID_BLOCK_SIZE] {
    let mut block = [0u8; EDID_BLOCK_SIZE];

    block[0] = CEA_TAG;
    block[1] = CEA_REVISION;
    block[2] = DTD_OFFSET as u8;
    block[3] = CEA_FLAGS;

    let vdb_start = 4;
    let vsdb_start = vdb_start + VIDEO_DATA_BLOCK.len();
    block[vdb_start..vsdb_start].copy_from_slice(&VIDEO_DATA_BLOCK);
    block[vsdb_start..vsdb_start + HDMI_VSDB.len()].copy_from_slice(&HDMI_VSDB);

    if width >= UHD_WIDTH {
        let dtd = DetailedTiming::for_mode(3840, 2160, 60).encode();
        block[DTD_OFFSET..DTD_OFFSET + DTD_SIZE].copy_from_slice(&dtd);
    }

    super::seal_block(&mut block);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_header_identifies_cea_revision_3() {
        let block = cea_extension(2560);
        assert_eq!(&block[0..4], &[0x02, 0x03, 0x18, 0x72]);
    }

    #[test]
    fn test_extension_carries_hdmi_oui() {
        let block = cea_extension(2560);
        assert_eq!(block[12], 0x67);
        assert_eq!(&block[13..16], &[0x03, 0x0C, 0x00]);
    }

    #[test]
    fn test_extension_omits_4k_timing_below_uhd_width() {
        let block = cea_extension(2560);
        assert!(block[DTD_OFFSET..DTD_OFFSET + DTD_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_extension_includes_4k_timing_at_uhd_width() {
        let block = cea_extension(3840);
        let expected = DetailedTiming::for_mode(3840, 2160, 60).encode();
        assert_eq!(&block[DTD_OFFSET..DTD_OFFSET + DTD_SIZE], &expected);
    }
}
