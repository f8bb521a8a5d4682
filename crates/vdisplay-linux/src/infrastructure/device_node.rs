//! DRM card node access for EVDI slots.
//!
//! EVDI device `N` appears as `/dev/dri/card<N>`.  The manager keeps that node
//! open for the lifetime of the display so capture code can reach the output;
//! failing to open it is not an error.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use crate::application::manage_displays::DeviceNodes;

/// Default prefix; the slot number is appended.
pub const DEFAULT_CARD_PREFIX: &str = "/dev/dri/card";

/// Opens `<prefix><slot>` read-write.
#[derive(Debug, Clone)]
pub struct DriCardNodes {
    prefix: String,
}

impl DriCardNodes {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Path of the node for `slot`.
    pub fn path_for(&self, slot: u32) -> PathBuf {
        PathBuf::from(format!("{}{slot}", self.prefix))
    }
}

impl Default for DriCardNodes {
    fn default() -> Self {
        Self::new(DEFAULT_CARD_PREFIX)
    }
}

impl DeviceNodes for DriCardNodes {
    fn open_card(&self, slot: u32) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path_for(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_path_for_appends_slot_to_prefix() {
        let nodes = DriCardNodes::default();
        assert_eq!(nodes.path_for(3), PathBuf::from("/dev/dri/card3"));
    }

    #[test]
    fn test_open_card_opens_existing_node() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("vdisplay_nodes_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("card1"), b"").unwrap();
        let nodes = DriCardNodes::new(format!("{}/card", dir.display()));

        // Act / Assert
        assert!(nodes.open_card(1).is_ok());
        assert!(nodes.open_card(2).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
