//! Linux output enumeration through DRM/KMS.
//!
//! Walks `/dev/dri`, opens every primary card node (render nodes cannot do
//! mode-setting and are skipped), and lists the connectors that report a
//! connected monitor.  Connector names follow the kernel's convention,
//! `<interface>-<index>` such as `HDMI-A-1` or `eDP-1`.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use drm::control::{connector, Device as ControlDevice};
use tracing::debug;

use crate::application::report_outputs::{OutputEnumerator, OutputError, PhysicalOutput};

/// Default DRM device directory.
pub const DRI_DIR: &str = "/dev/dri";

/// A card node opened for mode-setting queries.
struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

/// DRM implementation of [`OutputEnumerator`].
#[derive(Debug, Clone)]
pub struct DrmOutputEnumerator {
    dri_dir: PathBuf,
}

impl DrmOutputEnumerator {
    pub fn new() -> Self {
        Self::with_dir(DRI_DIR)
    }

    /// Enumerates cards under `dir` instead of `/dev/dri`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dri_dir: dir.into(),
        }
    }
}

impl Default for DrmOutputEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// `card0`, `card1`, ... but not `renderD128`.
fn is_card_node(file_name: &str) -> bool {
    file_name.starts_with("card") && !file_name.contains("render")
}

impl OutputEnumerator for DrmOutputEnumerator {
    fn connected_outputs(&self) -> Result<Vec<PhysicalOutput>, OutputError> {
        let entries =
            std::fs::read_dir(&self.dri_dir).map_err(|source| OutputError::DirectoryUnreadable {
                path: self.dri_dir.clone(),
                source,
            })?;

        let mut outputs = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            if !is_card_node(&file_name.to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            match connected_on_card(&path) {
                Ok(mut found) => outputs.append(&mut found),
                Err(e) => debug!(card = %path.display(), "skipping card: {e}"),
            }
        }
        Ok(outputs)
    }
}

fn connected_on_card(path: &Path) -> std::io::Result<Vec<PhysicalOutput>> {
    let card = Card(OpenOptions::new().read(true).write(true).open(path)?);
    let resources = card.resource_handles()?;

    let mut outputs = Vec::new();
    for &handle in resources.connectors() {
        let Ok(info) = card.get_connector(handle, false) else {
            continue;
        };
        if info.state() != connector::State::Connected {
            continue;
        }
        outputs.push(PhysicalOutput {
            name: format!("{}-{}", info.interface().as_str(), info.interface_id()),
            card: path.to_path_buf(),
            preferred_size: info
                .modes()
                .first()
                .map(|mode| {
                    let (w, h) = mode.size();
                    (u32::from(w), u32::from(h))
                }),
        });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_is_card_node_accepts_primary_nodes() {
        assert!(is_card_node("card0"));
        assert!(is_card_node("card12"));
    }

    #[test]
    fn test_is_card_node_rejects_render_and_other_nodes() {
        assert!(!is_card_node("renderD128"));
        assert!(!is_card_node("by-path"));
        assert!(!is_card_node("controlD64"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let enumerator = DrmOutputEnumerator::with_dir("/nonexistent/dri");
        assert!(matches!(
            enumerator.connected_outputs(),
            Err(OutputError::DirectoryUnreadable { .. })
        ));
    }

    #[test]
    fn test_cards_that_are_not_drm_devices_are_skipped() {
        // Arrange: plain files named like card nodes fail the DRM ioctls
        let dir = std::env::temp_dir().join(format!("vdisplay_dri_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("card0"), b"").unwrap();
        std::fs::write(dir.join("renderD128"), b"").unwrap();
        let enumerator = DrmOutputEnumerator::with_dir(&dir);

        // Act
        let outputs = enumerator.connected_outputs().expect("directory readable");

        // Assert
        assert!(outputs.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
