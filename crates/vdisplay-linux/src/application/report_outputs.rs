//! Physical output reporting: which real monitor is the primary one.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for output enumeration.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The DRM device directory could not be listed.
    #[error("cannot read DRM directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("platform error: {0}")]
    Platform(String),
}

/// A connected physical connector on some DRM card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalOutput {
    /// Connector name such as `HDMI-A-1` or `DP-2`.
    pub name: String,
    /// The card node the connector was found on.
    pub card: PathBuf,
    /// Size of the connector's first advertised mode, if any.
    pub preferred_size: Option<(u32, u32)>,
}

/// Trait for enumerating connected physical outputs.
pub trait OutputEnumerator: Send + Sync {
    /// Returns every connected output in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if the device directory cannot be read at all.
    /// Individual cards that fail to answer are skipped.
    fn connected_outputs(&self) -> Result<Vec<PhysicalOutput>, OutputError>;
}

/// Returns the name of the first connected output, swallowing errors.
pub fn primary_output_name(enumerator: &dyn OutputEnumerator) -> Option<String> {
    match enumerator.connected_outputs() {
        Ok(outputs) => outputs.into_iter().next().map(|o| o.name),
        Err(e) => {
            tracing::debug!("output enumeration failed: {e}");
            None
        }
    }
}
