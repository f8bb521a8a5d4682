//! The virtual display registry.
//!
//! # Ownership rules
//!
//! Each [`VirtualDisplayRecord`] owns whatever the driver gave it: an open
//! driver handle and, optionally, the `/dev/dri/card<N>` node for its slot.
//! Those resources are released in exactly one place,
//! [`VirtualDisplayRecord::release`], which consumes the record.  A record can
//! therefore only be released once, whether it leaves the registry through
//! `remove` or through the bulk drain on shutdown.
//!
//! The registry itself is a plain map; the manager wraps it in the driver
//! lock so every mutation is serialized.

use std::collections::HashMap;
use std::fs::File;

use tracing::debug;
use vdisplay_core::{DisplayMode, RefreshRate};

use super::bind_driver::{DisplayDriver, DriverHandle};

/// How a virtual display is backed.
#[derive(Debug)]
pub enum DisplayBacking {
    /// No driver output; the host captures an existing output instead.
    Passthrough,
    /// An EVDI device slot with a connected virtual monitor.
    RealDriver {
        slot: u32,
        handle: DriverHandle,
        /// The DRM node for the slot; opening it is best-effort.
        device_node: Option<File>,
    },
}

/// One virtual display created for a client.
#[derive(Debug)]
pub struct VirtualDisplayRecord {
    name: String,
    identity: String,
    mode: DisplayMode,
    backing: DisplayBacking,
    active: bool,
}

impl VirtualDisplayRecord {
    /// Creates an active record.
    pub fn new(name: String, identity: String, mode: DisplayMode, backing: DisplayBacking) -> Self {
        Self {
            name,
            identity,
            mode,
            backing,
            active: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client identity string this record is keyed by.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn using_real_driver(&self) -> bool {
        matches!(self.backing, DisplayBacking::RealDriver { .. })
    }

    pub fn slot(&self) -> Option<u32> {
        match self.backing {
            DisplayBacking::RealDriver { slot, .. } => Some(slot),
            DisplayBacking::Passthrough => None,
        }
    }

    pub fn handle(&self) -> Option<DriverHandle> {
        match self.backing {
            DisplayBacking::RealDriver { handle, .. } => Some(handle),
            DisplayBacking::Passthrough => None,
        }
    }

    pub fn has_device_node(&self) -> bool {
        matches!(
            self.backing,
            DisplayBacking::RealDriver {
                device_node: Some(_),
                ..
            }
        )
    }

    /// Replaces the stored geometry.
    pub fn set_mode(&mut self, width: u32, height: u32, refresh: RefreshRate) {
        self.mode = DisplayMode::new(width, height, refresh);
    }

    /// Returns a read-only snapshot.
    pub fn info(&self) -> DisplayInfo {
        DisplayInfo {
            name: self.name.clone(),
            identity: self.identity.clone(),
            width: self.mode.width,
            height: self.mode.height,
            refresh: self.mode.refresh,
            slot: self.slot(),
            using_real_driver: self.using_real_driver(),
            has_device_node: self.has_device_node(),
            active: self.active,
        }
    }

    /// Disconnects and closes the driver handle and closes the device node.
    ///
    /// `driver` may be `None` only for passthrough records.
    pub fn release(self, driver: Option<&dyn DisplayDriver>) {
        match self.backing {
            DisplayBacking::Passthrough => {
                debug!(display = %self.name, "released passthrough display");
            }
            DisplayBacking::RealDriver {
                slot,
                handle,
                device_node,
            } => {
                if let Some(driver) = driver {
                    driver.disconnect(handle);
                    driver.close(handle);
                }
                drop(device_node);
                debug!(display = %self.name, slot, "released EVDI display");
            }
        }
    }
}

/// Read-only view of a record, safe to hand out past the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub name: String,
    pub identity: String,
    pub width: u32,
    pub height: u32,
    pub refresh: RefreshRate,
    pub slot: Option<u32>,
    pub using_real_driver: bool,
    pub has_device_node: bool,
    pub active: bool,
}

/// Map from client identity string to its display record.
#[derive(Debug, Default)]
pub struct DisplayRegistry {
    records: HashMap<String, VirtualDisplayRecord>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` under its own identity, returning any record it
    /// replaced.
    pub fn insert(&mut self, record: VirtualDisplayRecord) -> Option<VirtualDisplayRecord> {
        self.records.insert(record.identity.clone(), record)
    }

    pub fn remove(&mut self, identity: &str) -> Option<VirtualDisplayRecord> {
        self.records.remove(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&VirtualDisplayRecord> {
        self.records.get(identity)
    }

    /// Linear lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&VirtualDisplayRecord> {
        self.records.values().find(|r| r.name == name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut VirtualDisplayRecord> {
        self.records.values_mut().find(|r| r.name == name)
    }

    /// Names of active records whose name contains `fragment`.
    pub fn matching(&self, fragment: &str) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.active && r.name.contains(fragment))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Returns `true` if a live real-driver record already holds `slot`.
    pub fn slot_in_use(&self, slot: u32) -> bool {
        self.records.values().any(|r| r.slot() == Some(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualDisplayRecord> {
        self.records.values()
    }

    /// Removes and returns every record.
    pub fn drain(&mut self) -> Vec<VirtualDisplayRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
