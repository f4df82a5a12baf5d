//! Durable and retained-volatile device state.
//!
//! `DeviceState` survives power loss through the persistent state
//! store. `ConnectivityHint` survives deep sleep only (RTC retention
//! memory) and is lost on cold boot; everything else is rebuilt from
//! scratch every wake.

use crate::config::{MAX_IMAGES, WAKES_PER_CYCLE};

/// Durable slideshow state, owned by the orchestrator and mutated at
/// most once per wake cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub current_image_index: usize,
    pub wake_counter: u32,
    pub slideshow_version: u32,
    pub image_count: usize,
    /// Positionally aligned with blob slots; `len() == image_count`.
    pub image_ids: Vec<String>,
    /// Positionally aligned with `image_ids`.
    pub image_hashes: Vec<String>,
}

impl DeviceState {
    pub fn has_images(&self) -> bool {
        self.image_count > 0
    }

    /// Advances the shown image by one slot, wrapping at `image_count`.
    pub fn advance_image(&mut self) {
        if self.image_count > 0 {
            self.current_image_index = (self.current_image_index + 1) % self.image_count;
        }
    }

    /// Forces the invariants back into range after loading possibly
    /// stale or torn persisted values. Absence of a record is not an
    /// error, and neither is a single out-of-range field.
    pub fn clamp_invariants(&mut self) {
        if self.image_count > MAX_IMAGES {
            log::warn!(
                "persisted image count {} exceeds capacity, clamping to {}",
                self.image_count,
                MAX_IMAGES
            );
            self.image_count = MAX_IMAGES;
        }
        self.image_ids.truncate(self.image_count);
        self.image_hashes.truncate(self.image_count);
        self.image_ids.resize(self.image_count, String::new());
        self.image_hashes.resize(self.image_count, String::new());
        let span = self.image_count.max(1);
        if self.current_image_index >= span {
            self.current_image_index %= span;
        }
        if self.wake_counter >= WAKES_PER_CYCLE {
            self.wake_counter %= WAKES_PER_CYCLE;
        }
    }
}

/// Last-good association parameters, kept in RTC retention memory so
/// the next wake can skip the scan and DHCP exchange. `#[repr(C)]` and
/// `Copy` so the firmware can place it in a retained static.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityHint {
    pub valid: bool,
    pub channel: u8,
    pub bssid: [u8; 6],
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub subnet: [u8; 4],
    pub dns: [u8; 4],
}

impl ConnectivityHint {
    pub const fn empty() -> Self {
        Self {
            valid: false,
            channel: 0,
            bssid: [0; 6],
            ip: [0; 4],
            gateway: [0; 4],
            subnet: [0; 4],
            dns: [0; 4],
        }
    }

    /// Forces the next cycle onto the full-scan path.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl Default for ConnectivityHint {
    fn default() -> Self {
        Self::empty()
    }
}
