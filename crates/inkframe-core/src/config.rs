//! Device configuration constants.

use core::time::Duration;

/// Panel resolution of the 4.0" e-paper module.
pub const DISPLAY_WIDTH: usize = 400;
pub const DISPLAY_HEIGHT: usize = 600;

/// Packed pixel buffer, 2 pixels per byte = 120,000 bytes per image.
pub const IMAGE_SIZE_BYTES: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT / 2;

/// Maximum number of slideshow images the blob partition can hold.
pub const MAX_IMAGES: usize = 12;

/// Interval between scheduled wakes.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(4 * 3600);

/// Number of wakes after which the shown image advances by one slot
/// (6 wakes at 4 hours = one slide per day).
pub const WAKES_PER_CYCLE: u32 = 6;

/// Length of the per-device credential (hex string).
pub const DEVICE_KEY_LEN: usize = 64;

/// Association timeout when reusing a cached channel/BSSID/IP.
pub const FAST_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Association timeout for a full scan + DHCP fallback.
pub const FULL_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeouts for the individual Remote API calls.
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const SIGNED_URLS_TIMEOUT: Duration = Duration::from_secs(30);
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Wall-clock budget for one image download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest read issued against a download stream. The payload is
/// never buffered whole; it moves through a buffer of this size.
pub const DOWNLOAD_CHUNK: usize = 4096;

/// Upper bound on waiting for the panel busy line to release. The
/// refresh waveform takes tens of seconds on this panel, so the
/// safety margin is generous.
pub const BUSY_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
