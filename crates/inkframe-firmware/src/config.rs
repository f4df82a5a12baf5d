//! Build-time device configuration.
//!
//! Credentials and the backend base URL come from the environment at
//! compile time, e.g.
//! `INKFRAME_WIFI_SSID=home INKFRAME_WIFI_PASS=secret cargo build`.

pub const WIFI_SSID: &str = match option_env!("INKFRAME_WIFI_SSID") {
    Some(value) => value,
    None => "CHANGE_ME",
};

pub const WIFI_PASSWORD: &str = match option_env!("INKFRAME_WIFI_PASS") {
    Some(value) => value,
    None => "",
};

/// Cloud function base; endpoint names are appended to it.
pub const API_BASE_URL: &str = match option_env!("INKFRAME_API_BASE") {
    Some(value) => value,
    None => "https://example.cloudfunctions.net",
};

/// Partition label of the FAT filesystem holding the images.
pub const STORAGE_PARTITION_LABEL: &str = "storage";
pub const STORAGE_MOUNT_POINT: &str = "/storage";

/// RTC-capable GPIO wired to the advance button (wakes from deep
/// sleep, active low).
pub const BUTTON_GPIO: i32 = 33;

/// Panel busy line; high means idle. Doubles as a light-sleep wake
/// source during refresh waits.
pub const PANEL_BUSY_GPIO: i32 = 4;
