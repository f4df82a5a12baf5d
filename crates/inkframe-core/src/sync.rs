//! Slideshow sync protocol.
//!
//! Version check, manifest fetch, signed URL resolution, and streamed
//! image downloads. A manifest is adopted all-or-nothing: durable
//! state only changes after every image landed, so a failed sync
//! leaves the previous slideshow fully intact and the server re-offers
//! the same version next wake.

use std::io::Read;
use std::time::Instant;

use core::time::Duration;

use crate::blob::{BlobError, BlobStore};
use crate::config::{DOWNLOAD_CHUNK, DOWNLOAD_TIMEOUT, IMAGE_SIZE_BYTES, MAX_IMAGES};
use crate::state::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: u32,
    /// Server-side flag: this version has not been acked by the device.
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowManifest {
    pub version: u32,
    pub items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Timeout,
    Status(u16),
    Malformed(String),
    Transport(String),
}

impl core::fmt::Display for ApiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ApiError::Timeout => write!(f, "request timed out"),
            ApiError::Status(code) => write!(f, "unexpected HTTP status {}", code),
            ApiError::Malformed(msg) => write!(f, "malformed response: {}", msg),
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// Open download stream. Bytes arrive through `Read`; the declared
/// length comes from the response headers when the server sent one.
pub trait ImageDownload: Read {
    fn content_len(&self) -> Option<u64>;
}

/// Backend REST surface. Each call authenticates with the device key
/// and carries its own timeout.
pub trait RemoteApi {
    fn get_version(&mut self, device_key: &str) -> Result<VersionInfo, ApiError>;

    fn get_manifest(&mut self, device_key: &str) -> Result<SlideshowManifest, ApiError>;

    /// Resolves image ids to time-limited download URLs. The result is
    /// positionally aligned with `ids`; `None` marks an id the server
    /// could not sign.
    fn get_signed_urls(
        &mut self,
        device_key: &str,
        ids: &[String],
    ) -> Result<Vec<Option<String>>, ApiError>;

    fn ack_displayed(&mut self, device_key: &str, version: u32) -> Result<(), ApiError>;

    fn open_download<'a>(&'a mut self, url: &str)
        -> Result<Box<dyn ImageDownload + 'a>, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    Timeout,
    /// The response carried no Content-Length, so the payload size
    /// cannot be checked up front.
    UndeclaredLength,
    LengthMismatch { expected: usize, actual: usize },
    Http(String),
    Blob(BlobError),
}

impl core::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DownloadError::Timeout => write!(f, "download timed out"),
            DownloadError::UndeclaredLength => {
                write!(f, "download did not declare its length")
            }
            DownloadError::LengthMismatch { expected, actual } => {
                write!(f, "download length mismatch: expected {}, got {}", expected, actual)
            }
            DownloadError::Http(msg) => write!(f, "download failed: {}", msg),
            DownloadError::Blob(err) => write!(f, "download store failed: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Api(ApiError),
    /// The server returned no signed URL for the item at `index`.
    MissingUrl { index: usize },
    Download { index: usize, cause: DownloadError },
    Blob(BlobError),
}

impl core::fmt::Display for SyncError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SyncError::Api(err) => write!(f, "sync API call failed: {}", err),
            SyncError::MissingUrl { index } => {
                write!(f, "no signed URL for manifest item {}", index)
            }
            SyncError::Download { index, cause } => {
                write!(f, "image {} download failed: {}", index, cause)
            }
            SyncError::Blob(err) => write!(f, "sync storage failed: {}", err),
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        SyncError::Api(err)
    }
}

/// A sync is due when the server moved past the local version, or when
/// the server still flags the local version as unacked. The latter
/// re-runs a sync whose ack was lost, keeping delivery at-least-once.
pub fn should_resync(server: VersionInfo, local_version: u32) -> bool {
    server.version > local_version || (server.is_new && server.version == local_version)
}

pub struct SyncClient<'a, A: RemoteApi> {
    api: &'a mut A,
    device_key: &'a str,
}

impl<'a, A: RemoteApi> SyncClient<'a, A> {
    pub fn new(api: &'a mut A, device_key: &'a str) -> Self {
        Self { api, device_key }
    }

    pub fn check_version(&mut self) -> Result<VersionInfo, ApiError> {
        self.api.get_version(self.device_key)
    }

    pub fn ack_displayed(&mut self, version: u32) -> Result<(), ApiError> {
        self.api.ack_displayed(self.device_key, version)
    }

    /// Fetches the manifest and downloads every image, then adopts the
    /// new slideshow into `state` in one step. Any failure before
    /// adoption returns early with `state` untouched.
    pub fn sync_slideshow<B: BlobStore>(
        &mut self,
        blobs: &mut B,
        state: &mut DeviceState,
    ) -> Result<(), SyncError> {
        let mut manifest = self.api.get_manifest(self.device_key)?;
        if manifest.items.len() > MAX_IMAGES {
            log::warn!(
                "manifest has {} items, keeping the first {}",
                manifest.items.len(),
                MAX_IMAGES
            );
            manifest.items.truncate(MAX_IMAGES);
        }
        log::info!(
            "syncing slideshow v{} ({} images)",
            manifest.version,
            manifest.items.len()
        );

        let ids: Vec<String> = manifest.items.iter().map(|item| item.id.clone()).collect();
        let urls = self.api.get_signed_urls(self.device_key, &ids)?;

        for (index, item) in manifest.items.iter().enumerate() {
            let url = urls
                .get(index)
                .and_then(|url| url.as_deref())
                .ok_or(SyncError::MissingUrl { index })?;
            log::info!("downloading image {} ({})", index, item.id);
            stream_image(self.api, blobs, index, url)
                .map_err(|cause| SyncError::Download { index, cause })?;
        }

        // Every image is on flash; adopt the manifest.
        for index in manifest.items.len()..MAX_IMAGES {
            if blobs.exists(index) {
                blobs.delete(index).map_err(SyncError::Blob)?;
            }
        }
        state.slideshow_version = manifest.version;
        state.image_count = manifest.items.len();
        state.image_ids = manifest.items.iter().map(|item| item.id.clone()).collect();
        state.image_hashes = manifest.items.iter().map(|item| item.hash.clone()).collect();
        state.current_image_index = 0;
        state.wake_counter = 0;
        Ok(())
    }
}

/// Streams one image into its slot, chunked with a wall-clock budget.
/// A failed stream deletes whatever partial slot the store left.
fn stream_image<A: RemoteApi, B: BlobStore>(
    api: &mut A,
    blobs: &mut B,
    index: usize,
    url: &str,
) -> Result<(), DownloadError> {
    let download = api
        .open_download(url)
        .map_err(|err| DownloadError::Http(err.to_string()))?;

    // An unsized stream could truncate silently at the slot size, so
    // the declared length is mandatory, not advisory.
    let declared = download
        .content_len()
        .ok_or(DownloadError::UndeclaredLength)?;
    if declared != IMAGE_SIZE_BYTES as u64 {
        return Err(DownloadError::LengthMismatch {
            expected: IMAGE_SIZE_BYTES,
            actual: declared as usize,
        });
    }

    let mut reader = TimedReader::new(download, DOWNLOAD_TIMEOUT);
    let result = blobs.put(index, &mut reader, IMAGE_SIZE_BYTES);
    let timed_out = reader.timed_out();

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if blobs.exists(index) {
                if let Err(cleanup) = blobs.delete(index) {
                    log::warn!("could not drop partial image {}: {}", index, cleanup);
                }
            }
            if timed_out {
                Err(DownloadError::Timeout)
            } else {
                match err {
                    BlobError::WrongSize { expected, actual } => {
                        Err(DownloadError::LengthMismatch { expected, actual })
                    }
                    other => Err(DownloadError::Blob(other)),
                }
            }
        }
    }
}

/// `Read` adapter that caps chunk sizes and enforces a total deadline.
/// A deadline hit surfaces as an I/O error to the consumer and is
/// remembered so the caller can classify the failure.
struct TimedReader<R: Read> {
    inner: R,
    deadline: Instant,
    timed_out: bool,
}

impl<R: Read> TimedReader<R> {
    fn new(inner: R, budget: Duration) -> Self {
        Self {
            inner,
            deadline: Instant::now() + budget,
            timed_out: false,
        }
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl<R: Read> Read for TimedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if Instant::now() >= self.deadline {
            self.timed_out = true;
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "download budget exhausted",
            ));
        }
        let cap = buf.len().min(DOWNLOAD_CHUNK);
        self.inner.read(&mut buf[..cap])
    }
}
