//! In-memory doubles for the hardware traits.
//!
//! Used by unit tests and the scenario suite. Shipped as a normal
//! module so the integration tests under `tests/` can reach it.

use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

use core::time::Duration;

use crate::blob::{BlobError, BlobStore};
use crate::config::DOWNLOAD_CHUNK;
use crate::connectivity::{AssociateParams, LinkInfo, Radio, RadioError};
use crate::display::{DisplayDriver, DisplayError};
use crate::store::{KvError, KvStore};
use crate::sync::{ApiError, ImageDownload, RemoteApi, SlideshowManifest, VersionInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
enum KvValue {
    U32(u32),
    Str(String),
}

/// `KvStore` backed by a map, with write-corruption injection for the
/// commit-verify tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: BTreeMap<String, KvValue>,
    corrupt_key: Option<String>,
    write_counts: BTreeMap<String, u32>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write to `key` lands flipped, so verification never
    /// succeeds for it.
    pub fn corrupt_writes_to(&mut self, key: &str) {
        self.corrupt_key = Some(key.to_string());
    }

    pub fn writes_to(&self, key: &str) -> u32 {
        self.write_counts.get(key).copied().unwrap_or(0)
    }

    /// Full copy of the stored entries, for byte-identical commit
    /// comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    KvValue::U32(n) => n.to_string(),
                    KvValue::Str(s) => s.clone(),
                };
                (k.clone(), rendered)
            })
            .collect()
    }

    fn count_write(&mut self, key: &str) {
        *self.write_counts.entry(key.to_string()).or_insert(0) += 1;
    }

    fn is_corrupt(&self, key: &str) -> bool {
        self.corrupt_key.as_deref() == Some(key)
    }
}

impl KvStore for MemoryKv {
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, KvError> {
        match self.entries.get(key) {
            Some(KvValue::U32(n)) => Ok(Some(*n)),
            Some(KvValue::Str(_)) => Err(KvError::Io(format!("{} holds a string", key))),
            None => Ok(None),
        }
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), KvError> {
        self.count_write(key);
        let stored = if self.is_corrupt(key) { value ^ 1 } else { value };
        self.entries.insert(key.to_string(), KvValue::U32(stored));
        Ok(())
    }

    fn get_str(&mut self, key: &str) -> Result<Option<String>, KvError> {
        match self.entries.get(key) {
            Some(KvValue::Str(s)) => Ok(Some(s.clone())),
            Some(KvValue::U32(_)) => Err(KvError::Io(format!("{} holds an integer", key))),
            None => Ok(None),
        }
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        self.count_write(key);
        let stored = if self.is_corrupt(key) {
            format!("{}!", value)
        } else {
            value.to_string()
        };
        self.entries.insert(key.to_string(), KvValue::Str(stored));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// `BlobStore` backed by a slot map. Writes go through a staging
/// buffer so a short source leaves no readable partial slot, matching
/// the flash-backed implementation.
#[derive(Default)]
pub struct MemoryBlobStore {
    slots: BTreeMap<usize, Vec<u8>>,
    pub fail_put: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(&index).map(Vec::as_slice)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&mut self, index: usize, source: &mut dyn Read, len: usize) -> Result<(), BlobError> {
        if self.fail_put {
            return Err(BlobError::Io("injected write failure".into()));
        }
        let mut staged = Vec::with_capacity(len);
        let mut chunk = vec![0u8; DOWNLOAD_CHUNK];
        while staged.len() < len {
            let want = (len - staged.len()).min(chunk.len());
            let n = source
                .read(&mut chunk[..want])
                .map_err(|err| BlobError::Io(err.to_string()))?;
            if n == 0 {
                return Err(BlobError::WrongSize {
                    expected: len,
                    actual: staged.len(),
                });
            }
            staged.extend_from_slice(&chunk[..n]);
        }
        self.slots.insert(index, staged);
        Ok(())
    }

    fn open_for_read(&mut self, index: usize) -> Result<Box<dyn Read + '_>, BlobError> {
        match self.slots.get(&index) {
            Some(data) => Ok(Box::new(data.as_slice())),
            None => Err(BlobError::Missing(index)),
        }
    }

    fn exists(&mut self, index: usize) -> bool {
        self.slots.contains_key(&index)
    }

    fn delete(&mut self, index: usize) -> Result<(), BlobError> {
        self.slots.remove(&index);
        Ok(())
    }

    fn delete_all(&mut self) -> Result<(), BlobError> {
        self.slots.clear();
        Ok(())
    }
}

/// One recorded `associate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateCall {
    pub params: AssociateParams,
    pub timeout: Duration,
}

/// `Radio` whose `associate` results are scripted in order. Exhausting
/// the script times out.
pub struct ScriptedRadio {
    script: VecDeque<Result<LinkInfo, RadioError>>,
    calls: Vec<AssociateCall>,
    shutdowns: u32,
}

impl ScriptedRadio {
    pub fn new(script: Vec<Result<LinkInfo, RadioError>>) -> Self {
        Self {
            script: script.into(),
            calls: Vec::new(),
            shutdowns: 0,
        }
    }

    pub fn calls(&self) -> &[AssociateCall] {
        &self.calls
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns
    }
}

impl Radio for ScriptedRadio {
    fn associate(
        &mut self,
        params: &AssociateParams,
        timeout: Duration,
    ) -> Result<LinkInfo, RadioError> {
        self.calls.push(AssociateCall {
            params: *params,
            timeout,
        });
        self.script.pop_front().unwrap_or(Err(RadioError::Timeout))
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
    }
}

/// Downloadable payload registered against a URL.
pub struct ScriptedPayload {
    pub body: Vec<u8>,
    /// Advertised Content-Length; `None` omits the header entirely.
    pub declared_len: Option<u64>,
}

struct ScriptedDownload {
    body: std::io::Cursor<Vec<u8>>,
    declared_len: Option<u64>,
}

impl Read for ScriptedDownload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.read(buf)
    }
}

impl ImageDownload for ScriptedDownload {
    fn content_len(&self) -> Option<u64> {
        self.declared_len
    }
}

/// `RemoteApi` driven entirely by preloaded responses.
pub struct ScriptedApi {
    pub version: Option<Result<VersionInfo, ApiError>>,
    pub manifest: Option<Result<SlideshowManifest, ApiError>>,
    pub signed_urls: Option<Result<Vec<Option<String>>, ApiError>>,
    pub ack_result: Result<(), ApiError>,
    payloads: BTreeMap<String, ScriptedPayload>,
    pub version_calls: u32,
    pub manifest_calls: u32,
    pub download_calls: Vec<String>,
    pub acks: Vec<(String, u32)>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            version: None,
            manifest: None,
            signed_urls: None,
            ack_result: Ok(()),
            payloads: BTreeMap::new(),
            version_calls: 0,
            manifest_calls: 0,
            download_calls: Vec::new(),
            acks: Vec::new(),
        }
    }

    pub fn add_payload(&mut self, url: &str, payload: ScriptedPayload) {
        self.payloads.insert(url.to_string(), payload);
    }
}

impl RemoteApi for ScriptedApi {
    fn get_version(&mut self, _device_key: &str) -> Result<VersionInfo, ApiError> {
        self.version_calls += 1;
        self.version.clone().unwrap_or(Err(ApiError::Timeout))
    }

    fn get_manifest(&mut self, _device_key: &str) -> Result<SlideshowManifest, ApiError> {
        self.manifest_calls += 1;
        self.manifest.clone().unwrap_or(Err(ApiError::Timeout))
    }

    fn get_signed_urls(
        &mut self,
        _device_key: &str,
        ids: &[String],
    ) -> Result<Vec<Option<String>>, ApiError> {
        match &self.signed_urls {
            Some(result) => result.clone(),
            // Default: sign every id as "https://cdn.test/<id>".
            None => Ok(ids
                .iter()
                .map(|id| Some(format!("https://cdn.test/{}", id)))
                .collect()),
        }
    }

    fn ack_displayed(&mut self, device_key: &str, version: u32) -> Result<(), ApiError> {
        self.acks.push((device_key.to_string(), version));
        self.ack_result.clone()
    }

    fn open_download<'a>(
        &'a mut self,
        url: &str,
    ) -> Result<Box<dyn ImageDownload + 'a>, ApiError> {
        self.download_calls.push(url.to_string());
        match self.payloads.get(url) {
            Some(payload) => Ok(Box::new(ScriptedDownload {
                body: std::io::Cursor::new(payload.body.clone()),
                declared_len: payload.declared_len,
            })),
            None => Err(ApiError::Status(404)),
        }
    }
}

/// `DisplayDriver` that records the sequencing and captures pushed
/// frames.
#[derive(Default)]
pub struct RecordingDisplay {
    pub inits: u32,
    pub frames: Vec<Vec<u8>>,
    pub sleeps: u32,
    pub fail_push: bool,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayDriver for RecordingDisplay {
    fn init(&mut self) -> Result<(), DisplayError> {
        self.inits += 1;
        Ok(())
    }

    fn push_full_frame(&mut self, frame: &mut dyn Read) -> Result<(), DisplayError> {
        let mut data = Vec::new();
        frame
            .read_to_end(&mut data)
            .map_err(|err| DisplayError::Driver(err.to_string()))?;
        if self.fail_push {
            return Err(DisplayError::Driver("injected refresh failure".into()));
        }
        self.frames.push(data);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.sleeps += 1;
        Ok(())
    }
}
