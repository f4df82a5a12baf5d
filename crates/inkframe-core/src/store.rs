//! Persistent state store.
//!
//! Raw key/value access sits behind [`KvStore`] (NVS on hardware, an
//! in-memory map in tests). [`StateStore`] persists every
//! `DeviceState` field under its own fixed key, so a torn write can
//! degrade at most one field to its previous value, never the whole
//! record.

use crate::config::{DEVICE_KEY_LEN, MAX_IMAGES};
use crate::state::DeviceState;

// NVS keys are limited to 15 characters.
pub const KEY_IMAGE_INDEX: &str = "imgIdx";
pub const KEY_WAKE_COUNTER: &str = "wakeCnt";
pub const KEY_SLIDESHOW_VERSION: &str = "ssVer";
pub const KEY_IMAGE_COUNT: &str = "imgCnt";
pub const KEY_DEVICE_KEY: &str = "deviceKey";

pub fn slot_id_key(index: usize) -> String {
    format!("imgId{}", index)
}

pub fn slot_hash_key(index: usize) -> String {
    format!("imgHash{}", index)
}

/// Raw key/value persistence error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    Io(String),
}

impl core::fmt::Display for KvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KvError::Io(msg) => write!(f, "kv I/O error: {}", msg),
        }
    }
}

/// Raw typed key/value primitives, implemented over NVS on hardware.
/// A missing key reads back as `Ok(None)`; absence is not an error.
pub trait KvStore {
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, KvError>;
    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), KvError>;
    fn get_str(&mut self, key: &str) -> Result<Option<String>, KvError>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&mut self, key: &str) -> Result<(), KvError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Kv(KvError),
    /// The committed record still mismatched after the retry write.
    VerifyFailed,
    InvalidDeviceKey,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Kv(err) => write!(f, "{}", err),
            StoreError::VerifyFailed => write!(f, "committed state did not verify"),
            StoreError::InvalidDeviceKey => {
                write!(f, "device key is not a {}-char hex string", DEVICE_KEY_LEN)
            }
        }
    }
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        StoreError::Kv(err)
    }
}

pub struct StateStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> StateStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    /// Loads the durable state, substituting zero-valued defaults for
    /// missing or unreadable fields and clamping invariants. Never
    /// fails: a device with no record starts from an empty slideshow.
    pub fn load(&mut self) -> DeviceState {
        let mut state = DeviceState {
            current_image_index: self.read_u32_or_zero(KEY_IMAGE_INDEX) as usize,
            wake_counter: self.read_u32_or_zero(KEY_WAKE_COUNTER),
            slideshow_version: self.read_u32_or_zero(KEY_SLIDESHOW_VERSION),
            image_count: self.read_u32_or_zero(KEY_IMAGE_COUNT) as usize,
            image_ids: Vec::new(),
            image_hashes: Vec::new(),
        };
        let count = state.image_count.min(MAX_IMAGES);
        for i in 0..count {
            state.image_ids.push(self.read_str_or_empty(&slot_id_key(i)));
            state
                .image_hashes
                .push(self.read_str_or_empty(&slot_hash_key(i)));
        }
        state.clamp_invariants();
        state
    }

    /// Commits the state field-by-field, then re-reads and compares.
    /// One mismatch triggers a single rewrite; a second mismatch is
    /// reported and the caller continues with best-effort state.
    pub fn commit(&mut self, state: &DeviceState) -> Result<(), StoreError> {
        for attempt in 1..=2 {
            self.write_all(state)?;
            if self.load() == *state {
                return Ok(());
            }
            log::warn!("state commit verify mismatch (attempt {})", attempt);
        }
        Err(StoreError::VerifyFailed)
    }

    /// Loads the per-device credential; `None` when absent or not a
    /// well-formed fixed-length hex string.
    pub fn load_device_key(&mut self) -> Option<String> {
        match self.kv.get_str(KEY_DEVICE_KEY) {
            Ok(Some(key)) if is_well_formed_device_key(&key) => Some(key),
            Ok(Some(_)) => {
                log::error!("stored device key is malformed");
                None
            }
            Ok(None) => None,
            Err(err) => {
                log::error!("device key unreadable: {}", err);
                None
            }
        }
    }

    /// Provisioning hook: stores the credential and verifies it reads
    /// back identically.
    pub fn save_device_key(&mut self, key: &str) -> Result<(), StoreError> {
        if !is_well_formed_device_key(key) {
            return Err(StoreError::InvalidDeviceKey);
        }
        self.kv.set_str(KEY_DEVICE_KEY, key)?;
        match self.kv.get_str(KEY_DEVICE_KEY)? {
            Some(read_back) if read_back == key => Ok(()),
            _ => Err(StoreError::VerifyFailed),
        }
    }

    fn write_all(&mut self, state: &DeviceState) -> Result<(), StoreError> {
        self.kv
            .set_u32(KEY_IMAGE_INDEX, state.current_image_index as u32)?;
        self.kv.set_u32(KEY_WAKE_COUNTER, state.wake_counter)?;
        self.kv
            .set_u32(KEY_SLIDESHOW_VERSION, state.slideshow_version)?;
        self.kv.set_u32(KEY_IMAGE_COUNT, state.image_count as u32)?;
        for i in 0..state.image_count {
            let id = state.image_ids.get(i).map(String::as_str).unwrap_or("");
            let hash = state.image_hashes.get(i).map(String::as_str).unwrap_or("");
            self.kv.set_str(&slot_id_key(i), id)?;
            self.kv.set_str(&slot_hash_key(i), hash)?;
        }
        // Stale positional entries beyond the current count would be
        // silently adopted by a later load; clear them.
        for i in state.image_count..MAX_IMAGES {
            self.kv.remove(&slot_id_key(i))?;
            self.kv.remove(&slot_hash_key(i))?;
        }
        Ok(())
    }

    fn read_u32_or_zero(&mut self, key: &str) -> u32 {
        match self.kv.get_u32(key) {
            Ok(Some(value)) => value,
            Ok(None) => 0,
            Err(err) => {
                log::warn!("key {} unreadable, using default: {}", key, err);
                0
            }
        }
    }

    fn read_str_or_empty(&mut self, key: &str) -> String {
        match self.kv.get_str(key) {
            Ok(Some(value)) => value,
            Ok(None) => String::new(),
            Err(err) => {
                log::warn!("key {} unreadable, using default: {}", key, err);
                String::new()
            }
        }
    }
}

pub fn is_well_formed_device_key(key: &str) -> bool {
    key.len() == DEVICE_KEY_LEN && key.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemoryKv;

    fn sample_state() -> DeviceState {
        DeviceState {
            current_image_index: 2,
            wake_counter: 3,
            slideshow_version: 7,
            image_count: 3,
            image_ids: vec!["a".into(), "b".into(), "c".into()],
            image_hashes: vec!["h0".into(), "h1".into(), "h2".into()],
        }
    }

    #[test]
    fn load_without_record_yields_default() {
        let mut store = StateStore::new(MemoryKv::new());
        assert_eq!(store.load(), DeviceState::default());
    }

    #[test]
    fn commit_then_load_roundtrips() {
        let mut store = StateStore::new(MemoryKv::new());
        let state = sample_state();
        store.commit(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn commit_is_idempotent() {
        let mut store = StateStore::new(MemoryKv::new());
        let state = sample_state();
        store.commit(&state).unwrap();
        let first = store.kv_mut().snapshot();
        store.commit(&state).unwrap();
        assert_eq!(store.kv_mut().snapshot(), first);
    }

    #[test]
    fn commit_clears_slot_keys_beyond_count() {
        let mut store = StateStore::new(MemoryKv::new());
        store.commit(&sample_state()).unwrap();

        let mut shrunk = sample_state();
        shrunk.image_count = 1;
        shrunk.image_ids.truncate(1);
        shrunk.image_hashes.truncate(1);
        shrunk.current_image_index = 0;
        store.commit(&shrunk).unwrap();

        assert_eq!(store.kv_mut().get_str(&slot_id_key(1)).unwrap(), None);
        assert_eq!(store.kv_mut().get_str(&slot_hash_key(2)).unwrap(), None);
    }

    #[test]
    fn torn_field_degrades_to_previous_value_only() {
        let mut store = StateStore::new(MemoryKv::new());
        store.commit(&sample_state()).unwrap();

        // Simulate power loss before the version field was rewritten.
        store.kv_mut().set_u32(KEY_SLIDESHOW_VERSION, 6).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.slideshow_version, 6);
        assert_eq!(loaded.current_image_index, 2);
        assert_eq!(loaded.image_ids, sample_state().image_ids);
    }

    #[test]
    fn commit_retries_once_then_reports_failure() {
        let mut kv = MemoryKv::new();
        kv.corrupt_writes_to(KEY_WAKE_COUNTER);
        let mut store = StateStore::new(kv);
        let err = store.commit(&sample_state()).unwrap_err();
        assert_eq!(err, StoreError::VerifyFailed);
        assert_eq!(store.kv_mut().writes_to(KEY_WAKE_COUNTER), 2);
    }

    #[test]
    fn device_key_requires_fixed_length_hex() {
        let mut store = StateStore::new(MemoryKv::new());
        assert!(store.load_device_key().is_none());

        let good = "ab".repeat(32);
        store.save_device_key(&good).unwrap();
        assert_eq!(store.load_device_key().as_deref(), Some(good.as_str()));

        assert_eq!(
            store.save_device_key("not-hex").unwrap_err(),
            StoreError::InvalidDeviceKey
        );
        store
            .kv_mut()
            .set_str(KEY_DEVICE_KEY, "zz".repeat(32).as_str())
            .unwrap();
        assert!(store.load_device_key().is_none());
    }
}
