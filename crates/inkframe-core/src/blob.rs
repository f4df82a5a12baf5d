//! Image blob storage.
//!
//! Images live in fixed positional slots (`0..MAX_IMAGES`), one full
//! frame per slot. On hardware the slots are files on a dedicated
//! flash partition; tests use an in-memory store.

use std::io::Read;

use crate::config::MAX_IMAGES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    Io(String),
    /// A slot write finished with the wrong number of bytes.
    WrongSize { expected: usize, actual: usize },
    Missing(usize),
}

impl core::fmt::Display for BlobError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BlobError::Io(msg) => write!(f, "blob I/O error: {}", msg),
            BlobError::WrongSize { expected, actual } => {
                write!(f, "blob size mismatch: expected {}, got {}", expected, actual)
            }
            BlobError::Missing(index) => write!(f, "blob slot {} is missing", index),
        }
    }
}

/// Slot-addressed image storage. Writes stream from `source` in
/// chunks; a slot is never buffered whole in RAM.
pub trait BlobStore {
    /// Streams exactly `len` bytes from `source` into `index`,
    /// replacing any previous content. Fewer bytes than `len` is an
    /// error and must not leave a readable partial slot behind.
    fn put(&mut self, index: usize, source: &mut dyn Read, len: usize) -> Result<(), BlobError>;

    fn open_for_read(&mut self, index: usize) -> Result<Box<dyn Read + '_>, BlobError>;

    fn exists(&mut self, index: usize) -> bool;

    fn delete(&mut self, index: usize) -> Result<(), BlobError>;

    fn delete_all(&mut self) -> Result<(), BlobError>;
}

/// Counts the contiguous populated slots starting at 0. Used to
/// re-adopt images left on flash when the durable record was lost.
pub fn discover_slots(blobs: &mut dyn BlobStore) -> usize {
    let mut count = 0;
    while count < MAX_IMAGES && blobs.exists(count) {
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MemoryBlobStore;

    #[test]
    fn discover_counts_contiguous_slots_from_zero() {
        let mut blobs = MemoryBlobStore::new();
        blobs.put(0, &mut &[1u8, 2, 3][..], 3).unwrap();
        blobs.put(1, &mut &[4u8][..], 1).unwrap();
        blobs.put(3, &mut &[5u8][..], 1).unwrap();
        assert_eq!(discover_slots(&mut blobs), 2);
    }

    #[test]
    fn discover_is_zero_for_empty_store() {
        let mut blobs = MemoryBlobStore::new();
        assert_eq!(discover_slots(&mut blobs), 0);
    }

    #[test]
    fn short_source_fails_and_leaves_no_slot() {
        let mut blobs = MemoryBlobStore::new();
        let err = blobs.put(0, &mut &[1u8, 2][..], 5).unwrap_err();
        assert!(matches!(err, BlobError::WrongSize { expected: 5, actual: 2 }));
        assert!(!blobs.exists(0));
    }

    #[test]
    fn put_replaces_previous_content() {
        let mut blobs = MemoryBlobStore::new();
        blobs.put(0, &mut &[1u8, 2, 3][..], 3).unwrap();
        blobs.put(0, &mut &[9u8][..], 1).unwrap();

        let mut data = Vec::new();
        blobs.open_for_read(0).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![9u8]);
    }
}
