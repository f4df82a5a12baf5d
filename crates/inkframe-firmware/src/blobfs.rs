//! Image storage on the internal flash.
//!
//! A wear-levelled FAT partition (label "storage") is mounted once per
//! wake. Each slot is a file `image_<n>.bin`; writes go to a temp file
//! first and are renamed into place, so an interrupted download never
//! leaves a readable partial slot.

use std::ffi::CString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use esp_idf_svc::sys;

use inkframe_core::blob::{BlobError, BlobStore};
use inkframe_core::config::DOWNLOAD_CHUNK;

use crate::config::{STORAGE_MOUNT_POINT, STORAGE_PARTITION_LABEL};

const MAX_OPEN_FILES: i32 = 4;

pub struct FlashBlobStore {
    base: PathBuf,
    wl_handle: sys::wl_handle_t,
}

impl FlashBlobStore {
    pub fn mount() -> anyhow::Result<Self> {
        let c_mount = CString::new(STORAGE_MOUNT_POINT)?;
        let c_label = CString::new(STORAGE_PARTITION_LABEL)?;

        let mount_config = sys::esp_vfs_fat_mount_config_t {
            format_if_mount_failed: true,
            max_files: MAX_OPEN_FILES,
            allocation_unit_size: 0,
            disk_status_check_enable: false,
            use_one_fat: false,
        };

        let mut wl_handle: sys::wl_handle_t = sys::WL_INVALID_HANDLE;
        let res = unsafe {
            sys::esp_vfs_fat_spiflash_mount_rw_wl(
                c_mount.as_ptr(),
                c_label.as_ptr(),
                &mount_config,
                &mut wl_handle,
            )
        };
        if res != sys::ESP_OK {
            anyhow::bail!("storage partition mount failed: {}", res);
        }
        log::info!("storage partition mounted at {}", STORAGE_MOUNT_POINT);

        Ok(Self {
            base: PathBuf::from(STORAGE_MOUNT_POINT),
            wl_handle,
        })
    }

    fn slot_path(&self, index: usize) -> PathBuf {
        self.base.join(format!("image_{}.bin", index))
    }

    fn temp_path(&self) -> PathBuf {
        self.base.join("incoming.tmp")
    }
}

impl Drop for FlashBlobStore {
    /// Unmounts the partition so the filesystem is flushed and closed
    /// before the device powers down.
    fn drop(&mut self) {
        let Ok(c_mount) = CString::new(STORAGE_MOUNT_POINT) else {
            return;
        };
        let res =
            unsafe { sys::esp_vfs_fat_spiflash_unmount_rw_wl(c_mount.as_ptr(), self.wl_handle) };
        if res != sys::ESP_OK {
            log::warn!("storage partition unmount failed: {}", res);
        } else {
            log::info!("storage partition unmounted");
        }
    }
}

fn io_err(err: std::io::Error) -> BlobError {
    BlobError::Io(err.to_string())
}

impl BlobStore for FlashBlobStore {
    fn put(&mut self, index: usize, source: &mut dyn Read, len: usize) -> Result<(), BlobError> {
        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).map_err(io_err)?;

        let mut buffer = vec![0u8; DOWNLOAD_CHUNK];
        let mut written = 0usize;
        let result = loop {
            if written == len {
                break Ok(());
            }
            let want = (len - written).min(buffer.len());
            match source.read(&mut buffer[..want]) {
                Ok(0) => {
                    break Err(BlobError::WrongSize {
                        expected: len,
                        actual: written,
                    })
                }
                Ok(n) => {
                    if let Err(err) = file.write_all(&buffer[..n]) {
                        break Err(io_err(err));
                    }
                    written += n;
                }
                Err(err) => break Err(io_err(err)),
            }
        };

        match result {
            Ok(()) => {
                file.sync_all().map_err(io_err)?;
                drop(file);
                fs::rename(&temp, self.slot_path(index)).map_err(io_err)
            }
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&temp);
                Err(err)
            }
        }
    }

    fn open_for_read(&mut self, index: usize) -> Result<Box<dyn Read + '_>, BlobError> {
        let path = self.slot_path(index);
        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::Missing(index))
            }
            Err(err) => Err(io_err(err)),
        }
    }

    fn exists(&mut self, index: usize) -> bool {
        Path::new(&self.slot_path(index)).exists()
    }

    fn delete(&mut self, index: usize) -> Result<(), BlobError> {
        match fs::remove_file(self.slot_path(index)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(err)),
        }
    }

    fn delete_all(&mut self) -> Result<(), BlobError> {
        for entry in fs::read_dir(&self.base).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("image_") && name.ends_with(".bin") {
                fs::remove_file(entry.path()).map_err(io_err)?;
            }
        }
        Ok(())
    }
}
