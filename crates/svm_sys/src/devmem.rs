//! Physical memory window over `/dev/mem`.
//!
//! Pages are mapped on first use and cached for the lifetime of the window.
//! The device is opened with `O_SYNC` so that mappings are uncached, which
//! peripheral registers and the lock server require.

use crate::error::{SysError, SysResult};
use log::{debug, error};
use memmap2::{MmapMut, MmapOptions};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use svm_common::Address;
use svm_common::geometry::{PAGE_OFFSET_MASK, PAGE_SIZE};
use svm_core::SvmError;
use svm_core::phys::PhysicalMemory;

/// Default raw physical memory device.
pub const DEV_MEM: &str = "/dev/mem";

/// Opens `path` read/write with `O_SYNC`.
pub(crate) fn open_sync(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
}

/// Maps the page holding `pa`.
pub(crate) fn map_page(file: &File, path: &Path, pa: Address) -> SysResult<MmapMut> {
    let page = pa & !PAGE_OFFSET_MASK;
    // SAFETY: the mapping aliases physical memory, not a regular file; no
    // other process is expected to truncate it. All accesses go through
    // volatile operations.
    unsafe {
        MmapOptions::new()
            .offset(page as u64)
            .len(PAGE_SIZE as usize)
            .map_mut(file)
    }
    .map_err(|source| SysError::MapFailed {
        path: path.to_path_buf(),
        address: page,
        source,
    })
}

/// Page-cached physical memory window.
pub struct DevMem {
    file: File,
    path: PathBuf,
    pages: HashMap<Address, MmapMut>,
}

impl DevMem {
    /// Opens the raw physical memory device.
    ///
    /// # Returns
    ///
    /// The window, or `MapFailed` if the device cannot be opened (missing or
    /// not permitted).
    pub fn open(path: impl AsRef<Path>) -> SysResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_sync(&path).map_err(|source| SysError::MapFailed {
            path: path.clone(),
            address: 0,
            source,
        })?;
        debug!("opened physical window {}", path.display());
        Ok(Self {
            file,
            path,
            pages: HashMap::new(),
        })
    }

    /// Maps the page holding `pa` now, so that a later access cannot fail.
    pub fn map(&mut self, pa: Address) -> SysResult<()> {
        let page = pa & !PAGE_OFFSET_MASK;
        if !self.pages.contains_key(&page) {
            let map = map_page(&self.file, &self.path, page)?;
            debug!("mapped physical page {page:#010x}");
            self.pages.insert(page, map);
        }
        Ok(())
    }

    /// Number of pages mapped so far.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    fn word(&mut self, pa: Address) -> Result<*mut u32, SvmError> {
        if pa % 4 != 0 {
            return Err(SvmError::Misaligned(pa));
        }
        if let Err(e) = self.map(pa) {
            error!("{e}");
            return Err(SvmError::UnmappedPhysical(pa));
        }
        let page = pa & !PAGE_OFFSET_MASK;
        let map = self
            .pages
            .get_mut(&page)
            .ok_or(SvmError::UnmappedPhysical(pa))?;
        let offset = (pa & PAGE_OFFSET_MASK) as usize;
        // SAFETY: offset is within the page and 4-byte aligned.
        Ok(unsafe { map.as_mut_ptr().add(offset) } as *mut u32)
    }
}

impl PhysicalMemory for DevMem {
    fn read_u32(&mut self, pa: Address) -> Result<u32, SvmError> {
        let ptr = self.word(pa)?;
        Ok(unsafe { ptr.read_volatile() })
    }

    fn write_u32(&mut self, pa: Address, value: u32) -> Result<(), SvmError> {
        let ptr = self.word(pa)?;
        unsafe { ptr.write_volatile(value) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A regular file stands in for the device: offsets are physical
    /// addresses.
    fn backing(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn words_round_trip_through_cached_pages() {
        let file = backing(3 * PAGE_SIZE as usize);
        let mut mem = DevMem::open(file.path()).unwrap();

        mem.write_u32(0x1004, 0xCAFE_F00D).unwrap();
        mem.write_u32(0x2FFC, 7).unwrap();
        assert_eq!(mem.read_u32(0x1004).unwrap(), 0xCAFE_F00D);
        assert_eq!(mem.read_u32(0x2FFC).unwrap(), 7);
        assert_eq!(mem.mapped_pages(), 2);
        assert_eq!(mem.read_u32(0x1006), Err(SvmError::Misaligned(0x1006)));

        drop(mem);
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[0x1004..0x1008], &0xCAFE_F00Du32.to_ne_bytes());
    }

    #[test]
    fn missing_device_fails_to_map() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DevMem::open(dir.path().join("mem")),
            Err(SysError::MapFailed { .. })
        ));
    }
}
