//! Process-wide access to the lock server registers.
//!
//! The register pair is mapped once per process by `init_svm` and shared by
//! every caller through `svm_lock`. `cleanup_svm` drops the process handle
//! and may be called any number of times.

use crate::devmem::{DEV_MEM, map_page, open_sync};
use crate::error::{SysError, SysResult};
use log::{info, warn};
use memmap2::MmapMut;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use svm_common::Address;
use svm_common::geometry::PAGE_OFFSET_MASK;
use svm_common::mmio::{LOCK_READ_OFFSET, LOCK_SERVER_CSR, LOCK_WRITE_OFFSET};
use svm_core::lock::{HardwareLock, LockPort};

/// Lock register pair mapped uncached from `/dev/mem`.
pub struct MmioLockPort {
    _map: MmapMut,
    write: *mut u32,
    read: *const u32,
}

// SAFETY: the pointers target device registers inside `_map`, which lives as
// long as the port. Register accesses are single volatile word operations.
unsafe impl Send for MmioLockPort {}
unsafe impl Sync for MmioLockPort {}

impl MmioLockPort {
    /// Maps the lock server whose registers start at `base`.
    pub fn map(devmem: impl AsRef<Path>, base: Address) -> SysResult<Self> {
        let path = devmem.as_ref();
        let file = open_sync(path).map_err(|source| SysError::MapFailed {
            path: path.to_path_buf(),
            address: base,
            source,
        })?;
        let mut map = map_page(&file, path, base)?;

        let offset = (base & PAGE_OFFSET_MASK) as usize;
        let page = map.as_mut_ptr();
        // SAFETY: both registers lie inside the mapped page.
        let (write, read) = unsafe {
            (
                page.add(offset + LOCK_WRITE_OFFSET as usize) as *mut u32,
                page.add(offset + LOCK_READ_OFFSET as usize) as *const u32,
            )
        };
        Ok(Self {
            _map: map,
            write,
            read,
        })
    }
}

impl LockPort for MmioLockPort {
    fn write(&self, value: u32) {
        unsafe { self.write.write_volatile(value) }
    }

    fn read(&self) -> u32 {
        unsafe { self.read.read_volatile() }
    }
}

pub type SvmLock = HardwareLock<MmioLockPort>;

/// Per-thread holder token for the shared lock.
fn current_thread() -> NonZeroU32 {
    static NEXT: AtomicU32 = AtomicU32::new(1);
    thread_local! {
        static TOKEN: NonZeroU32 =
            NonZeroU32::new(NEXT.fetch_add(1, Ordering::Relaxed)).unwrap_or(NonZeroU32::MIN);
    }
    TOKEN.with(|token| *token)
}

static SVM_LOCK: Mutex<Option<Arc<SvmLock>>> = Mutex::new(None);

/// Maps the lock server and puts it into the released state.
///
/// Must succeed before any lock operation. Later calls return the existing
/// handle without touching the registers.
pub fn init_svm() -> SysResult<Arc<SvmLock>> {
    init_svm_at(DEV_MEM, LOCK_SERVER_CSR)
}

/// `init_svm` with an explicit device and register base.
pub fn init_svm_at(devmem: impl AsRef<Path>, base: Address) -> SysResult<Arc<SvmLock>> {
    let mut slot = SVM_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(lock) = slot.as_ref() {
        return Ok(Arc::clone(lock));
    }

    let port = MmioLockPort::map(devmem, base)?;
    let lock = Arc::new(HardwareLock::with_holder(port, current_thread));
    lock.init();
    info!("lock server at {base:#010x} initialised");
    *slot = Some(Arc::clone(&lock));
    Ok(lock)
}

/// The process-wide lock, if `init_svm` has run.
pub fn svm_lock() -> Option<Arc<SvmLock>> {
    SVM_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Drops the process handle to the lock registers.
///
/// A thread still holding the token keeps the registers mapped through its
/// own handle and releases normally.
///
/// # Returns
///
/// Whether a handle was released. Safe to call repeatedly.
pub fn cleanup_svm() -> bool {
    let Some(lock) = SVM_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    else {
        return false;
    };
    if lock.is_held() {
        warn!("lock server handle dropped while the token is held");
    }
    true
}
