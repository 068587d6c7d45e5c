//! Cross-domain spinlock over the lock server register pair.
//!
//! The host and the accelerator share one token held by a lock server in the
//! FPGA fabric. A side requests the token by writing to the write port and
//! spins on the read port until the server reports it as granted. There is no
//! queueing and no fairness; critical sections must stay short.

use crate::SvmError;
use crate::barrier;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{trace, warn};
use svm_common::lock::{ACQUIRE_REQUEST, GRANTED, RELEASED};

/// Write/read register pair of one lock server client.
///
/// Accesses must be uncached and performed exactly once each. On the board
/// this is a volatile access through the physical window; in simulation it is
/// a port of a software `LockServer`.
pub trait LockPort {
    fn write(&self, value: u32);
    fn read(&self) -> u32;
}

impl<T: LockPort + ?Sized> LockPort for &T {
    fn write(&self, value: u32) {
        (**self).write(value)
    }

    fn read(&self) -> u32 {
        (**self).read()
    }
}

/// Identifies the execution context calling into a lock.
///
/// Must return the same value for every call made from one context and
/// distinct values for contexts that share a `HardwareLock`.
pub type HolderFn = fn() -> NonZeroU32;

const FREE: u32 = 0;

fn single_context() -> NonZeroU32 {
    NonZeroU32::MIN
}

/// Spinlock driven through a `LockPort`.
///
/// Several contexts may share one port. They are serialised locally before
/// the request reaches the register pair, so a context waiting on another
/// context of the same port spins like one waiting on the accelerator. The
/// holder is recorded at acquire; a second acquire from the holder itself is
/// reported instead of deadlocking, and only the holder's guard can release.
pub struct HardwareLock<P> {
    port: P,
    holder: AtomicU32,
    current: HolderFn,
}

impl<P: LockPort> HardwareLock<P> {
    /// Lock used from a single execution context.
    pub const fn new(port: P) -> Self {
        Self::with_holder(port, single_context)
    }

    /// Lock shared by the contexts that `current` tells apart.
    pub const fn with_holder(port: P, current: HolderFn) -> Self {
        Self {
            port,
            holder: AtomicU32::new(FREE),
            current,
        }
    }

    /// Puts the register pair into the released state.
    ///
    /// Must run once before any other lock operation.
    pub fn init(&self) {
        barrier::dsb();
        self.port.write(RELEASED);
        barrier::dsb();
        self.holder.store(FREE, Ordering::Release);
    }

    /// Requests the token and spins until it is granted.
    ///
    /// Every read of the read port is counted, including the one that
    /// observes the grant, so an uncontended acquire reports one poll.
    /// Time spent waiting on another context of this lock is not counted.
    fn acquire(&self) -> Result<u32, SvmError> {
        let me = (self.current)().get();
        loop {
            match self
                .holder
                .compare_exchange_weak(FREE, me, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(owner) if owner == me => return Err(SvmError::LockReentered),
                Err(_) => core::hint::spin_loop(),
            }
        }

        barrier::dsb();
        self.port.write(ACQUIRE_REQUEST);
        barrier::dsb();

        let mut cycles: u32 = 0;
        loop {
            let state = self.port.read();
            cycles = cycles.wrapping_add(1);
            if state == GRANTED {
                break;
            }
            core::hint::spin_loop();
        }
        barrier::full();

        trace!("lock acquired after {cycles} polls");
        Ok(cycles)
    }

    /// Gives the token back.
    ///
    /// If the read port no longer shows the grant, another request is pending
    /// on the server and the registers are left untouched.
    fn release(&self) -> Result<(), SvmError> {
        let me = (self.current)().get();
        if self.holder.load(Ordering::Relaxed) != me {
            return Err(SvmError::LockNotHeld);
        }

        barrier::dsb();
        if self.port.read() == GRANTED {
            self.port.write(RELEASED);
        } else {
            trace!("lock release skipped, token pending");
        }
        barrier::dsb();

        self.holder.store(FREE, Ordering::Release);
        Ok(())
    }

    /// Acquires the token and returns a guard releasing it on drop.
    ///
    /// # Returns
    ///
    /// The guard, or `LockReentered` if the calling context already holds
    /// the token.
    pub fn lock(&self) -> Result<HardwareLockGuard<'_, P>, SvmError> {
        let cycles = self.acquire()?;
        Ok(HardwareLockGuard {
            lock: self,
            cycles,
            _context: PhantomData,
        })
    }

    /// Stores `value` at `addr` while holding the token.
    ///
    /// The only read-modify-write primitive shared with the accelerator. The
    /// store is volatile and followed by a data barrier, so the accelerator
    /// observes it before the release.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for writes and properly aligned for `T`, and every
    /// other access to it, from either domain, must happen under this lock.
    ///
    /// # Returns
    ///
    /// The acquire poll count.
    pub unsafe fn atomic_store<T>(&self, addr: *mut T, value: T) -> Result<u32, SvmError> {
        let guard = self.lock()?;
        unsafe { core::ptr::write_volatile(addr, value) };
        barrier::dsb();
        let cycles = guard.cycles();
        guard.unlock()?;
        Ok(cycles)
    }

    /// Raw value of the read port.
    pub fn state(&self) -> u32 {
        self.port.read()
    }

    /// Whether any context of this lock holds the token.
    pub fn is_held(&self) -> bool {
        self.holder.load(Ordering::Relaxed) != FREE
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

/// Holds the token until dropped.
///
/// Bound to the context that acquired it.
pub struct HardwareLockGuard<'a, P: LockPort> {
    lock: &'a HardwareLock<P>,
    cycles: u32,
    _context: PhantomData<*const ()>,
}

impl<P: LockPort> HardwareLockGuard<'_, P> {
    /// Poll count of the acquire that produced this guard.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Releases the token now, reporting a failed release.
    pub fn unlock(self) -> Result<(), SvmError> {
        let guard = ManuallyDrop::new(self);
        guard.lock.release()
    }
}

impl<P: LockPort> Drop for HardwareLockGuard<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            warn!("lock guard release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Single-client register pair that grants after a fixed number of polls.
    struct Pair {
        written: Cell<u32>,
        polls_left: Cell<u32>,
        writes: Cell<u32>,
    }

    impl Pair {
        fn new(delay: u32) -> Self {
            Self {
                written: Cell::new(0xFF),
                polls_left: Cell::new(delay),
                writes: Cell::new(0),
            }
        }
    }

    impl LockPort for Pair {
        fn write(&self, value: u32) {
            self.written.set(value);
            self.writes.set(self.writes.get() + 1);
        }

        fn read(&self) -> u32 {
            if self.written.get() != ACQUIRE_REQUEST {
                return RELEASED;
            }
            if self.polls_left.get() > 0 {
                self.polls_left.set(self.polls_left.get() - 1);
                return ACQUIRE_REQUEST;
            }
            GRANTED
        }
    }

    #[test]
    fn acquire_counts_polls_and_release_clears() {
        let lock = HardwareLock::new(Pair::new(3));
        lock.init();
        assert_eq!(lock.port().written.get(), RELEASED);

        let guard = lock.lock().unwrap();
        assert_eq!(guard.cycles(), 4);
        assert_eq!(lock.state(), GRANTED);
        guard.unlock().unwrap();
        assert_eq!(lock.port().written.get(), RELEASED);
        assert!(!lock.is_held());
    }

    #[test]
    fn misuse_is_reported_without_touching_registers() {
        let lock = HardwareLock::new(Pair::new(0));
        lock.init();
        assert_eq!(lock.release(), Err(SvmError::LockNotHeld));
        assert_eq!(lock.port().writes.get(), 1);

        let guard = lock.lock().unwrap();
        let writes = lock.port().writes.get();
        assert_eq!(lock.lock().err(), Some(SvmError::LockReentered));
        assert_eq!(lock.port().writes.get(), writes);
        drop(guard);
        assert!(!lock.is_held());
    }

    #[test]
    fn atomic_store_writes_under_lock() {
        let lock = HardwareLock::new(Pair::new(1));
        lock.init();
        let mut slot = 0u64;
        let cycles = unsafe { lock.atomic_store(&raw mut slot, 0xDEAD_BEEF_0000_0001u64) }.unwrap();
        assert_eq!(cycles, 2);
        assert_eq!(slot, 0xDEAD_BEEF_0000_0001);
        assert!(!lock.is_held());
    }
}
